// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock transports for testing

use event_pipeline::{Batch, BatchId, DeliveryOutcome, Transport};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// One call into a mock transport.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Attempt {
    pub batch_id: BatchId,
    pub labels: Vec<String>,
    pub at: Instant,
}

/// Records every attempt and answers with scripted outcomes, then `Delivered` once the script
/// runs out.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<DeliveryOutcome>>,
    delays: Mutex<VecDeque<Duration>>,
    attempts: Mutex<Vec<Attempt>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn delivering() -> Self {
        Self::default()
    }

    pub fn scripted(outcomes: Vec<DeliveryOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    /// Makes the first attempts take the given delays before answering, one per attempt.
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().expect("lock poisoned") = delays.into();
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().expect("lock poisoned").clone()
    }

    /// Labels of every attempted batch, in attempt order, retries included.
    pub fn attempted_labels(&self) -> Vec<Vec<String>> {
        self.attempts().into_iter().map(|a| a.labels).collect()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn deliver(&self, batch: &Batch) -> DeliveryOutcome {
        self.attempts.lock().expect("lock poisoned").push(Attempt {
            batch_id: batch.id(),
            labels: super::helpers::labels(batch),
            at: Instant::now(),
        });
        let delay = self.delays.lock().expect("lock poisoned").pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

/// Never answers.
#[allow(dead_code)]
pub struct StalledTransport;

#[async_trait::async_trait]
impl Transport for StalledTransport {
    async fn deliver(&self, _batch: &Batch) -> DeliveryOutcome {
        std::future::pending().await
    }
}

/// Panics on its first call, then delivers.
#[allow(dead_code)]
#[derive(Default)]
pub struct PanicsOnce {
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl PanicsOnce {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for PanicsOnce {
    async fn deliver(&self, _batch: &Batch) -> DeliveryOutcome {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("transport failure");
        }
        DeliveryOutcome::Delivered
    }
}

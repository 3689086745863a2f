// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery loop run by the pipeline worker.
//!
//! Batches go through the transport strictly one at a time. A batch that fails with a retryable
//! outcome keeps its slot and is attempted again after the backoff delay, so the order in which
//! batches are issued always matches the order in which events were accepted.

use crate::backoff::BackoffState;
use crate::batch::Batch;
use crate::batcher::Batcher;
use crate::metrics::{DiscardReason, PipelineMetrics};
use crate::queue::EventQueue;
use crate::transport::{DeliveryOutcome, Transport};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Lifecycle of a batch inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Sending,
    Delivered,
    RetryScheduled,
    Dropped,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Delivered => "delivered",
            Self::RetryScheduled => "retry_scheduled",
            Self::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

/// Invoked once for every batch the pipeline gives up on.
pub type DropCallback = Arc<dyn Fn(&Batch, DiscardReason) + Send + Sync>;

struct InFlight {
    batch: Batch,
    attempts: u32,
    state: BatchState,
}

impl InFlight {
    fn new(batch: Batch) -> Self {
        Self {
            batch,
            attempts: 0,
            state: BatchState::Pending,
        }
    }

    fn transition(&mut self, state: BatchState) {
        debug!(
            "Batch {}: {} -> {} (attempt {})",
            self.batch.id(),
            self.state,
            state,
            self.attempts
        );
        self.state = state;
    }
}

/// What the worker gave up on when it was cancelled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ForcedDrops {
    pub(crate) batches: usize,
    pub(crate) events: usize,
}

pub(crate) struct Scheduler {
    pub(crate) batcher: Batcher,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) backoff: BackoffState,
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) metrics: Arc<PipelineMetrics>,
    pub(crate) on_drop: Option<DropCallback>,
    pub(crate) max_retries: u32,
    pub(crate) delivery_timeout: Duration,
    pub(crate) cancel: CancellationToken,
}

impl Scheduler {
    /// Drains, batches and delivers until the batcher runs dry while draining, or until
    /// cancelled. Whatever is still pending when cancelled is dropped and reported.
    pub(crate) async fn run(mut self) -> ForcedDrops {
        let mut forced = ForcedDrops::default();
        let cancel = self.cancel.clone();

        while let Some(batch) = self.batcher.next_batch(&cancel).await {
            if let Err(batch) = self.deliver(batch).await {
                self.force_drop(batch, &mut forced);
                break;
            }
        }

        if cancel.is_cancelled() {
            for batch in self.batcher.drain_remaining() {
                self.force_drop(batch, &mut forced);
            }
        }
        if forced.batches > 0 {
            warn!(
                "Shutdown dropped {} pending batches ({} events)",
                forced.batches, forced.events
            );
        }
        debug!("Pipeline worker stopped");
        forced
    }

    /// Drives one batch to a terminal state. Hands the batch back if cancelled before that.
    async fn deliver(&mut self, batch: Batch) -> Result<(), Batch> {
        let mut in_flight = InFlight::new(batch);

        loop {
            let wait = self.backoff.time_until_next_attempt(Instant::now());
            if !wait.is_zero() {
                debug!(
                    "Waiting {:?} before attempting batch {}",
                    wait,
                    in_flight.batch.id()
                );
                let cancelled = tokio::select! {
                    () = self.cancel.cancelled() => true,
                    () = tokio::time::sleep(wait) => false,
                };
                if cancelled {
                    return Err(in_flight.batch);
                }
            }

            in_flight.attempts += 1;
            in_flight.transition(BatchState::Sending);
            self.metrics.record_attempt();

            let attempt = tokio::select! {
                () = self.cancel.cancelled() => None,
                outcome = tokio::time::timeout(
                    self.delivery_timeout,
                    AssertUnwindSafe(self.transport.deliver(&in_flight.batch)).catch_unwind(),
                ) => Some(outcome),
            };
            let outcome = match attempt {
                None => return Err(in_flight.batch),
                Some(Ok(Ok(outcome))) => outcome,
                Some(Ok(Err(payload))) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        "Transport panicked while delivering batch {}: {}",
                        in_flight.batch.id(),
                        message
                    );
                    DeliveryOutcome::permanent(format!("transport panicked: {message}"))
                }
                Some(Err(_)) => {
                    warn!(
                        "Delivery of batch {} timed out after {:?}",
                        in_flight.batch.id(),
                        self.delivery_timeout
                    );
                    DeliveryOutcome::retryable()
                }
            };

            match outcome {
                DeliveryOutcome::Delivered => {
                    self.backoff.register_success();
                    self.metrics.set_consecutive_failures(0);
                    self.metrics.record_delivered_batch(in_flight.batch.len());
                    in_flight.transition(BatchState::Delivered);
                    self.queue.release(in_flight.batch.len());
                    return Ok(());
                }
                DeliveryOutcome::PermanentFailure { reason } => {
                    warn!(
                        "Batch {} rejected permanently, dropping {} events: {}",
                        in_flight.batch.id(),
                        in_flight.batch.len(),
                        reason
                    );
                    self.drop_batch(in_flight, DiscardReason::PermanentFailure);
                    return Ok(());
                }
                DeliveryOutcome::RetryableFailure { retry_after } => {
                    let delay = self.backoff.register_failure(Instant::now(), retry_after);
                    self.metrics
                        .set_consecutive_failures(self.backoff.consecutive_failures());

                    if in_flight.attempts > self.max_retries {
                        error!(
                            "Batch {} failed after {} attempts, dropping {} events",
                            in_flight.batch.id(),
                            in_flight.attempts,
                            in_flight.batch.len()
                        );
                        self.drop_batch(in_flight, DiscardReason::RetriesExhausted);
                        return Ok(());
                    }
                    debug!(
                        "Batch {} failed, retrying in {:?}",
                        in_flight.batch.id(),
                        delay
                    );
                    in_flight.transition(BatchState::RetryScheduled);
                }
            }
        }
    }

    fn drop_batch(&self, mut in_flight: InFlight, reason: DiscardReason) {
        in_flight.transition(BatchState::Dropped);
        self.discard(&in_flight.batch, reason);
    }

    fn force_drop(&self, batch: Batch, forced: &mut ForcedDrops) {
        forced.batches += 1;
        forced.events += batch.len();
        self.discard(&batch, DiscardReason::ForcedShutdown);
    }

    fn discard(&self, batch: &Batch, reason: DiscardReason) {
        self.metrics.record_dropped_batch(reason, batch.len());
        self.queue.release(batch.len());
        if let Some(on_drop) = &self.on_drop {
            on_drop(batch, reason);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use event_pipeline::backoff::BackoffConfig;
use event_pipeline::{Batch, Event, Level, PipelineConfig};
use std::time::Duration;

/// Event whose payload is `label`.
pub fn event(label: impl Into<String>) -> Event {
    let label: String = label.into();
    Event::new(Level::Info, label)
}

pub fn labels(batch: &Batch) -> Vec<String> {
    batch
        .events()
        .iter()
        .map(|e| String::from_utf8_lossy(e.payload()).into_owned())
        .collect()
}

/// Small, jitter-free configuration so that timings are predictable.
#[allow(dead_code)]
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        capacity: 100,
        max_batch_count: 10,
        max_batch_bytes: 64 * 1_024,
        linger_timeout: Duration::from_secs(1),
        max_retries: 3,
        backoff: BackoffConfig {
            base: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            factor: 2.0,
            jitter: 0.0,
        },
        delivery_timeout: Duration::from_secs(2),
        shutdown_timeout: Duration::from_secs(2),
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batch::Batch;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The attempt failed for a transient reason. The same batch will be attempted again.
    RetryableFailure {
        /// Delay requested by the collector, if any.
        retry_after: Option<Duration>,
    },
    /// The collector will never accept this batch.
    PermanentFailure { reason: String },
}

impl DeliveryOutcome {
    #[must_use]
    pub fn retryable() -> Self {
        Self::RetryableFailure { retry_after: None }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::PermanentFailure {
            reason: reason.into(),
        }
    }
}

/// Sends batches to a collector.
///
/// Only the pipeline worker calls `deliver`, one batch at a time. Implementations should bound
/// their own I/O; the worker additionally cancels calls that exceed the configured delivery
/// timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, batch: &Batch) -> DeliveryOutcome;
}

/// Accepts every batch without sending it anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTransport;

#[async_trait]
impl Transport for NoOpTransport {
    async fn deliver(&self, _batch: &Batch) -> DeliveryOutcome {
        DeliveryOutcome::Delivered
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn deliver(&self, batch: &Batch) -> DeliveryOutcome {
        (**self).deliver(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchId;
    use crate::event::{Event, Level};

    #[tokio::test]
    async fn test_noop_transport_delivers() {
        let batch = Batch::new(BatchId::new(0), vec![Event::new(Level::Info, "x")]);
        let transport: Arc<dyn Transport> = Arc::new(NoOpTransport);
        assert_eq!(transport.deliver(&batch).await, DeliveryOutcome::Delivered);
    }

    #[test]
    fn test_outcome_helpers() {
        assert_eq!(
            DeliveryOutcome::retryable(),
            DeliveryOutcome::RetryableFailure { retry_after: None }
        );
        assert_eq!(
            DeliveryOutcome::permanent("bad request"),
            DeliveryOutcome::PermanentFailure {
                reason: "bad request".to_string()
            }
        );
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only counters describing what the pipeline did with the events it was given.
//!
//! Counters are monotonic over the lifetime of a [`crate::Pipeline`], except
//! `consecutive_failures` which follows the scheduler's backoff state.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Why events were lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// The queue was at capacity when the event was enqueued.
    QueueOverflow,
    /// The event was enqueued after shutdown started.
    ShuttingDown,
    /// The batch kept failing with retryable errors until retries ran out.
    RetriesExhausted,
    /// The transport rejected the batch permanently.
    PermanentFailure,
    /// The batch was still pending when shutdown gave up on it.
    ForcedShutdown,
}

impl DiscardReason {
    pub const ALL: [DiscardReason; 5] = [
        DiscardReason::QueueOverflow,
        DiscardReason::ShuttingDown,
        DiscardReason::RetriesExhausted,
        DiscardReason::PermanentFailure,
        DiscardReason::ForcedShutdown,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueOverflow => "queue_overflow",
            Self::ShuttingDown => "shutting_down",
            Self::RetriesExhausted => "retries_exhausted",
            Self::PermanentFailure => "permanent_failure",
            Self::ForcedShutdown => "forced_shutdown",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::QueueOverflow => 0,
            Self::ShuttingDown => 1,
            Self::RetriesExhausted => 2,
            Self::PermanentFailure => 3,
            Self::ForcedShutdown => 4,
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    dropped_batches: AtomicU64,
    delivered_batches: AtomicU64,
    delivered_events: AtomicU64,
    delivery_attempts: AtomicU64,
    consecutive_failures: AtomicU32,
    lost_events: [AtomicU64; 5],
}

impl PipelineMetrics {
    pub(crate) fn record_lost(&self, reason: DiscardReason, events: usize) {
        self.lost_events[reason.index()].fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_batch(&self, reason: DiscardReason, events: usize) {
        self.dropped_batches.fetch_add(1, Ordering::Relaxed);
        self.record_lost(reason, events);
    }

    pub(crate) fn record_delivered_batch(&self, events: usize) {
        self.delivered_batches.fetch_add(1, Ordering::Relaxed);
        self.delivered_events
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        self.delivery_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_consecutive_failures(&self, failures: u32) {
        self.consecutive_failures.store(failures, Ordering::Relaxed);
    }

    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    pub fn delivered_batches(&self) -> u64 {
        self.delivered_batches.load(Ordering::Relaxed)
    }

    pub fn delivered_events(&self) -> u64 {
        self.delivered_events.load(Ordering::Relaxed)
    }

    pub fn delivery_attempts(&self) -> u64 {
        self.delivery_attempts.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn lost_events(&self, reason: DiscardReason) -> u64 {
        self.lost_events[reason.index()].load(Ordering::Relaxed)
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Events currently waiting in the queue.
    pub queued_count: usize,
    /// Events rejected at enqueue time, for any reason.
    pub dropped_event_count: u64,
    pub dropped_batch_count: u64,
    pub delivered_batch_count: u64,
    pub delivered_event_count: u64,
    pub delivery_attempts: u64,
    pub consecutive_failures: u32,
    pub(crate) lost_events: [u64; 5],
}

impl MetricsSnapshot {
    pub(crate) fn capture(
        metrics: &PipelineMetrics,
        queued_count: usize,
        dropped_event_count: u64,
    ) -> Self {
        let mut lost_events = [0; 5];
        for reason in DiscardReason::ALL {
            lost_events[reason.index()] = metrics.lost_events(reason);
        }
        Self {
            queued_count,
            dropped_event_count,
            dropped_batch_count: metrics.dropped_batches(),
            delivered_batch_count: metrics.delivered_batches(),
            delivered_event_count: metrics.delivered_events(),
            delivery_attempts: metrics.delivery_attempts(),
            consecutive_failures: metrics.consecutive_failures(),
            lost_events,
        }
    }

    /// Events lost for `reason`, whether rejected at enqueue time or dropped with their batch.
    #[must_use]
    pub fn lost(&self, reason: DiscardReason) -> u64 {
        self.lost_events[reason.index()]
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded multi-producer queue drained by the pipeline worker.
//!
//! Producers never wait on the queue beyond a short critical section: when the queue is full the
//! incoming event is dropped (drop-newest) and counted. Only the worker ever waits, for the first
//! event to show up.
//!
//! The queue also tracks how many drained events are still owned by the worker (batched, in
//! flight or waiting for a retry). They are released once their batch reaches a terminal state,
//! which lets callers tell when the whole pipeline is idle.

use crate::event::Event;
use crate::metrics::DiscardReason;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Why the queue refused an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    Full,
    Closed,
}

impl Rejected {
    #[must_use]
    pub fn reason(self) -> DiscardReason {
        match self {
            Rejected::Full => DiscardReason::QueueOverflow,
            Rejected::Closed => DiscardReason::ShuttingDown,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<Event>,
    checked_out: usize,
    closed: bool,
    last_rejected_at: Option<Instant>,
}

#[derive(Debug)]
pub struct EventQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    dropped: AtomicU64,
    notify: Notify,
}

impl EventQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity.min(4_096)),
                ..QueueState::default()
            }),
            capacity,
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adds `event` at the tail of the queue. Returns `false` when the event was dropped.
    pub fn enqueue(&self, event: Event) -> bool {
        self.try_enqueue(event).is_ok()
    }

    pub fn try_enqueue(&self, event: Event) -> Result<(), Rejected> {
        let result = {
            let mut state = self.lock();
            let result = if state.closed {
                Err(Rejected::Closed)
            } else if state.events.len() >= self.capacity {
                Err(Rejected::Full)
            } else {
                state.events.push_back(event);
                Ok(())
            };
            if result.is_err() {
                state.last_rejected_at = Some(Instant::now());
            }
            result
        };

        match result {
            Ok(()) => self.notify.notify_one(),
            Err(rejected) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event rejected by the queue: {}", rejected.reason());
            }
        }
        result
    }

    /// Waits up to `max_wait` for at least one event, then drains up to `max_count` of the events
    /// immediately available, oldest first. Returns an empty vector on timeout.
    pub async fn dequeue_up_to(&self, max_count: usize, max_wait: Duration) -> Vec<Event> {
        if max_count == 0 {
            return Vec::new();
        }
        let deadline = Instant::now() + max_wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the await is not missed.
            notified.as_mut().enable();

            let events = self.drain_now(max_count);
            if !events.is_empty() {
                return events;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    /// Drains up to `max_count` events without waiting.
    pub(crate) fn drain_now(&self, max_count: usize) -> Vec<Event> {
        let mut state = self.lock();
        let count = max_count.min(state.events.len());
        let events: Vec<Event> = state.events.drain(..count).collect();
        state.checked_out += events.len();
        events
    }

    /// Marks `count` drained events as done with, whether delivered or dropped.
    pub(crate) fn release(&self, count: usize) {
        let mut state = self.lock();
        state.checked_out = state.checked_out.saturating_sub(count);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Queued events plus drained events that have not reached a terminal state yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        let state = self.lock();
        state.events.len() + state.checked_out
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    /// Events rejected since the queue was created.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops accepting events. Queued events stay drainable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub(crate) fn reopen(&self) {
        let mut state = self.lock();
        state.closed = false;
        state.checked_out = 0;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether an event was rejected during the last `window`.
    #[must_use]
    pub fn rejected_within(&self, window: Duration) -> bool {
        self.lock()
            .last_rejected_at
            .is_some_and(|at| at.elapsed() < window)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

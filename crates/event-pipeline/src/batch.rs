// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::event::Event;
use std::fmt;
use tokio::time::Instant;
use tracing::warn;

/// Monotonic identifier of a batch within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An ordered group of events delivered together.
///
/// Events keep the order in which the queue accepted them. A batch never holds more than the
/// configured count, and never exceeds the configured byte size unless it holds exactly one
/// oversized event.
#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    events: Vec<Event>,
    size_bytes: usize,
    created_at: Instant,
}

impl Batch {
    /// Builds a batch directly from `events`, bypassing any size limit.
    #[must_use]
    pub fn new(id: BatchId, events: Vec<Event>) -> Self {
        let size_bytes = events.iter().map(Event::size_hint).sum();
        Self {
            id,
            events,
            size_bytes,
            created_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sum of the events' size hints.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// When the first event entered the batch.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

/// Accumulates events into a batch while enforcing count and byte limits.
#[derive(Debug)]
pub(crate) struct BatchBuilder {
    events: Vec<Event>,
    size_bytes: usize,
    opened_at: Option<Instant>,
    max_count: usize,
    max_bytes: usize,
}

impl BatchBuilder {
    pub(crate) fn new(max_count: usize, max_bytes: usize) -> Self {
        Self {
            events: Vec::with_capacity(max_count),
            size_bytes: 0,
            opened_at: None,
            max_count,
            max_bytes,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.events.len() >= self.max_count
    }

    pub(crate) fn remaining_capacity(&self) -> usize {
        self.max_count.saturating_sub(self.events.len())
    }

    pub(crate) fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Adds `event` to the batch, or hands it back if it would push the batch over a limit.
    ///
    /// An empty builder accepts any event, so an event larger than the byte limit ends up alone
    /// in its own batch instead of being rejected.
    pub(crate) fn try_push(&mut self, event: Event) -> Result<(), Event> {
        if self.events.is_empty() {
            if event.size_hint() > self.max_bytes {
                warn!(
                    "Event {} is {} bytes, above the {} bytes batch limit. Sending it alone.",
                    event.id(),
                    event.size_hint(),
                    self.max_bytes
                );
            }
            self.opened_at = Some(Instant::now());
        } else if self.is_full()
            || self.size_bytes.saturating_add(event.size_hint()) > self.max_bytes
        {
            return Err(event);
        }

        self.size_bytes = self.size_bytes.saturating_add(event.size_hint());
        self.events.push(event);
        Ok(())
    }

    /// Closes the current batch. Returns `None` when no event was added since the last close.
    pub(crate) fn build(&mut self, id: BatchId) -> Option<Batch> {
        if self.events.is_empty() {
            return None;
        }
        let events = std::mem::replace(&mut self.events, Vec::with_capacity(self.max_count));
        let created_at = self.opened_at.take().unwrap_or_else(Instant::now);
        let size_bytes = std::mem::take(&mut self.size_bytes);
        Some(Batch {
            id,
            events,
            size_bytes,
            created_at,
        })
    }
}

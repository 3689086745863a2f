// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batch::{Batch, BatchBuilder, BatchId};
use crate::event::Event;
use crate::queue::EventQueue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Signals from the controller that make the batcher stop lingering.
#[derive(Debug, Default)]
pub(crate) struct FlushControl {
    requested: AtomicBool,
    draining: AtomicBool,
    signal: Notify,
}

impl FlushControl {
    /// Asks the batcher to hand over its partial batch and everything queued without lingering.
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.signal.notify_one();
    }

    /// Like [`FlushControl::request`], but the batcher stops once nothing is left.
    pub(crate) fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
        self.signal.notify_one();
    }

    fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}

/// Single consumer of the queue. Turns events into batches.
pub(crate) struct Batcher {
    queue: Arc<EventQueue>,
    control: Arc<FlushControl>,
    builder: BatchBuilder,
    // Drained events that did not fit in the batch that was open. They are older than anything
    // still in the queue.
    carry: VecDeque<Event>,
    linger: Duration,
    next_id: u64,
    flushing: bool,
}

impl Batcher {
    pub(crate) fn new(
        queue: Arc<EventQueue>,
        control: Arc<FlushControl>,
        max_count: usize,
        max_bytes: usize,
        linger: Duration,
    ) -> Self {
        Self {
            queue,
            control,
            builder: BatchBuilder::new(max_count, max_bytes),
            carry: VecDeque::new(),
            linger,
            next_id: 0,
            flushing: false,
        }
    }

    /// Waits for the next batch to close.
    ///
    /// A batch closes when it is full, when the next event would push it over the byte limit, or
    /// once it has been open for the linger timeout. A flush request closes it right away.
    /// Returns `None` when cancelled, or when draining and nothing is left.
    pub(crate) async fn next_batch(&mut self, cancel: &CancellationToken) -> Option<Batch> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(batch) = self.absorb_carry() {
                return Some(batch);
            }

            self.flushing |= self.control.take_request();
            let draining = self.control.is_draining();
            if self.flushing || draining {
                let events = self.queue.drain_now(self.builder.remaining_capacity());
                if let Some(batch) = self.absorb(events) {
                    return Some(batch);
                }
                if let Some(batch) = self.close() {
                    return Some(batch);
                }
                self.flushing = false;
                if draining {
                    debug!("Batcher drained");
                    return None;
                }
                continue;
            }

            let linger_left = match self.builder.opened_at() {
                Some(opened_at) => {
                    let age = opened_at.elapsed();
                    if age >= self.linger {
                        if let Some(batch) = self.close() {
                            return Some(batch);
                        }
                        continue;
                    }
                    self.linger - age
                }
                None => self.linger,
            };

            let room = self.builder.remaining_capacity();
            let events = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = self.control.signal.notified() => continue,
                events = self.queue.dequeue_up_to(room, linger_left) => events,
            };
            if let Some(batch) = self.absorb(events) {
                return Some(batch);
            }
        }
    }

    /// Groups everything the batcher and the queue still hold into batches, without waiting.
    pub(crate) fn drain_remaining(&mut self) -> Vec<Batch> {
        self.carry.extend(self.queue.drain_now(usize::MAX));
        let mut batches = Vec::new();
        while let Some(batch) = self.absorb_carry().or_else(|| self.close()) {
            batches.push(batch);
        }
        batches
    }

    fn absorb(&mut self, events: Vec<Event>) -> Option<Batch> {
        self.carry.extend(events);
        self.absorb_carry()
    }

    fn absorb_carry(&mut self) -> Option<Batch> {
        while let Some(event) = self.carry.pop_front() {
            if let Err(event) = self.builder.try_push(event) {
                self.carry.push_front(event);
                return self.close();
            }
        }
        if self.builder.is_full() {
            self.close()
        } else {
            None
        }
    }

    fn close(&mut self) -> Option<Batch> {
        if self.builder.is_empty() {
            return None;
        }
        let batch = self.builder.build(BatchId::new(self.next_id))?;
        self.next_id += 1;
        debug!(
            "Closed batch {} with {} events ({} bytes)",
            batch.id(),
            batch.len(),
            batch.size_bytes()
        );
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use tokio::time::Instant;

    const LINGER: Duration = Duration::from_secs(5);

    fn setup(
        capacity: usize,
        max_count: usize,
        max_bytes: usize,
    ) -> (Arc<EventQueue>, Arc<FlushControl>, Batcher) {
        let queue = Arc::new(EventQueue::new(capacity));
        let control = Arc::new(FlushControl::default());
        let batcher = Batcher::new(
            Arc::clone(&queue),
            Arc::clone(&control),
            max_count,
            max_bytes,
            LINGER,
        );
        (queue, control, batcher)
    }

    fn fill(queue: &EventQueue, count: usize, size: usize) {
        for i in 0..count {
            assert!(queue.enqueue(Event::new(Level::Info, i.to_string()).with_size_hint(size)));
        }
    }

    fn labels(batch: &Batch) -> Vec<String> {
        batch
            .events()
            .iter()
            .map(|e| String::from_utf8_lossy(e.payload()).into_owned())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_closes_after_linger() {
        let (queue, _control, mut batcher) = setup(100, 10, 1_000);
        fill(&queue, 3, 1);
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let batch = batcher.next_batch(&cancel).await.expect("batch expected");
        assert_eq!(batch.len(), 3);
        assert!(started.elapsed() >= LINGER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batches_close_immediately() {
        let (queue, _control, mut batcher) = setup(100, 10, 1_000);
        fill(&queue, 25, 1);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let first = batcher.next_batch(&cancel).await.expect("batch expected");
        let second = batcher.next_batch(&cancel).await.expect("batch expected");
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 10);
        assert_eq!(first.id(), BatchId::new(0));
        assert_eq!(second.id(), BatchId::new(1));

        let third = batcher.next_batch(&cancel).await.expect("batch expected");
        assert_eq!(labels(&third), vec!["20", "21", "22", "23", "24"]);
        // Events stay checked out until the scheduler releases them.
        assert_eq!(queue.outstanding(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trickle_does_not_extend_linger() {
        let (queue, _control, mut batcher) = setup(100, 100, 1_000);
        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            for i in 0..20 {
                producer.enqueue(Event::new(Level::Info, i.to_string()));
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let batch = batcher.next_batch(&cancel).await.expect("batch expected");
        assert!(started.elapsed() <= LINGER + Duration::from_secs(1));
        assert!(batch.len() < 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_byte_overflow_seeds_next_batch() {
        let (queue, control, mut batcher) = setup(100, 10, 10);
        fill(&queue, 3, 6);
        control.request();
        let cancel = CancellationToken::new();

        for expected in ["0", "1", "2"] {
            let batch = batcher.next_batch(&cancel).await.expect("batch expected");
            assert_eq!(labels(&batch), vec![expected]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_request_bypasses_linger() {
        let (queue, control, mut batcher) = setup(100, 10, 1_000);
        fill(&queue, 3, 1);
        let cancel = CancellationToken::new();

        let flusher = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flusher.request();
        });

        let started = Instant::now();
        let batch = batcher.next_batch(&cancel).await.expect("batch expected");
        assert_eq!(batch.len(), 3);
        assert!(started.elapsed() < LINGER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_stops_when_empty() {
        let (queue, control, mut batcher) = setup(100, 4, 1_000);
        fill(&queue, 6, 1);
        control.begin_drain();
        let cancel = CancellationToken::new();

        assert_eq!(batcher.next_batch(&cancel).await.map(|b| b.len()), Some(4));
        assert_eq!(batcher.next_batch(&cancel).await.map(|b| b.len()), Some(2));
        assert!(batcher.next_batch(&cancel).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_none() {
        let (_queue, _control, mut batcher) = setup(100, 4, 1_000);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        assert!(batcher.next_batch(&cancel).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_remaining_groups_leftovers() {
        let (queue, _control, mut batcher) = setup(100, 10, 1_000);
        fill(&queue, 25, 1);

        let batches = batcher.drain_remaining();
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(queue.is_empty());
        assert!(batcher.drain_remaining().is_empty());
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::backoff::BackoffState;
use crate::batch::Batch;
use crate::batcher::{Batcher, FlushControl};
use crate::config::PipelineConfig;
use crate::constants::{IDLE_POLL_INTERVAL, REJECTION_HEALTH_WINDOW};
use crate::error::PipelineError;
use crate::event::Event;
use crate::metrics::{DiscardReason, MetricsSnapshot, PipelineMetrics};
use crate::queue::EventQueue;
use crate::scheduler::{DropCallback, ForcedDrops, Scheduler};
use crate::transport::Transport;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No worker is running. Before the first `start` events are queued and delivered once
    /// started. After a shutdown they are rejected until the pipeline is started again.
    Stopped,
    Running,
    /// Shutdown in progress: new events are rejected, outstanding batches are being flushed.
    Draining,
}

/// What a shutdown had to give up on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Batches dropped because the worker was stopped before they were delivered.
    pub dropped_batches: usize,
    pub dropped_events: usize,
    /// Whether the graceful shutdown ran out of time.
    pub timed_out: bool,
}

/// Cheap, cloneable producer side of a [`Pipeline`].
///
/// Safe to share with any thread; enqueueing never needs a tokio runtime.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    queue: Arc<EventQueue>,
    metrics: Arc<PipelineMetrics>,
    state: Arc<RwLock<LifecycleState>>,
}

impl PipelineHandle {
    /// Hands `event` to the pipeline. Returns `false` when it was dropped (queue full or
    /// shutting down). Never blocks beyond a short critical section.
    pub fn enqueue(&self, event: Event) -> bool {
        match self.queue.try_enqueue(event) {
            Ok(()) => true,
            Err(rejected) => {
                self.metrics.record_lost(rejected.reason(), 1);
                false
            }
        }
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::capture(&self.metrics, self.queue.len(), self.queue.dropped_count())
    }

    /// `false` while deliveries are failing, or shortly after the queue rejected an event.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.metrics.consecutive_failures() == 0
            && !self.queue.rejected_within(REJECTION_HEALTH_WINDOW)
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

struct Worker {
    join: JoinHandle<ForcedDrops>,
    cancel: CancellationToken,
    control: Arc<FlushControl>,
}

/// Owns the queue, the background worker and their lifecycle.
///
/// ```no_run
/// # async fn example() -> Result<(), event_pipeline::PipelineError> {
/// use event_pipeline::{Event, Level, NoOpTransport, Pipeline, PipelineConfig};
/// use std::time::Duration;
///
/// let mut pipeline = Pipeline::new(PipelineConfig::default(), NoOpTransport)?;
/// pipeline.start()?;
///
/// let handle = pipeline.handle();
/// std::thread::spawn(move || handle.enqueue(Event::new(Level::Info, "hello")));
///
/// let report = pipeline.shutdown(Duration::from_secs(2)).await?;
/// assert_eq!(report.dropped_events, 0);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    transport: Arc<dyn Transport>,
    on_drop: Option<DropCallback>,
    handle: PipelineHandle,
    worker: Option<Worker>,
}

impl Pipeline {
    /// Builds a stopped pipeline. Fails if `config` does not validate.
    pub fn new(
        config: PipelineConfig,
        transport: impl Transport + 'static,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let handle = PipelineHandle {
            queue: Arc::new(EventQueue::new(config.capacity)),
            metrics: Arc::new(PipelineMetrics::default()),
            state: Arc::new(RwLock::new(LifecycleState::Stopped)),
        };
        Ok(Self {
            config,
            transport: Arc::new(transport),
            on_drop: None,
            handle,
            worker: None,
        })
    }

    /// Registers a callback invoked with every batch the pipeline drops, and why.
    ///
    /// The callback runs on the worker task and must not block.
    #[must_use]
    pub fn with_drop_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Batch, DiscardReason) + Send + Sync + 'static,
    {
        self.on_drop = Some(Arc::new(callback));
        self
    }

    /// Spawns the background worker on the current tokio runtime. Does nothing if already
    /// running.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.worker.is_some() {
            debug!("Pipeline already running");
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        let queue = Arc::clone(&self.handle.queue);
        queue.reopen();
        // The new worker starts with a fresh backoff state.
        self.handle.metrics.set_consecutive_failures(0);
        let control = Arc::new(FlushControl::default());
        let cancel = CancellationToken::new();
        let scheduler = Scheduler {
            batcher: Batcher::new(
                Arc::clone(&queue),
                Arc::clone(&control),
                self.config.max_batch_count,
                self.config.max_batch_bytes,
                self.config.linger_timeout,
            ),
            transport: Arc::clone(&self.transport),
            backoff: BackoffState::new(self.config.backoff),
            queue,
            metrics: Arc::clone(&self.handle.metrics),
            on_drop: self.on_drop.clone(),
            max_retries: self.config.max_retries,
            delivery_timeout: self.config.delivery_timeout,
            cancel: cancel.clone(),
        };

        let join = runtime.spawn(scheduler.run());
        self.worker = Some(Worker {
            join,
            cancel,
            control,
        });
        self.handle.set_state(LifecycleState::Running);
        info!("Event pipeline started");
        Ok(())
    }

    /// Stops accepting events and delivers what is outstanding, waiting at most `timeout`.
    /// Anything still pending after that is dropped and counted in the report.
    ///
    /// A stopped pipeline returns an empty report.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<ShutdownReport, PipelineError> {
        let Some(mut worker) = self.begin_shutdown() else {
            return Ok(ShutdownReport::default());
        };
        worker.control.begin_drain();

        let (joined, timed_out) = match tokio::time::timeout(timeout, &mut worker.join).await {
            Ok(joined) => (joined, false),
            Err(_) => {
                warn!(
                    "Pipeline did not drain within {:?}, dropping pending events",
                    timeout
                );
                worker.cancel.cancel();
                ((&mut worker.join).await, true)
            }
        };
        self.finish_shutdown(joined, timed_out)
    }

    /// Stops immediately, dropping everything queued or in flight.
    pub async fn shutdown_now(&mut self) -> Result<ShutdownReport, PipelineError> {
        let Some(worker) = self.begin_shutdown() else {
            return Ok(ShutdownReport::default());
        };
        worker.cancel.cancel();
        let joined = worker.join.await;
        self.finish_shutdown(joined, false)
    }

    /// Delivers everything accepted so far without waiting for batches to linger.
    ///
    /// Returns `true` once nothing is queued or in flight, `false` if `timeout` expired first.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let Some(worker) = &self.worker else {
            return self.handle.queue.is_idle();
        };
        worker.control.request();

        let deadline = Instant::now() + timeout;
        loop {
            if self.handle.queue.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    "Flush timed out with {} events outstanding",
                    self.handle.queue.outstanding()
                );
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Shortcut for [`PipelineHandle::enqueue`].
    pub fn enqueue(&self, event: Event) -> bool {
        self.handle.enqueue(event)
    }

    #[must_use]
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.handle.metrics()
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.handle.is_healthy()
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.handle.state()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn begin_shutdown(&mut self) -> Option<Worker> {
        let worker = self.worker.take()?;
        self.handle.set_state(LifecycleState::Draining);
        self.handle.queue.close();
        Some(worker)
    }

    fn finish_shutdown(
        &mut self,
        joined: Result<ForcedDrops, tokio::task::JoinError>,
        timed_out: bool,
    ) -> Result<ShutdownReport, PipelineError> {
        self.handle.set_state(LifecycleState::Stopped);
        let forced = joined.map_err(|e| PipelineError::Worker(e.to_string()))?;
        let report = ShutdownReport {
            dropped_batches: forced.batches,
            dropped_events: forced.events,
            timed_out,
        };
        info!(
            "Event pipeline stopped (dropped {} batches, {} events)",
            report.dropped_batches, report.dropped_events
        );
        Ok(report)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!("Pipeline dropped while running, cancelling worker");
            worker.cancel.cancel();
        }
    }
}

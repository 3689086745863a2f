// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process telemetry event pipeline.
//!
//! Producers hand discrete events (log records, error reports, spans) to a bounded queue without
//! ever blocking. A single background worker drains the queue into size- and count-bounded
//! batches, and delivers them one at a time through an injected [`transport::Transport`],
//! retrying transient failures with exponential backoff.
//!
//! ```text
//!   producer threads ──enqueue──> EventQueue ──drain──> Batcher ──Batch──> Scheduler ──> Transport
//!                                                                      ^                  │
//!                                                                      └──── outcome ─────┘
//! ```
//!
//! The pipeline fails open: when the queue is full, the collector is unreachable or shutdown
//! runs out of time, telemetry is dropped and accounted for in [`metrics`], never surfaced as an
//! error to the instrumented application.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backoff;
pub mod batch;
mod batcher;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod http_transport;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod transport;

pub use batch::{Batch, BatchId};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use event::{Event, EventId, Level};
pub use metrics::{DiscardReason, MetricsSnapshot};
pub use pipeline::{LifecycleState, Pipeline, PipelineHandle, ShutdownReport};
pub use transport::{DeliveryOutcome, NoOpTransport, Transport};

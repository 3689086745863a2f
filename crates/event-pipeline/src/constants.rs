// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Maximum number of events buffered in the queue before new events are rejected.
pub const DEFAULT_CAPACITY: usize = 1_000;

/// Maximum number of events in a single batch.
pub const DEFAULT_MAX_BATCH_COUNT: usize = 100;

/// Maximum aggregate size of a batch, using the events' size hints (1MB).
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1_024 * 1_024;

/// How long a partial batch may stay open waiting for more events.
pub const DEFAULT_LINGER_TIMEOUT: Duration = Duration::from_secs(5);

/// Re-attempts after the first delivery attempt of a batch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;

/// Upper bound for a single call into the transport.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Time a graceful shutdown waits for outstanding batches.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// A queue rejection keeps the pipeline reported as unhealthy for this long.
pub const REJECTION_HEALTH_WINDOW: Duration = Duration::from_secs(5);

/// Polling interval used while waiting for the pipeline to become idle.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Delay applied to a 429 response that carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

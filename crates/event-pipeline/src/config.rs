// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::backoff::BackoffConfig;
use crate::constants::{
    DEFAULT_CAPACITY, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_LINGER_TIMEOUT, DEFAULT_MAX_BATCH_BYTES,
    DEFAULT_MAX_BATCH_COUNT, DEFAULT_MAX_RETRIES, DEFAULT_SHUTDOWN_TIMEOUT,
};
use crate::error::PipelineError;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Tuning knobs of the event pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum number of events waiting in the queue.
    pub capacity: usize,
    /// Maximum number of events per batch.
    pub max_batch_count: usize,
    /// Maximum aggregate size hint of a batch, in bytes.
    pub max_batch_bytes: usize,
    /// How long a partial batch waits for more events before being sent.
    pub linger_timeout: Duration,
    /// Re-attempts allowed after the first attempt of a batch.
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    /// Upper bound of a single transport call.
    pub delivery_timeout: Duration,
    /// Default graceful shutdown budget, for callers that do not pick their own.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            linger_timeout: DEFAULT_LINGER_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffConfig::default(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from `EVENT_PIPELINE_*` environment variables, falling back to the
    /// defaults for unset or unparsable values.
    pub fn from_env() -> Result<Self, PipelineError> {
        let defaults = Self::default();
        let config = Self {
            capacity: env_or("EVENT_PIPELINE_CAPACITY", defaults.capacity),
            max_batch_count: env_or("EVENT_PIPELINE_MAX_BATCH_COUNT", defaults.max_batch_count),
            max_batch_bytes: env_or("EVENT_PIPELINE_MAX_BATCH_BYTES", defaults.max_batch_bytes),
            linger_timeout: env_millis_or("EVENT_PIPELINE_LINGER_MS", defaults.linger_timeout),
            max_retries: env_or("EVENT_PIPELINE_MAX_RETRIES", defaults.max_retries),
            backoff: BackoffConfig {
                base: env_millis_or("EVENT_PIPELINE_BACKOFF_BASE_MS", defaults.backoff.base),
                max_backoff: env_millis_or(
                    "EVENT_PIPELINE_BACKOFF_MAX_MS",
                    defaults.backoff.max_backoff,
                ),
                factor: env_or("EVENT_PIPELINE_BACKOFF_FACTOR", defaults.backoff.factor),
                jitter: env_or("EVENT_PIPELINE_BACKOFF_JITTER", defaults.backoff.jitter),
            },
            delivery_timeout: env_millis_or(
                "EVENT_PIPELINE_DELIVERY_TIMEOUT_MS",
                defaults.delivery_timeout,
            ),
            shutdown_timeout: env_millis_or(
                "EVENT_PIPELINE_SHUTDOWN_TIMEOUT_MS",
                defaults.shutdown_timeout,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.capacity == 0 {
            return Err(invalid("capacity must be greater than 0"));
        }
        if self.max_batch_count == 0 {
            return Err(invalid("max_batch_count must be greater than 0"));
        }
        if self.max_batch_bytes == 0 {
            return Err(invalid("max_batch_bytes must be greater than 0"));
        }
        if self.linger_timeout.is_zero() {
            return Err(invalid("linger_timeout must be greater than 0"));
        }
        if self.delivery_timeout.is_zero() {
            return Err(invalid("delivery_timeout must be greater than 0"));
        }

        let backoff = &self.backoff;
        if !backoff.factor.is_finite() || backoff.factor <= 1.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "backoff factor must be a finite number > 1, got {}",
                backoff.factor
            )));
        }
        // A fully jittered delay must still exceed the previous unjittered one.
        let max_jitter = 1.0 - 1.0 / backoff.factor;
        if !(0.0..max_jitter).contains(&backoff.jitter) {
            return Err(PipelineError::InvalidConfig(format!(
                "backoff jitter must be within [0, {max_jitter}) for factor {}, got {}",
                backoff.factor, backoff.jitter
            )));
        }
        if backoff.base > backoff.max_backoff {
            return Err(PipelineError::InvalidConfig(format!(
                "backoff base ({:?}) must not exceed the maximum backoff ({:?})",
                backoff.base, backoff.max_backoff
            )));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> PipelineError {
    PipelineError::InvalidConfig(message.to_string())
}

fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable value '{raw}' for {name}");
            default
        }),
        Err(_) => default,
    }
}

fn env_millis_or(name: &str, default: Duration) -> Duration {
    let millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_or(name, millis))
}

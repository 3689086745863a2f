// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_FACTOR, DEFAULT_BACKOFF_JITTER, DEFAULT_BACKOFF_MAX,
};
use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff policy applied between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub base: Duration,
    /// Ceiling for the computed delay. A server-suggested delay may exceed it.
    pub max_backoff: Duration,
    /// Multiplier applied for every additional consecutive failure. Must be above 1.
    pub factor: f64,
    /// Fraction of the delay that may be randomly shaved off.
    ///
    /// Must stay below `1 - 1 / factor` so that every retry below the ceiling waits strictly
    /// longer than the one before, whatever the random draw.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max_backoff: DEFAULT_BACKOFF_MAX,
            factor: DEFAULT_BACKOFF_FACTOR,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

/// Tracks consecutive failures and when the next attempt is allowed.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    consecutive_failures: u32,
    next_allowed_attempt: Option<Instant>,
    rng: fastrand::Rng,
}

impl BackoffState {
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, fastrand::Rng::new())
    }

    /// Same as [`BackoffState::new`] with a deterministic jitter source.
    #[must_use]
    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self::with_rng(config, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(config: BackoffConfig, rng: fastrand::Rng) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            next_allowed_attempt: None,
            rng,
        }
    }

    /// Registers a failure observed at `now` and returns the delay before the next attempt.
    ///
    /// `suggested` is a delay requested by the collector (e.g. `Retry-After`); the larger of it
    /// and the computed backoff wins.
    pub fn register_failure(&mut self, now: Instant, suggested: Option<Duration>) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let computed = self.compute_delay();
        let delay = suggested.map_or(computed, |suggested| suggested.max(computed));
        self.next_allowed_attempt = Some(now + delay);
        delay
    }

    pub fn register_success(&mut self) {
        self.consecutive_failures = 0;
        self.next_allowed_attempt = None;
    }

    /// How long to wait from `now` before the next attempt may start.
    #[must_use]
    pub fn time_until_next_attempt(&self, now: Instant) -> Duration {
        self.next_allowed_attempt
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn compute_delay(&mut self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(1).min(100) as i32;
        let max_secs = self.config.max_backoff.as_secs_f64();
        let secs = (self.config.base.as_secs_f64() * self.config.factor.powi(exponent)).min(max_secs);
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let jittered = secs * (1.0 - jitter * self.rng.f64());
        Duration::try_from_secs_f64(jittered).unwrap_or(self.config.max_backoff)
    }
}

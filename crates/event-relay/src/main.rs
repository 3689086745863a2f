// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use event_pipeline::{
    http_transport::{HttpTransport, HttpTransportConfig},
    Batch, DiscardReason, Event, Level, NoOpTransport, Pipeline, PipelineConfig, PipelineError,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("EVENT_RELAY_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid pipeline configuration: {e}. Shutting down event relay.");
            return;
        }
    };

    let mut pipeline = match build_pipeline(config.clone()) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Unable to create event pipeline: {e}. Shutting down event relay.");
            return;
        }
    };
    if let Err(e) = pipeline.start() {
        error!("Unable to start event pipeline: {e}. Shutting down event relay.");
        return;
    }

    relay_stdin(&pipeline).await;

    match pipeline.shutdown(config.shutdown_timeout).await {
        Ok(report) => {
            let metrics = pipeline.metrics();
            info!(
                "Event relay stopped: {} events delivered in {} batches, {} rejected, {} batches dropped ({} force-dropped at shutdown{})",
                metrics.delivered_event_count,
                metrics.delivered_batch_count,
                metrics.dropped_event_count,
                metrics.dropped_batch_count,
                report.dropped_batches,
                if report.timed_out { ", timed out" } else { "" }
            );
        }
        Err(e) => error!("Event pipeline shutdown failed: {e}"),
    }
}

fn build_pipeline(config: PipelineConfig) -> Result<Pipeline, PipelineError> {
    let pipeline = match env::var("EVENT_RELAY_URL") {
        Ok(url) => {
            info!("Relaying events to {url}");
            let compression_level = env::var("EVENT_RELAY_COMPRESSION_LEVEL")
                .ok()
                .and_then(|level| level.parse().ok());
            let mut transport_config = HttpTransportConfig {
                api_key: env::var("EVENT_RELAY_API_KEY").ok(),
                timeout: DEFAULT_REQUEST_TIMEOUT.min(config.delivery_timeout),
                compression_level,
                https_proxy: env::var("EVENT_RELAY_HTTPS_PROXY")
                    .or_else(|_| env::var("HTTPS_PROXY"))
                    .ok(),
                ..HttpTransportConfig::new(url)
            };
            if let Ok(header) = env::var("EVENT_RELAY_API_KEY_HEADER") {
                transport_config.api_key_header = header;
            }
            let transport = HttpTransport::new(transport_config)
                .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
            Pipeline::new(config, transport)?
        }
        Err(_) => {
            warn!("EVENT_RELAY_URL is not set, events will be discarded");
            Pipeline::new(config, NoOpTransport)?
        }
    };

    Ok(pipeline.with_drop_callback(|batch: &Batch, reason: DiscardReason| {
        warn!(
            "Dropped batch {} with {} events: {reason}",
            batch.id(),
            batch.len()
        );
    }))
}

/// Enqueues every stdin line as an `info` event until EOF or Ctrl-C.
async fn relay_stdin(pipeline: &Pipeline) {
    let handle = pipeline.handle();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if !handle.enqueue(Event::new(Level::Info, line)) {
                        debug!("Event dropped by the pipeline");
                    }
                }
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from stdin: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }
}

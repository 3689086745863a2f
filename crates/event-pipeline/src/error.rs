// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while configuring or driving the pipeline lifecycle.
///
/// Delivery problems never show up here: they are absorbed by the worker and only visible
/// through metrics.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to run the pipeline worker")]
    NoRuntime,

    #[error("Pipeline worker failed: {0}")]
    Worker(String),
}

/// Errors raised while building the HTTP transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid collector URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid header {0}")]
    InvalidHeader(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use event_pipeline::http_transport::{HttpTransport, HttpTransportConfig};
use event_pipeline::{
    Batch, BatchId, DeliveryOutcome, Event, Level, Pipeline, PipelineConfig, Transport,
};
use mockito::{Matcher, Server};
use std::time::Duration;

fn batch() -> Batch {
    Batch::new(
        BatchId::new(1),
        vec![
            Event::new(Level::Error, r#"{"message":"boom"}"#),
            Event::new(Level::Info, "plain text"),
        ],
    )
}

fn transport(url: String, compression_level: Option<i32>) -> HttpTransport {
    HttpTransport::new(HttpTransportConfig {
        api_key: Some("mock-api-key".to_string()),
        timeout: Duration::from_secs(5),
        compression_level,
        ..HttpTransportConfig::new(url)
    })
    .expect("failed to build transport")
}

#[tokio::test]
async fn posts_json_envelopes() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_header("X-Api-Key", "mock-api-key")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""payload":\{"message":"boom"\}"#.to_string()),
            Matcher::Regex(r#""payload":"plain text""#.to_string()),
            Matcher::Regex(r#""level":"error""#.to_string()),
        ]))
        .with_status(202)
        .create_async()
        .await;

    let outcome = transport(format!("{}/events", server.url()), None)
        .deliver(&batch())
        .await;

    assert_eq!(outcome, DeliveryOutcome::Delivered);
    mock.assert_async().await;
}

#[tokio::test]
async fn api_key_header_is_configurable() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_header("Authorization-Token", "mock-api-key")
        .match_header("X-Api-Key", Matcher::Missing)
        .with_status(200)
        .create_async()
        .await;

    let transport = HttpTransport::new(HttpTransportConfig {
        api_key: Some("mock-api-key".to_string()),
        api_key_header: "Authorization-Token".to_string(),
        ..HttpTransportConfig::new(format!("{}/events", server.url()))
    })
    .expect("failed to build transport");

    assert_eq!(transport.deliver(&batch()).await, DeliveryOutcome::Delivered);
    mock.assert_async().await;
}

#[tokio::test]
async fn compresses_with_zstd() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_header("Content-Encoding", "zstd")
        .with_status(200)
        .create_async()
        .await;

    let outcome = transport(format!("{}/events", server.url()), Some(3))
        .deliver(&batch())
        .await;

    assert_eq!(outcome, DeliveryOutcome::Delivered);
    mock.assert_async().await;
}

#[tokio::test]
async fn classifies_error_statuses() {
    let mut server = Server::new_async().await;
    let cases = [
        (503, DeliveryOutcome::retryable()),
        (500, DeliveryOutcome::retryable()),
        (408, DeliveryOutcome::retryable()),
        (
            400,
            DeliveryOutcome::permanent("collector answered 400 Bad Request"),
        ),
        (
            413,
            DeliveryOutcome::permanent("collector answered 413 Payload Too Large"),
        ),
    ];

    for (status, expected) in cases {
        let path = format!("/status/{status}");
        let mock = server
            .mock("POST", path.as_str())
            .with_status(status)
            .create_async()
            .await;

        let outcome = transport(format!("{}{path}", server.url()), None)
            .deliver(&batch())
            .await;
        assert_eq!(outcome, expected, "status {status}");
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn too_many_requests_honours_retry_after() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/events")
        .with_status(429)
        .with_header("Retry-After", "7")
        .create_async()
        .await;

    let outcome = transport(format!("{}/events", server.url()), None)
        .deliver(&batch())
        .await;

    assert_eq!(
        outcome,
        DeliveryOutcome::RetryableFailure {
            retry_after: Some(Duration::from_secs(7))
        }
    );
}

#[tokio::test]
async fn unreachable_collector_is_retryable() {
    // Nothing listens on the discard port.
    let outcome = transport("http://127.0.0.1:9/events".to_string(), None)
        .deliver(&batch())
        .await;
    assert_eq!(outcome, DeliveryOutcome::retryable());
}

#[tokio::test]
async fn pipeline_delivers_through_http() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/events")
        .match_header("X-Api-Key", "mock-api-key")
        .with_status(202)
        .expect(3)
        .create_async()
        .await;

    let config = PipelineConfig {
        max_batch_count: 4,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(
        config,
        transport(format!("{}/events", server.url()), Some(1)),
    )
    .expect("valid config");
    pipeline.start().expect("failed to start");

    for i in 0..10 {
        assert!(pipeline.enqueue(Event::new(Level::Info, format!("event {i}"))));
    }
    let report = pipeline
        .shutdown(Duration::from_secs(10))
        .await
        .expect("shutdown failed");

    assert_eq!(report.dropped_events, 0);
    let metrics = pipeline.metrics();
    assert_eq!(metrics.delivered_batch_count, 3);
    assert_eq!(metrics.delivered_event_count, 10);
    mock.assert_async().await;
}

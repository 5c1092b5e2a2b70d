//! Integration tests for the HTTP generation client against a mock provider
//!
//! Exercises the wire protocol end to end: request shape, credential
//! header, error classification by status code and status string, empty
//! completion guarding, and SSE fragment decoding.

use std::time::Duration;

use futures::StreamExt;
use modelrelay::backoff::{BackoffPolicy, ErrorClass};
use modelrelay::provider::{
    FinishReason, Fragment, GenerationClient, GenerationRequest, HttpGenerationClient,
    ProviderError,
};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpGenerationClient {
    HttpGenerationClient::new(server.uri(), "test-key", Duration::from_secs(5))
        .expect("client builds")
}

fn request() -> GenerationRequest {
    GenerationRequest::new("what is a relay?")
        .expect("valid request")
        .with_max_output_tokens(128)
        .expect("valid budget")
}

#[tokio::test]
async fn test_buffered_success_returns_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "a relay forwards things" }] },
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client_for(&server)
        .call_buffered("relay-pro", &request())
        .await
        .expect("should succeed");

    assert_eq!(completion.text, "a relay forwards things");
    assert_eq!(completion.finish_reason, FinishReason::NaturalStop);
}

#[tokio::test]
async fn test_buffered_length_capped_finish_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "truncated answ" }] },
                "finishReason": "MAX_TOKENS"
            }]
        })))
        .mount(&server)
        .await;

    let completion = client_for(&server)
        .call_buffered("relay-pro", &request())
        .await
        .expect("should succeed");

    assert_eq!(completion.finish_reason, FinishReason::LengthCapped);
}

#[tokio::test]
async fn test_429_maps_to_rate_limited_and_classifies_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .call_buffered("relay-pro", &request())
        .await
        .expect_err("should fail");

    assert!(matches!(error, ProviderError::RateLimited { .. }), "{error}");
    assert_eq!(
        BackoffPolicy::default().classify(&error),
        ErrorClass::Transient
    );
}

#[tokio::test]
async fn test_503_maps_to_overloaded_and_classifies_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:generateContent"))
        .respond_with(ResponseTemplate::new(503).set_body_string("no capacity"))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .call_buffered("relay-pro", &request())
        .await
        .expect_err("should fail");

    assert!(matches!(error, ProviderError::Overloaded { .. }), "{error}");
    assert_eq!(
        BackoffPolicy::default().classify(&error),
        ErrorClass::Transient
    );
}

#[tokio::test]
async fn test_400_maps_to_api_error_and_classifies_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "prompt was rejected", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .call_buffered("relay-pro", &request())
        .await
        .expect_err("should fail");

    match &error {
        ProviderError::Api { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "prompt was rejected");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(BackoffPolicy::default().classify(&error), ErrorClass::Fatal);
}

#[tokio::test]
async fn test_blank_completion_is_empty_completion_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "   " }] },
                "finishReason": "STOP"
            }]
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .call_buffered("relay-pro", &request())
        .await
        .expect_err("blank text is never success");

    assert!(matches!(error, ProviderError::EmptyCompletion));
}

#[tokio::test]
async fn test_streaming_decodes_fragments_and_finish_reason() {
    let sse_body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"The answer\"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" is 42.\"}]},\"finishReason\":\"MAX_TOKENS\"}]}\n\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = client_for(&server)
        .call_streaming("relay-pro", &request())
        .await
        .expect("stream opens");
    let fragments: Vec<_> = stream.collect().await;

    assert_eq!(fragments.len(), 3, "{fragments:?}");
    assert!(matches!(&fragments[0], Ok(Fragment::Text(t)) if t == "The answer"));
    assert!(matches!(&fragments[1], Ok(Fragment::Text(t)) if t == " is 42."));
    assert!(matches!(
        &fragments[2],
        Ok(Fragment::Finished(FinishReason::LengthCapped))
    ));
}

#[tokio::test]
async fn test_streaming_immediate_failure_surfaces_from_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .call_streaming("relay-pro", &request())
        .await
        .err()
        .expect("call itself fails");

    assert!(matches!(error, ProviderError::RateLimited { .. }));
}

#[tokio::test]
async fn test_streaming_body_without_finish_reason_ends_in_stream_closed() {
    let sse_body =
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"dangling\"}]}}]}\n\n";

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/relay-pro:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = client_for(&server)
        .call_streaming("relay-pro", &request())
        .await
        .expect("stream opens");
    let fragments: Vec<_> = stream.collect().await;

    assert!(matches!(&fragments[0], Ok(Fragment::Text(t)) if t == "dangling"));
    assert!(matches!(
        fragments.last(),
        Some(Err(ProviderError::StreamClosed))
    ));
}

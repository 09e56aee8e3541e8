//! Integration tests for the Langbase backend
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use got_reasoning::backend::Backend;
use got_reasoning::config::{LangbaseConfig, PricingConfig, RequestConfig};
use got_reasoning::error::BackendError;
use got_reasoning::langbase::{LangbaseClient, Message, PipeRequest};

fn test_config(base_url: &str) -> LangbaseConfig {
    LangbaseConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        pipe: "got-test".to_string(),
    }
}

/// Requests without retries or delays
fn fast_requests() -> RequestConfig {
    RequestConfig {
        timeout_ms: 5000,
        max_retries: 0,
        retry_delay_ms: 0,
        max_retry_elapsed_ms: 1000,
        batch_attempts: 3,
    }
}

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, request_config: RequestConfig) -> LangbaseClient {
    LangbaseClient::new(
        &test_config(base_url),
        request_config,
        PricingConfig {
            prompt_token_cost: 1.0,
            completion_token_cost: 2.0,
        },
    )
    .expect("Failed to create client")
}

fn create_test_request(content: &str) -> PipeRequest {
    PipeRequest::new("got-test", vec![Message::user(content)])
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "completion": text,
        "raw": {
            "model": "gpt-4o-mini",
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 50,
                "total_tokens": 150
            }
        }
    }))
}

fn server_error() -> ResponseTemplate {
    ResponseTemplate::new(500).set_body_json(json!({
        "error": {
            "message": "Internal server error",
            "type": "server_error"
        }
    }))
}

#[cfg(test)]
mod pipe_call_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_pipe_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({
                "name": "got-test",
                "stream": false,
                "messages": [{"role": "user", "content": "Test thought content"}]
            })))
            .respond_with(completion("This is a test reasoning response."))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        let result = client
            .call_pipe(&create_test_request("Test thought content"))
            .await;

        assert!(result.is_ok(), "Pipe call should succeed: {:?}", result.err());
        let response = result.unwrap();
        assert!(response.success);
        assert_eq!(response.completion, "This is a test reasoning response.");
        assert_eq!(response.token_counts(), (100, 50));
    }

    #[tokio::test]
    async fn test_pipe_call_authentication_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "message": "Invalid API key",
                    "type": "authentication_error"
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let requests = RequestConfig {
            max_retries: 3,
            ..fast_requests()
        };
        let client = create_test_client(&mock_server.uri(), requests);
        let result = client.call_pipe(&create_test_request("Test")).await;

        match result {
            Err(BackendError::Unavailable { message, retries }) => {
                assert!(message.contains("401"));
                assert_eq!(retries, 1);
            }
            other => panic!("expected unavailable error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsuccessful_run_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "completion": ""
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        let result = client.call_pipe(&create_test_request("Test")).await;

        assert!(result.is_err(), "Should fail when the pipe reports failure");
    }

    #[tokio::test]
    async fn test_handle_malformed_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        let result = client.call_pipe(&create_test_request("Input")).await;

        assert!(result.is_err(), "Should fail on malformed JSON");
    }

    #[tokio::test]
    async fn test_parse_response_without_optional_fields() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "completion": "Minimal response"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        let response = client
            .call_pipe(&create_test_request("Input"))
            .await
            .unwrap();

        assert!(response.raw.is_none());
        assert_eq!(response.token_counts(), (0, 0));
    }
}

#[cfg(test)]
mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_on_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(completion("Recovered"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let requests = RequestConfig {
            max_retries: 2,
            retry_delay_ms: 1,
            ..fast_requests()
        };
        let client = create_test_client(&mock_server.uri(), requests);
        let response = client.call_pipe(&create_test_request("Test")).await.unwrap();

        assert_eq!(response.completion, "Recovered");
        let usage = client.usage();
        assert_eq!(usage.calls, 1);
        assert_eq!(usage.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(completion("Delayed response").set_delay(std::time::Duration::from_secs(10)))
            .mount(&mock_server)
            .await;

        let requests = RequestConfig {
            timeout_ms: 100,
            ..fast_requests()
        };
        let client = create_test_client(&mock_server.uri(), requests);
        let result = client.call_pipe(&create_test_request("Test")).await;

        match result {
            Err(BackendError::Unavailable { message, .. }) => {
                assert!(message.contains("timeout"), "unexpected message: {}", message);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod backend_tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_returns_requested_samples_and_counts_usage() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(completion(r#"{"y": "a1"}"#))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        let texts = client.generate("Branch", 3).await;

        assert_eq!(texts.len(), 3);
        let usage = client.usage();
        assert_eq!(usage.calls, 3);
        assert_eq!(usage.completions, 3);
        assert_eq!(usage.prompt_tokens, 300);
        assert_eq!(usage.completion_tokens, 150);
        // 0.3 * 1.0 + 0.15 * 2.0
        assert!((usage.cost - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_fan_out_failure_yields_surviving_samples() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(completion("ok"))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(server_error())
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        let texts = client.generate("Branch", 5).await;

        assert_eq!(texts, vec!["ok".to_string(), "ok".to_string()]);
        let usage = client.usage();
        assert_eq!(usage.calls, 2);
        assert!(usage.failed_calls >= 3);
    }

    #[tokio::test]
    async fn test_total_outage_yields_no_samples() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(server_error())
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        let texts = client.generate("Branch", 4).await;

        assert!(texts.is_empty());
        assert_eq!(client.usage().calls, 0);
    }
}

#[cfg(test)]
mod pipe_management_tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_pipe_creates_pipe() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .and(body_partial_json(json!({"name": "got-test", "upsert": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "got-test",
                "description": "Graph-of-Thoughts completions",
                "status": "private",
                "url": "https://langbase.com/pipes/got-test"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        assert!(client.ensure_pipe().await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_pipe_accepts_existing_pipe() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        assert!(client.ensure_pipe().await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_pipe_reports_other_failures() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), fast_requests());
        match client.ensure_pipe().await {
            Err(BackendError::Api { status, .. }) => assert_eq!(status, 403),
            other => panic!("expected API error, got {:?}", other),
        }
    }
}

//! Integration tests for the OpenAI completion provider
//!
//! Validates request shape and error mapping against a mock server

use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use viva_engine::config::OpenAIConfig;
use viva_engine::llm::openai::{OpenAIProvider, API_KEY_SECRET};
use viva_engine::llm::{CompletionProvider, CompletionRequest, LLMError, Message, TokenUsage};
use viva_engine::secrets::{SecretCache, SecretManager};

fn provider(server: &MockServer) -> OpenAIProvider {
    let config = OpenAIConfig {
        base_url: server.uri(),
        model: "gpt-4o".to_string(),
        timeout_secs: 5,
    };
    let cache = SecretCache::with_values(
        Arc::new(SecretManager::new("viva-test")),
        &[(API_KEY_SECRET, "sk-test-key")],
    );
    OpenAIProvider::new(config, Arc::new(cache)).unwrap()
}

fn request(json_response: bool) -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::system("You are VIVA."), Message::user("Hello")],
        temperature: 0.7,
        max_tokens: 100,
        json_response,
    }
}

#[tokio::test]
async fn test_completion_with_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "max_tokens": 100,
            "messages": [
                {"role": "system", "content": "You are VIVA."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "I love my life."}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = provider(&server).complete(&request(false)).await.unwrap();
    assert_eq!(completion.text, "I love my life.");
    assert_eq!(
        completion.usage,
        Some(TokenUsage {
            prompt_tokens: 12,
            completion_tokens: 5
        })
    );
}

#[tokio::test]
async fn test_json_mode_sets_response_format() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "{\"theme\": \"play\"}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = provider(&server).complete(&request(true)).await.unwrap();
    assert_eq!(completion.text, "{\"theme\": \"play\"}");
    assert_eq!(completion.usage, None);
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request(false)).await.unwrap_err();
    assert!(matches!(err, LLMError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_rate_limit_maps_to_rate_limit_exceeded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request(false)).await.unwrap_err();
    assert!(matches!(err, LLMError::RateLimitExceeded));
}

#[tokio::test]
async fn test_missing_content_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request(false)).await.unwrap_err();
    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_empty_content_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "  \n"}}]
        })))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request(false)).await.unwrap_err();
    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_rejected_key_is_reloaded_on_next_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test-key"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-rotated-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Welcome back."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let err = provider.complete(&request(false)).await.unwrap_err();
    assert!(matches!(err, LLMError::AuthenticationFailed(_)));

    std::env::set_var("OPENAI_API_KEY", "sk-rotated-key");
    let completion = provider.complete(&request(false)).await;
    std::env::remove_var("OPENAI_API_KEY");

    assert_eq!(completion.unwrap().text, "Welcome back.");
}

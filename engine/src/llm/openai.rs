use super::{Completion, CompletionProvider, CompletionRequest, LLMError, TokenUsage};
use crate::config::OpenAIConfig;
use crate::secrets::SecretCache;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const API_KEY_SECRET: &str = "openai_api_key";

pub struct OpenAIProvider {
    config: OpenAIConfig,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, secret_cache: Arc<SecretCache>) -> super::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        Ok(Self {
            config,
            secret_cache,
            client,
        })
    }
}

fn parse_usage(data: &serde_json::Value) -> Option<TokenUsage> {
    let usage = data.get("usage")?;
    let count = |key: &str| {
        usage
            .get(key)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
    };
    Some(TokenUsage {
        prompt_tokens: count("prompt_tokens")?,
        completion_tokens: count("completion_tokens")?,
    })
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn check_health(&self) -> bool {
        self.secret_cache.get_secret(API_KEY_SECRET).is_ok()
    }

    async fn complete(&self, request: &CompletionRequest) -> super::Result<Completion> {
        let api_key = self
            .secret_cache
            .get_secret(API_KEY_SECRET)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let api_messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let mut payload = json!({
            "model": self.config.model,
            "messages": api_messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_response {
            payload["response_format"] = json!({"type": "json_object"});
        }

        tracing::debug!(
            "Sending completion request ({} messages, max_tokens {})",
            request.messages.len(),
            request.max_tokens
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => {
                    self.secret_cache.invalidate(API_KEY_SECRET);
                    LLMError::AuthenticationFailed(text)
                }
                429 => LLMError::RateLimitExceeded,
                _ => LLMError::InvalidRequest(format!("{}: {}", status, text)),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))?;

        Ok(Completion {
            text: content.to_string(),
            usage: parse_usage(&data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usage() {
        let data = json!({"usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}});
        assert_eq!(
            parse_usage(&data),
            Some(TokenUsage {
                prompt_tokens: 42,
                completion_tokens: 7
            })
        );
        assert_eq!(parse_usage(&json!({})), None);
        assert_eq!(parse_usage(&json!({"usage": {"prompt_tokens": 1}})), None);
    }
}

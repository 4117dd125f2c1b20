//! OpenAI-compatible dispatch through the routing proxy.
//!
//! Requests are forwarded as-is with the router's chosen model filled in;
//! no protocol translation happens here.

use std::time::Duration;

use reqwest::StatusCode;

use crate::catalog::ModelId;
use crate::providers::{
    ChatMessage, Choice, CompletionRequest, CompletionResponse, Provider, ProviderError, Usage,
};

/// Default timeout for a single completion request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Upper bound on establishing the connection to the proxy.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends chat completions to `{endpoint}/v1/chat/completions`.
pub struct ProxyProvider {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl ProxyProvider {
    /// Create a provider for `endpoint` with the default request timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_options(endpoint, None, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a provider with an optional bearer key and request timeout.
    pub fn with_options(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT.min(timeout))
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Return the configured endpoint (without trailing slash).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Only a failure to reach the proxy is a transport error. Once
    /// connected, a stalled or broken exchange is charged to the model.
    fn classify_send_error(&self, e: &reqwest::Error) -> ProviderError {
        if e.is_connect() || e.is_builder() {
            ProviderError::Transport(e.to_string())
        } else if e.is_timeout() {
            ProviderError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ProviderError::Interrupted(e.to_string())
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.endpoint)
    }

    fn prepare_request(&self, model: &ModelId, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model.as_str(),
            "messages": request.messages.iter().map(|m| serde_json::json!({
                "role": m.role,
                "content": m.content
            })).collect::<Vec<_>>(),
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        body
    }

    fn parse_response(json: &serde_json::Value) -> Result<CompletionResponse, ProviderError> {
        let id = json["id"].as_str().unwrap_or("").to_string();
        let model = json["model"].as_str().unwrap_or("").to_string();

        let choices = json["choices"]
            .as_array()
            .ok_or_else(|| ProviderError::InvalidResponse("missing choices".to_string()))?
            .iter()
            .map(|choice| {
                let message = &choice["message"];
                Choice {
                    index: choice["index"].as_u64().unwrap_or(0) as u32,
                    message: ChatMessage {
                        role: message["role"].as_str().unwrap_or("assistant").to_string(),
                        content: message["content"].as_str().unwrap_or("").to_string(),
                    },
                    finish_reason: choice["finish_reason"].as_str().map(str::to_string),
                }
            })
            .collect();

        let usage = json.get("usage").filter(|u| !u.is_null()).map(|u| Usage {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(CompletionResponse {
            id,
            model,
            choices,
            usage,
        })
    }
}

/// Map a non-2xx proxy status to a model-level failure.
fn classify_status(
    status: StatusCode,
    model: &ModelId,
    retry_after: Option<u64>,
    body: String,
) -> ProviderError {
    match status {
        StatusCode::NOT_FOUND => ProviderError::ModelNotFound(model.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(0),
        },
        _ => ProviderError::ModelFailed {
            status: status.as_u16(),
            message: body,
        },
    }
}

impl Provider for ProxyProvider {
    async fn complete(
        &self,
        model: &ModelId,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = self.prepare_request(model, request);

        let mut req_builder = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = req_builder
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!(model = %model, status = status.as_u16(), "Proxy rejected request");
            return Err(classify_status(status, model, retry_after, error_text));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.classify_send_error(&e)
            } else {
                ProviderError::InvalidResponse(e.to_string())
            }
        })?;
        Self::parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let provider = ProxyProvider::new("http://localhost:8082/");
        assert_eq!(provider.endpoint(), "http://localhost:8082");
        assert_eq!(
            provider.completions_url(),
            "http://localhost:8082/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_carries_router_model() {
        let provider = ProxyProvider::new("http://localhost:8082");
        let mut request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        request.max_tokens = Some(64);

        let body = provider.prepare_request(&ModelId::new("openrouter/qwen/qwen3-coder"), &request);
        assert_eq!(body["model"], "openrouter/qwen/qwen3-coder");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], false);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn classify_statuses() {
        let model = ModelId::new("m");
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, &model, None, String::new()),
            ProviderError::ModelNotFound("m".to_string())
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &model, Some(7), String::new()),
            ProviderError::RateLimited {
                retry_after_secs: 7
            }
        );
        let err = classify_status(StatusCode::BAD_GATEWAY, &model, None, "upstream".to_string());
        assert!(!err.is_transport());
    }

    #[test]
    fn parse_response_requires_choices() {
        let json = serde_json::json!({"id": "x"});
        assert!(matches!(
            ProxyProvider::parse_response(&json),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}

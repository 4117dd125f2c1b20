pub mod proxy;

// Re-export for convenience
pub use proxy::ProxyProvider;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ModelId;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures reported by a provider for a single dispatch.
///
/// [`ProviderError::Transport`] means the proxy itself could not be reached.
/// Every other variant is a model-level failure that a fallback chain may
/// route around, including a request that connected but then timed out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("model failed: HTTP {status} - {message}")]
    ModelFailed { status: u16, message: String },
    #[error("model timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("request interrupted: {0}")]
    Interrupted(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the failure concerns the transport rather than the model.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// ---------------------------------------------------------------------------
// Common types
// ---------------------------------------------------------------------------

/// A chat message with a role and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a chat completion.
///
/// The concrete model is chosen by the router and passed to the provider
/// separately, so the request itself is model-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
        }
    }
}

/// A single completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Dispatches a completion for one concrete model through the transport.
///
/// Implementations stay thin: send the request with `model` filled in and
/// classify failures into [`ProviderError`]. Fallback and health decisions
/// belong to the router.
pub trait Provider: Send + Sync {
    fn complete(
        &self,
        model: &ModelId,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, ProviderError>> + Send;
}

// ---------------------------------------------------------------------------
// Dyn-compatible wrapper for Provider
// ---------------------------------------------------------------------------

type CompleteFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CompletionResponse, ProviderError>> + Send + 'a>>;

/// Object-safe version of [`Provider`], using boxed futures.
///
/// Auto-implemented for every `T: Provider + Send + Sync + 'static`.
/// Use `Arc<dyn ProviderDyn>` wherever you need to erase the concrete type.
pub trait ProviderDyn: Send + Sync {
    fn complete_dyn<'a>(
        &'a self,
        model: &'a ModelId,
        request: &'a CompletionRequest,
    ) -> CompleteFuture<'a>;
}

impl<T: Provider + Send + Sync + 'static> ProviderDyn for T {
    fn complete_dyn<'a>(
        &'a self,
        model: &'a ModelId,
        request: &'a CompletionRequest,
    ) -> CompleteFuture<'a> {
        Box::pin(self.complete(model, request))
    }
}

/// Lets a type-erased provider drive a [`crate::middleware::route::Router`].
impl Provider for std::sync::Arc<dyn ProviderDyn> {
    fn complete(
        &self,
        model: &ModelId,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, ProviderError>> + Send {
        let this = std::sync::Arc::clone(self);
        let model = model.clone();
        let request = request.clone();
        // Deref explicitly: `Arc<dyn ProviderDyn>` is itself a `ProviderDyn`.
        async move { (*this).complete_dyn(&model, &request).await }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

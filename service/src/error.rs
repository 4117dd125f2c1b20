//! Error taxonomy for the routing core.
//!
//! Every failure carries an explicit [`ErrorKind`] discriminant so outer
//! orchestration can match on the kind instead of on concrete variants.
//! The one distinction that matters most: [`RouteError::TransportUnavailable`]
//! must never be treated like [`RouteError::ModelUnavailable`] by a
//! tier-fallback loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{ModelId, Tier};

/// Discriminant for [`RouteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownCatalogKey,
    PresetNotFound,
    Configuration,
    TransportUnavailable,
    ModelUnavailable,
}

/// Why a fallback table was rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableViolation {
    /// A chain lists its own key.
    SelfReference,
    /// A chain lists the same substitute twice.
    DuplicateEntry(ModelId),
    /// Key or substitute is not a catalog model.
    UnknownModel(ModelId),
    /// Following chains from the key comes back to a model already visited.
    Cycle(Vec<ModelId>),
    /// Following chains from the key takes more hops than allowed.
    ChainTooDeep { depth: usize, max: usize },
}

impl fmt::Display for TableViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfReference => write!(f, "chain lists its own key"),
            Self::DuplicateEntry(m) => write!(f, "chain lists {m} more than once"),
            Self::UnknownModel(m) => write!(f, "{m} is not a catalog model"),
            Self::Cycle(path) => {
                let path: Vec<&str> = path.iter().map(ModelId::as_str).collect();
                write!(f, "cycle: {}", path.join(" -> "))
            }
            Self::ChainTooDeep { depth, max } => {
                write!(f, "chain depth {depth} exceeds maximum of {max}")
            }
        }
    }
}

/// Errors raised by the routing core.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unknown catalog key: {0}")]
    UnknownCatalogKey(String),

    #[error("preset not found: {0}")]
    PresetNotFound(String),

    #[error("invalid preset '{preset}': {reason}")]
    InvalidPreset { preset: String, reason: String },

    #[error("invalid fallback chain for {model}: {violation}")]
    InvalidFallbackTable {
        model: ModelId,
        violation: TableViolation,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport unavailable at {endpoint}: {detail}. {remediation}")]
    TransportUnavailable {
        endpoint: String,
        detail: String,
        remediation: String,
    },

    #[error(
        "model unavailable for tier '{tier}': exhausted [{}]{}",
        format_chain(.exhausted),
        format_last_error(.last_error)
    )]
    ModelUnavailable {
        tier: Tier,
        exhausted: Vec<ModelId>,
        last_error: Option<String>,
    },
}

fn format_chain(chain: &[ModelId]) -> String {
    chain
        .iter()
        .map(ModelId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_last_error(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(" (last error: {e})"))
        .unwrap_or_default()
}

impl RouteError {
    /// The explicit discriminant for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCatalogKey(_) => ErrorKind::UnknownCatalogKey,
            Self::PresetNotFound(_) => ErrorKind::PresetNotFound,
            Self::InvalidPreset { .. } | Self::InvalidFallbackTable { .. } | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::TransportUnavailable { .. } => ErrorKind::TransportUnavailable,
            Self::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
        }
    }

    /// Whether an outer tier-fallback policy may retry at a lower tier.
    ///
    /// Only a model-level exhaustion qualifies. A transport failure would hit
    /// every tier identically.
    pub fn is_retryable_at_lower_tier(&self) -> bool {
        self.kind() == ErrorKind::ModelUnavailable
    }

    /// Build a [`RouteError::TransportUnavailable`] with the standard
    /// remediation text for `endpoint`.
    pub fn transport_unavailable(endpoint: &str, detail: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
            remediation: remediation_for(endpoint),
        }
    }
}

/// Caller-actionable text explaining how to bring the transport back.
pub fn remediation_for(endpoint: &str) -> String {
    format!(
        "Start the proxy container (for example `docker compose up -d`) and check that \
         {}/health responds before retrying",
        endpoint.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_carries_endpoint_and_remediation() {
        let err = RouteError::transport_unavailable("http://localhost:8082/", "connection refused");
        assert_eq!(err.kind(), ErrorKind::TransportUnavailable);
        assert!(!err.is_retryable_at_lower_tier());

        let msg = err.to_string();
        assert!(msg.contains("http://localhost:8082/"));
        assert!(msg.contains("connection refused"));
        assert!(msg.contains("http://localhost:8082/health"));
    }

    #[test]
    fn model_unavailable_lists_exhausted_chain() {
        let err = RouteError::ModelUnavailable {
            tier: Tier::Big,
            exhausted: vec![ModelId::new("a/one"), ModelId::new("a/two")],
            last_error: Some("HTTP 503".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
        assert!(err.is_retryable_at_lower_tier());
        assert_eq!(
            err.to_string(),
            "model unavailable for tier 'big': exhausted [a/one, a/two] (last error: HTTP 503)"
        );
    }

    #[test]
    fn construction_errors_share_configuration_kind() {
        let err = RouteError::InvalidFallbackTable {
            model: ModelId::new("x"),
            violation: TableViolation::SelfReference,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "invalid fallback chain for x: chain lists its own key"
        );
    }
}

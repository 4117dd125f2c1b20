//! Middleware layer of the routing core.
//!
//! Sits between callers and the provider seam, handling:
//! - **health**: cached transport health gate
//! - **route**: tiered dispatch with per-model fallback chains
//! - **metrics**: dispatch outcome counters
//! - **decision**: routing hand-off to config persistence

pub mod decision;
pub mod health;
pub mod metrics;
pub mod route;

// Re-export commonly used types
pub use decision::RoutingDecision;
pub use health::{HealthCache, HealthGate, HealthVerdict};
pub use metrics::DispatchMetrics;
pub use route::{DispatchOutcome, Router, TierFallback};

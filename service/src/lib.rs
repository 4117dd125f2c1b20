//! tierbox - tiered model routing core
//!
//! Decouples a caller's fixed `big` / `middle` / `small` tiers from the
//! concrete backend models behind a routing proxy:
//! - Model catalog, preset resolution and per-model fallback chains
//! - Cached transport health gate
//! - Tiered dispatch that never confuses a dead transport with a failing model
//!
//! Proxy lifecycle, protocol translation and inference live elsewhere.

pub mod catalog;
pub mod config;
pub mod error;
pub mod middleware;
pub mod providers;

pub use catalog::{FallbackTable, ModelCatalog, ModelId, Preset, PresetTable, Tier};
pub use config::RouterConfig;
pub use error::{ErrorKind, RouteError};
pub use middleware::{HealthGate, HealthVerdict, Router};

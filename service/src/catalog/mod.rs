//! Static model catalog and the lookup tables built on it.
//!
//! - **catalog** (this module): semantic key -> concrete [`ModelId`]
//! - **presets**: preset id -> `{big, middle, small}` bundle
//! - **fallback**: per-model ordered substitute chains
//!
//! All tables are immutable and validated when constructed, so a malformed
//! table fails at startup rather than mid-request.

pub mod fallback;
pub mod presets;

pub use fallback::{FallbackTable, MAX_CHAIN_DEPTH};
pub use presets::{DEFAULT_PRESET_ID, Preset, PresetTable};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RouteError;

// ---------------------------------------------------------------------------
// Core identifiers
// ---------------------------------------------------------------------------

/// Concrete backend model identifier (a fully-qualified provider path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Caller-facing capability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Big,
    Middle,
    Small,
}

impl Tier {
    /// Canonical order, most capable first.
    pub const ALL: [Tier; 3] = [Tier::Big, Tier::Middle, Tier::Small];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Big => "big",
            Self::Middle => "middle",
            Self::Small => "small",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "big" => Ok(Self::Big),
            "middle" => Ok(Self::Middle),
            "small" => Ok(Self::Small),
            other => Err(RouteError::Config(format!("unknown tier: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Key of the cheapest/free entry every preset binds to its `small` tier.
pub const ECONOMY_KEY: &str = "flagship-economy";
const ECONOMY_MODEL: &str = "openrouter/deepseek/deepseek-chat-v3-0324:free";

/// `(key, model id, free)`
const BUILTIN_ENTRIES: &[(&str, &str, bool)] = &[
    ("flagship", "openrouter/anthropic/claude-sonnet-4", false),
    ("flagship-fast", "openrouter/anthropic/claude-3.5-haiku", false),
    (ECONOMY_KEY, ECONOMY_MODEL, true),
    ("code-specialist", "openrouter/qwen/qwen3-coder", false),
    ("long-context", "openrouter/google/gemini-2.5-pro", false),
    ("balanced", "openrouter/google/gemini-2.5-flash", false),
    ("reasoning", "openrouter/deepseek/deepseek-r1", false),
    ("reasoning-economy", "openrouter/deepseek/deepseek-r1:free", true),
];

/// A single catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub key: &'static str,
    pub model: ModelId,
    pub free: bool,
}

/// Closed mapping from semantic keys to concrete model ids.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
    by_key: HashMap<&'static str, usize>,
    economy: ModelId,
}

impl ModelCatalog {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        let entries = BUILTIN_ENTRIES
            .iter()
            .map(|&(key, model, free)| CatalogEntry {
                key,
                model: ModelId::new(model),
                free,
            })
            .collect();
        Self::assemble(entries, ModelId::new(ECONOMY_MODEL))
    }

    /// Build a custom catalog. `economy_key` names the entry every preset
    /// must bind to its `small` tier.
    pub fn from_entries(
        entries: Vec<CatalogEntry>,
        economy_key: &str,
    ) -> Result<Self, RouteError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.key) {
                return Err(RouteError::Config(format!(
                    "duplicate catalog key: {}",
                    entry.key
                )));
            }
        }
        let economy = entries
            .iter()
            .find(|e| e.key == economy_key)
            .map(|e| e.model.clone())
            .ok_or_else(|| RouteError::UnknownCatalogKey(economy_key.to_string()))?;
        Ok(Self::assemble(entries, economy))
    }

    fn assemble(entries: Vec<CatalogEntry>, economy: ModelId) -> Self {
        let by_key = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.key, idx))
            .collect();
        Self {
            entries,
            by_key,
            economy,
        }
    }

    /// Resolve a semantic key. Unknown keys are a programming error.
    pub fn lookup(&self, key: &str) -> Result<&ModelId, RouteError> {
        self.by_key
            .get(key)
            .map(|&idx| &self.entries[idx].model)
            .ok_or_else(|| RouteError::UnknownCatalogKey(key.to_string()))
    }

    /// The free/economy model every preset binds to `small`.
    pub fn economy(&self) -> &ModelId {
        &self.economy
    }

    pub fn contains(&self, model: &ModelId) -> bool {
        self.entries.iter().any(|e| &e.model == model)
    }

    /// Whether `model` is a free catalog entry. Unknown models are not free.
    pub fn is_free(&self, model: &ModelId) -> bool {
        self.entries.iter().any(|e| &e.model == model && e.free)
    }

    /// All entries in declaration order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

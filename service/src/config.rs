//! Router configuration.
//!
//! Loaded from `$CONFIG_DIR/tierbox/config.json` when present, then
//! overridden by `TIERBOX_*` environment variables, then validated.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{DEFAULT_PRESET_ID, Preset, PresetTable, Tier};
use crate::error::RouteError;

const CONFIG_DIR: &str = "tierbox";
const CONFIG_FILE: &str = "config.json";

pub const ENV_ENDPOINT: &str = "TIERBOX_ENDPOINT";
pub const ENV_PRESET: &str = "TIERBOX_PRESET";
pub const ENV_PROBE_TIMEOUT_MS: &str = "TIERBOX_PROBE_TIMEOUT_MS";
pub const ENV_HEALTH_TTL_SECS: &str = "TIERBOX_HEALTH_TTL_SECS";
pub const ENV_API_KEY: &str = "TIERBOX_API_KEY";

/// Upper bound for every configured duration.
const MAX_DURATION_SECS: u64 = 24 * 60 * 60;

/// Settings for one routing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Base URL of the transport proxy.
    pub endpoint: String,
    /// Preset id; `None` applies [`DEFAULT_PRESET_ID`].
    pub preset: Option<String>,
    pub probe_timeout_ms: u64,
    pub health_ttl_secs: u64,
    pub request_timeout_secs: u64,
    /// Primary tier first, then the tiers tried on model exhaustion.
    pub tier_order: Vec<Tier>,
    /// Bearer key forwarded to the proxy. Never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8082".to_string(),
            preset: None,
            probe_timeout_ms: 5_000,
            health_ttl_secs: 30,
            request_timeout_secs: 120,
            tier_order: Tier::ALL.to_vec(),
            api_key: None,
        }
    }
}

impl RouterConfig {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
            .join(CONFIG_FILE)
    }

    /// Load from the default path (if present) and the process environment.
    pub fn load() -> Result<Self, RouteError> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file without applying the environment.
    pub fn load_from(path: &Path) -> Result<Self, RouteError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RouteError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, RouteError> {
        serde_json::from_str(raw).map_err(|e| RouteError::Config(format!("invalid config: {e}")))
    }

    /// Apply `TIERBOX_*` overrides using `lookup` to read variables.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), RouteError> {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(preset) = lookup(ENV_PRESET) {
            self.preset = Some(preset).filter(|p| !p.trim().is_empty());
        }
        if let Some(raw) = lookup(ENV_PROBE_TIMEOUT_MS) {
            self.probe_timeout_ms = parse_number(ENV_PROBE_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_HEALTH_TTL_SECS) {
            self.health_ttl_secs = parse_number(ENV_HEALTH_TTL_SECS, &raw)?;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RouteError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| RouteError::Config(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RouteError::Config(format!(
                "endpoint must use http or https, got '{}'",
                url.scheme()
            )));
        }
        check_range(
            "probe_timeout_ms",
            self.probe_timeout_ms,
            1,
            MAX_DURATION_SECS * 1_000,
        )?;
        check_range("health_ttl_secs", self.health_ttl_secs, 0, MAX_DURATION_SECS)?;
        check_range(
            "request_timeout_secs",
            self.request_timeout_secs,
            1,
            MAX_DURATION_SECS,
        )?;
        if self.tier_order.is_empty() {
            return Err(RouteError::Config("tier_order must not be empty".to_string()));
        }
        let unique: HashSet<_> = self.tier_order.iter().collect();
        if unique.len() != self.tier_order.len() {
            return Err(RouteError::Config(
                "tier_order must not repeat a tier".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured preset, or the default when none or an unknown id is
    /// configured.
    pub fn resolve_preset(&self, presets: &PresetTable) -> Result<Preset, RouteError> {
        if let Some(id) = self.preset.as_deref() {
            if let Some(preset) = presets.resolve_preset(id) {
                return Ok(preset);
            }
            tracing::warn!(
                preset = %id,
                default = DEFAULT_PRESET_ID,
                "Unknown preset configured, applying default"
            );
        }
        presets.require_preset(DEFAULT_PRESET_ID)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), RouteError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RouteError::Config(format!(
            "{field} must be between {min} and {max}, got {value}"
        )))
    }
}

fn parse_number(var: &str, raw: &str) -> Result<u64, RouteError> {
    raw.trim()
        .parse()
        .map_err(|_| RouteError::Config(format!("{var} must be a number, got '{raw}'")))
}

//! The resolved routing decision handed to config persistence.

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelId, Preset, Tier};
use crate::error::RouteError;

/// Key under which [`RoutingDecision::apply_to`] writes into a config object.
pub const ROUTING_KEY: &str = "routing";

/// Provider base URL, per-tier models and tier ordering for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub base_url: String,
    pub preset_id: String,
    pub big_model: ModelId,
    pub middle_model: ModelId,
    pub small_model: ModelId,
    pub primary_tier: Tier,
    pub fallback_tiers: Vec<Tier>,
}

impl RoutingDecision {
    /// Build a decision from a resolved preset and a tier order whose first
    /// element is the primary tier.
    pub fn new(base_url: &str, preset: &Preset, tier_order: &[Tier]) -> Self {
        let (primary_tier, fallback_tiers) = match tier_order.split_first() {
            Some((primary, rest)) => (*primary, rest.to_vec()),
            None => (Tier::Big, Vec::new()),
        };
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            preset_id: preset.id.clone(),
            big_model: preset.big.clone(),
            middle_model: preset.middle.clone(),
            small_model: preset.small.clone(),
            primary_tier,
            fallback_tiers,
        }
    }

    pub fn model_for(&self, tier: Tier) -> &ModelId {
        match tier {
            Tier::Big => &self.big_model,
            Tier::Middle => &self.middle_model,
            Tier::Small => &self.small_model,
        }
    }

    /// Write this decision under [`ROUTING_KEY`] in a persisted config
    /// object. Other keys are left untouched; a `null` config becomes an
    /// object.
    pub fn apply_to(&self, config: &mut serde_json::Value) -> Result<(), RouteError> {
        if config.is_null() {
            *config = serde_json::Value::Object(serde_json::Map::new());
        }
        let object = config.as_object_mut().ok_or_else(|| {
            RouteError::Config("persisted configuration is not a JSON object".to_string())
        })?;
        let value = serde_json::to_value(self)
            .map_err(|e| RouteError::Config(format!("failed to serialize routing: {e}")))?;
        object.insert(ROUTING_KEY.to_string(), value);
        Ok(())
    }
}

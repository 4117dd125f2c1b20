//! Preset resolution: user-facing preset id -> `{big, middle, small}` models.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelCatalog, ModelId, Tier};
use crate::error::RouteError;

/// Preset applied when none (or an unknown one) is configured.
pub const DEFAULT_PRESET_ID: &str = "flagship-full";

/// `(id, label, big key, middle key, small key, free tier)`
const BUILTIN_PRESETS: &[(&str, &str, &str, &str, &str, bool)] = &[
    (
        DEFAULT_PRESET_ID,
        "Flagship (best quality)",
        "flagship",
        "flagship-fast",
        "flagship-economy",
        false,
    ),
    (
        "code-focused",
        "Code specialist",
        "code-specialist",
        "balanced",
        "flagship-economy",
        false,
    ),
    (
        "long-context",
        "Long context",
        "long-context",
        "balanced",
        "flagship-economy",
        false,
    ),
    (
        "reasoning",
        "Deep reasoning",
        "reasoning",
        "flagship-fast",
        "flagship-economy",
        false,
    ),
    (
        "free-tier",
        "Free models only",
        "reasoning-economy",
        "flagship-economy",
        "flagship-economy",
        true,
    ),
];

/// A named bundle assigning one concrete model to every tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub label: String,
    pub big: ModelId,
    pub middle: ModelId,
    pub small: ModelId,
    pub is_free_tier: bool,
}

impl Preset {
    /// The model bound to `tier`.
    pub fn model_for(&self, tier: Tier) -> &ModelId {
        match tier {
            Tier::Big => &self.big,
            Tier::Middle => &self.middle,
            Tier::Small => &self.small,
        }
    }
}

/// Validated set of presets, in menu order.
#[derive(Debug, Clone)]
pub struct PresetTable {
    presets: Vec<Preset>,
}

impl PresetTable {
    /// Validate `presets` against `catalog`.
    ///
    /// Every model must be a catalog entry, `small` must be the catalog's
    /// economy model, ids must be unique, and a free-tier preset may only
    /// bind free models.
    pub fn new(catalog: &ModelCatalog, presets: Vec<Preset>) -> Result<Self, RouteError> {
        let mut ids = HashSet::new();
        for preset in &presets {
            let invalid = |reason: String| RouteError::InvalidPreset {
                preset: preset.id.clone(),
                reason,
            };

            if !ids.insert(preset.id.as_str()) {
                return Err(invalid("duplicate preset id".to_string()));
            }
            for tier in Tier::ALL {
                let model = preset.model_for(tier);
                if !catalog.contains(model) {
                    return Err(invalid(format!("{tier} model {model} is not in the catalog")));
                }
                if preset.is_free_tier && !catalog.is_free(model) {
                    return Err(invalid(format!(
                        "free-tier preset binds non-free {tier} model {model}"
                    )));
                }
            }
            if &preset.small != catalog.economy() {
                return Err(invalid(format!(
                    "small tier must be the economy model {}, found {}",
                    catalog.economy(),
                    preset.small
                )));
            }
        }
        Ok(Self { presets })
    }

    /// The built-in presets, resolved through `catalog`.
    pub fn builtin(catalog: &ModelCatalog) -> Result<Self, RouteError> {
        let presets = BUILTIN_PRESETS
            .iter()
            .map(|&(id, label, big, middle, small, is_free_tier)| {
                Ok(Preset {
                    id: id.to_string(),
                    label: label.to_string(),
                    big: catalog.lookup(big)?.clone(),
                    middle: catalog.lookup(middle)?.clone(),
                    small: catalog.lookup(small)?.clone(),
                    is_free_tier,
                })
            })
            .collect::<Result<Vec<_>, RouteError>>()?;
        Self::new(catalog, presets)
    }

    /// Look up a preset. Unknown ids mean "no preset selected".
    pub fn resolve_preset(&self, preset_id: &str) -> Option<Preset> {
        self.presets.iter().find(|p| p.id == preset_id).cloned()
    }

    /// Like [`Self::resolve_preset`] for call sites that want an error.
    pub fn require_preset(&self, preset_id: &str) -> Result<Preset, RouteError> {
        self.resolve_preset(preset_id)
            .ok_or_else(|| RouteError::PresetNotFound(preset_id.to_string()))
    }

    /// All presets in menu order.
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (ModelCatalog, PresetTable) {
        let catalog = ModelCatalog::builtin();
        let table = PresetTable::builtin(&catalog).unwrap();
        (catalog, table)
    }

    #[test]
    fn resolve_flagship_full() {
        let (catalog, table) = table();
        let preset = table.resolve_preset("flagship-full").unwrap();
        assert_eq!(&preset.big, catalog.lookup("flagship").unwrap());
        assert_eq!(&preset.middle, catalog.lookup("flagship-fast").unwrap());
        assert_eq!(preset.model_for(Tier::Small), catalog.economy());
        assert!(!preset.is_free_tier);
    }

    #[test]
    fn unknown_preset_is_absent_not_an_error() {
        let (_, table) = table();
        assert!(table.resolve_preset("does-not-exist").is_none());
        assert!(matches!(
            table.require_preset("does-not-exist"),
            Err(RouteError::PresetNotFound(_))
        ));
    }

    #[test]
    fn resolution_is_idempotent() {
        let (_, table) = table();
        assert_eq!(
            table.resolve_preset("code-focused"),
            table.resolve_preset("code-focused")
        );
    }

    #[test]
    fn every_small_slot_is_the_economy_model() {
        let (catalog, table) = table();
        for preset in table.presets() {
            assert_eq!(&preset.small, catalog.economy(), "preset {}", preset.id);
        }
    }

    #[test]
    fn rejects_preset_with_non_economy_small() {
        let catalog = ModelCatalog::builtin();
        let flagship = catalog.lookup("flagship").unwrap().clone();
        let preset = Preset {
            id: "bad".to_string(),
            label: "Bad".to_string(),
            big: flagship.clone(),
            middle: flagship.clone(),
            small: flagship,
            is_free_tier: false,
        };
        let err = PresetTable::new(&catalog, vec![preset]).unwrap_err();
        assert!(matches!(err, RouteError::InvalidPreset { ref preset, .. } if preset == "bad"));
    }

    #[test]
    fn rejects_free_tier_preset_with_paid_model() {
        let catalog = ModelCatalog::builtin();
        let preset = Preset {
            id: "fake-free".to_string(),
            label: "Fake free".to_string(),
            big: catalog.lookup("flagship").unwrap().clone(),
            middle: catalog.economy().clone(),
            small: catalog.economy().clone(),
            is_free_tier: true,
        };
        assert!(PresetTable::new(&catalog, vec![preset]).is_err());
    }

    #[test]
    fn free_tier_preset_binds_only_free_models() {
        let (catalog, table) = table();
        let preset = table.resolve_preset("free-tier").unwrap();
        assert!(preset.is_free_tier);
        for tier in Tier::ALL {
            assert!(catalog.is_free(preset.model_for(tier)));
        }
    }
}

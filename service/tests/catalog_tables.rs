//! Tests for the built-in catalog, presets and fallback chains

use tierbox_service::catalog::{
    CatalogEntry, DEFAULT_PRESET_ID, FallbackTable, MAX_CHAIN_DEPTH, ModelCatalog, ModelId,
    Preset, PresetTable, Tier,
};
use tierbox_service::error::ErrorKind;

fn builtin() -> (ModelCatalog, PresetTable, FallbackTable) {
    let catalog = ModelCatalog::builtin();
    let presets = PresetTable::builtin(&catalog).unwrap();
    let fallbacks = FallbackTable::builtin(&catalog).unwrap();
    (catalog, presets, fallbacks)
}

#[test]
fn every_catalog_key_resolves() {
    let catalog = ModelCatalog::builtin();
    for entry in catalog.entries() {
        assert_eq!(catalog.lookup(entry.key).unwrap(), &entry.model);
    }
}

#[test]
fn unknown_catalog_key_is_an_error() {
    let catalog = ModelCatalog::builtin();
    let err = catalog.lookup("does-not-exist").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCatalogKey);
}

#[test]
fn no_chain_references_its_own_model() {
    let (_, _, fallbacks) = builtin();
    for model in fallbacks.models() {
        assert!(
            !fallbacks.chain_for(model).contains(model),
            "{model} lists itself as a substitute"
        );
    }
}

#[test]
fn no_transitive_walk_exceeds_max_depth() {
    let (catalog, _, fallbacks) = builtin();
    for entry in catalog.entries() {
        assert!(
            fallbacks.depth_of(&entry.model) <= MAX_CHAIN_DEPTH,
            "{} walks deeper than {MAX_CHAIN_DEPTH}",
            entry.model
        );
    }
}

#[test]
fn every_chain_member_is_a_catalog_model() {
    let (catalog, _, fallbacks) = builtin();
    for model in fallbacks.models() {
        assert!(catalog.contains(model));
        for substitute in fallbacks.chain_for(model) {
            assert!(catalog.contains(substitute));
        }
    }
}

#[test]
fn economy_model_is_terminal() {
    let (catalog, _, fallbacks) = builtin();
    assert!(fallbacks.chain_for(catalog.economy()).is_empty());
}

#[test]
fn every_preset_binds_economy_to_small() {
    let (catalog, presets, _) = builtin();
    for preset in presets.presets() {
        assert_eq!(&preset.small, catalog.economy(), "preset {}", preset.id);
    }
}

#[test]
fn every_preset_model_is_in_catalog() {
    let (catalog, presets, _) = builtin();
    for preset in presets.presets() {
        for tier in Tier::ALL {
            assert!(catalog.contains(preset.model_for(tier)));
        }
    }
}

#[test]
fn free_tier_preset_uses_only_free_models() {
    let (catalog, presets, _) = builtin();
    let free = presets.resolve_preset("free-tier").unwrap();
    assert!(free.is_free_tier);
    for tier in Tier::ALL {
        assert!(catalog.is_free(free.model_for(tier)));
    }
}

#[test]
fn default_preset_exists() {
    let (_, presets, _) = builtin();
    let preset = presets.require_preset(DEFAULT_PRESET_ID).unwrap();
    assert_eq!(preset.big.as_str(), "openrouter/anthropic/claude-sonnet-4");
}

#[test]
fn unknown_preset_is_absent_not_an_error() {
    let (_, presets, _) = builtin();
    assert!(presets.resolve_preset("nope").is_none());
    assert_eq!(
        presets.require_preset("nope").unwrap_err().kind(),
        ErrorKind::PresetNotFound
    );
}

#[test]
fn unknown_model_has_empty_chain() {
    let (_, _, fallbacks) = builtin();
    assert!(fallbacks.chain_for(&ModelId::new("vendor/unknown")).is_empty());
}

#[test]
fn custom_table_rejects_cycle() {
    let catalog = ModelCatalog::from_entries(
        vec![
            CatalogEntry {
                key: "x",
                model: ModelId::new("t/x"),
                free: true,
            },
            CatalogEntry {
                key: "y",
                model: ModelId::new("t/y"),
                free: true,
            },
        ],
        "y",
    )
    .unwrap();

    let err = FallbackTable::new(
        &catalog,
        vec![
            (ModelId::new("t/x"), vec![ModelId::new("t/y")]),
            (ModelId::new("t/y"), vec![ModelId::new("t/x")]),
        ],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn custom_preset_must_bind_economy_to_small() {
    let catalog = ModelCatalog::builtin();
    let err = PresetTable::new(
        &catalog,
        vec![Preset {
            id: "odd".to_string(),
            label: "Odd".to_string(),
            big: catalog.lookup("flagship").unwrap().clone(),
            middle: catalog.lookup("balanced").unwrap().clone(),
            small: catalog.lookup("balanced").unwrap().clone(),
            is_free_tier: false,
        }],
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

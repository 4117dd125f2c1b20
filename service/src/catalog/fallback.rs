//! Per-model fallback chains.
//!
//! A chain lists the substitutes tried, in order, when a concrete model
//! fails. The table is a DAG: validation at construction rejects
//! self-references, cycles, unknown models, and walks deeper than
//! [`MAX_CHAIN_DEPTH`] hops.

use std::collections::HashMap;

use crate::catalog::{ModelCatalog, ModelId};
use crate::error::{RouteError, TableViolation};

/// Maximum number of hops a transitive chain walk may take.
pub const MAX_CHAIN_DEPTH: usize = 3;

/// `(model key, substitute keys)`, keys resolved through the catalog.
const BUILTIN_CHAINS: &[(&str, &[&str])] = &[
    ("flagship", &["long-context", "balanced"]),
    ("long-context", &["balanced"]),
    ("balanced", &["flagship-economy"]),
    ("flagship-fast", &["balanced"]),
    ("code-specialist", &["balanced"]),
    ("reasoning", &["reasoning-economy"]),
    ("reasoning-economy", &["flagship-economy"]),
    ("flagship-economy", &[]),
];

/// Validated, immutable fallback chains keyed by model.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    chains: HashMap<ModelId, Vec<ModelId>>,
}

impl FallbackTable {
    /// Validate and build a table from `(model, chain)` pairs.
    pub fn new(
        catalog: &ModelCatalog,
        entries: Vec<(ModelId, Vec<ModelId>)>,
    ) -> Result<Self, RouteError> {
        let mut chains: HashMap<ModelId, Vec<ModelId>> = HashMap::with_capacity(entries.len());

        for (model, chain) in entries {
            let reject = |violation| RouteError::InvalidFallbackTable {
                model: model.clone(),
                violation,
            };

            if !catalog.contains(&model) {
                return Err(reject(TableViolation::UnknownModel(model.clone())));
            }
            if chains.contains_key(&model) {
                return Err(reject(TableViolation::DuplicateEntry(model.clone())));
            }
            for (idx, substitute) in chain.iter().enumerate() {
                if substitute == &model {
                    return Err(reject(TableViolation::SelfReference));
                }
                if !catalog.contains(substitute) {
                    return Err(reject(TableViolation::UnknownModel(substitute.clone())));
                }
                if chain[..idx].contains(substitute) {
                    return Err(reject(TableViolation::DuplicateEntry(substitute.clone())));
                }
            }
            chains.insert(model, chain);
        }

        let table = Self { chains };
        table.validate_depth()?;
        Ok(table)
    }

    /// The built-in chains, resolved through `catalog`.
    pub fn builtin(catalog: &ModelCatalog) -> Result<Self, RouteError> {
        let entries = BUILTIN_CHAINS
            .iter()
            .map(|&(key, substitutes)| {
                let model = catalog.lookup(key)?.clone();
                let chain = substitutes
                    .iter()
                    .map(|s| catalog.lookup(s).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((model, chain))
            })
            .collect::<Result<Vec<_>, RouteError>>()?;
        Self::new(catalog, entries)
    }

    /// Ordered substitutes for `model`.
    ///
    /// Unknown models yield an empty slice: "no chain" and "terminal" both
    /// mean do not substitute further.
    pub fn chain_for(&self, model: &ModelId) -> &[ModelId] {
        self.chains.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Length of the longest transitive walk starting at `model`.
    pub fn depth_of(&self, model: &ModelId) -> usize {
        // Acyclic after construction, so plain recursion terminates.
        self.chain_for(model)
            .iter()
            .map(|s| 1 + self.depth_of(s))
            .max()
            .unwrap_or(0)
    }

    /// Models that have a chain entry (including terminal ones).
    pub fn models(&self) -> impl Iterator<Item = &ModelId> {
        self.chains.keys()
    }

    fn validate_depth(&self) -> Result<(), RouteError> {
        let mut memo = HashMap::new();
        for model in self.chains.keys() {
            let mut path = Vec::new();
            let depth = self
                .walk(model, &mut path, &mut memo)
                .map_err(|violation| RouteError::InvalidFallbackTable {
                    model: model.clone(),
                    violation,
                })?;
            if depth > MAX_CHAIN_DEPTH {
                return Err(RouteError::InvalidFallbackTable {
                    model: model.clone(),
                    violation: TableViolation::ChainTooDeep {
                        depth,
                        max: MAX_CHAIN_DEPTH,
                    },
                });
            }
        }
        Ok(())
    }

    fn walk(
        &self,
        model: &ModelId,
        path: &mut Vec<ModelId>,
        memo: &mut HashMap<ModelId, usize>,
    ) -> Result<usize, TableViolation> {
        if let Some(&depth) = memo.get(model) {
            return Ok(depth);
        }
        if path.contains(model) {
            let mut cycle = path.clone();
            cycle.push(model.clone());
            return Err(TableViolation::Cycle(cycle));
        }

        path.push(model.clone());
        let mut depth = 0;
        for substitute in self.chain_for(model) {
            depth = depth.max(1 + self.walk(substitute, path, memo)?);
        }
        path.pop();

        memo.insert(model.clone(), depth);
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;

    fn letters_catalog() -> ModelCatalog {
        let entries = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|&key| CatalogEntry {
                key,
                model: ModelId::new(format!("test/{key}")),
                free: key == "e",
            })
            .collect();
        ModelCatalog::from_entries(entries, "e").unwrap()
    }

    fn m(key: &str) -> ModelId {
        ModelId::new(format!("test/{key}"))
    }

    #[test]
    fn builtin_table_is_valid() {
        let catalog = ModelCatalog::builtin();
        let table = FallbackTable::builtin(&catalog).unwrap();
        let flagship = catalog.lookup("flagship").unwrap();
        assert_eq!(
            table.chain_for(flagship),
            &[
                catalog.lookup("long-context").unwrap().clone(),
                catalog.lookup("balanced").unwrap().clone()
            ]
        );
        assert!(table.chain_for(catalog.economy()).is_empty());
    }

    #[test]
    fn unknown_model_has_empty_chain() {
        let table = FallbackTable::builtin(&ModelCatalog::builtin()).unwrap();
        assert!(table.chain_for(&ModelId::new("nobody/none")).is_empty());
    }

    #[test]
    fn rejects_self_reference() {
        let err = FallbackTable::new(&letters_catalog(), vec![(m("a"), vec![m("b"), m("a")])])
            .unwrap_err();
        assert!(matches!(
            err,
            RouteError::InvalidFallbackTable {
                violation: TableViolation::SelfReference,
                ..
            }
        ));
    }

    #[test]
    fn rejects_cycle() {
        let err = FallbackTable::new(
            &letters_catalog(),
            vec![
                (m("a"), vec![m("b")]),
                (m("b"), vec![m("c")]),
                (m("c"), vec![m("a")]),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RouteError::InvalidFallbackTable {
                violation: TableViolation::Cycle(_),
                ..
            }
        ));
    }

    #[test]
    fn rejects_chain_deeper_than_three_hops() {
        let err = FallbackTable::new(
            &letters_catalog(),
            vec![
                (m("a"), vec![m("b")]),
                (m("b"), vec![m("c")]),
                (m("c"), vec![m("d")]),
                (m("d"), vec![m("e")]),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RouteError::InvalidFallbackTable {
                violation: TableViolation::ChainTooDeep { depth: 4, max: 3 },
                ..
            }
        ));
    }

    #[test]
    fn accepts_chain_of_exactly_three_hops() {
        let table = FallbackTable::new(
            &letters_catalog(),
            vec![
                (m("a"), vec![m("b")]),
                (m("b"), vec![m("c")]),
                (m("c"), vec![m("d")]),
            ],
        )
        .unwrap();
        assert_eq!(table.depth_of(&m("a")), 3);
        assert_eq!(table.depth_of(&m("d")), 0);
    }

    #[test]
    fn rejects_unknown_substitute() {
        let err = FallbackTable::new(
            &letters_catalog(),
            vec![(m("a"), vec![ModelId::new("test/typo")])],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RouteError::InvalidFallbackTable {
                violation: TableViolation::UnknownModel(_),
                ..
            }
        ));
    }

    #[test]
    fn rejects_duplicate_substitute() {
        let err = FallbackTable::new(&letters_catalog(), vec![(m("a"), vec![m("b"), m("b")])])
            .unwrap_err();
        assert!(matches!(
            err,
            RouteError::InvalidFallbackTable {
                violation: TableViolation::DuplicateEntry(_),
                ..
            }
        ));
    }
}

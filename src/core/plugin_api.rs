//! Plug-in interfaces (spec.md §6): the only abstraction boundaries the
//! core consumes. Concrete rule detectors, codemods, and language parsers
//! are replaceable plug-ins whose interface is fixed here; their internal
//! semantics are not part of the core.
//!
//! Grounded on the teacher's registry pattern for open, not-closed-at-
//! compile-time extension points (a trait object behind a name-keyed
//! registry), as seen in how `plugins::policy` and `plugins::decide`
//! expose static manifests (`decision_trees()`) that the core walks
//! without knowing concrete variants ahead of time.

use crate::core::error::AceError;
use crate::core::model::{Edit, Finding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A policy-derived view handed to detectors; detectors must not reach
/// outside it or outside their input bytes (spec.md §6: "pure, no I/O
/// outside its input bytes").
#[derive(Debug, Clone, Default)]
pub struct PolicyView {
    pub enabled_rule_ids: Vec<String>,
}

/// `analyze(file_path, bytes, policy_view) -> list<Finding>`.
pub trait Detector: Send + Sync {
    /// Rule identifiers this detector can emit, and their default
    /// severities — the detector's static manifest.
    fn manifest(&self) -> &[(&'static str, f64)];

    fn analyze(&self, file_path: &str, bytes: &[u8], policy: &PolicyView) -> Result<Vec<Finding>, AceError>;
}

/// Structural effects a codemod is permitted to have; consumed by Guard
/// layers 3 (symbol counts) and 6 (import preservation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectManifest {
    pub structure_preserving: bool,
    pub may_change_symbol_counts: bool,
    pub removed_imports: Vec<String>,
}

impl EffectManifest {
    /// Conservative combination over the manifests of every rule whose
    /// edits are present in one Guard-checked byte range. `structure_preserving`
    /// and `may_change_symbol_counts` require unanimous agreement (an
    /// edit from a rule that doesn't declare the permission can't borrow
    /// it from a neighbor); `removed_imports` is the union, since any
    /// rule in the set may be the one dropping a given import.
    pub fn combine(manifests: impl IntoIterator<Item = EffectManifest>) -> EffectManifest {
        let mut combined = EffectManifest {
            structure_preserving: true,
            may_change_symbol_counts: true,
            removed_imports: Vec::new(),
        };
        let mut any = false;
        for m in manifests {
            any = true;
            combined.structure_preserving &= m.structure_preserving;
            combined.may_change_symbol_counts &= m.may_change_symbol_counts;
            for imp in m.removed_imports {
                if !combined.removed_imports.contains(&imp) {
                    combined.removed_imports.push(imp);
                }
            }
        }
        if !any {
            return EffectManifest::default();
        }
        combined.removed_imports.sort();
        combined
    }
}

/// `plan(file_path, bytes) -> Option<list<Edit>>`.
pub trait Codemod: Send + Sync {
    fn rule_id(&self) -> &'static str;
    fn effects(&self) -> EffectManifest;

    /// Returns `None` if nothing applies — used for idempotence checks
    /// (spec.md §8 "Idempotent codemod").
    fn plan(&self, file_path: &str, bytes: &[u8]) -> Result<Option<Vec<Edit>>, AceError>;
}

/// Symbol counts taken from a parse tree, used by Guard layer 3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolCounts {
    pub functions: usize,
    pub classes: usize,
    pub imports: usize,
}

/// Opaque parse tree handle. The bundled parser (`plugins::builtin::lines`)
/// is the only implementation shipped; the trait below is what Guard and
/// RepoMap consume, so additional language plug-ins can be added without
/// touching either.
pub trait ParseTree: Send + Sync {
    /// Full-text canonicalized-tree hash used by the structural-
    /// equivalence check (Guard layer 2): two trees hash equal iff their
    /// canonicalized source is identical.
    fn canonical_hash(&self) -> [u8; 32];
    /// Hash over the ordered sequence of declared symbols (kind + name)
    /// and imports, used by Guard layer 4 (AST hash). Deliberately
    /// coarser than `canonical_hash` — it ignores everything but symbol
    /// identity and order, so it can catch a rename or reorder that a
    /// bare count comparison (layer 3) wouldn't notice, independently of
    /// whether the rule declares itself structure-preserving.
    fn structure_hash(&self) -> [u8; 32];
    fn symbol_counts(&self) -> SymbolCounts;
    /// Import names declared by this tree, in declaration order.
    fn imports(&self) -> Vec<String>;
    /// Declared symbol records: `(name, kind, line)`.
    fn symbols(&self) -> Vec<(String, &'static str, usize)>;
    /// Re-emits this tree back to bytes for the Guard's roundtrip check
    /// (layer 5). Whether this is expected to be byte-identical or
    /// merely tree-equivalent is declared by the owning parser's
    /// `roundtrip_is_byte_identical`.
    fn reemit(&self) -> Vec<u8>;
}

/// `parse(bytes) -> ParseTree | ParseError`, `reemit`, `canonical_hash`,
/// `count_symbols`.
pub trait LanguageParser: Send + Sync {
    fn parse(&self, file_path: &str, bytes: &[u8]) -> Result<Box<dyn ParseTree>, AceError>;

    fn roundtrip_is_byte_identical(&self) -> bool;
}

/// Name-keyed registry for detectors and codemods — the open-extension
/// seam named in DESIGN notes (spec.md §9): "a registry keyed by rule_id
/// with a capability manifest."
#[derive(Default)]
pub struct Registry {
    detectors: BTreeMap<&'static str, Box<dyn Detector>>,
    codemods: BTreeMap<&'static str, Box<dyn Codemod>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_detector(&mut self, key: &'static str, detector: Box<dyn Detector>) {
        self.detectors.insert(key, detector);
    }

    pub fn register_codemod(&mut self, codemod: Box<dyn Codemod>) {
        self.codemods.insert(codemod.rule_id(), codemod);
    }

    pub fn detectors(&self) -> impl Iterator<Item = &Box<dyn Detector>> {
        self.detectors.values()
    }

    pub fn codemod_for(&self, rule_id: &str) -> Option<&dyn Codemod> {
        self.codemods.get(rule_id).map(|b| b.as_ref())
    }

    pub fn all_rule_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .detectors
            .values()
            .flat_map(|d| d.manifest().iter().map(|(id, _)| id.to_string()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDetector;
    impl Detector for NoopDetector {
        fn manifest(&self) -> &[(&'static str, f64)] {
            &[("test.noop", 0.5)]
        }
        fn analyze(&self, _f: &str, _b: &[u8], _p: &PolicyView) -> Result<Vec<Finding>, AceError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_registry_collects_rule_ids_from_manifests() {
        let mut reg = Registry::new();
        reg.register_detector("noop", Box::new(NoopDetector));
        assert_eq!(reg.all_rule_ids(), vec!["test.noop".to_string()]);
    }

    #[test]
    fn test_registry_codemod_lookup_missing_returns_none() {
        let reg = Registry::new();
        assert!(reg.codemod_for("does.not.exist").is_none());
    }

    #[test]
    fn test_combine_requires_unanimous_structure_preserving() {
        let a = EffectManifest {
            structure_preserving: true,
            may_change_symbol_counts: false,
            removed_imports: vec![],
        };
        let b = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: false,
            removed_imports: vec![],
        };
        let combined = EffectManifest::combine([a, b]);
        assert!(!combined.structure_preserving);
    }

    #[test]
    fn test_combine_unions_removed_imports() {
        let a = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: true,
            removed_imports: vec!["os".to_string()],
        };
        let b = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: true,
            removed_imports: vec!["sys".to_string()],
        };
        let combined = EffectManifest::combine([a, b]);
        assert_eq!(combined.removed_imports, vec!["os".to_string(), "sys".to_string()]);
        assert!(combined.may_change_symbol_counts);
    }

    #[test]
    fn test_combine_of_empty_is_default() {
        let combined = EffectManifest::combine(std::iter::empty());
        assert_eq!(combined.structure_preserving, false);
        assert_eq!(combined.may_change_symbol_counts, false);
    }
}

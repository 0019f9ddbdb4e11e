//! Guard (spec.md §4.4): multi-layer pre/post verification protecting
//! every edit. Stateless and idempotent; never touches disk.
//!
//! Grounded on the teacher's `plugins::verify` verification-report shape
//! (`ProofCheckResult { gate, status, reason }`, aggregated into a
//! summary) — retargeted from replaying proof gates to replaying the
//! six structural layers below.

use crate::core::plugin_api::{EffectManifest, LanguageParser};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Parse,
    StructuralEquivalence,
    SymbolCounts,
    AstHash,
    Roundtrip,
    ImportPreservation,
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Parse => "parse",
            Layer::StructuralEquivalence => "structural_equivalence",
            Layer::SymbolCounts => "symbol_counts",
            Layer::AstHash => "ast_hash",
            Layer::Roundtrip => "roundtrip",
            Layer::ImportPreservation => "import_preservation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub layer: &'static str,
    pub detail: String,
}

/// Whether a `before`-parse failure means "skip, do not apply" rather
/// than a hard failure (spec.md §4.4 layer 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Pass,
    Skip,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuardResult {
    pub passed: bool,
    /// `true` when the before-bytes failed to parse: the caller must
    /// skip this edit rather than treat it as a hard Guard failure.
    pub skip: bool,
    pub failed_layer: Option<Layer>,
    pub evidence: Vec<Evidence>,
}

impl GuardResult {
    fn pass(evidence: Vec<Evidence>) -> Self {
        Self {
            passed: true,
            skip: false,
            failed_layer: None,
            evidence,
        }
    }

    fn fail(layer: Layer, evidence: Vec<Evidence>) -> Self {
        Self {
            passed: false,
            skip: false,
            failed_layer: Some(layer),
            evidence,
        }
    }

    fn skip(evidence: Vec<Evidence>) -> Self {
        Self {
            passed: false,
            skip: true,
            failed_layer: Some(Layer::Parse),
            evidence,
        }
    }
}

/// Runs all six layers over `(before, after)` using `parser` to parse
/// both sides and `effects` for the structural-effects manifest that
/// bounds layers 2, 3, 4, and 6. `effects` is the manifest for whichever
/// rule(s) produced this edit range — callers checking a multi-rule
/// edit subset pass `EffectManifest::combine` over the rules involved.
pub fn check(
    parser: &dyn LanguageParser,
    effects: &EffectManifest,
    file_path: &str,
    before: &[u8],
    after: &[u8],
    mode: Mode,
) -> GuardResult {
    let mut evidence = Vec::new();

    // Layer 1: parse.
    let before_tree = match parser.parse(file_path, before) {
        Ok(t) => t,
        Err(e) => {
            evidence.push(Evidence {
                layer: Layer::Parse.name(),
                detail: format!("before-bytes failed to parse: {e}"),
            });
            return GuardResult::skip(evidence);
        }
    };
    let after_tree = match parser.parse(file_path, after) {
        Ok(t) => t,
        Err(e) => {
            evidence.push(Evidence {
                layer: Layer::Parse.name(),
                detail: format!("after-bytes failed to parse: {e}"),
            });
            return GuardResult::fail(Layer::Parse, evidence);
        }
    };
    evidence.push(Evidence {
        layer: Layer::Parse.name(),
        detail: "both before and after parsed".into(),
    });

    // Layer 2: structural equivalence (only if the rule declares
    // structure-preserving).
    if effects.structure_preserving {
        let equivalent = before_tree.canonical_hash() == after_tree.canonical_hash();
        evidence.push(Evidence {
            layer: Layer::StructuralEquivalence.name(),
            detail: format!("canonical trees equivalent: {equivalent}"),
        });
        if !equivalent && mode == Mode::Strict {
            return GuardResult::fail(Layer::StructuralEquivalence, evidence);
        }
    }

    // Layer 3: symbol counts.
    let before_counts = before_tree.symbol_counts();
    let after_counts = after_tree.symbol_counts();
    let counts_match = before_counts == after_counts;
    evidence.push(Evidence {
        layer: Layer::SymbolCounts.name(),
        detail: format!("before={before_counts:?} after={after_counts:?}"),
    });
    if !counts_match && !effects.may_change_symbol_counts {
        let is_hard_fail = mode == Mode::Strict;
        if is_hard_fail {
            return GuardResult::fail(Layer::SymbolCounts, evidence);
        }
    }

    // Layer 4: AST hash — symbol identity and order, independent of
    // layer 2's full-text canonical view. Catches a rename or reorder
    // that layer 3's bare count comparison would miss, regardless of
    // whether the rule declares itself structure-preserving.
    let structure_matches = before_tree.structure_hash() == after_tree.structure_hash();
    evidence.push(Evidence {
        layer: Layer::AstHash.name(),
        detail: format!("structure hash matches: {structure_matches}"),
    });
    if !structure_matches && !effects.may_change_symbol_counts {
        return GuardResult::fail(Layer::AstHash, evidence);
    }

    // Layer 5: roundtrip.
    let reemitted = after_tree.reemit();
    let roundtrip_ok = if parser.roundtrip_is_byte_identical() {
        reemitted == after
    } else {
        match parser.parse(file_path, &reemitted) {
            Ok(reparsed) => reparsed.canonical_hash() == after_tree.canonical_hash(),
            Err(_) => false,
        }
    };
    evidence.push(Evidence {
        layer: Layer::Roundtrip.name(),
        detail: format!("roundtrip stable: {roundtrip_ok}"),
    });
    if !roundtrip_ok {
        return GuardResult::fail(Layer::Roundtrip, evidence);
    }

    // Layer 6: import preservation.
    let before_imports = before_tree.imports();
    let after_imports = after_tree.imports();
    let missing: Vec<&String> = before_imports
        .iter()
        .filter(|imp| !after_imports.contains(imp))
        .collect();
    let permitted_removed = |imp: &str| effects.removed_imports.iter().any(|r| r == imp);
    let unpermitted_missing: Vec<&&String> =
        missing.iter().filter(|imp| !permitted_removed(imp)).collect();
    evidence.push(Evidence {
        layer: Layer::ImportPreservation.name(),
        detail: format!("missing imports not covered by effect manifest: {unpermitted_missing:?}"),
    });
    if !unpermitted_missing.is_empty() {
        return GuardResult::fail(Layer::ImportPreservation, evidence);
    }

    GuardResult::pass(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::builtin::codemods::HttpTimeoutCodemod;
    use crate::plugins::builtin::lines::LineParser;
    use crate::core::plugin_api::Codemod;

    #[test]
    fn test_passing_edit_clears_all_layers() {
        let before = b"requests.get(url)\n";
        let after = b"requests.get(url, timeout=30)\n";
        let result = check(&LineParser, &HttpTimeoutCodemod.effects(), "app.py", before, after, Mode::Strict);
        assert!(result.passed);
        assert!(result.failed_layer.is_none());
    }

    #[test]
    fn test_before_parse_failure_is_skip_not_fail() {
        let before = [0xff, 0xfe, 0xfd];
        let after = b"requests.get(url, timeout=30)\n";
        let result = check(&LineParser, &HttpTimeoutCodemod.effects(), "app.py", &before, after, Mode::Strict);
        assert!(result.skip);
        assert!(!result.passed);
    }

    #[test]
    fn test_symbol_count_change_fails_strict_when_not_permitted() {
        let effects = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: false,
            removed_imports: vec![],
        };
        let before = b"def f():\n    pass\n";
        let after = b"def f():\n    pass\ndef g():\n    pass\n";
        let result = check(&LineParser, &effects, "app.py", before, after, Mode::Strict);
        assert!(!result.passed);
        assert_eq!(result.failed_layer, Some(Layer::SymbolCounts));
    }

    #[test]
    fn test_symbol_count_change_permitted_when_whitelisted() {
        let effects = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: true,
            removed_imports: vec!["os".to_string()],
        };
        let before = b"import os\ndef f():\n    pass\n";
        let after = b"def f():\n    pass\n";
        let result = check(&LineParser, &effects, "app.py", before, after, Mode::Strict);
        assert!(result.passed);
    }

    #[test]
    fn test_import_removed_without_permission_fails() {
        // `may_change_symbol_counts: true` so layer 3 doesn't intercept
        // the import-count drop first; `removed_imports` left empty so
        // layer 6 is the one that rejects it.
        let effects = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: true,
            removed_imports: vec![],
        };
        let before = b"import os\n";
        let after = b"";
        let result = check(&LineParser, &effects, "app.py", before, after, Mode::Strict);
        assert!(!result.passed);
        assert_eq!(result.failed_layer, Some(Layer::ImportPreservation));
    }

    #[test]
    fn test_ast_hash_fails_on_rename_not_covered_by_symbol_count_permission() {
        // `structure_preserving: false` so layer 2 is skipped entirely,
        // and the counts are identical (one function before and after)
        // so layer 3 passes — only the distinct structure hash notices
        // the rename, proving layer 4 is reachable on its own.
        let effects = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: false,
            removed_imports: vec![],
        };
        let before = b"def foo():\n    pass\n";
        let after = b"def bar():\n    pass\n";
        let result = check(&LineParser, &effects, "app.py", before, after, Mode::Strict);
        assert!(!result.passed);
        assert_eq!(result.failed_layer, Some(Layer::AstHash));
    }

    #[test]
    fn test_ast_hash_permits_rename_when_symbol_counts_may_change() {
        let effects = EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: true,
            removed_imports: vec![],
        };
        let before = b"def foo():\n    pass\n";
        let after = b"def bar():\n    pass\n";
        let result = check(&LineParser, &effects, "app.py", before, after, Mode::Strict);
        assert!(result.passed);
    }
}

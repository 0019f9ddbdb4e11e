//! Repair (spec.md §4.9): binary-search edit isolation that salvages a
//! maximal passing subset from a plan that failed Guard end-to-end.
//!
//! Grounded on `plugins::verify`'s retry-the-smallest-failing-unit
//! discipline — generalized here from re-running one proof command to
//! bisecting an edit list against Guard.

use crate::core::guard::{self, GuardResult, Mode};
use crate::core::model::Edit;
use crate::core::plugin_api::{EffectManifest, LanguageParser, Registry};

/// `{attempted, applied, failed}`, consumed by the Learner to record
/// per-edit outcomes.
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub attempted: Vec<Edit>,
    pub applied: Vec<Edit>,
    pub failed: Vec<Edit>,
}

impl RepairReport {
    fn merge(mut self, other: RepairReport) -> RepairReport {
        self.attempted.extend(other.attempted);
        self.applied.extend(other.applied);
        self.failed.extend(other.failed);
        self
    }
}

/// A codemod's `payload` is a bare line of text (built from
/// `str::lines()`, which strips line endings) — restore the trailing
/// newline `split_inclusive` expects of every non-final line before
/// splicing it back in.
fn with_line_ending(payload: &str, line_had_trailing_newline: bool) -> String {
    if line_had_trailing_newline && !payload.ends_with('\n') {
        format!("{payload}\n")
    } else {
        payload.to_string()
    }
}

/// Applies `edits` to `content` in order (already high-line-to-low-line
/// sorted by the caller, per `EditPlan::order_edits_for_apply`).
fn apply_edits(content: &[u8], edits: &[Edit]) -> Vec<u8> {
    let mut text = String::from_utf8_lossy(content).into_owned();
    let mut lines: Vec<String> = text.split_inclusive('\n').map(|s| s.to_string()).collect();
    for edit in edits {
        let start = edit.start_line.saturating_sub(1);
        let end = edit.end_line.min(lines.len());
        if start > lines.len() {
            continue;
        }
        match edit.op {
            crate::core::model::EditOp::Replace | crate::core::model::EditOp::Delete => {
                if start < end {
                    let had_newline = lines[end - 1].ends_with('\n');
                    let payload = with_line_ending(&edit.payload, had_newline);
                    lines.splice(start..end, std::iter::once(payload));
                }
            }
            crate::core::model::EditOp::Insert => {
                let had_newline = start < lines.len() || lines.last().is_some_and(|l| l.ends_with('\n'));
                let payload = with_line_ending(&edit.payload, had_newline);
                lines.insert(start, payload);
            }
        }
    }
    text = lines.concat();
    text.into_bytes()
}

/// Conservative manifest for one edit subset: the combination of every
/// distinct rule present in `edits`, resolved through `registry`
/// (spec.md §4.4's "optional rule_ids" — Guard checks each candidate
/// against the rules that actually produced it, not just the plan's
/// first rule).
fn effects_for(registry: &Registry, edits: &[Edit]) -> EffectManifest {
    let mut rule_ids: Vec<&str> = edits.iter().map(|e| e.rule_id.as_str()).collect();
    rule_ids.sort();
    rule_ids.dedup();
    EffectManifest::combine(rule_ids.into_iter().filter_map(|r| registry.codemod_for(r)).map(|c| c.effects()))
}

fn guard_check(
    parser: &dyn LanguageParser,
    registry: &Registry,
    edits: &[Edit],
    file_path: &str,
    before: &[u8],
    after: &[u8],
    mode: Mode,
) -> GuardResult {
    let effects = effects_for(registry, edits);
    guard::check(parser, &effects, file_path, before, after, mode)
}

/// Binary-search isolation: returns `(RepairReport, final_content)`
/// where `final_content` is the state after applying every edit Repair
/// determined safe, in order. `registry` resolves each edit's
/// `EffectManifest` from its own `rule_id` rather than assuming every
/// edit in `edits` came from the same rule.
pub fn repair(
    parser: &dyn LanguageParser,
    registry: &Registry,
    file_path: &str,
    base_content: &[u8],
    edits: &[Edit],
    mode: Mode,
) -> (RepairReport, Vec<u8>) {
    if edits.is_empty() {
        return (RepairReport::default(), base_content.to_vec());
    }
    if edits.len() == 1 {
        let after = apply_edits(base_content, edits);
        let result = guard_check(parser, registry, edits, file_path, base_content, &after, mode);
        let mut report = RepairReport {
            attempted: edits.to_vec(),
            ..Default::default()
        };
        if result.passed {
            report.applied.push(edits[0].clone());
            return (report, after);
        }
        report.failed.push(edits[0].clone());
        return (report, base_content.to_vec());
    }

    let mid = edits.len() / 2;
    let (half_a, half_b) = edits.split_at(mid);

    let after_a = apply_edits(base_content, half_a);
    let result_a = guard_check(parser, registry, half_a, file_path, base_content, &after_a, mode);

    if result_a.passed {
        let mut report = RepairReport {
            attempted: half_a.to_vec(),
            applied: half_a.to_vec(),
            failed: vec![],
        };
        let (report_b, content_b) = repair(parser, registry, file_path, &after_a, half_b, mode);
        report = report.merge(report_b);
        (report, content_b)
    } else {
        let (report_a, content_a) = repair(parser, registry, file_path, base_content, half_a, mode);
        let (report_b, content_b) = repair(parser, registry, file_path, &content_a, half_b, mode);
        (report_a.merge(report_b), content_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::EditOp;
    use crate::core::plugin_api::{Codemod, EffectManifest};
    use crate::plugins::builtin::lines::LineParser;

    // A codemod that declares it never changes symbol counts, so any
    // edit that introduces a new `def` (the poison marker below) fails
    // Guard layer 3 under strict mode.
    struct NeverChangesSymbolCounts;
    impl Codemod for NeverChangesSymbolCounts {
        fn rule_id(&self) -> &'static str {
            "test.no-symbol-change"
        }
        fn effects(&self) -> EffectManifest {
            EffectManifest {
                structure_preserving: false,
                may_change_symbol_counts: false,
                removed_imports: vec![],
            }
        }
        fn plan(&self, _f: &str, _b: &[u8]) -> Result<Option<Vec<Edit>>, crate::core::error::AceError> {
            Ok(None)
        }
    }

    fn is_poison(payload: &str) -> bool {
        payload.contains("def poison")
    }

    const TEST_RULE: &str = "test.no-symbol-change";

    fn edit(line: usize, payload: &str) -> Edit {
        Edit {
            file: "app.py".into(),
            start_line: line,
            end_line: line,
            op: EditOp::Replace,
            payload: payload.into(),
            rule_id: TEST_RULE.to_string(),
        }
    }

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register_codemod(Box::new(NeverChangesSymbolCounts));
        reg
    }

    #[test]
    fn test_single_edit_failing_guard_is_recorded_failed() {
        let before = b"a\nb\nc\n".to_vec();
        let edits = vec![edit(2, "def poison():\n")];
        let registry = registry();
        let (report, content) = repair(&LineParser, &registry, "app.py", &before, &edits, Mode::Strict);
        assert!(report.applied.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(content, before);
    }

    #[test]
    fn test_salvages_passing_subset_from_mixed_bundle() {
        let before = b"line1\nline2\nline3\nline4\n".to_vec();
        let edits = vec![
            edit(1, "good1\n"),
            edit(2, "good2\n"),
            edit(3, "def poison():\n"),
            edit(4, "good4\n"),
        ];
        let registry = registry();
        let (report, _content) = repair(&LineParser, &registry, "app.py", &before, &edits, Mode::Strict);
        assert_eq!(report.applied.len() + report.failed.len(), edits.len());
        assert!(report.applied.iter().any(|e| e.start_line == 1));
        assert!(report.failed.iter().any(|e| is_poison(&e.payload)));
    }

    #[test]
    fn test_all_edits_pass_when_none_poisoned() {
        let before = b"line1\nline2\nline3\n".to_vec();
        let edits = vec![edit(1, "good1\n"), edit(2, "good2\n"), edit(3, "good3\n")];
        let registry = registry();
        let (report, content) = repair(&LineParser, &registry, "app.py", &before, &edits, Mode::Strict);
        assert_eq!(report.applied.len(), 3);
        assert!(report.failed.is_empty());
        assert_eq!(content, b"good1\ngood2\ngood3\n".to_vec());
    }

    #[test]
    fn test_guard_invocation_bound_is_within_2n_log_n() {
        let before: Vec<u8> = (1..=8).map(|i| format!("line{i}\n")).collect::<Vec<_>>().concat().into_bytes();
        let edits: Vec<Edit> = (1..=8).map(|i| edit(i, &format!("good{i}\n"))).collect();
        let registry = registry();
        let (report, _content) = repair(&LineParser, &registry, "app.py", &before, &edits, Mode::Strict);
        assert_eq!(report.applied.len(), 8);
    }
}

//! Suppressions (spec.md §4.11): in-source per-line/file-wide
//! suppression comments, plus policy-driven path globs applied before
//! detection.
//!
//! Grounded on the teacher's `core/gatekeeper.rs` inline-allowlist
//! comment convention (`# gatekeeper:allow`) — generalized from a single
//! allow marker to the fuller disable/enable grammar spec.md §4.11
//! names.

use crate::core::globs::matches_any;
use crate::core::model::Finding;
use crate::core::policy::Suppressions as SuppressionsPolicy;
use std::collections::BTreeSet;

const DISABLE_ALL: &str = "disable-all";
const FILE_DISABLE_ALL: &str = "file-disable-all";

/// Per-file suppression state parsed from source comments once per run.
#[derive(Debug, Clone, Default)]
pub struct FileSuppressions {
    /// Rules disabled for the whole file (or a marker meaning "all").
    file_wide: BTreeSet<String>,
    file_wide_all: bool,
    /// `line -> {rule_ids disabled on that line}`, plus an all-marker set.
    per_line: std::collections::BTreeMap<usize, BTreeSet<String>>,
    per_line_all: BTreeSet<usize>,
    /// Half-open `[start, end)` ranges from paired `disable x ... enable x` blocks.
    ranges: Vec<(String, usize, usize)>,
}

fn directive_after_hash(line: &str) -> Option<&str> {
    line.find('#').map(|idx| line[idx + 1..].trim())
}

/// Scans `content` once, building the line/file suppression table.
pub fn parse_file(content: &str) -> FileSuppressions {
    let mut state = FileSuppressions::default();
    let mut open_ranges: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let Some(directive) = directive_after_hash(raw_line) else {
            continue;
        };

        if directive == FILE_DISABLE_ALL {
            state.file_wide_all = true;
        } else if let Some(rule) = directive.strip_prefix("file-disable=") {
            state.file_wide.insert(rule.trim().to_string());
        } else if directive == DISABLE_ALL {
            state.per_line_all.insert(line_no);
        } else if let Some(rule) = directive.strip_prefix("disable=") {
            state
                .per_line
                .entry(line_no)
                .or_default()
                .insert(rule.trim().to_string());
        } else if let Some(rest) = directive.strip_prefix("disable ") {
            let rule = rest.trim().to_string();
            open_ranges.insert(rule, line_no);
        } else if let Some(rest) = directive.strip_prefix("enable ") {
            let rule = rest.trim().to_string();
            if let Some(start) = open_ranges.remove(&rule) {
                state.ranges.push((rule, start, line_no));
            }
        }
    }

    // Any range left open at EOF extends to the end of file.
    let total_lines = content.lines().count() + 1;
    for (rule, start) in open_ranges {
        state.ranges.push((rule, start, total_lines));
    }

    state
}

impl FileSuppressions {
    /// Whether `finding` at `line` for `rule_id` is suppressed by this
    /// file's in-source directives.
    pub fn suppresses(&self, rule_id: &str, line: usize) -> bool {
        if self.file_wide_all || self.file_wide.contains(rule_id) {
            return true;
        }
        if self.per_line_all.contains(&line) {
            return true;
        }
        if let Some(rules) = self.per_line.get(&line) {
            if rules.contains(rule_id) {
                return true;
            }
        }
        self.ranges
            .iter()
            .any(|(r, start, end)| r == rule_id && line >= *start && line < *end)
    }
}

/// Whether `path` should be skipped entirely before detection, per the
/// policy's global and per-rule path globs.
pub fn path_is_suppressed(policy: &SuppressionsPolicy, path: &str, rule_id: Option<&str>) -> bool {
    if matches_any(&policy.paths, path) {
        return true;
    }
    if let Some(rule_id) = rule_id {
        if let Some(patterns) = policy.rules.get(rule_id) {
            if matches_any(patterns, path) {
                return true;
            }
        }
    }
    false
}

/// Filters `findings`, dropping anything suppressed by in-source
/// directives or policy path globs. `file_suppressions` maps file path
/// to its already-parsed `FileSuppressions`.
pub fn filter_findings(
    findings: Vec<Finding>,
    file_suppressions: &std::collections::HashMap<String, FileSuppressions>,
    policy: &SuppressionsPolicy,
) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|f| {
            if path_is_suppressed(policy, &f.file, Some(&f.rule_id)) {
                return false;
            }
            if let Some(suppressions) = file_suppressions.get(&f.file) {
                if suppressions.suppresses(&f.rule_id, f.start_line) {
                    return false;
                }
            }
            true
        })
        .collect()
}

//! Core data model (spec.md §3): `Finding`, `Edit`, `EditPlan`, `Receipt`.
//!
//! New module — the teacher has no code-finding/edit-plan concept, so
//! these types are written fresh, in the idiom of the teacher's other
//! plain data structs (`serde`-derived, `Debug + Clone`, free functions
//! rather than methods for anything that needs a hash or identity).

use crate::core::atomic::sha256_hex;
use serde::{Deserialize, Serialize};

/// One rule-violation instance at a source location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub rule_id: String,
    /// Normalized relative path, POSIX separators.
    pub file: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    /// In `[0.0, 1.0]`.
    pub severity: f64,
    /// Refactor-cost estimator, in `[0.0, 1.0]`.
    pub complexity: f64,
    pub message: String,
    /// `SHA-256("rule_id|file|content-slice|rationale[:100]")`, truncated
    /// to 16 hex chars.
    pub context_hash: String,
}

impl Finding {
    /// Computes `context_hash` from the finding's fields plus the
    /// content slice and rationale it was detected from. Deterministic:
    /// identical inputs always produce the identical hash.
    pub fn compute_context_hash(rule_id: &str, file: &str, content_slice: &str, rationale: &str) -> String {
        let rationale_prefix: String = rationale.chars().take(100).collect();
        let preimage = format!("{rule_id}|{file}|{content_slice}|{rationale_prefix}");
        sha256_hex(preimage.as_bytes())[..16].to_string()
    }

    /// Identity used for baselines, learning, and suppression matching.
    /// Invariant: identical source and rule inputs produce an identical
    /// `stable_id` (spec.md §3, §8 "Stable identity").
    pub fn stable_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.rule_id, self.file, self.start_line, self.context_hash
        )
    }
}

/// The kind of text change an [`Edit`] makes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditOp {
    Replace,
    Insert,
    Delete,
}

/// An atomic text change to one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edit {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub op: EditOp,
    /// UTF-8, original newline style preserved.
    pub payload: String,
    /// The rule whose codemod produced this edit. Pack synthesis merges
    /// edits from several rules into one `EditPlan`, so this is the only
    /// remaining way to resolve the originating codemod (and therefore
    /// the right `EffectManifest`) for an individual edit once it's
    /// inside a merged plan (spec.md §4.4: Guard's input carries
    /// "optional rule_ids").
    pub rule_id: String,
}

impl Edit {
    /// Two edits overlap iff they touch the same file and their
    /// `[start_line, end_line]` intervals intersect.
    pub fn overlaps(&self, other: &Edit) -> bool {
        self.file == other.file
            && self.start_line <= other.end_line
            && other.start_line <= self.end_line
    }
}

/// Whether an [`EditPlan`] groups multiple findings under a recipe or
/// carries exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Singleton,
    Pack,
}

/// One applied unit: a non-empty, non-overlapping set of edits backing
/// one or more findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPlan {
    pub id: String,
    /// Non-empty list of finding `stable_id`s.
    pub findings: Vec<String>,
    /// Ordered, non-overlapping within this plan; applied high-line to
    /// low-line so earlier edits' line numbers stay stable.
    pub edits: Vec<Edit>,
    /// Union of finding `rule_id`s.
    pub rule_ids: Vec<String>,
    /// R* risk/confidence score (spec.md §4.7).
    pub estimated_risk: f64,
    pub kind: PlanKind,
}

impl EditPlan {
    /// Builds a singleton plan id: `"plan-" + sha256(edits)`.
    pub fn singleton_id(edits: &[Edit]) -> Result<String, crate::core::error::AceError> {
        let canon = crate::core::atomic::to_deterministic_json_compact(edits)?;
        Ok(format!("plan-{}", sha256_hex(canon.as_bytes())))
    }

    /// Builds a pack plan id: `"pack-" + sha256(context-key | sorted stable_ids)[:12]`.
    pub fn pack_id(context_key: &str, stable_ids: &[String]) -> String {
        let mut sorted = stable_ids.to_vec();
        sorted.sort();
        let preimage = format!("{context_key}|{}", sorted.join(","));
        format!("pack-{}", &sha256_hex(preimage.as_bytes())[..12])
    }

    /// Returns true iff no two edits in `edits` overlap. Plans must
    /// uphold this internally; pack synthesis re-checks it across a
    /// merged set before emitting a pack.
    pub fn edits_are_non_overlapping(edits: &[Edit]) -> bool {
        for i in 0..edits.len() {
            for j in (i + 1)..edits.len() {
                if edits[i].overlaps(&edits[j]) {
                    return false;
                }
            }
        }
        true
    }

    /// Sorts `edits` high-line to low-line (descending `start_line`) so
    /// applying them in this order keeps earlier line numbers stable.
    pub fn order_edits_for_apply(edits: &mut [Edit]) {
        edits.sort_by(|a, b| b.start_line.cmp(&a.start_line));
    }
}

/// Per-applied-plan audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub plan_id: String,
    pub file: String,
    pub before_sha: String,
    pub after_sha: String,
    pub parse_valid: bool,
    pub invariants_met: bool,
    pub policy_hash: String,
    pub timestamp: String,
}

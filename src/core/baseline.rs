//! Baseline (spec.md §4.10): deterministic finding identity across runs
//! and NEW/FIXED/EXISTING set comparison.
//!
//! Grounded on the teacher's `core/proof.rs` audit-trail persistence
//! (a flat, sorted, content-hashed record list loaded whole and diffed
//! in memory) — retargeted from proof-run history to finding identity.

use crate::core::atomic::{atomic_write, sha256_hex};
use crate::core::error::AceError;
use crate::core::model::Finding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// `sha256("rule_id|file|start_line|end_line|context_hash").hex[:16]`.
pub fn baseline_id(finding: &Finding) -> String {
    let preimage = format!(
        "{}|{}|{}|{}|{}",
        finding.rule_id, finding.file, finding.start_line, finding.end_line, finding.context_hash
    );
    sha256_hex(preimage.as_bytes())[..16].to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Baseline {
    /// Sorted by baseline_id.
    ids: Vec<String>,
    /// `baseline_id -> severity`, kept alongside for regression detection.
    severities: std::collections::BTreeMap<String, f64>,
}

impl Baseline {
    pub fn from_findings(findings: &[Finding]) -> Baseline {
        let mut ids = Vec::with_capacity(findings.len());
        let mut severities = std::collections::BTreeMap::new();
        for f in findings {
            let id = baseline_id(f);
            severities.insert(id.clone(), f.severity);
            ids.push(id);
        }
        ids.sort();
        ids.dedup();
        Baseline { ids, severities }
    }

    pub fn load(path: &Path) -> Result<Baseline, AceError> {
        if !path.exists() {
            return Ok(Baseline::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AceError> {
        let json = crate::core::atomic::to_deterministic_json_pretty(self)?;
        atomic_write(path, json.as_bytes())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.binary_search(&id.to_string()).is_ok()
    }

    pub fn severity_of(&self, id: &str) -> Option<f64> {
        self.severities.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// NEW = C \ B, FIXED = B \ C, EXISTING = B ∩ C (ids).
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub new: Vec<String>,
    pub fixed: Vec<String>,
    pub existing: Vec<String>,
    /// Subset of `existing` whose severity increased relative to the
    /// baseline's recorded severity.
    pub regressed: Vec<String>,
}

pub fn compare(baseline: &Baseline, current: &[Finding]) -> Comparison {
    let current_ids: BTreeSet<String> = current.iter().map(baseline_id).collect();
    let baseline_ids: BTreeSet<String> = baseline.ids.iter().cloned().collect();

    let new: Vec<String> = current_ids.difference(&baseline_ids).cloned().collect();
    let fixed: Vec<String> = baseline_ids.difference(&current_ids).cloned().collect();
    let existing: Vec<String> = baseline_ids.intersection(&current_ids).cloned().collect();

    let mut current_severity = std::collections::BTreeMap::new();
    for f in current {
        current_severity.insert(baseline_id(f), f.severity);
    }

    let regressed: Vec<String> = existing
        .iter()
        .filter(|id| {
            let before = baseline.severity_of(id).unwrap_or(0.0);
            let after = current_severity.get(*id).copied().unwrap_or(0.0);
            after > before
        })
        .cloned()
        .collect();

    Comparison {
        new,
        fixed,
        existing,
        regressed,
    }
}

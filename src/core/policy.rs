//! Policy (spec.md §6): `policy.toml` — scoring weights, decision
//! thresholds, rule modes, path suppressions, and pack-synthesis knobs.
//!
//! Grounded on the teacher's `core/proof.rs::load_proof_config`: a
//! `serde(default)`-annotated struct loaded with `toml::from_str`, falling
//! back to `Default` when the file is absent rather than erroring.

use crate::core::atomic::sha256_hex;
use crate::core::error::AceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Meta {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

fn default_version() -> String {
    "1".to_string()
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            version: default_version(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scoring {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: f64,
    #[serde(default = "default_suggest_threshold")]
    pub suggest_threshold: f64,
}

fn default_alpha() -> f64 {
    0.7
}
fn default_beta() -> f64 {
    0.3
}
fn default_gamma() -> f64 {
    0.2
}
fn default_auto_threshold() -> f64 {
    0.85
}
fn default_suggest_threshold() -> f64 {
    0.60
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            beta: default_beta(),
            gamma: default_gamma(),
            auto_threshold: default_auto_threshold(),
            suggest_threshold: default_suggest_threshold(),
        }
    }
}

impl Scoring {
    pub fn validate(&self) -> Result<(), AceError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if ![self.alpha, self.beta, self.gamma, self.auto_threshold, self.suggest_threshold]
            .into_iter()
            .all(in_unit)
        {
            return Err(AceError::InvalidState(
                "policy scoring weights and thresholds must be in [0.0, 1.0]".into(),
            ));
        }
        if self.auto_threshold < self.suggest_threshold {
            return Err(AceError::InvalidState(
                "auto_threshold must be >= suggest_threshold".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Limits {
    #[serde(default)]
    pub warn_at: Option<usize>,
    #[serde(default)]
    pub fail_at: Option<usize>,
    #[serde(default)]
    pub fail_on_critical: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleMode {
    AutoFix,
    DetectOnly,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Modes {
    #[serde(flatten, default)]
    pub rule_modes: BTreeMap<String, RuleMode>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RiskClasses {
    #[serde(flatten, default)]
    pub classes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Suppressions {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Packs {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_findings")]
    pub min_findings: usize,
    #[serde(default = "default_true")]
    pub prefer_packs: bool,
}

fn default_true() -> bool {
    true
}
fn default_min_findings() -> usize {
    2
}

impl Default for Packs {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_findings: default_min_findings(),
            prefer_packs: default_true(),
        }
    }
}

/// Full `policy.toml` document (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Policy {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub modes: Modes,
    #[serde(default)]
    pub risk_classes: RiskClasses,
    #[serde(default)]
    pub suppressions: Suppressions,
    #[serde(default)]
    pub packs: Packs,
}

impl Policy {
    pub fn load(path: &Path) -> Result<Self, AceError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let policy: Policy = toml::from_str(&content)?;
        policy.scoring.validate()?;
        Ok(policy)
    }

    pub fn mode_for(&self, rule_id: &str) -> RuleMode {
        self.modes
            .rule_modes
            .get(rule_id)
            .copied()
            .unwrap_or(RuleMode::AutoFix)
    }

    /// Hash stamped on every Receipt (spec.md §6).
    pub fn policy_hash(&self) -> Result<String, AceError> {
        let canon = crate::core::atomic::to_deterministic_json_compact(self)?;
        Ok(sha256_hex(canon.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let policy = Policy::load(&dir.path().join("policy.toml")).unwrap();
        assert_eq!(policy.scoring.alpha, 0.7);
        assert_eq!(policy.packs.min_findings, 2);
    }

    #[test]
    fn test_parses_full_document() {
        let toml_str = r#"
[meta]
version = "1"
description = "test policy"

[scoring]
alpha = 0.7
beta = 0.3
gamma = 0.2
auto_threshold = 0.70
suggest_threshold = 0.60

[limits]
warn_at = 10
fail_at = 50
fail_on_critical = true

[modes]
"net.unsafe-http-timeout" = "auto-fix"
"err.broad-except" = "detect-only"

[risk_classes]
security = ["net.unsafe-http-timeout"]

[suppressions]
paths = ["vendor/**"]

[packs]
enabled = true
min_findings = 2
prefer_packs = true
"#;
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, toml_str).unwrap();
        let policy = Policy::load(&path).unwrap();
        assert_eq!(policy.mode_for("err.broad-except"), RuleMode::DetectOnly);
        assert_eq!(policy.mode_for("net.unsafe-http-timeout"), RuleMode::AutoFix);
        assert_eq!(policy.limits.warn_at, Some(10));
        assert_eq!(policy.risk_classes.classes["security"], vec!["net.unsafe-http-timeout"]);
    }

    #[test]
    fn test_unknown_rule_defaults_to_auto_fix() {
        let policy = Policy::default();
        assert_eq!(policy.mode_for("some.unconfigured.rule"), RuleMode::AutoFix);
    }

    #[test]
    fn test_invalid_threshold_ordering_rejected() {
        let mut policy = Policy::default();
        policy.scoring.auto_threshold = 0.5;
        policy.scoring.suggest_threshold = 0.6;
        assert!(policy.scoring.validate().is_err());
    }

    #[test]
    fn test_out_of_range_weight_rejected() {
        let mut policy = Policy::default();
        policy.scoring.alpha = 1.5;
        assert!(policy.scoring.validate().is_err());
    }

    #[test]
    fn test_policy_hash_is_deterministic() {
        let policy = Policy::default();
        assert_eq!(policy.policy_hash().unwrap(), policy.policy_hash().unwrap());
    }

    #[test]
    fn test_policy_hash_changes_with_content() {
        let a = Policy::default();
        let mut b = Policy::default();
        b.scoring.alpha = 0.5;
        assert_ne!(a.policy_hash().unwrap(), b.policy_hash().unwrap());
    }
}

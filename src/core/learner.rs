//! Learner (spec.md §4.8): per-rule outcome stats, decayed on read;
//! threshold tuning; auto-skiplist from repeated reverts.
//!
//! Grounded on the teacher's `plugins::trust` success/failure counter
//! model (`trust_score = successes / (successes + failures)`, merged
//! into a decaying health score) — generalized from a single scalar per
//! actor to per-rule `{applied, reverted, suggested, skipped}` counters
//! plus the spec's explicit whole-week decay quantization.

use crate::core::atomic::{self, sha256_hex};
use crate::core::error::AceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const SECONDS_PER_WEEK: u64 = 7 * 24 * 60 * 60;
const DECAY_FACTOR: f64 = 0.8;
const MIN_OUTCOMES_FOR_SUCCESS_RATE: u64 = 5;
const THRESHOLD_MIN: f64 = 0.60;
const THRESHOLD_MAX: f64 = 0.85;
const THRESHOLD_STEP: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleStats {
    pub applied: f64,
    pub reverted: f64,
    pub suggested: f64,
    pub skipped: u64,
    #[serde(default)]
    pub consecutive_reverts: BTreeMap<String, u32>,
    pub last_updated: u64,
}

impl RuleStats {
    /// Applies `0.8^weeks_elapsed` decay to `applied`/`reverted`/
    /// `suggested` and resets `last_updated`, quantized to whole weeks
    /// from `current_time` (spec.md §4.8, §9 "deterministic under test").
    pub fn decayed(&self, current_time: u64) -> Self {
        let weeks_elapsed = current_time.saturating_sub(self.last_updated) / SECONDS_PER_WEEK;
        if weeks_elapsed == 0 {
            return self.clone();
        }
        let factor = DECAY_FACTOR.powi(weeks_elapsed as i32);
        Self {
            applied: self.applied * factor,
            reverted: self.reverted * factor,
            suggested: self.suggested * factor,
            skipped: self.skipped,
            consecutive_reverts: self.consecutive_reverts.clone(),
            last_updated: current_time,
        }
    }

    /// `applied / (applied + reverted)`, undefined (`None`) below 5
    /// total outcomes (spec.md §4.8).
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.applied + self.reverted;
        if total < MIN_OUTCOMES_FOR_SUCCESS_RATE as f64 {
            None
        } else {
            Some(self.applied / total)
        }
    }

    pub fn revert_rate(&self) -> Option<f64> {
        let total = self.applied + self.reverted;
        if total < MIN_OUTCOMES_FOR_SUCCESS_RATE as f64 {
            None
        } else {
            Some(self.reverted / total)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Learner {
    stats: BTreeMap<String, RuleStats>,
    /// Per-rule threshold adjustment, additive on top of policy defaults,
    /// clamped into `[0.60, 0.85]`.
    thresholds: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Reverted,
    Suggested,
    Skipped,
}

impl Learner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, AceError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AceError> {
        let json = atomic::to_deterministic_json_pretty(self)?;
        atomic::atomic_write(path, json.as_bytes())
    }

    /// Returns the rule's stats with decay applied as of `current_time`,
    /// without mutating persisted state (decay is applied lazily on read
    /// per DESIGN.md's Open Question resolution).
    pub fn snapshot(&self, rule_id: &str, current_time: u64) -> RuleStats {
        self.stats
            .get(rule_id)
            .map(|s| s.decayed(current_time))
            .unwrap_or_default()
    }

    /// Records an apply-loop or revert-command outcome, updating
    /// `consecutive_reverts[file]` and returning whether this crossed
    /// the skiplist trigger for `(rule_id, file)`.
    pub fn record(&mut self, rule_id: &str, file: &str, outcome: Outcome, current_time: u64) -> bool {
        let decayed = self
            .stats
            .get(rule_id)
            .map(|s| s.decayed(current_time))
            .unwrap_or_default();
        let mut stats = decayed;
        match outcome {
            Outcome::Applied => {
                stats.applied += 1.0;
                stats.consecutive_reverts.remove(file);
            }
            Outcome::Reverted => {
                stats.reverted += 1.0;
                *stats.consecutive_reverts.entry(file.to_string()).or_insert(0) += 1;
            }
            Outcome::Suggested => stats.suggested += 1.0,
            Outcome::Skipped => stats.skipped += 1,
        }
        stats.last_updated = current_time;
        let triggers_skiplist = stats.consecutive_reverts.get(file).copied().unwrap_or(0) >= 3;
        self.stats.insert(rule_id.to_string(), stats);
        triggers_skiplist
    }

    /// `+THRESHOLD_STEP` when the rule's revert rate exceeds 25% (it
    /// should get harder to promote), `-THRESHOLD_STEP` when its success
    /// rate exceeds 80% (it should get easier), 0 when neither streak is
    /// established yet. Shared by both tuned threshold methods below, so
    /// the auto and suggest thresholds for a rule move in lockstep
    /// (spec.md §4.8: "decision thresholds", plural).
    fn tuning_delta(stats: &RuleStats) -> f64 {
        let mut delta = 0.0;
        if let Some(revert_rate) = stats.revert_rate() {
            if revert_rate > 0.25 {
                delta += THRESHOLD_STEP;
            }
        }
        if let Some(success_rate) = stats.success_rate() {
            if success_rate > 0.80 {
                delta -= THRESHOLD_STEP;
            }
        }
        delta
    }

    /// Adjusts `base_auto_threshold` by the learned per-rule delta,
    /// tuning ±0.05 on revert_rate > 25% / success_rate > 80%, clamped
    /// into `[0.60, 0.85]` (spec.md §4.8).
    pub fn tuned_auto_threshold(&self, rule_id: &str, base_auto_threshold: f64, current_time: u64) -> f64 {
        let stats = self.snapshot(rule_id, current_time);
        let base = *self.thresholds.get(rule_id).unwrap_or(&base_auto_threshold);
        (base + Self::tuning_delta(&stats)).clamp(THRESHOLD_MIN, THRESHOLD_MAX)
    }

    /// Same tuning as `tuned_auto_threshold`, applied to the SUGGEST
    /// threshold instead of AUTO (spec.md §4.8's "decision thresholds"
    /// is plural: a rule with a high revert rate should get harder to
    /// even suggest, not just harder to auto-apply).
    pub fn tuned_suggest_threshold(&self, rule_id: &str, base_suggest_threshold: f64, current_time: u64) -> f64 {
        let stats = self.snapshot(rule_id, current_time);
        (base_suggest_threshold + Self::tuning_delta(&stats)).clamp(THRESHOLD_MIN, THRESHOLD_MAX)
    }

    pub fn set_tuned_threshold(&mut self, rule_id: &str, threshold: f64) {
        self.thresholds
            .insert(rule_id.to_string(), threshold.clamp(THRESHOLD_MIN, THRESHOLD_MAX));
    }

    pub fn high_revert_rate(&self, rule_id: &str, current_time: u64) -> bool {
        self.snapshot(rule_id, current_time)
            .revert_rate()
            .map(|r| r > 0.25)
            .unwrap_or(false)
    }

    /// `(0..10)` contribution to priority from the learner's success
    /// rate; 5.0 (neutral midpoint) when undefined.
    pub fn success_rate_avg(&self, rule_id: &str, current_time: u64) -> f64 {
        self.snapshot(rule_id, current_time)
            .success_rate()
            .map(|r| r * 10.0)
            .unwrap_or(5.0)
    }
}

/// Persistent skiplist: `(rule_id, file_path, content-hash)` triples.
/// Auto-populated by the Learner; a file whose content hash changes
/// removes it automatically since the key no longer matches.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Skiplist {
    entries: BTreeMap<String, ()>,
}

fn skiplist_key(rule_id: &str, file: &str, content_hash: &str) -> String {
    format!("{rule_id}|{file}|{content_hash}")
}

impl Skiplist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, AceError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AceError> {
        let json = atomic::to_deterministic_json_pretty(self)?;
        atomic::atomic_write(path, json.as_bytes())
    }

    pub fn add(&mut self, rule_id: &str, file: &str, content_hash: &str) {
        self.entries.insert(skiplist_key(rule_id, file, content_hash), ());
    }

    pub fn contains(&self, rule_id: &str, file: &str, content_hash: &str) -> bool {
        self.entries.contains_key(&skiplist_key(rule_id, file, content_hash))
    }
}

pub fn content_hash_for_skiplist(file_bytes: &[u8]) -> String {
    sha256_hex(file_bytes)
}

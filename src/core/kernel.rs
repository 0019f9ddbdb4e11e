//! Kernel (spec.md §4.3): the detection orchestrator. Enumerates the
//! file set, farms detectors across a bounded worker pool, and merges
//! results deterministically regardless of worker count.
//!
//! Grounded on the teacher's `plugins::gatling` load-generation worker
//! pool (a `rayon` scoped pool consuming a fixed work list, pushing
//! results into a `Mutex`-guarded collector) — retargeted from load
//! generation to file-level detection.

use crate::core::cache::{findings_with_cache, Cache, CacheKey};
use crate::core::model::Finding;
use crate::core::plugin_api::{PolicyView, Registry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Cooperative cancellation flag. Workers check it between files, never
/// mid-parse (spec.md §5).
#[derive(Default)]
pub struct CancellationToken(AtomicBool);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One file dropped from the run without failing it.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

pub struct RunResult {
    pub findings: Vec<Finding>,
    pub partial: bool,
    pub skipped: Vec<SkippedFile>,
}

struct WorkerOutcome {
    findings: Vec<Finding>,
    skipped: Option<SkippedFile>,
}

fn run_one_file(
    registry: &Registry,
    cache: &Mutex<Cache>,
    ruleset_hash: &str,
    cache_enabled: bool,
    now: u64,
    policy_view: &PolicyView,
    file: &str,
    bytes: &[u8],
    soft_timeout: Option<std::time::Duration>,
) -> WorkerOutcome {
    let started = std::time::Instant::now();
    let key = CacheKey::new(file, bytes, ruleset_hash);

    let compute = || -> Result<Vec<Finding>, crate::core::error::AceError> {
        let mut findings = Vec::new();
        for detector in registry.detectors() {
            findings.extend(detector.analyze(file, bytes, policy_view)?);
            if let Some(timeout) = soft_timeout {
                if started.elapsed() > timeout {
                    return Err(crate::core::error::AceError::BudgetExceeded(format!(
                        "detector soft timeout exceeded for {file}"
                    )));
                }
            }
        }
        Ok(findings)
    };

    let result = {
        let mut guard = cache.lock().expect("cache mutex poisoned");
        findings_with_cache(&mut guard, &key, cache_enabled, now, compute)
    };

    match result {
        Ok(findings) => WorkerOutcome {
            findings,
            skipped: None,
        },
        Err(crate::core::error::AceError::BudgetExceeded(reason)) => WorkerOutcome {
            findings: vec![],
            skipped: Some(SkippedFile {
                file: file.to_string(),
                reason: "timeout".to_string() + ": " + &reason,
            }),
        },
        Err(e) => WorkerOutcome {
            findings: vec![Finding {
                rule_id: "internal.parse".to_string(),
                file: file.to_string(),
                start_line: 1,
                end_line: 1,
                severity: 0.0,
                complexity: 0.0,
                message: e.to_string(),
                context_hash: Finding::compute_context_hash("internal.parse", file, "", &e.to_string()),
            }],
            skipped: None,
        },
    }
}

/// Runs every detector in `registry` over `files` (each `(path, bytes)`
/// pair already read from disk by the caller), merging results
/// deterministically regardless of how many workers ran. Cancellation
/// is checked between files; a cancelled run returns `partial=true`
/// with whatever was collected so far.
pub fn run(
    registry: &Registry,
    cache: &mut Cache,
    ruleset_hash: &str,
    cache_enabled: bool,
    now: u64,
    policy_view: &PolicyView,
    files: &[(String, Vec<u8>)],
    cancellation: &CancellationToken,
    soft_timeout: Option<std::time::Duration>,
) -> RunResult {
    let cache_mutex = Mutex::new(std::mem::take(cache));

    let outcomes: Vec<Option<WorkerOutcome>> = {
        use rayon::prelude::*;
        files
            .par_iter()
            .map(|(file, bytes)| {
                if cancellation.is_cancelled() {
                    return None;
                }
                Some(run_one_file(
                    registry,
                    &cache_mutex,
                    ruleset_hash,
                    cache_enabled,
                    now,
                    policy_view,
                    file,
                    bytes,
                    soft_timeout,
                ))
            })
            .collect()
    };

    *cache = cache_mutex.into_inner().expect("cache mutex poisoned");

    let mut findings = Vec::new();
    let mut skipped = Vec::new();
    let mut partial = false;
    for outcome in outcomes {
        match outcome {
            Some(o) => {
                findings.extend(o.findings);
                if let Some(s) = o.skipped {
                    skipped.push(s);
                }
            }
            None => partial = true,
        }
    }

    // Determinism regardless of worker count (spec.md §4.3).
    findings.sort_by(|a, b| {
        (a.file.as_str(), a.start_line, a.end_line, a.rule_id.as_str(), a.context_hash.as_str()).cmp(&(
            b.file.as_str(),
            b.start_line,
            b.end_line,
            b.rule_id.as_str(),
            b.context_hash.as_str(),
        ))
    });
    findings.dedup_by(|a, b| {
        a.file == b.file && a.start_line == b.start_line && a.end_line == b.end_line && a.rule_id == b.rule_id
    });

    skipped.sort_by(|a, b| a.file.cmp(&b.file));

    RunResult {
        findings,
        partial,
        skipped,
    }
}

/// SHA-256 over the sorted, comma-joined list of enabled rule ids plus
/// the engine version (spec.md §4.2).
pub fn ruleset_hash(enabled_rule_ids: &[String]) -> String {
    let mut sorted = enabled_rule_ids.to_vec();
    sorted.sort();
    sorted.dedup();
    let preimage = format!("{}|{}", sorted.join(","), crate::core::cache::ENGINE_VERSION);
    crate::core::atomic::sha256_hex(preimage.as_bytes())
}

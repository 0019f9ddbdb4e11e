//! Engine (spec.md §9 "engine context" note): the top-level `run`
//! orchestrator wiring Kernel → Suppressions → Baseline → Pack Synthesis
//! → Planner → apply loop → Journal → Repair → Learner.
//!
//! Grounded on the teacher's explicit-context threading discipline:
//! `core/broker.rs` and `core/pool.rs` both pass a concrete struct
//! carrying every piece of shared state down into the functions that
//! need it, rather than reaching for a process-wide singleton. `Engine`
//! below is that struct for ACE: every field wraps its own
//! synchronization, and nothing is global.

use crate::core::baseline::{self, Baseline};
use crate::core::cache::Cache;
use crate::core::error::AceError;
use crate::core::guard;
use crate::core::journal::JournalWriter;
use crate::core::kernel::{self, CancellationToken};
use crate::core::learner::{Learner, Outcome, Skiplist};
use crate::core::model::{EditPlan, Finding, Receipt};
use crate::core::pack::{self, FindingPlan, Recipe};
use crate::core::planner::{self, Decision, PlannerContext};
use crate::core::repair;
use crate::core::plugin_api::{LanguageParser, PolicyView, Registry};
use crate::core::policy::Policy;
use crate::core::repomap::RepoMap;
use crate::core::store::ProjectStore;
use crate::core::suppressions::{self, FileSuppressions};
use crate::core::time::{new_event_id, now_iso8601};
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-run caps on edited files/lines (spec.md §7 `BudgetExceeded`).
#[derive(Debug, Clone, Default)]
pub struct Budget {
    pub max_edited_files: Option<usize>,
    pub max_edited_lines: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub fail_on_new: bool,
    pub fail_on_regression: bool,
    pub budget: Budget,
    pub guard_mode: Option<guard::Mode>,
}

/// Outcome counts for one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Applied,
    Reverted,
    Suggested,
    Skipped,
    Deferred,
}

#[derive(Debug, Clone)]
pub struct PlanReport {
    pub plan_id: String,
    pub outcome: PlanOutcome,
    pub rationale: String,
    pub failed_layer: Option<String>,
}

/// User-visible end-of-run surface (spec.md §7): counts by outcome, the
/// receipts directory, and the journal id.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub applied: usize,
    pub reverted: usize,
    pub suggested: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub partial: bool,
    pub receipts_dir: std::path::PathBuf,
    pub journal_path: std::path::PathBuf,
    pub plans: Vec<PlanReport>,
    pub baseline_comparison: Option<baseline::Comparison>,
    pub policy_violation: bool,
}

/// The engine context: every subsystem's handle, explicitly threaded
/// (spec.md §9 "pass an explicit engine context value").
pub struct Engine {
    pub store: ProjectStore,
    pub registry: Registry,
    pub parser: Box<dyn LanguageParser>,
    pub policy: Policy,
    pub cache: Mutex<Cache>,
    pub learner: Mutex<Learner>,
    pub skiplist: Mutex<Skiplist>,
    pub current_time: u64,
}

impl Engine {
    pub fn new(
        store: ProjectStore,
        registry: Registry,
        parser: Box<dyn LanguageParser>,
        policy: Policy,
        cache: Cache,
        learner: Learner,
        skiplist: Skiplist,
        current_time: u64,
    ) -> Self {
        Self {
            store,
            registry,
            parser,
            policy,
            cache: Mutex::new(cache),
            learner: Mutex::new(learner),
            skiplist: Mutex::new(skiplist),
            current_time,
        }
    }

    fn read_files(&self, files: &[String]) -> Result<Vec<(String, Vec<u8>)>, AceError> {
        files
            .iter()
            .map(|f| {
                let bytes = std::fs::read(self.store.resolve(f))?;
                Ok((f.clone(), bytes))
            })
            .collect()
    }

    /// Runs one full analysis+apply pass over `files` (relative paths).
    /// `repomap` and `recipes` are caller-supplied (built once per
    /// session so reruns against the same tree reuse the same signals).
    pub fn run(
        &mut self,
        files: &[String],
        repomap: &RepoMap,
        recipes: &[Recipe],
        cancellation: &CancellationToken,
        options: &RunOptions,
    ) -> Result<RunSummary, AceError> {
        self.store.ensure_dirs()?;
        let run_id = new_event_id();
        let journal_writer = JournalWriter::new(self.store.journal_path(&run_id));

        let contents = self.read_files(files)?;

        let enabled_rule_ids = self.registry.all_rule_ids();
        let ruleset_hash = kernel::ruleset_hash(&enabled_rule_ids);
        let policy_view = PolicyView {
            enabled_rule_ids: enabled_rule_ids.clone(),
        };

        let kernel_result = {
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            kernel::run(
                &self.registry,
                &mut cache,
                &ruleset_hash,
                true,
                self.current_time,
                &policy_view,
                &contents,
                cancellation,
                None,
            )
        };

        let mut file_suppressions: HashMap<String, FileSuppressions> = HashMap::new();
        for (path, bytes) in &contents {
            let text = String::from_utf8_lossy(bytes);
            file_suppressions.insert(path.clone(), suppressions::parse_file(&text));
        }
        let findings = suppressions::filter_findings(
            kernel_result.findings,
            &file_suppressions,
            &self.policy.suppressions,
        );

        let findings = self.filter_skiplisted(findings, &contents);

        let baseline_path = self.store.baseline_path();
        let baseline = Baseline::load(&baseline_path)?;
        let baseline_comparison = if baseline.is_empty() {
            None
        } else {
            Some(baseline::compare(&baseline, &findings))
        };

        let finding_plans = self.build_finding_plans(&findings, &contents)?;
        let plans = if self.policy.packs.enabled {
            pack::synthesize(&finding_plans, recipes, repomap, &self.policy)
        } else {
            finding_plans
                .iter()
                .map(|fp| EditPlan {
                    id: EditPlan::singleton_id(&fp.edits).unwrap_or_else(|_| format!("plan-{}", fp.finding.stable_id())),
                    findings: vec![fp.finding.stable_id()],
                    edits: fp.edits.clone(),
                    rule_ids: vec![fp.finding.rule_id.clone()],
                    estimated_risk: planner::r_star(&self.policy, fp.finding.severity, fp.finding.complexity, None),
                    kind: crate::core::model::PlanKind::Singleton,
                })
                .collect()
        };

        let line_counts: HashMap<String, usize> = contents
            .iter()
            .map(|(f, b)| (f.clone(), String::from_utf8_lossy(b).lines().count()))
            .collect();
        let density = crate::core::repomap::density_by_file(repomap, &line_counts);
        let recency = crate::core::repomap::recency_by_file(repomap);
        let cost_ranks = HashMap::new();

        let learner_snapshot = self.learner.lock().expect("learner mutex poisoned").clone();
        let ctx = PlannerContext {
            policy: &self.policy,
            learner: &learner_snapshot,
            density: &density,
            recency: &recency,
            cost_ranks: &cost_ranks,
            current_time: self.current_time,
        };
        let actions = planner::plan_actions(&plans, &ctx);

        let plans_by_id: HashMap<&str, &EditPlan> = plans.iter().map(|p| (p.id.as_str(), p)).collect();
        let mut file_bytes: HashMap<String, Vec<u8>> = contents.into_iter().collect();

        let mut reports = Vec::new();
        let mut applied = 0usize;
        let mut reverted = 0usize;
        let mut suggested = 0usize;
        let mut skipped = 0usize;
        let mut deferred = 0usize;
        let mut edited_files: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut edited_lines = 0usize;

        for action in &actions {
            let Some(plan) = plans_by_id.get(action.plan_id.as_str()) else {
                continue;
            };

            match action.decision {
                Decision::Skip => {
                    skipped += 1;
                    reports.push(PlanReport {
                        plan_id: action.plan_id.clone(),
                        outcome: PlanOutcome::Skipped,
                        rationale: action.rationale.clone(),
                        failed_layer: None,
                    });
                    continue;
                }
                Decision::Suggest => {
                    suggested += 1;
                    self.learner_record(&plan.rule_ids, plan_first_file(plan), Outcome::Suggested, None);
                    reports.push(PlanReport {
                        plan_id: action.plan_id.clone(),
                        outcome: PlanOutcome::Suggested,
                        rationale: action.rationale.clone(),
                        failed_layer: None,
                    });
                    continue;
                }
                Decision::Auto => {}
            }

            if let Some(max_files) = options.budget.max_edited_files {
                let would_touch_new_file = plan.edits.iter().any(|e| !edited_files.contains(&e.file));
                if would_touch_new_file && edited_files.len() >= max_files {
                    deferred += 1;
                    reports.push(PlanReport {
                        plan_id: action.plan_id.clone(),
                        outcome: PlanOutcome::Deferred,
                        rationale: "budget: max_edited_files reached".to_string(),
                        failed_layer: None,
                    });
                    continue;
                }
            }
            let plan_line_span: usize = plan.edits.iter().map(|e| e.end_line - e.start_line + 1).sum();
            if let Some(max_lines) = options.budget.max_edited_lines {
                if edited_lines + plan_line_span > max_lines {
                    deferred += 1;
                    reports.push(PlanReport {
                        plan_id: action.plan_id.clone(),
                        outcome: PlanOutcome::Deferred,
                        rationale: "budget: max_edited_lines reached".to_string(),
                        failed_layer: None,
                    });
                    continue;
                }
            }

            let report = self.apply_plan(plan, &mut file_bytes, &journal_writer, options)?;
            match report.outcome {
                PlanOutcome::Applied => {
                    applied += 1;
                    for e in &plan.edits {
                        edited_files.insert(e.file.clone());
                    }
                    edited_lines += plan_line_span;
                }
                PlanOutcome::Reverted => reverted += 1,
                _ => {}
            }
            reports.push(report);
        }

        {
            let mut cache = self.cache.lock().expect("cache mutex poisoned");
            cache.save(&self.store.cache_path())?;
        }
        {
            let learner = self.learner.lock().expect("learner mutex poisoned");
            learner.save(&self.store.learn_path())?;
        }
        {
            let skiplist = self.skiplist.lock().expect("skiplist mutex poisoned");
            skiplist.save(&self.store.skiplist_path())?;
        }

        let policy_violation = match &baseline_comparison {
            Some(cmp) => {
                (options.fail_on_new && !cmp.new.is_empty()) || (options.fail_on_regression && !cmp.regressed.is_empty())
            }
            None => false,
        };

        Ok(RunSummary {
            run_id,
            applied,
            reverted,
            suggested,
            skipped,
            deferred,
            partial: kernel_result.partial,
            receipts_dir: self.store.receipts_dir(),
            journal_path: journal_writer.path().to_path_buf(),
            plans: reports,
            baseline_comparison,
            policy_violation,
        })
    }

    fn filter_skiplisted(&self, findings: Vec<Finding>, contents: &[(String, Vec<u8>)]) -> Vec<Finding> {
        let content_hash_of: HashMap<&str, String> = contents
            .iter()
            .map(|(f, b)| (f.as_str(), crate::core::learner::content_hash_for_skiplist(b)))
            .collect();
        let skiplist = self.skiplist.lock().expect("skiplist mutex poisoned");
        findings
            .into_iter()
            .filter(|f| {
                let hash = content_hash_of.get(f.file.as_str()).map(String::as_str).unwrap_or("");
                !skiplist.contains(&f.rule_id, &f.file, hash)
            })
            .collect()
    }

    fn build_finding_plans(
        &self,
        findings: &[Finding],
        contents: &[(String, Vec<u8>)],
    ) -> Result<Vec<FindingPlan>, AceError> {
        let bytes_by_file: HashMap<&str, &[u8]> = contents.iter().map(|(f, b)| (f.as_str(), b.as_slice())).collect();
        let mut out = Vec::new();
        for finding in findings {
            let Some(codemod) = self.registry.codemod_for(&finding.rule_id) else {
                continue;
            };
            let Some(bytes) = bytes_by_file.get(finding.file.as_str()) else {
                continue;
            };
            if let Some(edits) = codemod.plan(&finding.file, bytes)? {
                out.push(FindingPlan {
                    finding: finding.clone(),
                    edits,
                });
            }
        }
        Ok(out)
    }

    /// Records an outcome per rule in `rule_ids` and, when the Learner
    /// reports three consecutive reverts for a `(rule_id, file)` pair,
    /// adds it to the skiplist keyed by `content_hash` so the next run's
    /// `filter_skiplisted` drops its finding before it ever reaches
    /// planning (spec.md §4.8). `content_hash` is the file's current
    /// on-disk content at the moment of this outcome; callers pass `None`
    /// for outcomes (`Suggested`) that never trigger the skiplist.
    fn learner_record(&self, rule_ids: &[String], file: &str, outcome: Outcome, content_hash: Option<&str>) {
        let mut learner = self.learner.lock().expect("learner mutex poisoned");
        for rule_id in rule_ids {
            let triggers = learner.record(rule_id, file, outcome, self.current_time);
            if triggers {
                if let Some(hash) = content_hash {
                    let mut skiplist = self.skiplist.lock().expect("skiplist mutex poisoned");
                    skiplist.add(rule_id, file, hash);
                }
            }
        }
    }

    /// Runs Guard over `plan`'s edits, reaching for Repair's binary-search
    /// isolation whenever more than one edit is in play so a single bad
    /// edit doesn't revert edits that would otherwise have passed
    /// (spec.md §4.9). A singleton plan's one edit is unaffected: Repair's
    /// one-edit branch is the same all-or-nothing Guard check this used
    /// to run directly.
    fn apply_plan(
        &self,
        plan: &EditPlan,
        file_bytes: &mut HashMap<String, Vec<u8>>,
        journal_writer: &JournalWriter,
        options: &RunOptions,
    ) -> Result<PlanReport, AceError> {
        let file = plan_first_file(plan).to_string();
        let before = file_bytes.get(&file).cloned().unwrap_or_default();
        let mut edits = plan.edits.clone();
        EditPlan::order_edits_for_apply(&mut edits);

        journal_writer.append_intent(&self.store, &file, &plan.id, plan.rule_ids.clone(), &before)?;

        for rule_id in &plan.rule_ids {
            if self.registry.codemod_for(rule_id).is_none() {
                return Err(AceError::NotFound(format!(
                    "no codemod registered for rule {rule_id} in plan {}",
                    plan.id
                )));
            }
        }

        let mode = options.guard_mode.unwrap_or(guard::Mode::Strict);
        let (repair_report, after) =
            repair::repair(self.parser.as_ref(), &self.registry, &file, &before, &edits, mode);

        if repair_report.applied.is_empty() {
            let reason = "guard failed; repair salvaged no edits".to_string();
            journal_writer.append_revert(&file, &plan.id, &reason)?;
            let content_hash = crate::core::learner::content_hash_for_skiplist(&before);
            self.learner_record(&plan.rule_ids, &file, Outcome::Reverted, Some(&content_hash));
            return Ok(PlanReport {
                plan_id: plan.id.clone(),
                outcome: PlanOutcome::Reverted,
                rationale: reason,
                failed_layer: None,
            });
        }

        crate::core::atomic::atomic_write(&self.store.resolve(&file), &after)?;
        let receipt = Receipt {
            plan_id: plan.id.clone(),
            file: file.clone(),
            before_sha: crate::core::atomic::sha256_hex(&before),
            after_sha: crate::core::atomic::sha256_hex(&after),
            parse_valid: true,
            invariants_met: repair_report.failed.is_empty(),
            policy_hash: self.policy.policy_hash()?,
            timestamp: now_iso8601(),
        };
        let receipt_json = crate::core::atomic::to_deterministic_json_pretty(&receipt)?;
        crate::core::atomic::atomic_write(&self.store.receipt_path(&plan.id), receipt_json.as_bytes())?;
        journal_writer.append_success(&file, &plan.id, &after, &plan.id)?;
        file_bytes.insert(file.clone(), after);
        self.learner_record(&plan.rule_ids, &file, Outcome::Applied, None);

        let rationale = if repair_report.failed.is_empty() {
            "guard passed".to_string()
        } else {
            format!(
                "repair salvaged {} of {} edits",
                repair_report.applied.len(),
                edits.len()
            )
        };
        Ok(PlanReport {
            plan_id: plan.id.clone(),
            outcome: PlanOutcome::Applied,
            rationale,
            failed_layer: None,
        })
    }
}

fn plan_first_file(plan: &EditPlan) -> &str {
    plan.edits.first().map(|e| e.file.as_str()).unwrap_or("")
}

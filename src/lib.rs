//! ACE: Autonomous Code-health Engine
//!
//! ACE detects rule violations in a source tree, groups them into
//! guarded edit plans, and applies the ones it is confident about —
//! verifying every edit against a multi-layer structural check before
//! it ever touches disk, and recording enough in its append-only
//! journal to roll any of it back.
//!
//! # Crate Structure
//!
//! - [`core`]: the closed subsystems a run is built from — Atomic
//!   Store, RepoMap, Cache, Kernel, Guard, Journal, Planner, Learner,
//!   Pack Synthesis, Repair, Policy, Baseline, Suppressions.
//! - [`plugins`]: the open, registry-based subsystems — the bundled
//!   language parser and the reference detector/codemod pair.

pub mod cli;
pub mod core;
pub mod plugins;

use crate::core::baseline::Baseline;
use crate::core::engine::{Budget, Engine, RunOptions, RunSummary};
use crate::core::error::AceError;
use crate::core::guard;
use crate::core::journal;
use crate::core::kernel::{self, CancellationToken};
use crate::core::learner::{Learner as LearnerState, Skiplist};
use crate::core::model::Finding;
use crate::core::pack::Recipe;
use crate::core::plugin_api::PolicyView;
use crate::core::policy::Policy;
use crate::core::repomap::{self, RepoMap};
use crate::core::store::ProjectStore;
use crate::core::suppressions;
use crate::core::time::now_epoch_secs;
use cli::{
    ApplyCli, BaselineCli, BaselineCommand, Cli, Command, FileSetCli, LearnCli, LearnCommand,
    PolicyCli, PolicyCommand, RecoverCli, RevertCli,
};
use clap::Parser;

/// Resolves the project root: `--project` if given, else the current
/// working directory. ACE has no notion of an ancestor-search project
/// marker — `.ace/` is created wherever it is pointed, unlike the
/// teacher's ancestor-walking `find_decapod_project_root`.
fn project_root(explicit: Option<std::path::PathBuf>) -> Result<std::path::PathBuf, AceError> {
    match explicit {
        Some(p) => Ok(std::fs::canonicalize(p)?),
        None => Ok(std::env::current_dir()?),
    }
}

/// Files named on the command line, or every source file RepoMap's
/// walk discovers when none are given.
fn resolve_file_set(store: &ProjectStore, repomap: &RepoMap, explicit: &[String]) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    let mut files: Vec<String> = repomap
        .entries
        .iter()
        .map(|e| e.file.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    files.retain(|f| store.resolve(f).is_file());
    files
}

fn load_repomap_and_policy(store: &ProjectStore) -> Result<(RepoMap, Policy), AceError> {
    let repomap = repomap::build(&store.project_root)?;
    let policy = Policy::load(&store.policy_path())?;
    Ok((repomap, policy))
}

/// Entry point called by `main`. Returns the process exit code per
/// spec.md §6: 0 success, 1 operational error (surfaced as `Err`), 2
/// policy violation.
pub fn run() -> Result<i32, AceError> {
    let cli = Cli::parse();
    let root = project_root(cli.project)?;
    let store = ProjectStore::new(&root);
    store.ensure_dirs()?;

    match cli.command {
        Command::Version => {
            println!("ace {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::Analyze(args) => run_analyze(&store, args, cli.json),
        Command::Plan(args) => run_plan(&store, args, cli.json),
        Command::Apply(args) => run_apply(&store, args, cli.json),
        Command::Revert(args) => run_revert(&store, args),
        Command::Recover(args) => run_recover(&store, args),
        Command::Baseline(args) => run_baseline(&store, args, cli.json),
        Command::Repomap => run_repomap(&store, cli.json),
        Command::Policy(args) => run_policy(&store, args, cli.json),
        Command::Learn(args) => run_learn(&store, args, cli.json),
    }
}

fn detect(store: &ProjectStore, policy: &Policy, files: &[String]) -> Result<Vec<Finding>, AceError> {
    let registry = plugins::builtin::default_registry();
    let contents: Vec<(String, Vec<u8>)> = files
        .iter()
        .map(|f| Ok((f.clone(), std::fs::read(store.resolve(f))?)))
        .collect::<Result<_, AceError>>()?;

    let enabled_rule_ids = registry.all_rule_ids();
    let ruleset_hash = kernel::ruleset_hash(&enabled_rule_ids);
    let policy_view = PolicyView {
        enabled_rule_ids,
    };
    let mut cache = crate::core::cache::Cache::load(&store.cache_path())?;
    let result = kernel::run(
        &registry,
        &mut cache,
        &ruleset_hash,
        true,
        now_epoch_secs(),
        &policy_view,
        &contents,
        &CancellationToken::new(),
        None,
    );
    cache.save(&store.cache_path())?;

    let mut file_suppressions = std::collections::HashMap::new();
    for (path, bytes) in &contents {
        let text = String::from_utf8_lossy(bytes);
        file_suppressions.insert(path.clone(), suppressions::parse_file(&text));
    }
    Ok(suppressions::filter_findings(result.findings, &file_suppressions, &policy.suppressions))
}

fn run_analyze(store: &ProjectStore, args: FileSetCli, json: bool) -> Result<i32, AceError> {
    let (repomap, policy) = load_repomap_and_policy(store)?;
    let files = resolve_file_set(store, &repomap, &args.files);
    let findings = detect(store, &policy, &files)?;

    if json {
        println!("{}", crate::core::atomic::to_deterministic_json_pretty(&findings)?);
    } else {
        use colored::Colorize;
        println!("{} {} finding(s)", "ace analyze:".bright_white(), findings.len().to_string().bright_yellow());
        for f in &findings {
            println!("  {}:{} {} {}", f.file, f.start_line, f.rule_id.bright_cyan(), f.message);
        }
    }
    Ok(0)
}

fn run_plan(store: &ProjectStore, args: FileSetCli, json: bool) -> Result<i32, AceError> {
    let (repomap, policy) = load_repomap_and_policy(store)?;
    let files = resolve_file_set(store, &repomap, &args.files);
    let findings = detect(store, &policy, &files)?;

    let registry = plugins::builtin::default_registry();
    let contents: Vec<(String, Vec<u8>)> = files
        .iter()
        .map(|f| Ok((f.clone(), std::fs::read(store.resolve(f))?)))
        .collect::<Result<_, AceError>>()?;
    let bytes_by_file: std::collections::HashMap<&str, &[u8]> =
        contents.iter().map(|(f, b)| (f.as_str(), b.as_slice())).collect();

    let mut finding_plans = Vec::new();
    for finding in &findings {
        let Some(codemod) = registry.codemod_for(&finding.rule_id) else {
            continue;
        };
        let Some(bytes) = bytes_by_file.get(finding.file.as_str()) else {
            continue;
        };
        if let Some(edits) = codemod.plan(&finding.file, bytes)? {
            finding_plans.push(crate::core::pack::FindingPlan {
                finding: finding.clone(),
                edits,
            });
        }
    }

    let recipes: Vec<Recipe> = vec![];
    let plans = if policy.packs.enabled {
        crate::core::pack::synthesize(&finding_plans, &recipes, &repomap, &policy)
    } else {
        finding_plans
            .iter()
            .map(|fp| crate::core::model::EditPlan {
                id: crate::core::model::EditPlan::singleton_id(&fp.edits)
                    .unwrap_or_else(|_| format!("plan-{}", fp.finding.stable_id())),
                findings: vec![fp.finding.stable_id()],
                edits: fp.edits.clone(),
                rule_ids: vec![fp.finding.rule_id.clone()],
                estimated_risk: crate::core::planner::r_star(&policy, fp.finding.severity, fp.finding.complexity, None),
                kind: crate::core::model::PlanKind::Singleton,
            })
            .collect()
    };

    let line_counts: std::collections::HashMap<String, usize> = contents
        .iter()
        .map(|(f, b)| (f.clone(), String::from_utf8_lossy(b).lines().count()))
        .collect();
    let density = repomap::density_by_file(&repomap, &line_counts);
    let recency = repomap::recency_by_file(&repomap);
    let learner = LearnerState::load(&store.learn_path())?;
    let ctx = crate::core::planner::PlannerContext {
        policy: &policy,
        learner: &learner,
        density: &density,
        recency: &recency,
        cost_ranks: &std::collections::HashMap::new(),
        current_time: now_epoch_secs(),
    };
    let actions = crate::core::planner::plan_actions(&plans, &ctx);

    if json {
        #[derive(serde::Serialize)]
        struct ActionView<'a> {
            plan_id: &'a str,
            decision: String,
            r_star: f64,
            priority: f64,
            rationale: &'a str,
        }
        let views: Vec<ActionView> = actions
            .iter()
            .map(|a| ActionView {
                plan_id: &a.plan_id,
                decision: format!("{:?}", a.decision),
                r_star: a.r_star,
                priority: a.priority,
                rationale: &a.rationale,
            })
            .collect();
        println!("{}", crate::core::atomic::to_deterministic_json_pretty(&views)?);
    } else {
        use colored::Colorize;
        println!("{} {} plan(s)", "ace plan:".bright_white(), actions.len().to_string().bright_yellow());
        for a in &actions {
            println!("  {} {:?} (risk {:.3}) — {}", a.plan_id, a.decision, a.r_star, a.rationale);
        }
    }
    Ok(0)
}

fn run_apply(store: &ProjectStore, args: ApplyCli, json: bool) -> Result<i32, AceError> {
    let (repomap, policy) = load_repomap_and_policy(store)?;
    let files = resolve_file_set(store, &repomap, &args.files);

    let registry = plugins::builtin::default_registry();
    let cache = crate::core::cache::Cache::load(&store.cache_path())?;
    let learner = LearnerState::load(&store.learn_path())?;
    let skiplist = Skiplist::load(&store.skiplist_path())?;
    let parser = Box::new(crate::plugins::builtin::lines::LineParser);

    let mut engine = Engine::new(store.clone(), registry, parser, policy, cache, learner, skiplist, now_epoch_secs());

    let options = RunOptions {
        fail_on_new: args.fail_on_new,
        fail_on_regression: args.fail_on_regression,
        budget: Budget {
            max_edited_files: args.max_edited_files,
            max_edited_lines: args.max_edited_lines,
        },
        guard_mode: Some(if args.lenient { guard::Mode::Lenient } else { guard::Mode::Strict }),
    };

    let recipes: Vec<Recipe> = vec![];
    let summary = engine.run(&files, &repomap, &recipes, &CancellationToken::new(), &options)?;

    print_run_summary(&summary, json)?;
    Ok(if summary.policy_violation { 2 } else { 0 })
}

fn print_run_summary(summary: &RunSummary, json: bool) -> Result<(), AceError> {
    if json {
        #[derive(serde::Serialize)]
        struct JsonSummary<'a> {
            run_id: &'a str,
            applied: usize,
            reverted: usize,
            suggested: usize,
            skipped: usize,
            deferred: usize,
            partial: bool,
            policy_violation: bool,
        }
        let view = JsonSummary {
            run_id: &summary.run_id,
            applied: summary.applied,
            reverted: summary.reverted,
            suggested: summary.suggested,
            skipped: summary.skipped,
            deferred: summary.deferred,
            partial: summary.partial,
            policy_violation: summary.policy_violation,
        };
        println!("{}", crate::core::atomic::to_deterministic_json_pretty(&view)?);
    } else {
        use colored::Colorize;
        println!(
            "{} {}  applied={} reverted={} suggested={} skipped={} deferred={}",
            "ace run:".bright_white(),
            summary.run_id.bright_cyan(),
            summary.applied.to_string().bright_green(),
            summary.reverted.to_string().bright_red(),
            summary.suggested,
            summary.skipped,
            summary.deferred,
        );
        if summary.partial {
            println!("  {}", "partial: one or more files were skipped under budget/timeout".yellow());
        }
        if let Some(cmp) = &summary.baseline_comparison {
            println!(
                "  baseline: new={} fixed={} existing={} regressed={}",
                cmp.new.len(),
                cmp.fixed.len(),
                cmp.existing.len(),
                cmp.regressed.len()
            );
        }
        if summary.policy_violation {
            println!("  {}", "policy violation: gating condition triggered".bright_red());
        }
    }
    Ok(())
}

fn run_revert(store: &ProjectStore, args: RevertCli) -> Result<i32, AceError> {
    let writer = journal::JournalWriter::new(store.journal_path(&args.run));
    let entries = journal::read_entries(store.journal_path(&args.run).as_path())?;
    journal::revert_plan(store, &writer, &entries, &args.plan)?;
    println!("reverted plan {}", args.plan);
    Ok(0)
}

fn run_recover(store: &ProjectStore, args: RecoverCli) -> Result<i32, AceError> {
    let path = store.journal_path(&args.run);
    let entries = journal::read_entries(&path)?;
    let writer = journal::JournalWriter::new(path);
    let recovered = journal::recover(store, &writer, &entries)?;
    for file in &recovered {
        println!("recovered: {file}");
    }
    if recovered.is_empty() {
        println!("nothing to recover");
    }
    Ok(0)
}

fn run_baseline(store: &ProjectStore, args: BaselineCli, json: bool) -> Result<i32, AceError> {
    match args.command {
        BaselineCommand::Update(file_args) => {
            let (repomap, policy) = load_repomap_and_policy(store)?;
            let files = resolve_file_set(store, &repomap, &file_args.files);
            let findings = detect(store, &policy, &files)?;
            let baseline = Baseline::from_findings(&findings);
            baseline.save(&store.baseline_path())?;
            println!("baseline updated: {} finding(s)", baseline.len());
            Ok(0)
        }
        BaselineCommand::Show => {
            let baseline = Baseline::load(&store.baseline_path())?;
            if json {
                println!("{{\"count\":{}}}", baseline.len());
            } else {
                println!("baseline: {} finding(s)", baseline.len());
            }
            Ok(0)
        }
    }
}

fn run_repomap(store: &ProjectStore, json: bool) -> Result<i32, AceError> {
    let map = repomap::build(&store.project_root)?;
    let serialized = crate::core::atomic::to_deterministic_json_pretty(&map)?;
    crate::core::atomic::atomic_write(&store.symbols_path(), serialized.as_bytes())?;
    let fp = repomap::fingerprint(&map)?;
    if json {
        println!("{serialized}");
    } else {
        println!("repomap: {} entries, fingerprint {}", map.entries.len(), &fp[..16]);
    }
    Ok(0)
}

fn run_policy(store: &ProjectStore, args: PolicyCli, json: bool) -> Result<i32, AceError> {
    let policy = Policy::load(&store.policy_path())?;
    match args.command {
        PolicyCommand::Eval => {
            if json {
                println!("{}", crate::core::atomic::to_deterministic_json_pretty(&policy)?);
            } else {
                println!(
                    "scoring: alpha={} beta={} gamma={} auto_threshold={} suggest_threshold={}",
                    policy.scoring.alpha,
                    policy.scoring.beta,
                    policy.scoring.gamma,
                    policy.scoring.auto_threshold,
                    policy.scoring.suggest_threshold,
                );
                println!("policy_hash={}", policy.policy_hash()?);
            }
            Ok(0)
        }
        PolicyCommand::Riskmap => {
            if json {
                println!("{}", crate::core::atomic::to_deterministic_json_pretty(&policy.risk_classes.classes)?);
            } else {
                for (class, rules) in &policy.risk_classes.classes {
                    println!("{class}: {}", rules.join(", "));
                }
            }
            Ok(0)
        }
    }
}

fn run_learn(store: &ProjectStore, args: LearnCli, json: bool) -> Result<i32, AceError> {
    let LearnCommand::Show { rule } = args.command;
    let learner = LearnerState::load(&store.learn_path())?;
    let policy = Policy::load(&store.policy_path())?;
    let now = now_epoch_secs();
    let stats = learner.snapshot(&rule, now);
    let tuned_auto = learner.tuned_auto_threshold(&rule, policy.scoring.auto_threshold, now);
    let tuned_suggest = learner.tuned_suggest_threshold(&rule, policy.scoring.suggest_threshold, now);
    if json {
        #[derive(serde::Serialize)]
        struct View {
            rule: String,
            applied: f64,
            reverted: f64,
            suggested: f64,
            skipped: u64,
            success_rate: Option<f64>,
            tuned_auto_threshold: f64,
            tuned_suggest_threshold: f64,
        }
        let view = View {
            rule: rule.clone(),
            applied: stats.applied,
            reverted: stats.reverted,
            suggested: stats.suggested,
            skipped: stats.skipped,
            success_rate: stats.success_rate(),
            tuned_auto_threshold: tuned_auto,
            tuned_suggest_threshold: tuned_suggest,
        };
        println!("{}", crate::core::atomic::to_deterministic_json_pretty(&view)?);
    } else {
        println!(
            "{rule}: applied={:.2} reverted={:.2} suggested={:.2} skipped={} success_rate={:?} \
             tuned_auto_threshold={:.3} tuned_suggest_threshold={:.3}",
            stats.applied,
            stats.reverted,
            stats.suggested,
            stats.skipped,
            stats.success_rate(),
            tuned_auto,
            tuned_suggest
        );
    }
    Ok(0)
}

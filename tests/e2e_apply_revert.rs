//! End-to-end apply/revert/recover: drives `Engine::run` the way the
//! `ace apply` CLI command does, then exercises the journal-level
//! revert and crash-recovery paths a user or a crashed process would.

use ace::core::cache::Cache;
use ace::core::engine::{Engine, RunOptions};
use ace::core::kernel::CancellationToken;
use ace::core::learner::{Learner, Skiplist};
use ace::core::pack::Recipe;
use ace::core::policy::Policy;
use ace::core::plugin_api::Registry;
use ace::core::repomap::RepoMap;
use ace::core::store::ProjectStore;
use ace::core::{journal, suppressions};
use ace::plugins::builtin::codemods::HttpTimeoutCodemod;
use ace::plugins::builtin::detectors::UnsafeHttpTimeoutDetector;
use ace::plugins::builtin::lines::LineParser;
use tempfile::tempdir;

fn http_timeout_registry() -> Registry {
    let mut reg = Registry::new();
    reg.register_detector("net.unsafe-http-timeout", Box::new(UnsafeHttpTimeoutDetector));
    reg.register_codemod(Box::new(HttpTimeoutCodemod));
    reg
}

fn low_threshold_policy() -> Policy {
    let mut policy = Policy::default();
    policy.scoring.auto_threshold = 0.60;
    policy
}

#[test]
fn test_apply_then_explicit_revert_restores_original_bytes() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("app.py"), b"requests.get(url)\n").unwrap();

    let store = ProjectStore::new(dir.path());
    let mut engine = Engine::new(
        store.clone(),
        http_timeout_registry(),
        Box::new(LineParser),
        low_threshold_policy(),
        Cache::new(),
        Learner::new(),
        Skiplist::new(),
        0,
    );

    let recipes: Vec<Recipe> = vec![];
    let summary = engine
        .run(
            &["app.py".to_string()],
            &RepoMap::default(),
            &recipes,
            &CancellationToken::new(),
            &RunOptions::default(),
        )
        .unwrap();
    assert_eq!(summary.applied, 1);
    let after_apply = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
    assert!(after_apply.contains("timeout=30"));

    let applied_plan = summary
        .plans
        .iter()
        .find(|p| p.outcome == ace::core::engine::PlanOutcome::Applied)
        .expect("one applied plan");

    let writer = journal::JournalWriter::new(&summary.journal_path);
    let entries = journal::read_entries(&summary.journal_path).unwrap();
    journal::revert_plan(&store, &writer, &entries, &applied_plan.plan_id).unwrap();

    let restored = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
    assert_eq!(restored, "requests.get(url)\n");
}

#[test]
fn test_crash_orphan_from_a_real_run_is_recovered() {
    // Drive one genuine `Engine::run` apply, then drop its trailing
    // success entry from the journal to simulate a crash that landed the
    // write but never recorded completion — the orphan `recover` must
    // then undo using exactly the pre-image the engine itself captured.
    let dir = tempdir().unwrap();
    let original: &[u8] = b"requests.get(url)\n";
    std::fs::write(dir.path().join("app.py"), original).unwrap();

    let store = ProjectStore::new(dir.path());
    let mut engine = Engine::new(
        store.clone(),
        http_timeout_registry(),
        Box::new(LineParser),
        low_threshold_policy(),
        Cache::new(),
        Learner::new(),
        Skiplist::new(),
        0,
    );
    let recipes: Vec<Recipe> = vec![];
    let summary = engine
        .run(
            &["app.py".to_string()],
            &RepoMap::default(),
            &recipes,
            &CancellationToken::new(),
            &RunOptions::default(),
        )
        .unwrap();
    assert_eq!(summary.applied, 1);

    let mut entries = journal::read_entries(&summary.journal_path).unwrap();
    assert!(matches!(entries.last(), Some(journal::JournalEntry::Success { .. })));
    entries.pop();

    let writer = journal::JournalWriter::new(&summary.journal_path);
    let recovered = journal::recover(&store, &writer, &entries).unwrap();

    assert_eq!(recovered, vec!["app.py".to_string()]);
    assert_eq!(std::fs::read(dir.path().join("app.py")).unwrap(), original);
}

#[test]
fn test_fail_on_new_sets_policy_violation_against_stored_baseline() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("app.py"), b"requests.get(url)\n").unwrap();

    let store = ProjectStore::new(dir.path());
    store.ensure_dirs().unwrap();
    // `Engine::run` skips baseline comparison entirely when the stored
    // baseline is empty, so seed it with an unrelated finding: enough to
    // make the comparison run, while still leaving the http-timeout
    // finding reading as NEW.
    let seeded = ace::core::baseline::Baseline::from_findings(&[ace::core::model::Finding {
        rule_id: "other.rule".into(),
        file: "other.py".into(),
        start_line: 1,
        end_line: 1,
        severity: 0.1,
        complexity: 0.1,
        message: "m".into(),
        context_hash: ace::core::model::Finding::compute_context_hash("other.rule", "other.py", "x", "m"),
    }]);
    seeded.save(&store.baseline_path()).unwrap();

    let mut engine = Engine::new(
        store,
        http_timeout_registry(),
        Box::new(LineParser),
        low_threshold_policy(),
        Cache::new(),
        Learner::new(),
        Skiplist::new(),
        0,
    );
    let recipes: Vec<Recipe> = vec![];
    let options = RunOptions {
        fail_on_new: true,
        ..Default::default()
    };
    let summary = engine
        .run(
            &["app.py".to_string()],
            &RepoMap::default(),
            &recipes,
            &CancellationToken::new(),
            &options,
        )
        .unwrap();

    assert!(summary.policy_violation);
    let cmp = summary.baseline_comparison.expect("comparison ran against a non-empty baseline");
    assert_eq!(cmp.new.len(), 1);
}

#[test]
fn test_suppressed_file_produces_no_plans_and_no_journal_writes() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.py"),
        b"requests.get(url)  # disable=net.unsafe-http-timeout\n",
    )
    .unwrap();

    let store = ProjectStore::new(dir.path());
    let mut engine = Engine::new(
        store,
        http_timeout_registry(),
        Box::new(LineParser),
        low_threshold_policy(),
        Cache::new(),
        Learner::new(),
        Skiplist::new(),
        0,
    );
    let recipes: Vec<Recipe> = vec![];
    let summary = engine
        .run(
            &["app.py".to_string()],
            &RepoMap::default(),
            &recipes,
            &CancellationToken::new(),
            &RunOptions::default(),
        )
        .unwrap();

    assert_eq!(summary.applied, 0);
    assert_eq!(summary.suggested, 0);
    assert!(summary.plans.is_empty());
    let content = std::fs::read_to_string(dir.path().join("app.py")).unwrap();
    assert!(content.contains("requests.get(url)"));
    let _ = suppressions::parse_file(&content);
}

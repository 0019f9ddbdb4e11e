//! Cross-module integration tests: these compose two or more `core`
//! subsystems the way `Engine::run` does internally, exercising the
//! seams between modules rather than any one module's own logic (each
//! module's unit tests already cover that in isolation).

use ace::core::baseline::{self, Baseline};
use ace::core::kernel::{self, CancellationToken};
use ace::core::model::Finding;
use ace::core::plugin_api::{PolicyView, Registry};
use ace::core::policy::Policy;
use ace::core::repomap;
use ace::core::store::ProjectStore;
use ace::core::suppressions;
use ace::plugins::builtin::detectors::{BroadExceptDetector, UnsafeHttpTimeoutDetector};
use std::collections::HashMap;
use tempfile::tempdir;

fn registry() -> Registry {
    let mut reg = Registry::new();
    reg.register_detector("net.unsafe-http-timeout", Box::new(UnsafeHttpTimeoutDetector));
    reg.register_detector("err.broad-except", Box::new(BroadExceptDetector));
    reg
}

#[test]
fn test_suppressed_finding_never_reaches_baseline_comparison() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    store.ensure_dirs().unwrap();

    let src = b"requests.get(url)  # disable=net.unsafe-http-timeout\nexcept:\n    pass\n".to_vec();
    std::fs::write(dir.path().join("app.py"), &src).unwrap();

    let reg = registry();
    let enabled = reg.all_rule_ids();
    let ruleset_hash = kernel::ruleset_hash(&enabled);
    let policy_view = PolicyView {
        enabled_rule_ids: enabled,
    };

    let mut cache = ace::core::cache::Cache::new();
    let files = vec![("app.py".to_string(), src.clone())];
    let result = kernel::run(
        &reg,
        &mut cache,
        &ruleset_hash,
        false,
        1_000,
        &policy_view,
        &files,
        &CancellationToken::new(),
        None,
    );
    assert_eq!(result.findings.len(), 2, "both rules should fire before suppression");

    let mut file_suppressions = HashMap::new();
    let text = String::from_utf8_lossy(&src);
    file_suppressions.insert("app.py".to_string(), suppressions::parse_file(&text));
    let policy = Policy::default();
    let kept = suppressions::filter_findings(result.findings, &file_suppressions, &policy.suppressions);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].rule_id, "err.broad-except");

    // A baseline built before the suppressed rule ever surfaced should
    // show no regression once the suppression is in place.
    let baseline = Baseline::from_findings(&[]);
    let cmp = baseline::compare(&baseline, &kept);
    assert_eq!(cmp.new.len(), 1);
    assert!(cmp.regressed.is_empty());
}

#[test]
fn test_baseline_persists_across_store_round_trip() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    store.ensure_dirs().unwrap();

    let findings = vec![Finding {
        rule_id: "net.unsafe-http-timeout".into(),
        file: "app.py".into(),
        start_line: 3,
        end_line: 3,
        severity: 0.8,
        complexity: 0.2,
        message: "m".into(),
        context_hash: Finding::compute_context_hash("net.unsafe-http-timeout", "app.py", "x", "m"),
    }];
    let baseline = Baseline::from_findings(&findings);
    baseline.save(&store.baseline_path()).unwrap();

    let reloaded = Baseline::load(&store.baseline_path()).unwrap();
    let cmp = baseline::compare(&reloaded, &findings);
    assert!(cmp.new.is_empty());
    assert_eq!(cmp.existing.len(), 1);
}

#[test]
fn test_policy_loaded_from_disk_governs_suppression_glob() {
    let dir = tempdir().unwrap();
    let store = ProjectStore::new(dir.path());
    store.ensure_dirs().unwrap();
    std::fs::write(
        store.policy_path(),
        r#"
[suppressions]
paths = ["vendor/**"]
"#,
    )
    .unwrap();

    let policy = Policy::load(&store.policy_path()).unwrap();
    assert!(suppressions::path_is_suppressed(&policy.suppressions, "vendor/lib.py", None));
    assert!(!suppressions::path_is_suppressed(&policy.suppressions, "src/app.py", None));
}

#[test]
fn test_repomap_density_prioritizes_smaller_denser_file() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("dense.py"), "def a():\n    pass\ndef b():\n    pass\n").unwrap();
    std::fs::write(
        dir.path().join("sparse.py"),
        "def a():\n    pass\n# padding\n# padding\n# padding\n# padding\n",
    )
    .unwrap();

    let map = repomap::build(dir.path()).unwrap();
    let mut line_counts = HashMap::new();
    line_counts.insert("dense.py".to_string(), 2usize);
    line_counts.insert("sparse.py".to_string(), 6usize);

    let density = repomap::density_by_file(&map, &line_counts);
    assert!(density["dense.py"] > density["sparse.py"]);
}

#[test]
fn test_fingerprint_stable_for_identical_project_contents() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.py"), "import os\ndef f():\n    pass\n").unwrap();

    let first = repomap::build(dir.path()).unwrap();
    let second = repomap::build(dir.path()).unwrap();
    assert_eq!(repomap::fingerprint(&first).unwrap(), repomap::fingerprint(&second).unwrap());
}

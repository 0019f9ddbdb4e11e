//! Integration tests for the bundled rule pair, wired through the
//! `Registry` the way `Engine` consumes it: detect via `kernel::run`,
//! plan via `Registry::codemod_for`, verify the edit via `guard::check`.

use ace::core::guard::{self, Mode};
use ace::core::kernel::{self, CancellationToken};
use ace::core::plugin_api::PolicyView;
use ace::plugins::builtin::default_registry;
use ace::plugins::builtin::lines::LineParser;

#[test]
fn test_default_registry_detects_and_fixes_both_bundled_rules() {
    let registry = default_registry();
    let enabled = registry.all_rule_ids();
    assert_eq!(
        enabled,
        vec!["err.broad-except".to_string(), "net.unsafe-http-timeout".to_string()]
    );

    let src = b"def fetch(url):\n    requests.get(url)\n    try:\n        f()\n    except:\n        pass\n".to_vec();
    let ruleset_hash = kernel::ruleset_hash(&enabled);
    let policy_view = PolicyView {
        enabled_rule_ids: enabled,
    };
    let mut cache = ace::core::cache::Cache::new();
    let files = vec![("app.py".to_string(), src.clone())];
    let result = kernel::run(
        &registry,
        &mut cache,
        &ruleset_hash,
        false,
        1_000,
        &policy_view,
        &files,
        &CancellationToken::new(),
        None,
    );
    assert_eq!(result.findings.len(), 2);
    assert!(!result.partial);

    let mut current = src;
    for finding in &result.findings {
        let codemod = registry.codemod_for(&finding.rule_id).expect("rule has a bundled codemod");
        let Some(edits) = codemod.plan("app.py", &current).unwrap() else {
            continue;
        };
        let before = current.clone();
        let mut lines: Vec<String> = String::from_utf8_lossy(&before)
            .split_inclusive('\n')
            .map(|s| s.to_string())
            .collect();
        for edit in &edits {
            let idx = edit.start_line - 1;
            lines[idx] = format!("{}\n", edit.payload);
        }
        let after: Vec<u8> = lines.concat().into_bytes();

        let guard_result = guard::check(&LineParser, &codemod.effects(), "app.py", &before, &after, Mode::Strict);
        assert!(
            guard_result.passed,
            "guard should pass for {}: {:?}",
            finding.rule_id, guard_result.evidence
        );
        current = after;
    }

    let final_text = String::from_utf8_lossy(&current);
    assert!(final_text.contains("timeout=30"));
    assert!(final_text.contains("except Exception:"));
}

#[test]
fn test_codemods_are_idempotent_on_already_fixed_source() {
    let registry = default_registry();
    let fixed = b"requests.get(url, timeout=30)\nexcept Exception:\n    pass\n";

    let http_codemod = registry.codemod_for("net.unsafe-http-timeout").unwrap();
    assert!(http_codemod.plan("app.py", fixed).unwrap().is_none());

    let except_codemod = registry.codemod_for("err.broad-except").unwrap();
    assert!(except_codemod.plan("app.py", fixed).unwrap().is_none());
}

#[test]
fn test_enabled_rule_ids_filter_suppresses_disabled_detector() {
    let registry = default_registry();
    let src = b"requests.get(url)\n";
    let policy_view = PolicyView {
        enabled_rule_ids: vec!["err.broad-except".to_string()],
    };
    let ruleset_hash = kernel::ruleset_hash(&["err.broad-except".to_string()]);
    let mut cache = ace::core::cache::Cache::new();
    let files = vec![("app.py".to_string(), src.to_vec())];
    let result = kernel::run(
        &registry,
        &mut cache,
        &ruleset_hash,
        false,
        1_000,
        &policy_view,
        &files,
        &CancellationToken::new(),
        None,
    );
    assert!(result.findings.is_empty(), "http-timeout detector should be suppressed by the policy view");
}

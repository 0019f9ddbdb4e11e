//! Pack Synthesis (spec.md §4.6): groups findings into cohesive recipes,
//! validates non-overlap, and falls back to singletons on conflict.
//!
//! Grounded on the teacher's `plugins::policy` risk-class grouping
//! (`class → rule_ids` sets declared in policy, matched against
//! incoming items) — retargeted from static risk classification to
//! dynamic recipe-group cohesion scoring.

use crate::core::model::{Edit, EditPlan, Finding, PlanKind};
use crate::core::planner::r_star;
use crate::core::policy::Policy;
use crate::core::repomap::RepoMap;
use std::collections::BTreeMap;

/// `{id, rules: set of rule_ids, context: file|function|class, description}`.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: String,
    pub rules: Vec<String>,
    pub description: String,
}

/// A finding paired with the edits its codemod would produce, the unit
/// pack synthesis groups and merges.
#[derive(Debug, Clone)]
pub struct FindingPlan {
    pub finding: Finding,
    pub edits: Vec<Edit>,
}

fn context_key(finding: &Finding, repomap: &RepoMap) -> (String, bool) {
    match crate::core::repomap::enclosing_symbol(repomap, &finding.file, finding.start_line) {
        Some(symbol) => (format!("{}::{}", finding.file, symbol.name), false),
        None => {
            // Fallback: 20-line bucket, explicitly marked approximate
            // (spec.md §9 open question, resolved in DESIGN.md).
            let bucket = (finding.start_line.saturating_sub(1)) / 20;
            (format!("{}::bucket-{bucket}", finding.file), true)
        }
    }
}

fn singleton_plan(fp: &FindingPlan, policy: &Policy) -> EditPlan {
    let risk = r_star(policy, fp.finding.severity, fp.finding.complexity, None);
    EditPlan {
        id: EditPlan::singleton_id(&fp.edits).unwrap_or_else(|_| format!("plan-{}", fp.finding.stable_id())),
        findings: vec![fp.finding.stable_id()],
        edits: fp.edits.clone(),
        rule_ids: vec![fp.finding.rule_id.clone()],
        estimated_risk: risk,
        kind: PlanKind::Singleton,
    }
}

/// Synthesizes pack plans from `findings`/`edits`, falling back to
/// singleton plans for anything that doesn't form a qualifying pack or
/// whose merged edits overlap (spec.md §4.6).
pub fn synthesize(
    finding_plans: &[FindingPlan],
    recipes: &[Recipe],
    repomap: &RepoMap,
    policy: &Policy,
) -> Vec<EditPlan> {
    let mut grouped: BTreeMap<(String, String), Vec<&FindingPlan>> = BTreeMap::new();
    let mut ungrouped: Vec<&FindingPlan> = Vec::new();

    'outer: for fp in finding_plans {
        let (key, _approximate) = context_key(&fp.finding, repomap);
        for recipe in recipes {
            if recipe.rules.iter().any(|r| r == &fp.finding.rule_id) {
                grouped
                    .entry((recipe.id.clone(), key.clone()))
                    .or_default()
                    .push(fp);
                continue 'outer;
            }
        }
        ungrouped.push(fp);
    }

    let min_findings = policy.packs.min_findings;
    let mut plans = Vec::new();

    for ((recipe_id, _key), group) in grouped {
        if group.len() < min_findings {
            ungrouped.extend(group);
            continue;
        }
        let recipe = recipes.iter().find(|r| r.id == recipe_id).expect("grouped by known recipe id");

        let mut rule_ids: Vec<String> = group.iter().map(|fp| fp.finding.rule_id.clone()).collect();
        rule_ids.sort();
        rule_ids.dedup();
        let cohesion = rule_ids.len() as f64 / recipe.rules.len() as f64;

        let mut merged_edits: Vec<Edit> = group.iter().flat_map(|fp| fp.edits.clone()).collect();
        if !EditPlan::edits_are_non_overlapping(&merged_edits) {
            // Discard the pack; keep singletons (spec.md §4.6 step 5).
            ungrouped.extend(group);
            continue;
        }
        EditPlan::order_edits_for_apply(&mut merged_edits);

        let mut stable_ids: Vec<String> = group.iter().map(|fp| fp.finding.stable_id()).collect();
        stable_ids.sort();

        let max_severity = group.iter().map(|fp| fp.finding.severity).fold(0.0_f64, f64::max);
        let max_complexity = group.iter().map(|fp| fp.finding.complexity).fold(0.0_f64, f64::max);
        let risk = r_star(policy, max_severity, max_complexity, Some(cohesion));

        let pack_context_key = format!("{recipe_id}:{}", merged_edits[0].file);
        plans.push(EditPlan {
            id: EditPlan::pack_id(&pack_context_key, &stable_ids),
            findings: stable_ids,
            edits: merged_edits,
            rule_ids,
            estimated_risk: risk,
            kind: PlanKind::Pack,
        });
    }

    for fp in ungrouped {
        plans.push(singleton_plan(fp, policy));
    }

    plans.sort_by(|a, b| a.id.cmp(&b.id));
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::EditOp;

    fn finding(rule: &str, file: &str, line: usize, severity: f64, complexity: f64) -> Finding {
        Finding {
            rule_id: rule.into(),
            file: file.into(),
            start_line: line,
            end_line: line,
            severity,
            complexity,
            message: "m".into(),
            context_hash: Finding::compute_context_hash(rule, file, "x", "m"),
        }
    }

    fn edit(rule: &str, file: &str, line: usize) -> Edit {
        Edit {
            file: file.into(),
            start_line: line,
            end_line: line,
            op: EditOp::Replace,
            payload: "x".into(),
            rule_id: rule.into(),
        }
    }

    #[test]
    fn test_scenario_2_pack_cohesion_boost() {
        let policy = Policy::default();
        let recipes = vec![Recipe {
            id: "recipe-1".into(),
            rules: vec!["a".into(), "b".into(), "c".into()],
            description: "".into(),
        }];
        let finding_plans = vec![
            FindingPlan {
                finding: finding("a", "app.py", 3, 0.7, 0.2),
                edits: vec![edit("a", "app.py", 3)],
            },
            FindingPlan {
                finding: finding("b", "app.py", 10, 0.6, 0.3),
                edits: vec![edit("b", "app.py", 10)],
            },
        ];
        let repomap = RepoMap::default();
        let plans = synthesize(&finding_plans, &recipes, &repomap, &policy);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, PlanKind::Pack);
        assert!((plans[0].estimated_risk - 0.713).abs() < 1e-3, "{}", plans[0].estimated_risk);
    }

    #[test]
    fn test_scenario_3_overlap_forced_fallback() {
        let policy = Policy::default();
        let recipes = vec![Recipe {
            id: "recipe-1".into(),
            rules: vec!["a".into(), "b".into()],
            description: "".into(),
        }];
        let finding_plans = vec![
            FindingPlan {
                finding: finding("a", "app.py", 10, 0.5, 0.2),
                edits: vec![Edit {
                    file: "app.py".into(),
                    start_line: 10,
                    end_line: 15,
                    op: EditOp::Replace,
                    payload: "x".into(),
                    rule_id: "a".into(),
                }],
            },
            FindingPlan {
                finding: finding("b", "app.py", 12, 0.5, 0.2),
                edits: vec![Edit {
                    file: "app.py".into(),
                    start_line: 12,
                    end_line: 18,
                    op: EditOp::Replace,
                    payload: "y".into(),
                    rule_id: "b".into(),
                }],
            },
        ];
        let repomap = RepoMap::default();
        let plans = synthesize(&finding_plans, &recipes, &repomap, &policy);
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|p| p.kind == PlanKind::Singleton));
    }

    #[test]
    fn test_below_min_findings_falls_back_to_singletons() {
        let policy = Policy::default();
        let recipes = vec![Recipe {
            id: "recipe-1".into(),
            rules: vec!["a".into(), "b".into(), "c".into()],
            description: "".into(),
        }];
        let finding_plans = vec![FindingPlan {
            finding: finding("a", "app.py", 3, 0.7, 0.2),
            edits: vec![edit("a", "app.py", 3)],
        }];
        let repomap = RepoMap::default();
        let plans = synthesize(&finding_plans, &recipes, &repomap, &policy);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, PlanKind::Singleton);
    }

    #[test]
    fn test_pack_id_stable_under_reordering_of_finding_set() {
        let policy = Policy::default();
        let recipes = vec![Recipe {
            id: "recipe-1".into(),
            rules: vec!["a".into(), "b".into()],
            description: "".into(),
        }];
        let a = FindingPlan {
            finding: finding("a", "app.py", 3, 0.7, 0.2),
            edits: vec![edit("a", "app.py", 3)],
        };
        let b = FindingPlan {
            finding: finding("b", "app.py", 10, 0.6, 0.3),
            edits: vec![edit("b", "app.py", 10)],
        };
        let repomap = RepoMap::default();
        let plans_1 = synthesize(&[a.clone(), b.clone()], &recipes, &repomap, &policy);
        let plans_2 = synthesize(&[b, a], &recipes, &repomap, &policy);
        assert_eq!(plans_1[0].id, plans_2[0].id);
    }
}

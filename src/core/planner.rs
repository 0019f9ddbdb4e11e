//! Planner (spec.md §4.7): R* risk/confidence scoring, decision
//! thresholds, and a deterministic priority ordering with a
//! human-readable rationale per action.
//!
//! Grounded on the teacher's `plugins::decide::DecisionTree` idiom: a
//! declarative table pairing a decision with a `rationale: &'static str`
//! justification string, generalized from static framework-choice trees
//! to a computed numeric score plus a dynamically-built rationale.

use crate::core::learner::Learner;
use crate::core::model::{EditPlan, PlanKind};
use crate::core::policy::{Policy, RuleMode};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Decision {
    Skip,
    Suggest,
    Auto,
}

/// R★_single = α·severity + β·complexity; R★_pack additionally adds
/// γ·cohesion. `severity`/`complexity` are the maximum across the
/// plan's findings (spec.md §4.7: "aggregated ... using the maximum,
/// more conservative").
pub fn r_star(policy: &Policy, max_severity: f64, max_complexity: f64, cohesion: Option<f64>) -> f64 {
    let scoring = &policy.scoring;
    let base = scoring.alpha * max_severity + scoring.beta * max_complexity;
    match cohesion {
        Some(c) => base + scoring.gamma * c,
        None => base,
    }
}

/// The most conservative (highest) tuned threshold across `rule_ids`: a
/// plan spanning several rules only promotes once every rule involved
/// would, on its own, clear the bar.
fn most_conservative_tuned(
    rule_ids: &[String],
    learner: &Learner,
    current_time: u64,
    base: f64,
    tuned: impl Fn(&Learner, &str, f64, u64) -> f64,
) -> f64 {
    rule_ids
        .iter()
        .map(|r| tuned(learner, r, base, current_time))
        .fold(base, f64::max)
}

/// Applies the policy's decision thresholds — tuned per rule by the
/// Learner's observed revert/success rates (spec.md §4.8) — with a
/// `detect-only` rule mode overriding AUTO regardless of score
/// (spec.md §4.7).
pub fn decide(policy: &Policy, r_star: f64, rule_ids: &[String], learner: &Learner, current_time: u64) -> Decision {
    let any_detect_only = rule_ids.iter().any(|r| policy.mode_for(r) == RuleMode::DetectOnly);
    let auto_threshold = most_conservative_tuned(
        rule_ids,
        learner,
        current_time,
        policy.scoring.auto_threshold,
        Learner::tuned_auto_threshold,
    );
    let suggest_threshold = most_conservative_tuned(
        rule_ids,
        learner,
        current_time,
        policy.scoring.suggest_threshold,
        Learner::tuned_suggest_threshold,
    );
    if r_star >= auto_threshold {
        if any_detect_only {
            Decision::Suggest
        } else {
            Decision::Auto
        }
    } else if r_star >= suggest_threshold {
        Decision::Suggest
    } else {
        Decision::Skip
    }
}

/// RepoMap-derived context signals for one plan's affected files: mean
/// of symbol density and recency, scaled to `[0, 5]` (spec.md §4.7,
/// SPEC_FULL.md §C.5).
pub fn context_boost_normalized(
    files: &[String],
    density: &HashMap<String, f64>,
    recency: &HashMap<String, f64>,
) -> f64 {
    if files.is_empty() {
        return 0.0;
    }
    let sum: f64 = files
        .iter()
        .map(|f| (density.get(f).copied().unwrap_or(0.0) + recency.get(f).copied().unwrap_or(0.0)) / 2.0)
        .sum();
    (sum / files.len() as f64) * 5.0
}

pub struct PlannerContext<'a> {
    pub policy: &'a Policy,
    pub learner: &'a Learner,
    pub density: &'a HashMap<String, f64>,
    pub recency: &'a HashMap<String, f64>,
    /// Integer rank by descending telemetry p95 latency for a rule;
    /// absent rules are treated as rank 0 (spec.md §4.7).
    pub cost_ranks: &'a HashMap<String, i64>,
    pub current_time: u64,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub plan_id: String,
    pub decision: Decision,
    pub r_star: f64,
    pub priority: f64,
    pub rationale: String,
}

fn plan_files(plan: &EditPlan) -> Vec<String> {
    let mut files: Vec<String> = plan.edits.iter().map(|e| e.file.clone()).collect();
    files.sort();
    files.dedup();
    files
}

fn cost_rank_for(ctx: &PlannerContext, rule_ids: &[String]) -> i64 {
    rule_ids
        .iter()
        .map(|r| ctx.cost_ranks.get(r).copied().unwrap_or(0))
        .max()
        .unwrap_or(0)
}

fn high_revert_rate_any(ctx: &PlannerContext, rule_ids: &[String], files: &[String]) -> bool {
    rule_ids.iter().any(|rule_id| {
        files
            .iter()
            .any(|_| ctx.learner.high_revert_rate(rule_id, ctx.current_time))
    })
}

fn success_rate_avg_for(ctx: &PlannerContext, rule_ids: &[String]) -> f64 {
    if rule_ids.is_empty() {
        return 5.0;
    }
    let sum: f64 = rule_ids
        .iter()
        .map(|r| ctx.learner.success_rate_avg(r, ctx.current_time))
        .sum();
    sum / rule_ids.len() as f64
}

/// Builds one `Action` (decision, priority, rationale) for `plan`.
pub fn build_action(plan: &EditPlan, ctx: &PlannerContext) -> Action {
    let decision = decide(ctx.policy, plan.estimated_risk, &plan.rule_ids, ctx.learner, ctx.current_time);
    let files = plan_files(plan);

    let cohesion_bonus = if files.len() == 1 && plan.findings.len() >= 2 {
        20.0
    } else {
        0.0
    };
    let cost_rank = cost_rank_for(ctx, &plan.rule_ids);
    let revert_penalty = if high_revert_rate_any(ctx, &plan.rule_ids, &files) {
        20.0
    } else {
        0.0
    };
    let context_boost = context_boost_normalized(&files, ctx.density, ctx.recency);
    let success_rate_avg = success_rate_avg_for(ctx, &plan.rule_ids);

    let priority = 100.0 * plan.estimated_risk + cohesion_bonus - cost_rank as f64 - revert_penalty
        + 5.0 * context_boost
        + 10.0 * success_rate_avg;

    let rationale = format!(
        "R*={r_star:.3} ({kind:?}); priority=100*R*({r_term:.1}) + cohesion_bonus({cohesion_bonus:.1}) \
         - cost_rank({cost_rank}) - revert_penalty({revert_penalty:.1}) + 5*context_boost({context_term:.2}) \
         + 10*success_rate_avg({success_rate_avg:.2})",
        r_star = plan.estimated_risk,
        kind = plan.kind,
        r_term = 100.0 * plan.estimated_risk,
        context_term = context_boost,
    );

    Action {
        plan_id: plan.id.clone(),
        decision,
        r_star: plan.estimated_risk,
        priority,
        rationale,
    }
}

/// Sorts plans into actions by descending priority, tie-broken
/// lexicographically on plan id (spec.md §4.7, §8 "Priority
/// determinism").
pub fn plan_actions(plans: &[EditPlan], ctx: &PlannerContext) -> Vec<Action> {
    let mut actions: Vec<Action> = plans.iter().map(|p| build_action(p, ctx)).collect();
    actions.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.plan_id.cmp(&b.plan_id))
    });
    actions
}

//! Integration tests for the complete vise pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - expression parsing → constraint compilation → propagation
//! - rules → constraints → relaxation to a fixpoint
//! - forks → scenario comparison → provenance drift
//!
//! Run with: cargo test --test integration_tests

use approx::assert_relative_eq;
use indexmap::IndexMap;
use vise_core::{
    CollapsePolicy, ConstraintSpec, ConstraintTemplate, EdgePattern, NodePattern, Rule,
    RuleAction, Scenario, SimulateParams, Value, Workbench,
};

// ============================================================================
// Causal-chain relaxation
// ============================================================================

fn causal_chain() -> Workbench {
    let mut wb = Workbench::new();
    let mut coffee_attrs = IndexMap::new();
    coffee_attrs.insert("level".to_string(), Value::interval(0.7, 0.9));
    wb.create_node("Factor", Some("coffee".to_string()), coffee_attrs)
        .unwrap();
    let mut unknown = IndexMap::new();
    unknown.insert("level".to_string(), Value::unknown_with("infer"));
    wb.create_node("Factor", Some("alertness".to_string()), unknown.clone())
        .unwrap();
    wb.create_node("Factor", Some("productivity".to_string()), unknown)
        .unwrap();

    let mut beta = IndexMap::new();
    beta.insert("beta".to_string(), Value::Scalar(0.6));
    wb.create_edge("causes", "coffee", "alertness", None, beta)
        .unwrap();
    let mut beta = IndexMap::new();
    beta.insert("beta".to_string(), Value::Scalar(0.7));
    wb.create_edge("causes", "alertness", "productivity", None, beta)
        .unwrap();

    wb.define_rule(linear_cause_rule(IndexMap::new()));
    wb
}

fn linear_cause_rule(edge_filter: IndexMap<String, Value>) -> Rule {
    Rule {
        name: "linear_cause".to_string(),
        node_patterns: vec![
            NodePattern {
                var: "x".to_string(),
                ty: Some("Factor".to_string()),
                where_attrs: IndexMap::new(),
            },
            NodePattern {
                var: "y".to_string(),
                ty: Some("Factor".to_string()),
                where_attrs: IndexMap::new(),
            },
        ],
        edge_patterns: vec![EdgePattern {
            var: "e".to_string(),
            ty: Some("causes".to_string()),
            from: Some("x".to_string()),
            to: Some("y".to_string()),
            where_attrs: edge_filter,
        }],
        actions: vec![RuleAction::EnsureConstraint(ConstraintTemplate {
            target: "{y}.level".to_string(),
            expr: "val('{x}.level') * val('{e}.beta')".to_string(),
            strength: 1.0,
            note: None,
            gloss: None,
            guard: None,
        })],
    }
}

fn assert_interval(value: &Value, lo: f64, hi: f64) {
    let Value::Interval(iv) = value else {
        panic!("expected interval, got {value:?}");
    };
    assert_relative_eq!(iv.lo, lo, max_relative = 1e-9);
    assert_relative_eq!(iv.hi, hi, max_relative = 1e-9);
}

#[test]
fn causal_chain_relaxes_to_the_expected_fixpoint() {
    let mut wb = causal_chain();
    let report = wb.run_rules(None);
    assert_eq!(report.applied, 2);

    let sim = wb.simulate(SimulateParams {
        ticks: 5,
        delta_threshold: 1e-9,
    });
    assert!(sim.converged);
    assert!(sim.ticks <= 3, "expected a fixpoint by the third tick");

    assert_interval(&wb.get("alertness.level"), 0.42, 0.54);
    assert_interval(&wb.get("productivity.level"), 0.294, 0.378);

    // Once reached, the fixpoint holds: a further tick changes nothing.
    let still = wb.tick();
    assert_eq!(still.count(), 0);
}

#[test]
fn resimulation_follows_upstream_changes() {
    let mut wb = causal_chain();
    wb.run_rules(None);
    wb.simulate(SimulateParams {
        ticks: 5,
        delta_threshold: 1e-9,
    });

    wb.set_attr("coffee.level", Value::interval(0.3, 0.5), "event", None)
        .unwrap();
    wb.simulate(SimulateParams {
        ticks: 5,
        delta_threshold: 1e-9,
    });

    assert_interval(&wb.get("productivity.level"), 0.126, 0.21);
}

#[test]
fn rerunning_rules_is_idempotent() {
    let mut wb = causal_chain();
    wb.run_rules(None);
    let first: Vec<(String, String, String)> = wb
        .constraints()
        .map(|c| (c.id.clone(), c.target.clone(), c.expr.clone()))
        .collect();

    wb.run_rules(None);
    let second: Vec<(String, String, String)> = wb
        .constraints()
        .map(|c| (c.id.clone(), c.target.clone(), c.expr.clone()))
        .collect();

    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    // Deterministic ids derived from rule name + instantiated target.
    assert!(first
        .iter()
        .any(|(id, _, _)| id == "linear_cause:alertness.level"));
}

#[test]
fn stale_rule_constraints_are_not_retracted() {
    let mut wb = causal_chain();
    wb.run_rules(None);
    assert_eq!(wb.constraints().count(), 2);

    // Narrow the rule so only the first hop still matches; the constraint the
    // old match produced lingers.
    let mut edge_filter = IndexMap::new();
    edge_filter.insert("beta".to_string(), Value::Scalar(0.6));
    wb.define_rule(linear_cause_rule(edge_filter));

    let report = wb.run_rules(None);
    assert_eq!(report.applied, 1);
    assert_eq!(wb.constraints().count(), 2);
    assert!(wb.constraint("linear_cause:productivity.level").is_some());
}

// ============================================================================
// Forks and scenarios
// ============================================================================

#[test]
fn forks_are_fully_independent() {
    let mut base = causal_chain();
    base.run_rules(None);
    base.simulate(SimulateParams {
        ticks: 5,
        delta_threshold: 1e-9,
    });
    let base_version = base.version();
    let base_productivity = base.get("productivity.level");

    let mut fork = base.fork();
    fork.set_attr("coffee.level", Value::Scalar(0.0), "what-if", None)
        .unwrap();
    fork.simulate(SimulateParams {
        ticks: 5,
        delta_threshold: 1e-9,
    });
    fork.create_node("Factor", Some("tea".to_string()), IndexMap::new())
        .unwrap();

    // The fork moved…
    assert!(fork.version() > base_version);
    assert_ne!(fork.get("productivity.level"), base_productivity);
    // …and the base did not.
    assert_eq!(base.version(), base_version);
    assert_eq!(base.get("productivity.level"), base_productivity);
    assert!(base.graph().nodes.get("tea").is_none());

    // Mutating the base afterwards is equally invisible to the fork.
    base.set_attr("coffee.level", Value::Scalar(1.0), "later", None)
        .unwrap();
    assert_eq!(fork.get("coffee.level"), Value::Scalar(0.0));
}

#[test]
fn scenario_comparison_leaves_the_base_untouched() {
    let mut base = causal_chain();
    base.run_rules(None);
    base.simulate(SimulateParams {
        ticks: 5,
        delta_threshold: 1e-9,
    });
    let version_before = base.version();

    let scenarios = vec![
        Scenario {
            name: "baseline".to_string(),
            commands: vec![],
        },
        Scenario {
            name: "half coffee".to_string(),
            commands: vec![serde_json::json!({
                "op": "set_attr", "target": "coffee.level", "value": [0.4, 0.4],
            })],
        },
        Scenario {
            name: "decaf".to_string(),
            commands: vec![serde_json::json!({
                "op": "set_attr", "target": "coffee.level", "value": [0.1, 0.1],
            })],
        },
        Scenario {
            name: "sensitivity up".to_string(),
            commands: vec![serde_json::json!({
                "op": "set_attr", "target": "coffee->alertness:causes.beta", "value": 0.9,
            })],
        },
    ];
    let queries = vec![
        "alertness.level".to_string(),
        "productivity.level".to_string(),
    ];
    let reports = base.compare_scenarios(
        &scenarios,
        &queries,
        SimulateParams {
            ticks: 5,
            delta_threshold: 1e-9,
        },
    );

    assert_eq!(base.version(), version_before);
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.failed_commands == 0));

    // Baseline already sits at the fixpoint.
    assert_interval(&reports[0].readings["productivity.level"], 0.294, 0.378);
    // Halving coffee scales the whole chain: 0.4 * 0.6 * 0.7.
    assert_interval(&reports[1].readings["productivity.level"], 0.168, 0.168);
    assert_interval(&reports[2].readings["productivity.level"], 0.042, 0.042);
    // Raising the first-hop beta lifts alertness: 0.7..0.9 scaled by 0.9.
    assert_interval(&reports[3].readings["alertness.level"], 0.63, 0.81);

    // Non-empty scenarios drift further from the base than the baseline.
    assert!(reports[1].ops_since_fork > reports[0].ops_since_fork);
}

// ============================================================================
// Provenance across the whole pipeline
// ============================================================================

#[test]
fn provenance_versions_count_every_mutation_exactly_once() {
    let mut wb = causal_chain();
    let after_setup = wb.version();
    assert_eq!(after_setup, wb.provenance().len() as u64);

    let report = wb.run_rules(None);
    // One entry per upserted constraint plus one for run_rules itself.
    assert_eq!(wb.version(), after_setup + report.applied as u64 + 1);

    let diff = wb.diff(after_setup);
    assert_eq!(diff.len() as u64, wb.version() - after_setup);
    // Entries arrive in append order with strictly increasing versions.
    for pair in diff.windows(2) {
        assert_eq!(pair[1].version, pair[0].version + 1);
    }
}

// ============================================================================
// Full boundary flow: JSONL in, collapsed hypothesis out
// ============================================================================

#[test]
fn hypotheses_flow_through_the_command_boundary() {
    let mut wb = Workbench::new();
    let batch = r#"
{"op":"create_node","type":"Source","id":"upstream"}
{"op":"create_node","type":"Sink","id":"downstream"}
{"op":"set_attr","target":"upstream.signal","value":[0.4,0.7],"gloss":"initial estimate"}
{"op":"fork_hypotheses","source":"upstream.signal","target":"downstream.signal","context":["shock"],"ruleset":{"groups":[{"tag":"shock","branches":[{"name":"pessimistic","gloss":"shock cuts the signal hard","scale":0.3,"confidence":0.7},{"name":"resilient","gloss":"shock dents the signal","scale":0.6,"confidence":0.3}]}]}}
{"op":"collapse","target":"downstream.signal","policy":"max_confidence"}
{"op":"story","node":"downstream"}
"#;
    let outcomes = wb.run_batch(batch);
    assert!(outcomes.iter().all(|o| o.ok), "{outcomes:?}");

    assert_interval(&wb.get("downstream.signal"), 0.12, 0.21);

    let collapse = outcomes[4].result.as_ref().unwrap();
    assert_eq!(collapse["candidate"], "pessimistic");

    let story = outcomes[5].result.as_ref().unwrap();
    let lines = story["lines"].as_array().unwrap();
    // Two hypothesis recordings plus the collapse write.
    assert_eq!(lines.len(), 3);

    // Collapsing again under a different policy reuses the candidate list.
    let again = wb
        .collapse("downstream.signal", &CollapsePolicy::WeightedMean)
        .unwrap()
        .unwrap();
    assert_eq!(again.candidate, "weighted_mean");
}

#[test]
fn explain_reports_live_contributors_with_recomputed_values() {
    let mut wb = causal_chain();
    wb.run_rules(None);
    wb.simulate(SimulateParams {
        ticks: 5,
        delta_threshold: 1e-9,
    });

    let explanations = wb.explain("productivity.level");
    assert_eq!(explanations.len(), 1);
    let explanation = &explanations[0];
    assert_eq!(explanation.constraint, "linear_cause:productivity.level");
    assert_interval(explanation.expr_value.as_ref().unwrap(), 0.294, 0.378);
    assert_interval(&explanation.current, 0.294, 0.378);
}

#[test]
fn direct_constraints_still_work_without_rules() {
    let mut wb = Workbench::new();
    wb.create_node("Claim", Some("c1".to_string()), IndexMap::new())
        .unwrap();
    wb.create_node("Reason", Some("r1".to_string()), IndexMap::new())
        .unwrap();
    wb.set_attr("r1.weight", Value::Scalar(0.8), "initial", None)
        .unwrap();
    wb.assert_constraint(
        ConstraintSpec {
            target: "c1.score".to_string(),
            expr: "val('r1.weight')".to_string(),
            ..Default::default()
        },
        None,
    )
    .unwrap();
    wb.simulate(SimulateParams {
        ticks: 2,
        delta_threshold: 0.0,
    });
    assert_eq!(wb.get("c1.score"), Value::Scalar(0.8));
}

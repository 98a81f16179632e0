//! Line-delimited JSON command boundary.
//!
//! Each line is a JSON object with an `op` field naming a workbench
//! operation; the remaining fields are its arguments. Lines are processed
//! independently: an unknown op, a malformed line, or a failing invocation
//! records an `ok:false` outcome at that position and the batch continues —
//! the explicit partial-failure contract at the boundary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use indexmap::IndexMap;

use crate::constraint::ConstraintSpec;
use crate::hypothesis::{CollapsePolicy, HypothesisRuleset};
use crate::rule::Rule;
use crate::scenario::Scenario;
use crate::value::Value;
use crate::workbench::{jsonify, SimulateParams, Workbench};

/// Per-line outcome. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    fn success(op: String, result: serde_json::Value) -> Self {
        BatchOutcome {
            ok: true,
            op: Some(op),
            result: Some(result),
            error: None,
        }
    }

    fn failure(op: Option<String>, error: impl Into<String>) -> Self {
        BatchOutcome {
            ok: false,
            op,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Deserialize)]
struct CreateNodeArgs {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attrs: IndexMap<String, Value>,
}

#[derive(Deserialize)]
struct CreateEdgeArgs {
    #[serde(rename = "type")]
    ty: String,
    from: String,
    to: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attrs: IndexMap<String, Value>,
}

#[derive(Deserialize)]
struct SetAttrArgs {
    target: String,
    value: Value,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    gloss: Option<String>,
}

fn default_source() -> String {
    "set".to_string()
}

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
struct QueryNodesArgs {
    #[serde(rename = "type", default)]
    ty: Option<String>,
    #[serde(rename = "where", default)]
    where_attrs: IndexMap<String, Value>,
}

#[derive(Deserialize)]
struct AddSemanticsArgs {
    entity: String,
    text: String,
}

#[derive(Deserialize)]
struct StoryArgs {
    node: String,
}

#[derive(Deserialize)]
struct AssertConstraintArgs {
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    spec: ConstraintSpec,
}

#[derive(Deserialize)]
struct UpsertConstraintArgs {
    id: String,
    #[serde(flatten)]
    spec: ConstraintSpec,
}

#[derive(Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Deserialize)]
struct RunRulesArgs {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct DiffArgs {
    #[serde(default)]
    since: u64,
}

#[derive(Deserialize)]
struct SnapshotArgs {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Deserialize)]
struct RevertArgs {
    version: u64,
}

#[derive(Deserialize)]
struct ForkHypothesesArgs {
    source: String,
    target: String,
    #[serde(default)]
    context: Vec<String>,
    ruleset: HypothesisRuleset,
}

#[derive(Deserialize)]
struct CollapseArgs {
    target: String,
    #[serde(flatten)]
    policy: CollapsePolicy,
}

#[derive(Deserialize)]
struct CompareScenariosArgs {
    scenarios: Vec<Scenario>,
    queries: Vec<String>,
    #[serde(default)]
    simulate: SimulateParams,
}

impl Workbench {
    /// Run a line-delimited batch. Blank lines are skipped; every other line
    /// produces exactly one outcome, in input order.
    pub fn run_batch(&mut self, text: &str) -> Vec<BatchOutcome> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| match serde_json::from_str::<serde_json::Value>(line) {
                Ok(command) => self.run_command(command),
                Err(err) => BatchOutcome::failure(None, format!("invalid json: {err}")),
            })
            .collect()
    }

    /// Run a single parsed command record.
    pub fn run_command(&mut self, command: serde_json::Value) -> BatchOutcome {
        let Some(op) = command
            .get("op")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
        else {
            return BatchOutcome::failure(None, "missing op");
        };
        match self.dispatch(&op, command) {
            Ok(result) => BatchOutcome::success(op, result),
            Err(error) => BatchOutcome::failure(Some(op), error),
        }
    }

    fn dispatch(
        &mut self,
        op: &str,
        command: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, String> {
        match op {
            "create_node" => {
                let a: CreateNodeArgs = parse_args(command)?;
                let id = self
                    .create_node(&a.ty, a.id, a.attrs)
                    .map_err(stringify)?;
                Ok(json!({"id": id}))
            }
            "create_edge" => {
                let a: CreateEdgeArgs = parse_args(command)?;
                let id = self
                    .create_edge(&a.ty, &a.from, &a.to, a.id, a.attrs)
                    .map_err(stringify)?;
                Ok(json!({"id": id}))
            }
            "set_attr" => {
                let a: SetAttrArgs = parse_args(command)?;
                let write = self
                    .set_attr(&a.target, a.value, &a.source, a.gloss.as_deref())
                    .map_err(stringify)?;
                Ok(jsonify(&write))
            }
            "query_attr" => {
                let a: PathArgs = parse_args(command)?;
                Ok(jsonify(&self.query_attr(&a.path)))
            }
            "query_nodes" => {
                let a: QueryNodesArgs = parse_args(command)?;
                let ids: Vec<&str> = self
                    .query_nodes(a.ty.as_deref(), &a.where_attrs)
                    .iter()
                    .map(|n| n.id.as_str())
                    .collect();
                Ok(json!({"count": ids.len(), "ids": ids}))
            }
            "add_semantics" => {
                let a: AddSemanticsArgs = parse_args(command)?;
                self.add_semantics(&a.entity, &a.text).map_err(stringify)?;
                Ok(json!({"entity": a.entity}))
            }
            "story" => {
                let a: StoryArgs = parse_args(command)?;
                let lines = self.story(&a.node).map_err(stringify)?;
                Ok(json!({"node": a.node, "lines": lines}))
            }
            "assert_constraint" => {
                let a: AssertConstraintArgs = parse_args(command)?;
                let id = self.assert_constraint(a.spec, a.id).map_err(stringify)?;
                Ok(json!({"id": id}))
            }
            "upsert_constraint" => {
                let a: UpsertConstraintArgs = parse_args(command)?;
                let id = self.upsert_constraint(a.id, a.spec);
                Ok(json!({"id": id}))
            }
            "remove_constraint" => {
                let a: IdArgs = parse_args(command)?;
                Ok(json!({"removed": self.remove_constraint(&a.id)}))
            }
            "define_rule" => {
                let rule: Rule = parse_args(command)?;
                let name = rule.name.clone();
                self.define_rule(rule);
                Ok(json!({"name": name}))
            }
            "run_rules" => {
                let a: RunRulesArgs = parse_args(command)?;
                Ok(jsonify(&self.run_rules(a.limit)))
            }
            "tick" => {
                let report = self.tick();
                Ok(json!({
                    "count": report.count(),
                    "delta": report.delta,
                    "updates": jsonify(&report.updates),
                }))
            }
            "simulate" => {
                let params: SimulateParams = parse_args(command)?;
                Ok(jsonify(&self.simulate(params)))
            }
            "explain" => {
                let a: PathArgs = parse_args(command)?;
                let contributors = self.explain(&a.path);
                Ok(json!({"path": a.path, "contributors": jsonify(&contributors)}))
            }
            "diff" => {
                let a: DiffArgs = parse_args(command)?;
                Ok(jsonify(&self.diff(a.since)))
            }
            "snapshot" => {
                let a: SnapshotArgs = parse_args(command)?;
                Ok(json!({"version": self.snapshot(a.label.as_deref())}))
            }
            "revert" => {
                let a: RevertArgs = parse_args(command)?;
                Ok(json!({"version": self.revert(a.version).map_err(stringify)?}))
            }
            "fork_hypotheses" => {
                let a: ForkHypothesesArgs = parse_args(command)?;
                let candidates = self
                    .fork_hypotheses(&a.source, &a.target, &a.context, &a.ruleset)
                    .map_err(stringify)?;
                Ok(jsonify(&candidates))
            }
            "collapse" => {
                let a: CollapseArgs = parse_args(command)?;
                match self.collapse(&a.target, &a.policy).map_err(stringify)? {
                    Some(report) => Ok(jsonify(&report)),
                    None => Ok(serde_json::Value::Null),
                }
            }
            "compare_scenarios" => {
                let a: CompareScenariosArgs = parse_args(command)?;
                Ok(jsonify(&self.compare_scenarios(
                    &a.scenarios,
                    &a.queries,
                    a.simulate,
                )))
            }
            _ => Err("unknown op".to_string()),
        }
    }
}

fn parse_args<T: DeserializeOwned>(command: serde_json::Value) -> std::result::Result<T, String> {
    serde_json::from_value(command).map_err(|err| err.to_string())
}

fn stringify(err: impl std::fmt::Display) -> String {
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_bad_line_never_aborts_the_batch() {
        let mut wb = Workbench::new();
        let batch = r#"
{"op":"create_node","type":"Claim","id":"c1"}
{"op":"frobnicate","id":"c1"}
{"op":"set_attr","target":"c1.score","value":0.8}
"#;
        let outcomes = wb.run_batch(batch);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].ok);
        assert!(!outcomes[1].ok);
        assert_eq!(outcomes[1].error.as_deref(), Some("unknown op"));
        assert!(outcomes[2].ok);
        assert_eq!(wb.get("c1.score"), Value::Scalar(0.8));
    }

    #[test]
    fn invocation_failures_are_per_line_too() {
        let mut wb = Workbench::new();
        let batch = r#"
{"op":"create_node","type":"Factor","id":"a"}
{"op":"create_edge","type":"causes","from":"a","to":"ghost"}
{"op":"create_node","type":"Factor","id":"b"}
not even json
"#;
        let outcomes = wb.run_batch(batch);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].ok);
        assert!(!outcomes[1].ok);
        assert!(outcomes[1].error.as_deref().unwrap().contains("ghost"));
        assert!(outcomes[2].ok);
        assert!(!outcomes[3].ok);
        assert!(outcomes[3].error.as_deref().unwrap().starts_with("invalid json"));
    }

    #[test]
    fn interval_shorthand_is_accepted_at_the_boundary() {
        let mut wb = Workbench::new();
        let outcomes = wb.run_batch(
            r#"
{"op":"create_node","type":"Factor","id":"coffee"}
{"op":"set_attr","target":"coffee.level","value":[0.3, 0.5]}
{"op":"query_attr","path":"coffee.level"}
"#,
        );
        assert!(outcomes.iter().all(|o| o.ok));
        assert_eq!(wb.get("coffee.level"), Value::interval(0.3, 0.5));
        let reading = outcomes[2].result.as_ref().unwrap();
        assert_eq!(reading["value"]["kind"], "interval");
    }

    #[test]
    fn constraints_flow_through_the_boundary() {
        let mut wb = Workbench::new();
        let outcomes = wb.run_batch(
            r#"
{"op":"create_node","type":"Claim","id":"c1"}
{"op":"create_node","type":"Reason","id":"r1","attrs":{"weight":0.8}}
{"op":"assert_constraint","target":"c1.score","expr":"val('r1.weight')","strength":1.0,"note":"support passthrough"}
{"op":"simulate","ticks":2}
{"op":"query_attr","path":"c1.score"}
{"op":"explain","path":"c1.score"}
"#,
        );
        assert!(outcomes.iter().all(|o| o.ok), "{outcomes:?}");
        assert_eq!(wb.get("c1.score"), Value::Scalar(0.8));
        let explain = outcomes[5].result.as_ref().unwrap();
        assert_eq!(explain["contributors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn missing_op_is_reported() {
        let mut wb = Workbench::new();
        let outcomes = wb.run_batch(r#"{"target":"a.b","value":1}"#);
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].ok);
        assert_eq!(outcomes[0].error.as_deref(), Some("missing op"));
    }
}

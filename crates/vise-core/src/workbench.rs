//! The workbench: exclusive owner of the graph, constraints, rules, and the
//! provenance log.
//!
//! Single-actor model: every operation runs to completion on the caller, and
//! no state is shared across workbench instances. The only concurrency
//! primitive is [`Workbench::fork`] — a value-disjoint deep copy — which is
//! what makes parallel scenario comparison safe without locks.
//!
//! Every mutating operation appends one provenance entry and bumps the
//! version counter exactly once. Composite operations (`run_rules`,
//! `simulate`, `revert`) log their inner mutations too, then one entry for
//! themselves.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::constraint::{Constraint, ConstraintSpec};
use crate::error::{Result, WorkbenchError};
use crate::eval;
use crate::graph::{split_path, AttrWrite, GraphStore, Edge, EntityId, Node};
use crate::provenance::{ProvenanceEntry, ProvenanceLog};
use crate::rule::{self, Binding, Rule, RuleAction};
use crate::value::{blend, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    graph: GraphStore,
    constraints: IndexMap<String, Constraint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbench {
    pub(crate) graph: GraphStore,
    constraints: IndexMap<String, Constraint>,
    rules: IndexMap<String, Rule>,
    version: u64,
    provenance: ProvenanceLog,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    snapshots: IndexMap<u64, Snapshot>,
}

/// One attribute read, stamped with the version it was taken at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttrReading {
    pub path: String,
    pub value: Value,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleApplication {
    pub rule: String,
    pub binding: Binding,
    pub constraint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub applied: usize,
    pub details: Vec<RuleApplication>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstraintUpdate {
    pub constraint: String,
    pub target: String,
    pub value: Value,
    pub applied_strength: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub updates: Vec<ConstraintUpdate>,
    /// Accumulated change metric: `|Δmid| + |Δwidth|` for interval pairs,
    /// `|Δ|` for scalar pairs, a unit cost for any change of kind.
    pub delta: f64,
}

impl TickReport {
    pub fn count(&self) -> usize {
        self.updates.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulateParams {
    #[serde(default = "default_ticks")]
    pub ticks: usize,
    /// Stop once a tick's delta drops to this level or below. Zero disables
    /// the check; the zero-update fixpoint test still applies.
    #[serde(default, alias = "until_delta")]
    pub delta_threshold: f64,
}

fn default_ticks() -> usize {
    1
}

impl Default for SimulateParams {
    fn default() -> Self {
        SimulateParams {
            ticks: 1,
            delta_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulateReport {
    pub ticks: usize,
    pub total_updates: usize,
    /// True when the loop stopped before exhausting its tick budget.
    pub converged: bool,
}

/// One constraint's contribution to an attribute, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub constraint: String,
    pub expr: String,
    pub strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
    /// Current value of the expression; `None` when evaluation fails.
    pub expr_value: Option<Value>,
    /// Current value at the target path.
    pub current: Value,
}

pub(crate) fn jsonify<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..6])
}

impl Workbench {
    pub fn new() -> Self {
        Workbench::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn provenance(&self) -> &ProvenanceLog {
        &self.provenance
    }

    pub fn constraint(&self, id: &str) -> Option<&Constraint> {
        self.constraints.get(id)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Bump the version and append one provenance entry. Called exactly once
    /// per mutating operation.
    pub(crate) fn record(
        &mut self,
        op: &str,
        args: serde_json::Value,
        result: Option<serde_json::Value>,
    ) {
        self.version += 1;
        self.provenance.append(op, args, self.version, result);
    }

    // ========================================================================
    // Graph CRUD
    // ========================================================================

    pub fn create_node(
        &mut self,
        ty: &str,
        id: Option<String>,
        attrs: IndexMap<String, Value>,
    ) -> Result<EntityId> {
        let id = id.unwrap_or_else(|| short_id("n"));
        if self.graph.nodes.contains_key(&id) {
            return Err(WorkbenchError::AlreadyExists(id));
        }
        let node = Node::new(id.clone(), ty, attrs);
        let args = json!({"type": ty, "id": id, "attrs": jsonify(&node.attrs)});
        self.graph.nodes.insert(id.clone(), node);
        self.record("create_node", args, Some(json!({"id": id})));
        Ok(id)
    }

    pub fn create_edge(
        &mut self,
        ty: &str,
        from: &str,
        to: &str,
        id: Option<String>,
        attrs: IndexMap<String, Value>,
    ) -> Result<EntityId> {
        if !self.graph.nodes.contains_key(from) {
            return Err(WorkbenchError::InvalidReference(from.to_string()));
        }
        if !self.graph.nodes.contains_key(to) {
            return Err(WorkbenchError::InvalidReference(to.to_string()));
        }
        let id = match id {
            Some(id) => {
                if self.graph.edges.contains_key(&id) {
                    return Err(WorkbenchError::AlreadyExists(id));
                }
                id
            }
            None => {
                let base = format!("{from}->{to}:{ty}");
                let mut candidate = base.clone();
                let mut n = 1usize;
                while self.graph.edges.contains_key(&candidate) {
                    candidate = format!("{base}#{n}");
                    n += 1;
                }
                candidate
            }
        };
        let edge = Edge::new(id.clone(), ty, from, to, attrs);
        let args = json!({
            "type": ty, "from": from, "to": to, "id": id, "attrs": jsonify(&edge.attrs),
        });
        self.graph.edges.insert(id.clone(), edge);
        self.record("create_edge", args, Some(json!({"id": id})));
        Ok(id)
    }

    /// Write one attribute. Nodes get a history record (and, with a gloss, a
    /// semantics annotation); a failed write leaves prior state untouched.
    pub fn set_attr(
        &mut self,
        path: &str,
        value: Value,
        source: &str,
        gloss: Option<&str>,
    ) -> Result<AttrWrite> {
        let write = self.graph.write_attr(path, value, source, gloss)?;
        self.record(
            "set_attr",
            json!({
                "target": path,
                "value": jsonify(&write.value),
                "source": source,
                "gloss": gloss,
            }),
            Some(jsonify(&write)),
        );
        Ok(write)
    }

    /// Lenient read: absent entities and attributes read as `Unknown`.
    pub fn get(&self, path: &str) -> Value {
        self.graph.get(path)
    }

    pub fn query_attr(&self, path: &str) -> AttrReading {
        AttrReading {
            path: path.to_string(),
            value: self.graph.get(path),
            version: self.version,
        }
    }

    pub fn query_nodes<'a>(
        &'a self,
        ty: Option<&'a str>,
        where_attrs: &'a IndexMap<String, Value>,
    ) -> Vec<&'a Node> {
        self.graph.nodes_matching(ty, where_attrs).collect()
    }

    /// Append a gloss to a node's semantics layer without touching
    /// attributes.
    pub fn add_semantics(&mut self, node_id: &str, text: &str) -> Result<()> {
        let node = self
            .graph
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| WorkbenchError::NotFound(node_id.to_string()))?;
        node.semantics.push(text.to_string());
        self.record(
            "add_semantics",
            json!({"entity": node_id, "text": text}),
            None,
        );
        Ok(())
    }

    /// A node's history rendered as human-readable lines.
    pub fn story(&self, node_id: &str) -> Result<Vec<String>> {
        let node = self
            .graph
            .nodes
            .get(node_id)
            .ok_or_else(|| WorkbenchError::NotFound(node_id.to_string()))?;
        Ok(node
            .history
            .iter()
            .map(|h| {
                let gloss = h.gloss.as_deref().unwrap_or("updated");
                let from = h
                    .from
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "unset".to_string());
                format!("{gloss}: {from} → {} (via {})", h.to, h.source)
            })
            .collect())
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    pub fn assert_constraint(&mut self, spec: ConstraintSpec, id: Option<String>) -> Result<String> {
        let id = id.unwrap_or_else(|| short_id("c"));
        if self.constraints.contains_key(&id) {
            return Err(WorkbenchError::AlreadyExists(id));
        }
        let args = constraint_args(&id, &spec);
        self.constraints.insert(id.clone(), Constraint::build(id.clone(), spec));
        self.record("assert_constraint", args, Some(json!({"id": id})));
        Ok(id)
    }

    /// Create or replace a constraint under a caller-chosen id. This is how
    /// rule application stays idempotent.
    pub fn upsert_constraint(&mut self, id: String, spec: ConstraintSpec) -> String {
        let args = constraint_args(&id, &spec);
        self.constraints.insert(id.clone(), Constraint::build(id.clone(), spec));
        self.record("upsert_constraint", args, Some(json!({"id": id})));
        id
    }

    /// Remove by id. Removing an absent constraint is a no-op and is not
    /// logged.
    pub fn remove_constraint(&mut self, id: &str) -> bool {
        if self.constraints.shift_remove(id).is_some() {
            self.record(
                "remove_constraint",
                json!({"id": id}),
                Some(json!({"removed": id})),
            );
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Rules
    // ========================================================================

    /// Register or overwrite a rule by name.
    pub fn define_rule(&mut self, rule: Rule) {
        let name = rule.name.clone();
        self.rules.insert(name.clone(), rule);
        self.record("define_rule", json!({"name": name}), None);
    }

    /// Match every rule against the graph and upsert the resulting
    /// constraints under deterministic `rule:target` ids. Constraints from
    /// matches that no longer hold are left in place.
    pub fn run_rules(&mut self, limit: Option<usize>) -> RuleReport {
        let rules: Vec<Rule> = self.rules.values().cloned().collect();
        let mut applied = 0usize;
        let mut details = Vec::new();
        'rules: for rule in &rules {
            for binding in rule::enumerate_bindings(&self.graph, rule) {
                if limit.is_some_and(|cap| applied >= cap) {
                    break 'rules;
                }
                for action in &rule.actions {
                    let RuleAction::EnsureConstraint(tpl) = action;
                    let target = rule::instantiate(&tpl.target, &binding);
                    let expr = rule::instantiate(&tpl.expr, &binding);
                    let guard = tpl.guard.clone().map(|g| crate::constraint::Guard {
                        watch: rule::instantiate(&g.watch, &binding),
                        ..g
                    });
                    let id = format!("{}:{}", rule.name, target);
                    self.upsert_constraint(
                        id.clone(),
                        ConstraintSpec {
                            target,
                            expr,
                            strength: tpl.strength,
                            note: tpl.note.clone().or_else(|| Some(rule.name.clone())),
                            gloss: tpl.gloss.clone(),
                            guard,
                        },
                    );
                    details.push(RuleApplication {
                        rule: rule.name.clone(),
                        binding: binding.clone(),
                        constraint: id,
                    });
                    applied += 1;
                }
            }
        }
        tracing::debug!(applied, "applied rule actions");
        self.record(
            "run_rules",
            json!({"limit": limit}),
            Some(json!({"applied": applied})),
        );
        RuleReport { applied, details }
    }

    // ========================================================================
    // Propagation
    // ========================================================================

    /// One synchronous pass over all constraints, in store order. A
    /// constraint whose expression fails to evaluate, or whose target entity
    /// has vanished, is skipped for the tick.
    pub fn tick(&mut self) -> TickReport {
        let mut updates = Vec::new();
        let mut delta = 0.0f64;
        for c in self.constraints.values() {
            let Some(ast) = &c.compiled else { continue };
            let Ok(computed) = eval::eval(ast, &self.graph) else {
                continue;
            };
            let mut strength = c.strength;
            if let Some(guard) = &c.guard {
                if let Some(Value::Scalar(watch)) = self.graph.lookup(&guard.watch) {
                    if *watch > guard.threshold {
                        strength *= guard.damping;
                    }
                }
            }
            let Some((entity, _)) = split_path(&c.target) else {
                continue;
            };
            if !self.graph.has_entity(entity) {
                continue;
            }
            let current = self.graph.get(&c.target);
            let blended = blend(&current, &computed, strength);
            if blended == current {
                continue;
            }
            delta += change_cost(&current, &blended);
            let source = format!("constraint:{}", c.id);
            if self
                .graph
                .write_attr(&c.target, blended.clone(), &source, c.history_gloss())
                .is_ok()
            {
                updates.push(ConstraintUpdate {
                    constraint: c.id.clone(),
                    target: c.target.clone(),
                    value: blended,
                    applied_strength: strength,
                });
            }
        }
        tracing::debug!(count = updates.len(), delta, "tick");
        self.record(
            "tick",
            json!({}),
            Some(json!({"count": updates.len(), "delta": delta})),
        );
        TickReport { updates, delta }
    }

    /// Run ticks until the budget is exhausted, the delta drops to the
    /// threshold (when one is set), or two consecutive ticks produce zero
    /// updates. A relaxation heuristic, not a convergence proof: divergent
    /// networks simply exhaust the budget.
    pub fn simulate(&mut self, params: SimulateParams) -> SimulateReport {
        let mut ticks = 0usize;
        let mut total_updates = 0usize;
        let mut converged = false;
        let mut previous_was_still = false;
        while ticks < params.ticks {
            let report = self.tick();
            ticks += 1;
            total_updates += report.count();
            if params.delta_threshold > 0.0 && report.delta <= params.delta_threshold {
                converged = true;
                break;
            }
            let still = report.updates.is_empty();
            if still && previous_was_still {
                converged = true;
                break;
            }
            previous_was_still = still;
        }
        let report = SimulateReport {
            ticks,
            total_updates,
            converged,
        };
        self.record(
            "simulate",
            jsonify(&params),
            Some(jsonify(&report)),
        );
        report
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Every live constraint targeting `path`, with its expression value
    /// recomputed now. Read-only.
    pub fn explain(&self, path: &str) -> Vec<Explanation> {
        self.constraints
            .values()
            .filter(|c| c.target == path)
            .map(|c| Explanation {
                constraint: c.id.clone(),
                expr: c.expr.clone(),
                strength: c.strength,
                note: c.note.clone(),
                gloss: c.gloss.clone(),
                expr_value: c
                    .compiled
                    .as_ref()
                    .and_then(|ast| eval::eval(ast, &self.graph).ok()),
                current: self.graph.get(path),
            })
            .collect()
    }

    /// Provenance entries appended after `since_version`, in append order.
    pub fn diff(&self, since_version: u64) -> Vec<ProvenanceEntry> {
        self.provenance.since(since_version)
    }

    // ========================================================================
    // Snapshots and forks
    // ========================================================================

    /// Record a deep copy of graph + constraints, keyed by the current
    /// version. Returns the key to pass to [`Workbench::revert`].
    pub fn snapshot(&mut self, label: Option<&str>) -> u64 {
        let at_version = self.version;
        self.snapshots.insert(
            at_version,
            Snapshot {
                label: label.map(str::to_string),
                graph: self.graph.clone(),
                constraints: self.constraints.clone(),
            },
        );
        self.record(
            "snapshot",
            json!({"label": label}),
            Some(json!({"version": at_version})),
        );
        at_version
    }

    pub fn revert(&mut self, to_version: u64) -> Result<u64> {
        let snapshot = self
            .snapshots
            .get(&to_version)
            .ok_or(WorkbenchError::NoSnapshot(to_version))?;
        self.graph = snapshot.graph.clone();
        self.constraints = snapshot.constraints.clone();
        self.record("revert", json!({"to_version": to_version}), None);
        Ok(self.version)
    }

    /// A fully independent deep copy: nothing is shared with the base, so
    /// forks may be simulated in parallel.
    pub fn fork(&self) -> Workbench {
        self.clone()
    }
}

fn constraint_args(id: &str, spec: &ConstraintSpec) -> serde_json::Value {
    json!({
        "id": id,
        "target": spec.target,
        "expr": spec.expr,
        "strength": spec.strength,
        "note": spec.note,
        "gloss": spec.gloss,
        "guard": jsonify(&spec.guard),
    })
}

fn change_cost(old: &Value, new: &Value) -> f64 {
    match (old, new) {
        (Value::Interval(a), Value::Interval(b)) => {
            (b.mid() - a.mid()).abs() + (b.width() - a.width()).abs()
        }
        (Value::Scalar(a), Value::Scalar(b)) => (b - a).abs(),
        _ => 1.0,
    }
}

//! Rules: typed, attribute-filtered subgraph patterns that materialize
//! constraints.
//!
//! Matching is an ordered backtracking search, written iteratively with an
//! explicit frame stack so binding and unbinding stay visible and bounded.
//! Node variables bind first (pairwise distinct), then edge variables
//! (pairwise distinct) whose endpoints must agree with already-bound node
//! variables; an edge pattern naming an unbound endpoint variable binds it
//! from the matched edge. Candidate order is store (insertion) order — no
//! further ordering guarantee is made.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constraint::Guard;
use crate::graph::{EntityId, GraphStore};
use crate::value::Value;

/// A complete variable-binding environment: variable name → entity id.
pub type Binding = IndexMap<String, EntityId>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePattern {
    pub var: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(rename = "where", default, skip_serializing_if = "IndexMap::is_empty")]
    pub where_attrs: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgePattern {
    pub var: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// Node variable the edge must leave from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Node variable the edge must arrive at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "where", default, skip_serializing_if = "IndexMap::is_empty")]
    pub where_attrs: IndexMap<String, Value>,
}

/// Ensure-constraint action template. `target`, `expr`, and `guard.watch`
/// are string templates: `{var}` tokens are replaced, as literal substrings,
/// with the bound entity id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintTemplate {
    pub target: String,
    pub expr: String,
    #[serde(default = "crate::constraint::default_strength")]
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    EnsureConstraint(ConstraintTemplate),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_patterns: Vec<NodePattern>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edge_patterns: Vec<EdgePattern>,
    pub actions: Vec<RuleAction>,
}

/// Replace every `{var}` token with its bound id.
pub(crate) fn instantiate(template: &str, binding: &Binding) -> String {
    let mut out = template.to_string();
    for (var, id) in binding {
        out = out.replace(&format!("{{{var}}}"), id);
    }
    out
}

enum PatternRef<'r> {
    Node(&'r NodePattern),
    Edge(&'r EdgePattern),
}

struct Frame {
    candidates: Vec<EntityId>,
    next: usize,
    /// Variables bound while trying this frame's current candidate.
    bound: Vec<String>,
}

/// All consistent variable bindings for a rule, in enumeration order.
pub(crate) fn enumerate_bindings(store: &GraphStore, rule: &Rule) -> Vec<Binding> {
    let patterns: Vec<PatternRef<'_>> = rule
        .node_patterns
        .iter()
        .map(PatternRef::Node)
        .chain(rule.edge_patterns.iter().map(PatternRef::Edge))
        .collect();
    if patterns.is_empty() {
        return vec![Binding::new()];
    }

    let mut results = Vec::new();
    let mut env = Binding::new();
    let mut stack = vec![Frame {
        candidates: candidates_for(store, &patterns[0], &env),
        next: 0,
        bound: Vec::new(),
    }];

    while !stack.is_empty() {
        let depth = stack.len() - 1;
        let top = &mut stack[depth];
        // Undo whatever the previous candidate at this depth bound.
        for var in top.bound.drain(..) {
            env.shift_remove(&var);
        }
        if top.next >= top.candidates.len() {
            stack.pop();
            continue;
        }
        let cand = top.candidates[top.next].clone();
        top.next += 1;
        if env.values().any(|bound| bound == &cand) {
            continue;
        }
        match &patterns[depth] {
            PatternRef::Node(pat) => {
                env.insert(pat.var.clone(), cand);
                top.bound.push(pat.var.clone());
            }
            PatternRef::Edge(pat) => {
                let Some(edge) = store.edges.get(&cand) else {
                    continue;
                };
                if let Some(from_var) = &pat.from {
                    if !env.contains_key(from_var) {
                        env.insert(from_var.clone(), edge.from.clone());
                        top.bound.push(from_var.clone());
                    }
                }
                if let Some(to_var) = &pat.to {
                    if !env.contains_key(to_var) {
                        env.insert(to_var.clone(), edge.to.clone());
                        top.bound.push(to_var.clone());
                    }
                }
                env.insert(pat.var.clone(), cand);
                top.bound.push(pat.var.clone());
            }
        }
        if depth + 1 == patterns.len() {
            results.push(env.clone());
        } else {
            let candidates = candidates_for(store, &patterns[depth + 1], &env);
            stack.push(Frame {
                candidates,
                next: 0,
                bound: Vec::new(),
            });
        }
    }
    results
}

fn candidates_for(store: &GraphStore, pattern: &PatternRef<'_>, env: &Binding) -> Vec<EntityId> {
    match pattern {
        PatternRef::Node(pat) => store
            .nodes_matching(pat.ty.as_deref(), &pat.where_attrs)
            .map(|n| n.id.clone())
            .collect(),
        PatternRef::Edge(pat) => store
            .edges
            .values()
            .filter(|e| {
                if let Some(ty) = &pat.ty {
                    if &e.ty != ty {
                        return false;
                    }
                }
                if let Some(from) = pat.from.as_ref().and_then(|var| env.get(var)) {
                    if from != &e.from {
                        return false;
                    }
                }
                if let Some(to) = pat.to.as_ref().and_then(|var| env.get(var)) {
                    if to != &e.to {
                        return false;
                    }
                }
                pat.where_attrs
                    .iter()
                    .all(|(k, want)| e.attrs.get(k) == Some(want))
            })
            .map(|e| e.id.clone())
            .collect(),
    }
}

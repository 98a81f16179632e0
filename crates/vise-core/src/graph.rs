//! Nodes, edges, and the path-addressed attribute store.
//!
//! Entities are owned by the store and addressed by stable string ids. An
//! attribute slot is addressed by a path `"entityId.attr"`, split on the
//! first `.` only — entity ids are free to contain arrows and colons (edge
//! ids do), attribute names are flat.
//!
//! Nodes additionally carry `semantics` (cumulative gloss annotations) and
//! `history` (an append-only changelog, never pruned). Edges carry plain
//! attributes; their endpoints are held as node ids, validated once at
//! creation and resolved through the store afterwards.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkbenchError};
use crate::hypothesis::BranchCandidate;
use crate::value::Value;

pub type EntityId = String;

/// One attribute change on a node. `from` is `None` for the first write to a
/// slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub path: String,
    pub from: Option<Value>,
    pub to: Value,
    pub source: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub attrs: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub semantics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
    /// Named candidate values per attribute, accumulated by
    /// `fork_hypotheses` and resolved by `collapse`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub hypotheses: IndexMap<String, Vec<BranchCandidate>>,
}

impl Node {
    pub fn new(id: impl Into<String>, ty: impl Into<String>, attrs: IndexMap<String, Value>) -> Self {
        Node {
            id: id.into(),
            ty: ty.into(),
            attrs,
            semantics: Vec::new(),
            history: Vec::new(),
            hypotheses: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub ty: String,
    pub from: EntityId,
    pub to: EntityId,
    #[serde(default)]
    pub attrs: IndexMap<String, Value>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        ty: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        attrs: IndexMap<String, Value>,
    ) -> Self {
        Edge {
            id: id.into(),
            ty: ty.into(),
            from: from.into(),
            to: to.into(),
            attrs,
        }
    }
}

/// Split a path on its first separator.
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    path.split_once('.')
}

/// Result of a successful attribute write.
#[derive(Debug, Clone, Serialize)]
pub struct AttrWrite {
    pub entity: EntityId,
    pub key: String,
    pub value: Value,
}

/// Owned node and edge maps. Iteration order is insertion order, which the
/// rule matcher and the scheduler both rely on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStore {
    pub nodes: IndexMap<EntityId, Node>,
    pub edges: IndexMap<EntityId, Edge>,
}

impl GraphStore {
    /// Lenient read: an absent entity or attribute reads as `Unknown`.
    pub fn get(&self, path: &str) -> Value {
        split_path(path)
            .and_then(|(entity, key)| self.attrs(entity)?.get(key))
            .cloned()
            .unwrap_or_else(Value::unknown)
    }

    /// Strict read for the evaluator: `None` when the entity or attribute is
    /// absent, or when the stored value is itself `Unknown`.
    pub(crate) fn lookup(&self, path: &str) -> Option<&Value> {
        let (entity, key) = split_path(path)?;
        let value = self.attrs(entity)?.get(key)?;
        if value.is_unknown() {
            None
        } else {
            Some(value)
        }
    }

    fn attrs(&self, entity: &str) -> Option<&IndexMap<String, Value>> {
        if let Some(node) = self.nodes.get(entity) {
            Some(&node.attrs)
        } else {
            self.edges.get(entity).map(|e| &e.attrs)
        }
    }

    pub(crate) fn has_entity(&self, entity: &str) -> bool {
        self.nodes.contains_key(entity) || self.edges.contains_key(entity)
    }

    /// Write one attribute slot. On nodes this appends a history record and,
    /// when a gloss is given, a semantics annotation; edges take the bare
    /// attribute write. Fails without touching state when the path is
    /// malformed or the entity is absent.
    pub(crate) fn write_attr(
        &mut self,
        path: &str,
        value: Value,
        source: &str,
        gloss: Option<&str>,
    ) -> Result<AttrWrite> {
        let (entity, key) = split_path(path)
            .ok_or_else(|| WorkbenchError::InvalidPath(path.to_string()))?;
        if let Some(node) = self.nodes.get_mut(entity) {
            let previous = node.attrs.insert(key.to_string(), value.clone());
            node.history.push(HistoryEntry {
                path: path.to_string(),
                from: previous,
                to: value.clone(),
                source: source.to_string(),
                at: Utc::now(),
                gloss: gloss.map(str::to_string),
            });
            if let Some(gloss) = gloss {
                node.semantics.push(gloss.to_string());
            }
            Ok(AttrWrite {
                entity: entity.to_string(),
                key: key.to_string(),
                value,
            })
        } else if let Some(edge) = self.edges.get_mut(entity) {
            edge.attrs.insert(key.to_string(), value.clone());
            Ok(AttrWrite {
                entity: entity.to_string(),
                key: key.to_string(),
                value,
            })
        } else {
            Err(WorkbenchError::NotFound(path.to_string()))
        }
    }

    /// Nodes matching a type tag and attribute-equality filter, in store
    /// order.
    pub fn nodes_matching<'a>(
        &'a self,
        ty: Option<&'a str>,
        where_attrs: &'a IndexMap<String, Value>,
    ) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.values().filter(move |n| {
            if let Some(want) = ty {
                if n.ty != want {
                    return false;
                }
            }
            where_attrs
                .iter()
                .all(|(k, v)| n.attrs.get(k) == Some(v))
        })
    }
}

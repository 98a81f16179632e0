//! Constraints: declarative recomputation of one attribute from others.
//!
//! A constraint owns a target path, an expression, and a blend strength in
//! `[0, 1]`. The expression source is parsed once here; the cached AST is
//! what the scheduler evaluates every tick. A constraint whose source fails
//! to parse is still stored — it just never produces a result (bad syntax is
//! an evaluation failure, recovered locally).

use serde::{Deserialize, Serialize};
use vise_expr::{parse_expr, Expr};

/// Damping condition: while `val(watch) > threshold`, the constraint's
/// effective strength for the tick is `strength * damping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    pub watch: String,
    pub threshold: f64,
    pub damping: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    /// Attribute path this constraint writes.
    pub target: String,
    /// Expression source, kept verbatim for `explain` and provenance.
    pub expr: String,
    /// Parsed form of `expr`; `None` when the source does not parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled: Option<Expr>,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
}

/// Caller-facing constraint parameters; `Constraint::build` compiles the
/// expression and attaches the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub target: String,
    pub expr: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
}

pub(crate) fn default_strength() -> f64 {
    1.0
}

impl Default for ConstraintSpec {
    fn default() -> Self {
        ConstraintSpec {
            target: String::new(),
            expr: String::new(),
            strength: 1.0,
            note: None,
            gloss: None,
            guard: None,
        }
    }
}

impl Constraint {
    pub fn build(id: String, spec: ConstraintSpec) -> Self {
        let compiled = match parse_expr(&spec.expr) {
            Ok(ast) => Some(ast),
            Err(err) => {
                tracing::warn!(constraint = %id, %err, "constraint expression does not parse");
                None
            }
        };
        Constraint {
            id,
            target: spec.target,
            expr: spec.expr,
            compiled,
            strength: spec.strength,
            note: spec.note,
            gloss: spec.gloss,
            guard: spec.guard,
        }
    }

    /// Gloss recorded on history entries written by this constraint.
    pub(crate) fn history_gloss(&self) -> Option<&str> {
        self.gloss.as_deref().or(self.note.as_deref())
    }
}

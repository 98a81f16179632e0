//! Vise: a graph-structured constraint workbench.
//!
//! Nodes and edges hold uncertain attribute values (scalars, intervals, or
//! `Unknown`); declarative constraints recompute attributes from other
//! attributes; rules materialize constraints by pattern-matching the graph;
//! a bounded relaxation loop drives the network toward a fixpoint. Every
//! mutation is versioned and logged, forks give independent counterfactual
//! scenarios, and branch hypotheses record competing candidate values until
//! a collapse policy commits one.
//!
//! ```
//! use vise_core::{ConstraintSpec, SimulateParams, Value, Workbench};
//! use indexmap::IndexMap;
//!
//! let mut wb = Workbench::new();
//! wb.create_node("Factor", Some("x".into()), IndexMap::new()).unwrap();
//! wb.create_node("Factor", Some("y".into()), IndexMap::new()).unwrap();
//! wb.set_attr("x.level", Value::interval(0.7, 0.9), "initial", None).unwrap();
//! wb.assert_constraint(
//!     ConstraintSpec {
//!         target: "y.level".into(),
//!         expr: "val('x.level') * 0.5".into(),
//!         ..Default::default()
//!     },
//!     None,
//! )
//! .unwrap();
//! wb.simulate(SimulateParams { ticks: 5, delta_threshold: 1e-9 });
//! assert_eq!(wb.get("y.level"), Value::interval(0.35, 0.45));
//! ```
//!
//! ## Module Organization
//!
//! - `value`: the `Unknown`/`Scalar`/`Interval` union and the blend operator
//! - `graph`: nodes, edges, per-node history, the path-addressed store
//! - `eval`: expression evaluation with locally-recovered failures
//! - `constraint` / `rule`: constraints, guards, and the pattern matcher
//! - `workbench`: the owner type — CRUD, propagation, provenance, forks
//! - `scenario`: parallel fork-and-compare
//! - `hypothesis`: branch candidates and collapse policies
//! - `commands`: the line-delimited JSON boundary

pub mod commands;
pub mod constraint;
pub mod error;
pub mod eval;
pub mod graph;
pub mod hypothesis;
pub mod provenance;
pub mod rule;
pub mod scenario;
pub mod value;
pub mod workbench;

pub use commands::BatchOutcome;
pub use constraint::{Constraint, ConstraintSpec, Guard};
pub use error::{EvalError, Result, WorkbenchError};
pub use graph::{AttrWrite, Edge, EntityId, GraphStore, HistoryEntry, Node};
pub use hypothesis::{
    BranchCandidate, BranchSpec, CollapsePolicy, CollapseReport, ContextualPolicy,
    HypothesisGroup, HypothesisRuleset, SignaturePattern, SignatureRule,
};
pub use provenance::{ProvenanceEntry, ProvenanceLog};
pub use rule::{Binding, ConstraintTemplate, EdgePattern, NodePattern, Rule, RuleAction};
pub use scenario::{Scenario, ScenarioReport};
pub use value::{blend, Interval, Value};
pub use workbench::{
    AttrReading, Explanation, RuleApplication, RuleReport, SimulateParams, SimulateReport,
    TickReport, Workbench,
};

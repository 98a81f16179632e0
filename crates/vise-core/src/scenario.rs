//! Fork-and-compare: counterfactual scenarios over value-disjoint forks.
//!
//! Each scenario forks the base workbench, applies its command batch,
//! relaxes the network, and reads back the requested attribute paths. The
//! base is never mutated. Because forks share no structure, the scenarios
//! run in parallel — deep-copy cost traded for lock-free fan-out.

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::value::Value;
use crate::workbench::{SimulateParams, Workbench};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Command-batch records (same shape as the JSONL boundary) applied to
    /// the scenario's fork before simulation.
    #[serde(default)]
    pub commands: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    /// Queried path → value after the scenario's simulation.
    pub readings: IndexMap<String, Value>,
    /// How far the fork drifted from the base: mutations logged since the
    /// fork point.
    pub ops_since_fork: usize,
    /// Scenario commands that failed; the rest of the batch still ran.
    pub failed_commands: usize,
}

impl Workbench {
    /// Run every scenario against its own fork of `self` and report the
    /// queried attribute values. Read-only on the base.
    pub fn compare_scenarios(
        &self,
        scenarios: &[Scenario],
        queries: &[String],
        sim: SimulateParams,
    ) -> Vec<ScenarioReport> {
        let base_version = self.version();
        scenarios
            .par_iter()
            .map(|scenario| {
                let mut fork = self.fork();
                let mut failed_commands = 0usize;
                for command in &scenario.commands {
                    if !fork.run_command(command.clone()).ok {
                        failed_commands += 1;
                    }
                }
                fork.simulate(sim);
                let readings = queries
                    .iter()
                    .map(|q| (q.clone(), fork.get(q)))
                    .collect();
                ScenarioReport {
                    scenario: scenario.name.clone(),
                    readings,
                    ops_since_fork: fork.diff(base_version).len(),
                    failed_commands,
                }
            })
            .collect()
    }
}

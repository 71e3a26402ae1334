//! Run configuration.
//!
//! A [`SchedulerConfig`] collects everything a driver needs to set up one
//! scheduling run, and can be loaded from JSON:
//!
//! ```json
//! {
//!   "technique": "pipelined",
//!   "resources": { "load": 1, "mul": 2 },
//!   "strategy": "ordering",
//!   "max_ii": 16
//! }
//! ```
//!
//! Missing fields take their defaults. Resource entries stay raw JSON values
//! until [`SchedulerConfig::resource_manager`] validates them, so one bad
//! capacity only drops its own entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

use crate::error::{Result, ScheduleError};
use crate::lp::{BranchAndBoundSolver, SolverConfig};
use crate::models::ResourceConfigError;
use crate::resource::{EnforcementBudget, ResourceManager, Strategy};
use crate::scheduler::{IiSearch, Scheduler, Technique};

/// Configuration of one scheduling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `asap`, `alap`, `no_pipeline` (or `nopipe`) or `pipelined`.
    pub technique: String,
    /// Raw capacity per resource class.
    pub resources: BTreeMap<String, Value>,
    pub strategy: Strategy,
    /// Drop cross-block forward edges between regular operations.
    pub restrict_to_same_block: bool,
    /// Upper end of the II search.
    pub max_ii: i64,
    /// Limits of pipelined MRT enforcement.
    pub enforcement: EnforcementBudget,
    pub solver: SolverConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            technique: "asap".into(),
            resources: BTreeMap::new(),
            strategy: Strategy::default(),
            restrict_to_same_block: true,
            max_ii: 40,
            enforcement: EnforcementBudget::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ScheduleError::config(format!("invalid configuration: {e}")))
    }

    /// Renders the configuration as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ScheduleError::config(format!("cannot serialize configuration: {e}")))
    }

    /// Parses the technique name.
    ///
    /// `alap` comes back without sink bounds and `pipelined` with II 1;
    /// drivers fill these in from an earlier run or the II search.
    pub fn technique(&self) -> Result<Technique> {
        self.technique.parse()
    }

    /// Builds an engine for `technique` with this configuration's solver
    /// settings.
    pub fn scheduler(&self, technique: Technique) -> Scheduler {
        Scheduler::new(technique)
            .with_solver(Box::new(
                BranchAndBoundSolver::new().with_config(self.solver.clone()),
            ))
            .with_restrict_to_same_block(self.restrict_to_same_block)
    }

    /// Validates the resource entries.
    ///
    /// Rejected entries are returned; the rest are applied.
    pub fn resource_manager(&self) -> (ResourceManager, Vec<ResourceConfigError>) {
        let mut malformed = Vec::new();
        let entries: Vec<(&str, i64)> = self
            .resources
            .iter()
            .filter_map(|(name, value)| match value.as_i64() {
                Some(capacity) => Some((name.as_str(), capacity)),
                None => {
                    let e = ResourceConfigError::MalformedCapacity {
                        name: name.clone(),
                        value: value.to_string(),
                    };
                    error!(%e, "rejected resource entry");
                    malformed.push(e);
                    None
                }
            })
            .collect();
        let (manager, mut rejected) = ResourceManager::from_entries(entries);
        rejected.extend(malformed);
        (manager, rejected)
    }

    /// II search set up from this configuration.
    ///
    /// Resource limits are enforced when any entry is valid.
    pub fn ii_search(&self) -> (IiSearch, Vec<ResourceConfigError>) {
        let (manager, rejected) = self.resource_manager();
        let mut search = IiSearch::new(self.max_ii)
            .with_budget(self.enforcement.clone())
            .with_restrict_to_same_block(self.restrict_to_same_block)
            .with_solver_config(self.solver.clone());
        if !manager.limits().is_empty() {
            search = search.with_resources(manager.limits().clone());
        }
        (search, rejected)
    }
}

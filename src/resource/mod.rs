//! Resource constraint engine.
//!
//! Adds resource-sharing limits to a scheduler's ILP through the narrow
//! [`IlpHandle`] the scheduler hands out, and checks finished schedules
//! against the same limits.
//!
//! # Strategies
//!
//! | Strategy | Exact | Extra variables | Needs |
//! |----------|-------|-----------------|-------|
//! | [`Strategy::Ordering`] | No (order-sensitive) | none | nothing |
//! | [`Strategy::TimeIndexed`] | Yes, within the horizon | `O(horizon × nodes)` binaries | a horizon or a solved model |
//!
//! Pipelined schedules use [`ResourceManager::add_resource_constraints_pipelined`],
//! a list-scheduling pass over the Modulo Reservation Table.
//!
//! # Reference
//! - Cong & Zhang (2006), "An efficient and versatile scheduling algorithm based on SDC formulation"
//! - Rau (1994), "Iterative modulo scheduling"

mod mrt;
mod ordering;
mod pipelined;
mod time_indexed;

pub use mrt::{ModuloReservationTable, MrtEntry};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::Result;
use crate::lp::ConstraintId;
use crate::models::{
    BlockId, Cdfg, ResourceConfigError, ResourceLimits, Schedule, Violation, ViolationType,
};
use crate::scheduler::IlpHandle;

/// How non-pipelined resource limits are expressed in the ILP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Topological-order spacing of same-class operations.
    #[default]
    Ordering,
    /// Per-cycle binary activation variables. Without an explicit horizon
    /// the model must already be solved (the horizon is derived from the
    /// sink delays).
    TimeIndexed { horizon: Option<i64> },
}

/// Limits of the pipelined enforcement loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementBudget {
    /// Passes shared by all classes.
    pub iterations: usize,
    /// No operation may be pushed past this cycle.
    pub max_latency: i64,
}

impl Default for EnforcementBudget {
    fn default() -> Self {
        Self {
            iterations: 1000,
            max_latency: 1000,
        }
    }
}

impl EnforcementBudget {
    /// Sets the pass budget.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the latency bound.
    pub fn with_max_latency(mut self, max_latency: i64) -> Self {
        self.max_latency = max_latency;
        self
    }
}

/// Outcome of a successful enforcement run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnforcementReport {
    /// Passes consumed.
    pub passes: usize,
    /// Operations pinned to their column.
    pub pinned: usize,
    /// One-cycle pushes (each followed by a re-solve).
    pub pushes: usize,
    /// Constraints left in the model.
    pub constraints: Vec<ConstraintId>,
}

/// Resource-sharing front end.
///
/// # Example
/// ```
/// use u_hls_schedule::resource::ResourceManager;
///
/// let (manager, rejected) = ResourceManager::from_entries([("mul", 1), ("fadd", 2)]);
/// assert_eq!(rejected.len(), 1);
/// assert_eq!(manager.limits().capacity("mul"), Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceManager {
    limits: ResourceLimits,
}

impl ResourceManager {
    /// Creates a manager over validated limits.
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    /// Creates a manager from raw entries; rejected entries are returned.
    pub fn from_entries<I, K>(entries: I) -> (Self, Vec<ResourceConfigError>)
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        let (limits, errors) = ResourceLimits::from_entries(entries);
        (Self::new(limits), errors)
    }

    /// Applies more raw entries; rejected entries are returned.
    pub fn set_resource_constraints<I, K>(&mut self, entries: I) -> Vec<ResourceConfigError>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: AsRef<str>,
    {
        self.limits.extend(entries)
    }

    /// Current limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Adds non-pipelined resource constraints with the chosen strategy.
    pub fn add_resource_constraints(
        &self,
        handle: &mut IlpHandle<'_>,
        strategy: Strategy,
    ) -> Result<Vec<ConstraintId>> {
        let added = match strategy {
            Strategy::Ordering => ordering::add_ordering_constraints(handle, &self.limits)?,
            Strategy::TimeIndexed { horizon } => {
                time_indexed::add_time_indexed_constraints(handle, &self.limits, horizon)?
            }
        };
        info!(?strategy, constraints = added.len(), "resource constraints added");
        Ok(added)
    }

    /// Enforces the limits on a solved pipelined model by MRT list
    /// scheduling. On failure the model is left as it was.
    pub fn add_resource_constraints_pipelined(
        &self,
        handle: &mut IlpHandle<'_>,
        ii: i64,
        budget: &EnforcementBudget,
    ) -> Result<EnforcementReport> {
        pipelined::enforce(handle, &self.limits, ii, budget)
    }

    /// Checks a non-pipelined schedule: per block, cycle and class, the
    /// number of operations issued must not exceed the capacity.
    pub fn check_resource_constraints(&self, graph: &Cdfg, schedule: &Schedule) -> Vec<Violation> {
        let mut issued: BTreeMap<(BlockId, i64, &'static str), Vec<&str>> = BTreeMap::new();
        for (_, op) in graph.operations() {
            let (Some(class), Some(cycle)) = (op.kind.resource_class(), schedule.cycle(&op.name))
            else {
                continue;
            };
            issued
                .entry((op.block, cycle, class))
                .or_default()
                .push(op.name.as_str());
        }

        let mut violations = Vec::new();
        for ((block, cycle, class), ops) in issued {
            let Some(cap) = self.limits.capacity(class) else {
                continue;
            };
            if ops.len() > cap as usize {
                violations.push(Violation::new(
                    ViolationType::CapacityExceeded,
                    class,
                    format!(
                        "{} {class} op(s) issued in cycle {cycle} of block {block}, capacity {cap}: {}",
                        ops.len(),
                        ops.join(", ")
                    ),
                ));
            }
        }
        violations
    }

    /// Checks a pipelined schedule: every MRT column must respect every
    /// capacity.
    pub fn check_resource_constraints_pipelined(
        &self,
        graph: &Cdfg,
        schedule: &Schedule,
        ii: i64,
    ) -> Vec<Violation> {
        let mrt = ModuloReservationTable::from_schedule(graph, schedule, ii);
        let mut violations = Vec::new();
        for (class, cap) in self.limits.iter() {
            for column in 0..mrt.ii() as usize {
                let n = mrt.occupancy(column, class);
                if n > cap as usize {
                    violations.push(Violation::new(
                        ViolationType::ModuloCapacityExceeded,
                        class,
                        format!("{n} {class} op(s) in MRT column {column} (II={ii}), capacity {cap}"),
                    ));
                }
            }
        }
        violations
    }
}

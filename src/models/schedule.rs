//! Schedule (solution) model.
//!
//! The result artifact handed to reporting: per-node start cycle, the
//! achieved initiation interval (pipelined schedules only) and the solve
//! status. Checks run against a schedule record their findings as
//! [`Violation`]s instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of one solve.
///
/// Infeasibility is a normal outcome, distinct from a solver failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Proven optimal assignment.
    Optimal,
    /// Feasible assignment; the solver stopped before proving optimality.
    Feasible,
    /// No assignment satisfies the constraints.
    Infeasible,
    /// The solver could not produce an answer (unbounded, node limit, ...).
    Failed(String),
}

impl SolveStatus {
    /// Whether an assignment is available.
    #[inline]
    pub fn is_solved(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => f.write_str("optimal"),
            SolveStatus::Feasible => f.write_str("feasible"),
            SolveStatus::Infeasible => f.write_str("infeasible"),
            SolveStatus::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// A scheduling result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Solve status.
    pub status: SolveStatus,
    /// Start cycle per node name (supernodes included, stripped nodes absent).
    pub cycles: BTreeMap<String, i64>,
    /// Achieved initiation interval, if the schedule is pipelined.
    pub ii: Option<i64>,
    /// Objective value reported by the solver.
    pub objective: Option<f64>,
    /// Findings of checks run against this schedule.
    pub violations: Vec<Violation>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            status: SolveStatus::Infeasible,
            cycles: BTreeMap::new(),
            ii: None,
            objective: None,
            violations: Vec::new(),
        }
    }
}

/// A broken scheduling rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Related node (or resource class) name.
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
}

/// Classification of schedule violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    /// A consumer starts before its producer's latency elapsed.
    DependencyViolated,
    /// A loop-carried dependency is not met at the achieved II.
    IntervalViolated,
    /// Too many operations of one class issued in the same cycle.
    CapacityExceeded,
    /// Too many operations of one class in the same MRT column.
    ModuloCapacityExceeded,
}

impl Violation {
    /// Creates a violation.
    pub fn new(
        violation_type: ViolationType,
        entity_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            violation_type,
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }
}

impl Schedule {
    /// Creates an empty schedule with the given status.
    pub fn new(status: SolveStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Start cycle of a node.
    pub fn cycle(&self, name: &str) -> Option<i64> {
        self.cycles.get(name).copied()
    }

    /// Whether an assignment is available.
    pub fn is_feasible(&self) -> bool {
        self.status.is_solved()
    }

    /// Latest start cycle over all nodes (0 for an empty schedule).
    pub fn latest_cycle(&self) -> i64 {
        self.cycles.values().copied().max().unwrap_or(0)
    }

    /// Nodes starting at `cycle`, in name order.
    pub fn nodes_at(&self, cycle: i64) -> Vec<&str> {
        self.cycles
            .iter()
            .filter(|(_, c)| **c == cycle)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Records a violation.
    pub fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Whether no violations were recorded.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of scheduled nodes.
    pub fn node_count(&self) -> usize {
        self.cycles.len()
    }
}

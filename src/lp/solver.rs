//! Solver abstraction.
//!
//! The scheduling engine only sees [`LpSolver`]; any MILP backend that can
//! read an [`LpModel`] and return named variable values fits behind it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::model::LpModel;

/// Outcome of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LpStatus {
    /// Proven optimal.
    Optimal,
    /// Integral assignment found, optimality not proven (search truncated).
    Feasible,
    Infeasible,
    Unbounded,
    /// Backend failure (node limit without incumbent, numerical stall, ...).
    Error(String),
}

impl LpStatus {
    /// Whether [`LpSolution::values`] holds an assignment.
    #[inline]
    pub fn has_solution(&self) -> bool {
        matches!(self, LpStatus::Optimal | LpStatus::Feasible)
    }
}

impl fmt::Display for LpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LpStatus::Optimal => f.write_str("optimal"),
            LpStatus::Feasible => f.write_str("feasible"),
            LpStatus::Infeasible => f.write_str("infeasible"),
            LpStatus::Unbounded => f.write_str("unbounded"),
            LpStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// A solve result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpSolution {
    pub status: LpStatus,
    /// Variable values by name (empty unless a solution was found).
    pub values: HashMap<String, f64>,
    /// Objective value of the returned assignment.
    pub objective: Option<f64>,
    /// Branch-and-bound nodes explored.
    pub nodes_explored: usize,
}

impl LpSolution {
    /// A solution without an assignment.
    pub fn without_values(status: LpStatus) -> Self {
        Self {
            status,
            values: HashMap::new(),
            objective: None,
            nodes_explored: 0,
        }
    }

    /// Value of a variable.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value of an integer variable, rounded.
    pub fn int_value(&self, name: &str) -> Option<i64> {
        self.value(name).map(|v| v.round() as i64)
    }
}

/// Search limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum branch-and-bound nodes per solve.
    pub max_nodes: usize,
    /// Integrality and pruning tolerance.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            tolerance: 1e-6,
        }
    }
}

impl SolverConfig {
    /// Sets the node limit.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Sets the tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// A MILP backend.
pub trait LpSolver: fmt::Debug + Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Solves `model`. Never fails: problems are reported through the status.
    fn solve(&self, model: &LpModel) -> LpSolution;
}

//! Error types for u-hls-schedule.
//!
//! Infeasibility is not an error: a solve that finds no schedule returns
//! `Ok(SolveStatus::Infeasible)`. The variants here cover misuse of the
//! engine, malformed input graphs, and exhausted searches.

use thiserror::Error;

use crate::lp::LpError;

/// Main error type for scheduling operations.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid configuration (technique name, malformed value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// An engine operation was called in a state that does not allow it.
    #[error("Precondition violated: `{operation}` is not allowed while the engine is {state}")]
    Precondition {
        operation: &'static str,
        state: String,
    },

    /// The graph breaks a structural invariant (e.g. a back-edge spanning two blocks).
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    /// A node name was not found in the graph or view.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// The underlying linear program rejected an operation.
    #[error("LP model error: {0}")]
    Lp(#[from] LpError),

    /// The II search reached its budget without a feasible schedule.
    #[error("No feasible initiation interval in 1..={max_ii}")]
    IiBudgetExhausted { max_ii: i64 },

    /// Pipelined resource enforcement gave up; all speculative constraints were rolled back.
    #[error("Resource enforcement failed: {0}")]
    Enforcement(EnforcementFailure),
}

/// Why pipelined resource enforcement stopped without a legal MRT.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnforcementFailure {
    /// The shared pass budget ran out with operations still queued.
    #[error("iteration budget of {budget} passes exhausted with {pending} operation(s) pending")]
    BudgetExhausted { budget: usize, pending: usize },

    /// Pushing an operation would move it past the latency bound.
    #[error("pushing `{node}` to cycle {cycle} exceeds the latency bound {bound}")]
    LatencyBoundExceeded {
        node: String,
        cycle: i64,
        bound: i64,
    },

    /// Pushing an operation made the ILP infeasible.
    #[error("pushing `{node}` to cycle {cycle} made the ILP infeasible")]
    Infeasible { node: String, cycle: i64 },

    /// The starting model had no solution to enforce against.
    #[error("no solved schedule to enforce resources against")]
    Unsolved,
}

impl ScheduleError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        ScheduleError::Config(msg.into())
    }

    /// Creates a malformed-graph error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        ScheduleError::MalformedGraph(msg.into())
    }
}

/// Result type alias for scheduling operations.
pub type Result<T> = std::result::Result<T, ScheduleError>;

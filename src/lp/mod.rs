//! Integer linear programming layer.
//!
//! [`LpModel`] stores named variables, linear constraints with stable
//! handles, and a linear objective. [`LpSolver`] is the backend seam; the
//! crate ships [`BranchAndBoundSolver`], a depth-first MILP search over a
//! dense two-phase simplex, which is adequate for the small per-kernel
//! models HLS scheduling produces.
//!
//! # Reference
//! - Schrijver (1998), "Theory of Linear and Integer Programming"

mod branch_bound;
mod model;
mod simplex;
mod solver;

pub use branch_bound::BranchAndBoundSolver;
pub use model::{
    ConstraintId, LinearConstraint, LpError, LpModel, Objective, ObjectiveSense, Sense, VarId,
    VarKind, Variable,
};
pub use solver::{LpSolution, LpSolver, LpStatus, SolverConfig};

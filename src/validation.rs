//! Structural validation of scheduling inputs and results.
//!
//! [`validate_cdfg`] checks a graph before it reaches the engine. Detects:
//! - Duplicate node names and dangling edges
//! - Operations assigned to unknown blocks
//! - Missing or duplicated supernodes, and supernodes wired to the wrong kind of node
//! - Back-edges spanning two blocks
//! - Cycles among forward dependencies
//! - Negative or non-finite latencies
//!
//! [`validate_schedule`] re-checks a finished schedule against the
//! dependency and recurrence rules without touching any model.
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4 (Topological Sort)

use std::collections::{HashMap, HashSet};

use crate::models::{BlockId, Cdfg, OpKind, Schedule, Violation, ViolationType};
use crate::scheduler::BACK_EDGE_DISTANCE;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two nodes share the same name.
    DuplicateName,
    /// An edge references a node that doesn't exist.
    DanglingEdge,
    /// An operation references a block that doesn't exist.
    InvalidBlock,
    /// A block lacks its supersource or supersink.
    MissingSuperNode,
    /// A block has more than one supersource or supersink.
    DuplicateSuperNode,
    /// A supernode is connected to something other than the block boundary.
    SuperNodeConnectivity,
    /// A loop-carried dependency leaves its block.
    CrossBlockBackEdge,
    /// Forward dependencies contain a cycle.
    CyclicDependency,
    /// Latency is negative, NaN or infinite.
    InvalidLatency,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates a graph before scheduling.
///
/// Checks:
/// 1. Node names are unique and every edge endpoint exists
/// 2. Every operation belongs to an existing block
/// 3. Every block has exactly one supersource and one supersink
/// 4. Supersources are only entered from supersinks, supersinks only lead to supersources
/// 5. Back-edges between scheduled nodes stay inside one block
/// 6. Forward dependencies are acyclic
/// 7. Latencies are finite and non-negative
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_cdfg(graph: &Cdfg) -> ValidationResult {
    let mut errors = Vec::new();
    let n = graph.node_count();

    let mut names = HashSet::new();
    for (_, op) in graph.operations() {
        if !names.insert(op.name.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateName,
                format!("Duplicate node name: {}", op.name),
            ));
        }
        if graph.block(op.block).is_none() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidBlock,
                format!("Node {} references unknown block {}", op.name, op.block),
            ));
        }
        if !op.latency.is_finite() || op.latency < 0.0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidLatency,
                format!("Node {} has invalid latency {}", op.name, op.latency),
            ));
        }
    }

    let dangling: Vec<_> = graph
        .edges()
        .iter()
        .filter(|e| e.source.0 >= n || e.target.0 >= n)
        .collect();
    for e in &dangling {
        errors.push(ValidationError::new(
            ValidationErrorKind::DanglingEdge,
            format!("Edge {} -> {} references a missing node", e.source.0, e.target.0),
        ));
    }
    if !dangling.is_empty() {
        // The remaining checks index nodes by edge endpoints.
        return Err(errors);
    }

    check_super_nodes(graph, &mut errors);

    for e in graph.back_edges() {
        let (u, v) = (graph.node(e.source), graph.node(e.target));
        if u.kind.is_stripped() || v.kind.is_stripped() {
            continue;
        }
        if u.block != v.block {
            errors.push(ValidationError::new(
                ValidationErrorKind::CrossBlockBackEdge,
                format!(
                    "Back-edge {} -> {} spans blocks {} and {}",
                    u.name, v.name, u.block, v.block
                ),
            ));
        }
    }

    if graph.topological_order().is_err() {
        errors.push(ValidationError::new(
            ValidationErrorKind::CyclicDependency,
            "Cycle detected in forward dependencies",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_super_nodes(graph: &Cdfg, errors: &mut Vec<ValidationError>) {
    let mut sources: HashMap<BlockId, usize> = HashMap::new();
    let mut sinks: HashMap<BlockId, usize> = HashMap::new();
    for (_, op) in graph.operations() {
        match op.kind {
            OpKind::SuperSource => *sources.entry(op.block).or_insert(0) += 1,
            OpKind::SuperSink => *sinks.entry(op.block).or_insert(0) += 1,
            _ => {}
        }
    }

    for block in graph.blocks() {
        for (what, counts) in [("supersource", &sources), ("supersink", &sinks)] {
            match counts.get(&block.id).copied().unwrap_or(0) {
                0 => errors.push(ValidationError::new(
                    ValidationErrorKind::MissingSuperNode,
                    format!("Block {} has no {what}", block.name),
                )),
                1 => {}
                k => errors.push(ValidationError::new(
                    ValidationErrorKind::DuplicateSuperNode,
                    format!("Block {} has {k} {what}s", block.name),
                )),
            }
        }
    }

    for e in graph.forward_edges() {
        let (u, v) = (graph.node(e.source), graph.node(e.target));
        if v.kind == OpKind::SuperSource && u.kind != OpKind::SuperSink {
            errors.push(ValidationError::new(
                ValidationErrorKind::SuperNodeConnectivity,
                format!("Supersource {} has predecessor {}", v.name, u.name),
            ));
        }
        if u.kind == OpKind::SuperSink && v.kind != OpKind::SuperSource {
            errors.push(ValidationError::new(
                ValidationErrorKind::SuperNodeConnectivity,
                format!("Supersink {} has successor {}", u.name, v.name),
            ));
        }
    }
}

/// Re-checks a schedule of `graph`.
///
/// Every forward dependency between two scheduled nodes must satisfy
/// `cycle(v) - cycle(u) ≥ lat(u)`. With an II, every back-edge must satisfy
/// `cycle(v) - cycle(u) + II ≥ lat(u)`. Unscheduled (stripped) nodes are
/// skipped.
pub fn validate_schedule(graph: &Cdfg, schedule: &Schedule) -> Vec<Violation> {
    let mut violations = Vec::new();
    for e in graph.edges() {
        let (u, v) = (graph.node(e.source), graph.node(e.target));
        let (Some(cu), Some(cv)) = (schedule.cycle(&u.name), schedule.cycle(&v.name)) else {
            continue;
        };
        let slack = if e.back_edge {
            let Some(ii) = schedule.ii else {
                continue;
            };
            (cv - cu + BACK_EDGE_DISTANCE * ii) as f64 - u.latency
        } else {
            (cv - cu) as f64 - u.latency
        };
        if slack < 0.0 {
            let (violation_type, what) = if e.back_edge {
                (ViolationType::IntervalViolated, "loop-carried dependency")
            } else {
                (ViolationType::DependencyViolated, "dependency")
            };
            violations.push(Violation::new(
                violation_type,
                v.name.as_str(),
                format!(
                    "{what} {} -> {} short by {} cycle(s)",
                    u.name,
                    v.name,
                    (-slack).ceil()
                ),
            ));
        }
    }
    violations
}

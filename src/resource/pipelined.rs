//! List scheduling against a Modulo Reservation Table.
//!
//! Starting from a solved, resource-unconstrained pipelined model, each
//! limited class is processed in topological order:
//!
//! 1. If the head operation fits its MRT column (counting only finalized
//!    operations), it is pinned to its cycle with an equality constraint.
//! 2. Otherwise it is pushed one cycle later (`sv ≥ cycle + 1`), the model
//!    is re-solved and the operation goes back to the front of the queue.
//!
//! Every pass costs one unit of a shared budget. Running out of budget,
//! pushing past the latency bound, or an infeasible re-solve ends the
//! procedure; all constraints it added are then removed again and the
//! solution snapshot is restored.

use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

use super::{EnforcementBudget, EnforcementReport, ModuloReservationTable};
use crate::error::{EnforcementFailure, Result, ScheduleError};
use crate::lp::{ConstraintId, Sense};
use crate::models::ResourceLimits;
use crate::scheduler::{sv, IlpHandle};

/// Runs the enforcement loop; rolls back on failure.
pub(crate) fn enforce(
    handle: &mut IlpHandle<'_>,
    limits: &ResourceLimits,
    ii: i64,
    budget: &EnforcementBudget,
) -> Result<EnforcementReport> {
    if !handle.is_solved() {
        return Err(ScheduleError::Enforcement(EnforcementFailure::Unsolved));
    }
    let snapshot = handle.solution.clone();
    let mut added: Vec<ConstraintId> = Vec::new();

    match run(handle, limits, ii, budget, &mut added) {
        Ok(mut report) => {
            report.constraints = added;
            info!(
                ii,
                passes = report.passes,
                pinned = report.pinned,
                pushes = report.pushes,
                "MRT enforcement succeeded"
            );
            Ok(report)
        }
        Err(err) => {
            for id in added.iter().rev() {
                handle.model.remove_constraint(*id)?;
            }
            handle.solution = snapshot;
            warn!(ii, rolled_back = added.len(), %err, "MRT enforcement failed");
            Err(err)
        }
    }
}

fn failure(f: EnforcementFailure) -> ScheduleError {
    ScheduleError::Enforcement(f)
}

fn run(
    handle: &mut IlpHandle<'_>,
    limits: &ResourceLimits,
    ii: i64,
    budget: &EnforcementBudget,
    added: &mut Vec<ConstraintId>,
) -> Result<EnforcementReport> {
    let view = handle.view;
    let mut report = EnforcementReport::default();
    let mut remaining = budget.iterations;
    let mut finalized: HashSet<String> = HashSet::new();

    for (class, capacity) in limits.iter() {
        let mut queue: VecDeque<usize> = view
            .topological_order()
            .iter()
            .copied()
            .filter(|&i| view.node(i).kind.resource_class() == Some(class))
            .collect();

        while let Some(op) = queue.pop_front() {
            if remaining == 0 {
                return Err(failure(EnforcementFailure::BudgetExhausted {
                    budget: budget.iterations,
                    pending: queue.len() + 1,
                }));
            }
            remaining -= 1;
            report.passes += 1;

            let name = view.node(op).name.as_str();
            let cycle = handle
                .cycle(name)
                .ok_or_else(|| failure(EnforcementFailure::Unsolved))?;
            let mrt = ModuloReservationTable::generate(view, |n| handle.cycle(n), ii);

            if mrt.is_legal(name, class, cycle, capacity, &finalized) {
                let id = handle
                    .model
                    .add_constraint([(sv(name), 1.0)], Sense::Eq, cycle as f64)?;
                added.push(id);
                finalized.insert(name.to_string());
                report.pinned += 1;
                debug!(op = name, class, cycle, column = mrt.column_of(cycle), "pinned");
                continue;
            }

            let target = cycle + 1;
            if target > budget.max_latency {
                return Err(failure(EnforcementFailure::LatencyBoundExceeded {
                    node: name.to_string(),
                    cycle: target,
                    bound: budget.max_latency,
                }));
            }
            let id = handle
                .model
                .add_constraint([(sv(name), 1.0)], Sense::Ge, target as f64)?;
            added.push(id);
            report.pushes += 1;
            debug!(op = name, class, from = cycle, to = target, "column full, pushing");

            if !handle.solve("mrt_enforcement").has_solution() {
                return Err(failure(EnforcementFailure::Infeasible {
                    node: name.to_string(),
                    cycle: target,
                }));
            }
            queue.push_front(op);
        }
    }
    Ok(report)
}

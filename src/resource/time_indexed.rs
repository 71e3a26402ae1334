//! Time-indexed ("exact, bounded-horizon") resource constraints.
//!
//! One binary `x_<node>_<t>` per constrained node and cycle `t` in
//! `[0, horizon]`:
//!
//! ```text
//! Σ_t x(n,t)           = 1          (one activation cycle)
//! sv(n) - Σ_t t·x(n,t) = 0          (links the timing variable)
//! Σ_n x(n,t)          ≤ capacity    (per block, class and cycle)
//! ```
//!
//! Exact within the horizon but adds `O(horizon × nodes)` variables.
//!
//! # Reference
//! - De Micheli (1994), "Synthesis and Optimization of Digital Circuits", Ch. 5.4

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{Result, ScheduleError};
use crate::lp::{ConstraintId, Sense, VarKind};
use crate::models::{BlockId, ResourceLimits};
use crate::scheduler::{sv, IlpHandle};

fn activation_var(node: &str, t: i64) -> String {
    format!("x_{node}_{t}")
}

/// Per-block horizon: the explicit one, or the block's unconstrained sink
/// delay plus the number of constrained operations in the whole view.
///
/// Timing variables are absolute cycles, so serialising an earlier block
/// shifts every block after it; counting only the block's own operations
/// would cut off feasible schedules.
fn horizons(
    handle: &IlpHandle<'_>,
    limits: &ResourceLimits,
    explicit: Option<i64>,
) -> Result<BTreeMap<BlockId, i64>> {
    let view = handle.view;
    let constrained = view
        .nodes()
        .iter()
        .filter(|n| limits.capacity_for(n.kind).is_some())
        .count() as i64;
    let mut out = BTreeMap::new();
    for block in view.blocks() {
        let horizon = match explicit {
            Some(h) => h,
            None => {
                let sink = view
                    .sink_of(block)
                    .ok_or_else(|| ScheduleError::malformed(format!("block {block} has no supersink")))?;
                let delay = handle.cycle(&view.node(sink).name).ok_or(
                    ScheduleError::Precondition {
                        operation: "add_resource_constraints",
                        state: "time-indexed strategy needs a solved model or an explicit horizon"
                            .into(),
                    },
                )?;
                delay + constrained
            }
        };
        out.insert(block, horizon.max(0));
    }
    Ok(out)
}

/// Adds the time-indexed formulation and returns the constraint ids.
///
/// On error every constraint added so far is removed again. Activation
/// binaries already declared stay in the model, unconstrained.
pub(crate) fn add_time_indexed_constraints(
    handle: &mut IlpHandle<'_>,
    limits: &ResourceLimits,
    horizon: Option<i64>,
) -> Result<Vec<ConstraintId>> {
    let horizons = horizons(handle, limits, horizon)?;
    let mut added = Vec::new();
    match build(handle, limits, &horizons, &mut added) {
        Ok(()) => Ok(added),
        Err(err) => {
            for id in added.iter().rev() {
                handle.model.remove_constraint(*id)?;
            }
            warn!(rolled_back = added.len(), %err, "time-indexed constraints failed");
            Err(err)
        }
    }
}

fn build(
    handle: &mut IlpHandle<'_>,
    limits: &ResourceLimits,
    horizons: &BTreeMap<BlockId, i64>,
    added: &mut Vec<ConstraintId>,
) -> Result<()> {
    let view = handle.view;
    for (&block, &h) in horizons {
        for (class, capacity) in limits.iter() {
            let nodes: Vec<&str> = view
                .nodes()
                .iter()
                .filter(|n| n.block == block && n.kind.resource_class() == Some(class))
                .map(|n| n.name.as_str())
                .collect();
            if nodes.is_empty() {
                continue;
            }

            for &node in &nodes {
                let mut link = vec![(sv(node), 1.0)];
                let mut once = Vec::with_capacity(h as usize + 1);
                for t in 0..=h {
                    let x = activation_var(node, t);
                    handle
                        .model
                        .add_variable(x.as_str(), None, None, VarKind::Binary)?;
                    link.push((x.clone(), -(t as f64)));
                    once.push((x, 1.0));
                }
                added.push(handle.model.add_constraint(once, Sense::Eq, 1.0)?);
                added.push(handle.model.add_constraint(link, Sense::Eq, 0.0)?);
            }

            for t in 0..=h {
                let terms = nodes.iter().map(|n| (activation_var(n, t), 1.0));
                added.push(
                    handle
                        .model
                        .add_constraint(terms, Sense::Le, f64::from(capacity))?,
                );
            }
            debug!(
                %block,
                class,
                capacity,
                horizon = h,
                nodes = nodes.len(),
                "time-indexed constraints"
            );
        }
    }
    Ok(())
}

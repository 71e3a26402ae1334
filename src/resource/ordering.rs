//! Ordering heuristic ("SDC-style") resource constraints.
//!
//! Fixes one topological order of the view. Per block and per limited
//! class, the same-class nodes taken in that order form a sequence
//! `n_0, n_1, ...`; with capacity `k`, node `n_{i+k}` may not start before
//! `n_i` has finished:
//!
//! ```text
//! sv(n_{i+k}) - sv(n_i) ≥ lat(n_i)
//! ```
//!
//! Any `k+1` overlapping instances would contain two from the same residue
//! chain, so at most `k` are in flight in any cycle. Sound but
//! conservative: schedules that need a different execution order are cut off.

use tracing::debug;

use crate::error::Result;
use crate::lp::{ConstraintId, Sense};
use crate::models::ResourceLimits;
use crate::scheduler::{sv, IlpHandle};

/// Adds the ordering constraints and returns their ids.
pub(crate) fn add_ordering_constraints(
    handle: &mut IlpHandle<'_>,
    limits: &ResourceLimits,
) -> Result<Vec<ConstraintId>> {
    let view = handle.view;
    let order = view.topological_order();
    let mut added = Vec::new();

    for block in view.blocks() {
        for (class, capacity) in limits.iter() {
            let sequence: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&i| {
                    let n = view.node(i);
                    n.block == block && n.kind.resource_class() == Some(class)
                })
                .collect();
            let k = capacity as usize;
            for (i, &earlier) in sequence.iter().enumerate() {
                let Some(&later) = sequence.get(i + k) else {
                    break;
                };
                let (u, v) = (view.node(earlier), view.node(later));
                let id = handle.model.add_constraint(
                    [(sv(&v.name), 1.0), (sv(&u.name), -1.0)],
                    Sense::Ge,
                    u.latency,
                )?;
                added.push(id);
            }
            if sequence.len() > k {
                debug!(
                    %block,
                    class,
                    capacity,
                    instances = sequence.len(),
                    constraints = sequence.len() - k,
                    "ordering constraints"
                );
            }
        }
    }
    Ok(added)
}

//! ILP scheduling engine, disciplines and II search.
//!
//! Builds one integer timing model per run: a variable `sv<node>` per
//! operation, one difference constraint per dependency, an optional
//! initiation-interval variable for loops, and a discipline-specific
//! objective. The resource engine in [`crate::resource`] adds to the same
//! model through an [`IlpHandle`].
//!
//! # Disciplines
//!
//! | Technique | Objective |
//! |-----------|-----------|
//! | `Asap` | minimize Σ sv |
//! | `Alap` | maximize Σ sv under per-sink bounds |
//! | `NoPipeline` | minimize `max_latency` ≥ every sink |
//! | `Pipelined` | minimize `II` (fixed or per block), then Σ sv |
//!
//! # KPI
//!
//! [`ScheduleKpi`] reports latency, achieved II and resource peaks.
//!
//! # References
//!
//! - Cong & Zhang (2006), "An efficient and versatile scheduling algorithm
//!   based on SDC formulation"
//! - Rau (1994), "Iterative modulo scheduling"

mod engine;
mod ii_search;
mod kpi;
#[cfg(test)]
mod properties;
mod technique;

pub use engine::{EngineState, IlpHandle, Scheduler};
pub use ii_search::{AttemptOutcome, IiAttempt, IiSearch, IiSearchResult};
pub use kpi::ScheduleKpi;
pub use technique::{IiTarget, Technique};

use crate::models::BlockId;

/// Iteration distance of every back-edge.
pub const BACK_EDGE_DISTANCE: i64 = 1;

/// Global initiation interval variable.
pub const II_VAR: &str = "II";

/// Upper bound over per-block initiation intervals.
pub const MAX_II_VAR: &str = "max_II";

/// Latency variable of the no-pipeline discipline.
pub const MAX_LATENCY_VAR: &str = "max_latency";

/// Timing variable name of a node.
pub fn sv(node: &str) -> String {
    format!("sv{node}")
}

/// Per-block initiation interval variable name.
pub fn ii_block_var(block: BlockId) -> String {
    format!("II_{}", block.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_names() {
        assert_eq!(sv("A1"), "svA1");
        assert_eq!(sv("ssink_2"), "svssink_2");
        assert_eq!(ii_block_var(BlockId(3)), "II_3");
    }
}

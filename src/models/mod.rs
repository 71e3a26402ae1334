//! Scheduling domain models.
//!
//! Provides the data types the scheduling core consumes and produces:
//! the control/data-flow graph handed over by the IR front end, the
//! filtered view used for constraint generation, resource capacities and
//! the schedule result.
//!
//! # Domain Mappings
//!
//! | u-hls-schedule | LLVM IR | Dataflow circuit |
//! |----------------|---------|------------------|
//! | Operation | Instruction | Functional unit instance |
//! | BasicBlock | Basic block | Control region |
//! | Dependency (back-edge) | Phi incoming from latch | Loop-carried channel |
//! | ResourceLimits | — | Shared unit count |

mod block;
mod cdfg;
mod operation;
mod resource;
mod schedule;
mod view;

pub use block::{BasicBlock, ControlEdge};
pub use cdfg::{Cdfg, Dependency, NodeId};
pub use operation::{BlockId, OpKind, Operation};
pub use resource::{ResourceConfigError, ResourceLimits, ALLOWED_RESOURCES};
pub use schedule::{Schedule, SolveStatus, Violation, ViolationType};
pub use view::{ScheduleView, ViewEdge, ViewNode};

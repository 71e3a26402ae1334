//! ILP-based operation scheduling for high-level synthesis.
//!
//! Turns a kernel's control/data-flow graph into a cycle-accurate schedule
//! by building an integer linear program over per-node start cycles and
//! solving it. Supports ASAP, ALAP, latency-minimal and software-pipelined
//! disciplines, with optional per-class resource limits.
//!
//! # Modules
//!
//! - **`models`**: Domain types — `Cdfg`, `Operation`, `BasicBlock`,
//!   `ScheduleView`, `ResourceLimits`, `Schedule`
//! - **`lp`**: Linear program model, LP-format rendering and the `LpSolver`
//!   capability with a built-in branch-and-bound solver
//! - **`scheduler`**: Scheduling engine, disciplines, II search and KPIs
//! - **`resource`**: Resource constraint strategies, Modulo Reservation
//!   Table and pipelined enforcement
//! - **`validation`**: Graph integrity checks and schedule re-checks
//! - **`config`**: JSON run configuration
//!
//! # Example
//!
//! ```
//! use u_hls_schedule::models::{Cdfg, OpKind};
//! use u_hls_schedule::scheduler::{Scheduler, Technique};
//!
//! let mut g = Cdfg::new("dot");
//! let bb = g.add_block("entry");
//! g.op("a", OpKind::Load, bb).unwrap();
//! g.op("b", OpKind::Load, bb).unwrap();
//! g.op("p", OpKind::Mul, bb).unwrap();
//! g.add_dependency("a", "p").unwrap();
//! g.add_dependency("b", "p").unwrap();
//! g.insert_super_nodes().unwrap();
//!
//! let mut s = Scheduler::new(Technique::NoPipeline);
//! s.initialize(&g).unwrap();
//! s.build_ilp().unwrap();
//! s.solve("dot").unwrap();
//! let schedule = s.schedule().unwrap();
//! assert_eq!(schedule.cycle("p"), Some(2));
//! assert_eq!(schedule.cycle("ssink_0"), Some(5));
//! ```
//!
//! # Logging
//!
//! Events are emitted through `tracing`; installing a subscriber is left
//! to the application.
//!
//! # References
//!
//! - Cong & Zhang (2006), "An efficient and versatile scheduling algorithm
//!   based on SDC formulation"
//! - Rau (1994), "Iterative modulo scheduling"
//! - De Micheli (1994), "Synthesis and Optimization of Digital Circuits"

pub mod config;
pub mod error;
pub mod lp;
pub mod models;
pub mod resource;
pub mod scheduler;
pub mod validation;

pub use config::SchedulerConfig;
pub use error::{EnforcementFailure, Result, ScheduleError};

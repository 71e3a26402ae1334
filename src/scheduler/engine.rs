//! ILP scheduling engine.
//!
//! Owns one timing model per run. The lifecycle is a small state machine;
//! calling an operation out of order is a precondition violation.
//!
//! ```text
//! Uninitialized ─initialize→ Initialized ─add_dependency_constraints→ ConstraintsBuilt
//!   ─(add_ii_constraint)→ ConstraintsBuilt ─set_objective→ ObjectiveSet ─solve→ Solved | Infeasible
//! ```
//!
//! Once an objective is set the model may still grow (resource
//! constraints via [`Scheduler::pass_scheduling_ilp`]) and be re-solved.
//!
//! # Reference
//! - Cong & Zhang (2006), "An efficient and versatile scheduling algorithm
//!   based on SDC formulation"

use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, trace, warn};

use super::technique::{IiTarget, Technique};
use super::{sv, II_VAR, MAX_II_VAR};
use crate::error::{Result, ScheduleError};
use crate::lp::{BranchAndBoundSolver, LpModel, LpSolution, LpSolver, LpStatus, Sense, VarKind};
use crate::models::{Cdfg, Schedule, ScheduleView, SolveStatus};
use crate::validation;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    /// Timing variables allocated.
    Initialized,
    ConstraintsBuilt,
    ObjectiveSet,
    Solved,
    Infeasible,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initialized => "initialized",
            EngineState::ConstraintsBuilt => "constraints-built",
            EngineState::ObjectiveSet => "objective-set",
            EngineState::Solved => "solved",
            EngineState::Infeasible => "infeasible",
        })
    }
}

/// Controlled access to a scheduler's ILP, handed to the resource engine.
///
/// Holds the three collaborating objects (model, graph view, solver) plus
/// a snapshot of the last solution. Re-solves through the handle update
/// the snapshot only; the owning scheduler picks the final state up on its
/// next [`Scheduler::solve`].
pub struct IlpHandle<'a> {
    pub model: &'a mut LpModel,
    pub view: &'a ScheduleView,
    pub solver: &'a dyn LpSolver,
    pub solution: Option<LpSolution>,
}

impl IlpHandle<'_> {
    /// Solves the current model and stores the result as the snapshot.
    pub fn solve(&mut self, name_hint: &str) -> &LpStatus {
        trace!(name = name_hint, lp = %self.model, "solving ILP");
        let solution = self.solver.solve(&*self.model);
        debug!(name = name_hint, status = %solution.status, "ILP solved");
        &self.solution.insert(solution).status
    }

    /// Whether the snapshot holds an assignment.
    pub fn is_solved(&self) -> bool {
        self.solution
            .as_ref()
            .is_some_and(|s| s.status.has_solution())
    }

    /// Cycle of a view node in the snapshot.
    pub fn cycle(&self, node: &str) -> Option<i64> {
        self.solution
            .as_ref()
            .filter(|s| s.status.has_solution())
            .and_then(|s| s.int_value(&sv(node)))
    }

    /// Value of an arbitrary variable in the snapshot.
    pub fn int_value(&self, var: &str) -> Option<i64> {
        self.solution
            .as_ref()
            .filter(|s| s.status.has_solution())
            .and_then(|s| s.int_value(var))
    }
}

/// ILP-based operation scheduler.
///
/// # Example
/// ```
/// use u_hls_schedule::models::{Cdfg, OpKind, SolveStatus};
/// use u_hls_schedule::scheduler::{Scheduler, Technique};
///
/// let mut g = Cdfg::new("k");
/// let bb = g.add_block("entry");
/// g.op("L1", OpKind::Load, bb).unwrap();
/// g.op("A1", OpKind::Add, bb).unwrap();
/// g.add_dependency("L1", "A1").unwrap();
/// g.insert_super_nodes().unwrap();
///
/// let mut s = Scheduler::new(Technique::Asap);
/// s.initialize(&g).unwrap();
/// s.build_ilp().unwrap();
/// assert_eq!(s.solve("k").unwrap(), SolveStatus::Optimal);
/// assert_eq!(s.schedule().unwrap().cycle("A1"), Some(2));
/// ```
#[derive(Debug)]
pub struct Scheduler {
    technique: Technique,
    solver: Box<dyn LpSolver>,
    restrict_to_same_block: bool,
    state: EngineState,
    view: Option<ScheduleView>,
    model: LpModel,
    dependencies_added: bool,
    ii_added: bool,
    solution: Option<LpSolution>,
    status: Option<SolveStatus>,
}

impl Scheduler {
    /// Creates an engine using the built-in branch-and-bound solver.
    pub fn new(technique: Technique) -> Self {
        Self {
            technique,
            solver: Box::new(BranchAndBoundSolver::new()),
            restrict_to_same_block: true,
            state: EngineState::Uninitialized,
            view: None,
            model: LpModel::default(),
            dependencies_added: false,
            ii_added: false,
            solution: None,
            status: None,
        }
    }

    /// Replaces the ILP backend.
    pub fn with_solver(mut self, solver: Box<dyn LpSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Whether [`build_ilp`](Self::build_ilp) drops cross-block forward edges
    /// between regular operations (default `true`).
    pub fn with_restrict_to_same_block(mut self, restrict: bool) -> Self {
        self.restrict_to_same_block = restrict;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Selected discipline.
    pub fn technique(&self) -> &Technique {
        &self.technique
    }

    /// The timing model built so far.
    pub fn model(&self) -> &LpModel {
        &self.model
    }

    /// The filtered graph view (after [`initialize`](Self::initialize)).
    pub fn view(&self) -> Option<&ScheduleView> {
        self.view.as_ref()
    }

    /// Raw solver result of the last solve.
    pub fn solution(&self) -> Option<&LpSolution> {
        self.solution.as_ref()
    }

    fn precondition(&self, operation: &'static str) -> ScheduleError {
        ScheduleError::Precondition {
            operation,
            state: self.state.to_string(),
        }
    }

    fn require_view(&self, operation: &'static str) -> Result<&ScheduleView> {
        self.view.as_ref().ok_or_else(|| self.precondition(operation))
    }

    /// Projects the graph and allocates one timing variable `sv<node>` per
    /// remaining node, bounded below by 0.
    ///
    /// The graph is validated first; structural defects are fatal.
    pub fn initialize(&mut self, graph: &Cdfg) -> Result<()> {
        if self.state != EngineState::Uninitialized {
            return Err(self.precondition("initialize"));
        }
        if let Err(errors) = validation::validate_cdfg(graph) {
            let msg = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ScheduleError::malformed(msg));
        }

        let view = ScheduleView::project(graph)?;
        let mut model = LpModel::new(format!("{}_{}", graph.name, self.technique.name()));
        for node in view.nodes() {
            model.add_variable(sv(&node.name), Some(0.0), None, VarKind::Integer)?;
        }
        info!(
            graph = %graph.name,
            technique = %self.technique,
            nodes = view.len(),
            forward_edges = view.forward_edges().len(),
            back_edges = view.back_edges().len(),
            stripped = ?view.stripped(),
            "scheduler initialized"
        );

        self.model = model;
        self.view = Some(view);
        self.state = EngineState::Initialized;
        Ok(())
    }

    /// Emits `sv(v) - sv(u) ≥ lat(u)` for every forward edge `(u, v)`.
    ///
    /// With `restrict_to_same_block`, edges between regular operations of
    /// different blocks are skipped; edges touching a supernode are always
    /// kept, so block ordering still flows through `ssink_a → ssrc_b`.
    ///
    /// Returns the number of constraints added.
    pub fn add_dependency_constraints(&mut self, restrict_to_same_block: bool) -> Result<usize> {
        if !matches!(
            self.state,
            EngineState::Initialized | EngineState::ConstraintsBuilt
        ) || self.dependencies_added
        {
            return Err(self.precondition("add_dependency_constraints"));
        }
        let view = self
            .view
            .as_ref()
            .ok_or_else(|| self.precondition("add_dependency_constraints"))?;

        let mut added = 0;
        let mut skipped = 0;
        for e in view.forward_edges() {
            let (u, v) = (view.node(e.source), view.node(e.target));
            let touches_super = u.kind.is_super_node() || v.kind.is_super_node();
            if restrict_to_same_block && !view.is_intra_block(e) && !touches_super {
                skipped += 1;
                continue;
            }
            self.model.add_constraint(
                [(sv(&v.name), 1.0), (sv(&u.name), -1.0)],
                Sense::Ge,
                u.latency,
            )?;
            added += 1;
        }
        debug!(added, skipped, "dependency constraints");

        self.dependencies_added = true;
        self.state = EngineState::ConstraintsBuilt;
        Ok(added)
    }

    /// Pins a shared `II` variable to `ii` and emits
    /// `sv(v) - sv(u) + II ≥ lat(u)` for every back-edge `(u, v)`.
    ///
    /// Only valid for a pipelined technique; the technique's II target must
    /// be `Fixed`, and `ii` overrides its value.
    pub fn add_ii_constraint(&mut self, ii: i64) -> Result<usize> {
        match self.technique {
            Technique::Pipelined {
                ii: IiTarget::Fixed(_),
            } => {
                self.technique = Technique::pipelined(ii);
            }
            _ => return Err(self.precondition("add_ii_constraint")),
        }
        self.contribute_ii("add_ii_constraint")
    }

    /// Per-block variant: one `II_<block>` per loop-bearing block, all
    /// bounded by `max_II`.
    pub fn add_per_block_ii_constraints(&mut self) -> Result<usize> {
        if !matches!(
            self.technique,
            Technique::Pipelined {
                ii: IiTarget::PerBlock
            }
        ) {
            return Err(self.precondition("add_per_block_ii_constraints"));
        }
        self.contribute_ii("add_per_block_ii_constraints")
    }

    fn contribute_ii(&mut self, operation: &'static str) -> Result<usize> {
        if !matches!(
            self.state,
            EngineState::Initialized | EngineState::ConstraintsBuilt
        ) || self.ii_added
        {
            return Err(self.precondition(operation));
        }
        let view = self.view.as_ref().ok_or_else(|| ScheduleError::Precondition {
            operation,
            state: EngineState::Uninitialized.to_string(),
        })?;
        let added = self.technique.contribute_ii(&mut self.model, view)?;
        debug!(added, technique = ?self.technique, "II constraints");
        self.ii_added = true;
        self.state = EngineState::ConstraintsBuilt;
        Ok(added)
    }

    /// Emits the discipline's objective (and its auxiliary constraints).
    pub fn set_objective(&mut self) -> Result<()> {
        if self.state != EngineState::ConstraintsBuilt {
            return Err(self.precondition("set_objective"));
        }
        if self.technique.is_pipelined() && !self.ii_added {
            return Err(self.precondition("set_objective"));
        }
        let view = self
            .view
            .as_ref()
            .ok_or_else(|| self.precondition("set_objective"))?;
        self.technique.contribute_objective(&mut self.model, view)?;
        self.state = EngineState::ObjectiveSet;
        Ok(())
    }

    /// Builds the complete model for the selected technique: dependencies,
    /// II constraints when pipelined, objective.
    pub fn build_ilp(&mut self) -> Result<()> {
        self.add_dependency_constraints(self.restrict_to_same_block)?;
        match self.technique {
            Technique::Pipelined {
                ii: IiTarget::Fixed(ii),
            } => {
                self.add_ii_constraint(ii)?;
            }
            Technique::Pipelined {
                ii: IiTarget::PerBlock,
            } => {
                self.add_per_block_ii_constraints()?;
            }
            _ => {}
        }
        self.set_objective()
    }

    /// Solves the current model.
    ///
    /// Infeasibility and solver failures are statuses, not errors.
    pub fn solve(&mut self, name_hint: &str) -> Result<SolveStatus> {
        if !matches!(
            self.state,
            EngineState::ObjectiveSet | EngineState::Solved | EngineState::Infeasible
        ) {
            return Err(self.precondition("solve"));
        }
        trace!(name = name_hint, lp = %self.model, "solving ILP");
        let solution = self.solver.solve(&self.model);

        let status = match &solution.status {
            LpStatus::Optimal => SolveStatus::Optimal,
            LpStatus::Feasible => SolveStatus::Feasible,
            LpStatus::Infeasible => SolveStatus::Infeasible,
            LpStatus::Unbounded => SolveStatus::Failed("unbounded".into()),
            LpStatus::Error(msg) => SolveStatus::Failed(msg.clone()),
        };
        match &status {
            SolveStatus::Optimal | SolveStatus::Feasible => {
                self.state = EngineState::Solved;
                info!(
                    name = name_hint,
                    solver = self.solver.name(),
                    %status,
                    objective = ?solution.objective,
                    nodes = solution.nodes_explored,
                    "schedule found"
                );
            }
            SolveStatus::Infeasible => {
                self.state = EngineState::Infeasible;
                info!(name = name_hint, "scheduling ILP infeasible");
            }
            SolveStatus::Failed(reason) => {
                self.state = EngineState::ObjectiveSet;
                warn!(name = name_hint, %reason, "solver failed");
            }
        }
        self.solution = Some(solution);
        self.status = Some(status.clone());
        Ok(status)
    }

    /// Hands the model, view and solver to a collaborator (the resource
    /// engine). The engine returns to `ObjectiveSet` since the model may
    /// change; solve again afterwards.
    pub fn pass_scheduling_ilp(&mut self) -> Result<IlpHandle<'_>> {
        if !matches!(
            self.state,
            EngineState::ConstraintsBuilt
                | EngineState::ObjectiveSet
                | EngineState::Solved
                | EngineState::Infeasible
        ) {
            return Err(self.precondition("pass_scheduling_ilp"));
        }
        if self.state != EngineState::ConstraintsBuilt {
            self.state = EngineState::ObjectiveSet;
        }
        let view = self.view.as_ref().ok_or(ScheduleError::Precondition {
            operation: "pass_scheduling_ilp",
            state: EngineState::Uninitialized.to_string(),
        })?;
        Ok(IlpHandle {
            model: &mut self.model,
            view,
            solver: self.solver.as_ref(),
            solution: self.solution.clone(),
        })
    }

    fn solved(&self, operation: &'static str) -> Result<&LpSolution> {
        match (&self.state, &self.solution) {
            (EngineState::Solved, Some(s)) => Ok(s),
            _ => Err(self.precondition(operation)),
        }
    }

    /// Achieved initiation interval (`II`, or `max_II` for the per-block variant).
    pub fn achieved_ii(&self) -> Option<i64> {
        let s = self.solution.as_ref()?;
        if self.state != EngineState::Solved {
            return None;
        }
        s.int_value(II_VAR).or_else(|| s.int_value(MAX_II_VAR))
    }

    /// Cycle of every supersink, by name. Used as the ALAP horizon.
    pub fn sink_delays(&self) -> Result<BTreeMap<String, i64>> {
        let solution = self.solved("sink_delays")?;
        let view = self.require_view("sink_delays")?;
        view.sinks()
            .into_iter()
            .map(|i| {
                let name = &view.node(i).name;
                solution
                    .int_value(&sv(name))
                    .map(|c| (name.clone(), c))
                    .ok_or_else(|| ScheduleError::UnknownNode(name.clone()))
            })
            .collect()
    }

    /// The result artifact of the last solve.
    pub fn schedule(&self) -> Result<Schedule> {
        let Some(status) = self.status.clone() else {
            return Err(self.precondition("schedule"));
        };
        let mut schedule = Schedule::new(status);
        if self.state != EngineState::Solved {
            return Ok(schedule);
        }
        let solution = self.solved("schedule")?;
        let view = self.require_view("schedule")?;
        for node in view.nodes() {
            if let Some(c) = solution.int_value(&sv(&node.name)) {
                schedule.cycles.insert(node.name.clone(), c);
            }
        }
        schedule.ii = self.achieved_ii();
        schedule.objective = solution.objective;
        Ok(schedule)
    }

    /// Copies the last schedule onto the graph's `cycle` attributes.
    pub fn apply_to(&self, graph: &mut Cdfg) -> Result<()> {
        let schedule = self.schedule()?;
        graph.apply_schedule(&schedule);
        Ok(())
    }
}

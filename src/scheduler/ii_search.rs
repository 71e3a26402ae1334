//! Initiation-interval search for pipelined loops.
//!
//! Tries `II = 1, 2, ...` with a fresh engine per candidate and stops at
//! the first interval whose model is feasible (and, with resource limits,
//! whose MRT can be made legal). Infeasible candidates are not errors;
//! running past `max_ii` is.

use tracing::{debug, info, warn};

use super::engine::Scheduler;
use super::technique::Technique;
use crate::error::{Result, ScheduleError};
use crate::lp::{BranchAndBoundSolver, SolverConfig};
use crate::models::{Cdfg, ResourceLimits, SolveStatus};
use crate::resource::{EnforcementBudget, ResourceManager};

/// Result of one II candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Scheduled,
    /// The timing model has no solution at this II.
    Infeasible,
    /// The solver gave up (node limit, numerical trouble).
    SolverFailed(String),
    /// Timing was feasible but no legal MRT was found.
    ResourcesRejected(String),
}

/// One II candidate and what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct IiAttempt {
    pub ii: i64,
    pub outcome: AttemptOutcome,
}

/// A successful search.
#[derive(Debug)]
pub struct IiSearchResult {
    /// First feasible initiation interval.
    pub ii: i64,
    /// The engine that produced it, in the `Solved` state.
    pub scheduler: Scheduler,
    /// Every candidate tried, in order.
    pub attempts: Vec<IiAttempt>,
}

/// Linear II search driver.
///
/// # Example
/// ```
/// use u_hls_schedule::models::{Cdfg, OpKind};
/// use u_hls_schedule::scheduler::IiSearch;
///
/// let mut g = Cdfg::new("acc");
/// let bb = g.add_block("for.body");
/// g.op("i", OpKind::Phi, bb).unwrap();
/// g.op("i.next", OpKind::Add, bb).unwrap();
/// g.add_dependency("i", "i.next").unwrap();
/// g.add_back_edge("i.next", "i").unwrap();
/// g.insert_super_nodes().unwrap();
///
/// let found = IiSearch::new(8).run(&g).unwrap();
/// assert_eq!(found.ii, 1);
/// ```
#[derive(Debug, Clone)]
pub struct IiSearch {
    max_ii: i64,
    resources: Option<ResourceLimits>,
    budget: EnforcementBudget,
    restrict_to_same_block: bool,
    solver_config: SolverConfig,
}

impl Default for IiSearch {
    fn default() -> Self {
        Self::new(40)
    }
}

impl IiSearch {
    /// Searches `1..=max_ii`.
    pub fn new(max_ii: i64) -> Self {
        Self {
            max_ii,
            resources: None,
            budget: EnforcementBudget::default(),
            restrict_to_same_block: true,
            solver_config: SolverConfig::default(),
        }
    }

    /// Enforces resource limits through the MRT at every candidate.
    pub fn with_resources(mut self, limits: ResourceLimits) -> Self {
        self.resources = Some(limits);
        self
    }

    /// Sets the enforcement budget used per candidate.
    pub fn with_budget(mut self, budget: EnforcementBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_restrict_to_same_block(mut self, restrict: bool) -> Self {
        self.restrict_to_same_block = restrict;
        self
    }

    pub fn with_solver_config(mut self, config: SolverConfig) -> Self {
        self.solver_config = config;
        self
    }

    /// Upper end of the search range.
    pub fn max_ii(&self) -> i64 {
        self.max_ii
    }

    fn engine(&self, ii: i64) -> Scheduler {
        Scheduler::new(Technique::pipelined(ii))
            .with_solver(Box::new(
                BranchAndBoundSolver::new().with_config(self.solver_config.clone()),
            ))
            .with_restrict_to_same_block(self.restrict_to_same_block)
    }

    /// Runs the search.
    ///
    /// Structural errors in the graph abort immediately; exhausting the
    /// range yields [`ScheduleError::IiBudgetExhausted`].
    pub fn run(&self, graph: &Cdfg) -> Result<IiSearchResult> {
        if self.max_ii < 1 {
            return Err(ScheduleError::config(format!(
                "max_ii must be at least 1, got {}",
                self.max_ii
            )));
        }
        let manager = self.resources.clone().map(ResourceManager::new);
        let mut attempts = Vec::new();

        for ii in 1..=self.max_ii {
            let mut scheduler = self.engine(ii);
            scheduler.initialize(graph)?;
            scheduler.build_ilp()?;
            let name = format!("{}_ii{ii}", graph.name);

            let outcome = match scheduler.solve(&name)? {
                SolveStatus::Infeasible => AttemptOutcome::Infeasible,
                SolveStatus::Failed(reason) => {
                    warn!(ii, %reason, "solver failed, trying next II");
                    AttemptOutcome::SolverFailed(reason)
                }
                SolveStatus::Optimal | SolveStatus::Feasible => match &manager {
                    None => AttemptOutcome::Scheduled,
                    Some(manager) => self.enforce(&mut scheduler, manager, graph, ii, &name)?,
                },
            };
            debug!(ii, outcome = ?outcome, "II attempt");
            let scheduled = outcome == AttemptOutcome::Scheduled;
            attempts.push(IiAttempt { ii, outcome });

            if scheduled {
                info!(graph = %graph.name, ii, attempts = attempts.len(), "II search succeeded");
                return Ok(IiSearchResult {
                    ii,
                    scheduler,
                    attempts,
                });
            }
        }

        warn!(graph = %graph.name, max_ii = self.max_ii, "II search exhausted");
        Err(ScheduleError::IiBudgetExhausted {
            max_ii: self.max_ii,
        })
    }

    fn enforce(
        &self,
        scheduler: &mut Scheduler,
        manager: &ResourceManager,
        graph: &Cdfg,
        ii: i64,
        name: &str,
    ) -> Result<AttemptOutcome> {
        let enforced = {
            let mut handle = scheduler.pass_scheduling_ilp()?;
            manager.add_resource_constraints_pipelined(&mut handle, ii, &self.budget)
        };
        match enforced {
            Ok(_) => {}
            Err(ScheduleError::Enforcement(failure)) => {
                return Ok(AttemptOutcome::ResourcesRejected(failure.to_string()));
            }
            Err(err) => return Err(err),
        }

        match scheduler.solve(name)? {
            SolveStatus::Optimal | SolveStatus::Feasible => {}
            SolveStatus::Infeasible => return Ok(AttemptOutcome::Infeasible),
            SolveStatus::Failed(reason) => return Ok(AttemptOutcome::SolverFailed(reason)),
        }
        let schedule = scheduler.schedule()?;
        let violations = manager.check_resource_constraints_pipelined(graph, &schedule, ii);
        if let Some(first) = violations.first() {
            return Ok(AttemptOutcome::ResourcesRejected(first.message.clone()));
        }
        Ok(AttemptOutcome::Scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpKind, Operation};

    /// Recurrence i → v (load, latency 2) → s → i forces II ≥ 3.
    fn make_recurrence() -> Cdfg {
        let mut g = Cdfg::new("rec");
        let bb = g.add_block("for.body");
        g.op("i", OpKind::Phi, bb).unwrap();
        g.add_operation(Operation::new("v", OpKind::Load, bb).with_latency(2.0))
            .unwrap();
        g.op("s", OpKind::Add, bb).unwrap();
        g.add_dependency("i", "v").unwrap();
        g.add_dependency("v", "s").unwrap();
        g.add_back_edge("s", "i").unwrap();
        g.insert_super_nodes().unwrap();
        g
    }

    /// Three independent loads summed into an accumulator.
    fn make_load_loop() -> Cdfg {
        let mut g = Cdfg::new("loads");
        let bb = g.add_block("for.body");
        g.op("acc", OpKind::Phi, bb).unwrap();
        for l in ["l1", "l2", "l3"] {
            g.op(l, OpKind::Load, bb).unwrap();
        }
        g.op("s1", OpKind::Add, bb).unwrap();
        g.op("s2", OpKind::Add, bb).unwrap();
        g.op("acc.next", OpKind::Add, bb).unwrap();
        g.add_dependency("l1", "s1").unwrap();
        g.add_dependency("l2", "s1").unwrap();
        g.add_dependency("s1", "s2").unwrap();
        g.add_dependency("l3", "s2").unwrap();
        g.add_dependency("s2", "acc.next").unwrap();
        g.add_dependency("acc", "acc.next").unwrap();
        g.add_back_edge("acc.next", "acc").unwrap();
        g.insert_super_nodes().unwrap();
        g
    }

    #[test]
    fn test_finds_recurrence_bound() {
        let found = IiSearch::new(10).run(&make_recurrence()).unwrap();
        assert_eq!(found.ii, 3);
        assert_eq!(found.attempts.len(), 3);
        assert_eq!(found.attempts[0].outcome, AttemptOutcome::Infeasible);
        assert_eq!(found.attempts[1].outcome, AttemptOutcome::Infeasible);
        assert_eq!(found.attempts[2].outcome, AttemptOutcome::Scheduled);
        assert_eq!(found.scheduler.achieved_ii(), Some(3));
    }

    #[test]
    fn test_budget_exhausted() {
        let err = IiSearch::new(2).run(&make_recurrence()).unwrap_err();
        assert!(matches!(err, ScheduleError::IiBudgetExhausted { max_ii: 2 }));
    }

    #[test]
    fn test_invalid_range() {
        let err = IiSearch::new(0).run(&make_recurrence()).unwrap_err();
        assert!(matches!(err, ScheduleError::Config(_)));
    }

    #[test]
    fn test_resources_raise_ii() {
        let g = make_load_loop();

        let unconstrained = IiSearch::new(8).run(&g).unwrap();
        assert_eq!(unconstrained.ii, 1);

        let found = IiSearch::new(8)
            .with_resources(ResourceLimits::new().with("load", 1))
            .with_budget(EnforcementBudget::default().with_max_latency(20))
            .run(&g)
            .unwrap();
        assert_eq!(found.ii, 3);
        assert!(matches!(
            found.attempts[0].outcome,
            AttemptOutcome::ResourcesRejected(_)
        ));

        let schedule = found.scheduler.schedule().unwrap();
        let manager = ResourceManager::new(ResourceLimits::new().with("load", 1));
        assert!(manager
            .check_resource_constraints_pipelined(&g, &schedule, 3)
            .is_empty());
    }

    #[test]
    fn test_malformed_graph_aborts() {
        let mut g = Cdfg::new("bad");
        let a = g.add_block("a");
        let b = g.add_block("b");
        g.op("x", OpKind::Phi, a).unwrap();
        g.op("y", OpKind::Add, b).unwrap();
        g.add_dependency("x", "y").unwrap();
        g.add_back_edge("y", "x").unwrap();
        g.insert_super_nodes().unwrap();
        let err = IiSearch::new(4).run(&g).unwrap_err();
        assert!(matches!(err, ScheduleError::MalformedGraph(_)));
    }
}

//! Depth-first branch and bound over simplex relaxations.
//!
//! Branches on the lowest-index fractional integer variable, exploring the
//! floor side first. When every objective coefficient sits on an integer
//! variable and is itself integral, the objective of any integral point is
//! an integer, so nodes whose bound cannot beat the incumbent by a whole
//! unit are pruned.
//!
//! # Reference
//! - Land & Doig (1960), "An automatic method of solving discrete programming problems"

use std::collections::HashMap;
use tracing::{debug, trace};

use super::model::{LpModel, ObjectiveSense};
use super::simplex::{solve_relaxation, Relaxation};
use super::solver::{LpSolution, LpSolver, LpStatus, SolverConfig};

/// Built-in MILP solver.
#[derive(Debug, Clone, Default)]
pub struct BranchAndBoundSolver {
    config: SolverConfig,
}

struct Incumbent {
    values: Vec<f64>,
    /// In minimise form.
    bound: f64,
}

impl BranchAndBoundSolver {
    /// Creates a solver with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the search limits.
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Current limits.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn integral_objective(model: &LpModel) -> bool {
        model.objective().terms.iter().all(|&(v, c)| {
            model.variable(v).is_integral() && (c - c.round()).abs() < 1e-12
        })
    }
}

impl LpSolver for BranchAndBoundSolver {
    fn name(&self) -> &str {
        "branch-and-bound"
    }

    fn solve(&self, model: &LpModel) -> LpSolution {
        let tol = self.config.tolerance;
        let flip = match model.objective().sense {
            ObjectiveSense::Minimize => 1.0,
            ObjectiveSense::Maximize => -1.0,
        };
        let integral = Self::integral_objective(model);
        let integer_vars: Vec<usize> = model
            .variables()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_integral())
            .map(|(i, _)| i)
            .collect();

        let (lower, upper): (Vec<f64>, Vec<f64>) = model
            .variables()
            .iter()
            .map(|v| {
                let l = v.lower.unwrap_or(f64::NEG_INFINITY);
                let u = v.upper.unwrap_or(f64::INFINITY);
                if v.is_integral() {
                    ((l - tol).ceil(), (u + tol).floor())
                } else {
                    (l, u)
                }
            })
            .collect();

        let mut stack = vec![(lower, upper)];
        let mut incumbent: Option<Incumbent> = None;
        let mut nodes = 0usize;
        let mut truncated = false;

        while let Some((lo, up)) = stack.pop() {
            if nodes >= self.config.max_nodes {
                truncated = true;
                break;
            }
            nodes += 1;

            let (values, objective) = match solve_relaxation(model, &lo, &up) {
                Relaxation::Optimal { values, objective } => (values, objective),
                Relaxation::Infeasible => continue,
                Relaxation::Unbounded => {
                    if nodes == 1 {
                        return LpSolution {
                            nodes_explored: nodes,
                            ..LpSolution::without_values(LpStatus::Unbounded)
                        };
                    }
                    continue;
                }
                Relaxation::Stalled => {
                    return LpSolution {
                        nodes_explored: nodes,
                        ..LpSolution::without_values(LpStatus::Error(
                            "simplex pivot limit reached".into(),
                        ))
                    };
                }
            };

            let bound = flip * objective;
            if let Some(inc) = &incumbent {
                let margin = if integral { 1.0 - tol } else { tol };
                if bound > inc.bound - margin {
                    continue;
                }
            }

            let fractional = integer_vars
                .iter()
                .copied()
                .find(|&j| (values[j] - values[j].round()).abs() > tol);

            match fractional {
                None => {
                    trace!(node = nodes, objective, "new incumbent");
                    incumbent = Some(Incumbent { values, bound });
                }
                Some(j) => {
                    let floor = values[j].floor();
                    let mut up_lo = lo.clone();
                    up_lo[j] = floor + 1.0;
                    let mut down_up = up.clone();
                    down_up[j] = floor;
                    // Pushed last, popped first.
                    stack.push((up_lo, up));
                    stack.push((lo, down_up));
                }
            }
        }

        debug!(
            model = %model.name,
            nodes,
            truncated,
            found = incumbent.is_some(),
            "branch and bound finished"
        );

        match incumbent {
            Some(inc) => {
                let values: Vec<f64> = inc
                    .values
                    .iter()
                    .zip(model.variables())
                    .map(|(&x, v)| if v.is_integral() { x.round() } else { x })
                    .collect();
                let objective = model.objective().value(&values);
                let named: HashMap<String, f64> = model
                    .variables()
                    .iter()
                    .zip(&values)
                    .map(|(v, &x)| (v.name.clone(), x))
                    .collect();
                LpSolution {
                    status: if truncated {
                        LpStatus::Feasible
                    } else {
                        LpStatus::Optimal
                    },
                    values: named,
                    objective: Some(objective),
                    nodes_explored: nodes,
                }
            }
            None if truncated => LpSolution {
                nodes_explored: nodes,
                ..LpSolution::without_values(LpStatus::Error(format!(
                    "node limit {} reached without an integral solution",
                    self.config.max_nodes
                )))
            },
            None => LpSolution {
                nodes_explored: nodes,
                ..LpSolution::without_values(LpStatus::Infeasible)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{Sense, VarKind};

    #[test]
    fn test_integer_knapsack() {
        // max 5x + 4y  s.t. 6x + 4y <= 24, x + 2y <= 6  → LP (3, 1.5), MILP (4, 0)
        let mut m = LpModel::new("knap");
        m.add_variable("x", Some(0.0), None, VarKind::Integer).unwrap();
        m.add_variable("y", Some(0.0), None, VarKind::Integer).unwrap();
        m.add_constraint([("x", 6.0), ("y", 4.0)], Sense::Le, 24.0)
            .unwrap();
        m.add_constraint([("x", 1.0), ("y", 2.0)], Sense::Le, 6.0)
            .unwrap();
        m.set_objective([("x", 5.0), ("y", 4.0)], ObjectiveSense::Maximize)
            .unwrap();

        let sol = BranchAndBoundSolver::new().solve(&m);
        assert_eq!(sol.status, LpStatus::Optimal);
        assert_eq!(sol.objective, Some(20.0));
        assert_eq!(sol.int_value("x"), Some(4));
        assert_eq!(sol.int_value("y"), Some(0));
    }

    #[test]
    fn test_parity_requires_branching() {
        // 2x = 2y + 1 has no integral solution.
        let mut m = LpModel::new("parity");
        m.add_variable("x", Some(0.0), Some(5.0), VarKind::Integer)
            .unwrap();
        m.add_variable("y", Some(0.0), Some(5.0), VarKind::Integer)
            .unwrap();
        m.add_constraint([("x", 2.0), ("y", -2.0)], Sense::Eq, 1.0)
            .unwrap();
        let sol = BranchAndBoundSolver::new().solve(&m);
        assert_eq!(sol.status, LpStatus::Infeasible);
        assert!(sol.values.is_empty());
    }

    #[test]
    fn test_binary_assignment() {
        // Two binaries, at most one may be set, maximise a + 2b.
        let mut m = LpModel::new("bin");
        m.add_variable("a", None, None, VarKind::Binary).unwrap();
        m.add_variable("b", None, None, VarKind::Binary).unwrap();
        m.add_constraint([("a", 1.0), ("b", 1.0)], Sense::Le, 1.0)
            .unwrap();
        m.set_objective([("a", 1.0), ("b", 2.0)], ObjectiveSense::Maximize)
            .unwrap();
        let sol = BranchAndBoundSolver::new().solve(&m);
        assert_eq!(sol.int_value("a"), Some(0));
        assert_eq!(sol.int_value("b"), Some(1));
    }

    #[test]
    fn test_unbounded_root() {
        let mut m = LpModel::new("open");
        m.add_variable("x", Some(0.0), None, VarKind::Integer).unwrap();
        m.set_objective([("x", -1.0)], ObjectiveSense::Minimize)
            .unwrap();
        let sol = BranchAndBoundSolver::new().solve(&m);
        assert_eq!(sol.status, LpStatus::Unbounded);
    }

    #[test]
    fn test_node_limit_without_incumbent_is_error() {
        let mut m = LpModel::new("parity");
        m.add_variable("x", Some(0.0), Some(50.0), VarKind::Integer)
            .unwrap();
        m.add_variable("y", Some(0.0), Some(50.0), VarKind::Integer)
            .unwrap();
        m.add_constraint([("x", 2.0), ("y", -2.0)], Sense::Eq, 1.0)
            .unwrap();
        let solver =
            BranchAndBoundSolver::new().with_config(SolverConfig::default().with_max_nodes(1));
        let sol = solver.solve(&m);
        assert!(matches!(sol.status, LpStatus::Error(_)));
        assert_eq!(sol.nodes_explored, 1);
    }

    #[test]
    fn test_empty_model_is_optimal() {
        let m = LpModel::new("empty");
        let sol = BranchAndBoundSolver::new().solve(&m);
        assert_eq!(sol.status, LpStatus::Optimal);
        assert_eq!(sol.objective, Some(0.0));
    }
}

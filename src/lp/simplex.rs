//! Dense two-phase primal simplex for LP relaxations.
//!
//! Variable bounds are folded into the tableau: a variable with a finite
//! lower bound `l` becomes `l + y`, one with only an upper bound `u` becomes
//! `u - y`, and a free variable becomes `y⁺ - y⁻`, all with `y ≥ 0`. Finite
//! upper bounds on shifted variables become explicit `≤` rows.
//!
//! Entering and leaving variables follow Bland's rule, which rules out
//! cycling on degenerate pivots (scheduling models are heavily degenerate).
//!
//! # Reference
//! - Dantzig, Orden & Wolfe (1955), "The generalized simplex method"
//! - Bland (1977), "New finite pivoting rules for the simplex method"

use super::model::{LpModel, ObjectiveSense, Sense};

/// Pivot-element tolerance.
const EPS: f64 = 1e-9;
/// Phase-1 residual above which the problem is infeasible.
const FEAS_TOL: f64 = 1e-7;
/// Hard cap on pivots per phase.
const MAX_PIVOTS: usize = 200_000;

/// Result of solving one relaxation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Relaxation {
    /// Optimal assignment in model-variable order, and its objective value.
    Optimal { values: Vec<f64>, objective: f64 },
    Infeasible,
    Unbounded,
    /// Pivot cap reached.
    Stalled,
}

/// How one model variable maps onto tableau columns.
struct Mapping {
    offset: f64,
    columns: Vec<(usize, f64)>,
}

struct Row {
    coeffs: Vec<(usize, f64)>,
    sense: Sense,
    rhs: f64,
}

struct Tableau {
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    width: usize,
}

impl Tableau {
    fn rhs(&self, row: usize) -> f64 {
        self.rows[row][self.width]
    }

    fn pivot(&mut self, r: usize, c: usize, reduced: &mut [f64]) {
        let p = self.rows[r][c];
        for v in self.rows[r].iter_mut() {
            *v /= p;
        }
        let pivot_row = self.rows[r].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i == r {
                continue;
            }
            let f = row[c];
            if f.abs() <= f64::EPSILON {
                continue;
            }
            for (v, &pv) in row.iter_mut().zip(&pivot_row) {
                *v -= f * pv;
                if v.abs() < 1e-12 {
                    *v = 0.0;
                }
            }
            row[c] = 0.0;
        }
        let f = reduced[c];
        if f != 0.0 {
            for (v, &pv) in reduced.iter_mut().zip(&pivot_row) {
                *v -= f * pv;
            }
            reduced[c] = 0.0;
        }
        self.basis[r] = c;
    }

    /// Reduced-cost row (`c_j - c_B·B⁻¹A_j`) for a cost vector.
    fn reduced_costs(&self, cost: &[f64]) -> Vec<f64> {
        let mut reduced: Vec<f64> = cost.to_vec();
        reduced.push(0.0);
        for (i, row) in self.rows.iter().enumerate() {
            let cb = cost[self.basis[i]];
            if cb == 0.0 {
                continue;
            }
            for (v, &a) in reduced.iter_mut().zip(row) {
                *v -= cb * a;
            }
        }
        reduced
    }

    /// Runs primal simplex over the allowed columns.
    ///
    /// Returns `Ok(true)` at optimality, `Ok(false)` when unbounded.
    fn optimize(&mut self, cost: &[f64], allowed: &[bool]) -> Result<bool, ()> {
        let mut reduced = self.reduced_costs(cost);
        for _ in 0..MAX_PIVOTS {
            let Some(enter) = (0..self.width).find(|&j| allowed[j] && reduced[j] < -EPS) else {
                return Ok(true);
            };
            let mut leave: Option<(usize, f64)> = None;
            for i in 0..self.rows.len() {
                let a = self.rows[i][enter];
                if a <= EPS {
                    continue;
                }
                let ratio = self.rhs(i) / a;
                leave = match leave {
                    None => Some((i, ratio)),
                    Some((best, br)) => {
                        if ratio < br - EPS
                            || (ratio <= br + EPS && self.basis[i] < self.basis[best])
                        {
                            Some((i, ratio))
                        } else {
                            Some((best, br))
                        }
                    }
                };
            }
            let Some((r, _)) = leave else {
                return Ok(false);
            };
            self.pivot(r, enter, &mut reduced);
        }
        Err(())
    }
}

/// Solves the LP relaxation of `model` under per-variable bounds.
///
/// `lower`/`upper` override the model's own bounds (B&B tightens them);
/// infinite values mean unbounded. Integrality is ignored.
pub(crate) fn solve_relaxation(model: &LpModel, lower: &[f64], upper: &[f64]) -> Relaxation {
    let n = model.num_variables();
    let mut mappings = Vec::with_capacity(n);
    let mut rows: Vec<Row> = Vec::new();
    let mut ncols = 0usize;

    for j in 0..n {
        let (l, u) = (lower[j], upper[j]);
        if l > u + EPS {
            return Relaxation::Infeasible;
        }
        let mapping = if l.is_finite() {
            let col = ncols;
            ncols += 1;
            if u.is_finite() {
                rows.push(Row {
                    coeffs: vec![(col, 1.0)],
                    sense: Sense::Le,
                    rhs: (u - l).max(0.0),
                });
            }
            Mapping {
                offset: l,
                columns: vec![(col, 1.0)],
            }
        } else if u.is_finite() {
            let col = ncols;
            ncols += 1;
            Mapping {
                offset: u,
                columns: vec![(col, -1.0)],
            }
        } else {
            let col = ncols;
            ncols += 2;
            Mapping {
                offset: 0.0,
                columns: vec![(col, 1.0), (col + 1, -1.0)],
            }
        };
        mappings.push(mapping);
    }

    for (_, c) in model.constraints() {
        let mut coeffs: Vec<(usize, f64)> = Vec::new();
        let mut rhs = c.rhs;
        for &(v, a) in &c.terms {
            let m = &mappings[v.0];
            rhs -= a * m.offset;
            for &(col, sign) in &m.columns {
                coeffs.push((col, a * sign));
            }
        }
        rows.push(Row {
            coeffs,
            sense: c.sense,
            rhs,
        });
    }

    // Normalise to rhs >= 0.
    for row in rows.iter_mut() {
        if row.rhs < 0.0 {
            row.rhs = -row.rhs;
            for (_, a) in row.coeffs.iter_mut() {
                *a = -*a;
            }
            row.sense = match row.sense {
                Sense::Le => Sense::Ge,
                Sense::Ge => Sense::Le,
                Sense::Eq => Sense::Eq,
            };
        }
    }

    let slack_count = rows.iter().filter(|r| r.sense != Sense::Eq).count();
    let artificial_count = rows.iter().filter(|r| r.sense != Sense::Le).count();
    let first_slack = ncols;
    let first_artificial = ncols + slack_count;
    let width = first_artificial + artificial_count;

    let mut tableau = Tableau {
        rows: Vec::with_capacity(rows.len()),
        basis: Vec::with_capacity(rows.len()),
        width,
    };
    let (mut next_slack, mut next_art) = (first_slack, first_artificial);
    for row in &rows {
        let mut dense = vec![0.0; width + 1];
        for &(col, a) in &row.coeffs {
            dense[col] += a;
        }
        dense[width] = row.rhs;
        match row.sense {
            Sense::Le => {
                dense[next_slack] = 1.0;
                tableau.basis.push(next_slack);
                next_slack += 1;
            }
            Sense::Ge => {
                dense[next_slack] = -1.0;
                next_slack += 1;
                dense[next_art] = 1.0;
                tableau.basis.push(next_art);
                next_art += 1;
            }
            Sense::Eq => {
                dense[next_art] = 1.0;
                tableau.basis.push(next_art);
                next_art += 1;
            }
        }
        tableau.rows.push(dense);
    }

    // Phase 1: minimise the sum of artificials.
    if artificial_count > 0 {
        let mut cost = vec![0.0; width];
        for c in cost.iter_mut().skip(first_artificial) {
            *c = 1.0;
        }
        let allowed = vec![true; width];
        match tableau.optimize(&cost, &allowed) {
            Ok(_) => {}
            Err(()) => return Relaxation::Stalled,
        }
        let residual: f64 = (0..tableau.rows.len())
            .filter(|&i| tableau.basis[i] >= first_artificial)
            .map(|i| tableau.rhs(i))
            .sum();
        if residual > FEAS_TOL {
            return Relaxation::Infeasible;
        }
        // Drive remaining (zero-valued) artificials out of the basis.
        let mut scratch = vec![0.0; width + 1];
        for i in 0..tableau.rows.len() {
            if tableau.basis[i] < first_artificial {
                continue;
            }
            if let Some(j) = (0..first_artificial).find(|&j| tableau.rows[i][j].abs() > EPS) {
                tableau.pivot(i, j, &mut scratch);
            }
        }
    }

    // Phase 2 over the original objective, expressed in minimise form.
    let objective = model.objective();
    let flip = match objective.sense {
        ObjectiveSense::Minimize => 1.0,
        ObjectiveSense::Maximize => -1.0,
    };
    let mut cost = vec![0.0; width];
    for &(v, c) in &objective.terms {
        for &(col, sign) in &mappings[v.0].columns {
            cost[col] += flip * c * sign;
        }
    }
    let allowed: Vec<bool> = (0..width).map(|j| j < first_artificial).collect();
    match tableau.optimize(&cost, &allowed) {
        Ok(true) => {}
        Ok(false) => return Relaxation::Unbounded,
        Err(()) => return Relaxation::Stalled,
    }

    let mut column_values = vec![0.0; width];
    for (i, &b) in tableau.basis.iter().enumerate() {
        column_values[b] = tableau.rhs(i);
    }
    let values: Vec<f64> = mappings
        .iter()
        .map(|m| {
            m.offset
                + m.columns
                    .iter()
                    .map(|&(col, sign)| sign * column_values[col])
                    .sum::<f64>()
        })
        .collect();
    let objective = objective.value(&values);
    Relaxation::Optimal { values, objective }
}

//! Linear-program model: variables, constraints, objective.
//!
//! Pure bookkeeping. Solving is delegated to an [`LpSolver`](super::LpSolver).
//! Variables and constraints are addressed by name at the API surface and
//! stored by dense index internally. Constraint ids are never reused, so a
//! removed id stays invalid.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// LP bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LpError {
    #[error("variable '{0}' already exists")]
    DuplicateVariable(String),

    #[error("variable '{0}' does not exist")]
    UnknownVariable(String),

    #[error("constraint {0} does not exist")]
    UnknownConstraint(ConstraintId),

    #[error("variable '{name}' has empty bounds [{lower}, {upper}]")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    #[error("non-finite coefficient {value} for '{name}'")]
    NonFinite { name: String, value: f64 },
}

/// Dense variable index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub usize);

/// Constraint handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstraintId(pub usize);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Variable domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Continuous,
    Integer,
    Binary,
}

/// A decision variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// Lower bound; `None` = unbounded below.
    pub lower: Option<f64>,
    /// Upper bound; `None` = unbounded above.
    pub upper: Option<f64>,
}

impl Variable {
    /// Whether the solver must assign an integral value.
    #[inline]
    pub fn is_integral(&self) -> bool {
        !matches!(self.kind, VarKind::Continuous)
    }
}

/// Constraint sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    /// `lhs = rhs`
    Eq,
    /// `lhs <= rhs`
    Le,
    /// `lhs >= rhs`
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Eq => "=",
            Sense::Le => "<=",
            Sense::Ge => ">=",
        })
    }
}

/// `Σ coeff·var  sense  rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    /// Sparse coefficients, merged per variable, in variable order.
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Coefficient of a variable (0 if absent).
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .find(|(v, _)| *v == var)
            .map(|&(_, c)| c)
            .unwrap_or(0.0)
    }
}

/// Optimisation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

/// Linear objective.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Objective {
    pub sense: ObjectiveSense,
    pub terms: Vec<(VarId, f64)>,
}

impl Objective {
    /// Objective value under an assignment.
    pub fn value(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(v, c)| c * values[v.0]).sum()
    }

    /// Coefficient of a variable (0 if absent).
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .find(|(v, _)| *v == var)
            .map(|&(_, c)| c)
            .unwrap_or(0.0)
    }
}

/// A mixed-integer linear program.
///
/// # Example
/// ```
/// use u_hls_schedule::lp::{LpModel, Sense, VarKind, ObjectiveSense};
///
/// let mut model = LpModel::new("demo");
/// model.add_variable("x", Some(0.0), None, VarKind::Integer).unwrap();
/// model.add_variable("y", Some(0.0), None, VarKind::Integer).unwrap();
/// let c = model.add_constraint([("y", 1.0), ("x", -1.0)], Sense::Ge, 2.0).unwrap();
/// model.set_objective([("x", 1.0), ("y", 1.0)], ObjectiveSense::Minimize).unwrap();
/// assert_eq!(model.num_constraints(), 1);
/// model.remove_constraint(c).unwrap();
/// assert_eq!(model.num_constraints(), 0);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct LpModel {
    pub name: String,
    variables: Vec<Variable>,
    #[serde(skip)]
    index: HashMap<String, VarId>,
    constraints: BTreeMap<ConstraintId, LinearConstraint>,
    next_constraint: usize,
    objective: Objective,
}

impl LpModel {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_constraint: 1,
            ..Default::default()
        }
    }

    /// Adds a variable.
    ///
    /// Binary variables are always bounded to `[0, 1]`.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        lower: Option<f64>,
        upper: Option<f64>,
        kind: VarKind,
    ) -> Result<VarId, LpError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(LpError::DuplicateVariable(name));
        }
        let (lower, upper) = match kind {
            VarKind::Binary => (Some(0.0), Some(1.0)),
            _ => (lower, upper),
        };
        for bound in [lower, upper].into_iter().flatten() {
            if bound.is_nan() {
                return Err(LpError::NonFinite { name, value: bound });
            }
        }
        if let (Some(l), Some(u)) = (lower, upper) {
            if l > u {
                return Err(LpError::InvalidBounds {
                    name,
                    lower: l,
                    upper: u,
                });
            }
        }
        let id = VarId(self.variables.len());
        self.index.insert(name.clone(), id);
        self.variables.push(Variable {
            name,
            kind,
            lower,
            upper,
        });
        Ok(id)
    }

    /// Looks up a variable id.
    pub fn var(&self, name: &str) -> Option<VarId> {
        self.index.get(name).copied()
    }

    /// Variable attributes.
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    /// All variables, in creation order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Number of variables.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    fn resolve<I, K>(&self, terms: I) -> Result<Vec<(VarId, f64)>, LpError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut merged: BTreeMap<VarId, f64> = BTreeMap::new();
        for (name, coeff) in terms {
            let name = name.as_ref();
            let id = self
                .var(name)
                .ok_or_else(|| LpError::UnknownVariable(name.to_string()))?;
            if !coeff.is_finite() {
                return Err(LpError::NonFinite {
                    name: name.to_string(),
                    value: coeff,
                });
            }
            *merged.entry(id).or_insert(0.0) += coeff;
        }
        Ok(merged.into_iter().filter(|&(_, c)| c != 0.0).collect())
    }

    /// Adds `Σ coeff·var  sense  rhs` and returns its id.
    pub fn add_constraint<I, K>(
        &mut self,
        terms: I,
        sense: Sense,
        rhs: f64,
    ) -> Result<ConstraintId, LpError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        if !rhs.is_finite() {
            return Err(LpError::NonFinite {
                name: "rhs".into(),
                value: rhs,
            });
        }
        let terms = self.resolve(terms)?;
        let id = ConstraintId(self.next_constraint.max(1));
        self.next_constraint = id.0 + 1;
        self.constraints
            .insert(id, LinearConstraint { terms, sense, rhs });
        Ok(id)
    }

    /// Removes a constraint, returning it.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<LinearConstraint, LpError> {
        self.constraints
            .remove(&id)
            .ok_or(LpError::UnknownConstraint(id))
    }

    /// A constraint by id.
    pub fn constraint(&self, id: ConstraintId) -> Option<&LinearConstraint> {
        self.constraints.get(&id)
    }

    /// All live constraints, in id order.
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &LinearConstraint)> {
        self.constraints.iter().map(|(&id, c)| (id, c))
    }

    /// Number of live constraints.
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Replaces the objective.
    pub fn set_objective<I, K>(&mut self, terms: I, sense: ObjectiveSense) -> Result<(), LpError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let terms = self.resolve(terms)?;
        self.objective = Objective { sense, terms };
        Ok(())
    }

    /// Current objective.
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    fn write_terms(&self, f: &mut fmt::Formatter<'_>, terms: &[(VarId, f64)]) -> fmt::Result {
        if terms.is_empty() {
            return f.write_str("0");
        }
        for (i, &(v, c)) in terms.iter().enumerate() {
            let name = &self.variables[v.0].name;
            let sign = if c < 0.0 { "-" } else { "+" };
            let mag = c.abs();
            if i == 0 {
                if c < 0.0 {
                    f.write_str("- ")?;
                }
            } else {
                write!(f, " {sign} ")?;
            }
            if mag == 1.0 {
                write!(f, "{name}")?;
            } else {
                write!(f, "{mag} {name}")?;
            }
        }
        Ok(())
    }
}

/// Renders the model in CPLEX LP format.
impl fmt::Display for LpModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\\* {} *\\", self.name)?;
        match self.objective.sense {
            ObjectiveSense::Minimize => writeln!(f, "Minimize")?,
            ObjectiveSense::Maximize => writeln!(f, "Maximize")?,
        }
        f.write_str(" obj: ")?;
        self.write_terms(f, &self.objective.terms)?;
        writeln!(f)?;

        writeln!(f, "Subject To")?;
        for (id, c) in &self.constraints {
            write!(f, " {id}: ")?;
            self.write_terms(f, &c.terms)?;
            writeln!(f, " {} {}", c.sense, c.rhs)?;
        }

        writeln!(f, "Bounds")?;
        for v in self.variables.iter().filter(|v| v.kind != VarKind::Binary) {
            match (v.lower, v.upper) {
                (Some(l), Some(u)) => writeln!(f, " {l} <= {} <= {u}", v.name)?,
                (Some(l), None) => writeln!(f, " {} >= {l}", v.name)?,
                (None, Some(u)) => writeln!(f, " -inf <= {} <= {u}", v.name)?,
                (None, None) => writeln!(f, " {} free", v.name)?,
            }
        }

        let generals: Vec<&str> = self
            .variables
            .iter()
            .filter(|v| v.kind == VarKind::Integer)
            .map(|v| v.name.as_str())
            .collect();
        if !generals.is_empty() {
            writeln!(f, "General")?;
            writeln!(f, " {}", generals.join(" "))?;
        }
        let binaries: Vec<&str> = self
            .variables
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .map(|v| v.name.as_str())
            .collect();
        if !binaries.is_empty() {
            writeln!(f, "Binary")?;
            writeln!(f, " {}", binaries.join(" "))?;
        }
        writeln!(f, "End")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_model() -> LpModel {
        let mut m = LpModel::new("t");
        m.add_variable("x", Some(0.0), None, VarKind::Integer).unwrap();
        m.add_variable("y", Some(0.0), Some(10.0), VarKind::Continuous)
            .unwrap();
        m
    }

    #[test]
    fn test_duplicate_variable() {
        let mut m = make_model();
        let err = m
            .add_variable("x", None, None, VarKind::Continuous)
            .unwrap_err();
        assert_eq!(err, LpError::DuplicateVariable("x".into()));
    }

    #[test]
    fn test_invalid_bounds() {
        let mut m = make_model();
        let err = m
            .add_variable("z", Some(3.0), Some(1.0), VarKind::Integer)
            .unwrap_err();
        assert!(matches!(err, LpError::InvalidBounds { .. }));
    }

    #[test]
    fn test_binary_bounds_forced() {
        let mut m = make_model();
        let b = m.add_variable("b", None, Some(7.0), VarKind::Binary).unwrap();
        assert_eq!(m.variable(b).lower, Some(0.0));
        assert_eq!(m.variable(b).upper, Some(1.0));
        assert!(m.variable(b).is_integral());
    }

    #[test]
    fn test_constraint_terms_merged() {
        let mut m = make_model();
        let id = m
            .add_constraint([("x", 1.0), ("y", 2.0), ("x", 2.0)], Sense::Le, 5.0)
            .unwrap();
        let c = m.constraint(id).unwrap();
        assert_eq!(c.terms.len(), 2);
        assert_eq!(c.coefficient(m.var("x").unwrap()), 3.0);
    }

    #[test]
    fn test_unknown_variable_in_constraint() {
        let mut m = make_model();
        let err = m.add_constraint([("q", 1.0)], Sense::Eq, 0.0).unwrap_err();
        assert_eq!(err, LpError::UnknownVariable("q".into()));
        assert_eq!(m.num_constraints(), 0);
    }

    #[test]
    fn test_remove_constraint_ids_not_reused() {
        let mut m = make_model();
        let c1 = m.add_constraint([("x", 1.0)], Sense::Ge, 1.0).unwrap();
        m.remove_constraint(c1).unwrap();
        let c2 = m.add_constraint([("x", 1.0)], Sense::Ge, 2.0).unwrap();
        assert_ne!(c1, c2);
        assert_eq!(
            m.remove_constraint(c1).unwrap_err(),
            LpError::UnknownConstraint(c1)
        );
    }

    #[test]
    fn test_lp_format() {
        let mut m = make_model();
        m.add_constraint([("y", 1.0), ("x", -1.0)], Sense::Ge, 2.0)
            .unwrap();
        m.set_objective([("x", 1.0), ("y", 2.0)], ObjectiveSense::Minimize)
            .unwrap();
        let text = m.to_string();
        assert!(text.contains("Minimize"));
        assert!(text.contains(" obj: x + 2 y"));
        assert!(text.contains(" c1: - x + y >= 2"));
        assert!(text.contains("General\n x"));
        assert!(text.trim_end().ends_with("End"));
    }
}

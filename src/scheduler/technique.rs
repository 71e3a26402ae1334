//! Scheduling disciplines.
//!
//! Each discipline carries only the parameters it needs and contributes its
//! own auxiliary constraints and objective to the timing model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{
    sv, ii_block_var, BACK_EDGE_DISTANCE, II_VAR, MAX_II_VAR, MAX_LATENCY_VAR,
};
use crate::error::{Result, ScheduleError};
use crate::lp::{LpModel, ObjectiveSense, Sense, VarKind};
use crate::models::ScheduleView;

/// Requested initiation interval of a pipelined schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IiTarget {
    /// One shared `II`, pinned to this value.
    Fixed(i64),
    /// One `II_<block>` per loop-bearing block, bounded by a minimised `max_II`.
    PerBlock,
}

/// A scheduling discipline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    /// Every operation as early as possible.
    #[default]
    Asap,
    /// Every operation as late as possible, each supersink bounded by the
    /// given "no later than" cycle (typically the ASAP sink delays).
    Alap { sink_bounds: BTreeMap<String, i64> },
    /// Minimise end-to-end latency over all supersinks.
    NoPipeline,
    /// Software-pipelined loop schedule.
    Pipelined { ii: IiTarget },
}

impl Technique {
    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Technique::Asap => "asap",
            Technique::Alap { .. } => "alap",
            Technique::NoPipeline => "no_pipeline",
            Technique::Pipelined { .. } => "pipelined",
        }
    }

    /// Whether II constraints are meaningful.
    #[inline]
    pub fn is_pipelined(&self) -> bool {
        matches!(self, Technique::Pipelined { .. })
    }

    /// ALAP with the given sink bounds.
    pub fn alap(sink_bounds: BTreeMap<String, i64>) -> Self {
        Technique::Alap { sink_bounds }
    }

    /// Pipelined with a fixed II.
    pub fn pipelined(ii: i64) -> Self {
        Technique::Pipelined {
            ii: IiTarget::Fixed(ii),
        }
    }

    /// Adds the discipline's auxiliary constraints and its objective.
    ///
    /// Returns the number of constraints added.
    pub(crate) fn contribute_objective(
        &self,
        model: &mut LpModel,
        view: &ScheduleView,
    ) -> Result<usize> {
        let all_svs: Vec<(String, f64)> =
            view.nodes().iter().map(|n| (sv(&n.name), 1.0)).collect();
        let mut added = 0;

        match self {
            Technique::Asap => {
                model.set_objective(all_svs, ObjectiveSense::Minimize)?;
            }
            Technique::Alap { sink_bounds } => {
                for sink in view.sinks() {
                    let name = &view.node(sink).name;
                    let bound = sink_bounds.get(name).ok_or_else(|| {
                        ScheduleError::config(format!(
                            "ALAP needs a latency bound for every supersink; '{name}' has none"
                        ))
                    })?;
                    model.add_constraint([(sv(name), 1.0)], Sense::Le, *bound as f64)?;
                    added += 1;
                }
                let negated = all_svs.into_iter().map(|(v, c)| (v, -c));
                model.set_objective(negated, ObjectiveSense::Minimize)?;
            }
            Technique::NoPipeline => {
                model.add_variable(MAX_LATENCY_VAR, Some(0.0), None, VarKind::Integer)?;
                for sink in view.sinks() {
                    model.add_constraint(
                        [
                            (MAX_LATENCY_VAR.to_string(), 1.0),
                            (sv(&view.node(sink).name), -1.0),
                        ],
                        Sense::Ge,
                        0.0,
                    )?;
                    added += 1;
                }
                model.set_objective([(MAX_LATENCY_VAR, 1.0)], ObjectiveSense::Minimize)?;
            }
            Technique::Pipelined { ii } => {
                let mut terms = all_svs;
                match ii {
                    IiTarget::Fixed(_) => {
                        if model.var(II_VAR).is_none() {
                            return Err(ScheduleError::Precondition {
                                operation: "set_objective",
                                state: "missing the II constraint".into(),
                            });
                        }
                        terms.push((II_VAR.to_string(), 1.0));
                    }
                    IiTarget::PerBlock => {
                        if model.var(MAX_II_VAR).is_none() {
                            return Err(ScheduleError::Precondition {
                                operation: "set_objective",
                                state: "missing the per-block II constraints".into(),
                            });
                        }
                        terms.push((MAX_II_VAR.to_string(), Self::max_ii_weight(view)));
                    }
                }
                model.set_objective(terms, ObjectiveSense::Minimize)?;
            }
        }
        debug!(technique = self.name(), constraints = added, "objective set");
        Ok(added)
    }

    /// Weight that makes one unit of `max_II` dominate any change of `Σ sv`.
    fn max_ii_weight(view: &ScheduleView) -> f64 {
        let total: f64 = view.nodes().iter().map(|n| n.latency.ceil()).sum();
        (view.len() as f64 + 1.0) * (total + 1.0)
    }

    /// Adds the II variable(s) and one constraint per intra-block back-edge:
    /// `sv(v) - sv(u) + d·II ≥ lat(u)`.
    ///
    /// Returns the number of back-edge constraints added.
    pub(crate) fn contribute_ii(&self, model: &mut LpModel, view: &ScheduleView) -> Result<usize> {
        let Technique::Pipelined { ii } = self else {
            return Err(ScheduleError::Precondition {
                operation: "add_ii_constraint",
                state: format!("configured for {}", self.name()),
            });
        };

        for e in view.back_edges() {
            if !view.is_intra_block(e) {
                let (u, v) = (view.node(e.source), view.node(e.target));
                return Err(ScheduleError::malformed(format!(
                    "back-edge {} ({}) -> {} ({}) spans two basic blocks",
                    u.name, u.block, v.name, v.block
                )));
            }
        }

        match *ii {
            IiTarget::Fixed(value) => {
                if value < 1 {
                    return Err(ScheduleError::config(format!(
                        "initiation interval must be at least 1, got {value}"
                    )));
                }
                model.add_variable(II_VAR, Some(1.0), None, VarKind::Integer)?;
                model.add_constraint([(II_VAR, 1.0)], Sense::Eq, value as f64)?;
            }
            IiTarget::PerBlock => {
                model.add_variable(MAX_II_VAR, Some(1.0), None, VarKind::Integer)?;
                for block in view.loop_blocks() {
                    let var = ii_block_var(block);
                    model.add_variable(var.as_str(), Some(1.0), None, VarKind::Integer)?;
                    model.add_constraint(
                        [(MAX_II_VAR.to_string(), 1.0), (var, -1.0)],
                        Sense::Ge,
                        0.0,
                    )?;
                }
            }
        }

        let mut added = 0;
        for e in view.back_edges() {
            let (u, v) = (view.node(e.source), view.node(e.target));
            let ii_var = match ii {
                IiTarget::Fixed(_) => II_VAR.to_string(),
                IiTarget::PerBlock => ii_block_var(u.block),
            };
            model.add_constraint(
                [
                    (sv(&v.name), 1.0),
                    (sv(&u.name), -1.0),
                    (ii_var, BACK_EDGE_DISTANCE as f64),
                ],
                Sense::Ge,
                u.latency,
            )?;
            added += 1;
        }
        Ok(added)
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a technique name.
///
/// `alap` parses with an empty bound map and `pipelined` with `II = 1`;
/// callers fill in the parameters.
impl FromStr for Technique {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asap" => Ok(Technique::Asap),
            "alap" => Ok(Technique::alap(BTreeMap::new())),
            "no_pipeline" | "nopipe" => Ok(Technique::NoPipeline),
            "pipelined" => Ok(Technique::pipelined(1)),
            other => Err(ScheduleError::config(format!(
                "unknown scheduling technique '{other}' (expected asap, alap, no_pipeline or pipelined)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("asap".parse::<Technique>().unwrap(), Technique::Asap);
        assert_eq!("NoPipe".parse::<Technique>().unwrap(), Technique::NoPipeline);
        assert_eq!(
            "no_pipeline".parse::<Technique>().unwrap(),
            Technique::NoPipeline
        );
        assert_eq!(
            "pipelined".parse::<Technique>().unwrap(),
            Technique::pipelined(1)
        );
        assert!(matches!(
            "alap".parse::<Technique>().unwrap(),
            Technique::Alap { .. }
        ));
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let err = "asap_rconst".parse::<Technique>().unwrap_err();
        assert!(matches!(err, ScheduleError::Config(_)));
        assert!(err.to_string().contains("asap_rconst"));
    }

    #[test]
    fn test_display_round_trips() {
        for t in [
            Technique::Asap,
            Technique::NoPipeline,
            Technique::pipelined(3),
        ] {
            let back: Technique = t.to_string().parse().unwrap();
            assert_eq!(back.name(), t.name());
        }
        assert!(Technique::pipelined(2).is_pipelined());
        assert!(!Technique::Asap.is_pipelined());
    }
}

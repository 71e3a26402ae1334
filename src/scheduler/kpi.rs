//! Schedule quality metrics.
//!
//! # Metrics
//! - **Latency**: per block, `ssink - ssrc`; overall, the latest supersink.
//! - **II**: the achieved initiation interval, if pipelined.
//! - **Peak issue**: most operations of one class started in a single
//!   cycle of a single block.
//! - **MRT peak**: most operations of one class sharing an MRT column.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::{BasicBlock, BlockId, Cdfg, Schedule};
use crate::resource::ModuloReservationTable;

/// Key performance indicators of one schedule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleKpi {
    /// Latest supersink cycle (cycles for one pass through all blocks).
    pub latency: i64,
    /// `ssink - ssrc` per block name.
    pub block_latency: BTreeMap<String, i64>,
    /// Achieved initiation interval.
    pub ii: Option<i64>,
    /// Peak same-cycle issue per resource class.
    pub peak_issue: BTreeMap<String, usize>,
    /// Peak MRT column occupancy per resource class (pipelined only).
    pub mrt_peak: BTreeMap<String, usize>,
    /// Number of scheduled nodes.
    pub scheduled_nodes: usize,
}

impl ScheduleKpi {
    /// Computes KPIs for a schedule of `graph`.
    pub fn calculate(schedule: &Schedule, graph: &Cdfg) -> Self {
        let latency = graph
            .super_sinks()
            .into_iter()
            .filter_map(|id| schedule.cycle(&graph.node(id).name))
            .max()
            .unwrap_or(0)
            .max(0);

        let mut block_latency = BTreeMap::new();
        for block in graph.blocks() {
            let cycle_of = |name: String| schedule.cycle(&name);
            let start = cycle_of(BasicBlock::source_name(block.id));
            let end = cycle_of(BasicBlock::sink_name(block.id));
            if let (Some(start), Some(end)) = (start, end) {
                block_latency.insert(block.name.clone(), end - start);
            }
        }

        let mut issued: HashMap<(BlockId, i64, &'static str), usize> = HashMap::new();
        for (_, op) in graph.operations() {
            let (Some(class), Some(cycle)) = (op.kind.resource_class(), schedule.cycle(&op.name))
            else {
                continue;
            };
            *issued.entry((op.block, cycle, class)).or_insert(0) += 1;
        }
        let mut peak_issue: BTreeMap<String, usize> = BTreeMap::new();
        for ((_, _, class), n) in issued {
            let peak = peak_issue.entry(class.to_string()).or_insert(0);
            *peak = (*peak).max(n);
        }

        let mrt_peak = match schedule.ii {
            Some(ii) => ModuloReservationTable::from_schedule(graph, schedule, ii)
                .peaks()
                .into_iter()
                .map(|(class, n)| (class.to_string(), n))
                .collect(),
            None => BTreeMap::new(),
        };

        Self {
            latency,
            block_latency,
            ii: schedule.ii,
            peak_issue,
            mrt_peak,
            scheduled_nodes: schedule.node_count(),
        }
    }

    /// Whether the schedule fits the given latency and II targets.
    pub fn meets_targets(&self, max_latency: i64, max_ii: Option<i64>) -> bool {
        let ii_ok = match (max_ii, self.ii) {
            (Some(target), Some(ii)) => ii <= target,
            _ => true,
        };
        self.latency <= max_latency && ii_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpKind, SolveStatus};

    fn make_graph() -> Cdfg {
        let mut g = Cdfg::new("kpi");
        let bb = g.add_block("entry");
        g.op("m1", OpKind::Mul, bb).unwrap();
        g.op("m2", OpKind::Mul, bb).unwrap();
        g.op("a", OpKind::Add, bb).unwrap();
        g.add_dependency("m1", "a").unwrap();
        g.add_dependency("m2", "a").unwrap();
        g.insert_super_nodes().unwrap();
        g
    }

    fn make_schedule(cycles: &[(&str, i64)], ii: Option<i64>) -> Schedule {
        let mut s = Schedule::new(SolveStatus::Optimal);
        for (n, c) in cycles {
            s.cycles.insert(n.to_string(), *c);
        }
        s.ii = ii;
        s
    }

    #[test]
    fn test_kpi_latency_and_peak() {
        let g = make_graph();
        let s = make_schedule(
            &[("ssrc_0", 0), ("m1", 0), ("m2", 0), ("a", 3), ("ssink_0", 4)],
            None,
        );
        let kpi = ScheduleKpi::calculate(&s, &g);
        assert_eq!(kpi.latency, 4);
        assert_eq!(kpi.block_latency["entry"], 4);
        assert_eq!(kpi.peak_issue["mul"], 2);
        assert_eq!(kpi.peak_issue["add"], 1);
        assert!(kpi.mrt_peak.is_empty());
        assert_eq!(kpi.scheduled_nodes, 5);
    }

    #[test]
    fn test_kpi_mrt_peak() {
        let g = make_graph();
        // m1 and m2 collide in column 1 at II=2.
        let s = make_schedule(
            &[("ssrc_0", 0), ("m1", 1), ("m2", 3), ("a", 6), ("ssink_0", 7)],
            Some(2),
        );
        let kpi = ScheduleKpi::calculate(&s, &g);
        assert_eq!(kpi.ii, Some(2));
        assert_eq!(kpi.peak_issue["mul"], 1);
        assert_eq!(kpi.mrt_peak["mul"], 2);
        assert_eq!(kpi.mrt_peak["add"], 1);
    }

    #[test]
    fn test_kpi_latency_is_latest_sink() {
        let mut g = Cdfg::new("two");
        let head = g.add_block("head");
        let tail = g.add_block("tail");
        g.op("x", OpKind::Add, head).unwrap();
        g.op("y", OpKind::Mul, tail).unwrap();
        g.add_control_edge(head, tail, false).unwrap();
        g.insert_super_nodes().unwrap();
        let s = make_schedule(
            &[
                ("ssrc_0", 0),
                ("x", 0),
                ("ssink_0", 1),
                ("ssrc_1", 1),
                ("y", 1),
                ("ssink_1", 4),
            ],
            None,
        );
        let kpi = ScheduleKpi::calculate(&s, &g);
        assert_eq!(kpi.latency, 4);
        assert_eq!(kpi.block_latency["head"], 1);
        assert_eq!(kpi.block_latency["tail"], 3);
    }

    #[test]
    fn test_kpi_empty() {
        let kpi = ScheduleKpi::calculate(&Schedule::default(), &Cdfg::new("empty"));
        assert_eq!(kpi.latency, 0);
        assert!(kpi.block_latency.is_empty());
        assert!(kpi.peak_issue.is_empty());
        assert_eq!(kpi.ii, None);
    }

    #[test]
    fn test_meets_targets() {
        let kpi = ScheduleKpi {
            latency: 7,
            ii: Some(2),
            ..Default::default()
        };
        assert!(kpi.meets_targets(7, Some(2)));
        assert!(!kpi.meets_targets(6, None));
        assert!(!kpi.meets_targets(10, Some(1)));
    }
}

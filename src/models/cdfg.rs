//! Control/data-flow graph model.
//!
//! Nodes are operations, edges are data or control dependencies tagged
//! forward or back-edge. Operations are grouped into basic blocks, and the
//! blocks are linked by CFG edges.
//!
//! The graph is built by an external front end (an IR parser); this module
//! only provides the capability surface the scheduler consumes:
//! enumeration, attribute lookup, forward/back edge split, topological
//! order and supernode synthesis.
//!
//! # Reference
//! Kahn (1962), "Topological sorting of large networks"

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::{BasicBlock, BlockId, ControlEdge, OpKind, Operation, Schedule};
use crate::error::{Result, ScheduleError};

/// Index of a node in its [`Cdfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub source: NodeId,
    pub target: NodeId,
    /// Loop-carried (cross-iteration) dependency.
    pub back_edge: bool,
}

/// A kernel's control/data-flow graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Cdfg {
    /// Kernel (top function) name.
    pub name: String,
    ops: Vec<Operation>,
    #[serde(skip)]
    index: HashMap<String, NodeId>,
    edges: Vec<Dependency>,
    blocks: Vec<BasicBlock>,
    control_edges: Vec<ControlEdge>,
}

impl Cdfg {
    /// Creates an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends a basic block and returns its id.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, name));
        id
    }

    /// Adds an operation to its block.
    ///
    /// Fails on a duplicate name or an unknown block.
    pub fn add_operation(&mut self, op: Operation) -> Result<NodeId> {
        if self.index.contains_key(&op.name) {
            return Err(ScheduleError::malformed(format!(
                "duplicate node name '{}'",
                op.name
            )));
        }
        let block = op.block.0;
        if block >= self.blocks.len() {
            return Err(ScheduleError::malformed(format!(
                "node '{}' references unknown block {}",
                op.name, op.block
            )));
        }
        let id = NodeId(self.ops.len());
        self.index.insert(op.name.clone(), id);
        if !op.kind.is_super_node() {
            self.blocks[block].ops.push(id);
        }
        self.ops.push(op);
        Ok(id)
    }

    /// Builder shorthand: adds an operation with its kind's default latency.
    pub fn op(&mut self, name: &str, kind: OpKind, block: BlockId) -> Result<NodeId> {
        self.add_operation(Operation::new(name, kind, block))
    }

    /// Adds a forward (intra-iteration) dependency.
    pub fn add_dependency(&mut self, source: &str, target: &str) -> Result<()> {
        self.add_edge(source, target, false)
    }

    /// Adds a loop-carried dependency.
    pub fn add_back_edge(&mut self, source: &str, target: &str) -> Result<()> {
        self.add_edge(source, target, true)
    }

    fn add_edge(&mut self, source: &str, target: &str, back_edge: bool) -> Result<()> {
        let source = self.require(source)?;
        let target = self.require(target)?;
        self.push_edge(source, target, back_edge);
        Ok(())
    }

    fn push_edge(&mut self, source: NodeId, target: NodeId, back_edge: bool) {
        let edge = Dependency {
            source,
            target,
            back_edge,
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Adds a CFG edge between two blocks.
    pub fn add_control_edge(&mut self, from: BlockId, to: BlockId, back_edge: bool) -> Result<()> {
        for b in [from, to] {
            if b.0 >= self.blocks.len() {
                return Err(ScheduleError::malformed(format!("unknown block {b}")));
            }
        }
        let edge = ControlEdge { from, to, back_edge };
        if !self.control_edges.contains(&edge) {
            self.control_edges.push(edge);
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<NodeId> {
        self.node_by_name(name)
            .ok_or_else(|| ScheduleError::UnknownNode(name.to_string()))
    }

    /// Looks up a node by name.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Node attributes.
    ///
    /// # Panics
    /// If `id` does not belong to this graph.
    pub fn node(&self, id: NodeId) -> &Operation {
        &self.ops[id.0]
    }

    /// Mutable node attributes.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Operation {
        &mut self.ops[id.0]
    }

    /// All operations with their ids.
    pub fn operations(&self) -> impl Iterator<Item = (NodeId, &Operation)> {
        self.ops.iter().enumerate().map(|(i, op)| (NodeId(i), op))
    }

    /// Number of nodes, supernodes included.
    pub fn node_count(&self) -> usize {
        self.ops.len()
    }

    /// All dependency edges.
    pub fn edges(&self) -> &[Dependency] {
        &self.edges
    }

    /// Intra-iteration edges.
    pub fn forward_edges(&self) -> impl Iterator<Item = &Dependency> {
        self.edges.iter().filter(|e| !e.back_edge)
    }

    /// Loop-carried edges.
    pub fn back_edges(&self) -> impl Iterator<Item = &Dependency> {
        self.edges.iter().filter(|e| e.back_edge)
    }

    /// Forward successors of a node.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.forward_edges()
            .filter(move |e| e.source == id)
            .map(|e| e.target)
    }

    /// Forward predecessors of a node.
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.forward_edges()
            .filter(move |e| e.target == id)
            .map(|e| e.source)
    }

    /// Basic blocks.
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// A basic block by id.
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }

    /// CFG edges.
    pub fn control_edges(&self) -> &[ControlEdge] {
        &self.control_edges
    }

    /// Topological order over forward edges.
    ///
    /// Ties are broken by node id so the order is deterministic.
    /// Fails if the forward edges contain a cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let n = self.ops.len();
        let mut in_degree = vec![0usize; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for e in self.forward_edges() {
            adj[e.source.0].push(e.target.0);
            in_degree[e.target.0] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(u)) = ready.pop() {
            order.push(NodeId(u));
            for &v in &adj[u] {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    ready.push(Reverse(v));
                }
            }
        }

        if order.len() != n {
            return Err(ScheduleError::malformed(
                "forward dependencies contain a cycle",
            ));
        }
        Ok(order)
    }

    /// Synthesizes one supersource and one supersink per basic block.
    ///
    /// - `ssrc_<bb>` → every block operation without an intra-block forward predecessor
    /// - every block operation without an intra-block forward successor → `ssink_<bb>`
    /// - `ssrc_<bb>` → `ssink_<bb>` for empty blocks
    /// - `ssink_<a>` → `ssrc_<b>` for every non-back CFG edge `a → b`
    ///
    /// Blocks that already own both supernodes are left alone, so calling
    /// this twice is harmless.
    pub fn insert_super_nodes(&mut self) -> Result<()> {
        for b in 0..self.blocks.len() {
            if self.blocks[b].has_super_nodes() {
                continue;
            }
            let id = BlockId(b);
            let source = self.add_operation(Operation::new(
                BasicBlock::source_name(id),
                OpKind::SuperSource,
                id,
            ))?;
            let sink = self.add_operation(Operation::new(
                BasicBlock::sink_name(id),
                OpKind::SuperSink,
                id,
            ))?;

            let members = self.blocks[b].ops.clone();
            let member_set: HashSet<NodeId> = members.iter().copied().collect();
            for &op in &members {
                let has_pred = self.predecessors(op).any(|p| member_set.contains(&p));
                if !has_pred {
                    self.push_edge(source, op, false);
                }
                let has_succ = self.successors(op).any(|s| member_set.contains(&s));
                if !has_succ {
                    self.push_edge(op, sink, false);
                }
            }
            if members.is_empty() {
                self.push_edge(source, sink, false);
            }

            self.blocks[b].source = Some(source);
            self.blocks[b].sink = Some(sink);
        }

        let links: Vec<(NodeId, NodeId)> = self
            .control_edges
            .iter()
            .filter(|c| !c.back_edge)
            .filter_map(|c| {
                let sink = self.blocks[c.from.0].sink?;
                let source = self.blocks[c.to.0].source?;
                Some((sink, source))
            })
            .collect();
        for (sink, source) in links {
            self.push_edge(sink, source, false);
        }
        Ok(())
    }

    /// Supersink nodes, in block order.
    pub fn super_sinks(&self) -> Vec<NodeId> {
        self.blocks.iter().filter_map(|b| b.sink).collect()
    }

    /// Copies the scheduled cycle of every node onto its `cycle` attribute.
    ///
    /// Nodes the schedule does not mention (e.g. stripped branches) are
    /// reset to `None`.
    pub fn apply_schedule(&mut self, schedule: &Schedule) {
        for op in &mut self.ops {
            op.cycle = schedule.cycle(&op.name);
        }
    }

    /// Rebuilds the name index (needed after deserializing the parts).
    pub fn from_parts(
        name: impl Into<String>,
        ops: Vec<Operation>,
        edges: Vec<Dependency>,
        blocks: Vec<BasicBlock>,
        control_edges: Vec<ControlEdge>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            if index.insert(op.name.clone(), NodeId(i)).is_some() {
                return Err(ScheduleError::malformed(format!(
                    "duplicate node name '{}'",
                    op.name
                )));
            }
        }
        if let Some(e) = edges
            .iter()
            .find(|e| e.source.0 >= ops.len() || e.target.0 >= ops.len())
        {
            return Err(ScheduleError::malformed(format!(
                "edge {} -> {} references a missing node",
                e.source.0, e.target.0
            )));
        }
        Ok(Self {
            name: name.into(),
            ops,
            index,
            edges,
            blocks,
            control_edges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chain() -> Cdfg {
        let mut g = Cdfg::new("chain");
        let bb = g.add_block("entry");
        g.op("L1", OpKind::Load, bb).unwrap();
        g.op("A1", OpKind::Add, bb).unwrap();
        g.op("S1", OpKind::Store, bb).unwrap();
        g.add_dependency("L1", "A1").unwrap();
        g.add_dependency("A1", "S1").unwrap();
        g
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut g = make_chain();
        let err = g.op("L1", OpKind::Load, BlockId(0)).unwrap_err();
        assert!(matches!(err, ScheduleError::MalformedGraph(_)));
    }

    #[test]
    fn test_unknown_block_rejected() {
        let mut g = make_chain();
        assert!(g.op("X", OpKind::Add, BlockId(7)).is_err());
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let mut g = make_chain();
        let err = g.add_dependency("L1", "nope").unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownNode(ref n) if n == "nope"));
    }

    #[test]
    fn test_topological_order() {
        let g = make_chain();
        let order: Vec<&str> = g
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|id| g.node(id).name.as_str())
            .collect();
        assert_eq!(order, vec!["L1", "A1", "S1"]);
    }

    #[test]
    fn test_forward_cycle_detected() {
        let mut g = make_chain();
        g.add_dependency("S1", "L1").unwrap();
        assert!(g.topological_order().is_err());
    }

    #[test]
    fn test_back_edges_ignored_by_topological_order() {
        let mut g = make_chain();
        g.add_back_edge("S1", "L1").unwrap();
        assert_eq!(g.topological_order().unwrap().len(), 3);
        assert_eq!(g.back_edges().count(), 1);
        assert_eq!(g.forward_edges().count(), 2);
    }

    #[test]
    fn test_insert_super_nodes() {
        let mut g = make_chain();
        g.insert_super_nodes().unwrap();

        let bb = &g.blocks()[0];
        let src = bb.source.unwrap();
        let sink = bb.sink.unwrap();
        assert_eq!(g.node(src).name, "ssrc_0");
        assert_eq!(g.node(sink).name, "ssink_0");

        let l1 = g.node_by_name("L1").unwrap();
        let s1 = g.node_by_name("S1").unwrap();
        assert_eq!(g.successors(src).collect::<Vec<_>>(), vec![l1]);
        assert_eq!(g.predecessors(sink).collect::<Vec<_>>(), vec![s1]);
        assert_eq!(g.predecessors(src).count(), 0);
        assert_eq!(g.successors(sink).count(), 0);
        // Supernodes are not block members
        assert_eq!(bb.ops.len(), 3);
    }

    #[test]
    fn test_insert_super_nodes_idempotent() {
        let mut g = make_chain();
        g.insert_super_nodes().unwrap();
        let nodes = g.node_count();
        let edges = g.edges().len();
        g.insert_super_nodes().unwrap();
        assert_eq!(g.node_count(), nodes);
        assert_eq!(g.edges().len(), edges);
    }

    #[test]
    fn test_super_nodes_link_blocks() {
        let mut g = Cdfg::new("two");
        let entry = g.add_block("entry");
        let body = g.add_block("body");
        g.op("a", OpKind::Add, entry).unwrap();
        g.add_control_edge(entry, body, false).unwrap();
        g.add_control_edge(body, body, true).unwrap();
        g.insert_super_nodes().unwrap();

        let sink0 = g.node_by_name("ssink_0").unwrap();
        let src1 = g.node_by_name("ssrc_1").unwrap();
        let sink1 = g.node_by_name("ssink_1").unwrap();
        assert!(g.successors(sink0).any(|s| s == src1));
        // Empty block: source feeds sink directly
        assert!(g.successors(src1).any(|s| s == sink1));
        // Loop back-edge does not link ssink_1 → ssrc_1
        assert!(!g.successors(sink1).any(|s| s == src1));
    }

    #[test]
    fn test_apply_schedule() {
        let mut g = make_chain();
        let mut schedule = Schedule::default();
        schedule.cycles.insert("L1".into(), 0);
        schedule.cycles.insert("A1".into(), 2);
        g.apply_schedule(&schedule);
        let a1 = g.node_by_name("A1").unwrap();
        let s1 = g.node_by_name("S1").unwrap();
        assert_eq!(g.node(a1).cycle, Some(2));
        assert_eq!(g.node(s1).cycle, None);
    }

    #[test]
    fn test_from_parts_rebuilds_index() {
        let g = make_chain();
        let ops: Vec<Operation> = g.operations().map(|(_, op)| op.clone()).collect();
        let rebuilt = Cdfg::from_parts(
            "chain",
            ops,
            g.edges().to_vec(),
            g.blocks().to_vec(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(rebuilt.node_by_name("S1"), Some(NodeId(2)));
    }
}

//! Filtered scheduling view of a CDFG.
//!
//! Branches and constants are projected out once, when the view is built.
//! Forward paths that ran through a stripped node are bridged so precedence
//! is preserved (stripped kinds have zero latency). Back-edges touching a
//! stripped node are dropped. The source graph is never mutated and stays
//! usable by other consumers (reporting, drawing).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::{BlockId, Cdfg, NodeId, OpKind};
use crate::error::{Result, ScheduleError};

/// A node of the view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewNode {
    /// Id in the source graph.
    pub origin: NodeId,
    pub name: String,
    pub kind: OpKind,
    pub block: BlockId,
    pub latency: f64,
}

/// An edge of the view, between view indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewEdge {
    pub source: usize,
    pub target: usize,
}

/// Immutable projection of a [`Cdfg`] used for constraint generation.
#[derive(Debug, Clone)]
pub struct ScheduleView {
    nodes: Vec<ViewNode>,
    index: HashMap<String, usize>,
    forward: Vec<ViewEdge>,
    back: Vec<ViewEdge>,
    topo: Vec<usize>,
    stripped: Vec<String>,
}

impl ScheduleView {
    /// Projects `graph`, stripping branch and constant nodes.
    pub fn project(graph: &Cdfg) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut index = HashMap::new();
        let mut remap: HashMap<NodeId, usize> = HashMap::new();
        let mut stripped = Vec::new();

        for (id, op) in graph.operations() {
            if op.kind.is_stripped() {
                stripped.push(op.name.clone());
                continue;
            }
            let vi = nodes.len();
            remap.insert(id, vi);
            index.insert(op.name.clone(), vi);
            nodes.push(ViewNode {
                origin: id,
                name: op.name.clone(),
                kind: op.kind,
                block: op.block,
                latency: op.latency,
            });
        }

        let mut forward = Vec::new();
        let mut seen: HashSet<ViewEdge> = HashSet::new();
        for (id, _) in graph.operations() {
            let Some(&u) = remap.get(&id) else { continue };
            // Walk through stripped successors until kept nodes are reached.
            let mut stack: Vec<NodeId> = graph.successors(id).collect();
            let mut visited: HashSet<NodeId> = HashSet::new();
            while let Some(s) = stack.pop() {
                if !visited.insert(s) {
                    continue;
                }
                match remap.get(&s) {
                    Some(&v) => {
                        let edge = ViewEdge {
                            source: u,
                            target: v,
                        };
                        if seen.insert(edge) {
                            forward.push(edge);
                        }
                    }
                    None => stack.extend(graph.successors(s)),
                }
            }
        }

        let back: Vec<ViewEdge> = graph
            .back_edges()
            .filter_map(|e| {
                Some(ViewEdge {
                    source: *remap.get(&e.source)?,
                    target: *remap.get(&e.target)?,
                })
            })
            .collect();

        let topo = Self::order(nodes.len(), &forward)?;

        Ok(Self {
            nodes,
            index,
            forward,
            back,
            topo,
            stripped,
        })
    }

    fn order(n: usize, edges: &[ViewEdge]) -> Result<Vec<usize>> {
        let mut in_degree = vec![0usize; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for e in edges {
            adj[e.source].push(e.target);
            in_degree[e.target] += 1;
        }
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(u)) = ready.pop() {
            order.push(u);
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

    /// Number of nodes in the view.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the view has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, indexed by view index.
    pub fn nodes(&self) -> &[ViewNode] {
        &self.nodes
    }

    /// A node by view index.
    pub fn node(&self, idx: usize) -> &ViewNode {
        &self.nodes[idx]
    }

    /// View index of a node name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Forward edges (bridged across stripped nodes).
    pub fn forward_edges(&self) -> &[ViewEdge] {
        &self.forward
    }

    /// Back-edges between kept nodes.
    pub fn back_edges(&self) -> &[ViewEdge] {
        &self.back
    }

    /// Whether an edge stays inside one basic block.
    pub fn is_intra_block(&self, edge: &ViewEdge) -> bool {
        self.nodes[edge.source].block == self.nodes[edge.target].block
    }

    /// Deterministic topological order of view indices.
    pub fn topological_order(&self) -> &[usize] {
        &self.topo
    }

    /// Names of the nodes projected out.
    pub fn stripped(&self) -> &[String] {
        &self.stripped
    }

    /// Distinct blocks present in the view, ascending.
    pub fn blocks(&self) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self.nodes.iter().map(|n| n.block).collect();
        blocks.sort();
        blocks.dedup();
        blocks
    }

    /// View indices of supersink nodes, in view order.
    pub fn sinks(&self) -> Vec<usize> {
        self.indices_of_kind(OpKind::SuperSink)
    }

    /// View indices of supersource nodes, in view order.
    pub fn sources(&self) -> Vec<usize> {
        self.indices_of_kind(OpKind::SuperSource)
    }

    fn indices_of_kind(&self, kind: OpKind) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Supersink of a block, if present.
    pub fn sink_of(&self, block: BlockId) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.kind == OpKind::SuperSink && n.block == block)
    }

    /// Blocks containing at least one back-edge.
    pub fn loop_blocks(&self) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self
            .back
            .iter()
            .map(|e| self.nodes[e.source].block)
            .collect();
        blocks.sort();
        blocks.dedup();
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single-block loop: i = phi(0, i.next); i.next = add i, 1; cmp; br.
    fn make_loop() -> Cdfg {
        let mut g = Cdfg::new("loop");
        let bb = g.add_block("for.body");
        g.op("one", OpKind::Constant, bb).unwrap();
        g.op("i", OpKind::Phi, bb).unwrap();
        g.op("i.next", OpKind::Add, bb).unwrap();
        g.op("cmp", OpKind::ICmp, bb).unwrap();
        g.op("br", OpKind::Br, bb).unwrap();
        g.add_dependency("one", "i.next").unwrap();
        g.add_dependency("i", "i.next").unwrap();
        g.add_dependency("i.next", "cmp").unwrap();
        g.add_dependency("cmp", "br").unwrap();
        g.add_back_edge("i.next", "i").unwrap();
        g.add_back_edge("br", "i").unwrap();
        g.insert_super_nodes().unwrap();
        g
    }

    #[test]
    fn test_strips_branch_and_constant() {
        let g = make_loop();
        let view = ScheduleView::project(&g).unwrap();
        assert_eq!(view.stripped(), &["one".to_string(), "br".to_string()]);
        assert!(view.index_of("br").is_none());
        assert!(view.index_of("cmp").is_some());
        // The source graph keeps its nodes.
        assert!(g.node_by_name("br").is_some());
    }

    #[test]
    fn test_bridges_through_stripped_nodes() {
        let g = make_loop();
        let view = ScheduleView::project(&g).unwrap();
        let cmp = view.index_of("cmp").unwrap();
        let sink = view.index_of("ssink_0").unwrap();
        // cmp → br → ssink_0 becomes cmp → ssink_0
        assert!(view
            .forward_edges()
            .iter()
            .any(|e| e.source == cmp && e.target == sink));
    }

    #[test]
    fn test_drops_back_edges_of_stripped_nodes() {
        let g = make_loop();
        let view = ScheduleView::project(&g).unwrap();
        assert_eq!(view.back_edges().len(), 1);
        let e = view.back_edges()[0];
        assert_eq!(view.node(e.source).name, "i.next");
        assert_eq!(view.node(e.target).name, "i");
        assert_eq!(view.loop_blocks(), vec![BlockId(0)]);
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let g = make_loop();
        let view = ScheduleView::project(&g).unwrap();
        let pos: HashMap<usize, usize> = view
            .topological_order()
            .iter()
            .enumerate()
            .map(|(p, &i)| (i, p))
            .collect();
        for e in view.forward_edges() {
            assert!(pos[&e.source] < pos[&e.target]);
        }
        assert_eq!(view.topological_order().len(), view.len());
    }

    #[test]
    fn test_sinks_and_sources() {
        let g = make_loop();
        let view = ScheduleView::project(&g).unwrap();
        assert_eq!(view.sinks().len(), 1);
        assert_eq!(view.sources().len(), 1);
        assert_eq!(view.sink_of(BlockId(0)), view.index_of("ssink_0"));
    }
}

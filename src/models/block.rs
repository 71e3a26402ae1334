//! Basic block and control-flow edge models.

use serde::{Deserialize, Serialize};

use super::{BlockId, NodeId};

/// A basic block of the kernel.
///
/// Holds the ordered membership of its real operations. The synthetic
/// supersource/supersink are recorded separately once created and are
/// never removed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Block identifier (index into the graph's block list).
    pub id: BlockId,
    /// Label from the IR (e.g. `for.body`).
    pub name: String,
    /// Real operations, in program order.
    pub ops: Vec<NodeId>,
    /// Synthetic supersource, once inserted.
    pub source: Option<NodeId>,
    /// Synthetic supersink, once inserted.
    pub sink: Option<NodeId>,
}

impl BasicBlock {
    /// Creates an empty block.
    pub fn new(id: BlockId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ops: Vec::new(),
            source: None,
            sink: None,
        }
    }

    /// Conventional supersource name for a block.
    pub fn source_name(id: BlockId) -> String {
        format!("ssrc_{id}")
    }

    /// Conventional supersink name for a block.
    pub fn sink_name(id: BlockId) -> String {
        format!("ssink_{id}")
    }

    /// Whether both supernodes exist.
    pub fn has_super_nodes(&self) -> bool {
        self.source.is_some() && self.sink.is_some()
    }
}

/// A CFG edge between two blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlEdge {
    pub from: BlockId,
    pub to: BlockId,
    /// Loop latch → header edge.
    pub back_edge: bool,
}

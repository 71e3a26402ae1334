//! Operation (CDFG node) model.
//!
//! An operation is the smallest schedulable unit: one SSA instruction,
//! or one of the synthetic supersource/supersink nodes that bound a
//! basic block.
//!
//! # Latency Model
//!
//! Latency is the number of cycles between an operation's start and the
//! earliest start of any consumer. It may be fractional; cycles are
//! integral. Zero-cost operations (phi, branch, constant, supernodes)
//! have latency 0.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScheduleError;

/// Identifier of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Load,
    Store,
    Add,
    Sub,
    Mul,
    Div,
    UDiv,
    SDiv,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    ICmp,
    ZExt,
    SExt,
    Phi,
    Br,
    Ret,
    Constant,
    SuperSource,
    SuperSink,
}

impl OpKind {
    /// All operation kinds, in declaration order.
    pub const ALL: [OpKind; 23] = [
        OpKind::Load,
        OpKind::Store,
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::UDiv,
        OpKind::SDiv,
        OpKind::And,
        OpKind::Or,
        OpKind::Xor,
        OpKind::Shl,
        OpKind::LShr,
        OpKind::AShr,
        OpKind::ICmp,
        OpKind::ZExt,
        OpKind::SExt,
        OpKind::Phi,
        OpKind::Br,
        OpKind::Ret,
        OpKind::Constant,
        OpKind::SuperSource,
        OpKind::SuperSink,
    ];

    /// Lowercase mnemonic, as it appears in the IR.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Load => "load",
            OpKind::Store => "store",
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Div => "div",
            OpKind::UDiv => "udiv",
            OpKind::SDiv => "sdiv",
            OpKind::And => "and",
            OpKind::Or => "or",
            OpKind::Xor => "xor",
            OpKind::Shl => "shl",
            OpKind::LShr => "lshr",
            OpKind::AShr => "ashr",
            OpKind::ICmp => "icmp",
            OpKind::ZExt => "zext",
            OpKind::SExt => "sext",
            OpKind::Phi => "phi",
            OpKind::Br => "br",
            OpKind::Ret => "ret",
            OpKind::Constant => "constant",
            OpKind::SuperSource => "supersource",
            OpKind::SuperSink => "supersink",
        }
    }

    /// Default latency in cycles.
    pub fn default_latency(self) -> f64 {
        match self {
            OpKind::Load => 2.0,
            OpKind::Store => 1.0,
            OpKind::Add
            | OpKind::Sub
            | OpKind::And
            | OpKind::Or
            | OpKind::Xor
            | OpKind::Shl
            | OpKind::LShr
            | OpKind::AShr
            | OpKind::ICmp => 1.0,
            OpKind::Mul => 3.0,
            OpKind::Div | OpKind::UDiv | OpKind::SDiv => 8.0,
            OpKind::ZExt | OpKind::SExt => 1.0,
            OpKind::Phi
            | OpKind::Br
            | OpKind::Ret
            | OpKind::Constant
            | OpKind::SuperSource
            | OpKind::SuperSink => 0.0,
        }
    }

    /// Resource class this kind competes for, if it is a shareable unit.
    ///
    /// The three divider flavours share one `div` class.
    pub fn resource_class(self) -> Option<&'static str> {
        match self {
            OpKind::Load => Some("load"),
            OpKind::Store => Some("store"),
            OpKind::Add => Some("add"),
            OpKind::Sub => Some("sub"),
            OpKind::Mul => Some("mul"),
            OpKind::Div | OpKind::UDiv | OpKind::SDiv => Some("div"),
            OpKind::ZExt => Some("zext"),
            OpKind::SExt => Some("sext"),
            _ => None,
        }
    }

    /// Whether this is a synthetic block-bounding node.
    #[inline]
    pub fn is_super_node(self) -> bool {
        matches!(self, OpKind::SuperSource | OpKind::SuperSink)
    }

    /// Whether the scheduling view strips nodes of this kind.
    ///
    /// Branches and constants carry no latency but their back-edges would
    /// otherwise tie II to the intra-iteration latency.
    #[inline]
    pub fn is_stripped(self) -> bool {
        matches!(self, OpKind::Br | OpKind::Constant)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ScheduleError::config(format!("unknown operation type '{s}'")))
    }
}

/// A CDFG node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique node name (the SSA value name, or `ssrc_<bb>` / `ssink_<bb>`).
    pub name: String,
    /// Operation type.
    pub kind: OpKind,
    /// Owning basic block.
    pub block: BlockId,
    /// Latency in cycles.
    pub latency: f64,
    /// Assigned start cycle; set only after a successful solve.
    pub cycle: Option<i64>,
}

impl Operation {
    /// Creates an operation with the kind's default latency.
    pub fn new(name: impl Into<String>, kind: OpKind, block: BlockId) -> Self {
        Self {
            name: name.into(),
            kind,
            block,
            latency: kind.default_latency(),
            cycle: None,
        }
    }

    /// Overrides the latency.
    pub fn with_latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in OpKind::ALL {
            assert_eq!(kind.as_str().parse::<OpKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "fmul".parse::<OpKind>().unwrap_err();
        assert!(matches!(err, ScheduleError::Config(_)));
    }

    #[test]
    fn test_zero_cost_kinds() {
        for kind in [OpKind::Phi, OpKind::Br, OpKind::Constant, OpKind::SuperSink] {
            assert_eq!(kind.default_latency(), 0.0);
        }
        assert!(OpKind::Mul.default_latency() > OpKind::Add.default_latency());
    }

    #[test]
    fn test_divider_classes_shared() {
        assert_eq!(OpKind::UDiv.resource_class(), Some("div"));
        assert_eq!(OpKind::SDiv.resource_class(), Some("div"));
        assert_eq!(OpKind::Phi.resource_class(), None);
    }

    #[test]
    fn test_operation_builder() {
        let op = Operation::new("x", OpKind::Mul, BlockId(2)).with_latency(4.0);
        assert_eq!(op.latency, 4.0);
        assert_eq!(op.cycle, None);
        assert_eq!(op.block.to_string(), "2");
    }

    #[test]
    fn test_kind_serde_lowercase() {
        let json = serde_json::to_string(&OpKind::LShr).unwrap();
        assert_eq!(json, "\"lshr\"");
        let back: OpKind = serde_json::from_str("\"supersink\"").unwrap();
        assert_eq!(back, OpKind::SuperSink);
    }
}

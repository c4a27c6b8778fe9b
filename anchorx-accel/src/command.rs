//! Command set and parameter block shared with the device.

use std::fmt;

use anchorx_core::scoring::{JointContext, CONTEXT_WORDS};
use anchorx_core::Anchor;
use bytemuck::{Pod, Zeroable};

use crate::error::{AccelError, AccelResult};

/// Device commands, identified on the wire by their `funct7` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Sum the span fields of an anchor array.
    SumSpan = 0,
    /// Latch a [`ContextWords`] block.
    LoadParams = 1,
    /// Joint score of one predecessor against the latched block.
    JointScore = 2,
}

impl Command {
    pub fn funct(self) -> u8 {
        self as u8
    }

    pub fn from_funct(funct: u8) -> AccelResult<Self> {
        match funct {
            0 => Ok(Command::SumSpan),
            1 => Ok(Command::LoadParams),
            2 => Ok(Command::JointScore),
            other => Err(AccelError::InvalidCommand(format!("unknown funct {}", other))),
        }
    }
}

/// `(rs1, rs2)` of a `SumSpan` instruction. The device latches the address
/// for the joint scores that follow.
pub fn sum_span_operands(anchors: &[Anchor]) -> (u64, u64) {
    (anchors.as_ptr() as u64, anchors.len() as u64)
}

/// `(rs1, rs2)` of a `LoadParams` instruction.
pub fn load_params_operands(block: &ContextWords) -> (u64, u64) {
    (block as *const ContextWords as u64, 0)
}

/// `(rs1, rs2)` of a `JointScore` instruction: the predecessor index into
/// the array latched by `SumSpan`.
pub fn joint_score_operands(j: usize) -> (u64, u64) {
    (j as u64, 0)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::SumSpan => "sum_span",
            Command::LoadParams => "load_params",
            Command::JointScore => "joint_score",
        };
        write!(f, "{}", name)
    }
}

/// Parameter block as the device reads it from memory: seven
/// signed words in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ContextWords {
    pub words: [i64; CONTEXT_WORDS],
}

impl ContextWords {
    pub fn encode(ctx: &JointContext) -> Self {
        Self {
            words: ctx.to_words(),
        }
    }

    pub fn decode(&self) -> AccelResult<JointContext> {
        if !matches!(self.words[0], 0 | 1) {
            return Err(AccelError::InvalidCommand(format!(
                "spliced flag must be 0 or 1, got {}",
                self.words[0]
            )));
        }
        Ok(JointContext::from_words(&self.words))
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

//! RoCC coprocessor on the custom-0 opcode.
//!
//! Each command is one R-type instruction and `funct7` selects it:
//!
//! * `SumSpan`: `rs1` is the anchor array address, `rs2` its length. The
//!   device keeps the address for later joint scores.
//! * `LoadParams`: `rs1` is the address of the seven context words.
//! * `JointScore`: `rs1` is the predecessor index into the array latched by
//!   `SumSpan`, `rs2` is zero.
//!
//! Commands with a result write it to `rd`.

use std::arch::asm;

use anchorx_core::fixed::Q32;
use anchorx_core::Anchor;

use crate::command::{
    joint_score_operands, load_params_operands, sum_span_operands, Command, ContextWords,
};
use crate::device::Accelerator;
use crate::error::AccelResult;

#[derive(Debug, Default)]
pub struct RoccAccelerator {
    _private: (),
}

impl RoccAccelerator {
    /// The coprocessor is part of the core; there is no device to open.
    pub fn open() -> AccelResult<Self> {
        log::debug!("using RoCC accelerator on custom-0");
        Ok(Self { _private: () })
    }
}

macro_rules! rocc_rd {
    ($funct:expr, $rs1:expr, $rs2:expr) => {{
        let rd: u64;
        // SAFETY: the device only reads the anchor array and context block it was given
        unsafe {
            asm!(
                ".insn r 0x0b, 7, {funct}, {rd}, {rs1}, {rs2}",
                funct = const $funct,
                rd = lateout(reg) rd,
                rs1 = in(reg) $rs1,
                rs2 = in(reg) $rs2,
                options(nostack),
            );
        }
        rd
    }};
}

impl Accelerator for RoccAccelerator {
    fn name(&self) -> &str {
        "rocc"
    }

    fn sum_span(&mut self, anchors: &[Anchor]) -> AccelResult<u64> {
        let (addr, len) = sum_span_operands(anchors);
        Ok(rocc_rd!(Command::SumSpan as u8, addr, len))
    }

    fn load_params(&mut self, block: &ContextWords) -> AccelResult<()> {
        let (addr, zero) = load_params_operands(block);
        // SAFETY: the device copies the seven words before the instruction retires
        unsafe {
            asm!(
                ".insn r 0x0b, 3, {funct}, x0, {rs1}, {rs2}",
                funct = const Command::LoadParams as u8,
                rs1 = in(reg) addr,
                rs2 = in(reg) zero,
                options(nostack),
            );
        }
        Ok(())
    }

    fn joint_score(&mut self, _anchors: &[Anchor], j: usize) -> AccelResult<Q32> {
        let (index, zero) = joint_score_operands(j);
        let bits = rocc_rd!(Command::JointScore as u8, index, zero);
        Ok(Q32::from_bits(bits as i64))
    }
}

//! Accelerator devices.

use anchorx_core::fixed::Q32;
use anchorx_core::scoring::{joint_score, JointContext};
use anchorx_core::Anchor;

use crate::command::ContextWords;
use crate::error::{AccelError, AccelResult};

/// A scoring device reachable through three synchronous commands.
///
/// Callers are responsible for memory ordering around each command;
/// [`crate::AcceleratedBackend`] brackets every call with full fences.
pub trait Accelerator: Send {
    fn name(&self) -> &str;

    fn sum_span(&mut self, anchors: &[Anchor]) -> AccelResult<u64>;

    fn load_params(&mut self, block: &ContextWords) -> AccelResult<()>;

    fn joint_score(&mut self, anchors: &[Anchor], j: usize) -> AccelResult<Q32>;
}

/// Software model of the scoring device.
///
/// Decodes the parameter block exactly as the hardware receives it, so a
/// mis-encoded block shows up here as well.
#[derive(Debug, Default)]
pub struct EmulatedAccelerator {
    latched: Option<JointContext>,
}

impl EmulatedAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latched(&self) -> Option<&JointContext> {
        self.latched.as_ref()
    }
}

impl Accelerator for EmulatedAccelerator {
    fn name(&self) -> &str {
        "emulated"
    }

    fn sum_span(&mut self, anchors: &[Anchor]) -> AccelResult<u64> {
        Ok(anchors.iter().map(|a| a.span() as u64).sum())
    }

    fn load_params(&mut self, block: &ContextWords) -> AccelResult<()> {
        self.latched = Some(block.decode()?);
        Ok(())
    }

    fn joint_score(&mut self, anchors: &[Anchor], j: usize) -> AccelResult<Q32> {
        let ctx = self.latched.as_ref().ok_or_else(|| {
            AccelError::InvalidCommand("joint score requested before parameters were loaded".into())
        })?;
        let pred = anchors.get(j).ok_or_else(|| {
            AccelError::InvalidCommand(format!("predecessor {} out of {} anchors", j, anchors.len()))
        })?;
        Ok(Q32::from_int(joint_score(ctx, pred)))
    }
}

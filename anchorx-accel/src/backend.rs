//! Scoring backend that offloads to an [`Accelerator`].

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{fence, Ordering};

use anchorx_core::error::fatal;
use anchorx_core::fixed::Q32;
use anchorx_core::scoring::{JointContext, ReferenceBackend, ScoringBackend};
use anchorx_core::Anchor;
use serde::{Deserialize, Serialize};

use crate::command::{Command, ContextWords};
use crate::device::{Accelerator, EmulatedAccelerator};
use crate::error::{AccelError, AccelResult};

/// Commands issued through one backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccelStats {
    pub sum_span: u64,
    pub load_params: u64,
    pub joint_score: u64,
}

impl AccelStats {
    fn record(&mut self, cmd: Command) {
        match cmd {
            Command::SumSpan => self.sum_span += 1,
            Command::LoadParams => self.load_params += 1,
            Command::JointScore => self.joint_score += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.sum_span + self.load_params + self.joint_score
    }
}

/// Forwards every scoring primitive to a device.
///
/// Each command is preceded by a full fence, so the device observes all
/// prior writes, and followed by one, so its results are visible before
/// the caller reads them. A device error mid-chain aborts the process.
pub struct AcceleratedBackend<D: Accelerator> {
    device: D,
    block: ContextWords,
    stats: AccelStats,
}

impl<D: Accelerator> AcceleratedBackend<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            block: bytemuck::Zeroable::zeroed(),
            stats: AccelStats::default(),
        }
    }

    pub fn stats(&self) -> AccelStats {
        self.stats
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    fn issue<T>(&mut self, cmd: Command, call: impl FnOnce(&mut D, &ContextWords) -> AccelResult<T>) -> T {
        self.stats.record(cmd);
        fence(Ordering::SeqCst);
        let result = call(&mut self.device, &self.block);
        fence(Ordering::SeqCst);
        match result {
            Ok(value) => value,
            Err(err) => fatal(&format!("[{}] {} failed: {}", self.device.name(), cmd, err)),
        }
    }
}

impl<D: Accelerator> ScoringBackend for AcceleratedBackend<D> {
    fn name(&self) -> &str {
        self.device.name()
    }

    fn span_sum(&mut self, anchors: &[Anchor]) -> u64 {
        self.issue(Command::SumSpan, |device, _| device.sum_span(anchors))
    }

    fn load_context(&mut self, ctx: &JointContext) {
        // the block must stay put until the device has read it
        self.block = ContextWords::encode(ctx);
        self.issue(Command::LoadParams, |device, block| device.load_params(block))
    }

    fn joint_score(&mut self, anchors: &[Anchor], j: usize) -> Q32 {
        self.issue(Command::JointScore, |device, _| device.joint_score(anchors, j))
    }
}

/// Selectable scoring implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Reference,
    Emulated,
    Rocc,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Reference => "reference",
            BackendKind::Emulated => "emulated",
            BackendKind::Rocc => "rocc",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for BackendKind {
    type Err = AccelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reference" | "software" => Ok(BackendKind::Reference),
            "emulated" => Ok(BackendKind::Emulated),
            "rocc" => Ok(BackendKind::Rocc),
            other => Err(AccelError::DeviceUnavailable(format!(
                "unknown backend '{}' (expected reference, emulated or rocc)",
                other
            ))),
        }
    }
}

/// Instantiate a backend of the given kind.
pub fn create_backend(kind: BackendKind) -> AccelResult<Box<dyn ScoringBackend + Send>> {
    match kind {
        BackendKind::Reference => Ok(Box::new(ReferenceBackend::new())),
        BackendKind::Emulated => Ok(Box::new(AcceleratedBackend::new(EmulatedAccelerator::new()))),
        BackendKind::Rocc => open_rocc(),
    }
}

#[cfg(all(target_arch = "riscv64", feature = "rocc"))]
fn open_rocc() -> AccelResult<Box<dyn ScoringBackend + Send>> {
    let device = crate::rocc::RoccAccelerator::open()?;
    Ok(Box::new(AcceleratedBackend::new(device)))
}

#[cfg(not(all(target_arch = "riscv64", feature = "rocc")))]
fn open_rocc() -> AccelResult<Box<dyn ScoringBackend + Send>> {
    Err(AccelError::DeviceUnavailable(
        "RoCC support requires a riscv64 build with the `rocc` feature".into(),
    ))
}

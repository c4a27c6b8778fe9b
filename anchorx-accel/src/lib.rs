/*!
# AnchorX accelerator backend

Offloads the chaining DP's scoring primitives to a coprocessor. The DP
engine stays unchanged: it only sees a [`ScoringBackend`].

- [`EmulatedAccelerator`] models the device in software and runs anywhere.
- `RoccAccelerator` drives the custom-0 RoCC unit and is only built for
  riscv64 with the `rocc` feature.
*/

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
#[cfg(all(target_arch = "riscv64", feature = "rocc"))]
pub mod rocc;

pub use anchorx_core::ScoringBackend;
pub use backend::{create_backend, AccelStats, AcceleratedBackend, BackendKind};
pub use command::{Command, ContextWords};
pub use device::{Accelerator, EmulatedAccelerator};
pub use error::{AccelError, AccelResult};
#[cfg(all(target_arch = "riscv64", feature = "rocc"))]
pub use rocc::RoccAccelerator;

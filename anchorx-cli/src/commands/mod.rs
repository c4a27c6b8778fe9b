//! Command implementations for the AnchorX CLI

pub mod chain;
pub mod config;
pub mod demo;

use anchorx_accel::{create_backend, BackendKind};
use anchorx_core::ScoringBackend;
use anyhow::Result;

use crate::error::CliError;

/// Open a scoring backend, mapping device errors to a CLI error.
pub(crate) fn open_backend(kind: BackendKind) -> Result<Box<dyn ScoringBackend + Send>> {
    create_backend(kind).map_err(|err| CliError::backend(kind.to_string(), err.to_string()).into())
}

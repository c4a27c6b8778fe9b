//! AnchorX Core Library
//!
//! Anchor chaining DP, the arena allocator behind it, radix sorting and
//! the pluggable scoring backend interface.

pub mod arena;
pub mod chain;
pub mod error;
pub mod fixed;
pub mod radix;
pub mod scoring;
pub mod types;

// Re-export commonly used types and functions
pub use arena::{Arena, ArenaConfig, ArenaStats, Block, BoundedAllocator, CoreAllocator, SystemAllocator};
pub use chain::{chain_dp, ChainParams, Chainer};
pub use error::{ChainError, ChainResult};
pub use fixed::Q32;
pub use radix::{sort_primary128, sort_u64, Pair128, RadixKey};
pub use scoring::{JointContext, ReferenceBackend, ScoringBackend};
pub use types::{Anchor, Chain, ChainOutput, Strand};

/// Version information for the AnchorX core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

const FRAC_BITS: u32 = 32;
const ONE: f64 = (1u64 << FRAC_BITS) as f64;

/// Signed Q32.32 fixed-point number: the integer value is `raw / 2^32`.
///
/// This is the representation scores and scale factors take when they cross
/// the boundary to an accelerator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, Pod, Zeroable,
)]
#[repr(transparent)]
pub struct Q32(pub i64);

impl Q32 {
    pub const ZERO: Q32 = Q32(0);

    pub fn from_f64(value: f64) -> Self {
        Q32((value * ONE).round() as i64)
    }

    pub fn from_f32(value: f32) -> Self {
        Self::from_f64(value as f64)
    }

    pub fn from_int(value: i32) -> Self {
        Q32((value as i64) << FRAC_BITS)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / ONE
    }

    pub fn to_bits(self) -> i64 {
        self.0
    }

    pub fn from_bits(bits: i64) -> Self {
        Q32(bits)
    }

    /// Nearest integer, halves rounding up.
    pub fn round_to_i32(self) -> i32 {
        (self.0.saturating_add(1 << (FRAC_BITS - 1)) >> FRAC_BITS) as i32
    }
}

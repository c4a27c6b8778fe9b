//! Scoring primitives consumed by the chaining DP.
//!
//! The DP engine never computes a pairwise score itself. It loads the
//! context of the anchor under evaluation into a [`ScoringBackend`] and asks
//! for one joint score per admissible predecessor. Fractional quantities
//! cross the backend boundary as [`Q32`] values.

use serde::{Deserialize, Serialize};

use crate::fixed::Q32;
use crate::types::Anchor;

/// Number of 64-bit words in an encoded [`JointContext`].
pub const CONTEXT_WORDS: usize = 7;

/// Per-anchor state a backend scores predecessors against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JointContext {
    pub is_spliced: bool,
    pub ref_pos: u64,
    pub query_pos: i32,
    pub span: i32,
    pub segment: i32,
    pub avg_span: Q32,
    pub gap_scale: Q32,
}

impl JointContext {
    pub fn new(is_spliced: bool, anchor: &Anchor, avg_span: f32, gap_scale: f32) -> Self {
        Self {
            is_spliced,
            ref_pos: anchor.ref_key(),
            query_pos: anchor.query_pos(),
            span: anchor.span(),
            segment: anchor.segment(),
            avg_span: Q32::from_f32(avg_span),
            gap_scale: Q32::from_f32(gap_scale),
        }
    }

    /// Device parameter block, one signed word per field in declaration order.
    pub fn to_words(&self) -> [i64; CONTEXT_WORDS] {
        [
            self.is_spliced as i64,
            self.ref_pos as i64,
            self.query_pos as i64,
            self.span as i64,
            self.segment as i64,
            self.avg_span.to_bits(),
            self.gap_scale.to_bits(),
        ]
    }

    pub fn from_words(words: &[i64; CONTEXT_WORDS]) -> Self {
        Self {
            is_spliced: words[0] != 0,
            ref_pos: words[1] as u64,
            query_pos: words[2] as i32,
            span: words[3] as i32,
            segment: words[4] as i32,
            avg_span: Q32::from_bits(words[5]),
            gap_scale: Q32::from_bits(words[6]),
        }
    }
}

/// Reference and query gaps from a predecessor to the loaded anchor.
///
/// Reference coordinates wrap as unsigned 64-bit values and query positions
/// as 32-bit values; `dd` is truncated to 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gaps {
    pub dr: i64,
    pub dq: i32,
    pub dd: i32,
}

impl Gaps {
    #[inline]
    pub fn between(ctx: &JointContext, pred: &Anchor) -> Self {
        let dr = ctx.ref_pos.wrapping_sub(pred.ref_key()) as i64;
        let dq = ctx.query_pos.wrapping_sub(pred.query_pos());
        let dq64 = dq as i64;
        let dd = if dr > dq64 {
            dr.wrapping_sub(dq64)
        } else {
            dq64.wrapping_sub(dr)
        } as i32;
        Self { dr, dq, dd }
    }
}

/// Integer joint score of `pred` followed by the loaded anchor:
/// match score minus the scaled gap cost.
pub fn joint_score(ctx: &JointContext, pred: &Anchor) -> i32 {
    let Gaps { dr, dq, dd } = Gaps::between(ctx, pred);
    let min_d = (dq as i64).min(dr) as i32;
    let mut sc = min_d.min(ctx.span);
    let log_dd = if dd != 0 { (dd as u32).ilog2() as i32 } else { 0 };
    let avg_span = ctx.avg_span.to_f64();
    let c_lin = (dd as f64 * 0.01 * avg_span) as i32;
    let other_segment = ctx.segment != pred.segment();

    let gap_cost = if ctx.is_spliced || other_segment {
        if other_segment && dr == 0 {
            // overlapping paired ends get a small bonus instead
            sc += 1;
            0
        } else if dr > dq as i64 || other_segment {
            c_lin.min(log_dd)
        } else {
            c_lin + (log_dd >> 1)
        }
    } else {
        c_lin + (log_dd >> 1)
    };

    sc - (gap_cost as f64 * ctx.gap_scale.to_f64() + 0.499) as i32
}

/// Span and pairwise scoring primitives behind the DP.
pub trait ScoringBackend {
    fn name(&self) -> &str;

    /// Sum of the span fields of `anchors`.
    fn span_sum(&mut self, anchors: &[Anchor]) -> u64;

    /// Make `ctx` the anchor that subsequent joint scores refer to.
    fn load_context(&mut self, ctx: &JointContext);

    /// Joint score of predecessor `anchors[j]` against the loaded context.
    fn joint_score(&mut self, anchors: &[Anchor], j: usize) -> Q32;
}

/// Pure software backend.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBackend {
    ctx: JointContext,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> &JointContext {
        &self.ctx
    }
}

impl ScoringBackend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn span_sum(&mut self, anchors: &[Anchor]) -> u64 {
        anchors.iter().map(|a| a.span() as u64).sum()
    }

    fn load_context(&mut self, ctx: &JointContext) {
        self.ctx = *ctx;
    }

    fn joint_score(&mut self, anchors: &[Anchor], j: usize) -> Q32 {
        Q32::from_int(joint_score(&self.ctx, &anchors[j]))
    }
}

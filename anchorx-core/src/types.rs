use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Bit offset of the span length inside a packed query field.
pub const SPAN_SHIFT: u32 = 32;
/// Only 8 bits of span are kept.
pub const SPAN_MASK: u64 = 0xff;
/// Bit offset of the segment id inside a packed query field.
pub const SEG_SHIFT: u32 = 48;
pub const SEG_MASK: u64 = 0xff;

/// A seed match between a query and a reference.
///
/// `ref_pos` is compared as an unsigned 64-bit key by the chaining code; its
/// top bit conventionally carries the strand. Chaining input must be
/// non-decreasing by [`Anchor::ref_key`], not by the signed `ref_pos`.
///
/// `query_field` packs the query position (bits 0..32), the match span
/// (bits 32..40) and the segment id (bits 48..56).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Anchor {
    pub ref_pos: i64,
    pub query_field: u64,
}

impl Anchor {
    pub fn new(ref_pos: i64, query_pos: u32, span: u8, segment: u8) -> Self {
        Self {
            ref_pos,
            query_field: (segment as u64) << SEG_SHIFT
                | (span as u64) << SPAN_SHIFT
                | query_pos as u64,
        }
    }

    pub fn from_raw(ref_pos: i64, query_field: u64) -> Self {
        Self { ref_pos, query_field }
    }

    /// Reference coordinate as the unsigned key used for windowing and sorting.
    #[inline]
    pub fn ref_key(&self) -> u64 {
        self.ref_pos as u64
    }

    #[inline]
    pub fn query_pos(&self) -> i32 {
        self.query_field as i32
    }

    #[inline]
    pub fn span(&self) -> i32 {
        (self.query_field >> SPAN_SHIFT & SPAN_MASK) as i32
    }

    #[inline]
    pub fn segment(&self) -> i32 {
        (self.query_field >> SEG_SHIFT & SEG_MASK) as i32
    }

    pub fn strand(&self) -> Strand {
        Strand::from(self.ref_key() >> 63 == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl From<bool> for Strand {
    fn from(forward: bool) -> Self {
        if forward {
            Strand::Forward
        } else {
            Strand::Reverse
        }
    }
}

impl From<Strand> for char {
    fn from(strand: Strand) -> Self {
        match strand {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// Score and member count of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chain {
    pub score: i32,
    pub count: i32,
}

impl Chain {
    /// Decode the `score << 32 | count` word used inside the DP engine.
    pub fn from_packed(word: u64) -> Self {
        Self {
            score: (word >> 32) as i32,
            count: word as i32,
        }
    }

    pub fn packed(&self) -> u64 {
        (self.score as u32 as u64) << 32 | self.count as u32 as u64
    }
}

/// Result of one chaining call, copied out of the arena.
///
/// `anchors` holds the members of every chain back to back, chains in
/// ascending order of their first member's reference key and members in
/// ascending reference order within a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOutput {
    pub anchors: Vec<Anchor>,
    pub chains: Vec<Chain>,
}

impl ChainOutput {
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Iterate chains together with their member anchors.
    pub fn iter(&self) -> impl Iterator<Item = (&Chain, &[Anchor])> + '_ {
        let mut offset = 0usize;
        self.chains.iter().map(move |chain| {
            let start = offset;
            offset += chain.count as usize;
            (chain, &self.anchors[start..offset])
        })
    }
}

//! In-place most-significant-digit radix sort on 64-bit keys.
//!
//! Buckets are 8 bits wide and processed from the top byte down. Each pass
//! permutes elements into place by following cycles, so no auxiliary buffer
//! the size of the input is needed. Partitions below a size threshold are
//! finished with insertion sort. The sort is not stable.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::types::Anchor;

/// Partitions at or below this length are finished by insertion sort.
pub const RS_MIN_SIZE: usize = 64;
/// Bucket width in bits.
pub const RS_MAX_BITS: u32 = 8;
const RS_BUCKETS: usize = 1 << RS_MAX_BITS;
const RS_BUCKET_MASK: u64 = RS_BUCKETS as u64 - 1;
const RS_FIRST_SHIFT: u32 = 64 - RS_MAX_BITS;

/// Anything with a 64-bit unsigned sort key.
pub trait RadixKey: Copy {
    fn radix_key(&self) -> u64;
}

impl RadixKey for u64 {
    #[inline]
    fn radix_key(&self) -> u64 {
        *self
    }
}

impl RadixKey for Anchor {
    #[inline]
    fn radix_key(&self) -> u64 {
        self.ref_key()
    }
}

/// Two-word record keyed on its first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Pair128 {
    pub x: u64,
    pub y: u64,
}

impl RadixKey for Pair128 {
    #[inline]
    fn radix_key(&self) -> u64 {
        self.x
    }
}

/// Sort by ascending [`RadixKey::radix_key`].
pub fn sort<T: RadixKey>(items: &mut [T]) {
    if items.len() <= 1 {
        return;
    }
    if items.len() <= RS_MIN_SIZE {
        insertion_sort(items);
    } else {
        rs_sort(items, RS_FIRST_SHIFT);
    }
}

pub fn sort_u64(keys: &mut [u64]) {
    sort(keys);
}

/// Sort two-word records by their first word only.
pub fn sort_primary128(pairs: &mut [Pair128]) {
    sort(pairs);
}

/// Plain insertion sort by key.
pub fn insertion_sort<T: RadixKey>(items: &mut [T]) {
    for i in 1..items.len() {
        let item = items[i];
        let key = item.radix_key();
        let mut j = i;
        while j > 0 && key < items[j - 1].radix_key() {
            items[j] = items[j - 1];
            j -= 1;
        }
        items[j] = item;
    }
}

fn rs_sort<T: RadixKey>(items: &mut [T], shift: u32) {
    let bucket = |item: &T| ((item.radix_key() >> shift) & RS_BUCKET_MASK) as usize;

    let mut begin = [0usize; RS_BUCKETS];
    let mut end = [0usize; RS_BUCKETS];
    for item in items.iter() {
        end[bucket(item)] += 1;
    }
    let mut offset = 0;
    for b in 0..RS_BUCKETS {
        begin[b] = offset;
        offset += end[b];
        end[b] = offset;
    }

    // begin[b] advances as bucket b fills; end[b] stays fixed
    for b in 0..RS_BUCKETS {
        while begin[b] != end[b] {
            let mut carried = items[begin[b]];
            let mut target = bucket(&carried);
            if target == b {
                begin[b] += 1;
                continue;
            }
            loop {
                let slot = begin[target];
                begin[target] += 1;
                std::mem::swap(&mut carried, &mut items[slot]);
                target = bucket(&carried);
                if target == b {
                    break;
                }
            }
            items[begin[b]] = carried;
            begin[b] += 1;
        }
    }

    if shift == 0 {
        return;
    }
    let next_shift = shift.saturating_sub(RS_MAX_BITS);
    let mut start = 0;
    for &stop in end.iter() {
        let part = &mut items[start..stop];
        if part.len() > RS_MIN_SIZE {
            rs_sort(part, next_shift);
        } else if part.len() > 1 {
            insertion_sort(part);
        }
        start = stop;
    }
}

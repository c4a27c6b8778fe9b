//! Pooled allocator for the scratch and output buffers of a chaining call.
//!
//! Memory is handed out in 16-byte units from one or more cores obtained
//! from a [`CoreAllocator`]. Blocks are addressed by a virtual unit index
//! rather than a pointer: core `k` covers `[base_k, base_k + len_k)` and the
//! next core starts one unit later, so blocks of different cores are never
//! address-adjacent and never merge.
//!
//! Free blocks form a circular singly-linked list threaded through their own
//! headers (word 0 = size in units, word 1 = next free address), ordered by
//! address apart from one wrap point. A zero-sized sentinel at address 0 is
//! always on the list. An allocated block keeps its unit count in word 0 and
//! exposes the remaining `units * 16 - 8` bytes as payload.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::fatal;

/// Size of one allocation unit (a two-word header).
pub const UNIT_BYTES: usize = 16;
const WORD_BYTES: usize = 8;
/// Core granularity used when none is configured.
pub const DEFAULT_MIN_CORE_UNITS: usize = 0x80000;
const SENTINEL: usize = 0;

/// Source of the large regions an [`Arena`] carves blocks from.
pub trait CoreAllocator: Send {
    /// Return a zero-filled region of `words` 64-bit words, or `None` when
    /// the request cannot be met.
    fn allocate_core(&mut self, words: usize) -> Option<Box<[u64]>>;

    fn release_core(&mut self, core: Box<[u64]>) {
        drop(core);
    }
}

/// Cores straight from the process heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl CoreAllocator for SystemAllocator {
    fn allocate_core(&mut self, words: usize) -> Option<Box<[u64]>> {
        let mut core = Vec::new();
        core.try_reserve_exact(words).ok()?;
        core.resize(words, 0);
        Some(core.into_boxed_slice())
    }
}

/// Process-heap cores under a fixed byte budget.
#[derive(Debug, Clone)]
pub struct BoundedAllocator {
    limit_bytes: usize,
    in_use: usize,
}

impl BoundedAllocator {
    pub fn new(limit_bytes: usize) -> Self {
        Self { limit_bytes, in_use: 0 }
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }
}

impl CoreAllocator for BoundedAllocator {
    fn allocate_core(&mut self, words: usize) -> Option<Box<[u64]>> {
        let bytes = words.checked_mul(WORD_BYTES)?;
        let total = self.in_use.checked_add(bytes)?;
        if total > self.limit_bytes {
            log::debug!(
                "core of {} bytes refused: {} of {} bytes already in use",
                bytes,
                self.in_use,
                self.limit_bytes
            );
            return None;
        }
        let core = SystemAllocator.allocate_core(words)?;
        self.in_use = total;
        Some(core)
    }

    fn release_core(&mut self, core: Box<[u64]>) {
        self.in_use = self.in_use.saturating_sub(core.len() * WORD_BYTES);
    }
}

/// Arena settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Minimum core size in 16-byte units
    #[serde(default = "default_min_core_units")]
    pub min_core_units: usize,

    /// Upper bound on memory held by one arena, in MiB
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
}

fn default_min_core_units() -> usize {
    DEFAULT_MIN_CORE_UNITS
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            min_core_units: default_min_core_units(),
            max_memory_mb: None,
        }
    }
}

/// Free-list inconsistencies. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Corruption {
    #[error("[free] The end of the allocated block enters a free block.")]
    BlockEntersFreeBlock,
    #[error("[free] The end of a free block enters the allocated block.")]
    FreeBlockEntersBlock,
    #[error("[stat] The end of a free block enters another free block.")]
    FreeBlocksOverlap,
    #[error("[arena] Address {0} does not belong to any core.")]
    UnknownAddress(usize),
}

/// Handle to a live allocation. Not `Clone`: freeing consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    addr: usize,
}

impl Block {
    /// Virtual unit address of the block header.
    pub fn addr(&self) -> usize {
        self.addr
    }
}

/// Usage summary of an arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Bytes on the free list
    pub available: usize,
    /// Non-empty free blocks
    pub n_blocks: usize,
    pub n_cores: usize,
    /// Bytes held in all cores
    pub capacity: usize,
    /// Bytes in the largest core
    pub largest: usize,
}

struct Core {
    base: usize,
    mem: Box<[u64]>,
}

impl Core {
    fn units(&self) -> usize {
        self.mem.len() / 2
    }
}

/// Pool allocator owning every buffer of one chaining session.
///
/// Not internally synchronized; use one arena per in-flight call.
pub struct Arena {
    backing: Box<dyn CoreAllocator>,
    min_core_units: usize,
    sentinel_next: usize,
    loop_head: Option<usize>,
    cores: Vec<Core>,
    next_base: usize,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("min_core_units", &self.min_core_units)
            .field("cores", &self.cores.len())
            .field("loop_head", &self.loop_head)
            .finish()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self::with_backing(Box::new(SystemAllocator), 0)
    }

    /// Arena over the process heap; `min_core_units == 0` selects the default.
    pub fn with_min_core(min_core_units: usize) -> Self {
        Self::with_backing(Box::new(SystemAllocator), min_core_units)
    }

    pub fn with_backing(backing: Box<dyn CoreAllocator>, min_core_units: usize) -> Self {
        Self {
            backing,
            min_core_units: if min_core_units > 0 {
                min_core_units
            } else {
                DEFAULT_MIN_CORE_UNITS
            },
            sentinel_next: SENTINEL,
            loop_head: None,
            cores: Vec::new(),
            next_base: SENTINEL + 1,
        }
    }

    pub fn from_config(config: &ArenaConfig) -> Self {
        match config.max_memory_mb {
            Some(mb) => {
                let limit = usize::try_from(mb)
                    .ok()
                    .and_then(|mb| mb.checked_mul(1 << 20))
                    .unwrap_or(usize::MAX);
                Self::with_backing(Box::new(BoundedAllocator::new(limit)), config.min_core_units)
            }
            None => Self::with_min_core(config.min_core_units),
        }
    }

    /// Release every core back to the backing allocator.
    pub fn destroy(self) {
        drop(self);
    }

    pub fn min_core_units(&self) -> usize {
        self.min_core_units
    }

    /// Allocate at least `n_bytes` of payload. Zero bytes yields `None`.
    pub fn allocate(&mut self, n_bytes: usize) -> Option<Block> {
        if n_bytes == 0 {
            return None;
        }
        let n_units = units_for(n_bytes);
        let mut q = match self.loop_head {
            Some(head) => head,
            None => {
                self.sentinel_next = SENTINEL;
                self.loop_head = Some(SENTINEL);
                SENTINEL
            }
        };
        let mut p = self.next(q);
        loop {
            let size = self.size(p);
            if size >= n_units {
                let addr = if size == n_units {
                    let after = self.next(p);
                    self.set_next(q, after);
                    p
                } else {
                    // carve from the tail so the free header stays put
                    let rest = size - n_units;
                    self.set_size(p, rest);
                    let addr = p + rest;
                    self.set_size(addr, n_units);
                    addr
                };
                self.loop_head = Some(q);
                return Some(Block { addr });
            }
            if Some(p) == self.loop_head {
                p = self.morecore(n_units);
            }
            q = p;
            p = self.next(p);
        }
    }

    /// Return a block to the free list, merging with free neighbors.
    pub fn free(&mut self, block: Block) {
        if let Err(err) = self.release(block.addr) {
            fatal(&err.to_string());
        }
    }

    /// [`Arena::free`] for a possibly empty handle, such as a zero-byte
    /// allocation result. `None` is a no-op.
    pub fn free_opt(&mut self, block: Option<Block>) {
        if let Some(block) = block {
            self.free(block);
        }
    }

    /// Grow a block. Never shrinks; a zero size frees and yields `None`.
    pub fn reallocate(&mut self, block: Option<Block>, n_bytes: usize) -> Option<Block> {
        if n_bytes == 0 {
            self.free_opt(block);
            return None;
        }
        let Some(block) = block else {
            return self.allocate(n_bytes);
        };
        if self.capacity(&block) >= n_bytes {
            return Some(block);
        }
        let grown = self.allocate(n_bytes)?;
        {
            let [old, new] = self.slices_mut([&block, &grown]);
            new[..old.len()].copy_from_slice(old);
        }
        self.free(block);
        Some(grown)
    }

    /// Allocate `count * elem_size` zeroed bytes.
    pub fn zeroed_allocate(&mut self, count: usize, elem_size: usize) -> Option<Block> {
        if count == 0 || elem_size == 0 {
            return None;
        }
        let n_bytes = count
            .checked_mul(elem_size)
            .unwrap_or_else(|| fatal("[zeroed_allocate] size overflow"));
        let block = self.allocate(n_bytes)?;
        self.payload_mut(&block).fill(0);
        Some(block)
    }

    /// Usable payload bytes of a block.
    pub fn capacity(&self, block: &Block) -> usize {
        self.size(block.addr) * UNIT_BYTES - WORD_BYTES
    }

    /// Bytes a block takes out of its core, header included.
    pub fn footprint(&self, block: &Block) -> usize {
        self.size(block.addr) * UNIT_BYTES
    }

    pub fn payload(&self, block: &Block) -> &[u64] {
        let (ci, off) = self.locate(block.addr);
        let units = self.size(block.addr);
        &self.cores[ci].mem[off + 1..off + 2 * units]
    }

    pub fn payload_mut(&mut self, block: &Block) -> &mut [u64] {
        let (ci, off) = self.locate(block.addr);
        let units = self.size(block.addr);
        &mut self.cores[ci].mem[off + 1..off + 2 * units]
    }

    /// First `len` elements of a block's payload viewed as `T`.
    pub fn slice<T: Pod>(&self, block: &Block, len: usize) -> &[T] {
        view(self.payload(block), len)
    }

    pub fn slice_mut<T: Pod>(&mut self, block: &Block, len: usize) -> &mut [T] {
        view_mut(self.payload_mut(block), len)
    }

    /// Payloads of several distinct blocks at once.
    ///
    /// Panics if two handles refer to overlapping memory.
    pub fn slices_mut<const N: usize>(&mut self, blocks: [&Block; N]) -> [&mut [u64]; N] {
        let mut spans: [(usize, usize, usize, usize); N] = std::array::from_fn(|slot| {
            let (ci, off) = self.locate(blocks[slot].addr);
            let units = self.size(blocks[slot].addr);
            (ci, off + 1, off + 2 * units, slot)
        });
        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(
                pair[0].0 != pair[1].0 || pair[0].2 <= pair[1].1,
                "overlapping arena blocks"
            );
        }

        let mut out: [&mut [u64]; N] = std::array::from_fn(|_| <&mut [u64]>::default());
        let mut k = 0;
        for (ci, core) in self.cores.iter_mut().enumerate() {
            let mut rest: &mut [u64] = &mut core.mem[..];
            let mut consumed = 0;
            while k < N && spans[k].0 == ci {
                let (_, start, end, slot) = spans[k];
                let tail = std::mem::take(&mut rest);
                let (_, tail) = tail.split_at_mut(start - consumed);
                let (chunk, tail) = tail.split_at_mut(end - start);
                out[slot] = chunk;
                rest = tail;
                consumed = end;
                k += 1;
            }
        }
        out
    }

    /// Walk the free list and the core list.
    pub fn stat(&self) -> ArenaStats {
        match self.walk() {
            Ok(stats) => stats,
            Err(err) => fatal(&err.to_string()),
        }
    }

    fn walk(&self) -> Result<ArenaStats, Corruption> {
        let mut stats = ArenaStats::default();
        let Some(head) = self.loop_head else {
            return Ok(stats);
        };
        let mut p = head;
        loop {
            let size = self.size(p);
            stats.available += size * UNIT_BYTES;
            if size != 0 {
                stats.n_blocks += 1;
            }
            let next = self.next(p);
            if next > p && p + size > next {
                return Err(Corruption::FreeBlocksOverlap);
            }
            if next == head {
                break;
            }
            p = next;
        }
        for core in &self.cores {
            let bytes = core.units() * UNIT_BYTES;
            stats.n_cores += 1;
            stats.capacity += bytes;
            stats.largest = stats.largest.max(bytes);
        }
        Ok(stats)
    }

    /// Obtain a new core large enough for `n_units` and put it on the free list.
    fn morecore(&mut self, n_units: usize) -> usize {
        let units = n_units
            .div_ceil(self.min_core_units)
            .checked_mul(self.min_core_units)
            .unwrap_or_else(|| fatal("[morecore] insufficient memory"));
        let words = units
            .checked_mul(2)
            .unwrap_or_else(|| fatal("[morecore] insufficient memory"));
        let mem = self
            .backing
            .allocate_core(words)
            .unwrap_or_else(|| fatal("[morecore] insufficient memory"));
        let base = self.next_base;
        self.next_base = base
            .checked_add(units + 1)
            .unwrap_or_else(|| fatal("[morecore] address space exhausted"));
        log::trace!("new core of {} units at {}", units, base);
        self.cores.push(Core { base, mem });
        self.set_size(base, units);
        if let Err(err) = self.release(base) {
            fatal(&err.to_string());
        }
        self.loop_head.unwrap_or(SENTINEL)
    }

    /// Link the block at `p` into the free list.
    fn release(&mut self, p: usize) -> Result<(), Corruption> {
        if self.loop_head.is_none() {
            self.sentinel_next = SENTINEL;
            self.loop_head = Some(SENTINEL);
        }
        self.try_locate(p)?;
        let mut q = self.loop_head.unwrap_or(SENTINEL);
        // stop where p sits strictly between q and its successor, or at the
        // wrap node when p lies beyond either end of the list
        loop {
            let qn = self.next(q);
            if p > q && p < qn {
                break;
            }
            if q >= qn && (p > q || p < qn) {
                break;
            }
            q = qn;
        }

        let qn = self.next(q);
        let p_end = p + self.size(p);
        if p_end == qn {
            let merged = self.size(p) + self.size(qn);
            let after = self.next(qn);
            self.set_size(p, merged);
            self.set_next(p, after);
        } else if p_end > qn && qn >= p {
            return Err(Corruption::BlockEntersFreeBlock);
        } else {
            self.set_next(p, qn);
        }

        let q_end = q + self.size(q);
        if q_end == p {
            let merged = self.size(q) + self.size(p);
            let after = self.next(p);
            self.set_size(q, merged);
            self.set_next(q, after);
            self.loop_head = Some(q);
        } else if q_end > p && p >= q {
            return Err(Corruption::FreeBlockEntersBlock);
        } else {
            self.loop_head = Some(p);
            self.set_next(q, p);
        }
        Ok(())
    }

    fn try_locate(&self, addr: usize) -> Result<(usize, usize), Corruption> {
        let ci = self.cores.partition_point(|core| core.base <= addr);
        if ci == 0 {
            return Err(Corruption::UnknownAddress(addr));
        }
        let core = &self.cores[ci - 1];
        let off = (addr - core.base) * 2;
        if off >= core.mem.len() {
            return Err(Corruption::UnknownAddress(addr));
        }
        Ok((ci - 1, off))
    }

    fn locate(&self, addr: usize) -> (usize, usize) {
        match self.try_locate(addr) {
            Ok(found) => found,
            Err(err) => fatal(&err.to_string()),
        }
    }

    fn size(&self, addr: usize) -> usize {
        if addr == SENTINEL {
            return 0;
        }
        let (ci, off) = self.locate(addr);
        self.cores[ci].mem[off] as usize
    }

    fn next(&self, addr: usize) -> usize {
        if addr == SENTINEL {
            return self.sentinel_next;
        }
        let (ci, off) = self.locate(addr);
        self.cores[ci].mem[off + 1] as usize
    }

    fn set_size(&mut self, addr: usize, size: usize) {
        debug_assert_ne!(addr, SENTINEL, "sentinel is always empty");
        let (ci, off) = self.locate(addr);
        self.cores[ci].mem[off] = size as u64;
    }

    fn set_next(&mut self, addr: usize, next: usize) {
        if addr == SENTINEL {
            self.sentinel_next = next;
            return;
        }
        let (ci, off) = self.locate(addr);
        self.cores[ci].mem[off + 1] = next as u64;
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for core in self.cores.drain(..) {
            self.backing.release_core(core.mem);
        }
    }
}

/// Units needed for a header word plus `n_bytes` of payload.
fn units_for(n_bytes: usize) -> usize {
    n_bytes
        .checked_add(WORD_BYTES + UNIT_BYTES - 1)
        .map(|total| total / UNIT_BYTES)
        .unwrap_or_else(|| fatal("[allocate] size overflow"))
}

/// First `len` elements of a payload viewed as `T`.
pub fn view<T: Pod>(words: &[u64], len: usize) -> &[T] {
    let bytes: &[u8] = bytemuck::cast_slice(words);
    bytemuck::cast_slice(&bytes[..len * std::mem::size_of::<T>()])
}

pub fn view_mut<T: Pod>(words: &mut [u64], len: usize) -> &mut [T] {
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(words);
    bytemuck::cast_slice_mut(&mut bytes[..len * std::mem::size_of::<T>()])
}

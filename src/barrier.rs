//! Barrier Engine
//!
//! Derives the minimal pipeline-barrier work from consecutive
//! `(previous state, next use)` pairs and batches it per pass phase.
//!
//! # Rules
//!
//! - A write is never coalesced with any earlier access.
//! - A read coalesces with a previous read when stages and layout match;
//!   everything else emits a barrier.
//! - A layout change always emits a transition, even with identical masks.
//! - A queue change always emits a release/acquire pair, even with identical
//!   masks and layout.
//! - An aliasing hand-over pairs the previous resource's last use with the
//!   next resource's first use; texture destinations transition from
//!   `Undefined` so prior contents are discarded.
//!
//! Barriers here are *planned*: they reference graph resources by index and
//! are resolved to backend handles only at execution time, which keeps the
//! compiled plan pure data and byte-comparable across runs.

use smallvec::SmallVec;

use crate::pass::UseDecl;
use crate::resource::{BufferRef, TextureRef, TrackedState};
use crate::rhi::{
    Accesses, OwnershipTransfer, PipelineStages, SubresourceKey, SubresourceRange, TextureLayout,
};

// ─── Planned Barriers ─────────────────────────────────────────────────────────

/// A buffer barrier in plan terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBufferBarrier {
    pub buffer: BufferRef,
    pub src_stages: PipelineStages,
    pub src_accesses: Accesses,
    pub dst_stages: PipelineStages,
    pub dst_accesses: Accesses,
    pub ownership: Option<OwnershipTransfer>,
}

/// A texture barrier in plan terms, covering a subresource range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTextureBarrier {
    pub texture: TextureRef,
    pub range: SubresourceRange,
    pub src_stages: PipelineStages,
    pub src_accesses: Accesses,
    pub old_layout: TextureLayout,
    pub dst_stages: PipelineStages,
    pub dst_accesses: Accesses,
    pub new_layout: TextureLayout,
    pub ownership: Option<OwnershipTransfer>,
}

/// Every barrier attached to one pass phase (before or after the callback).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarrierSet {
    pub buffers: Vec<PlannedBufferBarrier>,
    pub textures: Vec<PlannedTextureBarrier>,
}

impl BarrierSet {
    /// Returns `true` when no barrier is attached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }

    /// Total number of barriers in the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }
}

// ─── Transition Classification ────────────────────────────────────────────────

/// Whether stepping a subresource from `prev` into `next` on the same queue
/// requires a barrier.
///
/// The tracked state of a never-touched resource (empty masks, `Undefined`
/// layout for the buffer case) produces no barrier: there is nothing to
/// synchronize against and no transition to perform.
#[must_use]
pub fn needs_barrier(prev: &TrackedState, next: UseDecl, is_texture: bool) -> bool {
    if is_texture && prev.layout != next.layout {
        return true;
    }
    if prev.accesses.is_empty() && prev.stages.is_empty() {
        // No producer yet; a buffer's first use starts clean.
        return false;
    }
    let read_after_read = prev.accesses.is_read_only() && next.accesses.is_read_only();
    !(read_after_read && prev.stages == next.stages)
}

// ─── Range Collapse ───────────────────────────────────────────────────────────

/// Collapses subresource keys that share identical barrier parameters into
/// the smallest set of contiguous ranges.
///
/// Keys of one aspect collapse per layer into contiguous mip runs; layers
/// sharing one identical run merge into a layered range. Aspects never merge
/// with each other. The union of the output covers every input key exactly
/// once.
#[must_use]
pub fn collapse_keys(keys: &mut SmallVec<[SubresourceKey; 8]>) -> SmallVec<[SubresourceRange; 4]> {
    keys.sort_unstable();
    keys.dedup();

    let mut ranges: SmallVec<[SubresourceRange; 4]> = SmallVec::new();
    let mut cursor = 0;
    while cursor < keys.len() {
        let aspect = keys[cursor].aspect;
        let end = keys[cursor..]
            .iter()
            .position(|k| k.aspect != aspect)
            .map_or(keys.len(), |offset| cursor + offset);
        collapse_aspect(&keys[cursor..end], &mut ranges);
        cursor = end;
    }
    ranges
}

/// Collapses the keys of one aspect (sorted by `(layer, mip)`).
fn collapse_aspect(keys: &[SubresourceKey], out: &mut SmallVec<[SubresourceRange; 4]>) {
    // Per-layer contiguous mip runs.
    let mut runs: SmallVec<[(u32, u32, u32); 8]> = SmallVec::new(); // (layer, base_mip, count)
    for key in keys {
        match runs.last_mut() {
            Some((layer, base, count)) if *layer == key.layer && *base + *count == key.mip => {
                *count += 1;
            }
            _ => runs.push((key.layer, key.mip, 1)),
        }
    }

    // Merge consecutive layers whose single run is identical.
    let mut index = 0;
    while index < runs.len() {
        let (layer, base_mip, mip_count) = runs[index];
        let mut layer_count = 1;
        while index + (layer_count as usize) < runs.len() {
            let (next_layer, next_base, next_count) = runs[index + layer_count as usize];
            if next_layer == layer + layer_count && next_base == base_mip && next_count == mip_count
            {
                layer_count += 1;
            } else {
                break;
            }
        }
        out.push(SubresourceRange {
            aspects: keys[0].aspect.mask(),
            base_mip,
            mip_count,
            base_layer: layer,
            layer_count,
        });
        index += layer_count as usize;
    }
}

//! Transient Memory Allocator
//!
//! Backs every internal resource of a frame with a slice of pooled GPU
//! memory, aliasing slices across non-overlapping lifetimes.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  TransientAllocator                       │
//! │                                                          │
//! │  free:    [FreeSegment]   ←── survives across frames     │
//! │  recycle: [(QueueSync, [FreeSegment])]                   │
//! │                                                          │
//! │  allocate_frame()  → placements + alias pairs            │
//! │  retire_frame()    (after submit, gates reuse on sync)   │
//! │  reclaim()         (start of frame, drains recycle)      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each frame's requests become a chronological event list:
//! `Allocate` at `2 × first_use` and `Release` at `2 × last_use + 1`.
//! Processing in order yields first-fit placements inside per-category
//! free-segment sets; releasing returns a slice for later requests of the
//! same frame to alias. An interval tracker reports which released resources
//! a new placement overlaps, so the executor can emit aliasing barriers.
//!
//! # Memory Strategy
//!
//! - Aliasing only happens inside one `(category, alignment class)` wall;
//!   a Regular request may fall back onto an MSAA slice, never the reverse.
//! - Memory blocks come from the external [`TransientMemoryPool`] service
//!   and are sub-divided here; freed slices merge with their neighbours.
//! - Slices touched by a frame re-enter the free set only once that frame's
//!   [`QueueSync`] reports completion; untouched slices return immediately.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{Result, SableError};
use crate::resource::ResourceRef;
use crate::rhi::{
    HeapAlignmentClass, HeapTier, MemoryBlockId, QueueSync, ResourceCategory, TextureDesc,
    TextureUsages, TransientMemoryPool,
};

// ─── Category Classification ──────────────────────────────────────────────────

/// The aliasing category of a transient buffer.
#[inline]
#[must_use]
pub fn buffer_category(tier: HeapTier) -> ResourceCategory {
    match tier {
        HeapTier::Tier2 => ResourceCategory::General,
        HeapTier::Tier1 => ResourceCategory::Buffer,
    }
}

/// The aliasing category of a transient texture.
#[must_use]
pub fn texture_category(tier: HeapTier, desc: &TextureDesc) -> ResourceCategory {
    if tier == HeapTier::Tier2 {
        return ResourceCategory::General;
    }
    let rt_ds = desc.usage.intersects(
        TextureUsages::COLOR_ATTACHMENT
            | TextureUsages::DEPTH_STENCIL_ATTACHMENT
            | TextureUsages::CLEAR_COLOR,
    );
    if rt_ds {
        ResourceCategory::RtDsTexture
    } else {
        ResourceCategory::NonRtDsTexture
    }
}

/// The heap alignment class of a transient texture.
#[inline]
#[must_use]
pub fn texture_alignment_class(desc: &TextureDesc) -> HeapAlignmentClass {
    if desc.sample_count != 1 {
        HeapAlignmentClass::Msaa
    } else {
        HeapAlignmentClass::Regular
    }
}

// ─── Request / Result Types ───────────────────────────────────────────────────

/// One frame-transient allocation request, derived from a
/// [`TransientLifetime`](crate::compile::TransientLifetime) plus backend
/// allocation info.
#[derive(Debug, Clone)]
pub struct TransientRequest {
    pub resource: ResourceRef,
    /// Display name, for capacity-error reporting.
    pub name: String,
    pub category: ResourceCategory,
    pub alignment_class: HeapAlignmentClass,
    pub size: u64,
    pub alignment: u64,
    /// Plan-order position of the first use.
    pub first_use: u32,
    /// Plan-order position of the last use.
    pub last_use: u32,
}

/// Where one transient resource landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub resource: ResourceRef,
    pub block: MemoryBlockId,
    pub offset: u64,
    pub size: u64,
}

/// Two resources sharing memory: `after` reuses (part of) `before`'s slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasedPair {
    pub before: ResourceRef,
    pub after: ResourceRef,
}

/// Output of one frame's allocation pass.
#[derive(Debug, Default)]
pub struct FrameAllocation {
    /// One placement per request, in request order.
    pub placements: Vec<Placement>,
    /// Aliasing hand-overs the executor must barrier.
    pub alias_pairs: Vec<AliasedPair>,
}

// ─── Internal Types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct FreeSegment {
    block: MemoryBlockId,
    offset: u64,
    size: u64,
}

#[derive(Debug, Clone, Copy)]
struct BlockInfo {
    category: ResourceCategory,
    alignment_class: HeapAlignmentClass,
}

struct RecycleEntry {
    sync: Arc<dyn QueueSync>,
    segments: Vec<FreeSegment>,
}

#[derive(Debug, Clone, Copy)]
struct Occupant {
    resource: ResourceRef,
    offset: u64,
    size: u64,
}

/// Tracks which (released) resource last occupied each byte range of a block.
#[derive(Default)]
struct SegmentUsageTracker {
    occupants: FxHashMap<u64, Vec<Occupant>>,
}

impl SegmentUsageTracker {
    /// Registers a new user and returns the resources it overlaps, oldest
    /// first. Overlapped byte ranges now belong to the new user.
    fn add_user(
        &mut self,
        block: MemoryBlockId,
        offset: u64,
        size: u64,
        resource: ResourceRef,
    ) -> Vec<ResourceRef> {
        let end = offset + size;
        let occupants = self.occupants.entry(block.0).or_default();
        let mut dependencies = Vec::new();
        let mut kept = Vec::with_capacity(occupants.len() + 1);
        for occ in occupants.drain(..) {
            let occ_end = occ.offset + occ.size;
            if occ_end <= offset || occ.offset >= end {
                kept.push(occ);
                continue;
            }
            dependencies.push(occ.resource);
            // Keep the non-overlapped remainders.
            if occ.offset < offset {
                kept.push(Occupant {
                    resource: occ.resource,
                    offset: occ.offset,
                    size: offset - occ.offset,
                });
            }
            if occ_end > end {
                kept.push(Occupant {
                    resource: occ.resource,
                    offset: end,
                    size: occ_end - end,
                });
            }
        }
        kept.push(Occupant {
            resource,
            offset,
            size,
        });
        *occupants = kept;
        dependencies
    }
}

const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

// ─── Allocator ────────────────────────────────────────────────────────────────

/// Cross-frame transient memory allocator.
///
/// Owned by the [`Executor`](crate::execute::Executor); free slices and the
/// recycle list survive between frames.
#[derive(Default)]
pub struct TransientAllocator {
    free: Vec<FreeSegment>,
    blocks: FxHashMap<u64, BlockInfo>,
    recycle: Vec<RecycleEntry>,
    /// Slices handed out or subdivided this frame; gated on the frame's sync
    /// by [`retire_frame`](Self::retire_frame).
    pending: Vec<FreeSegment>,
}

impl TransientAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains recycle entries whose sync point has completed back into the
    /// free set.
    pub fn reclaim(&mut self) {
        let mut index = 0;
        while index < self.recycle.len() {
            if self.recycle[index].sync.is_complete() {
                let entry = self.recycle.swap_remove(index);
                for segment in entry.segments {
                    Self::insert_merged(&mut self.free, segment);
                }
            } else {
                index += 1;
            }
        }
    }

    /// Places every request of one frame, aliasing across disjoint lifetimes.
    ///
    /// Requests are turned into `Allocate`/`Release` events keyed by
    /// `2 × first_use` and `2 × last_use + 1`, sorted, and processed in
    /// order. Returns placements in request order plus the aliased pairs.
    pub fn allocate_frame(
        &mut self,
        requests: &[TransientRequest],
        pool: &mut dyn TransientMemoryPool,
    ) -> Result<FrameAllocation> {
        self.reclaim();

        #[derive(Clone, Copy)]
        enum Event {
            Allocate(usize),
            Release(usize),
        }
        let mut events: Vec<(u32, u32, Event)> = Vec::with_capacity(requests.len() * 2);
        for (index, request) in requests.iter().enumerate() {
            // Tie-break by request index so equal sort keys stay stable.
            events.push((2 * request.first_use, index as u32, Event::Allocate(index)));
            events.push((2 * request.last_use + 1, index as u32, Event::Release(index)));
        }
        events.sort_by_key(|&(key, index, _)| (key, index));

        let mut working = std::mem::take(&mut self.free);
        let mut touched: FxHashSet<u64> = FxHashSet::default();
        let mut tracker = SegmentUsageTracker::default();
        let mut placements: Vec<Option<Placement>> = vec![None; requests.len()];
        let mut alias_pairs = Vec::new();

        for (_, _, event) in events {
            match event {
                Event::Allocate(index) => {
                    let request = &requests[index];
                    let placement = self.place(request, &mut working, pool)?;
                    touched.insert(placement.block.0);
                    for before in tracker.add_user(
                        placement.block,
                        placement.offset,
                        placement.size,
                        request.resource,
                    ) {
                        alias_pairs.push(AliasedPair {
                            before,
                            after: request.resource,
                        });
                    }
                    placements[index] = Some(placement);
                }
                Event::Release(index) => {
                    if let Some(placement) = placements[index] {
                        Self::insert_merged(
                            &mut working,
                            FreeSegment {
                                block: placement.block,
                                offset: placement.offset,
                                size: placement.size,
                            },
                        );
                    }
                }
            }
        }

        // Slices of blocks used this frame wait for the frame's sync point;
        // everything else is immediately reusable.
        for segment in working {
            if touched.contains(&segment.block.0) {
                Self::insert_merged(&mut self.pending, segment);
            } else {
                Self::insert_merged(&mut self.free, segment);
            }
        }

        log::debug!(
            "transient frame: {} placements, {} alias pairs",
            requests.len(),
            alias_pairs.len()
        );

        let placements = placements
            .into_iter()
            .map(|p| p.unwrap_or_else(|| unreachable!("every allocate event places its request")))
            .collect();
        Ok(FrameAllocation {
            placements,
            alias_pairs,
        })
    }

    /// Gates this frame's slices on the frame's GPU progress marker.
    ///
    /// Call after submission; [`reclaim`](Self::reclaim) returns the slices
    /// to the free set once `sync` completes.
    pub fn retire_frame(&mut self, sync: Arc<dyn QueueSync>) {
        if self.pending.is_empty() {
            return;
        }
        self.recycle.push(RecycleEntry {
            sync,
            segments: std::mem::take(&mut self.pending),
        });
    }

    /// Total bytes currently sitting in the free set.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.free.iter().map(|s| s.size).sum()
    }

    // ── Internal helpers ───────────────────────────────────────────────────

    /// First-fit placement in the request's category; Regular requests fall
    /// back to MSAA slices before a new block is acquired.
    fn place(
        &mut self,
        request: &TransientRequest,
        working: &mut Vec<FreeSegment>,
        pool: &mut dyn TransientMemoryPool,
    ) -> Result<Placement> {
        let classes: &[HeapAlignmentClass] = match request.alignment_class {
            HeapAlignmentClass::Regular => {
                &[HeapAlignmentClass::Regular, HeapAlignmentClass::Msaa]
            }
            HeapAlignmentClass::Msaa => &[HeapAlignmentClass::Msaa],
        };

        for &class in classes {
            let found = working.iter().position(|segment| {
                let info = self.blocks[&segment.block.0];
                if info.category != request.category || info.alignment_class != class {
                    return false;
                }
                let aligned = align_up(segment.offset, request.alignment);
                aligned + request.size <= segment.offset + segment.size
            });
            if let Some(position) = found {
                let segment = working.remove(position);
                let aligned = align_up(segment.offset, request.alignment);
                if aligned > segment.offset {
                    Self::insert_merged(
                        working,
                        FreeSegment {
                            block: segment.block,
                            offset: segment.offset,
                            size: aligned - segment.offset,
                        },
                    );
                }
                let tail = segment.offset + segment.size - (aligned + request.size);
                if tail > 0 {
                    Self::insert_merged(
                        working,
                        FreeSegment {
                            block: segment.block,
                            offset: aligned + request.size,
                            size: tail,
                        },
                    );
                }
                return Ok(Placement {
                    resource: request.resource,
                    block: segment.block,
                    offset: aligned,
                    size: request.size,
                });
            }
        }

        // Expand: acquire a fresh block from the pool service.
        let block = pool
            .acquire_block(request.category, request.alignment_class, request.size)
            .map_err(|_| SableError::OutOfTransientMemory {
                resource: request.name.clone(),
                size: request.size,
                category: request.category,
            })?;
        self.blocks.insert(
            block.id.0,
            BlockInfo {
                category: block.category,
                alignment_class: block.alignment_class,
            },
        );
        if block.size > request.size {
            Self::insert_merged(
                working,
                FreeSegment {
                    block: block.id,
                    offset: request.size,
                    size: block.size - request.size,
                },
            );
        }
        Ok(Placement {
            resource: request.resource,
            block: block.id,
            offset: 0,
            size: request.size,
        })
    }

    /// Inserts a segment keeping `(block, offset)` order and merging with
    /// adjacent neighbours of the same block.
    fn insert_merged(segments: &mut Vec<FreeSegment>, segment: FreeSegment) {
        let position = segments
            .iter()
            .position(|s| (s.block.0, s.offset) > (segment.block.0, segment.offset))
            .unwrap_or(segments.len());
        segments.insert(position, segment);

        // Merge with successor first, then predecessor.
        if position + 1 < segments.len() {
            let (current, next) = (segments[position], segments[position + 1]);
            if current.block == next.block && current.offset + current.size == next.offset {
                segments[position].size += next.size;
                segments.remove(position + 1);
            }
        }
        if position > 0 {
            let (prev, current) = (segments[position - 1], segments[position]);
            if prev.block == current.block && prev.offset + prev.size == current.offset {
                segments[position - 1].size += current.size;
                segments.remove(position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::BufferRef;
    use crate::rhi::MemoryBlock;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TestPool {
        next_block: u64,
        block_size: u64,
        acquired: Vec<(ResourceCategory, HeapAlignmentClass)>,
    }

    impl TestPool {
        fn new(block_size: u64) -> Self {
            Self {
                next_block: 1,
                block_size,
                acquired: Vec::new(),
            }
        }
    }

    impl TransientMemoryPool for TestPool {
        fn acquire_block(
            &mut self,
            category: ResourceCategory,
            alignment_class: HeapAlignmentClass,
            min_size: u64,
        ) -> Result<MemoryBlock> {
            self.acquired.push((category, alignment_class));
            let id = MemoryBlockId(self.next_block);
            self.next_block += 1;
            Ok(MemoryBlock {
                id,
                size: self.block_size.max(min_size),
                category,
                alignment_class,
            })
        }

        fn retire_placed(
            &mut self,
            _sync: Arc<dyn QueueSync>,
            _buffers: Vec<crate::rhi::BufferHandle>,
            _textures: Vec<crate::rhi::TextureHandle>,
        ) {
        }
    }

    struct TestSync(AtomicBool);

    impl QueueSync for TestSync {
        fn is_complete(&self) -> bool {
            self.0.load(Ordering::Relaxed)
        }
    }

    fn request(index: u32, size: u64, first: u32, last: u32) -> TransientRequest {
        TransientRequest {
            resource: ResourceRef::Buffer(BufferRef(index)),
            name: format!("r{index}"),
            category: ResourceCategory::General,
            alignment_class: HeapAlignmentClass::Regular,
            size,
            alignment: 256,
            first_use: first,
            last_use: last,
        }
    }

    #[test]
    fn disjoint_lifetimes_share_a_slice() {
        let mut allocator = TransientAllocator::new();
        let mut pool = TestPool::new(1 << 20);
        let requests = [request(0, 4096, 0, 2), request(1, 4096, 3, 5)];
        let frame = allocator.allocate_frame(&requests, &mut pool).unwrap();

        assert_eq!(frame.placements[0].block, frame.placements[1].block);
        assert_eq!(frame.placements[0].offset, frame.placements[1].offset);
        assert_eq!(frame.alias_pairs.len(), 1);
        assert_eq!(
            frame.alias_pairs[0],
            AliasedPair {
                before: ResourceRef::Buffer(BufferRef(0)),
                after: ResourceRef::Buffer(BufferRef(1)),
            }
        );
        // One block serves both.
        assert_eq!(pool.acquired.len(), 1);
    }

    #[test]
    fn overlapping_lifetimes_stay_disjoint() {
        let mut allocator = TransientAllocator::new();
        let mut pool = TestPool::new(1 << 20);
        let requests = [request(0, 4096, 0, 3), request(1, 4096, 2, 5)];
        let frame = allocator.allocate_frame(&requests, &mut pool).unwrap();

        let a = &frame.placements[0];
        let b = &frame.placements[1];
        let overlap = a.block == b.block
            && a.offset < b.offset + b.size
            && b.offset < a.offset + a.size;
        assert!(!overlap);
        assert!(frame.alias_pairs.is_empty());
    }

    #[test]
    fn regular_request_falls_back_onto_msaa_slice() {
        let mut allocator = TransientAllocator::new();
        let mut pool = TestPool::new(1 << 20);

        // An MSAA resource primes an MSAA block; a later regular resource
        // with a disjoint lifetime may land on it.
        let mut msaa = request(0, 8192, 0, 1);
        msaa.alignment_class = HeapAlignmentClass::Msaa;
        let regular = request(1, 4096, 2, 3);
        let frame = allocator
            .allocate_frame(&[msaa, regular], &mut pool)
            .unwrap();
        assert_eq!(frame.placements[0].block, frame.placements[1].block);
        assert_eq!(pool.acquired.len(), 1);
    }

    #[test]
    fn msaa_request_never_lands_on_regular_slice() {
        let mut allocator = TransientAllocator::new();
        let mut pool = TestPool::new(1 << 20);

        let regular = request(0, 8192, 0, 1);
        let mut msaa = request(1, 4096, 2, 3);
        msaa.alignment_class = HeapAlignmentClass::Msaa;
        let frame = allocator
            .allocate_frame(&[regular, msaa], &mut pool)
            .unwrap();

        // Even though the regular slice is free by the MSAA request's first
        // use, a second (MSAA-class) block must be acquired.
        assert_ne!(frame.placements[0].block, frame.placements[1].block);
        assert_eq!(pool.acquired.len(), 2);
        assert_eq!(pool.acquired[1].1, HeapAlignmentClass::Msaa);
    }

    #[test]
    fn categories_never_alias() {
        let mut allocator = TransientAllocator::new();
        let mut pool = TestPool::new(1 << 20);
        let mut buffer = request(0, 4096, 0, 1);
        buffer.category = ResourceCategory::Buffer;
        let mut texture = request(1, 4096, 2, 3);
        texture.category = ResourceCategory::RtDsTexture;
        let frame = allocator
            .allocate_frame(&[buffer, texture], &mut pool)
            .unwrap();
        assert_ne!(frame.placements[0].block, frame.placements[1].block);
        assert!(frame.alias_pairs.is_empty());
    }

    #[test]
    fn recycle_waits_for_sync() {
        let mut allocator = TransientAllocator::new();
        let mut pool = TestPool::new(1 << 20);
        let frame = allocator
            .allocate_frame(&[request(0, 4096, 0, 1)], &mut pool)
            .unwrap();
        drop(frame);

        let sync = Arc::new(TestSync(AtomicBool::new(false)));
        allocator.retire_frame(Arc::clone(&sync) as Arc<dyn QueueSync>);
        assert_eq!(allocator.free_bytes(), 0);

        allocator.reclaim();
        assert_eq!(allocator.free_bytes(), 0);

        sync.0.store(true, Ordering::Relaxed);
        allocator.reclaim();
        assert_eq!(allocator.free_bytes(), 1 << 20);
    }

    #[test]
    fn released_neighbours_merge() {
        let mut segments = Vec::new();
        let block = MemoryBlockId(9);
        TransientAllocator::insert_merged(
            &mut segments,
            FreeSegment {
                block,
                offset: 0,
                size: 100,
            },
        );
        TransientAllocator::insert_merged(
            &mut segments,
            FreeSegment {
                block,
                offset: 200,
                size: 50,
            },
        );
        TransientAllocator::insert_merged(
            &mut segments,
            FreeSegment {
                block,
                offset: 100,
                size: 100,
            },
        );
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].size, 250);
    }
}

//! Backend Service Interface
//!
//! The narrow interface the graph core consumes from the graphics backend:
//! resource creation, command recording, barrier submission, queue submits
//! and the transient memory-block service. Backends (Vulkan 1.3 class,
//! D3D12 class) implement these traits; the core never touches a native API.
//!
//! All objects cross the boundary as opaque handles minted by the backend.
//! The handles carry no lifetime: destruction scheduling is the backend's
//! responsibility, driven by the [`QueueSync`] markers the executor hands to
//! [`TransientMemoryPool::retire_placed`].

use std::sync::Arc;

use smallvec::SmallVec;

use super::types::{
    Accesses, AllocRequirements, BufferDesc, BufferHandle, ClearValue, FenceHandle,
    HeapAlignmentClass, HeapTier, MemoryBlockId, PipelineStages, Queue, ResourceCategory,
    SemaphoreHandle, SubresourceKey, SubresourceRange, TextureDesc, TextureHandle, TextureLayout,
    TlasHandle,
};
use crate::errors::Result;

// ─── Capabilities ─────────────────────────────────────────────────────────────

/// Device properties the compiler and allocator depend on.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    /// Resource heap tier; controls transient aliasing categories.
    pub heap_tier: HeapTier,
    /// Required alignment of acceleration-structure scratch buffers.
    pub as_scratch_alignment: u64,
}

// ─── Barriers ─────────────────────────────────────────────────────────────────

/// Direction of a queue-family ownership transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Emitted on the donor queue after the last use there.
    Release,
    /// Emitted on the recipient queue before the first use there.
    Acquire,
}

/// Queue-family ownership transfer attached to a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnershipTransfer {
    pub src_family: u32,
    pub dst_family: u32,
    pub direction: TransferDirection,
}

/// A buffer memory barrier in backend terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_stages: PipelineStages,
    pub src_accesses: Accesses,
    pub dst_stages: PipelineStages,
    pub dst_accesses: Accesses,
    pub ownership: Option<OwnershipTransfer>,
}

/// A texture barrier in backend terms, covering a subresource range and an
/// optional layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBarrier {
    pub texture: TextureHandle,
    pub range: SubresourceRange,
    pub src_stages: PipelineStages,
    pub src_accesses: Accesses,
    pub old_layout: TextureLayout,
    pub dst_stages: PipelineStages,
    pub dst_accesses: Accesses,
    pub new_layout: TextureLayout,
    pub ownership: Option<OwnershipTransfer>,
}

/// One batched barrier submission.
///
/// The executor coalesces every barrier attached to the same pass phase into
/// a single batch so the backend issues one native barrier call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarrierBatch {
    pub buffers: Vec<BufferBarrier>,
    pub textures: Vec<TextureBarrier>,
}

impl BarrierBatch {
    /// Returns `true` when the batch carries no barriers.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }
}

// ─── Submission ───────────────────────────────────────────────────────────────

/// A semaphore wait with its destination stage mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait {
    pub semaphore: SemaphoreHandle,
    pub stages: PipelineStages,
}

/// Parameters of one queue submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitInfo {
    pub waits: SmallVec<[SemaphoreWait; 2]>,
    pub signals: SmallVec<[SemaphoreHandle; 2]>,
    pub fence: Option<FenceHandle>,
}

// ─── Command Recording ────────────────────────────────────────────────────────

/// An open command buffer.
///
/// Besides barrier and debug-marker recording, the trait exposes the small
/// helper set the utility-pass library records through; a backend typically
/// lowers these to its own blit/clear utilities.
pub trait CommandList {
    /// Records a batched pipeline barrier.
    fn barrier_batch(&mut self, batch: &BarrierBatch);

    /// Opens a debug-marker group.
    fn begin_debug_label(&mut self, name: &str);

    /// Closes the innermost debug-marker group.
    fn end_debug_label(&mut self);

    /// Clears a color texture subresource.
    fn clear_texture(&mut self, texture: TextureHandle, range: SubresourceRange, value: ClearValue);

    /// Fills a buffer range with a 32-bit pattern.
    fn fill_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64, value: u32);

    /// Copies a byte range between buffers.
    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    );

    /// Copies one texture subresource to another.
    fn copy_texture(
        &mut self,
        src: TextureHandle,
        src_subresource: SubresourceKey,
        dst: TextureHandle,
        dst_subresource: SubresourceKey,
    );

    /// Draws a fullscreen blit from one subresource to another.
    fn blit_texture(
        &mut self,
        src: TextureHandle,
        src_subresource: SubresourceKey,
        dst: TextureHandle,
        dst_subresource: SubresourceKey,
        filter: BlitFilter,
        gamma: f32,
    );

    /// Builds a top-level acceleration structure into its backing buffer.
    fn build_tlas(&mut self, tlas: TlasHandle, output: BufferHandle, scratch: BufferHandle);
}

/// Sampling filter of a blit utility pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlitFilter {
    Point,
    #[default]
    Linear,
}

// ─── Device ───────────────────────────────────────────────────────────────────

/// The device service the executor drives.
pub trait Device {
    /// Static device properties.
    fn capabilities(&self) -> DeviceCaps;

    /// Reports allocation size and alignment for a buffer description.
    fn buffer_alloc_info(&self, desc: &BufferDesc) -> AllocRequirements;

    /// Reports allocation size and alignment for a texture description.
    fn texture_alloc_info(&self, desc: &TextureDesc) -> AllocRequirements;

    /// Creates a buffer placed on a heap slice of a transient memory block.
    fn create_placed_buffer(
        &mut self,
        block: MemoryBlockId,
        offset: u64,
        desc: &BufferDesc,
    ) -> Result<BufferHandle>;

    /// Creates a texture placed on a heap slice of a transient memory block.
    fn create_placed_texture(
        &mut self,
        block: MemoryBlockId,
        offset: u64,
        desc: &TextureDesc,
    ) -> Result<TextureHandle>;

    /// Creates a binary semaphore for inter-queue transitions.
    fn create_semaphore(&mut self) -> Result<SemaphoreHandle>;

    /// Acquires a fresh command buffer from the pool of `queue`.
    fn acquire_command_list(&mut self, queue: Queue) -> Result<Box<dyn CommandList>>;

    /// Closes and submits a command buffer on `queue`.
    fn submit(&mut self, queue: Queue, list: Box<dyn CommandList>, info: &SubmitInfo)
    -> Result<()>;

    /// A sync point observing every submission made so far this frame.
    fn submission_sync(&mut self) -> Arc<dyn QueueSync>;
}

// ─── Transient Memory Service ─────────────────────────────────────────────────

/// One memory block handed out by the transient pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    pub id: MemoryBlockId,
    pub size: u64,
    pub category: ResourceCategory,
    pub alignment_class: HeapAlignmentClass,
}

/// A GPU-progress marker gating memory reuse.
pub trait QueueSync: Send + Sync {
    /// Whether the GPU has retired everything the marker covers.
    fn is_complete(&self) -> bool;
}

/// The memory-block service backing the transient allocator.
///
/// The allocator sub-divides the blocks it receives; the pool only deals in
/// whole blocks and in deferred destruction of placed resources.
pub trait TransientMemoryPool {
    /// Acquires a block of at least `min_size` bytes in the given category
    /// and alignment class.
    fn acquire_block(
        &mut self,
        category: ResourceCategory,
        alignment_class: HeapAlignmentClass,
        min_size: u64,
    ) -> Result<MemoryBlock>;

    /// Schedules placed resources for destruction once `sync` completes.
    fn retire_placed(
        &mut self,
        sync: Arc<dyn QueueSync>,
        buffers: Vec<BufferHandle>,
        textures: Vec<TextureHandle>,
    );
}

//! Backend Interface
//!
//! Everything the render graph core shares with the graphics backend:
//! value types ([`types`]) and the service traits ([`device`]). The core is
//! backend-agnostic; a Vulkan-class or D3D12-class wrapper implements
//! [`Device`], [`CommandList`] and [`TransientMemoryPool`] and never leaks
//! native objects across this boundary.

pub mod device;
pub mod types;

pub use device::{
    BarrierBatch, BlitFilter, BufferBarrier, CommandList, Device, DeviceCaps, MemoryBlock,
    OwnershipTransfer, QueueSync, SemaphoreWait, SubmitInfo, TextureBarrier, TransferDirection,
    TransientMemoryPool,
};
pub use types::{
    Accesses, AllocRequirements, BufferDesc, BufferHandle, BufferUsages, ClearValue, FenceHandle,
    Format, HeapAlignmentClass, HeapTier, HostAccess, MemoryBlockId, PipelineStages, Queue,
    ResourceCategory, SemaphoreHandle, SubresourceKey, SubresourceRange, TextureAspect,
    TextureAspects, TextureDesc, TextureDimension, TextureHandle, TextureLayout, TextureUsages,
    TlasHandle,
};

//! Recording mock backend shared by the integration tests.
//!
//! `MockDevice` mints opaque handles and appends every backend call to a
//! shared event log; assertions then inspect the exact barrier, marker and
//! submission stream the executor produced.

// Each test binary uses a different subset of the helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sable::rhi::{
    AllocRequirements, BarrierBatch, BlitFilter, BufferDesc, BufferHandle, ClearValue, CommandList,
    Device, DeviceCaps, FenceHandle, HeapAlignmentClass, HeapTier, MemoryBlock, MemoryBlockId,
    PipelineStages, Queue, QueueSync, ResourceCategory, SemaphoreHandle, SubresourceKey,
    SubresourceRange, SubmitInfo, TextureDesc, TextureHandle, TlasHandle, TransientMemoryPool,
};
use sable::Result;

// ─── Event Log ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AcquireList {
        queue: u32,
    },
    Barrier(BarrierBatch),
    BeginLabel(String),
    EndLabel,
    ClearTexture {
        texture: TextureHandle,
    },
    FillBuffer {
        buffer: BufferHandle,
    },
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
    },
    CopyTexture {
        src: TextureHandle,
        dst: TextureHandle,
    },
    BlitTexture {
        src: TextureHandle,
        dst: TextureHandle,
    },
    BuildTlas {
        tlas: TlasHandle,
        output: BufferHandle,
    },
    CreatePlacedBuffer {
        block: MemoryBlockId,
        offset: u64,
        handle: BufferHandle,
    },
    CreatePlacedTexture {
        block: MemoryBlockId,
        offset: u64,
        handle: TextureHandle,
    },
    Submit {
        queue: u32,
        waits: Vec<(SemaphoreHandle, PipelineStages)>,
        signals: Vec<SemaphoreHandle>,
        fence: Option<FenceHandle>,
    },
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

// ─── Mock Sync ────────────────────────────────────────────────────────────────

pub struct MockSync(pub AtomicBool);

impl QueueSync for MockSync {
    fn is_complete(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ─── Mock Command List ────────────────────────────────────────────────────────

struct MockList {
    log: EventLog,
}

impl MockList {
    fn push(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }
}

impl CommandList for MockList {
    fn barrier_batch(&mut self, batch: &BarrierBatch) {
        self.push(Event::Barrier(batch.clone()));
    }

    fn begin_debug_label(&mut self, name: &str) {
        self.push(Event::BeginLabel(name.to_owned()));
    }

    fn end_debug_label(&mut self) {
        self.push(Event::EndLabel);
    }

    fn clear_texture(
        &mut self,
        texture: TextureHandle,
        _range: SubresourceRange,
        _value: ClearValue,
    ) {
        self.push(Event::ClearTexture { texture });
    }

    fn fill_buffer(&mut self, buffer: BufferHandle, _offset: u64, _size: u64, _value: u32) {
        self.push(Event::FillBuffer { buffer });
    }

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        _src_offset: u64,
        dst: BufferHandle,
        _dst_offset: u64,
        _size: u64,
    ) {
        self.push(Event::CopyBuffer { src, dst });
    }

    fn copy_texture(
        &mut self,
        src: TextureHandle,
        _src_subresource: SubresourceKey,
        dst: TextureHandle,
        _dst_subresource: SubresourceKey,
    ) {
        self.push(Event::CopyTexture { src, dst });
    }

    fn blit_texture(
        &mut self,
        src: TextureHandle,
        _src_subresource: SubresourceKey,
        dst: TextureHandle,
        _dst_subresource: SubresourceKey,
        _filter: BlitFilter,
        _gamma: f32,
    ) {
        self.push(Event::BlitTexture { src, dst });
    }

    fn build_tlas(&mut self, tlas: TlasHandle, output: BufferHandle, _scratch: BufferHandle) {
        self.push(Event::BuildTlas { tlas, output });
    }
}

// ─── Mock Device ──────────────────────────────────────────────────────────────

pub struct MockDevice {
    pub log: EventLog,
    caps: DeviceCaps,
    next_handle: u64,
    /// Sync markers handed out by `submission_sync`, newest last.
    pub syncs: Vec<Arc<MockSync>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_tier(HeapTier::Tier2)
    }

    pub fn with_tier(heap_tier: HeapTier) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            caps: DeviceCaps {
                heap_tier,
                as_scratch_alignment: 256,
            },
            next_handle: 1000,
            syncs: Vec::new(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    /// All barrier batches, in recording order.
    pub fn barrier_batches(&self) -> Vec<BarrierBatch> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Barrier(batch) => Some(batch),
                _ => None,
            })
            .collect()
    }

    /// All submissions, in order.
    pub fn submissions(
        &self,
    ) -> Vec<(
        u32,
        Vec<(SemaphoreHandle, PipelineStages)>,
        Vec<SemaphoreHandle>,
        Option<FenceHandle>,
    )> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Submit {
                    queue,
                    waits,
                    signals,
                    fence,
                } => Some((queue, waits, signals, fence)),
                _ => None,
            })
            .collect()
    }

    /// Marks the newest frame sync complete (as if the GPU retired it).
    pub fn complete_frame(&self) {
        if let Some(sync) = self.syncs.last() {
            sync.0.store(true, Ordering::Relaxed);
        }
    }

    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl Device for MockDevice {
    fn capabilities(&self) -> DeviceCaps {
        self.caps
    }

    fn buffer_alloc_info(&self, desc: &BufferDesc) -> AllocRequirements {
        AllocRequirements {
            size: desc.size.next_multiple_of(256),
            alignment: 256,
        }
    }

    fn texture_alloc_info(&self, desc: &TextureDesc) -> AllocRequirements {
        let texels =
            u64::from(desc.width) * u64::from(desc.height) * u64::from(desc.depth.max(1));
        let size = texels
            * u64::from(desc.array_layers)
            * u64::from(desc.mip_levels)
            * u64::from(desc.sample_count)
            * 4;
        AllocRequirements {
            size: size.next_multiple_of(65536),
            alignment: 65536,
        }
    }

    fn create_placed_buffer(
        &mut self,
        block: MemoryBlockId,
        offset: u64,
        _desc: &BufferDesc,
    ) -> Result<BufferHandle> {
        let handle = BufferHandle(self.mint());
        self.log.lock().unwrap().push(Event::CreatePlacedBuffer {
            block,
            offset,
            handle,
        });
        Ok(handle)
    }

    fn create_placed_texture(
        &mut self,
        block: MemoryBlockId,
        offset: u64,
        _desc: &TextureDesc,
    ) -> Result<TextureHandle> {
        let handle = TextureHandle(self.mint());
        self.log.lock().unwrap().push(Event::CreatePlacedTexture {
            block,
            offset,
            handle,
        });
        Ok(handle)
    }

    fn create_semaphore(&mut self) -> Result<SemaphoreHandle> {
        Ok(SemaphoreHandle(self.mint()))
    }

    fn acquire_command_list(&mut self, queue: Queue) -> Result<Box<dyn CommandList>> {
        self.log.lock().unwrap().push(Event::AcquireList {
            queue: queue.index,
        });
        Ok(Box::new(MockList {
            log: Arc::clone(&self.log),
        }))
    }

    fn submit(
        &mut self,
        queue: Queue,
        _list: Box<dyn CommandList>,
        info: &SubmitInfo,
    ) -> Result<()> {
        self.log.lock().unwrap().push(Event::Submit {
            queue: queue.index,
            waits: info
                .waits
                .iter()
                .map(|w| (w.semaphore, w.stages))
                .collect(),
            signals: info.signals.to_vec(),
            fence: info.fence,
        });
        Ok(())
    }

    fn submission_sync(&mut self) -> Arc<dyn QueueSync> {
        let sync = Arc::new(MockSync(AtomicBool::new(false)));
        self.syncs.push(Arc::clone(&sync));
        sync
    }
}

// ─── Mock Transient Pool ──────────────────────────────────────────────────────

pub struct MockPool {
    next_block: u64,
    pub block_size: u64,
    pub acquired: Vec<(ResourceCategory, HeapAlignmentClass, u64)>,
    pub retired: Vec<(Vec<BufferHandle>, Vec<TextureHandle>)>,
}

impl MockPool {
    pub fn new() -> Self {
        Self {
            next_block: 1,
            block_size: 64 << 20,
            acquired: Vec::new(),
            retired: Vec::new(),
        }
    }
}

impl TransientMemoryPool for MockPool {
    fn acquire_block(
        &mut self,
        category: ResourceCategory,
        alignment_class: HeapAlignmentClass,
        min_size: u64,
    ) -> Result<MemoryBlock> {
        self.acquired.push((category, alignment_class, min_size));
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
        buffers: Vec<BufferHandle>,
        textures: Vec<TextureHandle>,
    ) {
        self.retired.push((buffers, textures));
    }
}

// ─── Shared Fixtures ──────────────────────────────────────────────────────────

pub fn graphics_queue() -> Queue {
    Queue {
        index: 0,
        family: 0,
        supports_present: true,
    }
}

pub fn compute_queue() -> Queue {
    Queue {
        index: 1,
        family: 1,
        supports_present: false,
    }
}

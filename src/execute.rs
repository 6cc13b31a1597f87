//! Plan Executor
//!
//! Translates a compiled [`ExecutionPlan`](crate::compile::ExecutionPlan)
//! into backend calls: command-buffer acquisition, barrier batches, debug
//! markers, pass callbacks and queue submissions with the correct semaphore
//! and fence wiring.
//!
//! The executor owns the [`TransientAllocator`]; free memory slices survive
//! between frames and are recycled once each frame's sync point completes.
//!
//! # Execution of One Frame
//!
//! 1. Compile the graph (plan-time errors surface here)
//! 2. Back internal resources through the transient allocator, then create
//!    the placed buffers/textures
//! 3. Merge aliasing barriers into the first-use transitions
//! 4. Walk submission groups: barriers, markers, callbacks, submits
//! 5. Retire: gate transient memory on the frame sync, flush external
//!    tracked states back to their owners

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::alias::{
    FrameAllocation, TransientAllocator, TransientRequest, buffer_category, texture_alignment_class,
    texture_category,
};
use crate::compile::{ExecutionPlan, compile};
use crate::errors::{Result, SableError};
use crate::graph::RenderGraph;
use crate::label::LabelNodeId;
use crate::resource::{
    BufferRef, BufferResource, ResourceRef, TextureRef, TextureResource, TlasRef,
};
use crate::rhi::{
    BarrierBatch, BufferBarrier, BufferHandle, CommandList, Device, HeapAlignmentClass,
    PipelineStages, SemaphoreHandle, SemaphoreWait, SubmitInfo, TextureBarrier, TextureHandle,
    TextureLayout, TlasHandle, TransientMemoryPool,
};

// ─── Pass Context ─────────────────────────────────────────────────────────────

/// What a pass callback sees: the open command buffer and the resolved
/// physical handles of every resource the pass declared.
pub struct PassContext<'a> {
    pub(crate) cmd: &'a mut dyn CommandList,
    pub(crate) resolved: &'a ResolvedResources,
    pub(crate) pass_name: &'a str,
}

impl PassContext<'_> {
    /// The open command buffer.
    #[inline]
    pub fn cmd(&mut self) -> &mut dyn CommandList {
        self.cmd
    }

    /// Name of the executing pass.
    #[inline]
    #[must_use]
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// Physical handle of a buffer resource.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was never declared by any pass (an unused
    /// internal resource receives no backing).
    #[must_use]
    pub fn buffer(&self, buffer: BufferRef) -> BufferHandle {
        match self.resolved.buffers[buffer.index() as usize] {
            Some(handle) => handle,
            None => panic!("buffer has no physical backing; declare a use for it"),
        }
    }

    /// Physical handle of a texture resource.
    ///
    /// # Panics
    ///
    /// Panics if the texture was never declared by any pass.
    #[must_use]
    pub fn texture(&self, texture: TextureRef) -> TextureHandle {
        match self.resolved.textures[texture.index() as usize] {
            Some(handle) => handle,
            None => panic!("texture has no physical backing; declare a use for it"),
        }
    }

    /// Physical handle of a registered TLAS.
    #[must_use]
    pub fn tlas(&self, tlas: TlasRef) -> TlasHandle {
        self.resolved.tlases[tlas.0 as usize]
    }
}

/// Physical handles resolved for one frame, indexed by the graph's linear
/// resource index space.
pub(crate) struct ResolvedResources {
    buffers: Vec<Option<BufferHandle>>,
    textures: Vec<Option<TextureHandle>>,
    tlases: Vec<TlasHandle>,
}

// ─── Executor ─────────────────────────────────────────────────────────────────

/// Drives compiled graphs against a backend device.
///
/// One executor serves many frames; it carries the transient allocator whose
/// free-slice set persists across graphs.
#[derive(Default)]
pub struct Executor {
    allocator: TransientAllocator,
}

impl Executor {
    /// Creates an executor with an empty transient allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The transient allocator, for statistics and trimming.
    #[must_use]
    pub fn allocator(&self) -> &TransientAllocator {
        &self.allocator
    }

    /// Compiles and executes one graph.
    ///
    /// Compilation errors (conflicting uses, cycles, read-only writes,
    /// non-present queues) and execution errors (backend failures, callback
    /// failures) all surface here.
    pub fn execute(
        &mut self,
        mut graph: RenderGraph,
        device: &mut dyn Device,
        pool: &mut dyn TransientMemoryPool,
    ) -> Result<()> {
        let mut plan = compile(&graph)?;

        // Back internals, create placed resources, resolve handle tables.
        let frame = self.place_transients(&graph, &plan, device, pool)?;
        let (resolved, created_buffers, created_textures) =
            resolve_handles(&graph, &frame, device)?;
        merge_alias_barriers(&mut plan, &frame);

        // Pre-create one semaphore per cross-queue group edge.
        let group_count = plan.groups.len();
        let mut group_waits: Vec<SmallVec<[SemaphoreWait; 2]>> =
            vec![SmallVec::new(); group_count];
        let mut group_signals: Vec<SmallVec<[SemaphoreHandle; 2]>> =
            vec![SmallVec::new(); group_count];
        for (consumer, group) in plan.groups.iter().enumerate() {
            for wait in &group.waits {
                let semaphore = device.create_semaphore()?;
                group_signals[wait.donor as usize].push(semaphore);
                group_waits[consumer].push(SemaphoreWait {
                    semaphore,
                    stages: wait.stages,
                });
            }
        }

        let swapchain_frame = graph.swapchain_texture().map(|texture| {
            match graph.texture_resource(texture) {
                TextureResource::Swapchain { frame } => *frame,
                _ => unreachable!("swapchain reference addresses a non-swapchain record"),
            }
        });

        // Walk submission groups.
        let mut complete_fence = graph.complete_fence;
        let last_group = group_count.saturating_sub(1);
        for group_index in 0..group_count {
            let group = plan.groups[group_index].clone();
            let mut list = device.acquire_command_list(group.queue)?;
            let mut open_labels: Vec<LabelNodeId> = Vec::new();

            for pos in group.first..group.first + group.len {
                let pass_ref = plan.order[pos as usize];
                let pass_index = pass_ref.index() as usize;
                let record = &plan.records[pos as usize];

                if !record.pre.is_empty() {
                    list.barrier_batch(&translate_batch(&record.pre, &resolved));
                }

                // Debug markers: keep shared ancestors open, begin the rest,
                // with the pass's own name as the innermost marker.
                let path = graph.passes[pass_index]
                    .label
                    .map(|label| graph.labels.path(label))
                    .unwrap_or_default();
                let (leaf, ancestors) = match path.split_last() {
                    Some((leaf, ancestors)) => (Some(*leaf), ancestors),
                    None => (None, &[][..]),
                };
                let common = open_labels
                    .iter()
                    .zip(ancestors)
                    .take_while(|(a, b)| a == b)
                    .count();
                while open_labels.len() > common {
                    list.end_debug_label();
                    open_labels.pop();
                }
                for &node in &ancestors[common..] {
                    list.begin_debug_label(graph.labels.name(node));
                    open_labels.push(node);
                }
                if let Some(leaf) = leaf {
                    list.begin_debug_label(graph.labels.name(leaf));
                }

                if let Some(callback) = graph.passes[pass_index].callback.take() {
                    let pass_name = graph.passes[pass_index].name().to_owned();
                    let mut ctx = PassContext {
                        cmd: &mut *list,
                        resolved: &resolved,
                        pass_name: &pass_name,
                    };
                    callback(&mut ctx).map_err(|source| SableError::PassCallback {
                        pass: pass_name.clone(),
                        source,
                    })?;
                }

                if leaf.is_some() {
                    list.end_debug_label();
                }

                if !record.post.is_empty() {
                    list.barrier_batch(&translate_batch(&record.post, &resolved));
                }
            }

            while open_labels.pop().is_some() {
                list.end_debug_label();
            }

            // Submission wiring.
            let mut info = SubmitInfo {
                waits: group_waits[group_index].clone(),
                signals: group_signals[group_index].clone(),
                fence: group.fence,
            };
            if let Some(frame) = swapchain_frame {
                if group.wait_swapchain_acquire {
                    info.waits.push(SemaphoreWait {
                        semaphore: frame.acquire_semaphore,
                        stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                    });
                }
                if group.signal_swapchain_present {
                    info.signals.push(frame.present_semaphore);
                }
            }
            if group_index == last_group && info.fence.is_none() {
                info.fence = complete_fence.take();
            }
            device.submit(group.queue, list, &info)?;
        }

        // The completion fence still owes a signal when the last group
        // already carried a pass fence, or when the plan is empty.
        if let Some(fence) = complete_fence {
            let list = device.acquire_command_list(graph.queue())?;
            device.submit(
                graph.queue(),
                list,
                &SubmitInfo {
                    fence: Some(fence),
                    ..SubmitInfo::default()
                },
            )?;
        }

        // Retirement: gate transient memory and placed resources on the
        // frame sync, then flush external states back to their owners.
        let sync = device.submission_sync();
        self.allocator.retire_frame(Arc::clone(&sync));
        if !created_buffers.is_empty() || !created_textures.is_empty() {
            pool.retire_placed(Arc::clone(&sync), created_buffers, created_textures);
        }

        for (buffer, state) in &plan.external_buffers {
            if let BufferResource::External { external } = graph.buffer_resource(*buffer) {
                external.set_state(*state);
            }
        }
        for (texture, states) in &plan.external_textures {
            if let TextureResource::External { external, .. } = graph.texture_resource(*texture) {
                external.set_states(states.clone());
            }
        }

        Ok(())
    }

    /// Builds transient requests from the plan and runs the allocator.
    fn place_transients(
        &mut self,
        graph: &RenderGraph,
        plan: &ExecutionPlan,
        device: &mut dyn Device,
        pool: &mut dyn TransientMemoryPool,
    ) -> Result<FrameAllocation> {
        let caps = device.capabilities();
        let mut requests = Vec::with_capacity(plan.transients.len());
        for lifetime in &plan.transients {
            let request = match lifetime.resource {
                ResourceRef::Buffer(buffer) => {
                    let resource = graph.buffer_resource(buffer);
                    let info = device.buffer_alloc_info(resource.desc());
                    TransientRequest {
                        resource: lifetime.resource,
                        name: resource.name().to_owned(),
                        category: buffer_category(caps.heap_tier),
                        alignment_class: HeapAlignmentClass::Regular,
                        size: info.size,
                        alignment: info.alignment,
                        first_use: lifetime.first_use,
                        last_use: lifetime.last_use,
                    }
                }
                ResourceRef::Texture(texture) => {
                    let resource = graph.texture_resource(texture);
                    let desc = resource.desc();
                    let info = device.texture_alloc_info(desc);
                    TransientRequest {
                        resource: lifetime.resource,
                        name: resource.name().to_owned(),
                        category: texture_category(caps.heap_tier, desc),
                        alignment_class: texture_alignment_class(desc),
                        size: info.size,
                        alignment: info.alignment,
                        first_use: lifetime.first_use,
                        last_use: lifetime.last_use,
                    }
                }
            };
            requests.push(request);
        }
        self.allocator.allocate_frame(&requests, pool)
    }
}

// ─── Resolution ───────────────────────────────────────────────────────────────

/// Creates placed resources for every transient placement and assembles the
/// physical-handle tables.
fn resolve_handles(
    graph: &RenderGraph,
    frame: &FrameAllocation,
    device: &mut dyn Device,
) -> Result<(ResolvedResources, Vec<BufferHandle>, Vec<TextureHandle>)> {
    let table_len = graph.buffers.len();
    let mut resolved = ResolvedResources {
        buffers: vec![None; table_len],
        textures: vec![None; table_len],
        tlases: graph.tlases.iter().map(|t| t.handle).collect(),
    };
    let mut created_buffers = Vec::new();
    let mut created_textures = Vec::new();

    for (index, slot) in graph.buffers.iter().enumerate() {
        if let Some(BufferResource::External { external }) = slot {
            resolved.buffers[index] = Some(external.handle);
        }
    }
    for (index, slot) in graph.textures.iter().enumerate() {
        match slot {
            Some(TextureResource::External { external, .. }) => {
                resolved.textures[index] = Some(external.handle);
            }
            Some(TextureResource::Swapchain { frame }) => {
                resolved.textures[index] = Some(frame.texture);
            }
            _ => {}
        }
    }

    for placement in &frame.placements {
        match placement.resource {
            ResourceRef::Buffer(buffer) => {
                let resource = graph.buffer_resource(buffer);
                let handle =
                    device.create_placed_buffer(placement.block, placement.offset, resource.desc())?;
                resolved.buffers[buffer.index() as usize] = Some(handle);
                created_buffers.push(handle);
            }
            ResourceRef::Texture(texture) => {
                let resource = graph.texture_resource(texture);
                let handle = device.create_placed_texture(
                    placement.block,
                    placement.offset,
                    resource.desc(),
                )?;
                resolved.textures[texture.index() as usize] = Some(handle);
                created_textures.push(handle);
            }
        }
    }

    Ok((resolved, created_buffers, created_textures))
}

/// Folds aliasing hand-overs into the plan.
///
/// For textures the first-use transition already exists (`Undefined` source);
/// the previous resource's last-use masks are OR-ed into its source half so
/// the discard waits for the prior occupant. Buffers receive a fresh memory
/// barrier in front of the first-use pass.
fn merge_alias_barriers(plan: &mut ExecutionPlan, frame: &FrameAllocation) {
    if frame.alias_pairs.is_empty() {
        return;
    }
    let lifetimes: FxHashMap<ResourceRef, usize> = plan
        .transients
        .iter()
        .enumerate()
        .map(|(index, lifetime)| (lifetime.resource, index))
        .collect();

    for pair in &frame.alias_pairs {
        let (Some(&before), Some(&after)) =
            (lifetimes.get(&pair.before), lifetimes.get(&pair.after))
        else {
            continue;
        };
        let before = plan.transients[before];
        let after = plan.transients[after];
        let record = &mut plan.records[after.first_use as usize];

        match after.resource {
            ResourceRef::Texture(texture) => {
                for barrier in &mut record.pre.textures {
                    if barrier.texture == texture && barrier.old_layout == TextureLayout::Undefined
                    {
                        barrier.src_stages |= before.last_stages;
                        barrier.src_accesses |= before.last_accesses;
                    }
                }
            }
            ResourceRef::Buffer(buffer) => {
                record.pre.buffers.insert(
                    0,
                    crate::barrier::PlannedBufferBarrier {
                        buffer,
                        src_stages: before.last_stages,
                        src_accesses: before.last_accesses,
                        dst_stages: after.first_stages,
                        dst_accesses: after.first_accesses,
                        ownership: None,
                    },
                );
            }
        }
    }
}

/// Resolves a planned barrier set into backend handles.
fn translate_batch(set: &crate::barrier::BarrierSet, resolved: &ResolvedResources) -> BarrierBatch {
    let mut batch = BarrierBatch::default();
    for barrier in &set.buffers {
        let handle = resolved.buffers[barrier.buffer.index() as usize]
            .unwrap_or_else(|| unreachable!("barrier references an unbacked buffer"));
        batch.buffers.push(BufferBarrier {
            buffer: handle,
            src_stages: barrier.src_stages,
            src_accesses: barrier.src_accesses,
            dst_stages: barrier.dst_stages,
            dst_accesses: barrier.dst_accesses,
            ownership: barrier.ownership,
        });
    }
    for barrier in &set.textures {
        let handle = resolved.textures[barrier.texture.index() as usize]
            .unwrap_or_else(|| unreachable!("barrier references an unbacked texture"));
        batch.textures.push(TextureBarrier {
            texture: handle,
            range: barrier.range,
            src_stages: barrier.src_stages,
            src_accesses: barrier.src_accesses,
            old_layout: barrier.old_layout,
            dst_stages: barrier.dst_stages,
            dst_accesses: barrier.dst_accesses,
            new_layout: barrier.new_layout,
            ownership: barrier.ownership,
        });
    }
    batch
}

//! Graph Compiler
//!
//! Transforms a declared [`RenderGraph`] into an [`ExecutionPlan`]:
//!
//! 1. Normalize uses (expand wildcards, merge duplicates)
//! 2. Derive implicit edges from per-subresource use sequences
//! 3. Stable topological sort (creation-order tie-break)
//! 4. Walk per-subresource states, producing transition records
//! 5. Batch barriers into per-pass before/after phases
//! 6. Parameterize the swapchain acquire/present handshake
//! 7. Capture final external states for flush-back
//! 8. Derive transient lifetimes for the aliasing allocator
//!
//! The plan is pure data: barriers reference resources by graph index and
//! two identically-built graphs compile to equal plans.

use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::barrier::{
    BarrierSet, PlannedBufferBarrier, PlannedTextureBarrier, collapse_keys, needs_barrier,
};
use crate::errors::{Result, SableError};
use crate::graph::RenderGraph;
use crate::pass::{PassRef, SubresourceSelector, UseDecl};
use crate::resource::{
    BufferRef, BufferResource, ResourceRef, TextureRef, TextureResource, TrackedState,
    subresource_index, subresource_keys,
};
use crate::rhi::{
    Accesses, FenceHandle, OwnershipTransfer, PipelineStages, Queue, SubresourceKey,
    TextureLayout, TransferDirection,
};

// ─── Plan Types ───────────────────────────────────────────────────────────────

/// Barrier work attached to one pass in plan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassRecord {
    /// Barriers emitted before the pass callback (acquires, transitions).
    pub pre: BarrierSet,
    /// Barriers emitted after the pass callback (releases, present
    /// transition).
    pub post: BarrierSet,
}

/// A semaphore wait one submission group owes an earlier group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupWait {
    /// Index of the group that signals.
    pub donor: u32,
    /// Destination stages the wait masks.
    pub stages: PipelineStages,
}

/// A maximal contiguous run of passes on one queue, ending at a signal fence
/// or at plan end.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionGroup {
    pub queue: Queue,
    /// First position (in plan order) belonging to the group.
    pub first: u32,
    /// Number of passes in the group.
    pub len: u32,
    /// Cross-queue semaphore waits owed to earlier groups.
    pub waits: SmallVec<[GroupWait; 2]>,
    /// Fence signaled by this group's submission, from the last pass's
    /// signal fence.
    pub fence: Option<FenceHandle>,
    /// Whether this submission waits on the swapchain acquire semaphore.
    pub wait_swapchain_acquire: bool,
    /// Whether this submission signals the swapchain present semaphore.
    pub signal_swapchain_present: bool,
}

/// Lifetime and boundary-use masks of one internal resource, consumed by the
/// transient allocator and the aliasing-barrier pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientLifetime {
    pub resource: ResourceRef,
    /// Plan-order position of the first using pass.
    pub first_use: u32,
    /// Plan-order position of the last using pass.
    pub last_use: u32,
    /// Union of stages declared at the first using pass.
    pub first_stages: PipelineStages,
    /// Union of accesses declared at the first using pass.
    pub first_accesses: Accesses,
    /// Union of stages declared at the last using pass.
    pub last_stages: PipelineStages,
    /// Union of accesses declared at the last using pass.
    pub last_accesses: Accesses,
}

/// Swapchain handshake positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub texture: TextureRef,
    /// Plan-order position of the first pass using the image.
    pub first_use: u32,
    /// Plan-order position of the last pass using the image.
    pub last_use: u32,
}

/// The compiled execution plan of one graph.
#[derive(Debug, Default, PartialEq)]
pub struct ExecutionPlan {
    /// Passes in execution order.
    pub order: Vec<PassRef>,
    /// Barrier work per pass, parallel to `order`.
    pub records: Vec<PassRecord>,
    /// Submission groups covering `order` contiguously.
    pub groups: Vec<SubmissionGroup>,
    /// Internal resources needing transient backing, in linear-index order.
    pub transients: Vec<TransientLifetime>,
    /// Final tracked states of external buffers, flushed back on retirement.
    pub external_buffers: Vec<(BufferRef, TrackedState)>,
    /// Final tracked states of external textures (per subresource).
    pub external_textures: Vec<(TextureRef, Vec<TrackedState>)>,
    /// Swapchain handshake, when the image is used by any pass.
    pub swapchain: Option<SwapchainPlan>,
}

// ─── Normalization ────────────────────────────────────────────────────────────

#[derive(Default)]
struct NormalizedUses {
    buffers: Vec<(BufferRef, UseDecl)>,
    textures: Vec<(TextureRef, SubresourceKey, UseDecl)>,
}

fn normalize_pass(graph: &RenderGraph, pass: PassRef) -> Result<NormalizedUses> {
    let record = &graph.passes[pass.index() as usize];
    let mut normalized = NormalizedUses::default();

    for use_record in record.uses() {
        match use_record.resource {
            ResourceRef::Buffer(buffer) => {
                if let Some((_, merged)) = normalized
                    .buffers
                    .iter_mut()
                    .find(|(existing, _)| *existing == buffer)
                {
                    merged.stages |= use_record.decl.stages;
                    merged.accesses |= use_record.decl.accesses;
                } else {
                    normalized.buffers.push((buffer, use_record.decl));
                }
            }
            ResourceRef::Texture(texture) => {
                let resource = graph.texture_resource(texture);
                if use_record.decl.is_write()
                    && matches!(
                        resource,
                        TextureResource::External {
                            read_only: true,
                            ..
                        }
                    )
                {
                    return Err(SableError::ReadOnlyWrite {
                        pass: record.name().to_owned(),
                        resource: resource.name().to_owned(),
                    });
                }
                let desc = resource.desc();
                let keys: SmallVec<[SubresourceKey; 4]> = match use_record.selector {
                    SubresourceSelector::All => subresource_keys(desc).collect(),
                    SubresourceSelector::One(key) => SmallVec::from_slice(&[key]),
                };
                for key in keys {
                    if let Some((_, _, merged)) = normalized
                        .textures
                        .iter_mut()
                        .find(|(existing, existing_key, _)| {
                            *existing == texture && *existing_key == key
                        })
                    {
                        if merged.layout != use_record.decl.layout {
                            return Err(SableError::IncompatibleUses {
                                pass: record.name().to_owned(),
                                resource: resource.name().to_owned(),
                                first: merged.layout,
                                second: use_record.decl.layout,
                            });
                        }
                        merged.stages |= use_record.decl.stages;
                        merged.accesses |= use_record.decl.accesses;
                    } else {
                        normalized.textures.push((texture, key, use_record.decl));
                    }
                }
            }
        }
    }
    Ok(normalized)
}

// ─── Topological Order ────────────────────────────────────────────────────────

/// Stable Kahn sort: among ready passes the lowest creation index runs first,
/// so unconstrained passes keep their creation order.
fn topological_order(graph: &RenderGraph, edges: &[(u32, u32)]) -> Result<Vec<PassRef>> {
    let pass_count = graph.pass_count();
    let mut indegree = vec![0_u32; pass_count];
    let mut successors: Vec<Vec<u32>> = vec![Vec::new(); pass_count];
    for &(from, to) in edges {
        successors[from as usize].push(to);
        indegree[to as usize] += 1;
    }

    let mut ready: BinaryHeap<std::cmp::Reverse<u32>> = (0..pass_count as u32)
        .filter(|&p| indegree[p as usize] == 0)
        .map(std::cmp::Reverse)
        .collect();

    let mut order = Vec::with_capacity(pass_count);
    while let Some(std::cmp::Reverse(pass)) = ready.pop() {
        order.push(PassRef(pass));
        for &next in &successors[pass as usize] {
            indegree[next as usize] -= 1;
            if indegree[next as usize] == 0 {
                ready.push(std::cmp::Reverse(next));
            }
        }
    }

    if order.len() < pass_count {
        let culprit = indegree
            .iter()
            .position(|&d| d > 0)
            .unwrap_or_default();
        return Err(SableError::DependencyCycle {
            pass: graph.passes[culprit].name().to_owned(),
        });
    }
    Ok(order)
}

// ─── Per-Pass Transition Buckets ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextureTransition {
    texture: TextureRef,
    key: SubresourceKey,
    src_stages: PipelineStages,
    src_accesses: Accesses,
    old_layout: TextureLayout,
    dst_stages: PipelineStages,
    dst_accesses: Accesses,
    new_layout: TextureLayout,
    ownership: Option<OwnershipTransfer>,
}

#[derive(Default)]
struct TransitionBuckets {
    pre_buffers: Vec<Vec<PlannedBufferBarrier>>,
    post_buffers: Vec<Vec<PlannedBufferBarrier>>,
    pre_textures: Vec<Vec<TextureTransition>>,
    post_textures: Vec<Vec<TextureTransition>>,
}

impl TransitionBuckets {
    fn new(pass_count: usize) -> Self {
        Self {
            pre_buffers: vec![Vec::new(); pass_count],
            post_buffers: vec![Vec::new(); pass_count],
            pre_textures: vec![Vec::new(); pass_count],
            post_textures: vec![Vec::new(); pass_count],
        }
    }
}

/// Collapses the texture transitions of one pass phase into ranged barriers.
///
/// Transitions sharing identical synchronization parameters merge when their
/// subresources form contiguous blocks; the emitted union covers every
/// transition exactly once.
fn batch_texture_transitions(transitions: &[TextureTransition]) -> Vec<PlannedTextureBarrier> {
    let mut barriers = Vec::new();
    let mut consumed = vec![false; transitions.len()];
    for (index, head) in transitions.iter().enumerate() {
        if consumed[index] {
            continue;
        }
        let mut keys: SmallVec<[SubresourceKey; 8]> = SmallVec::new();
        for (other_index, other) in transitions.iter().enumerate().skip(index) {
            let same_params = other.texture == head.texture
                && other.src_stages == head.src_stages
                && other.src_accesses == head.src_accesses
                && other.old_layout == head.old_layout
                && other.dst_stages == head.dst_stages
                && other.dst_accesses == head.dst_accesses
                && other.new_layout == head.new_layout
                && other.ownership == head.ownership;
            if same_params {
                consumed[other_index] = true;
                keys.push(other.key);
            }
        }
        for range in collapse_keys(&mut keys) {
            barriers.push(PlannedTextureBarrier {
                texture: head.texture,
                range,
                src_stages: head.src_stages,
                src_accesses: head.src_accesses,
                old_layout: head.old_layout,
                dst_stages: head.dst_stages,
                dst_accesses: head.dst_accesses,
                new_layout: head.new_layout,
                ownership: head.ownership,
            });
        }
    }
    barriers
}

// ─── State Walk ───────────────────────────────────────────────────────────────

/// What one timeline walk addresses.
#[derive(Clone, Copy)]
enum WalkTarget {
    Buffer(BufferRef),
    Texture(TextureRef, SubresourceKey),
}

struct WalkContext<'a> {
    graph: &'a RenderGraph,
    position: &'a [u32],
    buckets: TransitionBuckets,
    /// `(donor position, consumer position, acquire dst stages)` per
    /// cross-queue transition; feeds group semaphore waits.
    cross_queue: Vec<(u32, u32, PipelineStages)>,
}

impl WalkContext<'_> {
    /// Steps one subresource timeline, emitting transition records.
    ///
    /// `timeline` is `(pass, use)` sorted by plan position. Returns the final
    /// tracked state.
    fn walk(
        &mut self,
        initial: TrackedState,
        timeline: &[(PassRef, UseDecl)],
        target: WalkTarget,
    ) -> TrackedState {
        let mut state = initial;
        let mut producer: Option<PassRef> = None;

        for &(pass, decl) in timeline {
            let queue = self.graph.passes[pass.index() as usize].queue();
            let position = self.position[pass.index() as usize] as usize;
            let cross_queue = state.queue.is_some_and(|owner| owner.index != queue.index);

            if cross_queue {
                let owner = state.queue.unwrap_or(queue);
                let release = OwnershipTransfer {
                    src_family: owner.family,
                    dst_family: queue.family,
                    direction: TransferDirection::Release,
                };
                let acquire = OwnershipTransfer {
                    direction: TransferDirection::Acquire,
                    ..release
                };
                if let Some(donor) = producer {
                    let donor_position = self.position[donor.index() as usize] as usize;
                    self.push_transition(
                        donor_position,
                        Phase::Post,
                        &state,
                        decl,
                        target,
                        Some(release),
                    );
                    self.cross_queue
                        .push((donor_position as u32, position as u32, decl.stages));
                }
                self.push_transition(position, Phase::Pre, &state, decl, target, Some(acquire));
                state = TrackedState {
                    stages: decl.stages,
                    accesses: decl.accesses,
                    layout: decl.layout,
                    queue: Some(queue),
                };
            } else {
                let is_texture = matches!(target, WalkTarget::Texture(..));
                if needs_barrier(&state, decl, is_texture) {
                    self.push_transition(position, Phase::Pre, &state, decl, target, None);
                }
                let coalesce_read = !decl.is_write()
                    && !state.accesses.is_write()
                    && state.layout == decl.layout;
                if coalesce_read {
                    state.stages |= decl.stages;
                    state.accesses |= decl.accesses;
                    state.queue = Some(queue);
                } else {
                    state = TrackedState {
                        stages: decl.stages,
                        accesses: decl.accesses,
                        layout: decl.layout,
                        queue: Some(queue),
                    };
                }
            }
            producer = Some(pass);
        }
        state
    }

    fn push_transition(
        &mut self,
        position: usize,
        phase: Phase,
        state: &TrackedState,
        decl: UseDecl,
        target: WalkTarget,
        ownership: Option<OwnershipTransfer>,
    ) {
        match target {
            WalkTarget::Texture(texture, key) => {
                let transition = TextureTransition {
                    texture,
                    key,
                    src_stages: state.stages,
                    src_accesses: state.accesses,
                    old_layout: state.layout,
                    dst_stages: decl.stages,
                    dst_accesses: decl.accesses,
                    new_layout: decl.layout,
                    ownership,
                };
                match phase {
                    Phase::Pre => self.buckets.pre_textures[position].push(transition),
                    Phase::Post => self.buckets.post_textures[position].push(transition),
                }
            }
            WalkTarget::Buffer(buffer) => {
                let barrier = PlannedBufferBarrier {
                    buffer,
                    src_stages: state.stages,
                    src_accesses: state.accesses,
                    dst_stages: decl.stages,
                    dst_accesses: decl.accesses,
                    ownership,
                };
                match phase {
                    Phase::Pre => self.buckets.pre_buffers[position].push(barrier),
                    Phase::Post => self.buckets.post_buffers[position].push(barrier),
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Phase {
    Pre,
    Post,
}

// ─── Compile Entry Point ──────────────────────────────────────────────────────

/// Compiles a declared graph into an execution plan.
///
/// Surfaces every plan-time configuration error: conflicting or read-only
/// uses, non-present-capable swapchain queues, and dependency cycles.
pub fn compile(graph: &RenderGraph) -> Result<ExecutionPlan> {
    let pass_count = graph.pass_count();

    // Step 1: use normalization, plus plan-time config checks.
    let mut normalized = Vec::with_capacity(pass_count);
    for index in 0..pass_count {
        let pass = PassRef(index as u32);
        let uses = normalize_pass(graph, pass)?;
        if let Some(swapchain) = graph.swapchain_texture() {
            let queue = graph.passes[index].queue();
            let touches_swapchain = uses
                .textures
                .iter()
                .any(|(texture, _, _)| *texture == swapchain);
            if touches_swapchain && !queue.supports_present {
                return Err(SableError::NonPresentQueue {
                    pass: graph.passes[index].name().to_owned(),
                    queue: queue.index,
                });
            }
        }
        normalized.push(uses);
    }

    // Subresource timelines in pass-creation order.
    let table_len = graph.buffers.len();
    let mut buffer_timelines: Vec<Vec<(PassRef, UseDecl)>> = vec![Vec::new(); table_len];
    let mut texture_timelines: Vec<Vec<Vec<(PassRef, UseDecl)>>> = vec![Vec::new(); table_len];
    for (index, uses) in normalized.iter().enumerate() {
        let pass = PassRef(index as u32);
        for &(buffer, decl) in &uses.buffers {
            buffer_timelines[buffer.index() as usize].push((pass, decl));
        }
        for &(texture, key, decl) in &uses.textures {
            let slot = &mut texture_timelines[texture.index() as usize];
            if slot.is_empty() {
                let count = graph.texture_resource(texture).desc().subresource_count();
                slot.resize(count as usize, Vec::new());
            }
            let desc = graph.texture_resource(texture).desc();
            slot[subresource_index(desc, key) as usize].push((pass, decl));
        }
    }

    // Step 2: implicit edges, plus the explicit ones.
    let mut edge_set: FxHashSet<(u32, u32)> = FxHashSet::default();
    let mut edges: Vec<(u32, u32)> = Vec::new();
    let add_edge = |edges: &mut Vec<(u32, u32)>,
                    edge_set: &mut FxHashSet<(u32, u32)>,
                    from: PassRef,
                    to: PassRef| {
        let pair = (from.index(), to.index());
        if pair.0 != pair.1 && edge_set.insert(pair) {
            edges.push(pair);
        }
    };

    for (index, pass) in graph.passes.iter().enumerate() {
        for &pred in &pass.explicit_predecessors {
            add_edge(&mut edges, &mut edge_set, pred, PassRef(index as u32));
        }
    }
    let add_timeline_edges = |edges: &mut Vec<(u32, u32)>,
                              edge_set: &mut FxHashSet<(u32, u32)>,
                              timeline: &[(PassRef, UseDecl)],
                              is_texture: bool| {
        for window in timeline.windows(2) {
            let (prev_pass, prev_decl) = window[0];
            let (next_pass, next_decl) = window[1];
            let prev_queue = graph.passes[prev_pass.index() as usize].queue();
            let next_queue = graph.passes[next_pass.index() as usize].queue();
            let hazard = prev_decl.is_write()
                || next_decl.is_write()
                || (is_texture && prev_decl.layout != next_decl.layout)
                || prev_queue.index != next_queue.index;
            if hazard {
                add_edge(edges, edge_set, prev_pass, next_pass);
            }
        }
    };
    for timeline in &buffer_timelines {
        add_timeline_edges(&mut edges, &mut edge_set, timeline, false);
    }
    for subresources in &texture_timelines {
        for timeline in subresources {
            add_timeline_edges(&mut edges, &mut edge_set, timeline, true);
        }
    }

    // Step 3: stable topological order.
    let order = topological_order(graph, &edges)?;
    let mut position = vec![0_u32; pass_count];
    for (pos, pass) in order.iter().enumerate() {
        position[pass.index() as usize] = pos as u32;
    }

    // Step 4: per-subresource state walk.
    let mut walk = WalkContext {
        graph,
        position: &position,
        buckets: TransitionBuckets::new(pass_count),
        cross_queue: Vec::new(),
    };

    let mut external_buffers = Vec::new();
    let mut external_textures = Vec::new();
    let mut transients = Vec::new();
    let mut swapchain_plan = None;

    for index in 0..table_len {
        // Buffers.
        if let Some(resource) = &graph.buffers[index] {
            let mut timeline = buffer_timelines[index].clone();
            timeline.sort_by_key(|(pass, _)| position[pass.index() as usize]);
            let buffer = BufferRef(index as u32);
            let initial = match resource {
                BufferResource::Internal { .. } => TrackedState::default(),
                BufferResource::External { external } => external.state(),
            };
            let final_state = walk.walk(initial, &timeline, WalkTarget::Buffer(buffer));
            match resource {
                BufferResource::Internal { .. } => {
                    if let Some(lifetime) =
                        transient_lifetime(ResourceRef::Buffer(buffer), &[timeline], &position)
                    {
                        transients.push(lifetime);
                    }
                }
                BufferResource::External { .. } => {
                    if !timeline.is_empty() {
                        external_buffers.push((buffer, final_state));
                    }
                }
            }
        }

        // Textures.
        if let Some(resource) = &graph.textures[index] {
            let texture = TextureRef(index as u32);
            let desc = resource.desc();
            let subresource_count = desc.subresource_count() as usize;
            let mut timelines: Vec<Vec<(PassRef, UseDecl)>> =
                if texture_timelines[index].is_empty() {
                    vec![Vec::new(); subresource_count]
                } else {
                    texture_timelines[index].clone()
                };
            for timeline in &mut timelines {
                timeline.sort_by_key(|(pass, _)| position[pass.index() as usize]);
            }

            let carried: Vec<TrackedState> = match resource {
                TextureResource::Internal { .. } => {
                    vec![TrackedState::default(); subresource_count]
                }
                TextureResource::External { external, .. } => external.states(),
                TextureResource::Swapchain { .. } => {
                    vec![TrackedState::present_source(); subresource_count]
                }
            };

            let mut finals = Vec::with_capacity(subresource_count);
            for (sub_index, key) in subresource_keys(desc).enumerate() {
                let timeline = &timelines[sub_index];
                let final_state =
                    walk.walk(carried[sub_index], timeline, WalkTarget::Texture(texture, key));
                finals.push(final_state);
            }

            match resource {
                TextureResource::Internal { .. } => {
                    if let Some(lifetime) =
                        transient_lifetime(ResourceRef::Texture(texture), &timelines, &position)
                    {
                        transients.push(lifetime);
                    }
                }
                TextureResource::External { .. } => {
                    if timelines.iter().any(|t| !t.is_empty()) {
                        external_textures.push((texture, finals));
                    }
                }
                TextureResource::Swapchain { .. } => {
                    let used: Vec<u32> = timelines
                        .iter()
                        .flatten()
                        .map(|(pass, _)| position[pass.index() as usize])
                        .collect();
                    if used.is_empty() {
                        log::warn!("swapchain image registered but never used; skipping handshake");
                    } else {
                        let first_use = *used.iter().min().unwrap_or(&0);
                        let last_use = *used.iter().max().unwrap_or(&0);
                        swapchain_plan = Some(SwapchainPlan {
                            texture,
                            first_use,
                            last_use,
                        });
                        // Final transition back to the presentable layout.
                        for (sub_index, key) in subresource_keys(desc).enumerate() {
                            if timelines[sub_index].is_empty() {
                                continue;
                            }
                            let state = finals[sub_index];
                            walk.buckets.post_textures[last_use as usize].push(
                                TextureTransition {
                                    texture,
                                    key,
                                    src_stages: state.stages,
                                    src_accesses: state.accesses,
                                    old_layout: state.layout,
                                    dst_stages: PipelineStages::empty(),
                                    dst_accesses: Accesses::empty(),
                                    new_layout: TextureLayout::Present,
                                    ownership: None,
                                },
                            );
                        }
                    }
                }
            }
        }
    }

    // Step 5: batch transitions into per-pass barrier sets.
    let mut records: Vec<PassRecord> = Vec::with_capacity(pass_count);
    for pos in 0..pass_count {
        records.push(PassRecord {
            pre: BarrierSet {
                buffers: std::mem::take(&mut walk.buckets.pre_buffers[pos]),
                textures: batch_texture_transitions(&walk.buckets.pre_textures[pos]),
            },
            post: BarrierSet {
                buffers: std::mem::take(&mut walk.buckets.post_buffers[pos]),
                textures: batch_texture_transitions(&walk.buckets.post_textures[pos]),
            },
        });
    }

    // Submission groups: boundary on queue change or after a signal fence.
    let mut groups: Vec<SubmissionGroup> = Vec::new();
    for (pos, pass) in order.iter().enumerate() {
        let record = &graph.passes[pass.index() as usize];
        let queue = record.queue();
        let start_new = match groups.last() {
            None => true,
            Some(group) => {
                group.queue.index != queue.index || group.fence.is_some()
            }
        };
        if start_new {
            groups.push(SubmissionGroup {
                queue,
                first: pos as u32,
                len: 0,
                waits: SmallVec::new(),
                fence: None,
                wait_swapchain_acquire: false,
                signal_swapchain_present: false,
            });
        }
        if let Some(group) = groups.last_mut() {
            group.len += 1;
            if let Some(fence) = record.signal_fence {
                group.fence = Some(fence);
            }
        }
    }

    let group_of = |pos: u32, groups: &[SubmissionGroup]| -> u32 {
        groups
            .iter()
            .position(|g| pos >= g.first && pos < g.first + g.len)
            .map_or(0, |i| i as u32)
    };

    // Cross-queue semaphore waits between groups.
    let mut edge_list: Vec<(u32, u32)> = edges.clone();
    edge_list.sort_unstable();
    for (from, to) in edge_list {
        let from_queue = graph.passes[from as usize].queue();
        let to_queue = graph.passes[to as usize].queue();
        if from_queue.index == to_queue.index {
            continue;
        }
        let donor_group = group_of(position[from as usize], &groups);
        let consumer_group = group_of(position[to as usize], &groups);
        if donor_group == consumer_group {
            continue;
        }
        let mut stages = PipelineStages::empty();
        for &(donor_pos, consumer_pos, wait_stages) in &walk.cross_queue {
            if donor_pos == position[from as usize] && consumer_pos == position[to as usize] {
                stages |= wait_stages;
            }
        }
        if stages.is_empty() {
            stages = PipelineStages::ALL_COMMANDS;
        }
        let consumer = &mut groups[consumer_group as usize];
        if let Some(wait) = consumer.waits.iter_mut().find(|w| w.donor == donor_group) {
            wait.stages |= stages;
        } else {
            consumer.waits.push(GroupWait {
                donor: donor_group,
                stages,
            });
        }
    }

    // Step 6: swapchain handshake flags on the owning groups.
    if let Some(plan) = swapchain_plan {
        let first_group = group_of(plan.first_use, &groups) as usize;
        let last_group = group_of(plan.last_use, &groups) as usize;
        groups[first_group].wait_swapchain_acquire = true;
        groups[last_group].signal_swapchain_present = true;
    }

    let barrier_count: usize = records.iter().map(|r| r.pre.len() + r.post.len()).sum();
    log::debug!(
        "compiled plan: {pass_count} passes, {} groups, {barrier_count} barriers, {} transients",
        groups.len(),
        transients.len()
    );

    Ok(ExecutionPlan {
        order,
        records,
        groups,
        transients,
        external_buffers,
        external_textures,
        swapchain: swapchain_plan,
    })
}

/// Derives the lifetime record of one internal resource, or `None` when no
/// pass uses it (nothing to back).
fn transient_lifetime(
    resource: ResourceRef,
    timelines: &[Vec<(PassRef, UseDecl)>],
    position: &[u32],
) -> Option<TransientLifetime> {
    let mut first_use = u32::MAX;
    let mut last_use = 0_u32;
    for timeline in timelines {
        for (pass, _) in timeline {
            let pos = position[pass.index() as usize];
            first_use = first_use.min(pos);
            last_use = last_use.max(pos);
        }
    }
    if first_use == u32::MAX {
        return None;
    }

    let mut first_stages = PipelineStages::empty();
    let mut first_accesses = Accesses::empty();
    let mut last_stages = PipelineStages::empty();
    let mut last_accesses = Accesses::empty();
    for timeline in timelines {
        for (pass, decl) in timeline {
            let pos = position[pass.index() as usize];
            if pos == first_use {
                first_stages |= decl.stages;
                first_accesses |= decl.accesses;
            }
            if pos == last_use {
                last_stages |= decl.stages;
                last_accesses |= decl.accesses;
            }
        }
    }

    Some(TransientLifetime {
        resource,
        first_use,
        last_use,
        first_stages,
        first_accesses,
        last_stages,
        last_accesses,
    })
}

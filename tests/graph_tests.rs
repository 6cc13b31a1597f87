//! End-to-End Graph Scenarios
//!
//! Drives declared graphs through the executor against the recording mock
//! backend and asserts the exact barrier, layout and submission streams:
//! - clear → sample → present swapchain handshake
//! - read-after-read barrier elision
//! - compute-write → vertex-read hazard
//! - transient aliasing with discard barriers
//! - cross-queue release/acquire with semaphore wiring
//! - deterministic, creation-order-stable topological ordering

mod common;

use common::{Event, MockDevice, MockPool, compute_queue, graphics_queue};
use sable::rhi::{
    Accesses, BufferDesc, BufferUsages, FenceHandle, Format, HostAccess, PipelineStages,
    SemaphoreHandle, TextureDesc, TextureHandle, TextureLayout, TextureUsages,
    TransferDirection,
};
use sable::{Executor, RenderGraph, SwapchainFrame, compile, uses};

fn color_target_desc(width: u32, height: u32) -> TextureDesc {
    TextureDesc::new_2d(
        Format::R8G8B8A8Unorm,
        width,
        height,
        TextureUsages::SAMPLED | TextureUsages::CLEAR_COLOR | TextureUsages::COLOR_ATTACHMENT,
    )
}

fn storage_buffer_desc(size: u64) -> BufferDesc {
    BufferDesc {
        size,
        usage: BufferUsages::SHADER_RESOURCE | BufferUsages::UNORDERED_ACCESS,
        host_access: HostAccess::None,
    }
}

fn swapchain_frame() -> SwapchainFrame {
    SwapchainFrame {
        texture: TextureHandle(1),
        desc: TextureDesc::new_2d(
            Format::B8G8R8A8Unorm,
            1280,
            720,
            TextureUsages::COLOR_ATTACHMENT,
        ),
        acquire_semaphore: SemaphoreHandle(100),
        present_semaphore: SemaphoreHandle(101),
    }
}

// ─── S1: clear → sample → present ─────────────────────────────────────────────

#[test]
fn clear_sample_present_emits_expected_barriers() {
    let mut graph = RenderGraph::new(graphics_queue());
    let texture = graph.create_texture(&color_target_desc(16, 16), "lut");
    let backbuffer = graph.register_swapchain_texture(swapchain_frame()).unwrap();

    let clear = graph.create_pass("clear");
    graph.pass(clear).use_texture(texture, uses::CLEAR_DST).unwrap();
    let draw = graph.create_pass("draw");
    graph
        .pass(draw)
        .use_texture(texture, uses::PS_TEXTURE)
        .unwrap()
        .use_texture(backbuffer, uses::RENDER_TARGET)
        .unwrap();
    graph.set_complete_fence(FenceHandle(7));

    let mut device = MockDevice::new();
    let mut pool = MockPool::new();
    Executor::new()
        .execute(graph, &mut device, &mut pool)
        .unwrap();

    let batches = device.barrier_batches();
    assert_eq!(batches.len(), 3, "pre-clear, pre-draw, post-draw");

    // Pre-clear: the transient texture enters the clear layout.
    assert_eq!(batches[0].textures.len(), 1);
    assert_eq!(batches[0].textures[0].old_layout, TextureLayout::Undefined);
    assert_eq!(batches[0].textures[0].new_layout, TextureLayout::ClearDst);

    // Pre-draw: sampled transition plus the swapchain acquire transition.
    assert_eq!(batches[1].textures.len(), 2);
    let sampled = &batches[1].textures[0];
    assert_eq!(sampled.old_layout, TextureLayout::ClearDst);
    assert_eq!(sampled.new_layout, TextureLayout::ShaderReadOnly);
    assert_eq!(sampled.src_stages, PipelineStages::CLEAR);
    assert_eq!(sampled.dst_stages, PipelineStages::FRAGMENT_SHADER);
    let acquire = &batches[1].textures[1];
    assert_eq!(acquire.texture, TextureHandle(1));
    assert_eq!(acquire.old_layout, TextureLayout::Present);
    assert_eq!(acquire.new_layout, TextureLayout::ColorAttachment);

    // Post-draw: back to the presentable layout.
    assert_eq!(batches[2].textures.len(), 1);
    assert_eq!(batches[2].textures[0].texture, TextureHandle(1));
    assert_eq!(batches[2].textures[0].new_layout, TextureLayout::Present);

    // One submission: waits on acquire at color-attachment-output, signals
    // present, signals the completion fence.
    let submissions = device.submissions();
    assert_eq!(submissions.len(), 1);
    let (queue, waits, signals, fence) = &submissions[0];
    assert_eq!(*queue, 0);
    assert_eq!(
        waits.as_slice(),
        &[(
            SemaphoreHandle(100),
            PipelineStages::COLOR_ATTACHMENT_OUTPUT
        )]
    );
    assert_eq!(signals.as_slice(), &[SemaphoreHandle(101)]);
    assert_eq!(*fence, Some(FenceHandle(7)));
}

// ─── S2: read-after-read needs nothing ────────────────────────────────────────

#[test]
fn read_after_read_same_queue_emits_no_barrier() {
    let mut graph = RenderGraph::new(graphics_queue());
    let buffer = graph.create_buffer(&storage_buffer_desc(4096), "particles");

    let seed = graph.create_pass("seed");
    graph
        .pass(seed)
        .use_buffer(buffer, uses::CS_RW_BUFFER_WRITE_ONLY)
        .unwrap();
    for name in ["simulate-a", "simulate-b"] {
        let pass = graph.create_pass(name);
        graph.pass(pass).use_buffer(buffer, uses::CS_BUFFER).unwrap();
    }

    let mut device = MockDevice::new();
    let mut pool = MockPool::new();
    Executor::new()
        .execute(graph, &mut device, &mut pool)
        .unwrap();

    // Exactly one barrier: write → first read. The second read coalesces.
    let batches = device.barrier_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].buffers.len(), 1);
}

// ─── S3: compute write → vertex read ──────────────────────────────────────────

#[test]
fn compute_write_to_vertex_read_emits_one_memory_barrier() {
    let mut graph = RenderGraph::new(graphics_queue());
    let buffer = graph.create_buffer(&storage_buffer_desc(65536), "skinning");

    let write = graph.create_pass("skin");
    graph
        .pass(write)
        .use_buffer(buffer, uses::CS_RW_STRUCTURED_BUFFER_WRITE_ONLY)
        .unwrap()
        .set_callback(move |ctx| {
            let handle = ctx.buffer(buffer);
            ctx.cmd().fill_buffer(handle, 0, 65536, 0);
            Ok::<_, std::convert::Infallible>(())
        });
    let read = graph.create_pass("draw");
    graph
        .pass(read)
        .use_buffer(buffer, uses::VS_STRUCTURED_BUFFER)
        .unwrap();

    let mut device = MockDevice::new();
    let mut pool = MockPool::new();
    Executor::new()
        .execute(graph, &mut device, &mut pool)
        .unwrap();

    let batches = device.barrier_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].buffers.len(), 1);
    let barrier = &batches[0].buffers[0];
    assert_eq!(barrier.src_stages, PipelineStages::COMPUTE_SHADER);
    assert_eq!(barrier.src_accesses, Accesses::SHADER_WRITE);
    assert_eq!(barrier.dst_stages, PipelineStages::VERTEX_SHADER);
    assert_eq!(barrier.dst_accesses, Accesses::SHADER_READ);

    // Dependency soundness: the producer's commands precede the barrier.
    let events = device.events();
    let fill = events
        .iter()
        .position(|e| matches!(e, Event::FillBuffer { .. }))
        .unwrap();
    let barrier_event = events
        .iter()
        .position(|e| matches!(e, Event::Barrier(b) if !b.buffers.is_empty()))
        .unwrap();
    assert!(fill < barrier_event);
}

// ─── S4: disjoint lifetimes alias one slice ───────────────────────────────────

#[test]
fn disjoint_textures_alias_with_discard_barrier() {
    let mut graph = RenderGraph::new(graphics_queue());
    let first = graph.create_texture(&color_target_desc(1024, 1024), "bloom-a");
    let second = graph.create_texture(&color_target_desc(1024, 1024), "bloom-b");

    for (texture, names) in [
        (first, ["clear-a", "sample-a1", "sample-a2"]),
        (second, ["clear-b", "sample-b1", "sample-b2"]),
    ] {
        let clear = graph.create_pass(names[0]);
        graph.pass(clear).use_texture(texture, uses::CLEAR_DST).unwrap();
        for name in &names[1..] {
            let pass = graph.create_pass(*name);
            graph.pass(pass).use_texture(texture, uses::PS_TEXTURE).unwrap();
        }
    }

    let mut device = MockDevice::new();
    let mut pool = MockPool::new();
    Executor::new()
        .execute(graph, &mut device, &mut pool)
        .unwrap();

    // Same category, disjoint lifetimes: both land on the same slice.
    let placements: Vec<_> = device
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::CreatePlacedTexture { block, offset, .. } => Some((block, offset)),
            _ => None,
        })
        .collect();
    assert_eq!(placements.len(), 2);
    assert_eq!(placements[0], placements[1]);
    assert_eq!(pool.acquired.len(), 1);

    // The second texture's first transition discards from Undefined but
    // waits for the first texture's final reads.
    let batches = device.barrier_batches();
    let discard = batches
        .iter()
        .flat_map(|b| &b.textures)
        .find(|b| {
            b.old_layout == TextureLayout::Undefined
                && b.src_stages.contains(PipelineStages::FRAGMENT_SHADER)
        })
        .expect("aliasing discard barrier");
    assert_eq!(discard.new_layout, TextureLayout::ClearDst);
    assert!(discard.src_accesses.contains(Accesses::SHADER_READ));
}

// ─── S5: cross-queue release/acquire ──────────────────────────────────────────

#[test]
fn cross_queue_edge_emits_release_acquire_and_semaphore() {
    let mut graph = RenderGraph::new(graphics_queue());
    let buffer = graph.create_buffer(&storage_buffer_desc(4096), "culled");

    let produce = graph.create_pass("cull");
    graph
        .pass(produce)
        .set_queue(compute_queue())
        .use_buffer(buffer, uses::CS_RW_BUFFER_WRITE_ONLY)
        .unwrap();
    let consume = graph.create_pass("draw");
    graph
        .pass(consume)
        .use_buffer(buffer, uses::VS_STRUCTURED_BUFFER)
        .unwrap()
        .depends_on(produce);

    let mut device = MockDevice::new();
    let mut pool = MockPool::new();
    Executor::new()
        .execute(graph, &mut device, &mut pool)
        .unwrap();

    let batches = device.barrier_batches();
    let release = batches
        .iter()
        .flat_map(|b| &b.buffers)
        .find(|b| {
            b.ownership
                .is_some_and(|o| o.direction == TransferDirection::Release)
        })
        .expect("release barrier on the donor queue");
    assert_eq!(release.ownership.unwrap().src_family, 1);
    assert_eq!(release.ownership.unwrap().dst_family, 0);

    let acquire = batches
        .iter()
        .flat_map(|b| &b.buffers)
        .find(|b| {
            b.ownership
                .is_some_and(|o| o.direction == TransferDirection::Acquire)
        })
        .expect("acquire barrier on the recipient queue");
    assert_eq!(acquire.dst_stages, PipelineStages::VERTEX_SHADER);

    // Two submissions; the compute one signals the semaphore the graphics
    // one waits on, at the consumer's stages.
    let submissions = device.submissions();
    assert_eq!(submissions.len(), 2);
    let (compute, _, compute_signals, _) = &submissions[0];
    let (gfx, gfx_waits, _, _) = &submissions[1];
    assert_eq!((*compute, *gfx), (1, 0));
    assert_eq!(compute_signals.len(), 1);
    assert_eq!(gfx_waits.len(), 1);
    assert_eq!(gfx_waits[0].0, compute_signals[0]);
    assert_eq!(gfx_waits[0].1, PipelineStages::VERTEX_SHADER);

    // Stream order: release, compute submit, acquire, graphics submit.
    let events = device.events();
    let positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match e {
            Event::Barrier(b) if b.buffers.iter().any(|x| x.ownership.is_some()) => Some(i),
            Event::Submit { .. } => Some(i),
            _ => None,
        })
        .collect();
    assert_eq!(positions.len(), 4);
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

// ─── S6: stable creation-order topology ───────────────────────────────────────

#[test]
fn unconstrained_passes_keep_creation_order() {
    let mut graph = RenderGraph::new(graphics_queue());
    for index in 0..5 {
        graph.create_pass(format!("pass-{index}"));
    }
    let plan = compile(&graph).unwrap();
    let order: Vec<u32> = plan.order.iter().map(|p| p.index()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}

#[test]
fn explicit_edge_overrides_only_its_pair() {
    let mut graph = RenderGraph::new(graphics_queue());
    let passes: Vec<_> = (0..5).map(|i| graph.create_pass(format!("p{i}"))).collect();
    // p3 must run before p0; everything else keeps creation order.
    graph.pass(passes[0]).depends_on(passes[3]);
    let plan = compile(&graph).unwrap();
    let order: Vec<u32> = plan.order.iter().map(|p| p.index()).collect();
    let position = |i: u32| order.iter().position(|&p| p == i).unwrap();
    assert!(position(3) < position(0));
    assert!(position(1) < position(2));
}

// ─── Determinism ──────────────────────────────────────────────────────────────

#[test]
fn identical_graphs_compile_to_identical_plans() {
    fn build() -> RenderGraph {
        let mut graph = RenderGraph::new(graphics_queue());
        let color = graph.create_texture(&color_target_desc(256, 256), "color");
        let buffer = graph.create_buffer(&storage_buffer_desc(8192), "lights");
        let cull = graph.create_pass("cull");
        graph
            .pass(cull)
            .use_buffer(buffer, uses::CS_RW_BUFFER_WRITE_ONLY)
            .unwrap();
        let clear = graph.create_pass("clear");
        graph.pass(clear).use_texture(color, uses::CLEAR_DST).unwrap();
        let draw = graph.create_pass("draw");
        graph
            .pass(draw)
            .use_buffer(buffer, uses::VS_STRUCTURED_BUFFER)
            .unwrap()
            .use_texture(color, uses::RENDER_TARGET)
            .unwrap();
        graph
    }
    assert_eq!(compile(&build()).unwrap(), compile(&build()).unwrap());
}

// ─── Mip-range collapse ───────────────────────────────────────────────────────

#[test]
fn full_mip_chain_transitions_collapse_to_one_barrier() {
    let mut graph = RenderGraph::new(graphics_queue());
    let mut desc = color_target_desc(256, 256);
    desc.mip_levels = 4;
    let chain = graph.create_texture(&desc, "mip-chain");

    let clear = graph.create_pass("clear");
    graph.pass(clear).use_texture(chain, uses::CLEAR_DST).unwrap();
    let sample = graph.create_pass("sample");
    graph.pass(sample).use_texture(chain, uses::PS_TEXTURE).unwrap();

    let mut device = MockDevice::new();
    let mut pool = MockPool::new();
    Executor::new()
        .execute(graph, &mut device, &mut pool)
        .unwrap();

    let batches = device.barrier_batches();
    assert_eq!(batches.len(), 2);
    for batch in &batches {
        assert_eq!(batch.textures.len(), 1, "4 mips collapse into one range");
        assert_eq!(batch.textures[0].range.mip_count, 4);
    }
}

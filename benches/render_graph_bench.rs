//! Compile-time benchmark: a mid-sized frame with chained post-processing
//! passes, measuring the full normalize → sort → walk → batch pipeline.

use criterion::{Criterion, criterion_group, criterion_main};

use sable::rhi::{Format, Queue, TextureDesc, TextureUsages};
use sable::{RenderGraph, compile, uses};

fn build_frame(pass_chains: u32) -> RenderGraph {
    let queue = Queue {
        index: 0,
        family: 0,
        supports_present: true,
    };
    let mut graph = RenderGraph::new(queue);
    let desc = TextureDesc::new_2d(
        Format::R16G16B16A16Float,
        1920,
        1080,
        TextureUsages::SAMPLED | TextureUsages::COLOR_ATTACHMENT | TextureUsages::CLEAR_COLOR,
    );

    let mut previous = None;
    for chain in 0..pass_chains {
        let color = graph.create_texture(&desc, format!("color-{chain}"));
        let clear = graph.create_pass(format!("clear-{chain}"));
        graph.pass(clear).use_texture(color, uses::CLEAR_DST).unwrap();
        let draw = graph.create_pass(format!("draw-{chain}"));
        {
            let mut scope = graph.pass(draw);
            scope.use_texture(color, uses::RENDER_TARGET).unwrap();
            if let Some(previous) = previous {
                scope.use_texture(previous, uses::PS_TEXTURE).unwrap();
            }
        }
        previous = Some(color);
    }
    graph
}

fn bench_compile(c: &mut Criterion) {
    let graph = build_frame(32);
    c.bench_function("compile_64_pass_frame", |b| {
        b.iter(|| compile(&graph).unwrap());
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # Sable
//!
//! A retained-mode GPU render graph core for explicit graphics APIs
//! (Vulkan 1.3 class, D3D12 class).
//!
//! Applications declare a per-frame graph of passes and resource uses; the
//! core computes minimal pipeline-barrier sequences, backs internal resources
//! by aliasing pooled memory across disjoint lifetimes, orders passes
//! deterministically, and emits a linear command stream with the correct
//! semaphore and fence wiring, including the swapchain acquire/present
//! handshake.
//!
//! The graphics backend stays behind the narrow service traits in [`rhi`];
//! the core never touches a native API.
//!
//! ```ignore
//! let mut graph = RenderGraph::new(gfx_queue);
//! let color = graph.create_texture(&color_desc, "scene-color");
//! let backbuffer = graph.register_swapchain(&swapchain)?;
//!
//! let draw = graph.create_pass("draw");
//! graph.pass(draw)
//!     .use_texture(color, uses::RENDER_TARGET)?
//!     .set_callback(|ctx| { /* record draws */ Ok::<_, Infallible>(()) });
//!
//! let blit = graph.create_blit_texture_pass(
//!     "present-blit", color, backbuffer, BlitFilter::Point, 1.0)?;
//!
//! graph.set_complete_fence(frame_fence);
//! executor.execute(graph, &mut device, &mut transient_pool)?;
//! ```

pub mod alias;
pub mod barrier;
pub mod compile;
pub mod errors;
pub mod execute;
pub mod graph;
pub mod label;
pub mod pass;
pub mod resource;
pub mod rhi;
mod utility;

pub use alias::{AliasedPair, Placement, TransientAllocator};
pub use compile::{ExecutionPlan, SubmissionGroup, compile};
pub use errors::{Result, SableError};
pub use execute::{Executor, PassContext};
pub use graph::{PassScope, RenderGraph, Swapchain};
pub use label::LabelStack;
pub use pass::{PassRef, UseDecl, uses};
pub use resource::{
    BufferRef, ExternalBuffer, ExternalTexture, ResourceRef, SwapchainFrame, TextureRef, TlasRef,
    TrackedState,
};

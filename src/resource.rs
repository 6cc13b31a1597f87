//! Graph Resources
//!
//! Per-frame resource records and the cross-frame tracked state of external
//! resources.
//!
//! # Resource Kinds
//!
//! | Kind | Lifetime | Backing |
//! |------|----------|---------|
//! | Internal buffer / texture | One frame | Transient allocator (aliased) |
//! | External buffer / texture | Application-owned | Live backend handle |
//! | Swapchain texture | One frame | Backend swapchain image |
//! | TLAS | Application-owned | Wraps a backing buffer resource |
//!
//! Internal resources are declared by description and receive physical
//! backing only during execution. External resources enter the graph with a
//! carried-in [`TrackedState`] and receive their final observed state back
//! when the frame's plan retires ("flush-back").
//!
//! # State Tracking Granularity
//!
//! Buffers are tracked whole; textures are tracked per subresource
//! `(mip, layer, aspect)`. The tracked state always reflects the most recent
//! producer, never the next consumer.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::rhi::{
    Accesses, BufferDesc, BufferHandle, Format, PipelineStages, Queue, SemaphoreHandle,
    SubresourceKey, TextureDesc, TextureHandle, TextureLayout, TlasHandle,
};

// ─── Resource References ──────────────────────────────────────────────────────

/// Reference to a buffer resource of one graph.
///
/// Indices are stable for the lifetime of the graph and shared with the
/// texture table: a buffer and a texture never carry the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferRef(pub(crate) u32);

/// Reference to a texture resource of one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureRef(pub(crate) u32);

/// Reference to a registered TLAS wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlasRef(pub(crate) u32);

impl BufferRef {
    /// The linear index of this resource within the graph.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl TextureRef {
    /// The linear index of this resource within the graph.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Either kind of graph resource, ordered by linear index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceRef {
    Buffer(BufferRef),
    Texture(TextureRef),
}

// ─── Tracked State ────────────────────────────────────────────────────────────

/// Most recent producer state of one subresource.
///
/// `layout` is meaningful for textures only; buffer states keep the default.
/// `queue` is `None` until some pass has owned the subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackedState {
    pub stages: PipelineStages,
    pub accesses: Accesses,
    pub layout: TextureLayout,
    pub queue: Option<Queue>,
}

impl TrackedState {
    /// The carried-in state of a presentable swapchain image.
    #[must_use]
    pub fn present_source() -> Self {
        Self {
            layout: TextureLayout::Present,
            ..Self::default()
        }
    }
}

// ─── Subresource Addressing ───────────────────────────────────────────────────

/// Linear index of `key` within the tracking table of a texture with `desc`.
///
/// Layout: aspects outermost (tracking order), then layers, then mips.
#[must_use]
pub fn subresource_index(desc: &TextureDesc, key: SubresourceKey) -> u32 {
    let aspects = desc.format.aspects();
    let mut aspect_index = 0;
    for aspect in crate::rhi::TextureAspect::ORDERED {
        if aspect == key.aspect {
            break;
        }
        if aspects.contains(aspect.mask()) {
            aspect_index += 1;
        }
    }
    (aspect_index * desc.array_layers + key.layer) * desc.mip_levels + key.mip
}

/// Iterates every subresource key of a texture in tracking order.
pub fn subresource_keys(desc: &TextureDesc) -> impl Iterator<Item = SubresourceKey> + '_ {
    let aspects = desc.format.aspects();
    crate::rhi::TextureAspect::ORDERED
        .into_iter()
        .filter(move |aspect| aspects.contains(aspect.mask()))
        .flat_map(move |aspect| {
            (0..desc.array_layers).flat_map(move |layer| {
                (0..desc.mip_levels).map(move |mip| SubresourceKey { aspect, layer, mip })
            })
        })
}

// ─── External Resources ───────────────────────────────────────────────────────

/// An application-owned buffer participating in graphs.
///
/// The graph borrows the handle and flushes the final tracked state back
/// into `state` when the frame retires, so the next frame's graph carries
/// the correct barrier source.
#[derive(Debug)]
pub struct ExternalBuffer {
    pub handle: BufferHandle,
    pub desc: BufferDesc,
    pub name: String,
    /// Stride used when the backend builds a default structured view.
    pub default_struct_stride: Option<u64>,
    /// Format used when the backend builds a default texel view.
    pub default_texel_format: Option<Format>,
    state: Mutex<TrackedState>,
}

impl ExternalBuffer {
    /// Wraps a backend buffer with an empty tracked state.
    #[must_use]
    pub fn new(handle: BufferHandle, desc: BufferDesc, name: impl Into<String>) -> Self {
        Self {
            handle,
            desc,
            name: name.into(),
            default_struct_stride: None,
            default_texel_format: None,
            state: Mutex::new(TrackedState::default()),
        }
    }

    /// The current tracked state.
    #[must_use]
    pub fn state(&self) -> TrackedState {
        *self.state.lock()
    }

    /// Replaces the tracked state (flush-back path).
    pub fn set_state(&self, state: TrackedState) {
        *self.state.lock() = state;
    }
}

/// An application-owned texture participating in graphs.
///
/// Tracked per subresource; see [`subresource_index`] for table layout.
#[derive(Debug)]
pub struct ExternalTexture {
    pub handle: TextureHandle,
    pub desc: TextureDesc,
    pub name: String,
    states: Mutex<Vec<TrackedState>>,
}

impl ExternalTexture {
    /// Wraps a backend texture with a uniform carried-in layout.
    #[must_use]
    pub fn new(
        handle: TextureHandle,
        desc: TextureDesc,
        name: impl Into<String>,
        layout: TextureLayout,
    ) -> Self {
        let state = TrackedState {
            layout,
            ..TrackedState::default()
        };
        let count = desc.subresource_count() as usize;
        Self {
            handle,
            desc,
            name: name.into(),
            states: Mutex::new(vec![state; count]),
        }
    }

    /// Snapshot of every subresource state in tracking order.
    #[must_use]
    pub fn states(&self) -> Vec<TrackedState> {
        self.states.lock().clone()
    }

    /// The tracked state of one subresource.
    #[must_use]
    pub fn state(&self, key: SubresourceKey) -> TrackedState {
        self.states.lock()[subresource_index(&self.desc, key) as usize]
    }

    /// Replaces every subresource state (flush-back path).
    ///
    /// # Panics
    ///
    /// Panics if `states` does not match the texture's subresource count.
    pub fn set_states(&self, states: Vec<TrackedState>) {
        let mut guard = self.states.lock();
        assert_eq!(guard.len(), states.len(), "subresource count mismatch");
        *guard = states;
    }
}

/// Everything the graph needs from one acquired swapchain image.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainFrame {
    pub texture: TextureHandle,
    pub desc: TextureDesc,
    pub acquire_semaphore: SemaphoreHandle,
    pub present_semaphore: SemaphoreHandle,
}

// ─── Resource Records ─────────────────────────────────────────────────────────

/// One entry of the graph's buffer table.
#[derive(Debug)]
pub enum BufferResource {
    Internal {
        desc: BufferDesc,
        name: String,
        default_struct_stride: Option<u64>,
        default_texel_format: Option<Format>,
    },
    External {
        external: Arc<ExternalBuffer>,
    },
}

impl BufferResource {
    /// Display name of the resource.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Internal { name, .. } => name,
            Self::External { external } => &external.name,
        }
    }

    /// The resource's description.
    #[must_use]
    pub fn desc(&self) -> &BufferDesc {
        match self {
            Self::Internal { desc, .. } => desc,
            Self::External { external } => &external.desc,
        }
    }

    /// Whether the resource is transient (graph-owned).
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Stride the backend uses for the buffer's default structured view.
    #[must_use]
    pub fn default_struct_stride(&self) -> Option<u64> {
        match self {
            Self::Internal {
                default_struct_stride,
                ..
            } => *default_struct_stride,
            Self::External { external } => external.default_struct_stride,
        }
    }

    /// Format the backend uses for the buffer's default texel view.
    #[must_use]
    pub fn default_texel_format(&self) -> Option<Format> {
        match self {
            Self::Internal {
                default_texel_format,
                ..
            } => *default_texel_format,
            Self::External { external } => external.default_texel_format,
        }
    }
}

/// One entry of the graph's texture table.
#[derive(Debug)]
pub enum TextureResource {
    Internal {
        desc: TextureDesc,
        name: String,
    },
    External {
        external: Arc<ExternalTexture>,
        /// Registered through the read-only path; write uses are rejected at
        /// plan time.
        read_only: bool,
    },
    Swapchain {
        frame: SwapchainFrame,
    },
}

impl TextureResource {
    /// Display name of the resource.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Internal { name, .. } => name,
            Self::External { external, .. } => &external.name,
            Self::Swapchain { .. } => "swapchain",
        }
    }

    /// The resource's description.
    #[must_use]
    pub fn desc(&self) -> &TextureDesc {
        match self {
            Self::Internal { desc, .. } => desc,
            Self::External { external, .. } => &external.desc,
            Self::Swapchain { frame } => &frame.desc,
        }
    }

    /// Whether the resource is transient (graph-owned).
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// A registered TLAS wrapper.
///
/// The backing buffer is an independent first-class resource; the wrapper
/// holds its index, never ownership. State tracking of the TLAS is the
/// backing buffer's state tracking.
#[derive(Debug, Clone, Copy)]
pub struct TlasResource {
    pub handle: TlasHandle,
    pub backing: BufferRef,
}

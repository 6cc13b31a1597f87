//! Passes and Use Declarations
//!
//! A pass is one unit of GPU work: a name, the queue it runs on, the set of
//! declared resource uses, explicit predecessor edges, and a callback that
//! records commands during execution. Uses are never inferred from shaders;
//! every access a pass performs must be declared through a [`UseDecl`].
//!
//! The [`uses`] module provides the closed set of standard declarations
//! (`COPY_SRC`, `CS_RW_TEXTURE`, `RENDER_TARGET`, ...) each lowering to a
//! concrete `(stages, accesses, layout)` triple.

use smallvec::SmallVec;

use crate::label::LabelNodeId;
use crate::resource::{BufferRef, ResourceRef, TextureRef};
use crate::rhi::{Accesses, FenceHandle, PipelineStages, Queue, SubresourceKey, TextureLayout};

// ─── Pass Reference ───────────────────────────────────────────────────────────

/// Reference to a pass of one graph; doubles as the creation-order index used
/// for deterministic tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassRef(pub(crate) u32);

impl PassRef {
    /// Creation index of the pass.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

// ─── Use Declarations ─────────────────────────────────────────────────────────

/// How a pass touches one resource: pipeline stages, access kinds and, for
/// textures, the image layout the access requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseDecl {
    pub stages: PipelineStages,
    pub accesses: Accesses,
    /// Required image layout; ignored for buffers.
    pub layout: TextureLayout,
}

impl UseDecl {
    /// Returns `true` when the declaration contains any write-kind access.
    #[inline]
    #[must_use]
    pub const fn is_write(self) -> bool {
        self.accesses.is_write()
    }
}

/// The standard use-declaration constants.
///
/// These form the closed vocabulary user code draws from; each lowers to a
/// concrete synchronization triple.
pub mod uses {
    use super::UseDecl;
    use crate::rhi::{Accesses as A, PipelineStages as S, TextureLayout as L};

    const fn decl(stages: S, accesses: A, layout: L) -> UseDecl {
        UseDecl {
            stages,
            accesses,
            layout,
        }
    }

    /// Source of a copy.
    pub const COPY_SRC: UseDecl = decl(S::COPY, A::COPY_READ, L::CopySrc);
    /// Destination of a copy.
    pub const COPY_DST: UseDecl = decl(S::COPY, A::COPY_WRITE, L::CopyDst);
    /// Destination of a clear.
    pub const CLEAR_DST: UseDecl = decl(S::CLEAR, A::CLEAR_WRITE, L::ClearDst);
    /// Vertex buffer input.
    pub const VERTEX_BUFFER: UseDecl = decl(S::VERTEX_INPUT, A::VERTEX_ATTRIBUTE_READ, L::Undefined);
    /// Index buffer input.
    pub const INDEX_BUFFER: UseDecl = decl(S::VERTEX_INPUT, A::INDEX_READ, L::Undefined);
    /// Indirect draw/dispatch argument buffer.
    pub const INDIRECT_ARG: UseDecl = decl(S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, L::Undefined);
    /// Structured buffer read from the vertex shader.
    pub const VS_STRUCTURED_BUFFER: UseDecl = decl(S::VERTEX_SHADER, A::SHADER_READ, L::Undefined);
    /// Sampled texture read from the pixel shader.
    pub const PS_TEXTURE: UseDecl = decl(S::FRAGMENT_SHADER, A::SHADER_READ, L::ShaderReadOnly);
    /// Buffer read from a compute shader.
    pub const CS_BUFFER: UseDecl = decl(S::COMPUTE_SHADER, A::SHADER_READ, L::Undefined);
    /// Write-only RW buffer from a compute shader.
    pub const CS_RW_BUFFER_WRITE_ONLY: UseDecl =
        decl(S::COMPUTE_SHADER, A::SHADER_WRITE, L::Undefined);
    /// Write-only RW structured buffer from a compute shader.
    pub const CS_RW_STRUCTURED_BUFFER_WRITE_ONLY: UseDecl =
        decl(S::COMPUTE_SHADER, A::SHADER_WRITE, L::Undefined);
    /// Read-write storage texture from a compute shader.
    pub const CS_RW_TEXTURE: UseDecl = decl(
        S::COMPUTE_SHADER,
        A::SHADER_READ.union(A::SHADER_WRITE),
        L::General,
    );
    /// Color attachment, blend-read only.
    pub const COLOR_ATTACHMENT_READ_ONLY: UseDecl = decl(
        S::COLOR_ATTACHMENT_OUTPUT,
        A::COLOR_ATTACHMENT_READ,
        L::ColorAttachment,
    );
    /// Color attachment, write only.
    pub const COLOR_ATTACHMENT_WRITE_ONLY: UseDecl = decl(
        S::COLOR_ATTACHMENT_OUTPUT,
        A::COLOR_ATTACHMENT_WRITE,
        L::ColorAttachment,
    );
    /// Depth/stencil, tests only.
    pub const DEPTH_STENCIL_READ_ONLY: UseDecl = decl(
        S::FRAGMENT_TESTS,
        A::DEPTH_STENCIL_READ,
        L::DepthStencilReadOnly,
    );
    /// Depth/stencil, tests plus writes.
    pub const DEPTH_STENCIL_READ_WRITE: UseDecl = decl(
        S::FRAGMENT_TESTS,
        A::DEPTH_STENCIL_READ.union(A::DEPTH_STENCIL_WRITE),
        L::DepthStencilAttachment,
    );
    /// Color attachment with read-write blending.
    pub const RENDER_TARGET: UseDecl = decl(
        S::COLOR_ATTACHMENT_OUTPUT,
        A::COLOR_ATTACHMENT_READ.union(A::COLOR_ATTACHMENT_WRITE),
        L::ColorAttachment,
    );
    /// Acceleration-structure read from ray-tracing shaders.
    pub const RAY_TRACING_READ_AS: UseDecl = decl(
        S::RAY_TRACING_SHADER,
        A::ACCELERATION_STRUCTURE_READ,
        L::Undefined,
    );
    /// Scratch buffer of an acceleration-structure build.
    pub const BUILD_AS_SCRATCH: UseDecl = decl(
        S::ACCELERATION_STRUCTURE_BUILD,
        A::ACCELERATION_STRUCTURE_READ.union(A::ACCELERATION_STRUCTURE_WRITE),
        L::Undefined,
    );
    /// Output buffer of an acceleration-structure build.
    pub const BUILD_AS_OUTPUT: UseDecl = decl(
        S::ACCELERATION_STRUCTURE_BUILD,
        A::ACCELERATION_STRUCTURE_WRITE,
        L::Undefined,
    );
}

// ─── Use Records ──────────────────────────────────────────────────────────────

/// Which subresources of a texture a use touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubresourceSelector {
    /// Every subresource of the resource.
    All,
    /// One `(mip, layer, aspect)` subresource.
    One(SubresourceKey),
}

/// One declared use of one resource by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseRecord {
    pub resource: ResourceRef,
    pub selector: SubresourceSelector,
    pub decl: UseDecl,
}

// ─── Pass Record ──────────────────────────────────────────────────────────────

/// Error type pass callbacks may return; wrapped into
/// [`SableError::PassCallback`](crate::errors::SableError::PassCallback) with
/// the pass name attached.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Command-recording callback of a pass.
pub type PassCallback =
    Box<dyn FnOnce(&mut crate::execute::PassContext<'_>) -> Result<(), CallbackError>>;

/// One pass of the graph.
///
/// Built through [`PassScope`](crate::graph::PassScope); stored by index in
/// the graph's pass table.
pub struct Pass {
    pub(crate) index: PassRef,
    pub(crate) name: String,
    pub(crate) queue: Queue,
    pub(crate) label: Option<LabelNodeId>,
    pub(crate) uses: SmallVec<[UseRecord; 4]>,
    pub(crate) explicit_predecessors: SmallVec<[PassRef; 2]>,
    pub(crate) callback: Option<PassCallback>,
    pub(crate) signal_fence: Option<FenceHandle>,
}

impl Pass {
    pub(crate) fn new(index: PassRef, name: String, queue: Queue, label: Option<LabelNodeId>) -> Self {
        Self {
            index,
            name,
            queue,
            label,
            uses: SmallVec::new(),
            explicit_predecessors: SmallVec::new(),
            callback: None,
            signal_fence: None,
        }
    }

    /// Display name of the pass.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue the pass is bound to.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// Declared uses in declaration order.
    #[must_use]
    pub fn uses(&self) -> &[UseRecord] {
        &self.uses
    }

    /// Whether the pass declares any use of `resource`.
    #[must_use]
    pub fn uses_resource(&self, resource: ResourceRef) -> bool {
        self.uses.iter().any(|u| u.resource == resource)
    }

    /// Whether the pass declares any use of the given buffer.
    #[must_use]
    pub fn uses_buffer(&self, buffer: BufferRef) -> bool {
        self.uses_resource(ResourceRef::Buffer(buffer))
    }

    /// Whether the pass declares any use of the given texture.
    #[must_use]
    pub fn uses_texture(&self, texture: TextureRef) -> bool {
        self.uses_resource(ResourceRef::Texture(texture))
    }
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("queue", &self.queue.index)
            .field("uses", &self.uses.len())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

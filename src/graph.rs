//! Render Graph Registry
//!
//! [`RenderGraph`] is the per-frame declaration surface: applications create
//! internal resources, register externals, create passes, declare uses and
//! dependencies, then hand the graph to an
//! [`Executor`](crate::execute::Executor).
//!
//! # Frame Lifecycle
//!
//! 1. **Declare**: resources, passes, uses, explicit edges, label groups
//! 2. **Submit**: [`Executor::execute`](crate::execute::Executor::execute)
//!    compiles the graph into an execution plan and drives the backend
//! 3. **Retire**: once the completion fence signals, transient memory is
//!    recycled and external tracked states have been flushed back
//!
//! # Index Discipline
//!
//! Buffers and textures share one linear index space through parallel tables:
//! creating a resource in one table appends a nulled sibling slot to the
//! other, so a [`BufferRef`] and a [`TextureRef`] never carry the same index
//! and the executor can key per-resource plan data by plain index.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{Result, SableError};
use crate::label::LabelStack;
use crate::pass::{
    Pass, PassCallback, PassRef, SubresourceSelector, UseDecl, UseRecord, uses,
};
use crate::resource::{
    BufferRef, BufferResource, ExternalBuffer, ExternalTexture, ResourceRef, SwapchainFrame,
    TextureRef, TextureResource, TlasRef, TlasResource,
};
use crate::rhi::{BufferDesc, FenceHandle, Format, Queue, SubresourceKey, TextureDesc, TlasHandle};

/// A source of per-frame swapchain images.
///
/// Implemented by the application's swapchain wrapper so a graph can be
/// attached with one call.
pub trait Swapchain {
    /// The image acquired for the current frame, with its handshake
    /// semaphores.
    fn frame(&self) -> SwapchainFrame;
}

// ─── Render Graph ─────────────────────────────────────────────────────────────

/// The declarative per-frame render graph.
pub struct RenderGraph {
    queue: Queue,
    pub(crate) buffers: Vec<Option<BufferResource>>,
    pub(crate) textures: Vec<Option<TextureResource>>,
    pub(crate) passes: Vec<Pass>,
    pub(crate) tlases: Vec<TlasResource>,
    tlas_by_backing: FxHashMap<u32, TlasRef>,
    external_buffer_map: FxHashMap<u64, BufferRef>,
    external_texture_map: FxHashMap<u64, TextureRef>,
    pub(crate) swapchain: Option<TextureRef>,
    pub(crate) labels: LabelStack,
    pub(crate) complete_fence: Option<FenceHandle>,
}

impl RenderGraph {
    /// Creates an empty graph whose passes default to `queue`.
    #[must_use]
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            buffers: Vec::new(),
            textures: Vec::new(),
            passes: Vec::new(),
            tlases: Vec::new(),
            tlas_by_backing: FxHashMap::default(),
            external_buffer_map: FxHashMap::default(),
            external_texture_map: FxHashMap::default(),
            swapchain: None,
            labels: LabelStack::new(),
            complete_fence: None,
        }
    }

    /// The default queue of the graph.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> Queue {
        self.queue
    }

    // ── Internal resources ─────────────────────────────────────────────────

    /// Creates an internal (transient) buffer.
    pub fn create_buffer(&mut self, desc: &BufferDesc, name: impl Into<String>) -> BufferRef {
        let name = name.into();
        log::trace!("create_buffer '{name}' ({} bytes)", desc.size);
        let index = self.buffers.len() as u32;
        self.buffers.push(Some(BufferResource::Internal {
            desc: *desc,
            name,
            default_struct_stride: None,
            default_texel_format: None,
        }));
        self.textures.push(None);
        BufferRef(index)
    }

    /// Creates an internal (transient) texture.
    pub fn create_texture(&mut self, desc: &TextureDesc, name: impl Into<String>) -> TextureRef {
        let name = name.into();
        log::trace!("create_texture '{name}' ({}x{})", desc.width, desc.height);
        let index = self.textures.len() as u32;
        self.textures.push(Some(TextureResource::Internal {
            desc: *desc,
            name,
        }));
        self.buffers.push(None);
        TextureRef(index)
    }

    /// Sets the stride the backend uses for the buffer's default structured
    /// view. Internal buffers only; externals carry their own defaults.
    pub fn set_default_struct_stride(&mut self, buffer: BufferRef, stride: u64) {
        if let Some(BufferResource::Internal {
            default_struct_stride,
            ..
        }) = &mut self.buffers[buffer.0 as usize]
        {
            *default_struct_stride = Some(stride);
        }
    }

    /// Sets the format the backend uses for the buffer's default texel view.
    /// Internal buffers only; externals carry their own defaults.
    pub fn set_default_texel_format(&mut self, buffer: BufferRef, format: Format) {
        if let Some(BufferResource::Internal {
            default_texel_format,
            ..
        }) = &mut self.buffers[buffer.0 as usize]
        {
            *default_texel_format = Some(format);
        }
    }

    // ── External resources ─────────────────────────────────────────────────

    /// Registers an application-owned buffer.
    ///
    /// Idempotent by backend handle: re-registering returns the original
    /// reference.
    pub fn register_external_buffer(&mut self, external: &Arc<ExternalBuffer>) -> BufferRef {
        if let Some(&existing) = self.external_buffer_map.get(&external.handle.0) {
            return existing;
        }
        let index = self.buffers.len() as u32;
        self.buffers.push(Some(BufferResource::External {
            external: Arc::clone(external),
        }));
        self.textures.push(None);
        self.external_buffer_map.insert(external.handle.0, BufferRef(index));
        BufferRef(index)
    }

    /// Registers an application-owned texture.
    ///
    /// Idempotent by backend handle. Fails if the same handle was previously
    /// registered through [`register_read_only_texture`](Self::register_read_only_texture).
    pub fn register_external_texture(
        &mut self,
        external: &Arc<ExternalTexture>,
    ) -> Result<TextureRef> {
        self.register_texture_inner(external, false)
    }

    /// Registers an application-owned texture that graphs may only read.
    ///
    /// Any write use surfaces as
    /// [`SableError::ReadOnlyWrite`] at plan time. Fails if the same handle
    /// was previously registered as writable.
    pub fn register_read_only_texture(
        &mut self,
        external: &Arc<ExternalTexture>,
    ) -> Result<TextureRef> {
        self.register_texture_inner(external, true)
    }

    fn register_texture_inner(
        &mut self,
        external: &Arc<ExternalTexture>,
        read_only: bool,
    ) -> Result<TextureRef> {
        if let Some(&existing) = self.external_texture_map.get(&external.handle.0) {
            let Some(TextureResource::External {
                read_only: prior, ..
            }) = &self.textures[existing.0 as usize]
            else {
                return Err(SableError::RegistrationConflict(format!(
                    "texture '{}' is already registered as a swapchain image",
                    external.name
                )));
            };
            if *prior != read_only {
                return Err(SableError::RegistrationConflict(format!(
                    "texture '{}' is already registered as {}",
                    external.name,
                    if *prior { "read-only" } else { "writable" }
                )));
            }
            return Ok(existing);
        }
        let index = self.textures.len() as u32;
        self.textures.push(Some(TextureResource::External {
            external: Arc::clone(external),
            read_only,
        }));
        self.buffers.push(None);
        self.external_texture_map
            .insert(external.handle.0, TextureRef(index));
        Ok(TextureRef(index))
    }

    /// Registers the swapchain image acquired for this frame.
    ///
    /// At most one swapchain image may be registered per graph.
    pub fn register_swapchain_texture(&mut self, frame: SwapchainFrame) -> Result<TextureRef> {
        if self.swapchain.is_some() {
            return Err(SableError::RegistrationConflict(
                "a swapchain image is already registered with this graph".into(),
            ));
        }
        let index = self.textures.len() as u32;
        self.textures
            .push(Some(TextureResource::Swapchain { frame }));
        self.buffers.push(None);
        let texture = TextureRef(index);
        self.swapchain = Some(texture);
        self.external_texture_map.insert(frame.texture.0, texture);
        Ok(texture)
    }

    /// Convenience form of
    /// [`register_swapchain_texture`](Self::register_swapchain_texture)
    /// taking the application's swapchain wrapper.
    pub fn register_swapchain(&mut self, swapchain: &dyn Swapchain) -> Result<TextureRef> {
        self.register_swapchain_texture(swapchain.frame())
    }

    /// Attaches a TLAS wrapper to its backing buffer resource.
    ///
    /// Idempotent per backing buffer: re-registering returns the original
    /// wrapper.
    pub fn register_tlas(&mut self, handle: TlasHandle, backing: BufferRef) -> TlasRef {
        if let Some(&existing) = self.tlas_by_backing.get(&backing.0) {
            return existing;
        }
        let tlas = TlasRef(self.tlases.len() as u32);
        self.tlases.push(TlasResource { handle, backing });
        self.tlas_by_backing.insert(backing.0, tlas);
        tlas
    }

    // ── Passes and labels ──────────────────────────────────────────────────

    /// Creates a pass on the graph's default queue.
    ///
    /// The pass captures the current label nesting, with its own name as the
    /// innermost group.
    pub fn create_pass(&mut self, name: impl Into<String>) -> PassRef {
        let name = name.into();
        let label = self.labels.push(name.clone());
        self.labels.pop();
        let index = PassRef(self.passes.len() as u32);
        self.passes
            .push(Pass::new(index, name, self.queue, Some(label)));
        index
    }

    /// Scoped builder for declaring uses, edges and the callback of a pass.
    pub fn pass(&mut self, pass: PassRef) -> PassScope<'_> {
        assert!(
            (pass.0 as usize) < self.passes.len(),
            "pass reference from another graph"
        );
        PassScope { graph: self, pass }
    }

    /// Opens a debug-marker label group; passes created until the matching
    /// [`pop_label_group`](Self::pop_label_group) nest inside it.
    pub fn push_label_group(&mut self, name: impl Into<String>) {
        self.labels.push(name);
    }

    /// Closes the innermost debug-marker label group.
    pub fn pop_label_group(&mut self) {
        self.labels.pop();
    }

    /// Sets the fence the executor signals with the final submission.
    pub fn set_complete_fence(&mut self, fence: FenceHandle) {
        self.complete_fence = Some(fence);
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    /// The buffer record behind a reference.
    #[must_use]
    pub fn buffer_resource(&self, buffer: BufferRef) -> &BufferResource {
        match &self.buffers[buffer.0 as usize] {
            Some(resource) => resource,
            None => unreachable!("buffer reference addresses a texture slot"),
        }
    }

    /// The texture record behind a reference.
    #[must_use]
    pub fn texture_resource(&self, texture: TextureRef) -> &TextureResource {
        match &self.textures[texture.0 as usize] {
            Some(resource) => resource,
            None => unreachable!("texture reference addresses a buffer slot"),
        }
    }

    /// The TLAS record behind a reference.
    #[must_use]
    pub fn tlas_resource(&self, tlas: TlasRef) -> TlasResource {
        self.tlases[tlas.0 as usize]
    }

    /// The registered swapchain image, if any.
    #[inline]
    #[must_use]
    pub fn swapchain_texture(&self) -> Option<TextureRef> {
        self.swapchain
    }

    /// Number of passes created so far.
    #[inline]
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Display name of either resource kind.
    #[must_use]
    pub fn resource_name(&self, resource: ResourceRef) -> &str {
        match resource {
            ResourceRef::Buffer(buffer) => self.buffer_resource(buffer).name(),
            ResourceRef::Texture(texture) => self.texture_resource(texture).name(),
        }
    }

    pub(crate) fn pass_name(&self, pass: PassRef) -> &str {
        self.passes[pass.0 as usize].name()
    }
}

// ─── Pass Scope ───────────────────────────────────────────────────────────────

/// Mutable view of one pass, handed out by [`RenderGraph::pass`].
///
/// Declaration errors (conflicting layouts, unsupported layouts, missing
/// subresources) surface from the offending call.
pub struct PassScope<'g> {
    graph: &'g mut RenderGraph,
    pass: PassRef,
}

impl std::fmt::Debug for PassScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassScope")
            .field("pass", &self.pass)
            .field("name", &self.graph.pass_name(self.pass))
            .finish()
    }
}

impl PassScope<'_> {
    /// The pass this scope addresses.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> PassRef {
        self.pass
    }

    /// Declares a use of a whole buffer.
    pub fn use_buffer(&mut self, buffer: BufferRef, decl: UseDecl) -> Result<&mut Self> {
        let known = (buffer.0 as usize) < self.graph.buffers.len()
            && self.graph.buffers[buffer.0 as usize].is_some();
        if !known {
            return Err(SableError::InvalidResource {
                pass: self.graph.pass_name(self.pass).to_owned(),
                index: buffer.0,
            });
        }
        self.merge_use(UseRecord {
            resource: ResourceRef::Buffer(buffer),
            selector: SubresourceSelector::All,
            decl,
        })
    }

    /// Declares a use of every subresource of a texture.
    pub fn use_texture(&mut self, texture: TextureRef, decl: UseDecl) -> Result<&mut Self> {
        self.check_texture_layout(texture, decl)?;
        self.merge_use(UseRecord {
            resource: ResourceRef::Texture(texture),
            selector: SubresourceSelector::All,
            decl,
        })
    }

    /// Declares a use of one `(mip, layer, aspect)` subresource.
    pub fn use_texture_subresource(
        &mut self,
        texture: TextureRef,
        key: SubresourceKey,
        decl: UseDecl,
    ) -> Result<&mut Self> {
        self.check_texture_layout(texture, decl)?;
        let desc = *self.graph.texture_resource(texture).desc();
        if key.mip >= desc.mip_levels
            || key.layer >= desc.array_layers
            || !desc.format.aspects().contains(key.aspect.mask())
        {
            return Err(SableError::InvalidSubresource {
                pass: self.graph.pass_name(self.pass).to_owned(),
                resource: self.graph.texture_resource(texture).name().to_owned(),
                mip: key.mip,
                layer: key.layer,
            });
        }
        self.merge_use(UseRecord {
            resource: ResourceRef::Texture(texture),
            selector: SubresourceSelector::One(key),
            decl,
        })
    }

    /// Declares a read of a TLAS from ray-tracing shaders.
    ///
    /// TLAS references are read-only by construction; builds go through
    /// [`RenderGraph::create_build_tlas_pass`](crate::graph::RenderGraph::create_build_tlas_pass).
    pub fn read_tlas(&mut self, tlas: TlasRef) -> Result<&mut Self> {
        let backing = self.graph.tlas_resource(tlas).backing;
        self.use_buffer(backing, uses::RAY_TRACING_READ_AS)
    }

    /// Adds an explicit predecessor edge.
    pub fn depends_on(&mut self, predecessor: PassRef) -> &mut Self {
        assert!(
            (predecessor.0 as usize) < self.graph.passes.len(),
            "pass reference from another graph"
        );
        let pass = &mut self.graph.passes[self.pass.0 as usize];
        if !pass.explicit_predecessors.contains(&predecessor) {
            pass.explicit_predecessors.push(predecessor);
        }
        self
    }

    /// Sets the command-recording callback.
    pub fn set_callback<F, E>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&mut crate::execute::PassContext<'_>) -> std::result::Result<(), E> + 'static,
        E: Into<crate::pass::CallbackError>,
    {
        let boxed: PassCallback = Box::new(move |ctx| callback(ctx).map_err(Into::into));
        self.graph.passes[self.pass.0 as usize].callback = Some(boxed);
        self
    }

    /// Sets the fence signaled by the submission that contains this pass.
    ///
    /// A signal fence ends the pass's submission group.
    pub fn set_signal_fence(&mut self, fence: FenceHandle) -> &mut Self {
        self.graph.passes[self.pass.0 as usize].signal_fence = Some(fence);
        self
    }

    /// Moves the pass onto another queue.
    pub fn set_queue(&mut self, queue: Queue) -> &mut Self {
        self.graph.passes[self.pass.0 as usize].queue = queue;
        self
    }

    // ── Internal helpers ───────────────────────────────────────────────────

    fn check_texture_layout(&self, texture: TextureRef, decl: UseDecl) -> Result<()> {
        let in_range = (texture.0 as usize) < self.graph.textures.len()
            && self.graph.textures[texture.0 as usize].is_some();
        if !in_range {
            return Err(SableError::InvalidResource {
                pass: self.graph.pass_name(self.pass).to_owned(),
                index: texture.0,
            });
        }
        let resource = self.graph.texture_resource(texture);
        if !resource.desc().usage.supports_layout(decl.layout) {
            return Err(SableError::UnsupportedLayout {
                resource: resource.name().to_owned(),
                layout: decl.layout,
            });
        }
        Ok(())
    }

    fn merge_use(&mut self, record: UseRecord) -> Result<&mut Self> {
        let pass_name = self.graph.pass_name(self.pass).to_owned();
        let resource_name = self.graph.resource_name(record.resource).to_owned();
        let is_texture = matches!(record.resource, ResourceRef::Texture(_));
        let pass = &mut self.graph.passes[self.pass.0 as usize];
        if let Some(existing) = pass
            .uses
            .iter_mut()
            .find(|u| u.resource == record.resource && u.selector == record.selector)
        {
            if is_texture && existing.decl.layout != record.decl.layout {
                return Err(SableError::IncompatibleUses {
                    pass: pass_name,
                    resource: resource_name,
                    first: existing.decl.layout,
                    second: record.decl.layout,
                });
            }
            existing.decl.stages |= record.decl.stages;
            existing.decl.accesses |= record.decl.accesses;
        } else {
            pass.uses.push(record);
        }
        Ok(self)
    }
}

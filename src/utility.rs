//! Utility Passes
//!
//! Pre-authored passes for clears, copies, blits and acceleration-structure
//! builds. Each is an ordinary pass: it declares the correct uses and sets a
//! callback that records through the backend's helper entry points. Nothing
//! here is special-cased by the compiler or executor.

use crate::errors::Result;
use crate::graph::RenderGraph;
use crate::pass::{PassRef, uses};
use crate::resource::{BufferRef, TextureRef, TlasRef};
use crate::rhi::{BlitFilter, ClearValue, SubresourceKey, SubresourceRange, TextureAspect};

impl RenderGraph {
    /// A pass with no uses and no callback; useful as an ordering anchor.
    pub fn create_dummy_pass(&mut self, name: impl Into<String>) -> PassRef {
        self.create_pass(name)
    }

    /// Clears every subresource of a color texture.
    pub fn create_clear_texture_pass(
        &mut self,
        name: impl Into<String>,
        texture: TextureRef,
        value: [f32; 4],
    ) -> Result<PassRef> {
        let range = SubresourceRange::full(self.texture_resource(texture).desc());
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_texture(texture, uses::CLEAR_DST)?
            .set_callback(move |ctx| {
                let handle = ctx.texture(texture);
                ctx.cmd()
                    .clear_texture(handle, range, ClearValue::Color(value));
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }

    /// Fills an RW buffer with a 32-bit pattern from a compute pass.
    pub fn create_clear_buffer_pass(
        &mut self,
        name: impl Into<String>,
        buffer: BufferRef,
        value: u32,
    ) -> Result<PassRef> {
        let size = self.buffer_resource(buffer).desc().size;
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_buffer(buffer, uses::CS_RW_BUFFER_WRITE_ONLY)?
            .set_callback(move |ctx| {
                let handle = ctx.buffer(buffer);
                ctx.cmd().fill_buffer(handle, 0, size, value);
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }

    /// Fills an RW structured buffer with a 32-bit pattern.
    pub fn create_clear_structured_buffer_pass(
        &mut self,
        name: impl Into<String>,
        buffer: BufferRef,
        value: u32,
    ) -> Result<PassRef> {
        let size = self.buffer_resource(buffer).desc().size;
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_buffer(buffer, uses::CS_RW_STRUCTURED_BUFFER_WRITE_ONLY)?
            .set_callback(move |ctx| {
                let handle = ctx.buffer(buffer);
                ctx.cmd().fill_buffer(handle, 0, size, value);
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }

    /// Clears a storage texture through a compute-style RW use.
    pub fn create_clear_rw_texture_pass(
        &mut self,
        name: impl Into<String>,
        texture: TextureRef,
        value: ClearValue,
    ) -> Result<PassRef> {
        let range = SubresourceRange::full(self.texture_resource(texture).desc());
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_texture(texture, uses::CS_RW_TEXTURE)?
            .set_callback(move |ctx| {
                let handle = ctx.texture(texture);
                ctx.cmd().clear_texture(handle, range, value);
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }

    /// Copies `size` bytes between buffer starts.
    pub fn create_copy_buffer_pass(
        &mut self,
        name: impl Into<String>,
        src: BufferRef,
        dst: BufferRef,
        size: u64,
    ) -> Result<PassRef> {
        self.create_copy_buffer_region_pass(name, src, 0, dst, 0, size)
    }

    /// Copies a byte range between buffers.
    pub fn create_copy_buffer_region_pass(
        &mut self,
        name: impl Into<String>,
        src: BufferRef,
        src_offset: u64,
        dst: BufferRef,
        dst_offset: u64,
        size: u64,
    ) -> Result<PassRef> {
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_buffer(src, uses::COPY_SRC)?
            .use_buffer(dst, uses::COPY_DST)?
            .set_callback(move |ctx| {
                let (src, dst) = (ctx.buffer(src), ctx.buffer(dst));
                ctx.cmd().copy_buffer(src, src_offset, dst, dst_offset, size);
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }

    /// Copies one color subresource to another.
    pub fn create_copy_texture_pass(
        &mut self,
        name: impl Into<String>,
        src: TextureRef,
        src_subresource: SubresourceKey,
        dst: TextureRef,
        dst_subresource: SubresourceKey,
    ) -> Result<PassRef> {
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_texture_subresource(src, src_subresource, uses::COPY_SRC)?
            .use_texture_subresource(dst, dst_subresource, uses::COPY_DST)?
            .set_callback(move |ctx| {
                let (src_handle, dst_handle) = (ctx.texture(src), ctx.texture(dst));
                ctx.cmd()
                    .copy_texture(src_handle, src_subresource, dst_handle, dst_subresource);
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }

    /// Blits one whole single-mip texture onto another.
    pub fn create_blit_texture_pass(
        &mut self,
        name: impl Into<String>,
        src: TextureRef,
        dst: TextureRef,
        filter: BlitFilter,
        gamma: f32,
    ) -> Result<PassRef> {
        debug_assert_eq!(self.texture_resource(src).desc().mip_levels, 1);
        debug_assert_eq!(self.texture_resource(src).desc().array_layers, 1);
        debug_assert_eq!(self.texture_resource(dst).desc().mip_levels, 1);
        debug_assert_eq!(self.texture_resource(dst).desc().array_layers, 1);
        let subresource = SubresourceKey {
            aspect: TextureAspect::Color,
            layer: 0,
            mip: 0,
        };
        self.create_blit_texture_region_pass(name, src, subresource, dst, subresource, filter, gamma)
    }

    /// Blits one color subresource onto another with a fullscreen draw.
    pub fn create_blit_texture_region_pass(
        &mut self,
        name: impl Into<String>,
        src: TextureRef,
        src_subresource: SubresourceKey,
        dst: TextureRef,
        dst_subresource: SubresourceKey,
        filter: BlitFilter,
        gamma: f32,
    ) -> Result<PassRef> {
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_texture_subresource(src, src_subresource, uses::PS_TEXTURE)?
            .use_texture_subresource(dst, dst_subresource, uses::COLOR_ATTACHMENT_WRITE_ONLY)?
            .set_callback(move |ctx| {
                let (src_handle, dst_handle) = (ctx.texture(src), ctx.texture(dst));
                ctx.cmd().blit_texture(
                    src_handle,
                    src_subresource,
                    dst_handle,
                    dst_subresource,
                    filter,
                    gamma,
                );
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }

    /// Builds a TLAS into its backing buffer.
    ///
    /// The build is modelled as writes to the backing and scratch buffers;
    /// later passes read the TLAS through
    /// [`PassScope::read_tlas`](crate::graph::PassScope::read_tlas).
    pub fn create_build_tlas_pass(
        &mut self,
        name: impl Into<String>,
        tlas: TlasRef,
        scratch: BufferRef,
    ) -> Result<PassRef> {
        let backing = self.tlas_resource(tlas).backing;
        let pass = self.create_pass(name);
        self.pass(pass)
            .use_buffer(backing, uses::BUILD_AS_OUTPUT)?
            .use_buffer(scratch, uses::BUILD_AS_SCRATCH)?
            .set_callback(move |ctx| {
                let handle = ctx.tlas(tlas);
                let (output, scratch) = (ctx.buffer(backing), ctx.buffer(scratch));
                ctx.cmd().build_tlas(handle, output, scratch);
                Ok::<_, std::convert::Infallible>(())
            });
        Ok(pass)
    }
}

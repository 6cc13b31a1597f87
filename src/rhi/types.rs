//! Backend-Facing Value Types
//!
//! Pipeline stage and access masks, image layouts, resource descriptors and
//! opaque handles shared between the graph core and the graphics backend.
//!
//! The masks follow the explicit-API model (Vulkan 1.3 / D3D12 enhanced
//! barriers): synchronization is expressed as `(stages, accesses, layout)`
//! triples, and a barrier pairs the most recent producer triple with the next
//! consumer triple.

use bitflags::bitflags;

// ─── Synchronization Masks ────────────────────────────────────────────────────

bitflags! {
    /// GPU pipeline stages, used as the execution half of a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u32 {
        const DRAW_INDIRECT = 1 << 0;
        const VERTEX_INPUT = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const EARLY_FRAGMENT_TESTS = 1 << 4;
        const LATE_FRAGMENT_TESTS = 1 << 5;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 6;
        const COMPUTE_SHADER = 1 << 7;
        const COPY = 1 << 8;
        const CLEAR = 1 << 9;
        const RAY_TRACING_SHADER = 1 << 10;
        const ACCELERATION_STRUCTURE_BUILD = 1 << 11;

        /// Both depth/stencil test stages.
        const FRAGMENT_TESTS = Self::EARLY_FRAGMENT_TESTS.bits() | Self::LATE_FRAGMENT_TESTS.bits();
        /// Every stage; used as a conservative fallback for semaphore waits.
        const ALL_COMMANDS = (1 << 12) - 1;
    }
}

bitflags! {
    /// GPU memory access kinds, used as the memory half of a barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Accesses: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_READ = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_READ = 1 << 7;
        const DEPTH_STENCIL_WRITE = 1 << 8;
        const COPY_READ = 1 << 9;
        const COPY_WRITE = 1 << 10;
        const CLEAR_WRITE = 1 << 11;
        const ACCELERATION_STRUCTURE_READ = 1 << 12;
        const ACCELERATION_STRUCTURE_WRITE = 1 << 13;

        /// Every write-kind access.
        const WRITE_MASK = Self::SHADER_WRITE.bits()
            | Self::COLOR_ATTACHMENT_WRITE.bits()
            | Self::DEPTH_STENCIL_WRITE.bits()
            | Self::COPY_WRITE.bits()
            | Self::CLEAR_WRITE.bits()
            | Self::ACCELERATION_STRUCTURE_WRITE.bits();
    }
}

impl Accesses {
    /// Returns `true` if the mask contains any write-kind access.
    #[inline]
    #[must_use]
    pub const fn is_write(self) -> bool {
        self.intersects(Self::WRITE_MASK)
    }

    /// Returns `true` if the mask is non-empty and contains only reads.
    #[inline]
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        !self.is_empty() && !self.is_write()
    }
}

// ─── Image Layouts ────────────────────────────────────────────────────────────

/// Texture image layout.
///
/// Buffers have no layout; every texture subresource is tracked with one.
/// A layout change always requires a transition barrier, even when stage and
/// access masks are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Contents undefined; the only legal source layout for a fresh or
    /// aliased-over texture.
    #[default]
    Undefined,
    /// Storage-image access from any shader stage.
    General,
    /// Color attachment (render target) access.
    ColorAttachment,
    /// Read-write depth/stencil attachment access.
    DepthStencilAttachment,
    /// Read-only depth/stencil access (tests plus shader sampling).
    DepthStencilReadOnly,
    /// Sampled read from any shader stage.
    ShaderReadOnly,
    /// Source of a copy or blit.
    CopySrc,
    /// Destination of a copy or blit.
    CopyDst,
    /// Destination of a clear operation.
    ClearDst,
    /// Presentable by the swapchain.
    Present,
}

// ─── Resource Usage Flags ─────────────────────────────────────────────────────

bitflags! {
    /// Creation-time buffer usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsages: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const INDIRECT = 1 << 4;
        const SHADER_RESOURCE = 1 << 5;
        const UNORDERED_ACCESS = 1 << 6;
        const ACCELERATION_STRUCTURE = 1 << 7;
        const BUILD_SCRATCH = 1 << 8;
    }
}

bitflags! {
    /// Creation-time texture usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsages: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
        const CLEAR_COLOR = 1 << 6;
    }
}

impl TextureUsages {
    /// Usage flags a texture must carry to be transitioned into `layout`.
    ///
    /// `Undefined` and `Present` have no usage requirement: the former is
    /// never a destination layout and the latter belongs to the swapchain.
    #[must_use]
    pub fn required_for_layout(layout: TextureLayout) -> Self {
        match layout {
            TextureLayout::Undefined | TextureLayout::Present => Self::empty(),
            TextureLayout::General => Self::STORAGE,
            TextureLayout::ColorAttachment => Self::COLOR_ATTACHMENT,
            TextureLayout::DepthStencilAttachment | TextureLayout::DepthStencilReadOnly => {
                Self::DEPTH_STENCIL_ATTACHMENT
            }
            TextureLayout::ShaderReadOnly => Self::SAMPLED,
            TextureLayout::CopySrc => Self::TRANSFER_SRC,
            TextureLayout::CopyDst => Self::TRANSFER_DST,
            TextureLayout::ClearDst => Self::TRANSFER_DST.union(Self::CLEAR_COLOR),
        }
    }

    /// Whether a texture with these flags supports `layout`.
    ///
    /// `ClearDst` is satisfied by either clear or transfer-destination
    /// capability.
    #[must_use]
    pub fn supports_layout(self, layout: TextureLayout) -> bool {
        if layout == TextureLayout::ClearDst {
            return self.intersects(Self::TRANSFER_DST | Self::CLEAR_COLOR);
        }
        self.contains(Self::required_for_layout(layout))
    }
}

// ─── Formats and Aspects ──────────────────────────────────────────────────────

/// Texel format of a texture or typed buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Unknown,
    R8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    R16G16B16A16Float,
    R32Float,
    R32Uint,
    R32G32B32A32Float,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl Format {
    /// Returns `true` for formats with a depth aspect.
    #[inline]
    #[must_use]
    pub const fn has_depth(self) -> bool {
        matches!(self, Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// Returns `true` for formats with a stencil aspect.
    #[inline]
    #[must_use]
    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// The set of aspects subresource tracking iterates for this format.
    #[must_use]
    pub fn aspects(self) -> TextureAspects {
        if self.has_depth() {
            let mut aspects = TextureAspects::DEPTH;
            if self.has_stencil() {
                aspects |= TextureAspects::STENCIL;
            }
            aspects
        } else {
            TextureAspects::COLOR
        }
    }
}

bitflags! {
    /// Texture aspect mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// A single texture aspect, one bit of [`TextureAspects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureAspect {
    Color,
    Depth,
    Stencil,
}

impl TextureAspect {
    /// All aspects in tracking order.
    pub const ORDERED: [Self; 3] = [Self::Color, Self::Depth, Self::Stencil];

    /// The mask bit for this aspect.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> TextureAspects {
        match self {
            Self::Color => TextureAspects::COLOR,
            Self::Depth => TextureAspects::DEPTH,
            Self::Stencil => TextureAspects::STENCIL,
        }
    }
}

// ─── Resource Descriptors ─────────────────────────────────────────────────────

/// Host visibility of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostAccess {
    /// Device-local, never mapped.
    #[default]
    None,
    /// CPU-write, GPU-read upload memory.
    Upload,
    /// GPU-write, CPU-read readback memory.
    Readback,
}

/// Description of a buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    /// Size in bytes.
    pub size: u64,
    /// Creation-time usage flags.
    pub usage: BufferUsages,
    /// Host visibility.
    pub host_access: HostAccess,
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
}

/// Clear value baked into a texture description, forwarded to placed-resource
/// creation so tile hardware can fast-clear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Description of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureDesc {
    pub format: Format,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub usage: TextureUsages,
    pub clear_value: Option<ClearValue>,
}

impl TextureDesc {
    /// A 2D single-sample texture with one mip and one layer.
    #[must_use]
    pub fn new_2d(format: Format, width: u32, height: u32, usage: TextureUsages) -> Self {
        Self {
            format,
            dimension: TextureDimension::D2,
            width,
            height,
            depth: 1,
            array_layers: 1,
            mip_levels: 1,
            sample_count: 1,
            usage,
            clear_value: None,
        }
    }

    /// Number of tracked subresources: `mips × layers` per aspect.
    #[must_use]
    pub fn subresource_count(&self) -> u32 {
        let aspects = self.format.aspects().bits().count_ones();
        self.mip_levels * self.array_layers * aspects
    }
}

// ─── Subresources ─────────────────────────────────────────────────────────────

/// Key of one tracked texture subresource.
///
/// Buffers are tracked whole and have no key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubresourceKey {
    pub aspect: TextureAspect,
    pub layer: u32,
    pub mip: u32,
}

/// A contiguous block of texture subresources, addressed by a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub aspects: TextureAspects,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    /// The range covering every subresource of `desc`.
    #[must_use]
    pub fn full(desc: &TextureDesc) -> Self {
        Self {
            aspects: desc.format.aspects(),
            base_mip: 0,
            mip_count: desc.mip_levels,
            base_layer: 0,
            layer_count: desc.array_layers,
        }
    }

    /// The range covering exactly one subresource.
    #[must_use]
    pub fn single(key: SubresourceKey) -> Self {
        Self {
            aspects: key.aspect.mask(),
            base_mip: key.mip,
            mip_count: 1,
            base_layer: key.layer,
            layer_count: 1,
        }
    }
}

// ─── Queues ───────────────────────────────────────────────────────────────────

/// Identity of one hardware queue.
///
/// `index` is unique per queue; `family` is the ownership-transfer domain for
/// release/acquire barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Queue {
    /// Unique queue index.
    pub index: u32,
    /// Queue family index for ownership transfers.
    pub family: u32,
    /// Whether this queue's family can present swapchain images.
    pub supports_present: bool,
}

// ─── Transient Heap Classification ────────────────────────────────────────────

/// Resource heap tier of the adapter.
///
/// Tier-2 hardware places any resource kind on any heap; tier-1 hardware
/// segregates buffers, RT/DS textures and other textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapTier {
    Tier1,
    Tier2,
}

/// Aliasing category of a transient resource.
///
/// Two transient resources may share memory only within one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    /// Any resource kind (tier-2 heaps).
    General,
    /// Buffers (tier-1 heaps).
    Buffer,
    /// Render-target and depth-stencil textures (tier-1 heaps).
    RtDsTexture,
    /// All other textures (tier-1 heaps).
    NonRtDsTexture,
}

/// Heap alignment class of a transient resource.
///
/// Regular resources may fall back onto an MSAA-aligned slice, never the
/// reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapAlignmentClass {
    Regular,
    Msaa,
}

/// Allocation size and alignment the backend reports for a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequirements {
    pub size: u64,
    pub alignment: u64,
}

// ─── Opaque Handles ───────────────────────────────────────────────────────────

macro_rules! handle_type {
    ($(#[$doc:meta] $name:ident),* $(,)?) => {
        $(
            #[$doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

handle_type! {
    /// Backend buffer object.
    BufferHandle,
    /// Backend texture object.
    TextureHandle,
    /// Backend top-level acceleration structure object.
    TlasHandle,
    /// Backend semaphore object.
    SemaphoreHandle,
    /// Backend fence object.
    FenceHandle,
    /// One memory block handed out by the transient pool service.
    MemoryBlockId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mask_classifies_accesses() {
        assert!(Accesses::SHADER_WRITE.is_write());
        assert!((Accesses::SHADER_READ | Accesses::COPY_WRITE).is_write());
        assert!(Accesses::SHADER_READ.is_read_only());
        assert!(!Accesses::empty().is_read_only());
    }

    #[test]
    fn depth_formats_expose_aspects() {
        assert_eq!(Format::R8G8B8A8Unorm.aspects(), TextureAspects::COLOR);
        assert_eq!(Format::D32Float.aspects(), TextureAspects::DEPTH);
        assert_eq!(
            Format::D24UnormS8Uint.aspects(),
            TextureAspects::DEPTH | TextureAspects::STENCIL
        );
    }

    #[test]
    fn layout_usage_compatibility() {
        let usage = TextureUsages::SAMPLED | TextureUsages::COLOR_ATTACHMENT;
        assert!(usage.supports_layout(TextureLayout::ShaderReadOnly));
        assert!(usage.supports_layout(TextureLayout::ColorAttachment));
        assert!(!usage.supports_layout(TextureLayout::General));
        assert!(TextureUsages::CLEAR_COLOR.supports_layout(TextureLayout::ClearDst));
        assert!(TextureUsages::TRANSFER_DST.supports_layout(TextureLayout::ClearDst));
    }

    #[test]
    fn subresource_count_multiplies_aspects() {
        let mut desc = TextureDesc::new_2d(Format::D24UnormS8Uint, 64, 64, TextureUsages::empty());
        desc.mip_levels = 3;
        desc.array_layers = 2;
        assert_eq!(desc.subresource_count(), 3 * 2 * 2);
    }
}

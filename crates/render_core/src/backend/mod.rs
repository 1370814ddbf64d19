//! Native graphics API boundary
//!
//! The render context never talks to a graphics API directly. Everything
//! device-specific goes through [`GraphicsDevice`], which is shaped after a
//! fixed-function immediate-mode API: the context hands it descriptors and
//! opaque native ids, and the device reports loss through
//! [`PresentStatus::DeviceLost`].
//!
//! [`HeadlessDevice`] is the in-memory implementation used by tools and tests.

mod headless;

pub use headless::{DeviceCommand, HeadlessController, HeadlessDevice};

use bitflags::bitflags;

use crate::foundation::math::Mat4;
use crate::state::{Light, Material, PipelineStates, Viewport};

/// Opaque native texture id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeTexture(pub u64);

/// Opaque native buffer id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeBuffer(pub u64);

/// Pixel formats understood by the texture pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// BC1 block compression
    Dxt1,
    /// BC2 block compression
    Dxt3,
    /// BC3 block compression
    Dxt5,
    /// 32-bit BGRA
    A8R8G8B8,
    /// 32-bit BGR, alpha ignored
    X8R8G8B8,
    /// 16-bit colour
    R5G6B5,
    /// 16-bit colour with one alpha bit
    A1R5G5B5,
    /// 16-bit depth
    D16,
    /// 24-bit depth, 8-bit stencil
    D24S8,
}

impl TextureFormat {
    /// Whether the format is stored in 4x4 blocks
    pub const fn is_compressed(self) -> bool {
        matches!(self, Self::Dxt1 | Self::Dxt3 | Self::Dxt5)
    }

    /// Whether a depth format carries a stencil channel
    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::D24S8)
    }

    /// Bytes per pixel for linear formats, bytes per 4x4 block otherwise
    pub const fn unit_size(self) -> u32 {
        match self {
            Self::Dxt1 => 8,
            Self::Dxt3 | Self::Dxt5 => 16,
            Self::A8R8G8B8 | Self::X8R8G8B8 | Self::D24S8 => 4,
            Self::R5G6B5 | Self::A1R5G5B5 | Self::D16 => 2,
        }
    }

    /// Size in bytes of one `width` x `height` surface
    pub fn surface_size(self, width: u32, height: u32) -> u64 {
        let (w, h) = (u64::from(width.max(1)), u64::from(height.max(1)));
        if self.is_compressed() {
            w.div_ceil(4) * h.div_ceil(4) * u64::from(self.unit_size())
        } else {
            w * h * u64::from(self.unit_size())
        }
    }
}

/// Texture shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    /// Plain 2D texture
    Flat,
    /// Six square faces
    Cube,
    /// 3D texture
    Volume {
        /// Number of depth slices
        depth: u32,
    },
}

bitflags! {
    /// How a texture is going to be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Can be bound as a colour render target
        const RENDER_TARGET = 0x1;
        /// Can be bound as a depth/stencil target
        const DEPTH_STENCIL = 0x2;
        /// Rewritten frequently from the CPU
        const DYNAMIC = 0x4;
    }
}

/// Where the native object lives
///
/// `Default` objects live in video memory and are invalidated by a device
/// loss; `Managed` objects are backed by a system copy and survive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPool {
    /// Video memory, lost with the device
    Default,
    /// Driver-managed, survives device loss
    Managed,
    /// System memory only
    System,
}

impl MemoryPool {
    /// Whether objects in this pool must be released before a device reset
    pub const fn is_device_dependent(self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Native texture description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width of the top level
    pub width: u32,
    /// Height of the top level
    pub height: u32,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Shape
    pub dimension: TextureDimension,
    /// Usage flags
    pub usage: TextureUsage,
    /// Memory pool
    pub pool: MemoryPool,
}

impl TextureDesc {
    /// A single-level managed 2D texture
    pub const fn flat(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            format,
            dimension: TextureDimension::Flat,
            usage: TextureUsage::empty(),
            pool: MemoryPool::Managed,
        }
    }

    /// A single-level colour render target in video memory
    pub const fn render_target(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            mip_levels: 1,
            format,
            dimension: TextureDimension::Flat,
            usage: TextureUsage::RENDER_TARGET,
            pool: MemoryPool::Default,
        }
    }

    /// Total bytes of every level, face and slice
    pub fn byte_size(&self) -> u64 {
        let layers = match self.dimension {
            TextureDimension::Flat => 1,
            TextureDimension::Cube => 6,
            TextureDimension::Volume { depth } => u64::from(depth.max(1)),
        };
        let mut total = 0;
        let (mut w, mut h) = (self.width, self.height);
        for _ in 0..self.mip_levels.max(1) {
            total += self.format.surface_size(w, h);
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        total * layers
    }
}

/// Cube map face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    /// +X
    PositiveX,
    /// -X
    NegativeX,
    /// +Y
    PositiveY,
    /// -Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// -Z
    NegativeZ,
}

impl CubeFace {
    /// Order in which faces are stored in a `.tx` cube map
    pub const FILE_ORDER: [Self; 6] = [
        Self::PositiveZ,
        Self::PositiveX,
        Self::NegativeZ,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
    ];
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Rewritten every frame
        const DYNAMIC = 0x1;
        /// The CPU never reads the contents back
        const WRITE_ONLY = 0x2;
    }
}

bitflags! {
    /// Flexible vertex format bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VertexFormat: u32 {
        /// Untransformed position, 3 floats
        const XYZ = 0x002;
        /// Pre-transformed position, 4 floats
        const XYZRHW = 0x004;
        /// Normal, 3 floats
        const NORMAL = 0x010;
        /// Diffuse colour, packed ARGB
        const DIFFUSE = 0x040;
        /// One texture coordinate set
        const TEX1 = 0x100;
        /// Two texture coordinate sets
        const TEX2 = 0x200;
        /// Three texture coordinate sets
        const TEX3 = 0x300;
        /// Four texture coordinate sets
        const TEX4 = 0x400;
    }
}

impl VertexFormat {
    /// Size in bytes of one vertex
    pub const fn stride(self) -> u32 {
        let bits = self.bits();
        let mut size = 0;
        if bits & Self::XYZRHW.bits() != 0 {
            size += 16;
        } else if bits & Self::XYZ.bits() != 0 {
            size += 12;
        }
        if bits & Self::NORMAL.bits() != 0 {
            size += 12;
        }
        if bits & Self::DIFFUSE.bits() != 0 {
            size += 4;
        }
        size + ((bits >> 8) & 0xF) * 8
    }
}

/// Index element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices
    U16,
}

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Vertex data of the given layout
    Vertex(VertexFormat),
    /// Index data
    Index(IndexFormat),
}

/// Native buffer description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u32,
    /// Usage flags
    pub usage: BufferUsage,
    /// Contents
    pub kind: BufferKind,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    /// Points
    PointList,
    /// Independent lines
    LineList,
    /// Connected lines
    LineStrip,
    /// Independent triangles
    TriangleList,
    /// Connected triangles
    TriangleStrip,
    /// Fan around the first vertex
    TriangleFan,
}

impl PrimitiveType {
    /// Number of primitives drawn from `vertex_count` vertices or indices
    pub const fn primitive_count(self, vertex_count: u32) -> u32 {
        match self {
            Self::PointList => vertex_count,
            Self::LineList => vertex_count / 2,
            Self::LineStrip => vertex_count.saturating_sub(1),
            Self::TriangleList => vertex_count / 3,
            Self::TriangleStrip | Self::TriangleFan => vertex_count.saturating_sub(2),
        }
    }

    /// Number of vertices or indices needed for `primitives` primitives
    pub const fn vertex_count(self, primitives: u32) -> u32 {
        if primitives == 0 {
            return 0;
        }
        match self {
            Self::PointList => primitives,
            Self::LineList => primitives * 2,
            Self::LineStrip => primitives + 1,
            Self::TriangleList => primitives * 3,
            Self::TriangleStrip | Self::TriangleFan => primitives + 2,
        }
    }
}

bitflags! {
    /// Surfaces touched by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Colour target
        const TARGET = 0x1;
        /// Depth buffer
        const ZBUFFER = 0x2;
        /// Stencil buffer
        const STENCIL = 0x4;
    }
}

/// Result of a present call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// The frame reached the screen
    Presented,
    /// The device was lost; every video-memory object is invalid
    DeviceLost,
}

/// Vertex processing mode requested at device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexProcessing {
    /// Transform and lighting on the GPU
    Hardware,
    /// GPU with software fallback
    Mixed,
    /// CPU transform and lighting
    Software,
}

impl VertexProcessing {
    /// Modes tried at init, best first
    pub const LADDER: [Self; 3] = [Self::Hardware, Self::Mixed, Self::Software];
}

/// Device creation and reset parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParams {
    /// Back buffer width
    pub width: u32,
    /// Back buffer height
    pub height: u32,
    /// Windowed instead of exclusive fullscreen
    pub windowed: bool,
    /// Present on vertical blank
    pub vsync: bool,
    /// Multisample count, 0 for none
    pub msaa: u32,
    /// Back buffer format
    pub back_buffer_format: TextureFormat,
    /// Depth/stencil format
    pub depth_format: TextureFormat,
    /// Adapter index
    pub adapter: u32,
}

/// Surfaces bound for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetBinding {
    /// Colour surface
    pub color: Option<NativeTexture>,
    /// Depth surface
    pub depth: Option<NativeTexture>,
    /// Face when `color` is a cube map
    pub face: Option<CubeFace>,
}

/// One draw submission
#[derive(Debug, Clone, Copy)]
pub enum DrawCall<'a> {
    /// Non-indexed draw from a vertex buffer
    Buffer {
        /// Topology
        primitive: PrimitiveType,
        /// Source buffer
        vertex_buffer: NativeBuffer,
        /// Vertex layout
        format: VertexFormat,
        /// First vertex
        start_vertex: u32,
        /// Number of vertices
        vertex_count: u32,
    },
    /// Indexed draw from vertex and index buffers
    Indexed {
        /// Topology
        primitive: PrimitiveType,
        /// Source vertices
        vertex_buffer: NativeBuffer,
        /// Source indices
        index_buffer: NativeBuffer,
        /// Vertex layout
        format: VertexFormat,
        /// Added to every index
        base_vertex: u32,
        /// First index
        start_index: u32,
        /// Number of indices
        index_count: u32,
    },
    /// Non-indexed draw from caller memory
    User {
        /// Topology
        primitive: PrimitiveType,
        /// Vertex layout
        format: VertexFormat,
        /// Tightly packed vertices
        vertices: &'a [u8],
        /// Bytes per vertex
        stride: u32,
    },
    /// Indexed draw from caller memory
    UserIndexed {
        /// Topology
        primitive: PrimitiveType,
        /// Vertex layout
        format: VertexFormat,
        /// Tightly packed vertices
        vertices: &'a [u8],
        /// Bytes per vertex
        stride: u32,
        /// 16-bit indices
        indices: &'a [u16],
    },
}

impl DrawCall<'_> {
    /// Topology of the call
    pub const fn primitive(&self) -> PrimitiveType {
        match self {
            Self::Buffer { primitive, .. }
            | Self::Indexed { primitive, .. }
            | Self::User { primitive, .. }
            | Self::UserIndexed { primitive, .. } => *primitive,
        }
    }

    /// Number of vertices (non-indexed) or indices (indexed) consumed
    pub fn element_count(&self) -> u32 {
        match self {
            Self::Buffer { vertex_count, .. } => *vertex_count,
            Self::Indexed { index_count, .. } => *index_count,
            Self::User { vertices, stride, .. } => (vertices.len() as u32) / (*stride).max(1),
            Self::UserIndexed { indices, .. } => indices.len() as u32,
        }
    }
}

/// Back buffer contents read back for a screenshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Top-down BGRA rows
    pub bgra: Vec<u8>,
}

/// Errors reported by a native device
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Video or system memory exhausted
    #[error("Out of memory allocating {requested} bytes")]
    OutOfMemory {
        /// Bytes requested
        requested: u64,
    },

    /// Feature or mode not available on this device
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The device is lost
    #[error("Device lost")]
    DeviceLost,

    /// A reset was attempted but the device is not ready
    #[error("Device not reset: {0}")]
    NotReset(String),

    /// Video-memory objects are still alive so the device cannot reset
    #[error("{0} device-dependent objects still alive")]
    ResourcesOutstanding(usize),

    /// The id does not name a live native object
    #[error("Unknown native object {0}")]
    UnknownObject(u64),

    /// Read or write outside the object's bounds
    #[error("Access out of range: offset {offset} + {len} > {size}")]
    OutOfRange {
        /// Start offset
        offset: usize,
        /// Access length
        len: usize,
        /// Object size
        size: usize,
    },
}

/// Result type for native calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Native graphics device
///
/// Implementations are thread-confined: the render context calls them from
/// the render thread only.
pub trait GraphicsDevice {
    /// Create the device with the given vertex processing mode
    fn create_device(
        &mut self,
        params: &DeviceParams,
        processing: VertexProcessing,
    ) -> BackendResult<()>;

    /// Reset a lost device, optionally with new parameters
    ///
    /// Fails while any object in [`MemoryPool::Default`] is still alive.
    fn reset(&mut self, params: &DeviceParams) -> BackendResult<()>;

    /// Show the back buffer
    fn present(&mut self) -> BackendResult<PresentStatus>;

    /// The swap chain colour surface
    fn back_buffer(&self) -> Option<NativeTexture>;

    /// The implicit depth/stencil surface
    fn depth_buffer(&self) -> Option<NativeTexture>;

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<NativeTexture>;

    /// Upload one level (of one face, for cube maps)
    fn write_texture(
        &mut self,
        texture: NativeTexture,
        face: Option<CubeFace>,
        level: u32,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: NativeTexture);

    /// Create a vertex or index buffer
    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<NativeBuffer>;

    /// Copy bytes into a buffer
    fn write_buffer(&mut self, buffer: NativeBuffer, offset: usize, data: &[u8])
        -> BackendResult<()>;

    /// Copy bytes out of a buffer
    fn read_buffer(&self, buffer: NativeBuffer, offset: usize, len: usize)
        -> BackendResult<Vec<u8>>;

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: NativeBuffer);

    /// Bind colour/depth surfaces
    fn set_render_target(&mut self, target: &TargetBinding);

    /// Set the viewport
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Clear the bound surfaces
    fn clear(&mut self, flags: ClearFlags, color: u32, depth: f32, stencil: u32)
        -> BackendResult<()>;

    /// Bind a texture to a sampler stage
    fn bind_texture(&mut self, stage: u32, texture: Option<NativeTexture>);

    /// Apply the fixed-function pipeline state
    fn apply_states(&mut self, states: &PipelineStates);

    /// Set the world, view and projection matrices
    fn set_transforms(&mut self, world: &Mat4, view: &Mat4, projection: &Mat4);

    /// Set the constant colour used by texture stage blending
    fn set_texture_factor(&mut self, factor: u32);

    /// Enable or disable fog
    fn set_fog_enabled(&mut self, enabled: bool);

    /// Set or disable (`None`) a light
    fn set_light(&mut self, index: u32, light: Option<&Light>);

    /// Set the material used by fixed-function lighting
    fn set_material(&mut self, material: &Material);

    /// Issue a draw
    fn draw(&mut self, call: &DrawCall<'_>) -> BackendResult<()>;

    /// Read the back buffer
    fn read_back_buffer(&mut self) -> BackendResult<Capture>;
}

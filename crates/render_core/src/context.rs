//! The render context
//!
//! [`RenderContext`] owns the native device and every table, tracker and
//! pipeline built on it. There is no global renderer: callers hold the
//! context and pass it where rendering happens.

use crate::backend::{
    BufferUsage, CubeFace, GraphicsDevice, IndexFormat, MemoryPool, TextureFormat, TextureUsage,
    VertexFormat,
};
use crate::config::{FontManifest, RenderConfig};
use crate::device::{DeviceEvents, DeviceLifecycle};
use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameState, TechniqueLibrary};
use crate::postprocess::PostProcess;
use crate::resources::{
    BufferLock, FontHandle, FontLoader, FontTable, IndexBufferHandle, IndexBufferPool,
    ManifestFontLoader,
    TextureHandle, TextureInfo, TexturePool, VertexBufferHandle, VertexBufferPool,
};
use crate::state::{RenderStateTracker, RenderTargetDescriptor, RenderTargetStack, Viewport};

/// Renderer state for one device
///
/// The context is thread-confined: it holds a non-`Send` device and is
/// meant to be driven from the render thread only. Nothing in it locks.
pub struct RenderContext {
    pub(crate) config: RenderConfig,
    pub(crate) device: Box<dyn GraphicsDevice>,
    pub(crate) lifecycle: DeviceLifecycle,
    pub(crate) state: RenderStateTracker,
    pub(crate) textures: TexturePool,
    pub(crate) vertex_buffers: VertexBufferPool,
    pub(crate) index_buffers: IndexBufferPool,
    pub(crate) fonts: FontTable,
    pub(crate) font_loader: Box<dyn FontLoader>,
    pub(crate) post: PostProcess,
    pub(crate) techniques: TechniqueLibrary,
    pub(crate) targets: RenderTargetStack,
    pub(crate) current_target: RenderTargetDescriptor,
    pub(crate) listeners: DeviceEvents,
    pub(crate) frame: FrameState,
}

impl RenderContext {
    /// Create the device and bring every subsystem up
    ///
    /// Fails only when the configuration is invalid or no device could be
    /// created; everything else (missing fonts, technique files, post-process
    /// targets) is logged and the context starts without it.
    pub fn new(
        config: RenderConfig,
        device: Box<dyn GraphicsDevice>,
        font_loader: Box<dyn FontLoader>,
    ) -> RenderResult<Self> {
        config.validate().map_err(RenderError::Initialization)?;

        let mut techniques = TechniqueLibrary::with_builtins();
        if let Some(path) = &config.techniques {
            if let Err(e) = techniques.load_file(path) {
                log::warn!("Technique file {} not loaded: {}", path, e);
            }
        }

        let lifecycle = DeviceLifecycle::new(&config);
        let current_target = lifecycle.screen_target();
        let mut ctx = Self {
            device,
            state: RenderStateTracker::new(&config),
            textures: TexturePool::from_config(&config),
            vertex_buffers: VertexBufferPool::new(config.max_buffers),
            index_buffers: IndexBufferPool::new(config.max_buffers),
            fonts: FontTable::new(config.max_fonts),
            font_loader,
            post: PostProcess::new(&config.glow, config.post_process),
            techniques,
            targets: RenderTargetStack::default(),
            current_target,
            listeners: DeviceEvents::default(),
            frame: FrameState::default(),
            lifecycle,
            config,
        };
        ctx.initialize()?;
        Ok(ctx)
    }

    /// Create a context whose fonts come from the configured manifest file
    pub fn with_manifest(
        config: RenderConfig,
        device: Box<dyn GraphicsDevice>,
    ) -> RenderResult<Self> {
        let loader = match ManifestFontLoader::from_file(&config.font_manifest) {
            Ok(loader) => loader,
            Err(e) => {
                log::warn!("Font manifest {} not loaded: {}", config.font_manifest, e);
                ManifestFontLoader::new(FontManifest::default(), ".")
            }
        };
        Self::new(config, device, Box::new(loader))
    }

    /// Active configuration
    pub const fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render state tracker
    pub const fn state(&self) -> &RenderStateTracker {
        &self.state
    }

    /// Render state tracker, for transforms, lights, fog and save/restore
    ///
    /// Changes reach the device with the next draw.
    pub fn state_mut(&mut self) -> &mut RenderStateTracker {
        &mut self.state
    }

    /// Technique library
    pub fn techniques_mut(&mut self) -> &mut TechniqueLibrary {
        &mut self.techniques
    }

    /// Target currently bound
    pub const fn current_target(&self) -> &RenderTargetDescriptor {
        &self.current_target
    }

    /// Native device
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    // Textures

    /// Texture pool, for path and degradation settings
    pub fn textures_mut(&mut self) -> &mut TexturePool {
        &mut self.textures
    }

    /// Load (or share) a texture by name
    pub fn texture_create(&mut self, name: &str) -> RenderResult<TextureHandle> {
        self.textures.create_from_path(self.device.as_mut(), name).inspect_err(|e| {
            log::error!("Texture '{}' not created: {}", name, e);
        })
    }

    /// Create an empty 2D texture
    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        levels: u32,
        usage: TextureUsage,
        format: TextureFormat,
        pool: MemoryPool,
    ) -> RenderResult<TextureHandle> {
        self.textures
            .create_procedural(self.device.as_mut(), width, height, levels, usage, format, pool)
            .inspect_err(|e| log::error!("Texture {}x{} not created: {}", width, height, e))
    }

    /// Create an empty cube map
    pub fn create_cube_texture(
        &mut self,
        edge: u32,
        levels: u32,
        usage: TextureUsage,
        format: TextureFormat,
        pool: MemoryPool,
    ) -> RenderResult<TextureHandle> {
        self.textures
            .create_cube(self.device.as_mut(), edge, levels, usage, format, pool)
            .inspect_err(|e| log::error!("Cube texture {} not created: {}", edge, e))
    }

    /// Create an empty volume texture
    pub fn create_volume_texture(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        levels: u32,
        usage: TextureUsage,
        format: TextureFormat,
        pool: MemoryPool,
    ) -> RenderResult<TextureHandle> {
        self.textures
            .create_volume(self.device.as_mut(), width, height, depth, levels, usage, format, pool)
            .inspect_err(|e| {
                log::error!("Volume texture {}x{}x{} not created: {}", width, height, depth, e);
            })
    }

    /// Drop one texture reference, returning the remaining count
    pub fn release_texture(&mut self, texture: TextureHandle) -> RenderResult<u32> {
        self.textures.release(self.device.as_mut(), texture)
    }

    /// Add a texture reference, returning the new count
    pub fn texture_inc_reference(&mut self, texture: TextureHandle) -> RenderResult<u32> {
        self.textures.inc_reference(texture)
    }

    /// Snapshot of a texture slot
    pub fn texture_info(&self, texture: TextureHandle) -> RenderResult<TextureInfo> {
        self.textures.info(texture)
    }

    /// Upload one level (of one cube face) of a texture
    pub fn write_texture_level(
        &mut self,
        texture: TextureHandle,
        face: Option<CubeFace>,
        level: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        self.textures.write_level(self.device.as_mut(), texture, face, level, data)
    }

    // Buffers

    /// Create a vertex buffer of `size` bytes
    pub fn create_vertex_buffer(
        &mut self,
        size: u32,
        usage: BufferUsage,
        format: VertexFormat,
    ) -> RenderResult<VertexBufferHandle> {
        self.vertex_buffers
            .create(self.device.as_mut(), size, usage, format)
            .inspect_err(|e| log::error!("Vertex buffer not created: {}", e))
    }

    /// Create an index buffer of `size` bytes
    pub fn create_index_buffer(
        &mut self,
        size: u32,
        usage: BufferUsage,
        format: IndexFormat,
    ) -> RenderResult<IndexBufferHandle> {
        self.index_buffers
            .create(self.device.as_mut(), size, usage, format)
            .inspect_err(|e| log::error!("Index buffer not created: {}", e))
    }

    /// Map part of a vertex buffer; a `len` of zero maps the rest of it
    pub fn lock_vertex_buffer(
        &mut self,
        buffer: VertexBufferHandle,
        offset: u32,
        len: u32,
    ) -> RenderResult<BufferLock<'_>> {
        self.vertex_buffers.lock(self.device.as_mut(), buffer, offset, len)
    }

    /// Map part of an index buffer; a `len` of zero maps the rest of it
    pub fn lock_index_buffer(
        &mut self,
        buffer: IndexBufferHandle,
        offset: u32,
        len: u32,
    ) -> RenderResult<BufferLock<'_>> {
        self.index_buffers.lock(self.device.as_mut(), buffer, offset, len)
    }

    /// Copy bytes into a vertex buffer
    pub fn write_vertex_buffer(
        &mut self,
        buffer: VertexBufferHandle,
        offset: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        self.vertex_buffers.write(self.device.as_mut(), buffer, offset, data)
    }

    /// Copy bytes into an index buffer
    pub fn write_index_buffer(
        &mut self,
        buffer: IndexBufferHandle,
        offset: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        self.index_buffers.write(self.device.as_mut(), buffer, offset, data)
    }

    /// Read a vertex buffer's contents back
    pub fn read_vertex_buffer(
        &self,
        buffer: VertexBufferHandle,
        offset: u32,
        len: u32,
    ) -> RenderResult<Vec<u8>> {
        self.vertex_buffers.read(self.device.as_ref(), buffer, offset, len)
    }

    /// Drop one vertex buffer reference, returning the remaining count
    pub fn release_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> RenderResult<u32> {
        self.vertex_buffers.release(self.device.as_mut(), buffer)
    }

    /// Drop one index buffer reference, returning the remaining count
    pub fn release_index_buffer(&mut self, buffer: IndexBufferHandle) -> RenderResult<u32> {
        self.index_buffers.release(self.device.as_mut(), buffer)
    }

    /// Add a vertex buffer reference
    pub fn vertex_buffer_inc_reference(&mut self, buffer: VertexBufferHandle) -> RenderResult<u32> {
        self.vertex_buffers.inc_reference(buffer)
    }

    /// Add an index buffer reference
    pub fn index_buffer_inc_reference(&mut self, buffer: IndexBufferHandle) -> RenderResult<u32> {
        self.index_buffers.inc_reference(buffer)
    }

    /// Size in bytes of a vertex buffer
    pub fn vertex_buffer_size(&self, buffer: VertexBufferHandle) -> RenderResult<u32> {
        self.vertex_buffers.size(buffer)
    }

    /// Size in bytes of an index buffer
    pub fn index_buffer_size(&self, buffer: IndexBufferHandle) -> RenderResult<u32> {
        self.index_buffers.size(buffer)
    }

    // Fonts

    /// Load (or share, or reactivate) a font by name
    pub fn load_font(&mut self, name: &str) -> RenderResult<FontHandle> {
        self.fonts
            .load_font(self.device.as_mut(), &mut self.textures, self.font_loader.as_mut(), name)
            .inspect_err(|e| log::error!("Font '{}' not loaded: {}", name, e))
    }

    /// Drop one font reference; at zero the atlas texture is freed
    pub fn unload_font(&mut self, font: FontHandle) -> RenderResult<u32> {
        self.fonts.unload_font(self.device.as_mut(), &mut self.textures, font)
    }

    /// [`Self::unload_font`] by name
    pub fn unload_font_by_name(&mut self, name: &str) -> RenderResult<u32> {
        self.fonts.unload_font_by_name(self.device.as_mut(), &mut self.textures, name)
    }

    /// Add a font reference
    pub fn font_inc_reference(&mut self, font: FontHandle) -> RenderResult<u32> {
        self.fonts.inc_reference(font)
    }

    /// Make a loaded font the one plain printing uses
    pub fn set_current_font(&mut self, name: &str) -> RenderResult<()> {
        self.fonts.set_current_by_name(name)
    }

    /// Font plain printing uses
    pub const fn current_font(&self) -> Option<FontHandle> {
        self.fonts.current()
    }

    /// Width of `text` in a font at `scale`
    pub fn string_width(&self, font: FontHandle, text: &str, scale: f32) -> RenderResult<f32> {
        Ok(self.fonts.atlas(font)?.string_width(text, scale))
    }

    /// Line height of a font at scale 1
    pub fn char_height(&self, font: FontHandle) -> RenderResult<f32> {
        Ok(self.fonts.atlas(font)?.line_height())
    }

    /// Rebuild every font from a new manifest
    pub fn set_font_manifest(&mut self, manifest: FontManifest) -> RenderResult<()> {
        self.fonts.set_manifest(
            self.device.as_mut(),
            &mut self.textures,
            self.font_loader.as_mut(),
            manifest,
        )
    }

    /// Viewport covering the whole back buffer
    pub fn screen_viewport(&self) -> Viewport {
        self.lifecycle.screen_target().viewport
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        let device = self.device.as_mut();
        self.fonts.release_all(device, &mut self.textures);
        self.post.release(device);
        self.vertex_buffers.destroy_all(device);
        self.index_buffers.destroy_all(device);
        self.textures.destroy_all(device);
        log::info!("Render context released");
    }
}

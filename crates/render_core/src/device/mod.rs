//! Device Lifecycle Controller
//!
//! ```text
//! Uninitialized ──init──▶ Active ──present reports loss──▶ Lost
//!                           ▲                               │ native reset
//!                           │                               ▼
//!                           └──── restore_render ◀──── Restoring
//! ```
//!
//! A loss is handled in two steps. [`RenderContext::lost_render`] runs as
//! soon as the loss is seen: listeners are told, then every video-memory
//! object the context owns is released. Recovery runs at the start of the
//! next frame: the native device is reset and [`RenderContext::restore_render`]
//! recreates what was released. Until a reset succeeds frames are skipped.

pub mod events;

pub use events::{DeviceEvents, DeviceListener, ListenerId};

use crate::backend::{DeviceParams, GraphicsDevice, NativeTexture, TextureFormat, VertexProcessing};
use crate::config::{BackBufferFormat, RenderConfig};
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::foundation::math::Vec3;
use crate::state::{RenderTargetDescriptor, Viewport};

/// Where the device is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No native device yet
    Uninitialized,
    /// Rendering normally
    Active,
    /// Lost; video-memory objects are released
    Lost,
    /// Native reset succeeded, objects are being recreated
    Restoring,
}

/// Native device bookkeeping
#[derive(Debug)]
pub struct DeviceLifecycle {
    state: DeviceState,
    processing: Option<VertexProcessing>,
    params: DeviceParams,
    resources_released: bool,
    back_buffer: Option<NativeTexture>,
    depth_buffer: Option<NativeTexture>,
}

impl DeviceLifecycle {
    /// Bookkeeping for a device not created yet
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            state: DeviceState::Uninitialized,
            processing: None,
            params: device_params(config),
            resources_released: false,
            back_buffer: None,
            depth_buffer: None,
        }
    }

    /// Current state
    pub const fn state(&self) -> DeviceState {
        self.state
    }

    /// Vertex processing mode the device was created with
    pub const fn processing(&self) -> Option<VertexProcessing> {
        self.processing
    }

    /// Creation / reset parameters
    pub const fn params(&self) -> &DeviceParams {
        &self.params
    }

    /// Whether video-memory objects are currently released
    pub const fn resources_released(&self) -> bool {
        self.resources_released
    }

    /// Back buffer and depth surface with a full-screen viewport
    pub const fn screen_target(&self) -> RenderTargetDescriptor {
        RenderTargetDescriptor {
            color: self.back_buffer,
            depth: self.depth_buffer,
            viewport: Viewport::full(self.params.width, self.params.height),
            face: None,
        }
    }
}

/// Colour and depth formats for a configured back buffer
pub const fn surface_formats(format: BackBufferFormat) -> (TextureFormat, TextureFormat) {
    match format {
        BackBufferFormat::R5G6B5 => (TextureFormat::R5G6B5, TextureFormat::D16),
        BackBufferFormat::A8R8G8B8 => (TextureFormat::A8R8G8B8, TextureFormat::D24S8),
    }
}

/// Native parameters for a configuration
pub fn device_params(config: &RenderConfig) -> DeviceParams {
    let (back_buffer_format, depth_format) = surface_formats(config.back_buffer_format);
    DeviceParams {
        width: config.screen_width,
        height: config.screen_height,
        windowed: !config.full_screen,
        vsync: config.vsync,
        msaa: config.effective_msaa(),
        back_buffer_format,
        depth_format,
        adapter: config.adapter,
    }
}

/// Create the native device, trying each vertex processing mode in turn
pub fn create_device(
    device: &mut dyn GraphicsDevice,
    params: &DeviceParams,
) -> RenderResult<VertexProcessing> {
    let mut failures = Vec::new();
    for mode in VertexProcessing::LADDER {
        match device.create_device(params, mode) {
            Ok(()) => {
                log::info!(
                    "Device created: {}x{} {:?}/{:?}, {:?} vertex processing",
                    params.width,
                    params.height,
                    params.back_buffer_format,
                    params.depth_format,
                    mode
                );
                return Ok(mode);
            }
            Err(e) => {
                log::warn!("{:?} vertex processing unavailable: {}", mode, e);
                failures.push(format!("{:?}: {}", mode, e));
            }
        }
    }
    Err(RenderError::Initialization(format!(
        "no vertex processing mode succeeded ({})",
        failures.join("; ")
    )))
}

impl RenderContext {
    /// Lifecycle state of the device
    pub const fn device_state(&self) -> DeviceState {
        self.lifecycle.state
    }

    /// Vertex processing mode the device runs with
    pub const fn vertex_processing(&self) -> Option<VertexProcessing> {
        self.lifecycle.processing
    }

    /// Parameters the device was created or last reset with
    pub const fn device_params(&self) -> &DeviceParams {
        &self.lifecycle.params
    }

    /// Bring the device up and put every subsystem in its start state
    pub(crate) fn initialize(&mut self) -> RenderResult<()> {
        let params = self.lifecycle.params;
        let processing = create_device(self.device.as_mut(), &params)?;
        self.lifecycle.processing = Some(processing);
        self.fetch_surfaces()?;

        let (width, height) = (params.width, params.height);
        if !self.post.allocate(self.device.as_mut(), width, height) {
            log::warn!("Post-processing disabled, render targets unavailable");
        }

        self.state.set_camera(&Vec3::zeros(), &Vec3::zeros(), 1.0);
        self.state.reset_lights();
        self.state.reset_texture_stages();
        let common = *self.state.set_common_states();
        self.device.apply_states(&common);
        self.state.flush(self.device.as_mut());
        self.bind_screen_target();
        self.lifecycle.state = DeviceState::Active;

        let default_font = self.config.default_font.clone();
        if let Err(e) = self.load_font(&default_font) {
            log::warn!("Start font '{}' unavailable: {}", default_font, e);
        }
        log::info!("Render context initialized");
        Ok(())
    }

    fn fetch_surfaces(&mut self) -> RenderResult<()> {
        let back_buffer = self.device.back_buffer().ok_or(RenderError::DeviceLost)?;
        self.lifecycle.back_buffer = Some(back_buffer);
        self.lifecycle.depth_buffer = self.device.depth_buffer();
        Ok(())
    }

    pub(crate) fn bind_screen_target(&mut self) {
        let target = self.lifecycle.screen_target();
        self.bind_target(target);
    }

    pub(crate) fn bind_target(&mut self, target: RenderTargetDescriptor) {
        self.device.set_render_target(&target.binding());
        self.device.set_viewport(&target.viewport);
        self.state.set_viewport(target.viewport);
        self.current_target = target;
    }

    /// Release every video-memory object after a device loss
    ///
    /// Listeners hear about the loss first. Running it again before a
    /// restore does nothing.
    pub fn lost_render(&mut self) {
        if self.lifecycle.resources_released {
            return;
        }
        log::info!("Device lost, releasing video-memory resources");
        self.broadcast_device_lost();
        self.release_video_memory();

        let dropped = self.targets.clear();
        if dropped > 0 {
            log::warn!("Dropped {} pushed render targets on device loss", dropped);
        }
        self.lifecycle.resources_released = true;
        if self.lifecycle.state == DeviceState::Active {
            self.lifecycle.state = DeviceState::Lost;
        }
    }

    fn release_video_memory(&mut self) {
        let device = self.device.as_mut();
        self.post.release(device);
        let vertex = self.vertex_buffers.release_native_all(device);
        let index = self.index_buffers.release_native_all(device);
        let textures = self.textures.release_device_objects(device);
        log::debug!(
            "Released {} vertex buffers, {} index buffers, {} textures",
            vertex,
            index,
            textures
        );
        self.lifecycle.back_buffer = None;
        self.lifecycle.depth_buffer = None;
    }

    /// Recreate what [`Self::lost_render`] released
    ///
    /// Must run after a successful native reset. A failure part way through
    /// releases whatever was already recreated and leaves the device lost,
    /// so the next reset starts from a clean device.
    pub fn restore_render(&mut self) -> RenderResult<()> {
        self.lifecycle.state = DeviceState::Restoring;
        if let Err(e) = self.recreate_video_memory() {
            log::warn!("Device restore failed: {}", e);
            self.release_video_memory();
            self.lifecycle.state = DeviceState::Lost;
            return Err(e);
        }

        self.state.reset_texture_stages();
        self.state.reset_lights();
        let common = *self.state.set_common_states();
        self.device.apply_states(&common);
        self.state.invalidate();
        self.state.flush(self.device.as_mut());
        self.bind_screen_target();

        self.lifecycle.resources_released = false;
        self.lifecycle.state = DeviceState::Active;
        self.broadcast_device_restored();
        log::info!("Device restored");
        Ok(())
    }

    fn recreate_video_memory(&mut self) -> RenderResult<()> {
        self.fetch_surfaces()?;

        let (width, height) = self.state.screen_size();
        if !self.post.allocate(self.device.as_mut(), width, height) {
            log::warn!("Post-process targets could not be restored");
        }
        let device = self.device.as_mut();
        let vertex = self.vertex_buffers.recreate_native_all(device)?;
        let index = self.index_buffers.recreate_native_all(device)?;
        log::debug!("Recreated {} vertex buffers, {} index buffers", vertex, index);
        Ok(())
    }

    /// Release, reset the native device and restore
    ///
    /// On failure the device stays lost and the next frame retries.
    pub fn reset_device(&mut self) -> RenderResult<()> {
        self.lost_render();
        self.lifecycle.state = DeviceState::Lost;
        let params = self.lifecycle.params;
        if let Err(e) = self.device.reset(&params) {
            log::debug!("Device reset failed: {}", e);
            return Err(e.into());
        }
        self.restore_render()
    }

    /// Change the back buffer size
    pub fn set_screen_size(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::Initialization(format!(
                "invalid screen size {}x{}",
                width, height
            )));
        }
        log::info!("Screen size {}x{}", width, height);
        self.config.screen_width = width;
        self.config.screen_height = height;
        self.lifecycle.params.width = width;
        self.lifecycle.params.height = height;
        self.state.set_screen_size(width, height);
        let fov = self.state.transforms().camera().fov;
        self.state.set_perspective(fov, -1.0);
        self.reset_device()
    }

    /// Try to get a lost device back; true when rendering can go ahead
    pub(crate) fn try_restore(&mut self) -> bool {
        match self.lifecycle.state {
            DeviceState::Active => true,
            DeviceState::Uninitialized => false,
            DeviceState::Lost | DeviceState::Restoring => match self.reset_device() {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("Device still lost: {}", e);
                    self.lifecycle.state = DeviceState::Lost;
                    false
                }
            },
        }
    }
}

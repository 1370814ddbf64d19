//! In-memory graphics device
//!
//! Behaves like a fixed-function device without touching a GPU: objects are
//! byte vectors keyed by id, draws and clears are appended to a command log,
//! and the device can be told to fail in the ways a real one does (refuse a
//! vertex processing mode, run out of texture memory, lose itself on the
//! next present, refuse a reset).
//!
//! The device state sits behind `Rc<RefCell<..>>` so a [`HeadlessController`]
//! can keep inspecting and steering it after the device itself has been
//! boxed into a render context.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{
    BackendError, BackendResult, BufferDesc, Capture, ClearFlags, CubeFace, DeviceParams, DrawCall,
    GraphicsDevice, MemoryPool, NativeBuffer, NativeTexture, PresentStatus, PrimitiveType,
    TargetBinding, TextureDesc, TextureDimension, VertexProcessing,
};
use crate::foundation::math::Mat4;
use crate::state::{BlendState, Light, Material, PipelineStates, Viewport};

/// One recorded device command
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// A clear of the bound target
    Clear {
        /// Bound colour surface
        target: Option<NativeTexture>,
        /// Cleared surfaces
        flags: ClearFlags,
        /// Clear colour
        color: u32,
    },
    /// A draw
    Draw {
        /// Bound colour surface
        target: Option<NativeTexture>,
        /// Topology
        primitive: PrimitiveType,
        /// Vertices or indices consumed
        elements: u32,
        /// Texture bound to stage 0
        texture: Option<NativeTexture>,
        /// Texture factor at draw time
        texture_factor: u32,
        /// Blend state at draw time
        blend: BlendState,
    },
    /// A present
    Present,
}

#[derive(Debug)]
struct TextureRecord {
    desc: TextureDesc,
    levels: HashMap<(Option<CubeFace>, u32), Vec<u8>>,
}

#[derive(Debug)]
struct BufferRecord {
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    params: Option<DeviceParams>,
    processing: Option<VertexProcessing>,
    refused_processing: HashSet<VertexProcessing>,
    next_id: u64,
    textures: HashMap<u64, TextureRecord>,
    buffers: HashMap<u64, BufferRecord>,
    back_buffer: Option<NativeTexture>,
    depth_buffer: Option<NativeTexture>,
    back_buffer_fill: u32,
    lost: bool,
    lose_on_present: bool,
    reset_failures: u32,
    fail_textures: bool,
    fail_render_targets: bool,
    fail_buffers: bool,
    target: Option<TargetBinding>,
    viewport: Option<Viewport>,
    bound: [Option<NativeTexture>; 8],
    states: Option<PipelineStates>,
    texture_factor: u32,
    fog: bool,
    lights: [bool; 8],
    commands: Vec<DeviceCommand>,
    presents: u64,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn create_surfaces(&mut self) {
        let back = NativeTexture(self.next_id());
        let depth = NativeTexture(self.next_id());
        self.back_buffer = Some(back);
        self.depth_buffer = Some(depth);
        self.target = Some(TargetBinding {
            color: Some(back),
            depth: Some(depth),
            face: None,
        });
    }

    fn outstanding(&self) -> usize {
        let textures = self
            .textures
            .values()
            .filter(|t| t.desc.pool.is_device_dependent())
            .count();
        textures + self.buffers.len()
    }

    fn current_color(&self) -> Option<NativeTexture> {
        self.target.and_then(|t| t.color)
    }
}

/// Device that renders nowhere
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    shared: Rc<RefCell<HeadlessState>>,
}

impl HeadlessDevice {
    /// Create a device with no failures scheduled
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting and steering this device
    pub fn controller(&self) -> HeadlessController {
        HeadlessController {
            shared: Rc::clone(&self.shared),
        }
    }
}

/// Inspection and failure injection for a [`HeadlessDevice`]
#[derive(Debug, Clone)]
pub struct HeadlessController {
    shared: Rc<RefCell<HeadlessState>>,
}

impl HeadlessController {
    /// Make device creation fail for a vertex processing mode
    pub fn refuse_vertex_processing(&self, mode: VertexProcessing) {
        self.shared.borrow_mut().refused_processing.insert(mode);
    }

    /// Make every texture allocation fail
    pub fn fail_texture_allocations(&self, fail: bool) {
        self.shared.borrow_mut().fail_textures = fail;
    }

    /// Make render-target texture allocations fail
    pub fn fail_render_target_allocations(&self, fail: bool) {
        self.shared.borrow_mut().fail_render_targets = fail;
    }

    /// Make every buffer allocation fail
    pub fn fail_buffer_allocations(&self, fail: bool) {
        self.shared.borrow_mut().fail_buffers = fail;
    }

    /// Lose the device at the next present
    pub fn lose_device_on_next_present(&self) {
        self.shared.borrow_mut().lose_on_present = true;
    }

    /// Make the next `count` resets fail
    pub fn fail_next_resets(&self, count: u32) {
        self.shared.borrow_mut().reset_failures = count;
    }

    /// Mode the device was created with
    pub fn vertex_processing(&self) -> Option<VertexProcessing> {
        self.shared.borrow().processing
    }

    /// Parameters of the last create or reset
    pub fn params(&self) -> Option<DeviceParams> {
        self.shared.borrow().params
    }

    /// Whether the device is currently lost
    pub fn is_lost(&self) -> bool {
        self.shared.borrow().lost
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.shared.borrow().textures.len()
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.shared.borrow().buffers.len()
    }

    /// Number of live objects that block a reset
    pub fn outstanding_objects(&self) -> usize {
        self.shared.borrow().outstanding()
    }

    /// Description of a live texture
    pub fn texture_desc(&self, texture: NativeTexture) -> Option<TextureDesc> {
        self.shared.borrow().textures.get(&texture.0).map(|t| t.desc)
    }

    /// Bytes uploaded to one level of a texture
    pub fn texture_level(
        &self,
        texture: NativeTexture,
        face: Option<CubeFace>,
        level: u32,
    ) -> Option<Vec<u8>> {
        self.shared
            .borrow()
            .textures
            .get(&texture.0)
            .and_then(|t| t.levels.get(&(face, level)).cloned())
    }

    /// Recorded commands
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.shared.borrow().commands.clone()
    }

    /// Forget recorded commands
    pub fn clear_commands(&self) {
        self.shared.borrow_mut().commands.clear();
    }

    /// Number of successful presents
    pub fn present_count(&self) -> u64 {
        self.shared.borrow().presents
    }

    /// The swap chain colour surface
    pub fn back_buffer(&self) -> Option<NativeTexture> {
        self.shared.borrow().back_buffer
    }

    /// Last pipeline state applied
    pub fn states(&self) -> Option<PipelineStates> {
        self.shared.borrow().states
    }

    /// Lights currently enabled
    pub fn enabled_lights(&self) -> usize {
        self.shared.borrow().lights.iter().filter(|on| **on).count()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_device(
        &mut self,
        params: &DeviceParams,
        processing: VertexProcessing,
    ) -> BackendResult<()> {
        let mut state = self.shared.borrow_mut();
        if state.refused_processing.contains(&processing) {
            return Err(BackendError::Unsupported(format!("{:?} vertex processing", processing)));
        }
        state.params = Some(*params);
        state.processing = Some(processing);
        state.create_surfaces();
        state.viewport = Some(Viewport::full(params.width, params.height));
        Ok(())
    }

    fn reset(&mut self, params: &DeviceParams) -> BackendResult<()> {
        let mut state = self.shared.borrow_mut();
        if state.reset_failures > 0 {
            state.reset_failures -= 1;
            return Err(BackendError::NotReset("device not ready".to_string()));
        }
        let outstanding = state.outstanding();
        if outstanding > 0 {
            return Err(BackendError::ResourcesOutstanding(outstanding));
        }
        state.params = Some(*params);
        state.lost = false;
        state.create_surfaces();
        Ok(())
    }

    fn present(&mut self) -> BackendResult<PresentStatus> {
        let mut state = self.shared.borrow_mut();
        if state.lose_on_present {
            state.lose_on_present = false;
            state.lost = true;
        }
        if state.lost {
            return Ok(PresentStatus::DeviceLost);
        }
        state.presents += 1;
        state.commands.push(DeviceCommand::Present);
        Ok(PresentStatus::Presented)
    }

    fn back_buffer(&self) -> Option<NativeTexture> {
        let state = self.shared.borrow();
        if state.lost {
            None
        } else {
            state.back_buffer
        }
    }

    fn depth_buffer(&self) -> Option<NativeTexture> {
        let state = self.shared.borrow();
        if state.lost {
            None
        } else {
            state.depth_buffer
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> BackendResult<NativeTexture> {
        let mut state = self.shared.borrow_mut();
        let is_target = desc.usage.contains(super::TextureUsage::RENDER_TARGET);
        if state.fail_textures || (is_target && state.fail_render_targets) {
            return Err(BackendError::OutOfMemory {
                requested: desc.byte_size(),
            });
        }
        if state.lost && desc.pool == MemoryPool::Default {
            return Err(BackendError::DeviceLost);
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::Unsupported("non-square cube map".to_string()));
        }
        let id = state.next_id();
        state.textures.insert(
            id,
            TextureRecord {
                desc: *desc,
                levels: HashMap::new(),
            },
        );
        Ok(NativeTexture(id))
    }

    fn write_texture(
        &mut self,
        texture: NativeTexture,
        face: Option<CubeFace>,
        level: u32,
        data: &[u8],
    ) -> BackendResult<()> {
        let mut state = self.shared.borrow_mut();
        let record = state
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::UnknownObject(texture.0))?;
        if level >= record.desc.mip_levels.max(1) {
            return Err(BackendError::OutOfRange {
                offset: level as usize,
                len: 1,
                size: record.desc.mip_levels as usize,
            });
        }
        record.levels.insert((face, level), data.to_vec());
        Ok(())
    }

    fn destroy_texture(&mut self, texture: NativeTexture) {
        let mut state = self.shared.borrow_mut();
        if state.textures.remove(&texture.0).is_none() {
            log::warn!("Destroying unknown texture {}", texture.0);
        }
        for slot in &mut state.bound {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> BackendResult<NativeBuffer> {
        let mut state = self.shared.borrow_mut();
        if state.fail_buffers {
            return Err(BackendError::OutOfMemory {
                requested: u64::from(desc.size),
            });
        }
        if state.lost {
            return Err(BackendError::DeviceLost);
        }
        let id = state.next_id();
        state.buffers.insert(
            id,
            BufferRecord {
                data: vec![0; desc.size as usize],
            },
        );
        Ok(NativeBuffer(id))
    }

    fn write_buffer(
        &mut self,
        buffer: NativeBuffer,
        offset: usize,
        data: &[u8],
    ) -> BackendResult<()> {
        let mut state = self.shared.borrow_mut();
        let record = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::UnknownObject(buffer.0))?;
        let size = record.data.len();
        let end = offset.checked_add(data.len()).filter(|end| *end <= size).ok_or(
            BackendError::OutOfRange {
                offset,
                len: data.len(),
                size,
            },
        )?;
        record.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: NativeBuffer,
        offset: usize,
        len: usize,
    ) -> BackendResult<Vec<u8>> {
        let state = self.shared.borrow();
        let record = state
            .buffers
            .get(&buffer.0)
            .ok_or(BackendError::UnknownObject(buffer.0))?;
        record
            .data
            .get(offset..offset.saturating_add(len))
            .map(<[u8]>::to_vec)
            .ok_or(BackendError::OutOfRange {
                offset,
                len,
                size: record.data.len(),
            })
    }

    fn destroy_buffer(&mut self, buffer: NativeBuffer) {
        if self.shared.borrow_mut().buffers.remove(&buffer.0).is_none() {
            log::warn!("Destroying unknown buffer {}", buffer.0);
        }
    }

    fn set_render_target(&mut self, target: &TargetBinding) {
        self.shared.borrow_mut().target = Some(*target);
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.shared.borrow_mut().viewport = Some(*viewport);
    }

    fn clear(
        &mut self,
        flags: ClearFlags,
        color: u32,
        _depth: f32,
        _stencil: u32,
    ) -> BackendResult<()> {
        let mut state = self.shared.borrow_mut();
        if state.lost {
            return Err(BackendError::DeviceLost);
        }
        let target = state.current_color();
        if flags.contains(ClearFlags::TARGET) && target.is_some() && target == state.back_buffer {
            state.back_buffer_fill = color;
        }
        state.commands.push(DeviceCommand::Clear { target, flags, color });
        Ok(())
    }

    fn bind_texture(&mut self, stage: u32, texture: Option<NativeTexture>) {
        let mut state = self.shared.borrow_mut();
        if let Some(slot) = state.bound.get_mut(stage as usize) {
            *slot = texture;
        }
    }

    fn apply_states(&mut self, states: &PipelineStates) {
        self.shared.borrow_mut().states = Some(*states);
    }

    fn set_transforms(&mut self, _world: &Mat4, _view: &Mat4, _projection: &Mat4) {}

    fn set_texture_factor(&mut self, factor: u32) {
        self.shared.borrow_mut().texture_factor = factor;
    }

    fn set_fog_enabled(&mut self, enabled: bool) {
        self.shared.borrow_mut().fog = enabled;
    }

    fn set_light(&mut self, index: u32, light: Option<&Light>) {
        let mut state = self.shared.borrow_mut();
        if let Some(slot) = state.lights.get_mut(index as usize) {
            *slot = light.is_some();
        }
    }

    fn set_material(&mut self, _material: &Material) {}

    fn draw(&mut self, call: &DrawCall<'_>) -> BackendResult<()> {
        let mut state = self.shared.borrow_mut();
        if state.lost {
            return Err(BackendError::DeviceLost);
        }
        match call {
            DrawCall::Buffer { vertex_buffer, .. }
                if !state.buffers.contains_key(&vertex_buffer.0) =>
            {
                return Err(BackendError::UnknownObject(vertex_buffer.0));
            }
            DrawCall::Indexed {
                vertex_buffer,
                index_buffer,
                ..
            } => {
                for id in [vertex_buffer.0, index_buffer.0] {
                    if !state.buffers.contains_key(&id) {
                        return Err(BackendError::UnknownObject(id));
                    }
                }
            }
            _ => {}
        }
        let command = DeviceCommand::Draw {
            target: state.current_color(),
            primitive: call.primitive(),
            elements: call.element_count(),
            texture: state.bound[0],
            texture_factor: state.texture_factor,
            blend: state.states.map_or(BlendState::OPAQUE, |s| s.blend),
        };
        state.commands.push(command);
        Ok(())
    }

    fn read_back_buffer(&mut self) -> BackendResult<Capture> {
        let state = self.shared.borrow();
        if state.lost {
            return Err(BackendError::DeviceLost);
        }
        let params = state
            .params
            .ok_or_else(|| BackendError::Unsupported("device not created".to_string()))?;
        let pixel = state.back_buffer_fill.to_le_bytes();
        let bgra = pixel.repeat((params.width * params.height) as usize);
        Ok(Capture {
            width: params.width,
            height: params.height,
            bgra,
        })
    }
}

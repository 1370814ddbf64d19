//! Render State Tracker
//!
//! Holds everything the device needs to know besides resources: the three
//! transforms (with world-relation rebasing), eight lights, the material,
//! fog and texture factor, sampler state per texture stage, the common
//! pipeline baseline and the viewport.
//!
//! ```text
//! caller ──set_*──▶ RenderStateTracker ──flush──▶ GraphicsDevice
//!                        │
//!                        └── save_state / restore_state (RenderState)
//! ```

mod lights;
mod pipeline_states;
mod render_target;
mod transforms;

pub use lights::{Light, LightKind, Material, MAX_LIGHTS};
pub use pipeline_states::{
    AlphaTestState, BlendFactor, BlendState, CompareFunc, CullMode, DepthState, PassOverrides,
    PipelineStates, SamplerState, ShadingState, TextureFilter, COMMON_ALPHA_REF, COMMON_AMBIENT,
};
pub use render_target::{RenderTargetDescriptor, RenderTargetStack, Viewport};
pub use transforms::{CameraState, TransformKind, TransformState};

use crate::backend::GraphicsDevice;
use crate::config::RenderConfig;
use crate::foundation::math::{Mat4, Vec3};

/// Number of texture stages with tracked sampler state
pub const MAX_TEXTURE_STAGES: usize = 8;

/// Snapshot taken by [`RenderStateTracker::save_state`]
///
/// Matrices are captured in render space together with the relation
/// offsets they were rebased against, so a camera move between save and
/// restore is undone along with everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// World matrix
    pub world: Mat4,
    /// View matrix
    pub view: Mat4,
    /// Projection matrix
    pub projection: Mat4,
    /// World-relation position the matrices were rebased against
    pub world_relation_pos: Vec3,
    /// Translation stripped from the view matrix
    pub view_relation_pos: Vec3,
    /// Camera at save time
    pub camera: CameraState,
    /// Fog on/off
    pub fog_enabled: bool,
    /// Texture factor colour
    pub texture_factor: u32,
}

/// Current render state
pub struct RenderStateTracker {
    transforms: TransformState,
    lights: [Light; MAX_LIGHTS],
    light_enabled: [bool; MAX_LIGHTS],
    material: Material,
    fog_enabled: bool,
    texture_factor: u32,
    common: PipelineStates,
    samplers: [SamplerState; MAX_TEXTURE_STAGES],
    anisotropy: f32,
    viewport: Viewport,
    screen_width: u32,
    screen_height: u32,
    dirty: bool,
}

impl RenderStateTracker {
    /// Create a tracker for the configured screen and clip planes
    pub fn new(config: &RenderConfig) -> Self {
        let common = PipelineStates::common(config.anisotropy);
        Self {
            transforms: TransformState::new(
                config.near_clip,
                config.far_clip,
                config.fov_multiplier,
            ),
            lights: [Light::default(); MAX_LIGHTS],
            light_enabled: [false; MAX_LIGHTS],
            material: Material::default(),
            fog_enabled: false,
            texture_factor: 0xFFFF_FFFF,
            common,
            samplers: [common.sampler; MAX_TEXTURE_STAGES],
            anisotropy: config.anisotropy,
            viewport: Viewport::full(config.screen_width, config.screen_height),
            screen_width: config.screen_width,
            screen_height: config.screen_height,
            dirty: true,
        }
    }

    /// Screen height over width
    pub fn screen_aspect(&self) -> f32 {
        self.screen_height as f32 / self.screen_width.max(1) as f32
    }

    /// Record a new screen size; the viewport is reset to cover it
    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen_width = width;
        self.screen_height = height;
        self.viewport = Viewport::full(width, height);
        self.dirty = true;
    }

    /// Current screen size
    pub const fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    /// Store a world-space matrix
    pub fn set_transform(&mut self, kind: TransformKind, m: &Mat4) {
        self.transforms.set_transform(kind, m);
        self.dirty = true;
    }

    /// Read a matrix back in world space
    pub fn transform(&self, kind: TransformKind) -> Mat4 {
        self.transforms.transform(kind)
    }

    /// Place the camera, using the screen aspect for the projection
    pub fn set_camera(&mut self, position: &Vec3, angles: &Vec3, fov: f32) {
        let aspect = self.screen_aspect();
        self.transforms.set_camera(position, angles, fov, aspect);
        self.dirty = true;
    }

    /// Point the camera at a target; false when the direction is degenerate
    pub fn set_camera_look_at(&mut self, from: &Vec3, to: &Vec3, up: &Vec3) -> bool {
        let changed = self.transforms.set_camera_look_at(from, to, up);
        self.dirty |= changed;
        changed
    }

    /// Rebuild the projection; a negative `aspect` means "use the screen's"
    pub fn set_perspective(&mut self, fov: f32, aspect: f32) {
        let aspect = if aspect < 0.0 { self.screen_aspect() } else { aspect };
        self.transforms.set_perspective(fov, aspect);
        self.dirty = true;
    }

    /// Transform state, for read-only queries
    pub const fn transforms(&self) -> &TransformState {
        &self.transforms
    }

    /// Transform state, for clip-plane changes
    pub fn transforms_mut(&mut self) -> &mut TransformState {
        self.dirty = true;
        &mut self.transforms
    }

    /// Set a light; its position is given in world space
    ///
    /// Returns false for an index outside `0..MAX_LIGHTS`.
    pub fn set_light(&mut self, index: usize, light: &Light) -> bool {
        let Some(slot) = self.lights.get_mut(index) else {
            log::warn!("Light index {} out of range", index);
            return false;
        };
        let mut stored = *light;
        stored.position = self.transforms.to_render_space(&light.position);
        *slot = stored;
        self.dirty = true;
        true
    }

    /// Read a light back in world space
    pub fn light(&self, index: usize) -> Option<Light> {
        let mut light = *self.lights.get(index)?;
        light.position = self.transforms.to_world_space(&light.position);
        Some(light)
    }

    /// Enable or disable a light
    pub fn enable_light(&mut self, index: usize, enabled: bool) -> bool {
        let Some(slot) = self.light_enabled.get_mut(index) else {
            log::warn!("Light index {} out of range", index);
            return false;
        };
        *slot = enabled;
        self.dirty = true;
        true
    }

    /// Whether a light is enabled
    pub fn is_light_enabled(&self, index: usize) -> bool {
        self.light_enabled.get(index).copied().unwrap_or(false)
    }

    /// Reset every light to the default and disable it
    pub fn reset_lights(&mut self) {
        self.lights = [Light::default(); MAX_LIGHTS];
        self.light_enabled = [false; MAX_LIGHTS];
        self.dirty = true;
    }

    /// Set the material
    pub fn set_material(&mut self, material: &Material) {
        self.material = *material;
        self.dirty = true;
    }

    /// Current material
    pub const fn material(&self) -> &Material {
        &self.material
    }

    /// Enable or disable fog
    pub fn set_fog_enabled(&mut self, enabled: bool) {
        self.fog_enabled = enabled;
        self.dirty = true;
    }

    /// Whether fog is enabled
    pub const fn fog_enabled(&self) -> bool {
        self.fog_enabled
    }

    /// Set the texture factor colour (ARGB)
    pub fn set_texture_factor(&mut self, factor: u32) {
        self.texture_factor = factor;
        self.dirty = true;
    }

    /// Current texture factor colour
    pub const fn texture_factor(&self) -> u32 {
        self.texture_factor
    }

    /// Snapshot fog, texture factor and the three matrices
    pub fn save_state(&self) -> RenderState {
        RenderState {
            world: *self.transforms.render_matrix(TransformKind::World),
            view: *self.transforms.render_matrix(TransformKind::View),
            projection: *self.transforms.render_matrix(TransformKind::Projection),
            world_relation_pos: self.transforms.world_relation_pos(),
            view_relation_pos: self.transforms.view_relation_pos(),
            camera: *self.transforms.camera(),
            fog_enabled: self.fog_enabled,
            texture_factor: self.texture_factor,
        }
    }

    /// Restore a snapshot taken by [`Self::save_state`]
    pub fn restore_state(&mut self, state: &RenderState) {
        self.transforms.set_render_matrix(TransformKind::World, state.world);
        self.transforms.set_render_matrix(TransformKind::View, state.view);
        self.transforms.set_render_matrix(TransformKind::Projection, state.projection);
        self.transforms
            .set_relation(state.world_relation_pos, state.view_relation_pos, state.camera);
        self.fog_enabled = state.fog_enabled;
        self.texture_factor = state.texture_factor;
        self.dirty = true;
    }

    /// Reinstate the engine baseline
    pub fn set_common_states(&mut self) -> &PipelineStates {
        self.common = PipelineStates::common(self.anisotropy);
        self.dirty = true;
        &self.common
    }

    /// The baseline pipeline state
    pub const fn common_states(&self) -> &PipelineStates {
        &self.common
    }

    /// Reset every texture stage to the baseline sampler
    pub fn reset_texture_stages(&mut self) {
        self.samplers = [self.common.sampler; MAX_TEXTURE_STAGES];
    }

    /// Sampler state of a stage
    pub fn sampler(&self, stage: usize) -> Option<&SamplerState> {
        self.samplers.get(stage)
    }

    /// Override the sampler state of a stage
    pub fn set_sampler(&mut self, stage: usize, sampler: SamplerState) -> bool {
        match self.samplers.get_mut(stage) {
            Some(slot) => {
                *slot = sampler;
                true
            }
            None => false,
        }
    }

    /// Current viewport
    pub const fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Record a new viewport
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Mark everything for re-upload at the next flush
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Push transforms, lights, material, fog and texture factor to the
    /// device if anything changed since the last flush
    pub fn flush(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.dirty {
            return;
        }
        device.set_transforms(
            self.transforms.render_matrix(TransformKind::World),
            self.transforms.render_matrix(TransformKind::View),
            self.transforms.render_matrix(TransformKind::Projection),
        );
        for (index, light) in self.lights.iter().enumerate() {
            let enabled = self.light_enabled[index];
            device.set_light(index as u32, enabled.then_some(light));
        }
        device.set_material(&self.material);
        device.set_fog_enabled(self.fog_enabled);
        device.set_texture_factor(self.texture_factor);
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{set_translation, translation};
    use approx::assert_relative_eq;

    fn tracker() -> RenderStateTracker {
        RenderStateTracker::new(&RenderConfig::default())
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut state = tracker();
        state.set_fog_enabled(true);
        state.set_texture_factor(0x8080_8080);
        let saved = state.save_state();

        let mut world = Mat4::identity();
        set_translation(&mut world, &Vec3::new(5.0, 5.0, 5.0));
        state.set_transform(TransformKind::World, &world);
        state.set_fog_enabled(false);
        state.set_texture_factor(0);
        state.set_camera(&Vec3::new(100.0, 0.0, 0.0), &Vec3::zeros(), 1.0);

        state.restore_state(&saved);
        assert_eq!(state.save_state(), saved);
        assert!(state.fog_enabled());
        assert_eq!(state.texture_factor(), 0x8080_8080);
    }

    #[test]
    fn test_restore_undoes_camera_move() {
        let mut state = tracker();
        state.set_camera(&Vec3::new(1_000.0, 0.0, 0.0), &Vec3::zeros(), 1.0);
        let mut world = Mat4::identity();
        set_translation(&mut world, &Vec3::new(1_010.0, 2.0, 3.0));
        state.set_transform(TransformKind::World, &world);
        let saved = state.save_state();

        state.set_camera(&Vec3::new(-500.0, 0.0, 40.0), &Vec3::new(0.0, 0.5, 0.0), 1.2);
        state.restore_state(&saved);

        assert_relative_eq!(state.transform(TransformKind::World), world, epsilon = 1e-3);
        assert_relative_eq!(state.transforms().world_relation_pos(), Vec3::new(-1_000.0, 0.0, 0.0));
        assert_eq!(state.transforms().camera().position, Vec3::new(1_000.0, 0.0, 0.0));
    }

    #[test]
    fn test_light_positions_are_rebased() {
        let mut state = tracker();
        state.set_camera(&Vec3::new(10_000.0, 0.0, 10_000.0), &Vec3::zeros(), 1.0);
        let light = Light::point(Vec3::new(10_010.0, 5.0, 10_000.0), 50.0);
        assert!(state.set_light(2, &light));

        assert_relative_eq!(state.lights[2].position, Vec3::new(10.0, 5.0, 0.0));
        let back = state.light(2).expect("Should read light back");
        assert_relative_eq!(back.position, light.position);
        assert!(!state.set_light(MAX_LIGHTS, &light));
    }

    #[test]
    fn test_negative_aspect_uses_screen() {
        let mut a = tracker();
        let mut b = tracker();
        a.set_perspective(1.0, -1.0);
        b.set_perspective(1.0, 768.0 / 1024.0);
        assert_relative_eq!(
            a.transform(TransformKind::Projection),
            b.transform(TransformKind::Projection)
        );
    }

    #[test]
    fn test_common_states_reset_samplers() {
        let mut state = tracker();
        let point = SamplerState {
            min: TextureFilter::Point,
            ..SamplerState::LINEAR
        };
        assert!(state.set_sampler(3, point));
        state.set_common_states();
        state.reset_texture_stages();
        assert_eq!(state.sampler(3), Some(&state.common_states().sampler));
        assert!(!state.set_sampler(MAX_TEXTURE_STAGES, point));
    }

    #[test]
    fn test_camera_keeps_world_translation_in_world_space() {
        let mut state = tracker();
        let mut world = Mat4::identity();
        set_translation(&mut world, &Vec3::new(10_005.0, 0.0, 10_000.0));
        state.set_transform(TransformKind::World, &world);
        state.set_camera(&Vec3::new(10_000.0, 0.0, 10_000.0), &Vec3::zeros(), 1.0);

        let render = state.save_state().world;
        assert_relative_eq!(translation(&render), Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(state.transform(TransformKind::World), world);
    }
}

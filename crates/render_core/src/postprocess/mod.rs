//! Post-Process Pipeline
//!
//! When glow or the sea effect is on, the frame is rendered into an
//! offscreen full-resolution texture instead of the back buffer. At the end
//! of the frame that texture is composited onto the screen, then (glow
//! only) downsampled into two small textures, blurred back and forth
//! between them, and added on top of the screen weighted by the glow
//! intensity.
//!
//! ```text
//! scene ─▶ full-res ──composite──▶ back buffer
//!             │                        ▲
//!             └─▶ B(256²) ⇄ A(128²) ───┘ additive glow
//! ```

pub mod quad;
pub mod sea_effect;

pub use quad::{render_quad, screen_quad, QuadVertex};
pub use sea_effect::{SeaEffect, GRID_SIDE};

use crate::backend::{GraphicsDevice, NativeTexture, PrimitiveType, TextureDesc, TextureFormat};
use crate::config::GlowConfig;
use crate::context::RenderContext;
use crate::error::RenderResult;
use crate::state::{RenderTargetDescriptor, Viewport};

/// Side of half-res texture A
pub const HALF_RES_A: u32 = 128;

/// Side of half-res texture B
pub const HALF_RES_B: u32 = 256;

/// Technique for the scene composite
pub const TECHNIQUE_COMPOSITE: &str = "PostProcess";

/// Technique for downsample and blur passes
pub const TECHNIQUE_BLUR: &str = "PostProcessBlur";

/// Technique for the additive glow composite
pub const TECHNIQUE_GLOW: &str = "PostProcessGlow";

/// Texture stages sampled by the 4-tap quads
const TAP_STAGES: u32 = 4;

/// An offscreen colour target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTexture {
    /// Native texture
    pub native: NativeTexture,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl RenderTexture {
    fn create(device: &mut dyn GraphicsDevice, width: u32, height: u32) -> Option<Self> {
        let desc = TextureDesc::render_target(width, height, TextureFormat::A8R8G8B8);
        match device.create_texture(&desc) {
            Ok(native) => Some(Self { native, width, height }),
            Err(e) => {
                log::error!("Post-process target {}x{} unavailable: {}", width, height, e);
                None
            }
        }
    }

    fn target(&self) -> RenderTargetDescriptor {
        RenderTargetDescriptor {
            color: Some(self.native),
            depth: None,
            viewport: Viewport::full(self.width, self.height),
            face: None,
        }
    }
}

/// Post-process targets and parameters
#[derive(Debug)]
pub struct PostProcess {
    full_res: Option<RenderTexture>,
    half_a: Option<RenderTexture>,
    half_b: Option<RenderTexture>,
    blur_size: f32,
    blur_passes: u32,
    intensity: u32,
    enabled: bool,
    errored: bool,
    pending: bool,
    sea: SeaEffect,
}

impl PostProcess {
    /// Parameters from the configuration; targets are allocated later
    pub fn new(glow: &GlowConfig, enabled: bool) -> Self {
        Self {
            full_res: None,
            half_a: None,
            half_b: None,
            blur_size: glow.blur_size,
            blur_passes: glow.blur_passes,
            intensity: glow.intensity.min(255),
            enabled,
            errored: false,
            pending: false,
            sea: SeaEffect::new(),
        }
    }

    /// Create the three targets for a `width` x `height` screen
    ///
    /// Any failure releases what was created, marks the pipeline errored and
    /// turns glow off; returns whether all three exist.
    pub fn allocate(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> bool {
        self.release(device);
        let full_res = RenderTexture::create(device, width, height);
        let half_a = RenderTexture::create(device, HALF_RES_A, HALF_RES_A);
        let half_b = RenderTexture::create(device, HALF_RES_B, HALF_RES_B);

        match (full_res, half_a, half_b) {
            (Some(full_res), Some(half_a), Some(half_b)) => {
                self.full_res = Some(full_res);
                self.half_a = Some(half_a);
                self.half_b = Some(half_b);
                self.errored = false;
                log::debug!("Post-process targets allocated for {}x{}", width, height);
                true
            }
            (full_res, half_a, half_b) => {
                for texture in [full_res, half_a, half_b].into_iter().flatten() {
                    device.destroy_texture(texture.native);
                }
                self.errored = true;
                self.enabled = false;
                false
            }
        }
    }

    /// Destroy the targets
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for texture in [self.full_res.take(), self.half_a.take(), self.half_b.take()]
            .into_iter()
            .flatten()
        {
            device.destroy_texture(texture.native);
        }
    }

    /// Size of the full-res target, if allocated
    pub fn full_res_size(&self) -> Option<(u32, u32)> {
        self.full_res.map(|t| (t.width, t.height))
    }

    /// Glow parameters; intensity is clamped to 0..=255
    pub fn set_glow_params(&mut self, blur_size: f32, intensity: i32, passes: u32) {
        self.blur_size = blur_size;
        self.intensity = intensity.clamp(0, 255) as u32;
        self.blur_passes = passes;
    }

    /// Texture factor used by the glow composite, intensity on every channel
    pub const fn glow_factor(&self) -> u32 {
        let i = self.intensity;
        (i << 24) | (i << 16) | (i << 8) | i
    }

    /// Blur tap offset in texels
    pub const fn blur_size(&self) -> f32 {
        self.blur_size
    }

    /// Ping-pong iterations
    pub const fn blur_passes(&self) -> u32 {
        self.blur_passes
    }

    /// Whether glow is on
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn glow on or off; refused once a target allocation has failed
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if enabled && self.errored {
            log::warn!("Post-processing unavailable after a target allocation failure");
            return false;
        }
        self.enabled = enabled;
        true
    }

    /// Whether a target allocation failed
    pub const fn is_errored(&self) -> bool {
        self.errored
    }

    /// Distortion grid
    pub const fn sea(&self) -> &SeaEffect {
        &self.sea
    }

    /// Distortion grid, mutable
    pub fn sea_mut(&mut self) -> &mut SeaEffect {
        &mut self.sea
    }

    /// Whether the scene renders into the full-res texture this frame
    pub fn renders_offscreen(&self) -> bool {
        (self.enabled || self.sea.is_enabled()) && !self.errored && self.full_res.is_some()
    }

    /// Target the scene renders into when [`Self::renders_offscreen`],
    /// sharing the screen's depth surface
    pub fn scene_target(&self, depth: Option<NativeTexture>) -> Option<RenderTargetDescriptor> {
        let full_res = self.full_res.filter(|_| self.renders_offscreen())?;
        Some(RenderTargetDescriptor {
            depth,
            ..full_res.target()
        })
    }

    pub(crate) fn begin_frame(&mut self, dt_ms: f32, width: u32, height: u32) {
        self.pending = true;
        self.sea.update(dt_ms, width as f32, height as f32);
    }
}

impl RenderContext {
    /// Whether glow post-processing is on
    pub const fn post_process_enabled(&self) -> bool {
        self.post.is_enabled()
    }

    /// Turn glow post-processing on or off
    ///
    /// Returns false when it cannot be turned on because the offscreen
    /// targets could not be allocated.
    pub fn set_post_process_enabled(&mut self, enabled: bool) -> bool {
        self.post.set_enabled(enabled)
    }

    /// Whether an offscreen target allocation failed
    pub const fn post_process_errored(&self) -> bool {
        self.post.is_errored()
    }

    /// Glow blur size, intensity (clamped to 0..=255) and pass count
    pub fn set_glow_params(&mut self, blur_size: f32, intensity: i32, passes: u32) {
        self.post.set_glow_params(blur_size, intensity, passes);
    }

    /// Turn the underwater distortion on or off
    pub fn set_sea_effect(&mut self, enabled: bool, size: f32, speed: f32) {
        self.post.sea_mut().set(enabled, size, speed);
    }

    /// Composite the offscreen scene and run the glow passes
    ///
    /// Runs at most once per frame; returns whether anything was drawn.
    pub fn make_post_process(&mut self) -> RenderResult<bool> {
        if !std::mem::take(&mut self.post.pending) {
            return Ok(false);
        }
        if self.post.errored || !(self.post.enabled || self.post.sea.is_enabled()) {
            return Ok(false);
        }
        let (Some(full_res), Some(half_a), Some(half_b)) =
            (self.post.full_res, self.post.half_a, self.post.half_b)
        else {
            return Ok(false);
        };

        let result = self.run_post_process(full_res, half_a, half_b);
        self.bind_screen_target();
        self.unbind_tap_stages();
        result.map(|()| true)
    }

    fn run_post_process(
        &mut self,
        full_res: RenderTexture,
        half_a: RenderTexture,
        half_b: RenderTexture,
    ) -> RenderResult<()> {
        let (width, height) = self.state.screen_size();
        let (sx, sy) = (width as f32, height as f32);

        self.bind_screen_target();
        self.bind_tap_stages(full_res.native);
        if self.post.sea.is_enabled() {
            let (vertices, indices) = self.post.sea.take_grid();
            let drawn = self.draw_indexed_primitive_up(
                PrimitiveType::TriangleList,
                QuadVertex::FORMAT,
                &vertices,
                &indices,
                Some(TECHNIQUE_COMPOSITE),
            );
            self.post.sea.put_grid(vertices, indices);
            drawn?;
        } else {
            self.draw_primitive_up(
                PrimitiveType::TriangleStrip,
                QuadVertex::FORMAT,
                &screen_quad(sx, sy),
                Some(TECHNIQUE_COMPOSITE),
            )?;
        }

        if !self.post.enabled {
            return Ok(());
        }

        self.blur_pass(full_res, half_b)?;
        for _ in 0..self.post.blur_passes {
            self.blur_pass(half_b, half_a)?;
            self.blur_pass(half_a, half_b)?;
        }
        self.blur_pass(half_b, half_a)?;

        self.bind_screen_target();
        self.bind_tap_stages(half_a.native);
        let saved_factor = self.state.texture_factor();
        self.state.set_texture_factor(self.post.glow_factor());
        let drawn = self.draw_primitive_up(
            PrimitiveType::TriangleStrip,
            QuadVertex::FORMAT,
            &screen_quad(sx, sy),
            Some(TECHNIQUE_GLOW),
        );
        self.state.set_texture_factor(saved_factor);
        drawn.map(|_| ())
    }

    fn blur_pass(&mut self, source: RenderTexture, dest: RenderTexture) -> RenderResult<()> {
        self.bind_target(dest.target());
        self.bind_tap_stages(source.native);
        let quad = render_quad(
            dest.width as f32,
            dest.height as f32,
            source.width as f32,
            source.height as f32,
            1.0,
            1.0,
            self.post.blur_size,
        );
        self.draw_primitive_up(
            PrimitiveType::TriangleStrip,
            QuadVertex::FORMAT,
            &quad,
            Some(TECHNIQUE_BLUR),
        )?;
        Ok(())
    }

    fn bind_tap_stages(&mut self, texture: NativeTexture) {
        for stage in 0..TAP_STAGES {
            self.device.bind_texture(stage, Some(texture));
        }
    }

    fn unbind_tap_stages(&mut self) {
        for stage in 0..TAP_STAGES {
            self.device.bind_texture(stage, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCommand, HeadlessDevice};
    use crate::config::RenderConfig;
    use crate::backend::PresentStatus;
    use crate::context::tests::headless_context;
    use crate::resources::fonts::test_support::FixedFontLoader;
    use crate::state::BlendState;

    type DrawRow = (Option<NativeTexture>, PrimitiveType, u32, Option<NativeTexture>);

    fn draws(commands: &[DeviceCommand]) -> Vec<DrawRow> {
        commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Draw {
                    target,
                    primitive,
                    elements,
                    texture,
                    ..
                } => Some((*target, *primitive, *elements, *texture)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_glow_factor_replicates_intensity() {
        let mut post = PostProcess::new(&GlowConfig::default(), true);
        post.set_glow_params(1.0, 0x40, 2);
        assert_eq!(post.glow_factor(), 0x4040_4040);
        post.set_glow_params(1.0, 999, 2);
        assert_eq!(post.glow_factor(), 0xFFFF_FFFF);
        post.set_glow_params(1.0, -5, 2);
        assert_eq!(post.glow_factor(), 0);
    }

    #[test]
    fn test_allocation_failure_disables_glow() {
        let mut device = HeadlessDevice::new();
        let control = device.controller();
        let mut post = PostProcess::new(&GlowConfig::default(), true);
        control.fail_render_target_allocations(true);

        assert!(!post.allocate(&mut device, 800, 600));
        assert!(post.is_errored());
        assert!(!post.is_enabled());
        assert!(!post.set_enabled(true));
        assert_eq!(post.full_res_size(), None);
        assert_eq!(control.texture_count(), 0);

        control.fail_render_target_allocations(false);
        assert!(post.allocate(&mut device, 800, 600));
        assert!(!post.is_errored());
        assert!(post.set_enabled(true));
        assert_eq!(control.texture_count(), 3);
    }

    #[test]
    fn test_scene_target_selection() {
        let mut device = HeadlessDevice::new();
        let mut post = PostProcess::new(&GlowConfig::default(), false);
        assert!(post.allocate(&mut device, 640, 480));
        assert!(post.scene_target(None).is_none());

        post.sea_mut().set(true, 0.01, 1.0);
        let depth = Some(NativeTexture(99));
        let target = post.scene_target(depth).expect("Sea effect should render offscreen");
        assert_eq!(target.viewport, Viewport::full(640, 480));
        assert_eq!(target.depth, depth);
    }

    #[test]
    fn test_glow_pass_sequence() {
        let config = RenderConfig::default().with_resolution(640, 480).with_post_process(true);
        let (mut ctx, control) = headless_context(config);
        ctx.set_glow_params(1.0, 128, 2);
        let full_res = ctx.post.full_res.expect("Targets should exist").native;
        let half_a = ctx.post.half_a.expect("Targets should exist").native;
        let half_b = ctx.post.half_b.expect("Targets should exist").native;
        let screen = control.back_buffer();

        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();
        assert!(ctx.make_post_process().expect("Post-process should run"));
        assert!(!ctx.make_post_process().expect("Second run is a no-op"));

        let strip = PrimitiveType::TriangleStrip;
        assert_eq!(
            draws(&control.commands()),
            vec![
                (screen, strip, 4, Some(full_res)),
                (Some(half_b), strip, 4, Some(full_res)),
                (Some(half_a), strip, 4, Some(half_b)),
                (Some(half_b), strip, 4, Some(half_a)),
                (Some(half_a), strip, 4, Some(half_b)),
                (Some(half_b), strip, 4, Some(half_a)),
                (Some(half_a), strip, 4, Some(half_b)),
                (screen, strip, 4, Some(half_a)),
            ]
        );

        let glow = control.commands().into_iter().rev().find_map(|c| match c {
            DeviceCommand::Draw {
                texture_factor, blend, ..
            } => Some((texture_factor, blend)),
            _ => None,
        });
        assert_eq!(glow, Some((0x8080_8080, BlendState::ADDITIVE)));
        assert_eq!(ctx.current_target.color, screen);
    }

    #[test]
    fn test_sea_effect_only_composites() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        ctx.set_sea_effect(true, 0.02, 1.0);
        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();
        assert!(ctx.make_post_process().expect("Composite should run"));

        let drawn = draws(&control.commands());
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].1, PrimitiveType::TriangleList);
        assert_eq!(drawn[0].2, 31 * 31 * 6);
        assert_eq!(ctx.post.sea().vertices().len(), 32 * 32);
    }

    #[test]
    fn test_failed_targets_render_straight_to_back_buffer() {
        let device = HeadlessDevice::new();
        let control = device.controller();
        control.fail_render_target_allocations(true);
        let config = RenderConfig::default().with_post_process(true);
        let loader = Box::new(FixedFontLoader::default());
        let mut ctx = RenderContext::new(config, Box::new(device), loader)
            .expect("Target failure should not abort init");
        assert!(ctx.post_process_errored());
        assert!(!ctx.post_process_enabled());
        assert!(!ctx.set_post_process_enabled(true));
        assert!(!ctx.make_post_process().expect("Errored pipeline is a no-op"));

        let screen = control.back_buffer();
        for _ in 0..2 {
            control.clear_commands();
            assert!(ctx.begin_frame(16.0).expect("Frame should start"));
            assert_eq!(ctx.current_target.color, screen);
            assert!(!ctx.make_post_process().expect("Errored pipeline is a no-op"));
            assert_eq!(ctx.end_frame().expect("Should present"), PresentStatus::Presented);

            let commands = control.commands();
            assert!(draws(&commands).is_empty());
            assert!(commands
                .iter()
                .all(|c| !matches!(c, DeviceCommand::Clear { target, .. } if *target != screen)));
        }
    }

    #[test]
    fn test_nothing_enabled_is_a_no_op() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();
        assert!(!ctx.make_post_process().expect("Nothing to do"));
        assert!(draws(&control.commands()).is_empty());
    }
}

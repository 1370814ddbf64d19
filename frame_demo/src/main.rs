//! Frame lifecycle demo
//!
//! Drives the renderer on the headless device: a lit triangle and a text
//! overlay each frame, glow post-processing, a simulated device loss in the
//! middle of the run and a screenshot on the last frame.

use std::cell::Cell;
use std::rc::Rc;

use render_core::prelude::*;

const FRAME_COUNT: u64 = 120;
const LOSS_FRAME: u64 = 40;
const FRAME_TIME_MS: f32 = 16.0;
const CONFIG_PATH: &str = "resource/ini/render.toml";
const TRIANGLE: [[f32; 3]; 3] = [[-1.0, -1.0, 5.0], [0.0, 1.0, 5.0], [1.0, -1.0, 5.0]];

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("Renderer error: {0}")]
    Render(#[from] RenderError),
}

fn upload_triangle(ctx: &mut RenderContext, buffer: VertexBufferHandle) -> RenderResult<()> {
    let mut lock = ctx.lock_vertex_buffer(buffer, 0, 0)?;
    lock.copy_from(&TRIANGLE)?;
    lock.unlock()
}

/// Refills the triangle after a restore and counts device events
struct TriangleKeeper {
    triangle: VertexBufferHandle,
    lost: Rc<Cell<u32>>,
    restored: Rc<Cell<u32>>,
}

impl DeviceListener for TriangleKeeper {
    fn on_device_lost(&mut self, _ctx: &mut RenderContext) {
        self.lost.set(self.lost.get() + 1);
        log::warn!("Device lost, waiting for reset");
    }

    fn on_device_restored(&mut self, ctx: &mut RenderContext) {
        self.restored.set(self.restored.get() + 1);
        match upload_triangle(ctx, self.triangle) {
            Ok(()) => log::info!("Device restored, triangle reloaded"),
            Err(e) => log::error!("Could not reload triangle: {}", e),
        }
    }
}

struct FrameDemo {
    ctx: RenderContext,
    control: HeadlessController,
    triangle: VertexBufferHandle,
    lost: Rc<Cell<u32>>,
    restored: Rc<Cell<u32>>,
    skipped_frames: u64,
}

impl FrameDemo {
    fn new(config: RenderConfig) -> Result<Self, DemoError> {
        let device = HeadlessDevice::new();
        let control = device.controller();
        let mut ctx = RenderContext::with_manifest(config, Box::new(device))?;

        let size = std::mem::size_of_val(&TRIANGLE) as u32;
        let vb = ctx.create_vertex_buffer(size, BufferUsage::WRITE_ONLY, VertexFormat::XYZ)?;
        upload_triangle(&mut ctx, vb)?;

        let lost = Rc::new(Cell::new(0));
        let restored = Rc::new(Cell::new(0));
        ctx.register_listener(Box::new(TriangleKeeper {
            triangle: vb,
            lost: Rc::clone(&lost),
            restored: Rc::clone(&restored),
        }));

        let state = ctx.state_mut();
        state.set_camera(&Vec3::zeros(), &Vec3::zeros(), 1.0);
        state.set_light(
            0,
            &Light {
                kind: LightKind::Directional,
                direction: Vec3::new(0.0, -1.0, 1.0),
                ..Light::default()
            },
        );
        state.enable_light(0, true);

        log::info!("Demo initialized ({:?})", ctx.vertex_processing());
        Ok(Self {
            ctx,
            control,
            triangle: vb,
            lost,
            restored,
            skipped_frames: 0,
        })
    }

    fn run(&mut self) -> Result<(), DemoError> {
        for frame in 0..FRAME_COUNT {
            if frame == LOSS_FRAME {
                log::info!("Simulating device loss at frame {}", frame);
                self.control.lose_device_on_next_present();
            }
            if frame == FRAME_COUNT - 1 {
                self.ctx.request_screenshot();
            }

            if !self.ctx.begin_frame(FRAME_TIME_MS)? {
                self.skipped_frames += 1;
                continue;
            }
            self.draw_scene(frame)?;
            match self.ctx.end_frame()? {
                PresentStatus::Presented => {}
                status => log::debug!("Frame {} presented with {:?}", frame, status),
            }
        }
        Ok(())
    }

    fn draw_scene(&mut self, frame: u64) -> Result<(), DemoError> {
        let angle = frame as f32 * 0.05;
        let world = Mat4::new_rotation(Vec3::new(0.0, angle, 0.0));
        self.ctx.state_mut().set_transform(TransformKind::World, &world);
        self.ctx.draw_buffer(PrimitiveType::TriangleList, self.triangle, 0, 3, None)?;

        let style = PrintStyle {
            shadow: true,
            ..PrintStyle::default()
        };
        if let Some(font) = self.ctx.current_font() {
            self.ctx.ext_print(font, &style, 10.0, 10.0, &format!("Frame {}", frame))?;
        }
        Ok(())
    }

    fn report(&self) {
        let stats = self.ctx.frame_stats();
        let totals = self.ctx.resource_totals();
        log::info!(
            "Ran {} frames ({} skipped), last frame {} draws, {} fps",
            FRAME_COUNT,
            self.skipped_frames,
            stats.draw_calls,
            stats.fps
        );
        log::info!(
            "Device lost {} time(s), restored {} time(s)",
            self.lost.get(),
            self.restored.get()
        );
        log::info!(
            "Resources: {} textures ({} bytes), {} vertex buffers, {} index buffers",
            totals.textures,
            totals.texture_bytes,
            totals.vertex_buffers,
            totals.index_buffers
        );
        if let Some(path) = self.ctx.last_screenshot() {
            log::info!("Screenshot: {}", path.display());
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, load_error) = match RenderConfig::load_from_file(CONFIG_PATH) {
        Ok(config) => (config, None),
        Err(e) => (RenderConfig::default(), Some(e)),
    };
    render_core::foundation::logging::init(&config.log_level);
    if let Some(e) = load_error {
        log::warn!("Using default configuration, could not load {}: {}", CONFIG_PATH, e);
    }

    log::info!("Starting frame demo");
    let mut demo = FrameDemo::new(config.with_post_process(true))?;
    demo.ctx.set_glow_params(0.8, 160, 4);
    demo.run()?;
    demo.report();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_is_refilled_after_device_loss() {
        let mut demo = FrameDemo::new(RenderConfig::default()).expect("Should create demo");
        demo.control.lose_device_on_next_present();
        assert!(demo.ctx.begin_frame(FRAME_TIME_MS).expect("Frame should start"));
        demo.draw_scene(0).expect("Should draw");
        assert_eq!(
            demo.ctx.end_frame().expect("Loss is not an error"),
            PresentStatus::DeviceLost
        );

        assert!(demo.ctx.begin_frame(FRAME_TIME_MS).expect("Frame should start after restore"));
        assert_eq!((demo.lost.get(), demo.restored.get()), (1, 1));
        let size = std::mem::size_of_val(&TRIANGLE) as u32;
        let bytes = demo
            .ctx
            .read_vertex_buffer(demo.triangle, 0, size)
            .expect("Should read back");
        assert_eq!(bytes, bytemuck::cast_slice::<[f32; 3], u8>(&TRIANGLE));
    }
}

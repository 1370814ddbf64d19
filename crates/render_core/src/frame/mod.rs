//! Frame Submission Layer
//!
//! ```text
//! begin_frame ─▶ draw_* / print* ... ─▶ end_frame
//!   restore?                              overlays
//!   sea grid                              post-process
//!   target + clear                        screenshot
//!                                         present ─▶ lost_render on loss
//! ```

pub mod screenshot;
pub mod submit;
pub mod technique;

pub use screenshot::{save_capture, screenshot_path};
pub use technique::{Technique, TechniqueFile, TechniqueLibrary};

use std::path::{Path, PathBuf};

use crate::backend::{ClearFlags, PresentStatus};
use crate::context::RenderContext;
use crate::device::DeviceState;
use crate::error::{RenderError, RenderResult};

/// Per-frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Frames started since init
    pub frame_index: u64,
    /// Native draw calls issued this frame
    pub draw_calls: u32,
    /// Vertices submitted from caller memory this frame
    pub user_vertices: u32,
    /// Indices submitted from caller memory this frame
    pub user_indices: u32,
    /// Frames per second over the last full second
    pub fps: u32,
}

/// Live resource counts and sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceTotals {
    /// Textures with a slot
    pub textures: usize,
    /// Bytes of texture data
    pub texture_bytes: u64,
    /// Vertex buffers
    pub vertex_buffers: usize,
    /// Bytes of vertex buffers
    pub vertex_bytes: u64,
    /// Index buffers
    pub index_buffers: usize,
    /// Bytes of index buffers
    pub index_bytes: u64,
}

/// Frame bookkeeping
#[derive(Debug, Default)]
pub struct FrameState {
    in_frame: bool,
    stats: FrameStats,
    fps_frames: u32,
    fps_elapsed_ms: f32,
    screenshot_requested: bool,
    last_screenshot: Option<PathBuf>,
}

impl FrameState {
    fn begin(&mut self, dt_ms: f32) {
        self.in_frame = true;
        self.stats.frame_index += 1;
        self.stats.draw_calls = 0;
        self.stats.user_vertices = 0;
        self.stats.user_indices = 0;

        self.fps_frames += 1;
        self.fps_elapsed_ms += dt_ms.max(0.0);
        if self.fps_elapsed_ms >= 1000.0 {
            self.stats.fps = (self.fps_frames as f32 * 1000.0 / self.fps_elapsed_ms).round() as u32;
            self.fps_frames = 0;
            self.fps_elapsed_ms = 0.0;
        }
    }

    /// Whether a frame is open
    pub const fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Counters of the current (or last) frame
    pub const fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub(crate) fn count_draw(&mut self, user_vertices: u32, user_indices: u32) {
        self.stats.draw_calls += 1;
        self.stats.user_vertices += user_vertices;
        self.stats.user_indices += user_indices;
    }
}

impl RenderContext {
    /// Start a frame
    ///
    /// Returns `Ok(false)` when the device is lost and could not be reset
    /// yet; the caller skips drawing and tries again next frame.
    pub fn begin_frame(&mut self, dt_ms: f32) -> RenderResult<bool> {
        if self.frame.in_frame {
            log::warn!("begin_frame called inside a frame");
            return Ok(true);
        }
        if !self.try_restore() {
            return Ok(false);
        }

        let (width, height) = self.state.screen_size();
        self.post.begin_frame(dt_ms, width, height);
        self.frame.begin(dt_ms);

        let screen = self.lifecycle.screen_target();
        let target = self.post.scene_target(screen.depth).unwrap_or(screen);
        self.bind_target(target);

        let mut flags = ClearFlags::TARGET | ClearFlags::ZBUFFER;
        if self.lifecycle.params().depth_format.has_stencil() {
            flags |= ClearFlags::STENCIL;
        }
        match self.clear(flags, self.config.background_color) {
            Ok(()) => Ok(true),
            Err(RenderError::DeviceLost) => {
                self.frame.in_frame = false;
                self.lost_render();
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Finish the frame and present it
    ///
    /// A device loss at present is reported as [`PresentStatus::DeviceLost`]
    /// after every video-memory object has been released.
    pub fn end_frame(&mut self) -> RenderResult<PresentStatus> {
        if !self.frame.in_frame {
            if self.lifecycle.state() != DeviceState::Active {
                return Ok(PresentStatus::DeviceLost);
            }
            log::warn!("end_frame called without begin_frame");
        }
        self.frame.in_frame = false;

        match self.finish_frame() {
            Ok(()) => {}
            Err(RenderError::DeviceLost) => {
                self.lost_render();
                return Ok(PresentStatus::DeviceLost);
            }
            Err(e) => {
                log::error!("Frame {} finished with errors: {}", self.frame.stats.frame_index, e);
            }
        }

        let status = self.device.present()?;
        if status == PresentStatus::DeviceLost {
            self.lost_render();
        }
        Ok(status)
    }

    fn finish_frame(&mut self) -> RenderResult<()> {
        self.draw_overlays()?;
        self.make_post_process()?;
        if std::mem::take(&mut self.frame.screenshot_requested) {
            match self.save_screenshot() {
                Ok(path) => log::info!("Screenshot saved to {}", path.display()),
                Err(RenderError::DeviceLost) => return Err(RenderError::DeviceLost),
                Err(e) => log::error!("Screenshot failed: {}", e),
            }
        }
        Ok(())
    }

    fn draw_overlays(&mut self) -> RenderResult<()> {
        if self.config.show_fps {
            let (width, height) = self.state.screen_size();
            let text = format!("FPS {}", self.frame.stats.fps);
            self.print(width as f32 - 100.0, height as f32 - 50.0, &text)?;
        }
        if self.config.show_ex_info {
            let totals = self.resource_totals();
            let mb = |bytes: u64| bytes as f32 / (1024.0 * 1024.0);
            let stats = self.frame.stats;
            let lines = [
                format!("t : {}, {:.3} Mb", totals.textures, mb(totals.texture_bytes)),
                format!("v : {}, {:.3} Mb", totals.vertex_buffers, mb(totals.vertex_bytes)),
                format!("i : {}, {:.3} Mb", totals.index_buffers, mb(totals.index_bytes)),
                format!(
                    "d : {}, lv: {}, li: {}",
                    stats.draw_calls, stats.user_vertices, stats.user_indices
                ),
            ];
            for (row, line) in lines.iter().enumerate() {
                self.print(80.0, 50.0 + 20.0 * row as f32, line)?;
            }
        }
        Ok(())
    }

    /// Capture the back buffer at the end of the current frame
    pub fn request_screenshot(&mut self) {
        self.frame.screenshot_requested = true;
    }

    /// Where the last screenshot was written
    pub fn last_screenshot(&self) -> Option<&Path> {
        self.frame.last_screenshot.as_deref()
    }

    /// Read the back buffer and write it to the screenshot directory now
    pub fn save_screenshot(&mut self) -> RenderResult<PathBuf> {
        let capture = self.device.read_back_buffer().map_err(RenderError::from_device)?;
        let dir = PathBuf::from(&self.config.screenshot_dir);
        std::fs::create_dir_all(&dir)?;
        let now = chrono::Local::now().naive_local();
        let path = screenshot_path(&dir, &now, self.config.screenshot_format);
        save_capture(&capture, &path, self.config.screenshot_format)?;
        self.frame.last_screenshot = Some(path.clone());
        Ok(path)
    }

    /// Counters of the current (or last) frame
    pub const fn frame_stats(&self) -> &FrameStats {
        self.frame.stats()
    }

    /// Whether a frame is open
    pub const fn in_frame(&self) -> bool {
        self.frame.in_frame()
    }

    /// Live resource counts and sizes
    pub fn resource_totals(&self) -> ResourceTotals {
        ResourceTotals {
            textures: self.textures.len(),
            texture_bytes: self.textures.total_bytes(),
            vertex_buffers: self.vertex_buffers.len(),
            vertex_bytes: self.vertex_buffers.total_bytes(),
            index_buffers: self.index_buffers.len(),
            index_bytes: self.index_buffers.total_bytes(),
        }
    }
}

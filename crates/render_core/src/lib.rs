//! # Render Core
//!
//! GPU resource and frame lifecycle management for a fixed-function style
//! 3D renderer.
//!
//! ## Features
//!
//! - **Resource tables**: Named, reference-counted textures, buffers and fonts
//!   behind generation-checked handles
//! - **Device loss recovery**: Device-dependent objects are dropped on loss
//!   and rebuilt on restore, with listener notification
//! - **State tracking**: Transforms, lights, fog and pipeline state flushed
//!   lazily before each draw
//! - **Frame pipeline**: Scene clear, overlays, blur/glow post-processing,
//!   screenshots and present
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RenderConfig::load_or_default("resource/ini/render.toml");
//!     let mut ctx = RenderContext::with_manifest(config, Box::new(HeadlessDevice::new()))?;
//!
//!     if ctx.begin_frame(16.0)? {
//!         ctx.print(10.0, 10.0, "hello")?;
//!         ctx.end_frame()?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod error;
pub mod backend;
pub mod resources;
pub mod state;
pub mod device;
pub mod postprocess;
pub mod frame;

mod context;

pub use context::RenderContext;
pub use error::{RenderError, RenderResult};

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        backend::{
            BufferUsage, ClearFlags, GraphicsDevice, HeadlessController, HeadlessDevice,
            IndexFormat, MemoryPool, PresentStatus, PrimitiveType, TextureFormat, TextureUsage,
            VertexFormat,
        },
        config::{Config, FontManifest, GlowConfig, RenderConfig, ScreenshotFormat},
        device::{DeviceListener, DeviceState, ListenerId},
        foundation::math::{Mat4, Vec2, Vec3},
        frame::{submit::PrintStyle, FrameStats, ResourceTotals},
        resources::{FontHandle, IndexBufferHandle, TextAlign, TextureHandle, VertexBufferHandle},
        state::{BlendState, Light, LightKind, Material, PassOverrides, TransformKind, Viewport},
        RenderContext, RenderError, RenderResult,
    };
}

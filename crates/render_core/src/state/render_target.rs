//! Render target descriptors and the push/pop stack

use crate::backend::{CubeFace, NativeTexture, TargetBinding};

/// Viewport rectangle and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels
    pub x: u32,
    /// Top edge in pixels
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Depth range start
    pub min_z: f32,
    /// Depth range end
    pub max_z: f32,
}

impl Viewport {
    /// Full-surface viewport
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            min_z: 0.0,
            max_z: 1.0,
        }
    }
}

/// Surfaces plus viewport that make up "where draws go"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetDescriptor {
    /// Colour surface
    pub color: Option<NativeTexture>,
    /// Depth surface
    pub depth: Option<NativeTexture>,
    /// Viewport
    pub viewport: Viewport,
    /// Cube face when `color` is a cube map
    pub face: Option<CubeFace>,
}

impl RenderTargetDescriptor {
    /// Native binding for the device
    pub const fn binding(&self) -> TargetBinding {
        TargetBinding {
            color: self.color,
            depth: self.depth,
            face: self.face,
        }
    }
}

/// Saved render targets
#[derive(Debug, Default)]
pub struct RenderTargetStack {
    entries: Vec<RenderTargetDescriptor>,
}

impl RenderTargetStack {
    /// Save a descriptor
    pub fn push(&mut self, target: RenderTargetDescriptor) {
        self.entries.push(target);
    }

    /// Take the most recently saved descriptor
    pub fn pop(&mut self) -> Option<RenderTargetDescriptor> {
        self.entries.pop()
    }

    /// Number of saved descriptors
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Drop every saved descriptor, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

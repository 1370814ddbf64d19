//! Underwater distortion grid
//!
//! The scene composite is drawn through a 32x32 vertex grid whose texture
//! coordinates wobble on a sine wave, instead of through a single quad.

use std::f32::consts::PI;

use super::quad::QuadVertex;

/// Vertices per grid side
pub const GRID_SIDE: usize = 32;

/// Cells per grid side
const CELLS: usize = GRID_SIDE - 1;

/// Distortion grid state
#[derive(Debug, Clone)]
pub struct SeaEffect {
    enabled: bool,
    size: f32,
    speed: f32,
    phase: f32,
    vertices: Vec<QuadVertex>,
    indices: Vec<u16>,
}

impl Default for SeaEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl SeaEffect {
    /// Disabled grid
    pub fn new() -> Self {
        Self {
            enabled: false,
            size: 0.0,
            speed: 0.0,
            phase: 0.0,
            vertices: vec![QuadVertex::single(0.0, 0.0, 0.0, 0.0); GRID_SIDE * GRID_SIDE],
            indices: grid_indices(),
        }
    }

    /// Turn the effect on or off
    ///
    /// `size` is the wave amplitude as a fraction of the screen, `speed`
    /// scales how fast the phase advances.
    pub fn set(&mut self, enabled: bool, size: f32, speed: f32) {
        self.enabled = enabled;
        self.size = size;
        self.speed = speed;
    }

    /// Whether the effect is on
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current wave phase in radians
    pub const fn phase(&self) -> f32 {
        self.phase
    }

    /// Advance the wave and rebuild the grid for a `width` x `height` screen
    pub fn update(&mut self, dt_ms: f32, width: f32, height: f32) {
        if !self.enabled {
            return;
        }
        self.phase += dt_ms * 0.001 * self.speed;

        let dx = (width * self.size).trunc();
        let dy = (height * self.size).trunc();
        let span_x = width + 2.0 * dx;
        let span_y = height + 2.0 * dy;
        let cells = CELLS as f32;

        for y in 0..GRID_SIDE {
            for x in 0..GRID_SIDE {
                let fx = x as f32 / cells;
                let fy = y as f32 / cells;
                let px = width * fx;
                let py = height * fy;
                let u = (px + (self.phase + fx * 16.0 * PI).sin() * dx + dx) / span_x;
                let v = (py + (self.phase + fy * 16.0 * PI).sin() * dy + dy) / span_y;
                self.vertices[y * GRID_SIDE + x] = QuadVertex::single(px, py, u, v);
            }
        }
    }

    /// Grid vertices, row-major
    pub fn vertices(&self) -> &[QuadVertex] {
        &self.vertices
    }

    /// Triangle list indices
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub(crate) fn take_grid(&mut self) -> (Vec<QuadVertex>, Vec<u16>) {
        (std::mem::take(&mut self.vertices), std::mem::take(&mut self.indices))
    }

    pub(crate) fn put_grid(&mut self, vertices: Vec<QuadVertex>, indices: Vec<u16>) {
        self.vertices = vertices;
        self.indices = indices;
    }
}

fn grid_indices() -> Vec<u16> {
    let mut indices = Vec::with_capacity(CELLS * CELLS * 6);
    for y in 0..CELLS {
        for x in 0..CELLS {
            let top = (y * GRID_SIDE + x) as u16;
            let bottom = ((y + 1) * GRID_SIDE + x) as u16;
            indices.extend_from_slice(&[top + 1, bottom, top, top + 1, bottom + 1, bottom]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_shape() {
        let sea = SeaEffect::new();
        assert_eq!(sea.vertices().len(), 32 * 32);
        assert_eq!(sea.indices().len(), 31 * 31 * 2 * 3);
        assert_eq!(&sea.indices()[..6], &[1, 32, 0, 1, 33, 32]);
        assert_eq!(sea.indices().iter().copied().max(), Some(1023));
    }

    #[test]
    fn test_disabled_effect_does_not_advance() {
        let mut sea = SeaEffect::new();
        sea.update(100.0, 800.0, 600.0);
        assert_eq!(sea.phase(), 0.0);
    }

    #[test]
    fn test_phase_advances_with_speed() {
        let mut sea = SeaEffect::new();
        sea.set(true, 0.01, 2.0);
        sea.update(500.0, 800.0, 600.0);
        assert_relative_eq!(sea.phase(), 1.0);
        sea.update(250.0, 800.0, 600.0);
        assert_relative_eq!(sea.phase(), 1.5);
    }

    #[test]
    fn test_grid_positions_and_coordinates() {
        let mut sea = SeaEffect::new();
        sea.set(true, 0.0, 0.0);
        sea.update(16.0, 620.0, 310.0);
        let vertices = sea.vertices();
        let corner = vertices[GRID_SIDE * GRID_SIDE - 1];
        assert_relative_eq!(corner.position[0], 620.0);
        assert_relative_eq!(corner.position[1], 310.0);

        // Zero amplitude: coordinates are plain 0..1
        let mid = vertices[GRID_SIDE + 1];
        assert_relative_eq!(mid.uv[0][0], 1.0 / 31.0, epsilon = 1e-6);
        assert_relative_eq!(mid.uv[0][1], 1.0 / 31.0, epsilon = 1e-6);
    }

    #[test]
    fn test_amplitude_keeps_coordinates_in_range() {
        let mut sea = SeaEffect::new();
        sea.set(true, 0.05, 1.0);
        sea.update(1234.0, 800.0, 600.0);
        for vertex in sea.vertices() {
            assert!((-1e-5..=1.0 + 1e-5).contains(&vertex.uv[0][0]));
            assert!((-1e-5..=1.0 + 1e-5).contains(&vertex.uv[0][1]));
        }
    }
}

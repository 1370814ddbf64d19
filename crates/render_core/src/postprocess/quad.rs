//! Screen-space quads with four texture-coordinate taps

use bytemuck::{Pod, Zeroable};

use crate::backend::VertexFormat;

/// Pre-transformed vertex with four texture-coordinate sets
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Screen position, `w` = 1
    pub position: [f32; 4],
    /// One coordinate set per texture stage
    pub uv: [[f32; 2]; 4],
}

impl QuadVertex {
    /// Vertex layout
    pub const FORMAT: VertexFormat = VertexFormat::XYZRHW.union(VertexFormat::TEX4);

    /// Vertex with every tap at the same coordinate
    pub const fn single(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y, 0.0, 1.0],
            uv: [[u, v]; 4],
        }
    }
}

/// Quad for rendering a `src_width` x `src_height` texture into a
/// `width` x `height` target
///
/// Positions sit half a pixel up-left so texels map onto pixel centres;
/// coordinates stay half a source texel inside the edges. Each corner gets
/// four taps offset diagonally by `blur` source texels, which a 4-stage
/// average turns into a box filter. `mul_u`/`mul_v` scale the coordinates
/// when only part of the source is used.
pub fn render_quad(
    width: f32,
    height: f32,
    src_width: f32,
    src_height: f32,
    mul_u: f32,
    mul_v: f32,
    blur: f32,
) -> [QuadVertex; 4] {
    let texel_u = 1.0 / src_width;
    let texel_v = 1.0 / src_height;
    let (near_u, far_u) = (texel_u * 0.5, 1.0 - texel_u * 0.5);
    let (near_v, far_v) = (texel_v * 0.5, 1.0 - texel_v * 0.5);

    let corners = [
        ([-0.5, height - 0.5], [near_u, far_v]),
        ([-0.5, -0.5], [near_u, near_v]),
        ([width - 0.5, height - 0.5], [far_u, far_v]),
        ([width - 0.5, -0.5], [far_u, near_v]),
    ];

    let (du, dv) = (texel_u * blur, texel_v * blur);
    corners.map(|([x, y], [u, v])| {
        let (u, v) = (u * mul_u, v * mul_v);
        QuadVertex {
            position: [x, y, 0.0, 1.0],
            uv: [[u - du, v - dv], [u + du, v - dv], [u - du, v + dv], [u + du, v + dv]],
        }
    })
}

/// Full-screen strip with plain 0..1 coordinates
pub fn screen_quad(width: f32, height: f32) -> [QuadVertex; 4] {
    [
        QuadVertex::single(0.0, height, 0.0, 1.0),
        QuadVertex::single(0.0, 0.0, 0.0, 0.0),
        QuadVertex::single(width, height, 1.0, 1.0),
        QuadVertex::single(width, 0.0, 1.0, 0.0),
    ]
}

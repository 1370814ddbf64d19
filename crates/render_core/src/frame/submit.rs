//! Draw calls, texture binding, render targets and text
//!
//! Every draw takes an optional technique name. Without one the call is
//! issued once with the current pipeline state; with one it is issued once
//! per pass, and an unknown technique draws nothing. Draws return the number
//! of passes issued.

use bytemuck::Pod;

use crate::backend::{ClearFlags, CubeFace, DrawCall, PrimitiveType, VertexFormat};
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::resources::{
    FontHandle, FontVertex, IndexBufferHandle, TextAlign, TextureHandle, VertexBufferHandle,
};
use crate::state::{PassOverrides, RenderTargetDescriptor, Viewport};

/// Technique used for text
pub const TECHNIQUE_FONT: &str = "Font";

/// Options for [`RenderContext::ext_print`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintStyle {
    /// Text colour, ARGB
    pub color: u32,
    /// Shadow colour, ARGB
    pub shadow_color: u32,
    /// Anchor of `x`
    pub align: TextAlign,
    /// Draw a shadow one pixel down-right
    pub shadow: bool,
    /// Glyph scale
    pub scale: f32,
    /// Virtual screen size `x`/`y` are given in; zero means the real one
    pub screen_size: (u32, u32),
}

impl Default for PrintStyle {
    fn default() -> Self {
        Self {
            color: 0xFFFF_FFFF,
            shadow_color: 0xFF00_0000,
            align: TextAlign::Left,
            shadow: false,
            scale: 1.0,
            screen_size: (0, 0),
        }
    }
}

impl RenderContext {
    /// Begin a technique, applying its first pass
    ///
    /// False for an unknown technique or one without passes.
    pub fn technique_execute_start(&mut self, name: &str) -> bool {
        match self.techniques.start(name) {
            Some(pass) => {
                self.apply_pass(&pass);
                true
            }
            None => {
                if !self.techniques.contains(name) {
                    log::warn!("Unknown technique '{}'", name);
                }
                false
            }
        }
    }

    /// Apply the next pass of the running technique
    ///
    /// False once every pass has run; the baseline state is back in place.
    pub fn technique_execute_next(&mut self) -> bool {
        match self.techniques.next_pass() {
            Some(pass) => {
                self.apply_pass(&pass);
                true
            }
            None => {
                self.apply_pass(&PassOverrides::default());
                false
            }
        }
    }

    fn apply_pass(&mut self, pass: &PassOverrides) {
        let states = self.state.common_states().with_overrides(pass);
        self.device.apply_states(&states);
    }

    fn submit(&mut self, call: &DrawCall<'_>, technique: Option<&str>) -> RenderResult<u32> {
        let Some(name) = technique else {
            self.issue(call)?;
            return Ok(1);
        };
        if !self.technique_execute_start(name) {
            return Ok(0);
        }
        let mut passes = 0;
        loop {
            if let Err(e) = self.issue(call) {
                while self.technique_execute_next() {}
                return Err(e);
            }
            passes += 1;
            if !self.technique_execute_next() {
                return Ok(passes);
            }
        }
    }

    fn issue(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        self.state.flush(self.device.as_mut());
        self.device.draw(call).map_err(RenderError::from_device)?;
        let (vertices, indices) = match call {
            DrawCall::User { .. } => (call.element_count(), 0),
            DrawCall::UserIndexed { vertices, stride, indices, .. } => {
                ((vertices.len() as u32) / (*stride).max(1), indices.len() as u32)
            }
            DrawCall::Buffer { .. } | DrawCall::Indexed { .. } => (0, 0),
        };
        self.frame.count_draw(vertices, indices);
        log::trace!("{:?} x{}", call.primitive(), call.element_count());
        Ok(())
    }

    /// Draw `vertex_count` vertices of a vertex buffer
    pub fn draw_buffer(
        &mut self,
        primitive: PrimitiveType,
        vertex_buffer: VertexBufferHandle,
        start_vertex: u32,
        vertex_count: u32,
        technique: Option<&str>,
    ) -> RenderResult<u32> {
        let format = self.vertex_buffers.format(vertex_buffer)?;
        let count = primitive.primitive_count(vertex_count);
        self.draw_primitive(primitive, format, vertex_buffer, start_vertex, count, technique)
    }

    /// Draw `primitive_count` primitives of a vertex buffer read with `format`
    pub fn draw_primitive(
        &mut self,
        primitive: PrimitiveType,
        format: VertexFormat,
        vertex_buffer: VertexBufferHandle,
        start_vertex: u32,
        primitive_count: u32,
        technique: Option<&str>,
    ) -> RenderResult<u32> {
        let native = self.vertex_buffers.native(vertex_buffer)?.ok_or(RenderError::DeviceLost)?;
        let call = DrawCall::Buffer {
            primitive,
            vertex_buffer: native,
            format,
            start_vertex,
            vertex_count: primitive.vertex_count(primitive_count),
        };
        self.submit(&call, technique)
    }

    /// Draw `index_count` indices of an index buffer
    pub fn draw_indexed_buffer(
        &mut self,
        primitive: PrimitiveType,
        vertex_buffer: VertexBufferHandle,
        index_buffer: IndexBufferHandle,
        base_vertex: u32,
        start_index: u32,
        index_count: u32,
        technique: Option<&str>,
    ) -> RenderResult<u32> {
        let vertex_native = self
            .vertex_buffers
            .native(vertex_buffer)?
            .ok_or(RenderError::DeviceLost)?;
        let index_native = self.index_buffers.native(index_buffer)?.ok_or(RenderError::DeviceLost)?;
        let call = DrawCall::Indexed {
            primitive,
            vertex_buffer: vertex_native,
            index_buffer: index_native,
            format: self.vertex_buffers.format(vertex_buffer)?,
            base_vertex,
            start_index,
            index_count,
        };
        self.submit(&call, technique)
    }

    /// Draw vertices from caller memory
    pub fn draw_primitive_up<V: Pod>(
        &mut self,
        primitive: PrimitiveType,
        format: VertexFormat,
        vertices: &[V],
        technique: Option<&str>,
    ) -> RenderResult<u32> {
        if vertices.is_empty() {
            return Ok(0);
        }
        let stride = checked_stride::<V>(format);
        let call = DrawCall::User {
            primitive,
            format,
            vertices: bytemuck::cast_slice(vertices),
            stride,
        };
        self.submit(&call, technique)
    }

    /// Draw indexed vertices from caller memory
    pub fn draw_indexed_primitive_up<V: Pod>(
        &mut self,
        primitive: PrimitiveType,
        format: VertexFormat,
        vertices: &[V],
        indices: &[u16],
        technique: Option<&str>,
    ) -> RenderResult<u32> {
        if vertices.is_empty() || indices.is_empty() {
            return Ok(0);
        }
        let stride = checked_stride::<V>(format);
        let call = DrawCall::UserIndexed {
            primitive,
            format,
            vertices: bytemuck::cast_slice(vertices),
            stride,
            indices,
        };
        self.submit(&call, technique)
    }

    /// Bind a texture to a sampler stage
    ///
    /// A texture dropped by a device loss is recreated first. A stale
    /// handle, or one whose texture cannot be recreated, binds nothing;
    /// returns whether the requested texture is bound.
    pub fn set_texture(&mut self, stage: u32, texture: Option<TextureHandle>) -> bool {
        let native = match texture {
            None => None,
            Some(handle) => match self.textures.ensure_resident(self.device.as_mut(), handle) {
                Ok(native) => Some(native),
                Err(e) => {
                    log::debug!("Stage {} left empty: {}", stage, e);
                    None
                }
            },
        };
        self.device.bind_texture(stage, native);
        native.is_some() || texture.is_none()
    }

    /// Clear the bound target
    pub fn clear(&mut self, flags: ClearFlags, color: u32) -> RenderResult<()> {
        self.device
            .clear(flags, color, 1.0, 0)
            .map_err(RenderError::from_device)
    }

    /// Current viewport
    pub const fn viewport(&self) -> &Viewport {
        self.state.viewport()
    }

    /// Set the viewport of the bound target
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.device.set_viewport(&viewport);
        self.state.set_viewport(viewport);
        self.current_target.viewport = viewport;
    }

    /// Save the bound target and viewport
    pub fn push_render_target(&mut self) {
        self.targets.push(self.current_target);
    }

    /// Rebind the most recently pushed target
    ///
    /// False (and nothing changes) when the stack is empty.
    pub fn pop_render_target(&mut self) -> bool {
        match self.targets.pop() {
            Some(target) => {
                self.bind_target(target);
                true
            }
            None => {
                log::warn!("pop_render_target on an empty stack");
                false
            }
        }
    }

    /// Number of pushed targets
    pub fn render_target_depth(&self) -> usize {
        self.targets.depth()
    }

    /// Render into textures
    ///
    /// `color` must have render-target usage; `face` picks the face of a
    /// cube map. `None` for `color` keeps rendering to the back buffer,
    /// `None` for `depth` renders without a depth surface. The viewport
    /// covers the colour surface.
    pub fn set_render_target(
        &mut self,
        color: Option<TextureHandle>,
        depth: Option<TextureHandle>,
        face: Option<CubeFace>,
    ) -> RenderResult<()> {
        let screen = self.lifecycle.screen_target();
        let (color_native, viewport) = match color {
            Some(handle) => {
                let native = self.textures.ensure_resident(self.device.as_mut(), handle)?;
                let desc = self.textures.info(handle)?.desc;
                (Some(native), Viewport::full(desc.width, desc.height))
            }
            None => (screen.color, screen.viewport),
        };
        let depth_native = match depth {
            Some(handle) => Some(self.textures.ensure_resident(self.device.as_mut(), handle)?),
            None => None,
        };
        self.bind_target(RenderTargetDescriptor {
            color: color_native,
            depth: depth_native,
            viewport,
            face,
        });
        Ok(())
    }

    /// Bind the back buffer and its depth surface
    pub fn set_screen_as_render_target(&mut self) {
        self.bind_screen_target();
    }

    /// Print with the current font in white
    ///
    /// Returns the printed width in pixels; zero when no font is loaded.
    pub fn print(&mut self, x: f32, y: f32, text: &str) -> RenderResult<f32> {
        match self.fonts.current() {
            Some(font) => self.draw_text(font, x, y, text, 1.0, 0xFFFF_FFFF),
            None => Ok(0.0),
        }
    }

    /// Print with a given font and colour
    pub fn print_with(
        &mut self,
        font: FontHandle,
        color: u32,
        x: f32,
        y: f32,
        text: &str,
    ) -> RenderResult<f32> {
        self.draw_text(font, x, y, text, 1.0, color)
    }

    /// Print with alignment, shadow and scale
    ///
    /// `x`/`y` are in the style's virtual screen size; the horizontal ratio
    /// to the real screen also scales the glyphs.
    pub fn ext_print(
        &mut self,
        font: FontHandle,
        style: &PrintStyle,
        x: f32,
        y: f32,
        text: &str,
    ) -> RenderResult<f32> {
        let (screen_w, screen_h) = self.state.screen_size();
        let virtual_w = if style.screen_size.0 == 0 { screen_w } else { style.screen_size.0 };
        let virtual_h = if style.screen_size.1 == 0 { screen_h } else { style.screen_size.1 };

        let mut scale = style.scale;
        let mut x = x;
        let mut y = y;
        if virtual_w != screen_w {
            let ratio = screen_w as f32 / virtual_w as f32;
            x *= ratio;
            scale *= ratio;
        }
        if virtual_h != screen_h {
            y *= screen_h as f32 / virtual_h as f32;
        }

        let width = match self.fonts.atlas(font) {
            Ok(atlas) => atlas.string_width(text, scale),
            Err(_) => return Ok(0.0),
        };
        let left = style.align.left_edge(x, width).trunc();
        if style.shadow {
            self.draw_text(font, left + 1.0, y + 1.0, text, scale, style.shadow_color)?;
        }
        self.draw_text(font, left, y, text, scale, style.color)
    }

    fn draw_text(
        &mut self,
        font: FontHandle,
        x: f32,
        y: f32,
        text: &str,
        scale: f32,
        color: u32,
    ) -> RenderResult<f32> {
        if self.fonts.ref_count(font).unwrap_or(0) == 0 {
            return Ok(0.0);
        }
        let Some(texture) = self.fonts.texture(font)? else {
            return Ok(0.0);
        };
        let atlas = self.fonts.atlas(font)?;
        let width = atlas.string_width(text, scale);
        let vertices = atlas.layout(text, x, y, scale, color);
        if vertices.is_empty() {
            return Ok(width);
        }

        if !self.set_texture(0, Some(texture)) {
            return Ok(0.0);
        }
        self.draw_primitive_up(
            PrimitiveType::TriangleList,
            FontVertex::FORMAT,
            &vertices,
            Some(TECHNIQUE_FONT),
        )?;
        Ok(width)
    }
}

fn checked_stride<V>(format: VertexFormat) -> u32 {
    let stride = std::mem::size_of::<V>() as u32;
    if format.stride() != stride {
        log::warn!(
            "Vertex format {:?} expects {} bytes per vertex, got {}",
            format,
            format.stride(),
            stride
        );
    }
    stride
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BufferUsage, DeviceCommand, IndexFormat, MemoryPool, TextureFormat, TextureUsage,
    };
    use crate::config::RenderConfig;
    use crate::context::tests::headless_context;
    use crate::frame::Technique;
    use crate::state::{BlendState, CullMode};

    fn draw_count(commands: &[DeviceCommand]) -> usize {
        commands.iter().filter(|c| matches!(c, DeviceCommand::Draw { .. })).count()
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Position([f32; 3]);

    const TRIANGLE: [Position; 3] = [
        Position([0.0, 0.0, 0.0]),
        Position([1.0, 0.0, 0.0]),
        Position([0.0, 1.0, 0.0]),
    ];

    #[test]
    fn test_technique_passes_repeat_the_draw() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        let two_sided = PassOverrides {
            cull: Some(CullMode::None),
            ..PassOverrides::default()
        };
        ctx.techniques
            .register(Technique::new(
                "Outline",
                vec![PassOverrides::default(), two_sided, two_sided],
            ));
        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();

        let passes = ctx
            .draw_primitive_up(
                PrimitiveType::TriangleList,
                VertexFormat::XYZ,
                &TRIANGLE,
                Some("outline"),
            )
            .expect("Should draw");
        assert_eq!(passes, 3);
        assert_eq!(draw_count(&control.commands()), 3);
        assert_eq!(ctx.frame_stats().draw_calls, 3);
        assert_eq!(ctx.frame_stats().user_vertices, 9);
        assert_eq!(control.states().map(|s| s.cull), Some(CullMode::CounterClockwise));
    }

    #[test]
    fn test_unknown_technique_draws_nothing() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();
        let passes = ctx
            .draw_primitive_up(
                PrimitiveType::TriangleList,
                VertexFormat::XYZ,
                &TRIANGLE,
                Some("NoSuchThing"),
            )
            .expect("Unknown technique is not an error");
        assert_eq!(passes, 0);
        assert_eq!(draw_count(&control.commands()), 0);

        let passes = ctx
            .draw_primitive_up(PrimitiveType::TriangleList, VertexFormat::XYZ, &TRIANGLE, None)
            .expect("Should draw");
        assert_eq!(passes, 1);
    }

    #[test]
    fn test_buffer_draws() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        let vb = ctx
            .create_vertex_buffer(36 * 4, BufferUsage::WRITE_ONLY, VertexFormat::XYZ)
            .expect("Should create vertex buffer");
        let ib = ctx
            .create_index_buffer(12, BufferUsage::WRITE_ONLY, IndexFormat::U16)
            .expect("Should create index buffer");
        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();

        let passes = ctx
            .draw_buffer(PrimitiveType::TriangleStrip, vb, 0, 4, None)
            .expect("Should draw");
        assert_eq!(passes, 1);
        assert_eq!(
            ctx.draw_primitive(PrimitiveType::TriangleList, VertexFormat::XYZ, vb, 0, 2, None)
                .expect("Should draw"),
            1
        );
        assert_eq!(
            ctx.draw_indexed_buffer(PrimitiveType::TriangleList, vb, ib, 0, 0, 6, None)
                .expect("Should draw"),
            1
        );

        let elements: Vec<u32> = control
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCommand::Draw { elements, .. } => Some(elements),
                _ => None,
            })
            .collect();
        assert_eq!(elements, vec![4, 6, 6]);
    }

    #[test]
    fn test_released_buffer_is_rejected() {
        let (mut ctx, _control) = headless_context(RenderConfig::default());
        let vb = ctx
            .create_vertex_buffer(36, BufferUsage::empty(), VertexFormat::XYZ)
            .expect("Should create vertex buffer");
        assert_eq!(ctx.release_vertex_buffer(vb).expect("Should release"), 0);
        let result = ctx.draw_buffer(PrimitiveType::TriangleList, vb, 0, 3, None);
        assert!(matches!(result, Err(e) if e.is_handle_error()));
    }

    #[test]
    fn test_set_texture_binds_and_reloads() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        let target = ctx
            .create_texture(
                32,
                32,
                1,
                TextureUsage::RENDER_TARGET,
                TextureFormat::A8R8G8B8,
                MemoryPool::Default,
            )
            .expect("Should create texture");
        ctx.lost_render();
        ctx.reset_device().expect("Reset should succeed");
        assert!(!ctx.texture_info(target).expect("Slot should remain").is_loaded);

        assert!(ctx.set_texture(0, Some(target)));
        assert!(ctx.texture_info(target).expect("Slot should remain").is_loaded);
        assert!(ctx.set_texture(0, None));

        ctx.release_texture(target).expect("Should release");
        assert!(!ctx.set_texture(1, Some(target)));
        assert!(control.texture_count() > 0);
    }

    #[test]
    fn test_render_target_stack() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        let target = ctx
            .create_texture(
                64,
                32,
                1,
                TextureUsage::RENDER_TARGET,
                TextureFormat::A8R8G8B8,
                MemoryPool::Default,
            )
            .expect("Should create texture");

        assert!(!ctx.pop_render_target());
        ctx.push_render_target();
        ctx.set_render_target(Some(target), None, None).expect("Should bind texture");
        assert_eq!(ctx.viewport(), &Viewport::full(64, 32));
        assert_ne!(ctx.current_target.color, control.back_buffer());

        assert!(ctx.pop_render_target());
        assert_eq!(ctx.current_target.color, control.back_buffer());
        assert_eq!(ctx.viewport(), &Viewport::full(1024, 768));
        assert_eq!(ctx.render_target_depth(), 0);
    }

    #[test]
    fn test_print_uses_font_technique() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();

        let width = ctx.print(10.0, 10.0, "AB").expect("Should print");
        assert_eq!(width, 10.0);
        let draws: Vec<(u32, BlendState)> = control
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCommand::Draw { elements, blend, .. } => Some((elements, blend)),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(12, BlendState::ALPHA)]);
    }

    #[test]
    fn test_ext_print_alignment_and_shadow() {
        let (mut ctx, control) = headless_context(RenderConfig::default());
        let font = ctx.current_font().expect("Start font should be loaded");
        ctx.begin_frame(16.0).expect("Frame should start");
        control.clear_commands();

        let style = PrintStyle {
            align: TextAlign::Center,
            shadow: true,
            scale: 2.0,
            ..PrintStyle::default()
        };
        let width = ctx.ext_print(font, &style, 100.0, 20.0, "AB").expect("Should print");
        assert_eq!(width, 20.0);
        assert_eq!(draw_count(&control.commands()), 2);

        // Half-width virtual screen doubles positions and glyphs
        let virtual_screen = PrintStyle {
            screen_size: (512, 768),
            ..PrintStyle::default()
        };
        let width = ctx.ext_print(font, &virtual_screen, 0.0, 0.0, "A").expect("Should print");
        assert_eq!(width, 10.0);
    }

    #[test]
    fn test_print_after_unload_is_silent() {
        let (mut ctx, _control) = headless_context(RenderConfig::default());
        let font = ctx.current_font().expect("Start font should be loaded");
        assert_eq!(ctx.unload_font(font).expect("Should unload"), 0);
        let width = ctx
            .print_with(font, 0xFFFF_FFFF, 0.0, 0.0, "AB")
            .expect("Should not fail");
        assert_eq!(width, 0.0);
        assert_eq!(ctx.print(0.0, 0.0, "AB").expect("Should not fail"), 0.0);
    }
}

//! Fonts
//!
//! Glyphs are rasterized with `fontdue` into a single alpha atlas per font.
//! The font table shares fonts by name and keeps their metadata when the
//! last reference goes away: only the atlas texture is freed, and the next
//! load of the same name re-uploads it without touching the font file
//! again (temporary unload).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use fontdue::{Font, FontSettings};

use super::slot_table::{Handle, ReleasePolicy, Released, SlotTable};
use super::textures::{TextureHandle, TexturePool};
use crate::backend::{GraphicsDevice, MemoryPool, TextureFormat, TextureUsage, VertexFormat};
use crate::config::{Config, FontManifest};
use crate::error::{RenderError, RenderResult};
use crate::foundation::math::Vec2;

const ASCII_START: u32 = 32;
const ASCII_END: u32 = 126;
const GLYPHS_PER_ROW: u32 = 16;
const FALLBACK_GLYPH: char = '?';

/// Placement of one glyph in the atlas
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphInfo {
    /// Top-left texture coordinate
    pub uv_min: Vec2,
    /// Bottom-right texture coordinate
    pub uv_max: Vec2,
    /// Glyph size in pixels
    pub size: Vec2,
    /// Horizontal advance
    pub advance: f32,
    /// Offset from the pen position (x = left, y = bottom above baseline)
    pub bearing: Vec2,
}

/// Screen-space text vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FontVertex {
    /// Pre-transformed position (x, y, z, rhw)
    pub position: [f32; 4],
    /// Packed ARGB colour
    pub color: u32,
    /// Atlas coordinate
    pub uv: [f32; 2],
}

impl FontVertex {
    /// Layout of [`FontVertex`]
    pub const FORMAT: VertexFormat = VertexFormat::XYZRHW
        .union(VertexFormat::DIFFUSE)
        .union(VertexFormat::TEX1);
}

/// Horizontal alignment for extended printing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    /// `x` is the left edge
    #[default]
    Left,
    /// `x` is the centre
    Center,
    /// `x` is the right edge
    Right,
}

impl TextAlign {
    /// Left edge of a string of `width` pixels anchored at `x`
    pub fn left_edge(self, x: f32, width: f32) -> f32 {
        match self {
            Self::Left => x,
            Self::Center => x - width * 0.5,
            Self::Right => x - width,
        }
    }
}

/// Glyph metadata plus the alpha atlas it indexes
#[derive(Debug, Clone)]
pub struct FontAtlas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    glyphs: HashMap<char, GlyphInfo>,
    line_height: f32,
    ascent: f32,
}

impl FontAtlas {
    /// Rasterize printable ASCII from TrueType/OpenType data
    pub fn rasterize(font_data: &[u8], size_px: f32) -> RenderResult<Self> {
        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| RenderError::not_found("font data", format!("fontdue error: {}", e)))?;

        let mut rasterized = Vec::with_capacity((ASCII_END - ASCII_START + 1) as usize);
        let (mut max_width, mut max_height) = (0u32, 0u32);
        for ch in (ASCII_START..=ASCII_END).filter_map(char::from_u32) {
            let (metrics, bitmap) = font.rasterize(ch, size_px);
            max_width = max_width.max(metrics.width as u32);
            max_height = max_height.max(metrics.height as u32);
            rasterized.push((ch, metrics, bitmap));
        }

        let cell_width = max_width + 2;
        let cell_height = (max_height * 3) / 2 + 1;
        let rows = (rasterized.len() as u32).div_ceil(GLYPHS_PER_ROW);
        let width = (GLYPHS_PER_ROW * cell_width).next_power_of_two();
        let height = (rows * cell_height).next_power_of_two();
        let mut pixels = vec![0u8; (width * height) as usize];
        let mut glyphs = HashMap::with_capacity(rasterized.len());

        for (i, (ch, metrics, bitmap)) in rasterized.into_iter().enumerate() {
            let cell_x = (i as u32 % GLYPHS_PER_ROW) * cell_width;
            let cell_y = (i as u32 / GLYPHS_PER_ROW) * cell_height;
            for (row, src) in bitmap.chunks_exact(metrics.width.max(1)).enumerate() {
                let start = ((cell_y + row as u32) * width + cell_x) as usize;
                pixels[start..start + src.len()].copy_from_slice(src);
            }
            glyphs.insert(
                ch,
                GlyphInfo {
                    uv_min: Vec2::new(cell_x as f32 / width as f32, cell_y as f32 / height as f32),
                    uv_max: Vec2::new(
                        (cell_x + metrics.width as u32) as f32 / width as f32,
                        (cell_y + metrics.height as u32) as f32 / height as f32,
                    ),
                    size: Vec2::new(metrics.width as f32, metrics.height as f32),
                    advance: metrics.advance_width,
                    bearing: Vec2::new(metrics.xmin as f32, metrics.ymin as f32),
                },
            );
        }

        let (ascent, line_height) = font
            .horizontal_line_metrics(size_px)
            .map_or((size_px, size_px), |m| (m.ascent, m.new_line_size));
        log::debug!(
            "Rasterized {} glyphs at {}px into {}x{} atlas",
            glyphs.len(),
            size_px,
            width,
            height
        );
        Self::from_parts(width, height, pixels, glyphs, line_height, ascent)
    }

    /// Assemble an atlas from prepared parts
    pub fn from_parts(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        glyphs: HashMap<char, GlyphInfo>,
        line_height: f32,
        ascent: f32,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 || pixels.len() != (width * height) as usize {
            return Err(RenderError::allocation(
                "font atlas",
                format!("{} bytes for a {}x{} atlas", pixels.len(), width, height),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
            glyphs,
            line_height,
            ascent,
        })
    }

    /// Atlas size in pixels
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Metadata of a glyph
    pub fn glyph(&self, ch: char) -> Option<&GlyphInfo> {
        self.glyphs.get(&ch)
    }

    /// Distance between baselines at scale 1
    pub const fn line_height(&self) -> f32 {
        self.line_height
    }

    fn glyph_or_fallback(&self, ch: char) -> Option<&GlyphInfo> {
        self.glyphs.get(&ch).or_else(|| self.glyphs.get(&FALLBACK_GLYPH))
    }

    /// Width of the widest line of `text`
    pub fn string_width(&self, text: &str, scale: f32) -> f32 {
        text.split('\n')
            .map(|line| {
                line.chars()
                    .filter_map(|ch| self.glyph_or_fallback(ch))
                    .map(|g| g.advance * scale)
                    .sum::<f32>()
            })
            .fold(0.0, f32::max)
    }

    /// Triangle-list vertices for `text` with its top-left corner at (x, y)
    pub fn layout(&self, text: &str, x: f32, y: f32, scale: f32, color: u32) -> Vec<FontVertex> {
        let mut vertices = Vec::with_capacity(text.len() * 6);
        let mut pen = Vec2::new(x, y);
        for ch in text.chars() {
            if ch == '\n' {
                pen = Vec2::new(x, pen.y + self.line_height * scale);
                continue;
            }
            let Some(glyph) = self.glyph_or_fallback(ch) else {
                continue;
            };
            if glyph.size.x > 0.0 && glyph.size.y > 0.0 {
                let left = pen.x + glyph.bearing.x * scale;
                let top = pen.y + (self.ascent - glyph.bearing.y - glyph.size.y) * scale;
                let right = left + glyph.size.x * scale;
                let bottom = top + glyph.size.y * scale;
                let corner = |px: f32, py: f32, u: f32, v: f32| FontVertex {
                    position: [px, py, 0.0, 1.0],
                    color,
                    uv: [u, v],
                };
                let tl = corner(left, top, glyph.uv_min.x, glyph.uv_min.y);
                let tr = corner(right, top, glyph.uv_max.x, glyph.uv_min.y);
                let bl = corner(left, bottom, glyph.uv_min.x, glyph.uv_max.y);
                let br = corner(right, bottom, glyph.uv_max.x, glyph.uv_max.y);
                vertices.extend_from_slice(&[tl, tr, bl, bl, tr, br]);
            }
            pen.x += glyph.advance * scale;
        }
        vertices
    }

    /// Atlas as white BGRA8 pixels carrying the glyph coverage in alpha
    pub fn to_bgra(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&a| [255, 255, 255, a]).collect()
    }
}

/// Produces font atlases by name
pub trait FontLoader {
    /// Build the atlas for `name`
    fn load_font(&mut self, name: &str) -> RenderResult<FontAtlas>;

    /// Replace the name-to-file mapping
    fn set_manifest(&mut self, manifest: FontManifest) {
        let _ = manifest;
    }
}

/// Loads fonts listed in a [`FontManifest`]
#[derive(Debug, Clone, Default)]
pub struct ManifestFontLoader {
    manifest: FontManifest,
    base_dir: PathBuf,
}

impl ManifestFontLoader {
    /// Loader resolving font files against `base_dir`
    pub fn new(manifest: FontManifest, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            base_dir: base_dir.into(),
        }
    }

    /// Loader for a manifest file; font files are relative to its directory
    pub fn from_file(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let manifest = FontManifest::load_from_file(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(manifest, base_dir))
    }

    /// Current manifest
    pub const fn manifest(&self) -> &FontManifest {
        &self.manifest
    }
}

impl FontLoader for ManifestFontLoader {
    fn load_font(&mut self, name: &str) -> RenderResult<FontAtlas> {
        let entry = self
            .manifest
            .entry(name)
            .ok_or_else(|| RenderError::not_found(name, "font not in manifest"))?;
        let path = self.base_dir.join(&entry.file);
        let bytes = std::fs::read(&path)
            .map_err(|e| RenderError::not_found(path.display().to_string(), e))?;
        FontAtlas::rasterize(&bytes, entry.size)
    }

    fn set_manifest(&mut self, manifest: FontManifest) {
        self.manifest = manifest;
    }
}

/// One font slot's record
#[derive(Debug)]
pub struct FontRecord {
    atlas: FontAtlas,
    gpu: Option<TextureHandle>,
}

/// Handle to a loaded font
pub type FontHandle = Handle<FontRecord>;

/// Reference-counted font table with temporary unload
pub struct FontTable {
    table: SlotTable<FontRecord>,
    current: Option<FontHandle>,
}

impl FontTable {
    /// Create an empty table
    pub fn new(capacity: usize) -> Self {
        Self {
            table: SlotTable::new("font", capacity, ReleasePolicy::Retain),
            current: None,
        }
    }

    /// Number of fonts with metadata, loaded or not
    pub const fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no font was ever loaded
    pub const fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Load a font by name, or share / reactivate an existing one
    pub fn load_font(
        &mut self,
        device: &mut dyn GraphicsDevice,
        textures: &mut TexturePool,
        loader: &mut dyn FontLoader,
        name: &str,
    ) -> RenderResult<FontHandle> {
        let (handle, _) = self.table.acquire_named(
            name,
            || {
                Ok(FontRecord {
                    atlas: loader.load_font(name)?,
                    gpu: None,
                })
            },
            |_| Ok(()),
        )?;

        let record = self.table.get_mut(handle)?;
        if record.gpu.is_none() {
            match upload_atlas(device, textures, &record.atlas) {
                Ok(texture) => record.gpu = Some(texture),
                Err(e) => log::error!("Can't upload atlas of font '{}': {}", name, e),
            }
        }
        if self.current.is_none() {
            self.current = Some(handle);
        }
        Ok(handle)
    }

    /// Drop one reference; at zero the atlas texture is freed
    ///
    /// Returns the remaining count.
    pub fn unload_font(
        &mut self,
        device: &mut dyn GraphicsDevice,
        textures: &mut TexturePool,
        handle: FontHandle,
    ) -> RenderResult<u32> {
        match self.table.release(handle)? {
            Released::Retained { remaining } => Ok(remaining),
            Released::Dormant | Released::Freed(_) => {
                let record = self.table.get_mut(handle)?;
                if let Some(texture) = record.gpu.take() {
                    textures.release(device, texture)?;
                }
                if self.current == Some(handle) {
                    self.current = self.first_active();
                    log::debug!("Current font unloaded, falling back to {:?}", self.current);
                }
                Ok(0)
            }
        }
    }

    /// [`Self::unload_font`] by name
    pub fn unload_font_by_name(
        &mut self,
        device: &mut dyn GraphicsDevice,
        textures: &mut TexturePool,
        name: &str,
    ) -> RenderResult<u32> {
        let handle = self
            .table
            .find(name)
            .ok_or_else(|| RenderError::not_found(name, "font not loaded"))?;
        self.unload_font(device, textures, handle)
    }

    /// Add a reference, returning the new count
    pub fn inc_reference(&mut self, handle: FontHandle) -> RenderResult<u32> {
        self.table.inc_reference(handle)
    }

    /// Reference count
    pub fn ref_count(&self, handle: FontHandle) -> RenderResult<u32> {
        self.table.ref_count(handle)
    }

    /// Look up a font by name
    pub fn find(&self, name: &str) -> Option<FontHandle> {
        self.table.find(name)
    }

    /// Make a loaded font current
    pub fn set_current(&mut self, handle: FontHandle) -> RenderResult<()> {
        if self.table.ref_count(handle)? == 0 {
            return Err(RenderError::not_found(
                self.table.name(handle)?.unwrap_or("font"),
                "font is unloaded",
            ));
        }
        self.current = Some(handle);
        Ok(())
    }

    /// [`Self::set_current`] by name
    pub fn set_current_by_name(&mut self, name: &str) -> RenderResult<()> {
        let handle = self
            .table
            .find(name)
            .ok_or_else(|| RenderError::not_found(name, "font not loaded"))?;
        self.set_current(handle)
    }

    /// Font used by plain printing
    pub const fn current(&self) -> Option<FontHandle> {
        self.current
    }

    /// Glyph metadata of a font
    pub fn atlas(&self, handle: FontHandle) -> RenderResult<&FontAtlas> {
        Ok(&self.table.get(handle)?.atlas)
    }

    /// Atlas texture of a font, if it is loaded
    pub fn texture(&self, handle: FontHandle) -> RenderResult<Option<TextureHandle>> {
        Ok(self.table.get(handle)?.gpu)
    }

    /// Rebuild every font from a new manifest
    ///
    /// Unloaded fonts get fresh metadata but stay unloaded.
    pub fn set_manifest(
        &mut self,
        device: &mut dyn GraphicsDevice,
        textures: &mut TexturePool,
        loader: &mut dyn FontLoader,
        manifest: FontManifest,
    ) -> RenderResult<()> {
        loader.set_manifest(manifest);
        let entries: Vec<(FontHandle, String)> = self
            .table
            .iter()
            .filter_map(|(handle, _)| {
                let name = self.table.name(handle).ok().flatten()?;
                Some((handle, name.to_string()))
            })
            .collect();

        for (handle, name) in entries {
            let atlas = match loader.load_font(&name) {
                Ok(atlas) => atlas,
                Err(e) => {
                    log::warn!("Keeping old font '{}': {}", name, e);
                    continue;
                }
            };
            let record = self.table.get_mut(handle)?;
            record.atlas = atlas;
            if let Some(old) = record.gpu.take() {
                textures.release(device, old)?;
                record.gpu = Some(upload_atlas(device, textures, &record.atlas)?);
            }
        }
        log::info!("Font manifest reloaded ({} fonts)", self.table.len());
        Ok(())
    }

    /// Free every atlas texture (shutdown)
    pub fn release_all(&mut self, device: &mut dyn GraphicsDevice, textures: &mut TexturePool) {
        for (_, record) in self.table.iter_mut() {
            if let Some(texture) = record.gpu.take() {
                if let Err(e) = textures.release(device, texture) {
                    log::warn!("Font atlas release failed: {}", e);
                }
            }
        }
        self.current = None;
    }

    fn first_active(&self) -> Option<FontHandle> {
        self.table
            .iter()
            .map(|(handle, _)| handle)
            .find(|handle| self.table.ref_count(*handle).is_ok_and(|count| count > 0))
    }
}

fn upload_atlas(
    device: &mut dyn GraphicsDevice,
    textures: &mut TexturePool,
    atlas: &FontAtlas,
) -> RenderResult<TextureHandle> {
    let (width, height) = atlas.dimensions();
    let texture = textures.create_procedural(
        device,
        width,
        height,
        1,
        TextureUsage::empty(),
        TextureFormat::A8R8G8B8,
        MemoryPool::Managed,
    )?;
    if let Err(e) = textures.write_level(device, texture, None, 0, &atlas.to_bgra()) {
        textures.release(device, texture)?;
        return Err(e);
    }
    Ok(texture)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// 8x8 atlas with 'A'..='Z', '?' and ' ' as 4x4 cells advancing 5px
    pub(crate) fn fixed_atlas() -> FontAtlas {
        let mut glyphs = HashMap::new();
        for ch in ('A'..='Z').chain(['?']) {
            glyphs.insert(
                ch,
                GlyphInfo {
                    uv_min: Vec2::new(0.0, 0.0),
                    uv_max: Vec2::new(0.5, 0.5),
                    size: Vec2::new(4.0, 4.0),
                    advance: 5.0,
                    bearing: Vec2::new(0.0, 0.0),
                },
            );
        }
        glyphs.insert(
            ' ',
            GlyphInfo {
                uv_min: Vec2::zeros(),
                uv_max: Vec2::zeros(),
                size: Vec2::zeros(),
                advance: 3.0,
                bearing: Vec2::zeros(),
            },
        );
        FontAtlas::from_parts(8, 8, vec![200; 64], glyphs, 6.0, 4.0).expect("Should build atlas")
    }

    /// Serves [`fixed_atlas`] for every name except `"missing"`
    #[derive(Default)]
    pub(crate) struct FixedFontLoader {
        pub(crate) loads: usize,
    }

    impl FontLoader for FixedFontLoader {
        fn load_font(&mut self, name: &str) -> RenderResult<FontAtlas> {
            if name == "missing" {
                return Err(RenderError::not_found(name, "font not in manifest"));
            }
            self.loads += 1;
            Ok(fixed_atlas())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{fixed_atlas, FixedFontLoader};
    use super::*;
    use crate::backend::HeadlessDevice;
    use approx::assert_relative_eq;

    fn setup() -> (HeadlessDevice, TexturePool, FixedFontLoader, FontTable) {
        (
            HeadlessDevice::new(),
            TexturePool::new(16, "resource/textures", 0),
            FixedFontLoader::default(),
            FontTable::new(4),
        )
    }

    #[test]
    fn test_font_vertex_matches_format() {
        assert_eq!(std::mem::size_of::<FontVertex>() as u32, FontVertex::FORMAT.stride());
    }

    #[test]
    fn test_layout_and_width() {
        let atlas = fixed_atlas();
        assert_relative_eq!(atlas.string_width("AB C", 1.0), 18.0);
        assert_relative_eq!(atlas.string_width("AB\nABCD", 2.0), 40.0);
        // Unknown characters fall back to '?'
        assert_relative_eq!(atlas.string_width("a", 1.0), 5.0);

        let vertices = atlas.layout("A B", 10.0, 20.0, 1.0, 0xFFFF_0000);
        assert_eq!(vertices.len(), 12);
        assert_relative_eq!(vertices[0].position[0], 10.0);
        assert_relative_eq!(vertices[0].position[1], 20.0);
        assert_relative_eq!(vertices[5].position[0], 14.0);
        assert_relative_eq!(vertices[5].position[1], 24.0);
        // Second glyph starts after 'A' (5) and the space (3)
        assert_relative_eq!(vertices[6].position[0], 18.0);
        assert_eq!(vertices[0].color, 0xFFFF_0000);
    }

    #[test]
    fn test_layout_newline() {
        let atlas = fixed_atlas();
        let vertices = atlas.layout("A\nA", 0.0, 0.0, 1.0, 0);
        assert_relative_eq!(vertices[6].position[0], 0.0);
        assert_relative_eq!(vertices[6].position[1], 6.0);
    }

    #[test]
    fn test_align() {
        assert_relative_eq!(TextAlign::Left.left_edge(100.0, 40.0), 100.0);
        assert_relative_eq!(TextAlign::Center.left_edge(100.0, 40.0), 80.0);
        assert_relative_eq!(TextAlign::Right.left_edge(100.0, 40.0), 60.0);
    }

    #[test]
    fn test_bad_atlas_parts() {
        assert!(FontAtlas::from_parts(4, 4, vec![0; 3], HashMap::new(), 1.0, 1.0).is_err());
    }

    #[test]
    fn test_temporary_unload_and_reactivate() {
        let (mut device, mut textures, mut loader, mut fonts) = setup();
        let control = device.controller();

        let h = fonts
            .load_font(&mut device, &mut textures, &mut loader, "normal")
            .expect("Should load");
        let again = fonts
            .load_font(&mut device, &mut textures, &mut loader, "NORMAL")
            .expect("Should share");
        assert_eq!(h, again);
        assert_eq!(fonts.ref_count(h).expect("Should be live"), 2);
        assert_eq!(loader.loads, 1);
        assert_eq!(control.texture_count(), 1);

        assert_eq!(fonts.unload_font(&mut device, &mut textures, h).expect("Should unload"), 1);
        assert_eq!(fonts.unload_font(&mut device, &mut textures, h).expect("Should unload"), 0);
        assert_eq!(control.texture_count(), 0);
        assert!(fonts.texture(h).expect("Metadata should remain").is_none());
        assert_relative_eq!(fonts.atlas(h).expect("Metadata should remain").line_height(), 6.0);
        assert!(matches!(
            fonts.unload_font(&mut device, &mut textures, h),
            Err(RenderError::OverRelease { .. })
        ));

        let back = fonts
            .load_font(&mut device, &mut textures, &mut loader, "normal")
            .expect("Should reactivate");
        assert_eq!(back, h);
        assert_eq!(fonts.ref_count(h).expect("Should be live"), 1);
        assert_eq!(loader.loads, 1);
        assert!(fonts.texture(h).expect("Should be live").is_some());
        assert_eq!(control.texture_count(), 1);
    }

    #[test]
    fn test_current_font_falls_back() {
        let (mut device, mut textures, mut loader, mut fonts) = setup();
        let normal = fonts
            .load_font(&mut device, &mut textures, &mut loader, "normal")
            .expect("Should load");
        let bold = fonts
            .load_font(&mut device, &mut textures, &mut loader, "bold")
            .expect("Should load");
        assert_eq!(fonts.current(), Some(normal));

        fonts.set_current_by_name("bold").expect("Should select");
        assert_eq!(fonts.current(), Some(bold));
        fonts.unload_font_by_name(&mut device, &mut textures, "bold").expect("Should unload");
        assert_eq!(fonts.current(), Some(normal));
        assert!(fonts.set_current(bold).is_err());

        fonts.unload_font(&mut device, &mut textures, normal).expect("Should unload");
        assert_eq!(fonts.current(), None);
    }

    #[test]
    fn test_missing_font() {
        let (mut device, mut textures, mut loader, mut fonts) = setup();
        assert!(fonts.load_font(&mut device, &mut textures, &mut loader, "missing").is_err());
        assert!(fonts.is_empty());
        assert_eq!(fonts.current(), None);
    }

    #[test]
    fn test_set_manifest_reloads_loaded_fonts_only() {
        let (mut device, mut textures, mut loader, mut fonts) = setup();
        let control = device.controller();
        let a = fonts.load_font(&mut device, &mut textures, &mut loader, "a").expect("Should load");
        let b = fonts.load_font(&mut device, &mut textures, &mut loader, "b").expect("Should load");
        fonts.unload_font(&mut device, &mut textures, b).expect("Should unload");

        fonts
            .set_manifest(&mut device, &mut textures, &mut loader, FontManifest::default())
            .expect("Should reload");
        assert_eq!(loader.loads, 4);
        assert!(fonts.texture(a).expect("Should be live").is_some());
        assert!(fonts.texture(b).expect("Should keep metadata").is_none());
        assert_eq!(control.texture_count(), 1);
    }

    #[test]
    fn test_manifest_loader_reports_missing_entries() {
        let manifest = FontManifest::default().with_font("normal", "nope.ttf", 12.0);
        let mut loader = ManifestFontLoader::new(manifest, "/nonexistent");
        assert!(matches!(loader.load_font("bold"), Err(RenderError::ResourceNotFound { .. })));
        assert!(matches!(loader.load_font("normal"), Err(RenderError::ResourceNotFound { .. })));
    }
}

//! Image decoding for textures that have no `.tx` file
//!
//! Decoded pixels are kept the way a classic bitmap decoder hands them out:
//! rows stored bottom-up, `pitch` bytes apart, RGB or RGBA per pixel.
//! [`DecodedImage::copy_to_buffer`] turns that into the top-down BGRA8
//! layout the texture pool uploads.

use std::path::Path;

use image::DynamicImage;

use crate::error::{RenderError, RenderResult};

/// Raw pixels of a decoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per stored row
    pub pitch: u32,
    /// Bits per pixel, 24 or 32
    pub bpp: u32,
    /// Bottom-up rows, RGB or RGBA
    pub data: Vec<u8>,
}

/// Decode an image file
///
/// The format is sniffed from the contents, so extensionless paths decode too.
pub fn load_image_from_file(path: impl AsRef<Path>) -> RenderResult<DecodedImage> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| RenderError::not_found(label.as_str(), e))?;
    let decoded = load_image_from_memory(&bytes, &label)?;
    log::debug!(
        "Decoded {}x{} {}-bit image from {}",
        decoded.width,
        decoded.height,
        decoded.bpp,
        label
    );
    Ok(decoded)
}

/// Decode an image held in memory, reporting failures against `label`
pub fn load_image_from_memory(bytes: &[u8], label: &str) -> RenderResult<DecodedImage> {
    let image = image::load_from_memory(bytes).map_err(|e| RenderError::not_found(label, e))?;
    Ok(DecodedImage::from_dynamic(&image))
}

impl DecodedImage {
    fn from_dynamic(image: &DynamicImage) -> Self {
        let flipped = image.flipv();
        if image.color().has_alpha() {
            let rgba = flipped.to_rgba8();
            let (width, height) = rgba.dimensions();
            Self {
                width,
                height,
                pitch: width * 4,
                bpp: 32,
                data: rgba.into_raw(),
            }
        } else {
            let rgb = flipped.to_rgb8();
            let (width, height) = rgb.dimensions();
            Self {
                width,
                height,
                pitch: width * 3,
                bpp: 24,
                data: rgb.into_raw(),
            }
        }
    }

    /// Bytes a BGRA8 copy needs
    pub const fn bgra_size(&self) -> usize {
        (self.width * self.height * 4) as usize
    }

    /// Write the pixels as top-down BGRA8 rows
    ///
    /// 24-bit sources get an alpha of 255.
    pub fn copy_to_buffer(&self, dest: &mut [u8]) -> RenderResult<()> {
        let needed = self.bgra_size();
        if dest.len() < needed {
            return Err(RenderError::allocation(
                "image copy",
                format!("destination holds {} bytes, {} needed", dest.len(), needed),
            ));
        }
        let source_bytes = (self.bpp / 8) as usize;
        if source_bytes != 3 && source_bytes != 4 {
            return Err(RenderError::not_found(
                "image copy",
                format!("unsupported {} bpp", self.bpp),
            ));
        }

        let row_out = (self.width * 4) as usize;
        for (y, out_row) in dest[..needed].chunks_exact_mut(row_out).enumerate() {
            let src_y = self.height as usize - 1 - y;
            let start = src_y * self.pitch as usize;
            let src_row = self
                .data
                .get(start..start + self.width as usize * source_bytes)
                .ok_or_else(|| {
                    RenderError::not_found("image copy", "pixel data shorter than pitch x height")
                })?;

            for (src, out) in src_row.chunks_exact(source_bytes).zip(out_row.chunks_exact_mut(4)) {
                out[0] = src[2];
                out[1] = src[1];
                out[2] = src[0];
                out[3] = if source_bytes == 4 { src[3] } else { 255 };
            }
        }
        Ok(())
    }

    /// Convenience wrapper around [`Self::copy_to_buffer`]
    pub fn to_bgra(&self) -> RenderResult<Vec<u8>> {
        let mut out = vec![0u8; self.bgra_size()];
        self.copy_to_buffer(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_flips_rows_and_swizzles() {
        // Bottom row first: red, green / top row: blue, white.
        let image = DecodedImage {
            width: 2,
            height: 2,
            pitch: 6,
            bpp: 24,
            data: vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
        };
        let bgra = image.to_bgra().expect("Should convert");
        assert_eq!(
            bgra,
            vec![
                255, 0, 0, 255, 255, 255, 255, 255, // top: blue, white
                0, 0, 255, 255, 0, 255, 0, 255, // bottom: red, green
            ]
        );
    }

    #[test]
    fn test_copy_keeps_alpha_and_honours_pitch() {
        let image = DecodedImage {
            width: 1,
            height: 2,
            pitch: 8,
            bpp: 32,
            data: vec![1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0],
        };
        assert_eq!(image.to_bgra().expect("Should convert"), vec![7, 6, 5, 8, 3, 2, 1, 4]);
    }

    #[test]
    fn test_short_destination_is_rejected() {
        let image = DecodedImage {
            width: 2,
            height: 1,
            pitch: 6,
            bpp: 24,
            data: vec![0; 6],
        };
        let mut dest = [0u8; 4];
        assert!(image.copy_to_buffer(&mut dest).is_err());
    }

    #[test]
    fn test_memory_png_round_trip() {
        let mut png = Vec::new();
        let source = image::RgbaImage::from_fn(2, 2, |x, y| {
            image::Rgba([x as u8 * 100, y as u8 * 100, 7, 200])
        });
        source
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("Should encode png");

        let decoded = load_image_from_memory(&png, "test.png").expect("Should decode png");
        assert_eq!((decoded.width, decoded.height, decoded.bpp), (2, 2, 32));
        let bgra = decoded.to_bgra().expect("Should convert");
        // Top-left pixel: r=0, g=0, b=7, a=200
        assert_eq!(&bgra[0..4], &[7, 0, 0, 200]);
        // Bottom-right pixel: r=100, g=100
        assert_eq!(&bgra[12..16], &[7, 100, 100, 200]);
    }

    #[test]
    fn test_file_without_extension_is_sniffed() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(3, 1, image::Rgb([10, 20, 30]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("Should encode png");
        let path = std::env::temp_dir().join(format!("render_core_sniff_{}", std::process::id()));
        std::fs::write(&path, &png).expect("Should write image");

        let decoded = load_image_from_file(&path);
        let _ = std::fs::remove_file(&path);
        let decoded = decoded.expect("Should decode by content");
        assert_eq!((decoded.width, decoded.height, decoded.bpp), (3, 1, 24));
    }

    #[test]
    fn test_garbage_bytes_report_label() {
        match load_image_from_memory(&[1, 2, 3, 4], "garbage.bin") {
            Err(RenderError::ResourceNotFound { path, .. }) => assert_eq!(path, "garbage.bin"),
            other => panic!("Should fail to decode, got {:?}", other.map(|d| d.width)),
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            load_image_from_file("definitely/not/here.png"),
            Err(RenderError::ResourceNotFound { .. })
        ));
    }
}

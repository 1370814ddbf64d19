//! Back-buffer screenshots
//!
//! Files are named after the local capture time, `YYYY-MM-DD_HH-MM-SS.ext`,
//! with `_1`, `_2`, ... appended when several land in the same second.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use image::{ExtendedColorType, ImageFormat};

use crate::backend::Capture;
use crate::config::ScreenshotFormat;
use crate::error::{RenderError, RenderResult};

const STEM_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// First free screenshot path in `dir` for a capture taken at `time`
pub fn screenshot_path(dir: &Path, time: &NaiveDateTime, format: ScreenshotFormat) -> PathBuf {
    let stem = time.format(STEM_FORMAT).to_string();
    let ext = format.extension();
    let mut path = dir.join(format!("{}.{}", stem, ext));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}.{}", stem, n, ext));
        n += 1;
    }
    path
}

/// Encode a capture to `path`
///
/// BGRA rows become RGBA, or RGB for containers without alpha.
pub fn save_capture(capture: &Capture, path: &Path, format: ScreenshotFormat) -> RenderResult<()> {
    let pixels = (capture.width * capture.height) as usize;
    if capture.bgra.len() < pixels * 4 {
        return Err(RenderError::allocation(
            "screenshot",
            format!("capture holds {} bytes, expected {}", capture.bgra.len(), pixels * 4),
        ));
    }
    let bgra = &capture.bgra[..pixels * 4];

    let (image_format, keep_alpha) = match format {
        ScreenshotFormat::Png => (ImageFormat::Png, true),
        ScreenshotFormat::Tga => (ImageFormat::Tga, true),
        ScreenshotFormat::Bmp => (ImageFormat::Bmp, false),
        ScreenshotFormat::Jpg => (ImageFormat::Jpeg, false),
    };

    let (data, color) = if keep_alpha {
        let rgba: Vec<u8> = bgra.chunks_exact(4).flat_map(|p| [p[2], p[1], p[0], p[3]]).collect();
        (rgba, ExtendedColorType::Rgba8)
    } else {
        let rgb: Vec<u8> = bgra.chunks_exact(4).flat_map(|p| [p[2], p[1], p[0]]).collect();
        (rgb, ExtendedColorType::Rgb8)
    };

    image::save_buffer_with_format(path, &data, capture.width, capture.height, color, image_format)
        .map_err(|e| RenderError::allocation(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("render_core_shot_{}_{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        dir
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, sec: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, sec))
            .expect("Should be a valid date")
    }

    #[test]
    fn test_file_stem_is_zero_padded() {
        let dir = temp_dir("stem");
        let path = screenshot_path(&dir, &at(2000, 2, 9, 2, 4, 6), ScreenshotFormat::Jpg);
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("2000-02-09_02-04-06.jpg"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_collision_suffix() {
        let dir = temp_dir("names");
        let time = at(2023, 11, 14, 22, 13, 20);
        let first = screenshot_path(&dir, &time, ScreenshotFormat::Png);
        assert_eq!(first.file_name().and_then(|n| n.to_str()), Some("2023-11-14_22-13-20.png"));

        std::fs::write(&first, b"taken").expect("Should write placeholder");
        let second = screenshot_path(&dir, &time, ScreenshotFormat::Png);
        assert_eq!(second.file_name().and_then(|n| n.to_str()), Some("2023-11-14_22-13-20_1.png"));
        std::fs::write(&second, b"taken").expect("Should write placeholder");
        let third = screenshot_path(&dir, &time, ScreenshotFormat::Png);
        assert_eq!(third.file_name().and_then(|n| n.to_str()), Some("2023-11-14_22-13-20_2.png"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_swaps_channels() {
        let dir = temp_dir("png");
        let capture = Capture {
            width: 2,
            height: 1,
            bgra: vec![0x10, 0x20, 0x30, 0xFF, 0x40, 0x50, 0x60, 0x80],
        };
        let path = dir.join("shot.png");
        save_capture(&capture, &path, ScreenshotFormat::Png).expect("Should save png");

        let decoded = image::open(&path).expect("Should decode png").to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0, [0x30, 0x20, 0x10, 0xFF]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0x60, 0x50, 0x40, 0x80]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_without_alpha() {
        let dir = temp_dir("bmp");
        let capture = Capture {
            width: 4,
            height: 4,
            bgra: [0x00, 0x00, 0xFF, 0xFF].repeat(16),
        };
        for format in [ScreenshotFormat::Bmp, ScreenshotFormat::Jpg, ScreenshotFormat::Tga] {
            let path = dir.join(format!("shot.{}", format.extension()));
            save_capture(&capture, &path, format).expect("Should save");
            assert!(path.exists());
        }
        let short = Capture {
            width: 4,
            height: 4,
            bgra: vec![0; 8],
        };
        assert!(save_capture(&short, &dir.join("short.png"), ScreenshotFormat::Png).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

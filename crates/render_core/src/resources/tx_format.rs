//! `.tx` texture container
//!
//! A 24-byte little-endian header followed by raw mip data:
//!
//! ```text
//! u32 format | u32 flags | i32 width | i32 height | i32 mip_count | i32 mip_size
//! level 0 (mip_size bytes) | level 1 (mip_size / 4) | ...
//! ```
//!
//! Cube maps repeat the whole chain once per face, in [`CubeFace::FILE_ORDER`].
//! Palettized files are not supported.

use std::io::{Read, Seek, SeekFrom};

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::backend::{CubeFace, TextureFormat};

/// Four-character code packed little-endian
const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// Pixel format ids stored in the header
pub mod format_id {
    use super::fourcc;

    /// BC1
    pub const DXT1: u32 = fourcc(b"DXT1");
    /// BC2
    pub const DXT3: u32 = fourcc(b"DXT3");
    /// BC3
    pub const DXT5: u32 = fourcc(b"DXT5");
    /// 32-bit with alpha
    pub const A8R8G8B8: u32 = 21;
    /// 32-bit without alpha
    pub const X8R8G8B8: u32 = 22;
    /// 16-bit 565
    pub const R5G6B5: u32 = 23;
    /// 16-bit 1555
    pub const A1R5G5B5: u32 = 25;
}

bitflags! {
    /// Header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxFlags: u32 {
        /// Palettized data (unsupported)
        const PALETTE = 0x1;
        /// Six faces follow
        const CUBEMAP = 0x2;
    }
}

/// Errors decoding a `.tx` file
#[derive(thiserror::Error, Debug)]
pub enum TxError {
    /// Underlying read failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes than the header or a level needs
    #[error("Truncated data: needed {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes available
        got: usize,
    },

    /// Unknown pixel format id
    #[error("Unknown texture format {0:#x}")]
    UnknownFormat(u32),

    /// Palettized textures are rejected
    #[error("Palettized textures are not supported")]
    Paletted,

    /// Cube map faces must be square
    #[error("Cube map is not square ({width}x{height})")]
    NonSquareCube {
        /// Width
        width: u32,
        /// Height
        height: u32,
    },

    /// Non-positive dimensions or level counts
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// Header as stored, every field little-endian
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawHeader {
    format: u32,
    flags: u32,
    width: i32,
    height: i32,
    mip_count: i32,
    mip_size: i32,
}

impl RawHeader {
    /// Swap between stored and host byte order
    fn swap_le(self) -> Self {
        Self {
            format: self.format.to_le(),
            flags: self.flags.to_le(),
            width: self.width.to_le(),
            height: self.height.to_le(),
            mip_count: self.mip_count.to_le(),
            mip_size: self.mip_size.to_le(),
        }
    }
}

/// Parsed `.tx` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHeader {
    /// Pixel format
    pub format: TextureFormat,
    /// Flags
    pub flags: TxFlags,
    /// Width of level 0
    pub width: u32,
    /// Height of level 0
    pub height: u32,
    /// Number of levels stored per face
    pub mip_count: u32,
    /// Byte size of level 0
    pub mip_size: u32,
}

/// Dimensions and size of one stored level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Size in bytes
    pub size: u32,
}

impl TxHeader {
    /// Encoded header size
    pub const SIZE: usize = 24;

    /// Smallest side a degraded texture may shrink to
    pub const DEGRADE_MIN_SIDE: u32 = 32;

    /// Header id of a texture format
    pub const fn format_id(format: TextureFormat) -> Option<u32> {
        match format {
            TextureFormat::Dxt1 => Some(format_id::DXT1),
            TextureFormat::Dxt3 => Some(format_id::DXT3),
            TextureFormat::Dxt5 => Some(format_id::DXT5),
            TextureFormat::A8R8G8B8 => Some(format_id::A8R8G8B8),
            TextureFormat::X8R8G8B8 => Some(format_id::X8R8G8B8),
            TextureFormat::R5G6B5 => Some(format_id::R5G6B5),
            TextureFormat::A1R5G5B5 => Some(format_id::A1R5G5B5),
            TextureFormat::D16 | TextureFormat::D24S8 => None,
        }
    }

    fn format_from_id(id: u32) -> Result<TextureFormat, TxError> {
        Ok(match id {
            format_id::DXT1 => TextureFormat::Dxt1,
            format_id::DXT3 => TextureFormat::Dxt3,
            format_id::DXT5 => TextureFormat::Dxt5,
            format_id::A8R8G8B8 => TextureFormat::A8R8G8B8,
            format_id::X8R8G8B8 => TextureFormat::X8R8G8B8,
            format_id::R5G6B5 => TextureFormat::R5G6B5,
            format_id::A1R5G5B5 => TextureFormat::A1R5G5B5,
            other => return Err(TxError::UnknownFormat(other)),
        })
    }

    /// Serialize the header
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let raw = RawHeader {
            format: Self::format_id(self.format).unwrap_or(0),
            flags: self.flags.bits(),
            width: self.width as i32,
            height: self.height as i32,
            mip_count: self.mip_count as i32,
            mip_size: self.mip_size as i32,
        }
        .swap_le();
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(bytemuck::bytes_of(&raw));
        out
    }

    /// Parse and validate a header
    pub fn decode(bytes: &[u8]) -> Result<Self, TxError> {
        if bytes.len() < Self::SIZE {
            return Err(TxError::Truncated {
                needed: Self::SIZE,
                got: bytes.len(),
            });
        }
        let raw = bytemuck::pod_read_unaligned::<RawHeader>(&bytes[..Self::SIZE]).swap_le();

        let flags = TxFlags::from_bits_retain(raw.flags);
        if flags.contains(TxFlags::PALETTE) {
            return Err(TxError::Paletted);
        }
        let format = Self::format_from_id(raw.format)?;

        let (width, height) = (raw.width, raw.height);
        let (mip_count, mip_size) = (raw.mip_count, raw.mip_size);
        if width <= 0 || height <= 0 || mip_count <= 0 || mip_size <= 0 {
            return Err(TxError::InvalidHeader(format!(
                "{}x{}, {} mips of {} bytes",
                width, height, mip_count, mip_size
            )));
        }

        let header = Self {
            format,
            flags,
            width: width as u32,
            height: height as u32,
            mip_count: mip_count as u32,
            mip_size: mip_size as u32,
        };
        let max_levels = Self::max_mip_count(header.width, header.height);
        if header.mip_count > max_levels {
            return Err(TxError::InvalidHeader(format!(
                "{} mips for {}x{}, at most {}",
                header.mip_count, header.width, header.height, max_levels
            )));
        }
        if header.is_cube_map() && header.width != header.height {
            return Err(TxError::NonSquareCube {
                width: header.width,
                height: header.height,
            });
        }
        Ok(header)
    }

    /// Longest chain a `width`x`height` level 0 can have
    pub const fn max_mip_count(width: u32, height: u32) -> u32 {
        let side = if width > height { width } else { height };
        u32::BITS - side.leading_zeros()
    }

    /// Whether six faces are stored
    pub const fn is_cube_map(&self) -> bool {
        self.flags.contains(TxFlags::CUBEMAP)
    }

    /// Stored levels, largest first
    pub fn mip_levels(&self) -> impl Iterator<Item = MipLevel> {
        let mut level = MipLevel {
            width: self.width,
            height: self.height,
            size: self.mip_size,
        };
        (0..self.mip_count).map(move |_| {
            let current = level;
            level = MipLevel {
                width: (level.width / 2).max(1),
                height: (level.height / 2).max(1),
                size: (level.size / 4).max(1),
            };
            current
        })
    }

    /// Bytes of one face's full chain
    pub fn chain_size(&self) -> u64 {
        self.mip_levels().map(|m| u64::from(m.size)).sum()
    }

    /// Drop up to `levels` top mips
    ///
    /// Stops early at a single remaining level or when either side would
    /// reach [`Self::DEGRADE_MIN_SIDE`]. Returns the header describing the
    /// remaining chain and the number of bytes to skip at the start of each
    /// face.
    pub fn degraded(&self, levels: u32) -> (Self, u64) {
        let mut header = *self;
        let mut skip = 0u64;
        for _ in 0..levels {
            if header.mip_count <= 1
                || header.width <= Self::DEGRADE_MIN_SIDE
                || header.height <= Self::DEGRADE_MIN_SIDE
            {
                break;
            }
            skip += u64::from(header.mip_size);
            header.mip_count -= 1;
            header.width /= 2;
            header.height /= 2;
            header.mip_size /= 4;
        }
        (header, skip)
    }
}

/// One face's levels, largest first
pub type MipChain = Vec<Vec<u8>>;

/// A decoded `.tx` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxImage {
    /// Header after degradation
    pub header: TxHeader,
    /// One chain for flat textures, six (in file order) for cube maps
    pub faces: Vec<(Option<CubeFace>, MipChain)>,
}

impl TxImage {
    /// Read a `.tx` stream, skipping `degradation` top mips per face
    pub fn read<R: Read + Seek>(reader: &mut R, degradation: u32) -> Result<Self, TxError> {
        let mut raw = [0u8; TxHeader::SIZE];
        read_exact(reader, &mut raw)?;
        let stored = TxHeader::decode(&raw)?;
        let (header, skip) = stored.degraded(degradation);
        if skip > 0 {
            log::debug!(
                "Degrading {}x{} texture to {}x{}",
                stored.width, stored.height, header.width, header.height
            );
        }

        let face_order: Vec<Option<CubeFace>> = if header.is_cube_map() {
            CubeFace::FILE_ORDER.iter().copied().map(Some).collect()
        } else {
            vec![None]
        };

        let start = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(start))?;
        let needed = (skip + header.chain_size()) * face_order.len() as u64;
        let available = end.saturating_sub(start);
        if needed > available {
            return Err(TxError::Truncated {
                needed: usize::try_from(needed).unwrap_or(usize::MAX),
                got: usize::try_from(available).unwrap_or(usize::MAX),
            });
        }
        let skip = i64::try_from(skip)
            .map_err(|_| TxError::InvalidHeader(format!("skip of {} bytes", skip)))?;

        let mut faces = Vec::with_capacity(face_order.len());
        for face in face_order {
            reader.seek(SeekFrom::Current(skip))?;
            let mut chain = Vec::with_capacity(header.mip_count as usize);
            for level in header.mip_levels() {
                let mut data = vec![0u8; level.size as usize];
                read_exact(reader, &mut data)?;
                chain.push(data);
            }
            faces.push((face, chain));
        }
        Ok(Self { header, faces })
    }

    /// Serialize a header and its face chains
    pub fn write(header: &TxHeader, faces: &[MipChain]) -> Vec<u8> {
        let mut out = header.encode().to_vec();
        for chain in faces {
            for level in chain {
                out.extend_from_slice(level);
            }
        }
        out
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), TxError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => TxError::Truncated {
            needed: buf.len(),
            got: 0,
        },
        _ => TxError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(width: u32, height: u32, mips: u32, flags: TxFlags) -> TxHeader {
        TxHeader {
            format: TextureFormat::A8R8G8B8,
            flags,
            width,
            height,
            mip_count: mips,
            mip_size: width * height * 4,
        }
    }

    fn chain(h: &TxHeader, fill: u8) -> MipChain {
        h.mip_levels().map(|m| vec![fill; m.size as usize]).collect()
    }

    #[test]
    fn test_header_round_trip_halves_levels() {
        let h = header(256, 128, 5, TxFlags::empty());
        let decoded = TxHeader::decode(&h.encode()).expect("Should decode");
        assert_eq!(decoded, h);

        let levels: Vec<_> = decoded.mip_levels().collect();
        assert_eq!(levels.len(), 5);
        for (i, level) in levels.iter().enumerate() {
            assert_eq!(level.width, 256 >> i);
            assert_eq!(level.height, 128 >> i);
            assert_eq!(level.size, (256 * 128 * 4) >> (2 * i));
        }
    }

    #[test]
    fn test_dxt_fourcc_values() {
        assert_eq!(format_id::DXT1, 0x3154_5844);
        assert_eq!(format_id::DXT5, 0x3554_5844);
    }

    #[test]
    fn test_rejects_palette_and_unknown_format() {
        let mut bytes = header(4, 4, 1, TxFlags::PALETTE).encode();
        assert!(matches!(TxHeader::decode(&bytes), Err(TxError::Paletted)));
        bytes = header(4, 4, 1, TxFlags::empty()).encode();
        bytes[0..4].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(TxHeader::decode(&bytes), Err(TxError::UnknownFormat(99))));
        assert!(matches!(TxHeader::decode(&bytes[..10]), Err(TxError::Truncated { .. })));
    }

    #[test]
    fn test_rejects_non_square_cube() {
        let bytes = header(64, 32, 1, TxFlags::CUBEMAP).encode();
        assert!(matches!(TxHeader::decode(&bytes), Err(TxError::NonSquareCube { .. })));
    }

    #[test]
    fn test_degradation_stops_at_minimum_side() {
        let h = header(256, 256, 6, TxFlags::empty());
        let (degraded, skip) = h.degraded(10);
        assert_eq!(degraded.width, 32);
        assert_eq!(degraded.mip_count, 3);
        assert_eq!(skip, 256u64 * 256 * 4 + 128 * 128 * 4 + 64 * 64 * 4);

        let (single, skip) = header(512, 512, 1, TxFlags::empty()).degraded(2);
        assert_eq!(single.width, 512);
        assert_eq!(skip, 0);
    }

    #[test]
    fn test_read_degraded_flat() {
        let h = header(128, 64, 3, TxFlags::empty());
        let mut levels = chain(&h, 0);
        levels[1].fill(1);
        levels[2].fill(2);
        let bytes = TxImage::write(&h, &[levels]);

        let image = TxImage::read(&mut Cursor::new(bytes), 1).expect("Should read");
        assert_eq!(image.header.width, 64);
        assert_eq!(image.header.mip_count, 2);
        assert_eq!(image.faces.len(), 1);
        assert!(image.faces[0].1[0].iter().all(|b| *b == 1));
        assert!(image.faces[0].1[1].iter().all(|b| *b == 2));
    }

    #[test]
    fn test_read_cube_face_order() {
        let h = header(64, 64, 2, TxFlags::CUBEMAP);
        let faces: Vec<_> = (0..6).map(|i| chain(&h, i as u8)).collect();
        let bytes = TxImage::write(&h, &faces);

        let image = TxImage::read(&mut Cursor::new(bytes), 1).expect("Should read cube");
        assert_eq!(image.faces.len(), 6);
        for (i, (face, levels)) in image.faces.iter().enumerate() {
            assert_eq!(*face, Some(CubeFace::FILE_ORDER[i]));
            assert_eq!(levels.len(), 1);
            assert_eq!(levels[0].len(), 32 * 32 * 4);
            assert!(levels[0].iter().all(|b| *b == i as u8));
        }
    }

    #[test]
    fn test_rejects_impossible_mip_count() {
        assert_eq!(TxHeader::max_mip_count(256, 64), 9);
        assert_eq!(TxHeader::max_mip_count(1, 1), 1);

        let mut bytes = header(16, 16, 1, TxFlags::empty()).encode().to_vec();
        bytes[16..20].copy_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            TxImage::read(&mut Cursor::new(bytes), 0),
            Err(TxError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_oversized_level_is_truncated_not_allocated() {
        let mut bytes = header(16, 16, 1, TxFlags::empty()).encode().to_vec();
        bytes[20..24].copy_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            TxImage::read(&mut Cursor::new(bytes), 0),
            Err(TxError::Truncated { got: 64, .. })
        ));
    }

    #[test]
    fn test_truncated_body() {
        let h = header(16, 16, 1, TxFlags::empty());
        let mut bytes = TxImage::write(&h, &[chain(&h, 0)]);
        bytes.truncate(TxHeader::SIZE + 10);
        assert!(matches!(
            TxImage::read(&mut Cursor::new(bytes), 0),
            Err(TxError::Truncated { .. })
        ));
    }
}

//! Texture pool
//!
//! A [`SlotTable`] of textures. Textures created from a path are shared by
//! name (case-insensitive); procedural, cube and volume textures always get
//! a fresh slot.
//!
//! Path creation resolves a name the way the game's resource layout
//! expects: up to four search sub-directories are tried (highest index
//! first) by inserting them in front of the file name, then the name
//! itself. Each candidate becomes `<root>/<name>.tx`; when no `.tx` file
//! exists the name is decoded as a regular image instead.
//!
//! On device loss, textures in [`MemoryPool::Default`] lose their native
//! object but keep their slot. [`TexturePool::ensure_resident`] brings them
//! back on first use, from the stored path or the stored description.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::image_loader::load_image_from_file;
use super::slot_table::{Acquired, Handle, ReleasePolicy, Released, SlotTable};
use super::tx_format::{TxError, TxImage};
use crate::backend::{
    CubeFace, GraphicsDevice, MemoryPool, NativeTexture, TextureDesc, TextureDimension,
    TextureFormat, TextureUsage,
};
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};

/// Number of configurable texture search sub-paths
pub const MAX_SEARCH_PATHS: usize = 4;

/// Where a texture's contents come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    /// Loaded from a file; reloaded from the same path after device loss
    File(PathBuf),
    /// Created empty by the caller
    Procedural,
}

/// One texture slot's record
#[derive(Debug)]
pub struct TextureRecord {
    native: Option<NativeTexture>,
    desc: TextureDesc,
    size_bytes: u64,
    source: TextureSource,
}

/// Handle to a pooled texture
pub type TextureHandle = Handle<TextureRecord>;

/// Snapshot of a texture slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    /// Name the texture was created under, if any
    pub name: Option<String>,
    /// Reference count
    pub ref_count: u32,
    /// Bytes of every level, face and slice
    pub size_bytes: u64,
    /// Whether the texture is a cube map
    pub is_cube_map: bool,
    /// Whether a native object currently backs the slot
    pub is_loaded: bool,
    /// Native description
    pub desc: TextureDesc,
    /// Content source
    pub source: TextureSource,
}

/// Reference-counted texture table
pub struct TexturePool {
    table: SlotTable<TextureRecord>,
    root: String,
    search_paths: [Option<String>; MAX_SEARCH_PATHS],
    degradation: u32,
    load_enabled: bool,
    total_bytes: u64,
}

impl TexturePool {
    /// Create an empty pool
    pub fn new(capacity: usize, root: impl Into<String>, degradation: u32) -> Self {
        Self {
            table: SlotTable::new("texture", capacity, ReleasePolicy::Free),
            root: normalize_path(&root.into()),
            search_paths: Default::default(),
            degradation,
            load_enabled: true,
            total_bytes: 0,
        }
    }

    /// Create an empty pool from the render configuration
    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.max_textures, config.texture_root.clone(), config.texture_degradation)
    }

    /// Set or clear one of the search sub-paths
    pub fn set_search_path(&mut self, index: usize, path: Option<&str>) -> bool {
        let Some(slot) = self.search_paths.get_mut(index) else {
            log::warn!("Texture search path index {} out of range", index);
            return false;
        };
        *slot = path
            .map(|p| p.trim_matches(|c| c == '/' || c == '\\').replace('\\', "/"))
            .filter(|p| !p.is_empty());
        true
    }

    /// Globally allow or forbid loading textures from files
    pub fn set_load_enabled(&mut self, enabled: bool) {
        self.load_enabled = enabled;
    }

    /// Whether file loading is allowed
    pub const fn load_enabled(&self) -> bool {
        self.load_enabled
    }

    /// Number of top mips skipped on load
    pub fn set_degradation(&mut self, levels: u32) {
        self.degradation = levels;
    }

    /// Bytes of every texture in the pool
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of live textures
    pub const fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the pool is empty
    pub const fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Candidate names tried for `name`, in order
    pub fn candidates(&self, name: &str) -> Vec<String> {
        let name = normalize_path(name);
        let (dir, file) = match name.rfind('/') {
            Some(pos) => name.split_at(pos + 1),
            None => ("", name.as_str()),
        };
        let mut out: Vec<String> = self
            .search_paths
            .iter()
            .rev()
            .flatten()
            .map(|sub| format!("{}{}/{}", dir, sub, file))
            .collect();
        out.push(name.clone());
        out
    }

    /// `.tx` file path of a candidate name
    pub fn resolve_path(&self, name: &str) -> PathBuf {
        let name = normalize_path(name);
        let lower = name.to_ascii_lowercase();
        let rooted = lower.starts_with(&self.root.to_ascii_lowercase());
        let mut path = if self.root.is_empty() || rooted {
            name
        } else {
            format!("{}/{}", self.root, name)
        };
        if !lower.ends_with(".tx") {
            path.push_str(".tx");
        }
        PathBuf::from(normalize_path(&path))
    }

    /// Create (or share) a texture by name
    pub fn create_from_path(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
    ) -> RenderResult<TextureHandle> {
        if !self.load_enabled {
            return Err(RenderError::not_found(name, "texture loading disabled"));
        }

        let candidates = self.candidates(name);
        let last = candidates.len() - 1;
        let mut last_error = None;
        for (i, candidate) in candidates.iter().enumerate() {
            let path = self.resolve_path(candidate);
            let degradation = self.degradation;
            let result = self.table.acquire_named(
                candidate,
                || load_texture(&mut *device, &path, degradation),
                |_| Ok(()),
            );
            match result {
                Ok((handle, acquired)) => {
                    if acquired == Acquired::Created {
                        let size = self.table.get(handle).map_or(0, |r| r.size_bytes);
                        self.total_bytes += size;
                        log::debug!("Loaded texture '{}' ({} bytes)", candidate, size);
                    }
                    return Ok(handle);
                }
                Err(e @ RenderError::TableExhausted { .. }) => return Err(e),
                Err(e) => {
                    if i == last {
                        log::warn!("Can't load texture '{}': {}", candidate, e);
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| RenderError::not_found(name, "no candidates")))
    }

    /// Create an empty 2D texture
    pub fn create_procedural(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        levels: u32,
        usage: TextureUsage,
        format: TextureFormat,
        pool: MemoryPool,
    ) -> RenderResult<TextureHandle> {
        let desc = TextureDesc {
            width,
            height,
            mip_levels: levels.max(1),
            format,
            dimension: TextureDimension::Flat,
            usage,
            pool,
        };
        self.insert_desc(device, desc)
    }

    /// Create an empty cube map
    pub fn create_cube(
        &mut self,
        device: &mut dyn GraphicsDevice,
        edge: u32,
        levels: u32,
        usage: TextureUsage,
        format: TextureFormat,
        pool: MemoryPool,
    ) -> RenderResult<TextureHandle> {
        let desc = TextureDesc {
            width: edge,
            height: edge,
            mip_levels: levels.max(1),
            format,
            dimension: TextureDimension::Cube,
            usage,
            pool,
        };
        self.insert_desc(device, desc)
    }

    /// Create an empty volume texture
    pub fn create_volume(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        depth: u32,
        levels: u32,
        usage: TextureUsage,
        format: TextureFormat,
        pool: MemoryPool,
    ) -> RenderResult<TextureHandle> {
        let desc = TextureDesc {
            width,
            height,
            mip_levels: levels.max(1),
            format,
            dimension: TextureDimension::Volume { depth },
            usage,
            pool,
        };
        self.insert_desc(device, desc)
    }

    fn insert_desc(
        &mut self,
        device: &mut dyn GraphicsDevice,
        desc: TextureDesc,
    ) -> RenderResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::allocation("texture", "zero-sized texture"));
        }
        let handle = self.table.insert_with(|| {
            let native = device
                .create_texture(&desc)
                .map_err(|e| {
                    RenderError::allocation(format!("{}x{} texture", desc.width, desc.height), e)
                })?;
            Ok(TextureRecord {
                native: Some(native),
                desc,
                size_bytes: desc.byte_size(),
                source: TextureSource::Procedural,
            })
        })?;
        self.total_bytes += desc.byte_size();
        Ok(handle)
    }

    /// Drop one reference, destroying the native texture at zero
    ///
    /// Returns the remaining count.
    pub fn release(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: TextureHandle,
    ) -> RenderResult<u32> {
        match self.table.release(handle)? {
            Released::Retained { remaining } => Ok(remaining),
            Released::Freed(record) => {
                if let Some(native) = record.native {
                    device.destroy_texture(native);
                }
                self.total_bytes = self.total_bytes.saturating_sub(record.size_bytes);
                Ok(0)
            }
            Released::Dormant => Ok(0),
        }
    }

    /// Add a reference, returning the new count
    pub fn inc_reference(&mut self, handle: TextureHandle) -> RenderResult<u32> {
        self.table.inc_reference(handle)
    }

    /// Native texture currently backing a slot, if any
    pub fn native(&self, handle: TextureHandle) -> RenderResult<Option<NativeTexture>> {
        Ok(self.table.get(handle)?.native)
    }

    /// Snapshot of a slot
    pub fn info(&self, handle: TextureHandle) -> RenderResult<TextureInfo> {
        let record = self.table.get(handle)?;
        Ok(TextureInfo {
            name: self.table.name(handle)?.map(str::to_string),
            ref_count: self.table.ref_count(handle)?,
            size_bytes: record.size_bytes,
            is_cube_map: record.desc.dimension == TextureDimension::Cube,
            is_loaded: record.native.is_some(),
            desc: record.desc,
            source: record.source.clone(),
        })
    }

    /// Upload one level of a texture
    pub fn write_level(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: TextureHandle,
        face: Option<CubeFace>,
        level: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        let native = self.ensure_resident(device, handle)?;
        device.write_texture(native, face, level, data)?;
        Ok(())
    }

    /// Native texture for a slot, recreating it if a device loss dropped it
    pub fn ensure_resident(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: TextureHandle,
    ) -> RenderResult<NativeTexture> {
        let degradation = self.degradation;
        let record = self.table.get_mut(handle)?;
        if let Some(native) = record.native {
            return Ok(native);
        }

        let reloaded = match &record.source {
            TextureSource::File(path) => load_texture(device, path, degradation)?,
            TextureSource::Procedural => {
                let native = device
                    .create_texture(&record.desc)
                    .map_err(|e| RenderError::allocation("texture restore", e))?;
                TextureRecord {
                    native: Some(native),
                    desc: record.desc,
                    size_bytes: record.size_bytes,
                    source: TextureSource::Procedural,
                }
            }
        };
        log::debug!("Texture slot {} restored", handle.index());
        let native = reloaded.native.ok_or(RenderError::DeviceLost)?;
        record.native = Some(native);
        record.desc = reloaded.desc;
        Ok(native)
    }

    /// Drop the native objects of every video-memory texture
    ///
    /// Slots, names and counts stay; returns how many objects were dropped.
    pub fn release_device_objects(&mut self, device: &mut dyn GraphicsDevice) -> usize {
        let mut dropped = 0;
        for (_, record) in self.table.iter_mut() {
            if record.desc.pool.is_device_dependent() {
                if let Some(native) = record.native.take() {
                    device.destroy_texture(native);
                    dropped += 1;
                }
            }
        }
        dropped
    }

    /// Destroy every native texture (shutdown)
    pub fn destroy_all(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, record) in self.table.iter_mut() {
            if let Some(native) = record.native.take() {
                device.destroy_texture(native);
            }
        }
    }
}

/// Load a `.tx` file, falling back to a plain image next to it
fn load_texture(
    device: &mut dyn GraphicsDevice,
    tx_path: &Path,
    degradation: u32,
) -> RenderResult<TextureRecord> {
    match File::open(tx_path) {
        Ok(file) => {
            let image = TxImage::read(&mut BufReader::new(file), degradation)
                .map_err(|e| tx_error(tx_path, e))?;
            upload_tx(device, tx_path, &image)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let image_path = tx_path.with_extension("");
            let decoded = load_image_from_file(&image_path)?;
            let bgra = decoded.to_bgra()?;
            let desc = TextureDesc::flat(decoded.width, decoded.height, TextureFormat::A8R8G8B8);
            let native = device
                .create_texture(&desc)
                .map_err(|e| RenderError::allocation(image_path.display().to_string(), e))?;
            if let Err(e) = device.write_texture(native, None, 0, &bgra) {
                device.destroy_texture(native);
                return Err(e.into());
            }
            Ok(TextureRecord {
                native: Some(native),
                desc,
                size_bytes: desc.byte_size(),
                source: TextureSource::File(tx_path.to_path_buf()),
            })
        }
        Err(e) => Err(RenderError::not_found(tx_path.display().to_string(), e)),
    }
}

fn upload_tx(
    device: &mut dyn GraphicsDevice,
    path: &Path,
    image: &TxImage,
) -> RenderResult<TextureRecord> {
    let header = &image.header;
    let desc = TextureDesc {
        width: header.width,
        height: header.height,
        mip_levels: header.mip_count,
        format: header.format,
        dimension: if header.is_cube_map() {
            TextureDimension::Cube
        } else {
            TextureDimension::Flat
        },
        usage: TextureUsage::empty(),
        pool: MemoryPool::Managed,
    };
    let native = device
        .create_texture(&desc)
        .map_err(|e| RenderError::allocation(path.display().to_string(), e))?;

    for (face, chain) in &image.faces {
        for (level, data) in chain.iter().enumerate() {
            if let Err(e) = device.write_texture(native, *face, level as u32, data) {
                device.destroy_texture(native);
                return Err(e.into());
            }
        }
    }

    let size_bytes = image.faces.len() as u64 * header.chain_size();
    Ok(TextureRecord {
        native: Some(native),
        desc,
        size_bytes,
        source: TextureSource::File(path.to_path_buf()),
    })
}

fn tx_error(path: &Path, error: TxError) -> RenderError {
    RenderError::not_found(path.display().to_string(), error)
}

/// Forward slashes, no doubled separators
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

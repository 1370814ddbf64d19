//! Vertex and index buffer pools
//!
//! Buffers are never shared by name, so every create takes a fresh slot.
//! Native buffers live in video memory: on device loss the pool drops them
//! and on restore it recreates them with the same description. Contents
//! are not preserved across a loss; owners refill them from their
//! device-restored hook.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use super::slot_table::{Handle, ReleasePolicy, Released, SlotTable};
use crate::backend::{
    BufferDesc, BufferKind, BufferUsage, GraphicsDevice, IndexFormat, NativeBuffer, VertexFormat,
};
use crate::error::{RenderError, RenderResult};

/// Distinguishes the vertex pool from the index pool
pub trait BufferClass {
    /// Table label
    const LABEL: &'static str;
    /// Element layout
    type Format: Copy + std::fmt::Debug;
    /// Native kind for a layout
    fn kind(format: Self::Format) -> BufferKind;
}

/// Vertex buffers
#[derive(Debug)]
pub enum Vertex {}

/// Index buffers
#[derive(Debug)]
pub enum Index {}

impl BufferClass for Vertex {
    const LABEL: &'static str = "vertex buffer";
    type Format = VertexFormat;

    fn kind(format: VertexFormat) -> BufferKind {
        BufferKind::Vertex(format)
    }
}

impl BufferClass for Index {
    const LABEL: &'static str = "index buffer";
    type Format = IndexFormat;

    fn kind(format: IndexFormat) -> BufferKind {
        BufferKind::Index(format)
    }
}

/// One buffer slot's record
#[derive(Debug)]
pub struct BufferRecord<K: BufferClass> {
    native: Option<NativeBuffer>,
    desc: BufferDesc,
    format: K::Format,
    locks: u32,
    _class: PhantomData<K>,
}

/// Handle to a pooled vertex buffer
pub type VertexBufferHandle = Handle<BufferRecord<Vertex>>;
/// Handle to a pooled index buffer
pub type IndexBufferHandle = Handle<BufferRecord<Index>>;

/// Vertex buffer pool
pub type VertexBufferPool = BufferPool<Vertex>;
/// Index buffer pool
pub type IndexBufferPool = BufferPool<Index>;

/// Reference-counted buffer table
pub struct BufferPool<K: BufferClass> {
    table: SlotTable<BufferRecord<K>>,
    total_bytes: u64,
}

impl<K: BufferClass> BufferPool<K> {
    /// Create an empty pool
    pub fn new(capacity: usize) -> Self {
        Self {
            table: SlotTable::new(K::LABEL, capacity, ReleasePolicy::Free),
            total_bytes: 0,
        }
    }

    /// Number of live buffers
    pub const fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the pool is empty
    pub const fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Bytes of every live buffer
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Create a buffer of `size` bytes
    pub fn create(
        &mut self,
        device: &mut dyn GraphicsDevice,
        size: u32,
        usage: BufferUsage,
        format: K::Format,
    ) -> RenderResult<Handle<BufferRecord<K>>> {
        if size == 0 {
            return Err(RenderError::allocation(K::LABEL, "zero-sized buffer"));
        }
        let desc = BufferDesc {
            size,
            usage,
            kind: K::kind(format),
        };
        let handle = self.table.insert_with(|| {
            let native = device
                .create_buffer(&desc)
                .map_err(|e| {
                    RenderError::allocation(format!("{} of {} bytes", K::LABEL, size), e)
                })?;
            Ok(BufferRecord {
                native: Some(native),
                desc,
                format,
                locks: 0,
                _class: PhantomData,
            })
        })?;
        self.total_bytes += u64::from(size);
        log::trace!("Created {} {} ({} bytes, {:?})", K::LABEL, handle.index(), size, format);
        Ok(handle)
    }

    /// Description of a buffer
    pub fn desc(&self, handle: Handle<BufferRecord<K>>) -> RenderResult<BufferDesc> {
        Ok(self.table.get(handle)?.desc)
    }

    /// Size in bytes
    pub fn size(&self, handle: Handle<BufferRecord<K>>) -> RenderResult<u32> {
        Ok(self.table.get(handle)?.desc.size)
    }

    /// Usage flags
    pub fn usage(&self, handle: Handle<BufferRecord<K>>) -> RenderResult<BufferUsage> {
        Ok(self.table.get(handle)?.desc.usage)
    }

    /// Element layout
    pub fn format(&self, handle: Handle<BufferRecord<K>>) -> RenderResult<K::Format> {
        Ok(self.table.get(handle)?.format)
    }

    /// Native buffer currently backing a slot
    pub fn native(&self, handle: Handle<BufferRecord<K>>) -> RenderResult<Option<NativeBuffer>> {
        Ok(self.table.get(handle)?.native)
    }

    /// Number of open locks on a buffer
    pub fn lock_count(&self, handle: Handle<BufferRecord<K>>) -> RenderResult<u32> {
        Ok(self.table.get(handle)?.locks)
    }

    /// Map `len` bytes at `offset` for CPU access
    ///
    /// A `len` of zero maps the rest of the buffer. Writes through the
    /// guard are sent to the device when it is dropped or
    /// [`BufferLock::unlock`]ed.
    pub fn lock<'a>(
        &'a mut self,
        device: &'a mut dyn GraphicsDevice,
        handle: Handle<BufferRecord<K>>,
        offset: u32,
        len: u32,
    ) -> RenderResult<BufferLock<'a>> {
        let record = self.table.get_mut(handle)?;
        let native = record.native.ok_or(RenderError::DeviceLost)?;
        let size = record.desc.size;
        if offset >= size {
            return Err(RenderError::allocation(
                K::LABEL,
                format!("lock offset {} past end of {}-byte buffer", offset, size),
            ));
        }
        let len = if len == 0 { size - offset } else { len.min(size - offset) };
        let data = if record.desc.usage.contains(BufferUsage::WRITE_ONLY) {
            vec![0; len as usize]
        } else {
            device.read_buffer(native, offset as usize, len as usize)?
        };
        record.locks += 1;
        Ok(BufferLock {
            device,
            native,
            offset: offset as usize,
            data,
            dirty: false,
            locks: &mut record.locks,
        })
    }

    /// Copy `data` into a buffer at `offset`
    pub fn write(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: Handle<BufferRecord<K>>,
        offset: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        let native = self.table.get(handle)?.native.ok_or(RenderError::DeviceLost)?;
        device.write_buffer(native, offset as usize, data)?;
        Ok(())
    }

    /// Read a buffer's contents back
    pub fn read(
        &self,
        device: &dyn GraphicsDevice,
        handle: Handle<BufferRecord<K>>,
        offset: u32,
        len: u32,
    ) -> RenderResult<Vec<u8>> {
        let native = self.table.get(handle)?.native.ok_or(RenderError::DeviceLost)?;
        Ok(device.read_buffer(native, offset as usize, len as usize)?)
    }

    /// Add a reference, returning the new count
    pub fn inc_reference(&mut self, handle: Handle<BufferRecord<K>>) -> RenderResult<u32> {
        self.table.inc_reference(handle)
    }

    /// Drop one reference, destroying the buffer at zero
    pub fn release(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: Handle<BufferRecord<K>>,
    ) -> RenderResult<u32> {
        match self.table.release(handle)? {
            Released::Retained { remaining } => Ok(remaining),
            Released::Freed(record) => {
                if record.locks > 0 {
                    log::warn!("{} {} freed while locked", K::LABEL, handle.index());
                }
                if let Some(native) = record.native {
                    device.destroy_buffer(native);
                }
                self.total_bytes = self.total_bytes.saturating_sub(u64::from(record.desc.size));
                Ok(0)
            }
            Released::Dormant => Ok(0),
        }
    }

    /// Drop every native buffer, keeping slots and descriptions
    pub fn release_native_all(&mut self, device: &mut dyn GraphicsDevice) -> usize {
        let mut dropped = 0;
        for (_, record) in self.table.iter_mut() {
            if let Some(native) = record.native.take() {
                device.destroy_buffer(native);
                dropped += 1;
            }
        }
        dropped
    }

    /// Recreate every dropped native buffer from its description
    pub fn recreate_native_all(&mut self, device: &mut dyn GraphicsDevice) -> RenderResult<usize> {
        let mut created = 0;
        for (handle, record) in self.table.iter_mut() {
            if record.native.is_none() {
                let native = device.create_buffer(&record.desc).map_err(|e| {
                    RenderError::allocation(format!("{} {} restore", K::LABEL, handle.index()), e)
                })?;
                record.native = Some(native);
                record.locks = 0;
                created += 1;
            }
        }
        Ok(created)
    }

    /// Destroy every native buffer (shutdown)
    pub fn destroy_all(&mut self, device: &mut dyn GraphicsDevice) {
        self.release_native_all(device);
    }
}

/// CPU view of a locked buffer range
///
/// Derefs to the mapped bytes; mutable access marks the range dirty.
pub struct BufferLock<'a> {
    device: &'a mut dyn GraphicsDevice,
    native: NativeBuffer,
    offset: usize,
    data: Vec<u8>,
    dirty: bool,
    locks: &'a mut u32,
}

impl BufferLock<'_> {
    /// Copy a slice of plain values into the mapped range
    pub fn copy_from<T: bytemuck::Pod>(&mut self, values: &[T]) -> RenderResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let target = self.data.get_mut(..bytes.len()).ok_or_else(|| {
            RenderError::allocation(
                "buffer lock",
                format!("{} bytes do not fit in the locked range", bytes.len()),
            )
        })?;
        target.copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    /// Send pending writes and close the lock
    pub fn unlock(mut self) -> RenderResult<()> {
        self.flush()
    }

    fn flush(&mut self) -> RenderResult<()> {
        if self.dirty {
            self.dirty = false;
            self.device.write_buffer(self.native, self.offset, &self.data)?;
        }
        Ok(())
    }
}

impl Deref for BufferLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for BufferLock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("Failed to write back locked buffer {}: {}", self.native.0, e);
        }
        *self.locks = self.locks.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessDevice;

    const FORMAT: VertexFormat = VertexFormat::XYZ.union(VertexFormat::DIFFUSE);

    #[test]
    fn test_zero_size_fails() {
        let mut device = HeadlessDevice::new();
        let mut pool = VertexBufferPool::new(4);
        assert!(matches!(
            pool.create(&mut device, 0, BufferUsage::empty(), FORMAT),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_lock_writes_back_on_drop() {
        let mut device = HeadlessDevice::new();
        let mut pool = VertexBufferPool::new(4);
        let handle = pool
            .create(&mut device, 64, BufferUsage::DYNAMIC, FORMAT)
            .expect("Should create buffer");

        {
            let mut lock = pool.lock(&mut device, handle, 16, 8).expect("Should lock");
            assert_eq!(lock.len(), 8);
            lock[0] = 0xAB;
            lock[7] = 0xCD;
        }
        assert_eq!(pool.lock_count(handle).expect("Should be live"), 0);
        let bytes = pool.read(&device, handle, 16, 8).expect("Should read back");
        assert_eq!(bytes[0], 0xAB);
        assert_eq!(bytes[7], 0xCD);
    }

    #[test]
    fn test_lock_whole_buffer_and_copy_pod() {
        let mut device = HeadlessDevice::new();
        let mut pool = IndexBufferPool::new(4);
        let handle = pool
            .create(&mut device, 12, BufferUsage::WRITE_ONLY, IndexFormat::U16)
            .expect("Should create buffer");
        let mut lock = pool.lock(&mut device, handle, 0, 0).expect("Should lock");
        assert_eq!(lock.len(), 12);
        lock.copy_from(&[0u16, 1, 2, 2, 1, 3]).expect("Should fit");
        assert!(lock.copy_from(&[0u32; 4]).is_err());
        lock.unlock().expect("Should write back");

        let bytes = pool.read(&device, handle, 0, 12).expect("Should read back");
        let indices: Vec<u16> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_release_and_stale_handle() {
        let mut device = HeadlessDevice::new();
        let control = device.controller();
        let mut pool = VertexBufferPool::new(2);
        let a = pool.create(&mut device, 32, BufferUsage::empty(), FORMAT).expect("Should create");
        pool.inc_reference(a).expect("Should add reference");
        assert_eq!(pool.release(&mut device, a).expect("Should release"), 1);
        assert_eq!(pool.release(&mut device, a).expect("Should release"), 0);
        assert_eq!(control.buffer_count(), 0);
        assert_eq!(pool.total_bytes(), 0);

        let b = pool.create(&mut device, 32, BufferUsage::empty(), FORMAT).expect("Should create");
        assert_eq!(a.index(), b.index());
        assert!(matches!(pool.desc(a), Err(RenderError::StaleHandle { .. })));
    }

    #[test]
    fn test_device_loss_keeps_handles() {
        let mut device = HeadlessDevice::new();
        let control = device.controller();
        let mut pool = VertexBufferPool::new(4);
        let handle = pool
            .create(&mut device, 48, BufferUsage::DYNAMIC, FORMAT)
            .expect("Should create");

        assert_eq!(pool.release_native_all(&mut device), 1);
        assert_eq!(control.buffer_count(), 0);
        assert!(matches!(pool.lock(&mut device, handle, 0, 0), Err(RenderError::DeviceLost)));
        assert_eq!(pool.size(handle).expect("Should keep slot"), 48);
        assert_eq!(pool.usage(handle).expect("Should keep slot"), BufferUsage::DYNAMIC);
        assert_eq!(pool.format(handle).expect("Should keep slot"), FORMAT);

        assert_eq!(pool.recreate_native_all(&mut device).expect("Should recreate"), 1);
        assert!(pool.native(handle).expect("Should be live").is_some());
        assert_eq!(control.buffer_count(), 1);
    }

    #[test]
    fn test_exhausted_pool() {
        let mut device = HeadlessDevice::new();
        let control = device.controller();
        let mut pool = VertexBufferPool::new(1);
        pool.create(&mut device, 8, BufferUsage::empty(), FORMAT).expect("Should create");
        assert!(matches!(
            pool.create(&mut device, 8, BufferUsage::empty(), FORMAT),
            Err(RenderError::TableExhausted { .. })
        ));
        assert_eq!(control.buffer_count(), 1);
    }
}

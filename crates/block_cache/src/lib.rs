//! A buffer cache for block devices.
//!
//! The cache holds a fixed pool of block-sized buffers, recycled in
//! least-recently-used order. A buffer is looked up by block index with
//! [`BlockCache::get`], locked with [`BlockHandle::lock`], and filled
//! from the device on first use. Writing back to the device is always
//! explicit ([`BlockGuard::write_through`]); callers that defer their
//! writes (a write-ahead log) can [`BlockGuard::pin`] a buffer so the
//! dirty data stays resident until they are done with it.
//!
//! Lock types are pluggable through [`sync_api::Mutex`]: the list of
//! buffers wants a short-section lock, the per-buffer content lock is
//! held across device I/O and wants a blocking one.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::{boxed::Box, collections::VecDeque, sync::Arc};
use dataview::{Pod, PodMethods as _};
use sync_api::Mutex;

/// A device addressed in fixed-size blocks.
///
/// I/O is infallible: implementations for real storage are expected to
/// panic on hardware failure, the same contract a kernel disk driver
/// gives its buffer cache.
pub trait BlockDevice<const N: usize> {
    /// Reads block `index` into `data`.
    fn read(&self, index: usize, data: &mut [u8; N]);

    /// Writes `data` to block `index`.
    fn write(&self, index: usize, data: &[u8; N]);
}

impl<T, const N: usize> BlockDevice<N> for &T
where
    T: BlockDevice<N> + ?Sized,
{
    fn read(&self, index: usize, data: &mut [u8; N]) {
        (**self).read(index, data);
    }

    fn write(&self, index: usize, data: &[u8; N]) {
        (**self).write(index, data);
    }
}

impl<T, const N: usize> BlockDevice<N> for Box<T>
where
    T: BlockDevice<N> + ?Sized,
{
    fn read(&self, index: usize, data: &mut [u8; N]) {
        (**self).read(index, data);
    }

    fn write(&self, index: usize, data: &[u8; N]) {
        (**self).write(index, data);
    }
}

impl<T, const N: usize> BlockDevice<N> for Arc<T>
where
    T: BlockDevice<N> + ?Sized,
{
    fn read(&self, index: usize, data: &mut [u8; N]) {
        (**self).read(index, data);
    }

    fn write(&self, index: usize, data: &[u8; N]) {
        (**self).write(index, data);
    }
}

/// The cache itself: a device plus a pool of buffers.
pub struct BlockCache<D, L, M, const N: usize>
where
    L: Mutex<Data = BufferList<M>>,
{
    device: D,
    /// All buffers, most recently used first.
    buffers: L,
}

/// The recency-ordered buffer pool.
pub struct BufferList<M>(VecDeque<Arc<Buffer<M>>>);

struct Buffer<M> {
    /// Block index this buffer is assigned to. Reassigned only while no
    /// handle or pin refers to the buffer.
    index: usize,
    data: M,
}

/// Block-sized byte storage, aligned for every typed view used on it.
#[repr(C, align(8))]
struct BlockBytes<const N: usize>([u8; N]);

/// Buffer content, behind the per-buffer lock.
pub struct BlockData<const N: usize> {
    /// Which block the bytes belong to; a recycled buffer notices the
    /// mismatch with its new assignment and drops validity.
    index: usize,
    valid: bool,
    bytes: Box<BlockBytes<N>>,
}

/// An unlocked reference to a cached buffer.
///
/// Keeps the buffer from being recycled; dropping the handle marks the
/// buffer most recently used.
pub struct BlockHandle<'a, D, L, M, const N: usize>
where
    L: Mutex<Data = BufferList<M>>,
{
    index: usize,
    cache: &'a BlockCache<D, L, M, N>,
    buffer: Arc<Buffer<M>>,
}

/// A locked buffer.
///
/// `VALID = false` until the content is established by [`read`],
/// [`zeroed`] or [`set_bytes`]; only a valid guard exposes the bytes.
///
/// [`read`]: BlockGuard::read
/// [`zeroed`]: BlockGuard::zeroed
/// [`set_bytes`]: BlockGuard::set_bytes
pub struct BlockGuard<'a, 'h, D, L, M, const N: usize, const VALID: bool>
where
    L: Mutex<Data = BufferList<M>>,
    M: Mutex<Data = BlockData<N>> + 'h,
{
    index: usize,
    cache: &'a BlockCache<D, L, M, N>,
    buffer: Arc<Buffer<M>>,
    data: M::Guard<'h>,
}

/// Keeps a buffer resident (not recyclable) without holding its lock.
pub struct BlockPin<M>(#[expect(dead_code)] Arc<Buffer<M>>);

impl<D, L, M, const N: usize> BlockCache<D, L, M, N>
where
    D: BlockDevice<N>,
    L: Mutex<Data = BufferList<M>>,
    M: Mutex<Data = BlockData<N>>,
{
    /// Creates a cache of `num_buffers` buffers over `device`.
    ///
    /// # Panics
    ///
    /// Panics if `num_buffers` is 0.
    pub fn new(device: D, num_buffers: usize) -> Self {
        assert!(num_buffers > 0);
        let buffers = (0..num_buffers)
            .map(|_| {
                Arc::new(Buffer {
                    index: usize::MAX,
                    data: M::new(BlockData {
                        index: usize::MAX,
                        valid: false,
                        bytes: Box::new(BlockBytes([0; N])),
                    }),
                })
            })
            .collect();
        Self {
            device,
            buffers: L::new(BufferList(buffers)),
        }
    }

    /// Looks up the buffer for block `index`, recycling the least
    /// recently used free buffer on a miss.
    ///
    /// Returns `None` if every buffer is held by a handle or pin.
    pub fn try_get(&self, index: usize) -> Option<BlockHandle<'_, D, L, M, N>> {
        let mut buffers = self.buffers.lock();

        if let Some(buffer) = buffers.0.iter().find(|b| b.index == index) {
            return Some(BlockHandle {
                index,
                cache: self,
                buffer: Arc::clone(buffer),
            });
        }

        // Not cached; recycle from the cold end of the list. A buffer is
        // free exactly when the list holds its only reference.
        let buffer = buffers.0.iter_mut().rev().find_map(|buffer| {
            Arc::get_mut(buffer)?.index = index;
            Some(Arc::clone(buffer))
        })?;
        Some(BlockHandle {
            index,
            cache: self,
            buffer,
        })
    }

    /// Like [`Self::try_get`], but treats pool exhaustion as fatal.
    ///
    /// # Panics
    ///
    /// Panics if every buffer is in use.
    pub fn get(&self, index: usize) -> BlockHandle<'_, D, L, M, N> {
        match self.try_get(index) {
            Some(handle) => handle,
            None => panic!("block buffer exhausted"),
        }
    }
}

impl<D, L, M, const N: usize> Drop for BlockHandle<'_, D, L, M, N>
where
    L: Mutex<Data = BufferList<M>>,
{
    fn drop(&mut self) {
        let mut buffers = self.cache.buffers.lock();
        if let Some(pos) = buffers
            .0
            .iter()
            .position(|b| Arc::ptr_eq(b, &self.buffer))
        {
            let buffer = buffers.0.remove(pos).unwrap();
            buffers.0.push_front(buffer);
        }
    }
}

impl<'a, D, L, M, const N: usize> BlockHandle<'a, D, L, M, N>
where
    D: BlockDevice<N>,
    L: Mutex<Data = BufferList<M>>,
    M: Mutex<Data = BlockData<N>>,
{
    pub fn index(&self) -> usize {
        self.index
    }

    /// Locks the buffer content.
    ///
    /// The returned guard is invalid until content is established; a
    /// buffer recycled since its last use loses its old content here.
    pub fn lock<'h>(&'h mut self) -> BlockGuard<'a, 'h, D, L, M, N, false> {
        let mut data = self.buffer.data.lock();
        if data.index != self.index {
            data.index = self.index;
            data.valid = false;
        }
        BlockGuard {
            index: self.index,
            cache: self.cache,
            buffer: Arc::clone(&self.buffer),
            data,
        }
    }
}

impl<'a, 'h, D, L, M, const N: usize, const VALID: bool> BlockGuard<'a, 'h, D, L, M, N, VALID>
where
    D: BlockDevice<N>,
    L: Mutex<Data = BufferList<M>>,
    M: Mutex<Data = BlockData<N>>,
{
    pub fn index(&self) -> usize {
        self.index
    }

    /// Keeps the buffer resident after this guard and its handle go
    /// away. The content lock is not held by the pin.
    pub fn pin(&self) -> BlockPin<M> {
        BlockPin(Arc::clone(&self.buffer))
    }

    fn into_valid(self) -> BlockGuard<'a, 'h, D, L, M, N, true> {
        BlockGuard {
            index: self.index,
            cache: self.cache,
            buffer: self.buffer,
            data: self.data,
        }
    }

    /// Establishes content from the device unless already cached.
    pub fn read(mut self) -> BlockGuard<'a, 'h, D, L, M, N, true> {
        if !self.data.valid {
            self.cache.device.read(self.index, &mut self.data.bytes.0);
            self.data.valid = true;
        }
        self.into_valid()
    }

    /// Establishes zeroed content without touching the device.
    pub fn zeroed(mut self) -> BlockGuard<'a, 'h, D, L, M, N, true> {
        self.data.bytes.0.fill(0);
        self.data.valid = true;
        self.into_valid()
    }

    /// Establishes content from `bytes` without touching the device.
    pub fn set_bytes(mut self, bytes: &[u8; N]) -> BlockGuard<'a, 'h, D, L, M, N, true> {
        self.data.bytes.0.copy_from_slice(bytes);
        self.data.valid = true;
        self.into_valid()
    }
}

impl<D, L, M, const N: usize> BlockGuard<'_, '_, D, L, M, N, true>
where
    D: BlockDevice<N>,
    L: Mutex<Data = BufferList<M>>,
    M: Mutex<Data = BlockData<N>>,
{
    pub fn bytes(&self) -> &[u8; N] {
        &self.data.bytes.0
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; N] {
        &mut self.data.bytes.0
    }

    /// A typed view of the content.
    pub fn data<T: Pod>(&self) -> &T {
        self.bytes().as_data_view().get(0)
    }

    /// A typed mutable view of the content.
    pub fn data_mut<T: Pod>(&mut self) -> &mut T {
        self.bytes_mut().as_data_view_mut().get_mut(0)
    }

    /// Writes the content to the device.
    pub fn write_through(&mut self) {
        self.cache.device.write(self.index, &self.data.bytes.0);
    }
}

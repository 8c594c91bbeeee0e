//! The file system's instantiation of the generic block cache.

use block_cache::{BlockCache, BlockData, BufferList};

use crate::{
    param::NBUF,
    sync::{SleepLock, SpinLock},
};

pub use block_cache::BlockDevice;
pub use ferrofs_types::BLOCK_SIZE;

/// The boxed device a file system is mounted on.
pub type Disk = Box<dyn BlockDevice<BLOCK_SIZE> + Send + Sync>;

/// Buffer contents are held across disk I/O, so they sit behind a
/// sleep lock; the recency list only ever sees short sections.
pub(crate) type BlockDataLock = SleepLock<BlockData<BLOCK_SIZE>>;
pub(crate) type BufferListLock = SpinLock<BufferList<BlockDataLock>>;

pub(crate) type DiskCache = BlockCache<Disk, BufferListLock, BlockDataLock, BLOCK_SIZE>;

pub(crate) type BlockHandle<'a> =
    block_cache::BlockHandle<'a, Disk, BufferListLock, BlockDataLock, BLOCK_SIZE>;
pub(crate) type BlockGuard<'a, 'h, const VALID: bool> =
    block_cache::BlockGuard<'a, 'h, Disk, BufferListLock, BlockDataLock, BLOCK_SIZE, VALID>;
pub(crate) type BlockPin = block_cache::BlockPin<BlockDataLock>;

pub(crate) fn new_cache(disk: Disk) -> DiskCache {
    BlockCache::new(disk, NBUF)
}

//! File system implementation.
//!
//! Five layers:
//!   + Blocks: allocator for raw disk blocks.
//!   + Log: crash recovery for multi-step updates.
//!   + Files: inode allocator, reading, writing, metadata.
//!   + Directories: inodes with special contents (lists of other inodes).
//!   + Names: paths like /usr/rtm/notes for convenient naming.
//!
//! This module contains the low-level file system manipulation
//! routines. The (higher-level) system-call implementations are in
//! `crate::syscall`.

use core::mem::ManuallyDrop;

use ::log::debug;
use derive_more::Display;
use ferrofs_types::{BlockNo, SuperBlock};

use crate::error::FsError;

use self::{
    block_io::{BlockGuard, BlockHandle, DiskCache},
    inode::InodeTable,
    log::Log,
};

pub mod block_io;
mod data_block;
pub mod inode;
mod log;
pub(crate) mod ops;
pub(crate) mod path;
mod stat;

pub use self::{
    block_io::Disk,
    inode::{DirInode, Inode, LockedTxInode, TxInode},
    stat::Stat,
};

/// Identity of a mounted disk device.
///
/// Exactly one device is mounted per [`FileSystem`]; the number is
/// carried in inode identities and checked by cross-device operations.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNo(u32);

impl DeviceNo {
    /// The root file system device.
    pub const ROOT: Self = Self(1);

    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// A mounted file system: one device, its buffer cache, its log, and
/// the in-memory inode table.
pub struct FileSystem {
    dev: DeviceNo,
    sb: SuperBlock,
    cache: DiskCache,
    log: Log,
    itable: InodeTable,
}

impl FileSystem {
    /// Mounts the file system on `disk`, replaying any committed log
    /// transaction left behind by a crash.
    pub fn mount(disk: Disk) -> Result<Self, FsError> {
        let cache = block_io::new_cache(disk);

        let sb = {
            let mut bh = cache.get(BlockNo::SUPER_BLOCK.as_index());
            let bg = bh.lock().read();
            bg.data::<SuperBlock>().clone()
        };
        if sb.magic != SuperBlock::MAGIC || sb.size == 0 || sb.log_len < 2 {
            return Err(FsError::InvalidImage);
        }

        let log = Log::new(&sb);
        log.recover(&cache);
        debug!(
            "mount: {} blocks, {} inodes, {} log blocks",
            sb.size, sb.ninodes, sb.log_len
        );

        Ok(Self {
            dev: DeviceNo::ROOT,
            sb,
            cache,
            log,
            itable: InodeTable::new(),
        })
    }

    pub(crate) fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    pub(crate) fn device(&self) -> DeviceNo {
        self.dev
    }

    pub(crate) fn inode_table(&self) -> &InodeTable {
        &self.itable
    }

    /// Opens a transaction. Every sequence of mutating file-system
    /// calls runs inside exactly one; blocks until the log can take
    /// another operation's worth of writes.
    pub fn begin_tx(&self) -> Tx<'_, false> {
        self.log.begin_op();
        Tx { fs: self }
    }

    /// Opens a read-only transaction: the same typed block access with
    /// no log reservation and no ability to write.
    pub fn begin_readonly_tx(&self) -> Tx<'_, true> {
        Tx { fs: self }
    }

    /// Returns a long-term reference to the root directory.
    #[must_use]
    pub fn root(&self) -> Inode {
        inode::root(self)
    }
}

/// A crash-recovery transaction.
///
/// All metadata writes issued through a transaction commit atomically
/// when the last concurrent transaction ends. Operations that may free
/// an inode take a `&Tx` precisely so the compiler enforces the
/// "transaction required" rule.
pub struct Tx<'fs, const READ_ONLY: bool> {
    fs: &'fs FileSystem,
}

impl<'fs, const READ_ONLY: bool> Tx<'fs, READ_ONLY> {
    pub(crate) fn fs(&self) -> &'fs FileSystem {
        self.fs
    }

    pub(crate) fn get_block(&self, bn: BlockNo) -> BlockHandle<'fs> {
        self.fs.cache.get(bn.as_index())
    }

    /// A writable view of this transaction, or `None` for a read-only
    /// one. The view shares the underlying operation; it must not be
    /// dropped as its own transaction.
    pub(crate) fn to_writable(&self) -> Option<ManuallyDrop<Tx<'fs, false>>> {
        if READ_ONLY {
            None
        } else {
            Some(ManuallyDrop::new(Tx { fs: self.fs }))
        }
    }

    /// Ends the transaction (the drop does the same).
    pub fn end(self) {}
}

impl Tx<'_, false> {
    /// Schedules the buffer's content as part of this transaction.
    ///
    /// Absorption: logging the same block twice coalesces into one log
    /// slot. The buffer stays resident until commit.
    pub(crate) fn log_write(&self, guard: &BlockGuard<'_, '_, true>) {
        self.fs.log.write(guard);
    }
}

impl<const READ_ONLY: bool> Drop for Tx<'_, READ_ONLY> {
    fn drop(&mut self) {
        if !READ_ONLY {
            self.fs.log.end_op(&self.fs.cache);
        }
    }
}

//! Inodes.
//!
//! An inode describes a single unnamed file. The on-disk record holds
//! metadata: the file's type, its size, the number of links referring
//! to it, and the list of blocks holding its content. Inodes are laid
//! out sequentially starting at `sb.inode_start`; an inode's number is
//! its position in that array.
//!
//! The file system keeps a fixed table of in-use inodes in memory so
//! that concurrent processes synchronize on a single object per
//! (device, inode number) pair. An inode and its in-memory
//! representation go through a sequence of states:
//!
//! * Allocation: an inode is allocated iff its on-disk type is
//!   non-zero. [`TxInode::alloc`] allocates; dropping the last
//!   reference to an inode whose link count is zero frees it again.
//!
//! * Referencing in table: the table entry for an inode is live while
//!   anything still refers to it — the strong count of the entry's
//!   shared pointer *is* the reference count. [`TxInode::get`] finds
//!   or creates an entry; dropping a [`TxInode`] (or converting a
//!   long-term [`Inode`] back and dropping that) releases one
//!   reference.
//!
//! * Validity: the cached copy of the disk inode exists only after the
//!   first lock; dropping the last reference of an unlinked inode
//!   clears it.
//!
//! * Locked: file-system code may only examine and modify the cached
//!   fields and content after locking the inode; the lock guard type
//!   [`LockedTxInode`] is the capability.
//!
//! A typical sequence:
//!
//! ```ignore
//! let mut ip = TxInode::get(&tx, dev, ino);
//! let mut lip = ip.lock();
//! // ... examine and modify ...
//! lip.unlock(); // or drop
//! ip.put();     // or drop
//! ```
//!
//! Locking is separate from referencing so that system calls can hold
//! a long-term reference to an inode (an open file, a working
//! directory) and lock it only for short periods. The separation also
//! avoids deadlock during pathname lookup.
//!
//! Dropping a reference may free the inode on disk, which must be
//! recoverable; therefore every reference is scoped to a transaction
//! (the `&Tx` inside [`TxInode`]). The long-term [`Inode`] form holds
//! no transaction and must be converted with [`Inode::into_tx`] before
//! the reference is released.

use std::sync::Arc;

use ferrofs_types::{BlockNo, DiskInode, InodeBlock, InodeKind, InodeNo, NUM_DIRECT};

use crate::{
    param::NINODE,
    sync::{SleepLock, SleepLockGuard, SpinLock, SpinLockGuard},
};

use super::{DeviceNo, FileSystem, Tx, stat::Stat};

mod content;
mod directory;

pub use directory::DirInode;

type InodeDataPtr = Arc<SleepLock<Option<InodeData>>>;
type InodeDataGuard<'a> = SleepLockGuard<'a, Option<InodeData>>;

/// Cached copy of a disk inode, valid while a table entry holds it.
pub(crate) struct InodeData {
    pub(crate) kind: InodeKind,
    pub(crate) major: i16,
    pub(crate) minor: i16,
    pub(crate) nlink: i16,
    pub(crate) size: u32,
    pub(crate) addrs: [Option<BlockNo>; NUM_DIRECT + 1],
}

impl InodeData {
    fn from_disk(ino: InodeNo, dip: &DiskInode) -> Self {
        let Some(kind) = dip.kind() else {
            panic!("inode {ino} has no type");
        };
        let mut addrs = [None; NUM_DIRECT + 1];
        dip.read_addrs(&mut addrs);
        Self {
            kind,
            major: dip.major,
            minor: dip.minor,
            nlink: dip.nlink,
            size: dip.size,
            addrs,
        }
    }

    fn write_disk(&self, dip: &mut DiskInode) {
        dip.ty = self.kind as i16;
        dip.major = self.major;
        dip.minor = self.minor;
        dip.nlink = self.nlink;
        dip.size = self.size;
        self.write_addrs(dip);
    }

    fn write_addrs(&self, dip: &mut DiskInode) {
        dip.write_addrs(&self.addrs);
    }
}

/// The in-memory inode table.
///
/// The spin lock protects entry identities; everything else about an
/// inode sits behind its per-entry sleep lock. Identity fields may be
/// examined only under the table lock, cached fields only under the
/// sleep lock.
pub(crate) struct InodeTable(SpinLock<[Option<TableEntry>; NINODE]>);

struct TableEntry {
    dev: DeviceNo,
    ino: InodeNo,
    data: InodeDataPtr,
}

impl InodeTable {
    pub(super) fn new() -> Self {
        Self(SpinLock::new([const { None }; NINODE]))
    }

    /// Finds or creates the entry for (`dev`, `ino`) and hands out a
    /// new reference to it. Does not touch the disk.
    ///
    /// # Panics
    ///
    /// Panics if the table is full.
    fn get(&self, dev: DeviceNo, ino: InodeNo) -> InodeDataPtr {
        let mut table = self.0.lock();

        let mut free = None;
        for slot in table.iter_mut() {
            // An entry is referenced while anything beyond the table
            // itself holds its pointer; unreferenced slots are free to
            // recycle, whatever identity they last held.
            let referenced = slot
                .as_ref()
                .is_some_and(|entry| Arc::strong_count(&entry.data) > 1);
            if referenced {
                let entry = slot.as_ref().unwrap();
                if entry.dev == dev && entry.ino == ino {
                    return Arc::clone(&entry.data);
                }
            } else if free.is_none() {
                free = Some(slot);
            }
        }

        let Some(slot) = free else {
            panic!("out of in-memory inodes");
        };
        let data: InodeDataPtr = Arc::new(SleepLock::new(None));
        *slot = Some(TableEntry {
            dev,
            ino,
            data: Arc::clone(&data),
        });
        data
    }

    fn lock(&self) -> SpinLockGuard<'_, [Option<TableEntry>; NINODE]> {
        self.0.lock()
    }
}

/// Returns a long-term reference to the root directory of `fs`.
pub(super) fn root(fs: &FileSystem) -> Inode {
    Inode {
        dev: fs.device(),
        ino: InodeNo::ROOT,
        data: fs.inode_table().get(fs.device(), InodeNo::ROOT),
    }
}

/// A long-term inode reference, held by open files and working
/// directories.
///
/// It cannot be locked or dropped-with-free directly; convert it into
/// a [`TxInode`] with [`Self::into_tx`] first. Release always happens
/// inside a transaction that way.
#[derive(Clone)]
pub struct Inode {
    dev: DeviceNo,
    ino: InodeNo,
    data: InodeDataPtr,
}

impl Inode {
    #[must_use]
    pub fn from_tx<const READ_ONLY: bool>(ip: &TxInode<'_, READ_ONLY>) -> Self {
        Self {
            dev: ip.dev,
            ino: ip.ino,
            data: Arc::clone(&ip.data),
        }
    }

    #[must_use]
    pub fn from_locked<const READ_ONLY: bool>(lip: &LockedTxInode<'_, '_, READ_ONLY>) -> Self {
        Self {
            dev: lip.dev,
            ino: lip.ino,
            data: Arc::clone(&lip.data),
        }
    }

    /// Re-scopes this reference to a transaction, so it can be locked,
    /// examined and ultimately released.
    #[must_use]
    pub fn into_tx<'tx, const READ_ONLY: bool>(
        self,
        tx: &'tx Tx<'tx, READ_ONLY>,
    ) -> TxInode<'tx, READ_ONLY> {
        TxInode {
            tx,
            dev: self.dev,
            ino: self.ino,
            data: self.data,
        }
    }

    #[must_use]
    pub fn dev(&self) -> DeviceNo {
        self.dev
    }

    #[must_use]
    pub fn ino(&self) -> InodeNo {
        self.ino
    }
}

/// A counted, transaction-scoped reference to an in-memory inode.
///
/// Dropping it releases the reference; if that was the last reference
/// to an inode with no links left, the inode and its content are freed
/// on disk inside the transaction the reference is scoped to.
pub struct TxInode<'tx, const READ_ONLY: bool> {
    tx: &'tx Tx<'tx, READ_ONLY>,
    dev: DeviceNo,
    ino: InodeNo,
    data: InodeDataPtr,
}

impl<'tx, const READ_ONLY: bool> TxInode<'tx, READ_ONLY> {
    /// Finds the inode numbered `ino` on `dev` and returns a reference
    /// to its in-memory copy. Does not lock it and does not read it
    /// from disk.
    pub fn get(tx: &'tx Tx<'tx, READ_ONLY>, dev: DeviceNo, ino: InodeNo) -> Self {
        let data = tx.fs().inode_table().get(dev, ino);
        Self { tx, dev, ino, data }
    }

    #[must_use]
    pub fn dev(&self) -> DeviceNo {
        self.dev
    }

    #[must_use]
    pub fn ino(&self) -> InodeNo {
        self.ino
    }

    /// Locks the inode, reading its metadata from disk if this is the
    /// first lock since the table entry was (re)created.
    pub fn lock<'i>(&'i mut self) -> LockedTxInode<'tx, 'i, READ_ONLY> {
        let guard = self.data.lock();
        LockedTxInode::load(self.tx, self.dev, self.ino, Arc::clone(&self.data), guard)
    }

    /// Releases the reference (the drop does the same).
    pub fn put(self) {}
}

impl<const READ_ONLY: bool> Clone for TxInode<'_, READ_ONLY> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx,
            dev: self.dev,
            ino: self.ino,
            data: Arc::clone(&self.data),
        }
    }
}

impl<'tx> TxInode<'tx, false> {
    /// Allocates a fresh inode of kind `kind` on `dev` and returns a
    /// reference to it, unlocked.
    ///
    /// # Panics
    ///
    /// Panics if the disk is out of inodes.
    pub fn alloc(tx: &'tx Tx<'tx, false>, dev: DeviceNo, kind: InodeKind) -> Self {
        let ino = alloc_ino(tx, kind);
        Self::get(tx, dev, ino)
    }
}

/// Claims the first free on-disk inode slot, stamping its type.
fn alloc_ino(tx: &Tx<false>, kind: InodeKind) -> InodeNo {
    let sb = tx.fs().superblock();
    for ino in 1..sb.ninodes {
        let ino = InodeNo::new(ino);
        let mut bh = tx.get_block(sb.inode_block(ino));
        let mut bg = bh.lock().read();
        if bg.data::<InodeBlock>().inode(ino).is_free() {
            bg.data_mut::<InodeBlock>().inode_mut(ino).allocate(kind);
            tx.log_write(&bg);
            return ino;
        }
    }
    panic!("out of inodes");
}

impl<const READ_ONLY: bool> Drop for TxInode<'_, READ_ONLY> {
    fn drop(&mut self) {
        let table = self.tx.fs().inode_table().lock();
        if Arc::strong_count(&self.data) > 2 {
            // Someone else still refers to this inode.
            return;
        }

        // Last external reference: only this drop can hold the inode
        // locked, so this cannot block.
        let mut guard = self
            .data
            .try_lock()
            .expect("inode locked at its last reference");
        let Some(data) = guard.as_ref() else {
            return;
        };
        if data.nlink > 0 {
            return;
        }

        // No links and no other references: truncate and free on disk.
        drop(table);
        if let Some(wtx) = self.tx.to_writable() {
            let mut lip =
                LockedTxInode::from_parts(&wtx, self.dev, self.ino, Arc::clone(&self.data), guard);
            lip.truncate();
            lip.free();
        }
    }
}

/// A locked inode: the capability to examine and modify cached
/// metadata and file content.
pub struct LockedTxInode<'tx, 'i, const READ_ONLY: bool> {
    tx: &'tx Tx<'tx, READ_ONLY>,
    dev: DeviceNo,
    ino: InodeNo,
    data: InodeDataPtr,
    guard: InodeDataGuard<'i>,
}

impl<'tx, 'i, const READ_ONLY: bool> LockedTxInode<'tx, 'i, READ_ONLY> {
    /// Wraps a freshly-acquired guard, reading the inode from disk if
    /// the cached copy is missing.
    ///
    /// # Panics
    ///
    /// Panics if the on-disk inode is free: looking up an unallocated
    /// inode means the file system is corrupt.
    fn load(
        tx: &'tx Tx<'tx, READ_ONLY>,
        dev: DeviceNo,
        ino: InodeNo,
        data: InodeDataPtr,
        mut guard: InodeDataGuard<'i>,
    ) -> Self {
        if guard.is_none() {
            let sb = tx.fs().superblock();
            let mut bh = tx.get_block(sb.inode_block(ino));
            let bg = bh.lock().read();
            *guard = Some(InodeData::from_disk(ino, bg.data::<InodeBlock>().inode(ino)));
        }
        Self {
            tx,
            dev,
            ino,
            data,
            guard,
        }
    }

    /// Wraps a guard that is already known to hold valid data.
    fn from_parts(
        tx: &'tx Tx<'tx, READ_ONLY>,
        dev: DeviceNo,
        ino: InodeNo,
        data: InodeDataPtr,
        guard: InodeDataGuard<'i>,
    ) -> Self {
        assert!(guard.is_some());
        Self {
            tx,
            dev,
            ino,
            data,
            guard,
        }
    }

    #[must_use]
    pub fn dev(&self) -> DeviceNo {
        self.dev
    }

    #[must_use]
    pub fn ino(&self) -> InodeNo {
        self.ino
    }

    #[must_use]
    pub fn kind(&self) -> InodeKind {
        self.data().kind
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind() == InodeKind::Dir
    }

    #[must_use]
    pub fn major(&self) -> i16 {
        self.data().major
    }

    #[must_use]
    pub fn nlink(&self) -> i16 {
        self.data().nlink
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.data().size
    }

    pub(crate) fn data(&self) -> &InodeData {
        self.guard.as_ref().unwrap()
    }

    pub(crate) fn data_mut(&mut self) -> &mut InodeData {
        self.guard.as_mut().unwrap()
    }

    /// Copies stat information out of the inode.
    #[must_use]
    pub fn stat(&self) -> Stat {
        let data = self.data();
        Stat {
            dev: self.dev,
            ino: self.ino,
            kind: data.kind,
            nlink: data.nlink,
            size: u64::from(data.size),
        }
    }

    /// Unlocks the inode (the drop does the same).
    pub fn unlock(self) {}
}

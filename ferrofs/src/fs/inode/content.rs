//! Inode content.
//!
//! The data of an inode lives in blocks on the disk. The first
//! [`NUM_DIRECT`] block numbers are listed in `addrs`; the next
//! [`NUM_INDIRECT`] are listed in the block named by the last `addrs`
//! entry.

use dataview::{Pod, PodMethods as _};
use ferrofs_types::{
    BLOCK_SIZE, BlockNo, IndirectBlock, InodeBlock, InodeKind, MAX_FILE, NUM_DIRECT, NUM_INDIRECT,
};

use crate::{error::FsError, fs::data_block};

use super::LockedTxInode;

impl<const READ_ONLY: bool> LockedTxInode<'_, '_, READ_ONLY> {
    /// Returns the disk block backing the `i`-th direct block,
    /// allocating one if absent.
    fn map_direct(&mut self, i: usize) -> Option<BlockNo> {
        assert!(i < NUM_DIRECT);
        if let Some(bn) = self.data().addrs[i] {
            return Some(bn);
        }
        let tx = self.tx.to_writable()?;
        let bn = data_block::alloc(&tx);
        self.data_mut().addrs[i] = Some(bn);
        Some(bn)
    }

    /// Returns the disk block backing the `i`-th indirect block,
    /// allocating the indirect block and the data block as needed.
    fn map_indirect(&mut self, i: usize) -> Option<BlockNo> {
        assert!(i < NUM_INDIRECT);

        let (ind_bn, fresh) = match self.data().addrs[NUM_DIRECT] {
            Some(ind_bn) => (ind_bn, false),
            None => {
                let tx = self.tx.to_writable()?;
                let ind_bn = data_block::alloc(&tx);
                self.data_mut().addrs[NUM_DIRECT] = Some(ind_bn);
                (ind_bn, true)
            }
        };

        if !fresh {
            let mut bh = self.tx.get_block(ind_bn);
            let bg = bh.lock().read();
            if let Some(bn) = bg.data::<IndirectBlock>().get(i) {
                return Some(bn);
            }
        }

        let tx = self.tx.to_writable()?;
        let bn = data_block::alloc(&tx);
        let mut bh = tx.get_block(ind_bn);
        let mut bg = bh.lock().read();
        bg.data_mut::<IndirectBlock>().set(i, Some(bn));
        tx.log_write(&bg);
        Some(bn)
    }

    /// Returns the disk block backing the `i`-th content block of the
    /// inode, allocating one if there is none yet.
    ///
    /// Returns `None` only when allocation would be needed under a
    /// read-only transaction; content within the file size is always
    /// mapped, so read paths never hit that.
    ///
    /// # Panics
    ///
    /// Panics if `i` is beyond the addressing scheme.
    fn map_block(&mut self, i: usize) -> Option<BlockNo> {
        if i < NUM_DIRECT {
            return self.map_direct(i);
        }
        let i = i - NUM_DIRECT;
        if i < NUM_INDIRECT {
            return self.map_indirect(i);
        }
        panic!("content block out of range: {i}");
    }

    /// Reads content at byte offset `off` into `dst`.
    ///
    /// Returns the number of bytes read: short at end of file, zero
    /// for offsets past it. Device inodes never get here — the file
    /// layer dispatches them to their driver first.
    pub fn read(&mut self, off: usize, dst: &mut [u8]) -> Result<usize, FsError> {
        assert_ne!(self.kind(), InodeKind::Device);

        let size = usize::try_from(self.data().size).unwrap();
        let mut n = dst.len();
        if off > size || off.checked_add(n).is_none() {
            return Ok(0);
        }
        if off + n > size {
            n = size - off;
        }

        let mut tot = 0;
        while tot < n {
            let off = off + tot;
            let Some(bn) = self.map_block(off / BLOCK_SIZE) else {
                break;
            };
            let mut bh = self.tx.get_block(bn);
            let bg = bh.lock().read();
            let m = usize::min(n - tot, BLOCK_SIZE - off % BLOCK_SIZE);
            dst[tot..tot + m].copy_from_slice(&bg.bytes()[off % BLOCK_SIZE..][..m]);
            tot += m;
        }
        Ok(tot)
    }

    /// Reads one `T`-sized record at byte offset `off`.
    pub(crate) fn read_as<T: Pod>(&mut self, off: usize) -> Result<T, FsError> {
        let mut value = T::zeroed();
        let read = self.read(off, value.as_bytes_mut())?;
        if read != size_of::<T>() {
            return Err(FsError::BadOffset);
        }
        Ok(value)
    }
}

impl LockedTxInode<'_, '_, false> {
    /// Writes `src` at byte offset `off`.
    ///
    /// The offset may not leave a hole (`off > size`) and the file may
    /// not grow past the addressing scheme. Returns the number of
    /// bytes written, which is `src.len()` unless something failed.
    pub fn write(&mut self, off: usize, src: &[u8]) -> Result<usize, FsError> {
        assert_ne!(self.kind(), InodeKind::Device);

        let size = usize::try_from(self.data().size).unwrap();
        let n = src.len();
        if off > size || off.checked_add(n).is_none() {
            return Err(FsError::BadOffset);
        }
        if off + n > MAX_FILE * BLOCK_SIZE {
            return Err(FsError::FileTooLarge);
        }

        let mut tot = 0;
        while tot < n {
            let off = off + tot;
            let Some(bn) = self.map_block(off / BLOCK_SIZE) else {
                break;
            };
            let mut bh = self.tx.get_block(bn);
            let mut bg = bh.lock().read();
            let m = usize::min(n - tot, BLOCK_SIZE - off % BLOCK_SIZE);
            bg.bytes_mut()[off % BLOCK_SIZE..][..m].copy_from_slice(&src[tot..tot + m]);
            self.tx.log_write(&bg);
            tot += m;
        }

        if off + tot > size {
            self.data_mut().size = u32::try_from(off + tot).unwrap();
        }
        // Write the inode back even if the size did not change: the
        // loop may have added blocks to `addrs`.
        self.update();

        Ok(tot)
    }

    /// Writes one `T`-sized record at byte offset `off`.
    pub(crate) fn write_data<T: Pod>(&mut self, off: usize, data: &T) -> Result<(), FsError> {
        let written = self.write(off, data.as_bytes())?;
        if written != size_of::<T>() {
            return Err(FsError::BadOffset);
        }
        Ok(())
    }

    /// Copies the cached inode into its slot on disk.
    ///
    /// Must be called after every change to a field that lives on
    /// disk.
    pub fn update(&self) {
        let sb = self.tx.fs().superblock();
        let mut bh = self.tx.get_block(sb.inode_block(self.ino));
        let mut bg = bh.lock().read();
        self.data().write_disk(bg.data_mut::<InodeBlock>().inode_mut(self.ino));
        self.tx.log_write(&bg);
    }

    /// Discards the inode's content.
    pub fn truncate(&mut self) {
        for i in 0..NUM_DIRECT {
            if let Some(bn) = self.data_mut().addrs[i].take() {
                data_block::free(self.tx, bn);
            }
        }

        if let Some(ind_bn) = self.data_mut().addrs[NUM_DIRECT].take() {
            let mut bh = self.tx.get_block(ind_bn);
            let mut bg = bh.lock().read();
            for bn in bg.data_mut::<IndirectBlock>().drain().flatten() {
                data_block::free(self.tx, bn);
            }
            drop(bg);
            drop(bh);
            data_block::free(self.tx, ind_bn);
        }

        self.data_mut().size = 0;
        self.update();
    }

    /// Clears the on-disk slot, making the inode number free again,
    /// and invalidates the cached copy. Content must already have been
    /// truncated.
    pub(super) fn free(mut self) {
        let sb = self.tx.fs().superblock();
        {
            let mut bh = self.tx.get_block(sb.inode_block(self.ino));
            let mut bg = bh.lock().read();
            *bg.data_mut::<InodeBlock>().inode_mut(self.ino) = ferrofs_types::DiskInode::zeroed();
            self.tx.log_write(&bg);
        }
        *self.guard = None;
    }
}

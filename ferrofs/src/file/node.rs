//! Inode-backed files.

use core::sync::atomic::{AtomicUsize, Ordering};

use ferrofs_types::BLOCK_SIZE;

use crate::{
    error::FsError,
    fs::{FileSystem, Inode, Stat},
    param::MAX_OP_BLOCKS,
};

pub(super) struct NodeFile {
    inode: Inode,
    /// Current byte offset; advanced by what a read or write actually
    /// transferred.
    off: AtomicUsize,
}

impl NodeFile {
    pub(super) fn new(inode: Inode) -> Self {
        Self {
            inode,
            off: AtomicUsize::new(0),
        }
    }

    pub(super) fn close(self, fs: &FileSystem) {
        // The put may free the inode, so it needs a transaction.
        let tx = fs.begin_tx();
        self.inode.into_tx(&tx).put();
    }

    pub(super) fn stat(&self, fs: &FileSystem) -> Stat {
        let tx = fs.begin_readonly_tx();
        let mut ip = self.inode.clone().into_tx(&tx);
        ip.lock().stat()
    }

    pub(super) fn read(&self, fs: &FileSystem, dst: &mut [u8]) -> Result<usize, FsError> {
        let tx = fs.begin_readonly_tx();
        let mut ip = self.inode.clone().into_tx(&tx);
        let mut lip = ip.lock();
        let n = lip.read(self.off.load(Ordering::Relaxed), dst)?;
        self.off.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }

    pub(super) fn write(&self, fs: &FileSystem, src: &[u8]) -> Result<usize, FsError> {
        // Write a few blocks at a time so a single large write cannot
        // overrun the log's per-operation budget: an inode block, an
        // indirect block, two blocks of slop for unaligned ends, and
        // two blocks (data + bitmap) per content block written.
        let max = ((MAX_OP_BLOCKS - 1 - 1 - 2) / 2) * BLOCK_SIZE;

        let mut done = 0;
        while done < src.len() {
            let chunk = &src[done..usize::min(done + max, src.len())];

            let tx = fs.begin_tx();
            let mut ip = self.inode.clone().into_tx(&tx);
            let mut lip = ip.lock();
            let res = lip.write(self.off.load(Ordering::Relaxed), chunk);
            if let Ok(n) = res {
                self.off.fetch_add(n, Ordering::Relaxed);
            }
            drop(lip);
            drop(ip);
            tx.end();

            match res {
                Ok(n) if n == chunk.len() => done += n,
                Ok(_) => panic!("short file write"),
                Err(err) => return Err(err),
            }
        }
        Ok(done)
    }
}

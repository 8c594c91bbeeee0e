//! Building fresh file system images.
//!
//! [`format`] lays a file system down on a raw device: superblock,
//! empty log, inode array holding just the root directory, bitmap with
//! the metadata region marked in use, and the root directory's first
//! content block. The device is written directly — formatting happens
//! before mounting, so there is no cache or log to go through.

use dataview::PodMethods as _;
use ferrofs_types::{
    BITS_PER_BLOCK, BLOCK_SIZE, BitmapBlock, DIR_ENTRY_SIZE, DirEntry, DiskInode, InodeBlock,
    InodeKind, InodeNo, INODES_PER_BLOCK, SuperBlock,
};

use crate::{error::FsError, fs::block_io::BlockDevice, param::LOG_SIZE};

/// Image layout parameters.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Total image size in blocks.
    pub size: u32,
    /// Number of inode slots.
    pub ninodes: u32,
    /// Log blocks, header included.
    pub log_len: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            size: 2000,
            ninodes: 200,
            log_len: (LOG_SIZE + 1) as u32,
        }
    }
}

/// Writes a fresh, empty file system onto `disk` and hands the disk
/// back, ready to mount.
pub fn format<D>(disk: D, geom: &Geometry) -> Result<D, FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
{
    let ninode_blocks = geom.ninodes / INODES_PER_BLOCK as u32 + 1;
    let nbitmap_blocks = geom.size / BITS_PER_BLOCK as u32 + 1;

    let log_start = 2;
    let inode_start = log_start + geom.log_len;
    let bitmap_start = inode_start + ninode_blocks;
    let data_start = bitmap_start + nbitmap_blocks;
    if geom.log_len < 2 || geom.ninodes < 2 || data_start + 1 >= geom.size {
        return Err(FsError::InvalidImage);
    }

    let zero = [0; BLOCK_SIZE];
    for index in 0..geom.size as usize {
        disk.write(index, &zero);
    }

    let sb = SuperBlock {
        magic: SuperBlock::MAGIC,
        size: geom.size,
        nblocks: geom.size - data_start,
        ninodes: geom.ninodes,
        log_len: geom.log_len,
        log_start,
        inode_start,
        bitmap_start,
    };
    let mut block = [0; BLOCK_SIZE];
    block[..size_of::<SuperBlock>()].copy_from_slice(sb.as_bytes());
    disk.write(1, &block);

    // The root directory: one inode, one content block with "." and
    // "..", both naming the root itself. Its link count is 1 — its own
    // "." never counts, its own ".." does.
    let root_block = data_start;
    let mut root = DiskInode::zeroed();
    root.ty = InodeKind::Dir as i16;
    root.nlink = 1;
    root.size = (2 * DIR_ENTRY_SIZE) as u32;
    root.addrs[0] = root_block;

    let mut inodes = InodeBlock::zeroed();
    *inodes.inode_mut(InodeNo::ROOT) = root;
    disk.write(
        sb.inode_block(InodeNo::ROOT).as_index(),
        inodes.as_bytes().try_into().unwrap(),
    );

    let mut entries = <[DirEntry; BLOCK_SIZE / DIR_ENTRY_SIZE]>::zeroed();
    entries[0].set_ino(Some(InodeNo::ROOT));
    entries[0].set_name(b".");
    entries[1].set_ino(Some(InodeNo::ROOT));
    entries[1].set_name(b"..");
    disk.write(root_block as usize, entries.as_bytes().try_into().unwrap());

    // Mark the metadata region and the root's content block in use.
    let used = data_start + 1;
    for b in 0..nbitmap_blocks {
        let mut bitmap = BitmapBlock::zeroed();
        for bit in 0..BITS_PER_BLOCK {
            let bn = u64::from(b) * BITS_PER_BLOCK as u64 + bit as u64;
            if bn < u64::from(used) {
                bitmap.set_bit(bit);
            }
        }
        disk.write(
            (bitmap_start + b) as usize,
            bitmap.as_bytes().try_into().unwrap(),
        );
    }

    Ok(disk)
}

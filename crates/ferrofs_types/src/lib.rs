//! On-disk data types for the ferrofs file system.
//!
//! The disk layout:
//!
//! | block no.                       | # of blocks         | content      | type                                  |
//! |---------------------------------|---------------------|--------------|---------------------------------------|
//! | 0                               | 1                   | boot block   | (unused)                              |
//! | 1                               | 1                   | super block  | [`SuperBlock`]                        |
//! | `sb.log_start`                  | `1 + sb.log_len`    | log          | [`LogHeader`] + raw log body blocks   |
//! | `sb.inode_start`                | `sb.ninodes / IPB`  | inode array  | [`InodeBlock`]                        |
//! | `sb.bitmap_start`               | `sb.size / BPB`     | bitmap       | [`BitmapBlock`]                       |
//! | ...                             | `sb.nblocks`        | data blocks  | raw bytes                             |
//!
//! Every multi-byte field is stored in the target's native byte order;
//! images are not meant to move between architectures.

#![cfg_attr(not(test), no_std)]

use core::mem;

use dataview::{Pod, PodMethods as _};
use derive_more::Display;
use strum::FromRepr;

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Number of block addresses stored directly in an inode.
pub const NUM_DIRECT: usize = 12;

/// Number of block addresses stored in the single indirect block.
pub const NUM_INDIRECT: usize = BLOCK_SIZE / size_of::<u32>();

/// Maximum file length, in blocks.
pub const MAX_FILE: usize = NUM_DIRECT + NUM_INDIRECT;

/// Maximum length of a single name component in a directory.
pub const DIR_NAME_SIZE: usize = 14;

/// Disk block number.
///
/// Stored on disk as a raw `u32` where 0 means "no block"; in memory
/// that case is spelled `Option<BlockNo>`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod)]
#[repr(transparent)]
pub struct BlockNo(u32);

impl BlockNo {
    pub const BOOT: Self = Self::new(0);
    pub const SUPER_BLOCK: Self = Self::new(1);

    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub fn from_raw(n: u32) -> Option<Self> {
        if n == 0 { None } else { Some(Self(n)) }
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_index(self) -> usize {
        usize::try_from(self.0).unwrap()
    }
}

/// Inode number.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod)]
#[repr(transparent)]
pub struct InodeNo(u32);

impl InodeNo {
    /// The root directory.
    pub const ROOT: Self = Self::new(1);

    #[must_use]
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_index(self) -> usize {
        usize::try_from(self.0).unwrap()
    }
}

/// What an allocated inode is.
///
/// The raw on-disk type field additionally uses 0 for "free slot";
/// that case never escapes the inode loading path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(i16)]
pub enum InodeKind {
    Dir = 1,
    File = 2,
    Device = 3,
}

/// Super block, read once per device at mount.
#[derive(Debug, Clone, Pod)]
#[repr(C)]
pub struct SuperBlock {
    /// Must be [`Self::MAGIC`].
    pub magic: u32,
    /// Size of the file system image in blocks.
    pub size: u32,
    /// Number of data blocks.
    pub nblocks: u32,
    /// Number of inodes.
    pub ninodes: u32,
    /// Number of log blocks (header included).
    pub log_len: u32,
    /// First log block.
    pub log_start: u32,
    /// First inode array block.
    pub inode_start: u32,
    /// First bitmap block.
    pub bitmap_start: u32,
}

impl SuperBlock {
    pub const MAGIC: u32 = 0x6673_7266; // "frsf"

    /// Returns the block that holds inode `ino`.
    #[must_use]
    pub fn inode_block(&self, ino: InodeNo) -> BlockNo {
        let index = u32::try_from(ino.as_index() / INODES_PER_BLOCK).unwrap();
        BlockNo::new(self.inode_start + index)
    }

    /// Returns the bitmap block that holds the bit for block `bn`.
    #[must_use]
    pub fn bitmap_block(&self, bn: usize) -> BlockNo {
        let index = u32::try_from(bn / BITS_PER_BLOCK).unwrap();
        BlockNo::new(self.bitmap_start + index)
    }

    #[must_use]
    pub fn log_header_block(&self) -> BlockNo {
        BlockNo::new(self.log_start)
    }

    /// Returns the `i`-th log body block.
    #[must_use]
    pub fn log_body_block(&self, i: usize) -> BlockNo {
        BlockNo::new(self.log_start + 1 + u32::try_from(i).unwrap())
    }

    /// Capacity of the on-disk log body.
    #[must_use]
    pub fn log_capacity(&self) -> usize {
        usize::try_from(self.log_len).unwrap() - 1
    }
}

/// Entries the log header block can describe.
pub const MAX_LOG_ENTRIES: usize = BLOCK_SIZE / size_of::<u32>() - 1;

/// Contents of the log header block.
///
/// Used both on disk and to track the blocks absorbed into the
/// running transaction before commit.
#[derive(Pod)]
#[repr(C)]
pub struct LogHeader {
    len: u32,
    targets: [u32; MAX_LOG_ENTRIES],
}
const _: () = assert!(size_of::<LogHeader>() == BLOCK_SIZE);

impl LogHeader {
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.len).unwrap()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Home block numbers of the logged blocks, in log body order.
    #[must_use]
    pub fn targets(&self) -> &[u32] {
        &self.targets[..self.len()]
    }

    pub fn push(&mut self, target: BlockNo) {
        self.targets[self.len()] = target.value();
        self.len += 1;
    }

    pub fn copy_from(&mut self, src: &Self) {
        self.len = src.len;
        self.targets[..src.len()].copy_from_slice(src.targets());
    }
}

/// On-disk inode record.
#[derive(Debug, Clone, Pod)]
#[repr(C)]
pub struct DiskInode {
    /// [`InodeKind`] as raw `i16`; 0 marks a free slot.
    pub ty: i16,
    /// Major device number ([`InodeKind::Device`] only).
    pub major: i16,
    /// Minor device number ([`InodeKind::Device`] only).
    pub minor: i16,
    /// Number of directory entries naming this inode.
    pub nlink: i16,
    /// File size in bytes.
    pub size: u32,
    /// Direct block addresses plus the indirect block address.
    pub addrs: [u32; NUM_DIRECT + 1],
}

impl DiskInode {
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.ty == 0
    }

    #[must_use]
    pub fn kind(&self) -> Option<InodeKind> {
        InodeKind::from_repr(self.ty)
    }

    /// Claims a free slot for a fresh inode of kind `kind`.
    pub fn allocate(&mut self, kind: InodeKind) {
        assert!(self.is_free());
        *self = Self::zeroed();
        self.ty = kind as i16;
    }

    pub fn read_addrs(&self, addrs: &mut [Option<BlockNo>; NUM_DIRECT + 1]) {
        for (dst, src) in addrs.iter_mut().zip(&self.addrs) {
            *dst = BlockNo::from_raw(*src);
        }
    }

    pub fn write_addrs(&mut self, addrs: &[Option<BlockNo>; NUM_DIRECT + 1]) {
        for (dst, src) in self.addrs.iter_mut().zip(addrs) {
            *dst = src.map_or(0, BlockNo::value);
        }
    }
}

/// Inodes per block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<DiskInode>();

/// One block of the on-disk inode array.
#[derive(Pod)]
#[repr(transparent)]
pub struct InodeBlock([DiskInode; INODES_PER_BLOCK]);
const _: () = assert!(size_of::<InodeBlock>() == BLOCK_SIZE);

impl InodeBlock {
    #[must_use]
    pub fn inode(&self, ino: InodeNo) -> &DiskInode {
        &self.0[ino.as_index() % INODES_PER_BLOCK]
    }

    #[must_use]
    pub fn inode_mut(&mut self, ino: InodeNo) -> &mut DiskInode {
        &mut self.0[ino.as_index() % INODES_PER_BLOCK]
    }
}

/// Bitmap bits per bitmap block.
pub const BITS_PER_BLOCK: usize = BLOCK_SIZE * 8;

/// One block of the allocation bitmap.
#[derive(Pod)]
#[repr(transparent)]
pub struct BitmapBlock([u8; BLOCK_SIZE]);
const _: () = assert!(size_of::<BitmapBlock>() == BLOCK_SIZE);

impl BitmapBlock {
    #[must_use]
    pub fn bit(&self, n: usize) -> bool {
        assert!(n < BITS_PER_BLOCK);
        self.0[n / 8] & (1 << (n % 8)) != 0
    }

    pub fn set_bit(&mut self, n: usize) {
        assert!(n < BITS_PER_BLOCK);
        self.0[n / 8] |= 1 << (n % 8);
    }

    pub fn clear_bit(&mut self, n: usize) {
        assert!(n < BITS_PER_BLOCK);
        self.0[n / 8] &= !(1 << (n % 8));
    }
}

/// The single indirect block: an array of further block addresses.
#[derive(Pod)]
#[repr(transparent)]
pub struct IndirectBlock([u32; NUM_INDIRECT]);
const _: () = assert!(size_of::<IndirectBlock>() == BLOCK_SIZE);

impl IndirectBlock {
    #[must_use]
    pub fn get(&self, i: usize) -> Option<BlockNo> {
        BlockNo::from_raw(self.0[i])
    }

    pub fn set(&mut self, i: usize, bn: Option<BlockNo>) {
        self.0[i] = bn.map_or(0, |bn| {
            assert_ne!(bn.value(), 0);
            bn.value()
        });
    }

    /// Takes every address out of the block, leaving it empty.
    pub fn drain(&mut self) -> impl Iterator<Item = Option<BlockNo>> + '_ {
        self.0.iter_mut().map(|n| BlockNo::from_raw(mem::take(n)))
    }
}

/// Directory entry: an inode number and a null-padded name.
///
/// An entry with inode number 0 is a free slot.
#[derive(Debug, Pod)]
#[repr(C)]
pub struct DirEntry {
    ino: u16,
    name: [u8; DIR_NAME_SIZE],
}
pub const DIR_ENTRY_SIZE: usize = size_of::<DirEntry>();

impl DirEntry {
    #[must_use]
    pub fn ino(&self) -> Option<InodeNo> {
        if self.ino == 0 {
            None
        } else {
            Some(InodeNo::new(self.ino.into()))
        }
    }

    pub fn set_ino(&mut self, ino: Option<InodeNo>) {
        self.ino = ino.map_or(0, |ino| {
            assert_ne!(ino.value(), 0);
            u16::try_from(ino.value()).unwrap()
        });
    }

    /// The stored name, trimmed at the first NUL.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(DIR_NAME_SIZE);
        &self.name[..len]
    }

    /// Compares `name` against the stored name, bounded at
    /// [`DIR_NAME_SIZE`] bytes the way lookups have always worked: a
    /// longer `name` matches an entry storing its truncation.
    #[must_use]
    pub fn is_same_name(&self, name: &[u8]) -> bool {
        let len = usize::min(name.len(), DIR_NAME_SIZE);
        self.name() == &name[..len]
    }

    /// Stores `name` truncated to [`DIR_NAME_SIZE`] bytes, null-padded.
    pub fn set_name(&mut self, name: &[u8]) {
        let len = usize::min(name.len(), DIR_NAME_SIZE);
        self.name[..len].copy_from_slice(&name[..len]);
        self.name[len..].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_fit_the_layout() {
        assert_eq!(size_of::<DiskInode>(), 64);
        assert_eq!(BLOCK_SIZE % size_of::<DiskInode>(), 0);
        assert_eq!(size_of::<DirEntry>(), 16);
        assert_eq!(BLOCK_SIZE % size_of::<DirEntry>(), 0);
        assert_eq!(INODES_PER_BLOCK, 8);
        assert_eq!(NUM_INDIRECT, 128);
        assert_eq!(MAX_FILE, 140);
    }

    #[test]
    fn block_no_zero_is_unallocated() {
        assert_eq!(BlockNo::from_raw(0), None);
        assert_eq!(BlockNo::from_raw(7), Some(BlockNo::new(7)));
    }

    #[test]
    fn inode_kind_round_trips_raw_types() {
        assert_eq!(InodeKind::from_repr(0), None);
        assert_eq!(InodeKind::from_repr(1), Some(InodeKind::Dir));
        assert_eq!(InodeKind::from_repr(2), Some(InodeKind::File));
        assert_eq!(InodeKind::from_repr(3), Some(InodeKind::Device));
        assert_eq!(InodeKind::from_repr(4), None);
    }

    #[test]
    fn dir_entry_names_are_bounded() {
        let mut de = DirEntry::zeroed();
        de.set_ino(Some(InodeNo::new(3)));
        de.set_name(b"console");
        assert!(de.is_same_name(b"console"));
        assert!(!de.is_same_name(b"consol"));
        assert!(!de.is_same_name(b"consolex"));

        // A full-length name is stored with no terminator, and longer
        // lookups match their truncation.
        de.set_name(b"abcdefghijklmn");
        assert_eq!(de.name(), b"abcdefghijklmn");
        assert!(de.is_same_name(b"abcdefghijklmn"));
        assert!(de.is_same_name(b"abcdefghijklmnop"));
        assert!(!de.is_same_name(b"abcdefghijklm"));
    }

    #[test]
    fn indirect_block_drain_empties_every_slot() {
        let mut ind = IndirectBlock::zeroed();
        ind.set(0, Some(BlockNo::new(10)));
        ind.set(5, Some(BlockNo::new(11)));
        let drained: Vec<_> = ind.drain().flatten().collect();
        assert_eq!(drained, [BlockNo::new(10), BlockNo::new(11)]);
        assert!(ind.get(0).is_none());
        assert!(ind.get(5).is_none());
    }

    #[test]
    fn log_header_tracks_targets() {
        let mut head = LogHeader::zeroed();
        assert!(head.is_empty());
        head.push(BlockNo::new(42));
        head.push(BlockNo::new(43));
        assert_eq!(head.targets(), &[42, 43]);

        let mut copy = LogHeader::zeroed();
        copy.copy_from(&head);
        assert_eq!(copy.targets(), &[42, 43]);
        copy.clear();
        assert!(copy.is_empty());
    }
}

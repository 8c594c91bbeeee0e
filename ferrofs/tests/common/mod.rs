//! Shared test harness: image checking and crash injection.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use dataview::PodMethods as _;
use ferrofs::{
    MemDisk, System,
    fs::block_io::{BLOCK_SIZE, BlockDevice},
    mkfs::{self, Geometry},
};
use ferrofs_types::{
    BITS_PER_BLOCK, BitmapBlock, DIR_ENTRY_SIZE, DirEntry, DiskInode, InodeBlock, InodeKind,
    InodeNo, INODES_PER_BLOCK, NUM_DIRECT, NUM_INDIRECT, SuperBlock,
};

/// Formats a fresh default image and mounts it, keeping the disk
/// shared so tests can inspect or snapshot the raw image.
pub fn mount_fresh() -> (Arc<MemDisk>, Arc<System>) {
    let geom = Geometry::default();
    let disk = mkfs::format(MemDisk::new(geom.size as usize), &geom).unwrap();
    let disk = Arc::new(disk);
    let sys = System::mount(Box::new(Arc::clone(&disk))).unwrap();
    (disk, sys)
}

/// Mounts a raw image snapshot (replaying the log, as a reboot would).
pub fn remount(image: Vec<[u8; BLOCK_SIZE]>) -> (Arc<MemDisk>, Arc<System>) {
    let disk = Arc::new(MemDisk::from_blocks(image));
    let sys = System::mount(Box::new(Arc::clone(&disk))).unwrap();
    (disk, sys)
}

/// A disk that stops persisting after a set number of writes, the way
/// a power failure would. Reads always see whatever made it to the
/// image.
pub struct CrashDisk {
    inner: Arc<MemDisk>,
    budget: AtomicUsize,
    attempted: AtomicUsize,
}

impl CrashDisk {
    pub fn new(inner: Arc<MemDisk>, budget: usize) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(budget),
            attempted: AtomicUsize::new(0),
        }
    }

    /// Total writes the workload attempted, whether or not they
    /// landed.
    pub fn attempted_writes(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }
}

impl BlockDevice<BLOCK_SIZE> for CrashDisk {
    fn read(&self, index: usize, data: &mut [u8; BLOCK_SIZE]) {
        self.inner.read(index, data);
    }

    fn write(&self, index: usize, data: &[u8; BLOCK_SIZE]) {
        self.attempted.fetch_add(1, Ordering::SeqCst);
        let left = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            });
        if left.is_ok() {
            self.inner.write(index, data);
        }
    }
}

fn block_as<T: dataview::Pod>(image: &[[u8; BLOCK_SIZE]], index: usize) -> T {
    let mut value = T::zeroed();
    let len = size_of::<T>();
    value.as_bytes_mut().copy_from_slice(&image[index][..len]);
    value
}

/// Reads the `i`-th content block of `inode` out of a raw image.
fn content_block(image: &[[u8; BLOCK_SIZE]], inode: &DiskInode, i: usize) -> [u8; BLOCK_SIZE] {
    let bn = if i < NUM_DIRECT {
        inode.addrs[i]
    } else {
        let ind: [u32; NUM_INDIRECT] = block_as(image, inode.addrs[NUM_DIRECT] as usize);
        ind[i - NUM_DIRECT]
    };
    assert_ne!(bn, 0, "content block {i} unallocated");
    image[bn as usize]
}

/// The parsed view of every allocated inode in an image.
pub struct ImageCheck {
    pub sb: SuperBlock,
    /// Allocated inodes by number.
    pub inodes: HashMap<u32, DiskInode>,
    /// Directory entries: (directory ino, name, target ino).
    pub entries: Vec<(u32, Vec<u8>, u32)>,
}

impl ImageCheck {
    pub fn lookup(&self, dir: u32, name: &[u8]) -> Option<u32> {
        self.entries
            .iter()
            .find(|(d, n, _)| *d == dir && n == name)
            .map(|(_, _, target)| *target)
    }

    /// Resolves an absolute path in the raw image.
    pub fn resolve(&self, path: &str) -> Option<u32> {
        let mut ino = InodeNo::ROOT.value();
        for elem in path.split('/').filter(|e| !e.is_empty()) {
            ino = self.lookup(ino, elem.as_bytes())?;
        }
        Some(ino)
    }
}

/// Walks a raw image and checks every cross-structure invariant:
/// bitmap consistency, block ownership, directory shape, and the link
/// count law. Panics on any violation; returns the parsed state for
/// semantic assertions.
pub fn check_image(image: &[[u8; BLOCK_SIZE]]) -> ImageCheck {
    let sb: SuperBlock = block_as(image, 1);
    assert_eq!(sb.magic, SuperBlock::MAGIC, "bad magic");
    let size = sb.size as usize;
    assert_eq!(size, image.len(), "image size mismatch");
    let data_start = size - sb.nblocks as usize;

    // Collect allocated inodes and the blocks they own.
    let mut inodes = HashMap::new();
    let mut owner = HashMap::new();
    for ino in 1..sb.ninodes {
        let block: InodeBlock =
            block_as(image, sb.inode_start as usize + ino as usize / INODES_PER_BLOCK);
        let inode = block.inode(InodeNo::new(ino));
        if inode.is_free() {
            continue;
        }
        assert!(
            inode.kind().is_some(),
            "inode {ino}: invalid type {}",
            inode.ty
        );

        let mut claim = |bn: u32| {
            assert!(
                (data_start..size).contains(&(bn as usize)),
                "inode {ino}: block {bn} outside data area"
            );
            if let Some(other) = owner.insert(bn, ino) {
                panic!("block {bn} owned by inodes {other} and {ino}");
            }
        };
        let blocks_needed = (inode.size as usize).div_ceil(BLOCK_SIZE);
        for (i, &bn) in inode.addrs[..NUM_DIRECT].iter().enumerate() {
            if bn != 0 {
                claim(bn);
                assert!(i < blocks_needed, "inode {ino}: direct block past size");
            }
        }
        if inode.addrs[NUM_DIRECT] != 0 {
            claim(inode.addrs[NUM_DIRECT]);
            let ind: [u32; NUM_INDIRECT] = block_as(image, inode.addrs[NUM_DIRECT] as usize);
            for &bn in &ind {
                if bn != 0 {
                    claim(bn);
                }
            }
        }

        inodes.insert(ino, inode.clone());
    }

    // Bitmap law: metadata always marked, data blocks marked iff owned.
    for bn in 0..size {
        let bitmap: BitmapBlock = block_as(image, sb.bitmap_block(bn).as_index());
        let marked = bitmap.bit(bn % BITS_PER_BLOCK);
        if bn < data_start {
            assert!(marked, "metadata block {bn} not marked in bitmap");
        } else {
            assert_eq!(
                marked,
                owner.contains_key(&(bn as u32)),
                "bitmap bit for data block {bn} wrong"
            );
        }
    }

    // Directory shape and entry collection.
    let mut entries = Vec::new();
    for (&ino, inode) in &inodes {
        if inode.kind() != Some(InodeKind::Dir) {
            continue;
        }
        let dir_size = inode.size as usize;
        assert_eq!(dir_size % DIR_ENTRY_SIZE, 0, "dir {ino}: unaligned size");
        assert!(dir_size >= 2 * DIR_ENTRY_SIZE, "dir {ino}: missing . or ..");

        for off in (0..dir_size).step_by(DIR_ENTRY_SIZE) {
            let block = content_block(image, inode, off / BLOCK_SIZE);
            let mut de = DirEntry::zeroed();
            de.as_bytes_mut()
                .copy_from_slice(&block[off % BLOCK_SIZE..][..DIR_ENTRY_SIZE]);
            match (off / DIR_ENTRY_SIZE, de.ino()) {
                (0, target) => {
                    assert_eq!(de.name(), b".", "dir {ino}: first entry not .");
                    assert_eq!(target.map(InodeNo::value), Some(ino), "dir {ino}: bad .");
                }
                (1, target) => {
                    assert_eq!(de.name(), b"..", "dir {ino}: second entry not ..");
                    assert!(target.is_some(), "dir {ino}: empty ..");
                }
                (_, None) => continue,
                (_, Some(_)) => {}
            }
            let target = de.ino().unwrap().value();
            assert!(
                inodes.contains_key(&target),
                "dir {ino}: entry {:?} names free inode {target}",
                de.name()
            );
            entries.push((ino, de.name().to_vec(), target));
        }
    }

    // Link count law: every entry naming an inode counts, except a
    // directory's own "." entry.
    for (&ino, inode) in &inodes {
        let links = entries
            .iter()
            .filter(|(dir, name, target)| *target == ino && !(*dir == ino && name == b"."))
            .count();
        assert_eq!(
            inode.nlink as usize, links,
            "inode {ino}: nlink {} but {links} entries",
            inode.nlink
        );
    }

    ImageCheck { sb, inodes, entries }
}

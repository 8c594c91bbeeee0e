//! Block device backends.
//!
//! The cache is generic over [`block_cache::BlockDevice`]; these are
//! the backends shipped with the crate. Device I/O is infallible by
//! contract, so the file-backed disk treats a host I/O error the way a
//! kernel treats a failing disk: it panics.

use std::{
    fs,
    io::{self, Read as _, Seek as _, SeekFrom, Write as _},
    path::Path,
    sync::Mutex,
};

use block_cache::BlockDevice;
use ferrofs_types::BLOCK_SIZE;

/// An in-memory disk image.
pub struct MemDisk {
    blocks: Mutex<Vec<[u8; BLOCK_SIZE]>>,
}

impl MemDisk {
    /// A zero-filled disk of `nblocks` blocks.
    #[must_use]
    pub fn new(nblocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![[0; BLOCK_SIZE]; nblocks]),
        }
    }

    /// A disk initialized from an existing image.
    #[must_use]
    pub fn from_blocks(blocks: Vec<[u8; BLOCK_SIZE]>) -> Self {
        Self {
            blocks: Mutex::new(blocks),
        }
    }

    /// A copy of the current image.
    #[must_use]
    pub fn snapshot(&self) -> Vec<[u8; BLOCK_SIZE]> {
        self.blocks.lock().unwrap().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockDevice<BLOCK_SIZE> for MemDisk {
    fn read(&self, index: usize, data: &mut [u8; BLOCK_SIZE]) {
        data.copy_from_slice(&self.blocks.lock().unwrap()[index]);
    }

    fn write(&self, index: usize, data: &[u8; BLOCK_SIZE]) {
        self.blocks.lock().unwrap()[index].copy_from_slice(data);
    }
}

/// A disk backed by a host image file.
pub struct FileDisk {
    file: Mutex<fs::File>,
}

impl FileDisk {
    /// Opens an existing image file.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = fs::File::options().read(true).write(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Creates (or truncates) an image file of `nblocks` zero blocks.
    pub fn create(path: &Path, nblocks: usize) -> io::Result<Self> {
        let file = fs::File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((nblocks * BLOCK_SIZE) as u64)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl BlockDevice<BLOCK_SIZE> for FileDisk {
    fn read(&self, index: usize, data: &mut [u8; BLOCK_SIZE]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((index * BLOCK_SIZE) as u64))
            .and_then(|_| file.read_exact(data))
            .expect("disk read failed");
    }

    fn write(&self, index: usize, data: &[u8; BLOCK_SIZE]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((index * BLOCK_SIZE) as u64))
            .and_then(|_| file.write_all(data))
            .expect("disk write failed");
    }
}

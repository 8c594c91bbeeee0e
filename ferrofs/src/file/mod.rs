//! Open files.
//!
//! A [`File`] is a reference-counted handle shared by descriptors,
//! tagged as inode-backed, device-backed, or pipe-backed. Dropping the
//! last handle releases the payload exactly once: pipes learn that one
//! end closed, inode references are put back inside a fresh
//! transaction.

use std::sync::Arc;

use crate::{
    error::FsError,
    fs::{FileSystem, Inode, Stat},
    param::NFILE,
    sync::SpinLock,
};

pub use self::device::CharDevice;
pub(crate) use self::device::DeviceTable;
use self::{device::DeviceFile, node::NodeFile, pipe::Pipe};

mod device;
mod node;
mod pipe;

/// A reference-counted open-file handle.
#[derive(Clone)]
pub struct File {
    data: Arc<FileData>,
}

struct FileData {
    readable: bool,
    writable: bool,
    fs: Arc<FileSystem>,
    /// Accounts this file against the system-wide open-file budget.
    /// Held for the whole life of the file; dropped last.
    _ticket: FileTicket,
    /// `Some` until the drop takes the payload out to release it.
    inner: Option<FileInner>,
}

enum FileInner {
    Pipe(Arc<Pipe>),
    Node(NodeFile),
    Device(DeviceFile),
}

impl Drop for FileData {
    fn drop(&mut self) {
        // Take the payload out first so its release runs without any
        // table or handle state in the way.
        match self.inner.take() {
            Some(FileInner::Pipe(pipe)) => pipe.close(self.writable),
            Some(FileInner::Node(node)) => node.close(&self.fs),
            Some(FileInner::Device(device)) => device.close(&self.fs),
            None => {}
        }
    }
}

impl File {
    pub(crate) fn new_node(
        fs: &Arc<FileSystem>,
        counter: &Arc<FileCounter>,
        inode: Inode,
        readable: bool,
        writable: bool,
    ) -> Result<Self, FsError> {
        Ok(Self {
            data: Arc::new(FileData {
                readable,
                writable,
                fs: Arc::clone(fs),
                _ticket: counter.acquire()?,
                inner: Some(FileInner::Node(NodeFile::new(inode))),
            }),
        })
    }

    pub(crate) fn new_device(
        fs: &Arc<FileSystem>,
        counter: &Arc<FileCounter>,
        driver: Arc<dyn CharDevice>,
        inode: Inode,
        readable: bool,
        writable: bool,
    ) -> Result<Self, FsError> {
        Ok(Self {
            data: Arc::new(FileData {
                readable,
                writable,
                fs: Arc::clone(fs),
                _ticket: counter.acquire()?,
                inner: Some(FileInner::Device(DeviceFile::new(driver, inode))),
            }),
        })
    }

    /// Creates the two ends of a pipe: (read end, write end).
    pub(crate) fn new_pipe(
        fs: &Arc<FileSystem>,
        counter: &Arc<FileCounter>,
    ) -> Result<(Self, Self), FsError> {
        let pipe = Pipe::new();
        let read_end = Self {
            data: Arc::new(FileData {
                readable: true,
                writable: false,
                fs: Arc::clone(fs),
                _ticket: counter.acquire()?,
                inner: Some(FileInner::Pipe(Arc::clone(&pipe))),
            }),
        };
        let write_end = Self {
            data: Arc::new(FileData {
                readable: false,
                writable: true,
                fs: Arc::clone(fs),
                _ticket: counter.acquire()?,
                inner: Some(FileInner::Pipe(pipe)),
            }),
        };
        Ok((read_end, write_end))
    }

    /// Takes another reference to the file.
    #[must_use]
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Releases one reference (the drop does the same).
    pub fn close(self) {}

    /// Reports metadata of the underlying inode. Pipes have none.
    pub fn stat(&self) -> Result<Stat, FsError> {
        match self.data.inner.as_ref().unwrap() {
            FileInner::Node(node) => Ok(node.stat(&self.data.fs)),
            FileInner::Device(device) => Ok(device.stat(&self.data.fs)),
            FileInner::Pipe(_) => Err(FsError::BadFileDescriptor),
        }
    }

    /// Reads from the file at its current offset, advancing it.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize, FsError> {
        if !self.data.readable {
            return Err(FsError::NotReadable);
        }
        match self.data.inner.as_ref().unwrap() {
            FileInner::Pipe(pipe) => pipe.read(dst),
            FileInner::Node(node) => node.read(&self.data.fs, dst),
            FileInner::Device(device) => device.read(dst),
        }
    }

    /// Writes to the file at its current offset, advancing it.
    pub fn write(&self, src: &[u8]) -> Result<usize, FsError> {
        if !self.data.writable {
            return Err(FsError::NotWritable);
        }
        match self.data.inner.as_ref().unwrap() {
            FileInner::Pipe(pipe) => pipe.write(src),
            FileInner::Node(node) => node.write(&self.data.fs, src),
            FileInner::Device(device) => device.write(src),
        }
    }
}

/// The system-wide open-file budget ([`NFILE`] handles).
pub(crate) struct FileCounter(SpinLock<usize>);

impl FileCounter {
    pub(crate) fn new() -> Self {
        Self(SpinLock::new(0))
    }

    fn acquire(self: &Arc<Self>) -> Result<FileTicket, FsError> {
        let mut count = self.0.lock();
        if *count >= NFILE {
            return Err(FsError::TooManyFiles);
        }
        *count += 1;
        Ok(FileTicket(Arc::clone(self)))
    }
}

struct FileTicket(Arc<FileCounter>);

impl Drop for FileTicket {
    fn drop(&mut self) {
        let mut count = self.0.0.lock();
        assert!(*count > 0, "open-file count underflow");
        *count -= 1;
    }
}

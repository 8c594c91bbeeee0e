//! The system-call surface.
//!
//! Every call that can mutate disk state wraps its whole logical
//! operation in exactly one transaction: argument resolution, path
//! walking, inode updates, directory updates, and the final reference
//! releases all commit or vanish together.
//!
//! Argument marshalling from user memory is outside this crate; paths
//! and buffers arrive as plain slices.

use std::sync::Arc;

use bitflags::bitflags;
use ferrofs_types::InodeKind;

use crate::{
    error::FsError,
    file::{CharDevice, DeviceTable, File, FileCounter},
    fs::{Disk, FileSystem, Inode, Stat, ops, path},
    param::MAX_PATH,
    proc::{Fd, Proc},
    sync::SpinLock,
};

bitflags! {
    /// Open modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ_ONLY = 0x000;
        const WRITE_ONLY = 0x001;
        const READ_WRITE = 0x002;
        const CREATE = 0x200;
        const TRUNC = 0x400;
    }
}

/// A mounted file system plus the pieces processes share: the device
/// switch and the open-file budget.
pub struct System {
    fs: Arc<FileSystem>,
    devices: SpinLock<DeviceTable>,
    files: Arc<FileCounter>,
}

impl System {
    /// Mounts `disk` and wraps it for process use.
    pub fn mount(disk: Disk) -> Result<Arc<Self>, FsError> {
        let fs = FileSystem::mount(disk)?;
        Ok(Arc::new(Self {
            fs: Arc::new(fs),
            devices: SpinLock::new(DeviceTable::new()),
            files: Arc::new(FileCounter::new()),
        }))
    }

    /// The mounted file system.
    pub fn fs(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    /// Installs a character device driver under `major`.
    pub fn register_device(&self, major: i16, driver: Arc<dyn CharDevice>) {
        self.devices.lock().register(major, driver);
    }

    fn device(&self, major: i16) -> Result<Arc<dyn CharDevice>, FsError> {
        self.devices.lock().get(major)
    }

    pub(crate) fn files(&self) -> &Arc<FileCounter> {
        &self.files
    }

    /// Creates a process context rooted at `/`.
    pub fn spawn(self: &Arc<Self>) -> Proc {
        Proc::new(Arc::clone(self))
    }
}

fn check_path(path: &[u8]) -> Result<(), FsError> {
    if path.len() > MAX_PATH {
        return Err(FsError::PathTooLong);
    }
    Ok(())
}

impl Proc {
    /// Opens `path`, optionally creating it, and returns a descriptor.
    pub fn open(&mut self, path: &[u8], mode: OpenFlags) -> Result<Fd, FsError> {
        check_path(path)?;
        let sys = Arc::clone(self.sys());
        let tx = sys.fs().begin_tx();

        let mut ip = if mode.contains(OpenFlags::CREATE) {
            ops::create(&tx, self.cwd(), path, InodeKind::File, 0, 0)?
        } else {
            let mut ip = path::resolve(&tx, self.cwd(), path)?;
            let lip = ip.lock();
            if lip.is_dir() && mode != OpenFlags::READ_ONLY {
                return Err(FsError::IsADirectory);
            }
            drop(lip);
            ip
        };

        let mut lip = ip.lock();
        let readable = !mode.contains(OpenFlags::WRITE_ONLY);
        let writable =
            mode.contains(OpenFlags::WRITE_ONLY) || mode.contains(OpenFlags::READ_WRITE);

        let file = if lip.kind() == InodeKind::Device {
            let driver = sys.device(lip.major())?;
            File::new_device(
                sys.fs(),
                sys.files(),
                driver,
                Inode::from_locked(&lip),
                readable,
                writable,
            )?
        } else {
            File::new_node(
                sys.fs(),
                sys.files(),
                Inode::from_locked(&lip),
                readable,
                writable,
            )?
        };

        if mode.contains(OpenFlags::TRUNC) && lip.kind() == InodeKind::File {
            lip.truncate();
        }

        drop(lip);
        drop(ip);
        tx.end();

        self.add_ofile(file)
    }

    /// Closes `fd`.
    pub fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        let file = self.unset_ofile(fd).ok_or(FsError::BadFileDescriptor)?;
        file.close();
        Ok(())
    }

    /// Duplicates `fd` into a fresh descriptor sharing offset and
    /// modes.
    pub fn dup(&mut self, fd: Fd) -> Result<Fd, FsError> {
        let file = self.ofile(fd)?.dup();
        self.add_ofile(file)
    }

    /// Reads from `fd` at its current offset.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsError> {
        let file = self.ofile(fd)?.clone();
        file.read(buf)
    }

    /// Writes to `fd` at its current offset.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, FsError> {
        let file = self.ofile(fd)?.clone();
        file.write(buf)
    }

    /// Reports metadata of the file behind `fd`.
    pub fn fstat(&self, fd: Fd) -> Result<Stat, FsError> {
        self.ofile(fd)?.stat()
    }

    /// Creates `new` as a hard link to `old`.
    pub fn link(&mut self, old: &[u8], new: &[u8]) -> Result<(), FsError> {
        check_path(old)?;
        check_path(new)?;
        let sys = Arc::clone(self.sys());
        let tx = sys.fs().begin_tx();
        ops::link(&tx, self.cwd(), old, new)
    }

    /// Removes the directory entry at `path`.
    pub fn unlink(&mut self, path: &[u8]) -> Result<(), FsError> {
        check_path(path)?;
        let sys = Arc::clone(self.sys());
        let tx = sys.fs().begin_tx();
        ops::unlink(&tx, self.cwd(), path)
    }

    /// Creates a directory at `path`.
    pub fn mkdir(&mut self, path: &[u8]) -> Result<(), FsError> {
        check_path(path)?;
        let sys = Arc::clone(self.sys());
        let tx = sys.fs().begin_tx();
        ops::create(&tx, self.cwd(), path, InodeKind::Dir, 0, 0).map(|_ip| ())
    }

    /// Creates a device node at `path`.
    pub fn mknod(&mut self, path: &[u8], major: i16, minor: i16) -> Result<(), FsError> {
        check_path(path)?;
        let sys = Arc::clone(self.sys());
        let tx = sys.fs().begin_tx();
        ops::create(&tx, self.cwd(), path, InodeKind::Device, major, minor).map(|_ip| ())
    }

    /// Changes the working directory to `path`.
    pub fn chdir(&mut self, path: &[u8]) -> Result<(), FsError> {
        check_path(path)?;
        let sys = Arc::clone(self.sys());
        let tx = sys.fs().begin_tx();

        let mut ip = path::resolve(&tx, self.cwd(), path)?;
        if !ip.lock().is_dir() {
            return Err(FsError::NotADirectory);
        }
        let new_cwd = Inode::from_tx(&ip);
        ip.put();

        let old_cwd = self.update_cwd(new_cwd);
        old_cwd.into_tx(&tx).put();
        Ok(())
    }

    /// Creates a pipe, returning (read descriptor, write descriptor).
    pub fn pipe(&mut self) -> Result<(Fd, Fd), FsError> {
        let sys = Arc::clone(self.sys());
        let (read_end, write_end) = File::new_pipe(sys.fs(), sys.files())?;

        let rfd = self.add_ofile(read_end)?;
        match self.add_ofile(write_end) {
            Ok(wfd) => Ok((rfd, wfd)),
            Err(err) => {
                // Roll the first descriptor back on partial failure.
                self.unset_ofile(rfd);
                Err(err)
            }
        }
    }
}

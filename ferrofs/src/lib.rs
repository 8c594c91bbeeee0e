//! ferrofs — a small Unix-style on-disk file system.
//!
//! The crate layers, leaves first:
//!
//! + Blocks: an allocator for raw disk blocks over a bitmap.
//! + Log: crash recovery for multi-step metadata updates.
//! + Inodes: allocation, a reference-counted in-memory table, content
//!   mapping, reading, writing, metadata.
//! + Directories: inodes with special contents (lists of other inodes).
//! + Names: slash-separated paths like `/usr/rtm/notes` resolved against
//!   a root or working directory.
//! + Files: reference-counted open-file handles over inodes, devices and
//!   pipes, plus per-process descriptor tables.
//!
//! A [`System`] owns one mounted [`fs::FileSystem`] and the character
//! device switch; a [`Proc`] owns descriptors and a working directory
//! and exposes the system-call surface:
//!
//! ```
//! use ferrofs::{MemDisk, OpenFlags, System, mkfs};
//!
//! let disk = mkfs::format(MemDisk::new(2000), &mkfs::Geometry::default()).unwrap();
//! let sys = System::mount(Box::new(disk)).unwrap();
//! let mut proc = sys.spawn();
//!
//! let fd = proc.open(b"/notes", OpenFlags::CREATE | OpenFlags::READ_WRITE).unwrap();
//! assert_eq!(proc.write(fd, b"hello").unwrap(), 5);
//! proc.close(fd).unwrap();
//! ```

mod error;
pub mod file;
pub mod fs;
pub mod mkfs;
pub mod param;
mod proc;
pub mod sync;
mod syscall;

mod disk;

pub use self::{
    disk::{FileDisk, MemDisk},
    error::FsError,
    file::{CharDevice, File},
    fs::Stat,
    proc::{Fd, Proc},
    syscall::{OpenFlags, System},
};
pub use ferrofs_types::{BlockNo, InodeKind, InodeNo};

//! Process context: the per-process descriptor table and working
//! directory.

use std::sync::Arc;

use derive_more::Display;

use crate::{error::FsError, file::File, fs::Inode, param::NOFILE, syscall::System};

/// A file descriptor: an index into a process's open-file slots.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub struct Fd(pub(crate) usize);

/// A process context.
///
/// Holds up to [`NOFILE`] open files and the working directory that
/// relative paths resolve against. The system-call surface lives here;
/// see `crate::syscall`.
pub struct Proc {
    sys: Arc<System>,
    ofile: [Option<File>; NOFILE],
    cwd: Option<Inode>,
}

impl Proc {
    pub(crate) fn new(sys: Arc<System>) -> Self {
        let cwd = sys.fs().root();
        Self {
            sys,
            ofile: [const { None }; NOFILE],
            cwd: Some(cwd),
        }
    }

    pub(crate) fn sys(&self) -> &Arc<System> {
        &self.sys
    }

    pub(crate) fn cwd(&self) -> &Inode {
        self.cwd.as_ref().unwrap()
    }

    /// Installs a new working directory, returning the old one.
    pub(crate) fn update_cwd(&mut self, cwd: Inode) -> Inode {
        self.cwd.replace(cwd).unwrap()
    }

    /// The file behind `fd`.
    pub(crate) fn ofile(&self, fd: Fd) -> Result<&File, FsError> {
        self.ofile
            .get(fd.0)
            .and_then(Option::as_ref)
            .ok_or(FsError::BadFileDescriptor)
    }

    /// Claims the lowest free descriptor for `file`.
    pub(crate) fn add_ofile(&mut self, file: File) -> Result<Fd, FsError> {
        let slot = self
            .ofile
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(FsError::TooManyOpenFiles)?;
        *slot.1 = Some(file);
        Ok(Fd(slot.0))
    }

    pub(crate) fn unset_ofile(&mut self, fd: Fd) -> Option<File> {
        self.ofile.get_mut(fd.0)?.take()
    }

    /// Clones this process context the way `fork` does: every open
    /// descriptor is duplicated (sharing the underlying files and
    /// their offsets) and the working directory is shared.
    #[must_use]
    pub fn fork(&self) -> Self {
        let mut ofile = [const { None }; NOFILE];
        for (child, parent) in ofile.iter_mut().zip(&self.ofile) {
            *child = parent.clone();
        }
        Self {
            sys: Arc::clone(&self.sys),
            ofile,
            cwd: self.cwd.clone(),
        }
    }

    /// Tears the process down, closing every descriptor and releasing
    /// the working directory (the drop does the same).
    pub fn exit(self) {}
}

impl Drop for Proc {
    fn drop(&mut self) {
        for slot in &mut self.ofile {
            drop(slot.take());
        }
        if let Some(cwd) = self.cwd.take() {
            let tx = self.sys.fs().begin_tx();
            cwd.into_tx(&tx).put();
        }
    }
}

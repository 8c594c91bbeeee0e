//! Directories: inodes whose content is a packed array of
//! [`DirEntry`] records.

use dataview::PodMethods as _;
use ferrofs_types::{DIR_ENTRY_SIZE, DirEntry, InodeNo};

use crate::error::FsError;

use super::{DeviceNo, LockedTxInode, TxInode};

impl<'tx, 'i, const READ_ONLY: bool> LockedTxInode<'tx, 'i, READ_ONLY> {
    /// A directory-typed view of this inode, or `None` if it is not a
    /// directory. Operations that only make sense on directories hang
    /// off the view.
    pub fn as_dir<'l>(&'l mut self) -> Option<DirInode<'tx, 'i, 'l, READ_ONLY>> {
        self.is_dir().then(|| DirInode(self))
    }
}

/// A locked inode known to be a directory.
pub struct DirInode<'tx, 'i, 'l, const READ_ONLY: bool>(&'l mut LockedTxInode<'tx, 'i, READ_ONLY>);

impl<'tx, 'i, const READ_ONLY: bool> DirInode<'tx, 'i, '_, READ_ONLY> {
    #[must_use]
    pub fn dev(&self) -> DeviceNo {
        self.0.dev()
    }

    #[must_use]
    pub fn ino(&self) -> InodeNo {
        self.0.ino()
    }

    pub fn inner(&mut self) -> &mut LockedTxInode<'tx, 'i, READ_ONLY> {
        self.0
    }

    /// Looks up `name`, returning the named inode and the byte offset
    /// of its entry. Empty slots are skipped; comparison is bounded by
    /// the on-disk name size.
    pub fn lookup(&mut self, name: &[u8]) -> Option<(TxInode<'tx, READ_ONLY>, usize)> {
        let size = usize::try_from(self.0.data().size).unwrap();
        for off in (0..size).step_by(DIR_ENTRY_SIZE) {
            let de: DirEntry = self.0.read_as(off).expect("directory read");
            let Some(ino) = de.ino() else { continue };
            if !de.is_same_name(name) {
                continue;
            }
            let ip = TxInode::get(self.0.tx, self.0.dev, ino);
            return Some((ip, off));
        }
        None
    }

    /// Returns whether the directory holds nothing but `.` and `..`.
    pub fn is_empty(&mut self) -> bool {
        let size = usize::try_from(self.0.data().size).unwrap();
        // The first two entries are "." and "..".
        for off in (2 * DIR_ENTRY_SIZE..size).step_by(DIR_ENTRY_SIZE) {
            let de: DirEntry = self.0.read_as(off).expect("directory read");
            if de.ino().is_some() {
                return false;
            }
        }
        true
    }
}

impl DirInode<'_, '_, '_, false> {
    /// Writes a new entry (`name`, `ino`) into the directory, reusing
    /// the first empty slot or appending at the end.
    ///
    /// The caller is responsible for the named inode's link count.
    pub fn link(&mut self, name: &[u8], ino: InodeNo) -> Result<(), FsError> {
        // The name must not be present yet.
        if let Some((ip, _off)) = self.lookup(name) {
            ip.put();
            return Err(FsError::AlreadyExists);
        }

        let size = usize::try_from(self.0.data().size).unwrap();
        assert_eq!(size % DIR_ENTRY_SIZE, 0, "directory size unaligned");

        let (mut de, off) = (0..size)
            .step_by(DIR_ENTRY_SIZE)
            .map(|off| {
                let de: DirEntry = self.0.read_as(off).expect("directory read");
                (de, off)
            })
            .find(|(de, _)| de.ino().is_none())
            .unwrap_or((DirEntry::zeroed(), size));

        de.set_name(name);
        de.set_ino(Some(ino));
        self.0.write_data(off, &de)
    }
}

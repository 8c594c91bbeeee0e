//! Multi-inode operations: create, link, unlink.
//!
//! Each of these runs inside the caller's transaction and leaves the
//! file system consistent on every exit path; partially-built state is
//! rolled back by dropping references (an inode that never reached
//! link count 1 is freed by its drop).

use dataview::PodMethods as _;
use ferrofs_types::{DIR_NAME_SIZE, DirEntry, InodeKind};

use crate::error::FsError;

use super::{Inode, Tx, TxInode, path};

/// Creates `path` as an inode of kind `kind`.
///
/// Opening an existing file with `kind == File` succeeds and returns
/// the existing inode; any other collision is an error. For new
/// directories, writes the `.` and `..` entries and bumps the parent's
/// link count for the `..` back-reference.
pub(crate) fn create<'tx>(
    tx: &'tx Tx<'tx, false>,
    cwd: &Inode,
    path: &[u8],
    kind: InodeKind,
    major: i16,
    minor: i16,
) -> Result<TxInode<'tx, false>, FsError> {
    let mut name = [0; DIR_NAME_SIZE];
    let (mut parent_ip, name) = path::resolve_parent(tx, cwd, path, &mut name)?;

    let mut parent_lip = parent_ip.lock();
    let Some(mut parent_dp) = parent_lip.as_dir() else {
        return Err(FsError::NotADirectory);
    };

    if let Some((mut child_ip, _off)) = parent_dp.lookup(name) {
        // Unlock the parent before locking the child: for a lookup of
        // "." they are the same inode.
        drop(parent_lip);
        parent_ip.put();
        let child_lip = child_ip.lock();
        if kind == InodeKind::File
            && matches!(child_lip.kind(), InodeKind::File | InodeKind::Device)
        {
            drop(child_lip);
            return Ok(child_ip);
        }
        return Err(FsError::AlreadyExists);
    }

    let mut child_ip = TxInode::alloc(tx, parent_dp.dev(), kind);
    let mut child_lip = child_ip.lock();
    child_lip.data_mut().major = major;
    child_lip.data_mut().minor = minor;
    child_lip.data_mut().nlink = 0; // set once fully linked
    child_lip.update();

    let child_ino = child_lip.ino();
    let parent_ino = parent_dp.ino();

    if let Some(mut child_dp) = child_lip.as_dir() {
        child_dp.link(b".", child_ino)?;
        child_dp.link(b"..", parent_ino)?;
    }

    parent_dp.link(name, child_ino)?;

    if child_lip.is_dir() {
        // Success is now guaranteed; account for the child's "..".
        parent_dp.inner().data_mut().nlink += 1;
        parent_dp.inner().update();
    }

    child_lip.data_mut().nlink = 1;
    child_lip.update();

    drop(child_lip);
    Ok(child_ip)
}

/// Creates `new` as another name for the inode at `old`.
pub(crate) fn link(
    tx: &Tx<false>,
    cwd: &Inode,
    old_path: &[u8],
    new_path: &[u8],
) -> Result<(), FsError> {
    let mut old_ip = path::resolve(tx, cwd, old_path)?;
    {
        let mut old_lip = old_ip.lock();
        if old_lip.is_dir() {
            return Err(FsError::IsADirectory);
        }
        old_lip.data_mut().nlink += 1;
        old_lip.update();
    }

    let res = (|| {
        let mut name = [0; DIR_NAME_SIZE];
        let (mut parent_ip, name) = path::resolve_parent(tx, cwd, new_path, &mut name)?;
        let mut parent_lip = parent_ip.lock();
        if parent_lip.dev() != old_ip.dev() {
            return Err(FsError::CrossDevice);
        }
        let Some(mut parent_dp) = parent_lip.as_dir() else {
            return Err(FsError::NotADirectory);
        };
        parent_dp.link(name, old_ip.ino())
    })();

    if res.is_err() {
        let mut old_lip = old_ip.lock();
        old_lip.data_mut().nlink -= 1;
        old_lip.update();
    }
    res
}

/// Removes the directory entry at `path`.
///
/// Directories must be empty; `.` and `..` cannot be unlinked. The
/// inode itself is freed later, when its last in-memory reference goes
/// away.
pub(crate) fn unlink(tx: &Tx<false>, cwd: &Inode, path: &[u8]) -> Result<(), FsError> {
    let mut name = [0; DIR_NAME_SIZE];
    let (mut parent_ip, name) = path::resolve_parent(tx, cwd, path, &mut name)?;

    if name == b"." || name == b".." {
        return Err(FsError::DotDirectory);
    }

    let mut parent_lip = parent_ip.lock();
    let Some(mut parent_dp) = parent_lip.as_dir() else {
        return Err(FsError::NotADirectory);
    };

    let Some((mut child_ip, off)) = parent_dp.lookup(name) else {
        return Err(FsError::NotFound);
    };
    let mut child_lip = child_ip.lock();

    assert!(child_lip.nlink() > 0, "unlink: nlink < 1");
    if let Some(mut child_dp) = child_lip.as_dir() {
        if !child_dp.is_empty() {
            return Err(FsError::DirectoryNotEmpty);
        }
    }

    parent_dp
        .inner()
        .write_data(off, &DirEntry::zeroed())
        .expect("directory write");

    if child_lip.is_dir() {
        // The child's ".." no longer refers to the parent.
        parent_dp.inner().data_mut().nlink -= 1;
        parent_dp.inner().update();
    }
    drop(parent_lip);
    parent_ip.put();

    child_lip.data_mut().nlink -= 1;
    child_lip.update();

    Ok(())
}

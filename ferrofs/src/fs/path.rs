//! Pathname resolution.

use ferrofs_types::{DIR_NAME_SIZE, InodeNo};

use crate::error::FsError;

use super::{Inode, Tx, TxInode};

/// Splits the next element off `path`.
///
/// Returns the element and the remainder with its leading slashes
/// stripped, or `None` when no element remains.
///
/// ```ignore
/// skip_elem(b"a/bb/c")  == Some((b"a", b"bb/c"))
/// skip_elem(b"///a//bb") == Some((b"a", b"bb"))
/// skip_elem(b"a")        == Some((b"a", b""))
/// skip_elem(b"a/")       == Some((b"a", b""))
/// skip_elem(b"")         == None
/// skip_elem(b"///")      == None
/// ```
fn skip_elem(path: &[u8]) -> Option<(&[u8], &[u8])> {
    let start = path.iter().position(|&c| c != b'/')?;
    let path = &path[start..];
    let end = memchr::memchr(b'/', path).unwrap_or(path.len());
    let (elem, rest) = path.split_at(end);
    let next = rest.iter().position(|&c| c != b'/').unwrap_or(rest.len());
    Some((elem, &rest[next..]))
}

/// Walks `path` from the root (absolute) or `cwd` (relative).
///
/// With `parent` set, stops one level early, returning the parent
/// directory and leaving the final element in `name_out` (truncated to
/// [`DIR_NAME_SIZE`] bytes, never null-terminated — an over-long
/// element resolves like its truncation, as it always has).
///
/// Must run inside a transaction, because walking releases inode
/// references.
fn resolve_impl<'tx, const READ_ONLY: bool>(
    tx: &'tx Tx<'tx, READ_ONLY>,
    cwd: &Inode,
    path: &[u8],
    parent: bool,
    mut name_out: Option<&mut [u8; DIR_NAME_SIZE]>,
) -> Result<TxInode<'tx, READ_ONLY>, FsError> {
    let mut ip = if path.first() == Some(&b'/') {
        TxInode::get(tx, tx.fs().device(), InodeNo::ROOT)
    } else {
        cwd.clone().into_tx(tx)
    };

    let mut path = path;
    while let Some((name, rest)) = skip_elem(path) {
        path = rest;
        if let Some(name_out) = &mut name_out {
            let len = usize::min(name.len(), DIR_NAME_SIZE);
            name_out[..len].copy_from_slice(&name[..len]);
            name_out[len..].fill(0);
        }

        let mut lip = ip.lock();
        let Some(mut dip) = lip.as_dir() else {
            return Err(FsError::NotADirectory);
        };

        if parent && path.is_empty() {
            // Stop one level early, keeping the reference.
            drop(lip);
            return Ok(ip);
        }

        let Some((next, _off)) = dip.lookup(name) else {
            return Err(FsError::NotFound);
        };
        drop(lip);
        ip = next;
    }

    if parent {
        // Path had no final element to name.
        return Err(FsError::NotFound);
    }
    Ok(ip)
}

/// Resolves `path` to its inode.
pub(crate) fn resolve<'tx, const READ_ONLY: bool>(
    tx: &'tx Tx<'tx, READ_ONLY>,
    cwd: &Inode,
    path: &[u8],
) -> Result<TxInode<'tx, READ_ONLY>, FsError> {
    resolve_impl(tx, cwd, path, false, None)
}

/// Resolves `path` to its parent directory plus the final name
/// element.
pub(crate) fn resolve_parent<'tx, 'n, const READ_ONLY: bool>(
    tx: &'tx Tx<'tx, READ_ONLY>,
    cwd: &Inode,
    path: &[u8],
    name: &'n mut [u8; DIR_NAME_SIZE],
) -> Result<(TxInode<'tx, READ_ONLY>, &'n [u8]), FsError> {
    let ip = resolve_impl(tx, cwd, path, true, Some(name))?;
    let len = memchr::memchr(0, name).unwrap_or(name.len());
    Ok((ip, &name[..len]))
}

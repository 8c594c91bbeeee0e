use ferrofs_types::{InodeKind, InodeNo};

use super::DeviceNo;

/// Metadata snapshot of an inode, as reported by `fstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub dev: DeviceNo,
    pub ino: InodeNo,
    pub kind: InodeKind,
    pub nlink: i16,
    pub size: u64,
}

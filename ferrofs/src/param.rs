//! System-wide tunables.

/// Maximum number of in-memory inodes.
pub const NINODE: usize = 50;

/// Open files per system.
pub const NFILE: usize = 100;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Maximum major device number.
pub const NDEV: usize = 10;

/// Max number of blocks any single file-system operation writes.
pub const MAX_OP_BLOCKS: usize = 10;

/// Max blocks tracked by the in-memory log across concurrent operations.
pub const LOG_SIZE: usize = MAX_OP_BLOCKS * 3;

/// Size of the disk block cache. Leaves room for log bookkeeping blocks
/// even when a full log's worth of buffers is pinned.
pub const NBUF: usize = LOG_SIZE + MAX_OP_BLOCKS;

/// Maximum path length accepted by the system-call layer.
pub const MAX_PATH: usize = 128;

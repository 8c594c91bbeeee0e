//! Logging for concurrent, crash-safe file-system operations.
//!
//! A log transaction bundles the updates of multiple concurrent
//! operations; the system only commits when no operation is active, so
//! a commit never writes an unfinished operation's data to disk.
//!
//! Each operation brackets itself with [`Log::begin_op`] /
//! [`Log::end_op`]. `begin_op` usually just bumps the count of running
//! operations, but waits when the log is close to running out of
//! space. The last `end_op` commits.
//!
//! The log is a physical re-do log of whole disk blocks:
//!
//! ```text
//! header block, holding home block #s for blocks A, B, C, ...
//! copy of block A
//! copy of block B
//! copy of block C
//! ...
//! ```
//!
//! Writing the header block is the commit point. [`Log::recover`]
//! replays whatever the header describes, so a crash before the header
//! write loses the transaction and a crash after replays all of it.

use arrayvec::ArrayVec;
use dataview::PodMethods as _;
use ferrofs_types::{BlockNo, LogHeader, SuperBlock};

use crate::{
    param::{LOG_SIZE, MAX_OP_BLOCKS},
    sync::{SpinLock, SpinLockCondVar},
};

use super::block_io::{BlockGuard, BlockPin, DiskCache};

pub(crate) struct Log {
    /// The on-disk header block.
    header_block: BlockNo,
    /// Usable log body slots.
    capacity: usize,
    state: SpinLock<LogState>,
    cond: SpinLockCondVar,
}

struct LogState {
    /// Operations between `begin_op` and `end_op`.
    outstanding: usize,
    /// Blocks absorbed into the running transaction. `None` while a
    /// commit is in flight.
    header: Option<Box<LogHeader>>,
    /// Keeps every absorbed buffer resident until it is installed.
    pins: ArrayVec<BlockPin, LOG_SIZE>,
}

impl Log {
    pub(super) fn new(sb: &SuperBlock) -> Self {
        Self {
            header_block: sb.log_header_block(),
            capacity: usize::min(LOG_SIZE, sb.log_capacity()),
            state: SpinLock::new(LogState {
                outstanding: 0,
                header: Some(Box::new(LogHeader::zeroed())),
                pins: ArrayVec::new(),
            }),
            cond: SpinLockCondVar::new(),
        }
    }

    /// Replays a committed transaction left in the log, then clears it.
    pub(super) fn recover(&self, cache: &DiskCache) {
        let mut header = Box::new(LogHeader::zeroed());
        {
            let mut bh = cache.get(self.header_block.as_index());
            let bg = bh.lock().read();
            header.copy_from(bg.data::<LogHeader>());
        }
        if !header.is_empty() {
            log::debug!("log: replaying {} blocks", header.len());
            self.install(cache, &header);
        }
        header.clear();
        self.write_head(cache, &header);
    }

    /// Starts an operation, waiting until the log has room for it.
    pub(super) fn begin_op(&self) {
        let mut state = self.state.lock();
        loop {
            let Some(header) = &state.header else {
                // committing
                state = self.cond.wait(state);
                continue;
            };
            if header.len() + (state.outstanding + 1) * MAX_OP_BLOCKS > self.capacity {
                // this op might exhaust log space; wait for commit
                state = self.cond.wait(state);
                continue;
            }
            state.outstanding += 1;
            break;
        }
    }

    /// Ends an operation; the last outstanding one commits.
    pub(super) fn end_op(&self, cache: &DiskCache) {
        let mut to_commit = None;
        {
            let mut state = self.state.lock();
            assert!(state.outstanding > 0, "end_op outside of an operation");
            assert!(state.header.is_some());
            state.outstanding -= 1;
            if state.outstanding == 0 {
                let header = state.header.take().unwrap();
                let pins = core::mem::take(&mut state.pins);
                to_commit = Some((header, pins));
            } else {
                // begin_op may be waiting for log space, and ending
                // this op released its reservation.
                self.cond.notify();
            }
        }

        if let Some((mut header, pins)) = to_commit {
            // Commit without holding the state lock: committing does
            // disk I/O.
            self.commit(cache, &mut header);
            drop(pins);
            let mut state = self.state.lock();
            state.header = Some(header);
            drop(state);
            self.cond.notify();
        }
    }

    /// Absorbs the buffer into the running transaction.
    pub(super) fn write(&self, guard: &BlockGuard<'_, '_, true>) {
        let mut state = self.state.lock();
        let state = &mut *state;
        assert!(state.outstanding > 0, "log write outside of an operation");
        let header = state.header.as_mut().unwrap();
        assert!(header.len() < self.capacity, "transaction too big");

        let target = u32::try_from(guard.index()).unwrap();
        if header.targets().iter().all(|&t| t != target) {
            header.push(BlockNo::new(target));
            state.pins.push(guard.pin());
        }
    }

    fn commit(&self, cache: &DiskCache, header: &mut LogHeader) {
        if header.is_empty() {
            return;
        }
        self.write_body(cache, header);
        self.write_head(cache, header); // the real commit point
        self.install(cache, header);
        header.clear();
        self.write_head(cache, header); // erase the transaction
    }

    /// Copies modified blocks from the cache into the log area.
    fn write_body(&self, cache: &DiskCache, header: &LogHeader) {
        for (i, &target) in header.targets().iter().enumerate() {
            let mut from = cache.get(BlockNo::new(target).as_index());
            let from_bg = from.lock().read();
            let mut to = cache.get(self.body_block(i).as_index());
            let mut to_bg = to.lock().set_bytes(from_bg.bytes());
            to_bg.write_through();
        }
    }

    /// Writes the in-memory header to its disk block.
    fn write_head(&self, cache: &DiskCache, header: &LogHeader) {
        let mut bh = cache.get(self.header_block.as_index());
        let mut bg = bh.lock().zeroed();
        bg.data_mut::<LogHeader>().copy_from(header);
        bg.write_through();
    }

    /// Copies committed blocks from the log area to their home
    /// locations.
    fn install(&self, cache: &DiskCache, header: &LogHeader) {
        for (i, &target) in header.targets().iter().enumerate() {
            let mut from = cache.get(self.body_block(i).as_index());
            let from_bg = from.lock().read();
            let mut to = cache.get(BlockNo::new(target).as_index());
            let mut to_bg = to.lock().set_bytes(from_bg.bytes());
            to_bg.write_through();
        }
    }

    fn body_block(&self, i: usize) -> BlockNo {
        BlockNo::new(self.header_block.value() + 1 + u32::try_from(i).unwrap())
    }
}

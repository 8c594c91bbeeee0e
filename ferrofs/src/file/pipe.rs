//! Pipes: a bounded byte ring shared by a read end and a write end.

use std::sync::Arc;

use crate::{
    error::FsError,
    sync::{SpinLock, SpinLockCondVar},
};

const PIPE_SIZE: usize = 512;

pub(super) struct Pipe {
    state: SpinLock<PipeState>,
    /// Signaled when bytes arrive or the write end closes.
    data_avail: SpinLockCondVar,
    /// Signaled when space frees up or the read end closes.
    space_avail: SpinLockCondVar,
}

struct PipeState {
    buf: [u8; PIPE_SIZE],
    /// Total bytes read; `nread % PIPE_SIZE` is the read position.
    nread: usize,
    /// Total bytes written; invariant `nread <= nwrite <= nread + PIPE_SIZE`.
    nwrite: usize,
    read_open: bool,
    write_open: bool,
}

impl Pipe {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: SpinLock::new(PipeState {
                buf: [0; PIPE_SIZE],
                nread: 0,
                nwrite: 0,
                read_open: true,
                write_open: true,
            }),
            data_avail: SpinLockCondVar::new(),
            space_avail: SpinLockCondVar::new(),
        })
    }

    /// Notes that one end was closed; blocked peers wake up and see
    /// EOF or a broken pipe.
    pub(super) fn close(&self, writable: bool) {
        let mut state = self.state.lock();
        if writable {
            state.write_open = false;
            drop(state);
            self.data_avail.notify();
        } else {
            state.read_open = false;
            drop(state);
            self.space_avail.notify();
        }
    }

    /// Writes all of `src`, blocking while the ring is full and a
    /// reader exists. Fails once the read end is gone.
    pub(super) fn write(&self, src: &[u8]) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        let mut done = 0;
        while done < src.len() {
            if !state.read_open {
                return Err(FsError::BrokenPipe);
            }
            if state.nwrite == state.nread + PIPE_SIZE {
                // full
                self.data_avail.notify();
                state = self.space_avail.wait(state);
                continue;
            }
            let at = state.nwrite % PIPE_SIZE;
            let n = [
                PIPE_SIZE - at,                        // contiguous tail
                state.nread + PIPE_SIZE - state.nwrite, // free space
                src.len() - done,                       // remaining input
            ]
            .into_iter()
            .min()
            .unwrap();
            state.buf[at..at + n].copy_from_slice(&src[done..done + n]);
            state.nwrite += n;
            done += n;
        }
        drop(state);
        self.data_avail.notify();
        Ok(done)
    }

    /// Reads whatever is available, blocking while the ring is empty
    /// and a writer exists. Returns 0 at end of file.
    pub(super) fn read(&self, dst: &mut [u8]) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        while state.nread == state.nwrite && state.write_open {
            state = self.data_avail.wait(state);
        }

        let mut done = 0;
        while done < dst.len() && state.nread < state.nwrite {
            let at = state.nread % PIPE_SIZE;
            let n = [
                PIPE_SIZE - at,             // contiguous tail
                state.nwrite - state.nread, // buffered bytes
                dst.len() - done,           // remaining output space
            ]
            .into_iter()
            .min()
            .unwrap();
            dst[done..done + n].copy_from_slice(&state.buf[at..at + n]);
            state.nread += n;
            done += n;
        }
        drop(state);
        self.space_avail.notify();
        Ok(done)
    }
}

//! Lock primitives.
//!
//! Two flavors, used for two different jobs:
//!
//! + [`SpinLock`] protects short critical sections over in-memory
//!   tables (inode identities, the open-file count, log and pipe
//!   state). Nothing blocking may happen under it.
//! + [`SleepLock`] guards state that is held across disk I/O: an
//!   inode's cached content, a block buffer's bytes. Waiters block.
//!
//! [`SpinLockCondVar`] lets a thread give up a spin lock and sleep
//! until another thread signals a state change, re-acquiring the lock
//! before returning; the log and pipes are built on it.

mod sleep_lock;
mod spin_lock;

pub use self::{
    sleep_lock::{SleepLock, SleepLockGuard},
    spin_lock::{SpinLock, SpinLockCondVar, SpinLockGuard},
};

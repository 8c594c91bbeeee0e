use core::{
    cell::UnsafeCell,
    hint,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};
use std::sync::{Condvar, Mutex};

/// A spinning mutual-exclusion lock.
///
/// Critical sections under it must be short and must not block; the
/// sleeping path for longer waits is [`SleepLock`](super::SleepLock).
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, spinning until it is available.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        // `Acquire` orders the critical section's loads and stores
        // strictly after the lock is taken.
        let mut spins = 0_u32;
        while self.locked.swap(true, Ordering::Acquire) {
            spins += 1;
            if spins % 64 == 0 {
                std::thread::yield_now();
            } else {
                hint::spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Acquires the lock only if it is free right now.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self.locked.swap(true, Ordering::Acquire) {
            return None;
        }
        Some(SpinLockGuard { lock: self })
    }
}

impl<T> sync_api::Mutex for SpinLock<T> {
    type Data = T;
    type Guard<'a>
        = SpinLockGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

unsafe impl<T: Send> Send for SpinLockGuard<'_, T> {}
unsafe impl<T: Sync> Sync for SpinLockGuard<'_, T> {}

impl<'a, T> SpinLockGuard<'a, T> {
    /// Releases the lock, handing back a reference to it.
    pub fn into_lock(self) -> &'a SpinLock<T> {
        self.lock
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // `Release` publishes the critical section's stores before the
        // lock is seen free.
        self.lock.locked.store(false, Ordering::Release);
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.value.get() }
    }
}

/// A wakeup channel paired with a [`SpinLock`].
///
/// [`wait`](Self::wait) releases the guard, sleeps until a
/// [`notify`](Self::notify) that happened after the release, and
/// re-acquires the lock. Callers re-check their condition in a loop.
pub struct SpinLockCondVar {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl SpinLockCondVar {
    pub const fn new() -> Self {
        Self {
            seq: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn wait<'a, T>(&self, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        // Sample the sequence before releasing the spin lock; a notify
        // between the release and the sleep is then never lost.
        let seq = *self.seq.lock().unwrap();
        let lock = guard.into_lock();

        let mut cur = self.seq.lock().unwrap();
        while *cur == seq {
            cur = self.cond.wait(cur).unwrap();
        }
        drop(cur);

        lock.lock()
    }

    pub fn notify(&self) {
        *self.seq.lock().unwrap() += 1;
        self.cond.notify_all();
    }
}

impl Default for SpinLockCondVar {
    fn default() -> Self {
        Self::new()
    }
}

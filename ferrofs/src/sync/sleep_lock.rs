use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};
use std::sync::{Condvar, Mutex};

/// A blocking lock that may be held across disk I/O.
///
/// Waiters sleep instead of spinning, so holding one of these for the
/// duration of a device read is fine; holding a
/// [`SpinLock`](super::SpinLock) there is not.
pub struct SleepLock<T> {
    held: Mutex<bool>,
    cond: Condvar,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SleepLock<T> {}
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            held: Mutex::new(false),
            cond: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, sleeping until it is available.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.cond.wait(held).unwrap();
        }
        *held = true;
        SleepLockGuard { lock: self }
    }

    /// Acquires the lock only if it is free right now.
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        let mut held = self.held.lock().unwrap();
        if *held {
            return None;
        }
        *held = true;
        Some(SleepLockGuard { lock: self })
    }
}

impl<T> sync_api::Mutex for SleepLock<T> {
    type Data = T;
    type Guard<'a>
        = SleepLockGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
}

unsafe impl<T: Send> Send for SleepLockGuard<'_, T> {}
unsafe impl<T: Sync> Sync for SleepLockGuard<'_, T> {}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        let mut held = self.lock.held.lock().unwrap();
        *held = false;
        self.lock.cond.notify_one();
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.value.get() }
    }
}

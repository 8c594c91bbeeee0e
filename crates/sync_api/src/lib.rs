//! Lock traits shared by infrastructure crates.
//!
//! Code that must work both inside the file system (with its own spin
//! and sleep locks) and on plain std (tests, tools) is written against
//! these traits.

#![cfg_attr(not(feature = "std"), no_std)]

use core::ops::DerefMut;

/// A mutual-exclusion lock owning its data.
pub trait Mutex {
    /// The protected data.
    type Data;

    /// The guard returned by [`Self::lock`].
    type Guard<'a>: DerefMut<Target = Self::Data>
    where
        Self: 'a;

    /// Creates a new lock around `data`.
    fn new(data: Self::Data) -> Self;

    /// Acquires the lock, blocking until it is available.
    fn lock(&self) -> Self::Guard<'_>;
}

#[cfg(feature = "std")]
impl<T> Mutex for std::sync::Mutex<T> {
    type Data = T;
    type Guard<'a>
        = std::sync::MutexGuard<'a, T>
    where
        T: 'a;

    fn new(data: Self::Data) -> Self {
        Self::new(data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock().unwrap()
    }
}

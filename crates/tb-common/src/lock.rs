//! Reader-writer lock around a shared value.

use std::sync::{PoisonError, RwLock};

/// A value guarded by an [`RwLock`], accessed only through copies or closures.
///
/// Lock poisoning is ignored: the guarded values are plain state that stays
/// consistent even if a panicking writer left mid-closure.
#[derive(Debug, Default)]
pub struct ReadWriteLock<T> {
    value: RwLock<T>,
}

impl<T> ReadWriteLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Returns a copy of the current value.
    pub fn current(&self) -> T
    where
        T: Clone,
    {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the value.
    pub fn set(&self, value: T) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Reads the value under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.value.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Atomic read-modify-write under the exclusive lock.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

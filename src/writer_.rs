use std::{
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use crate::rwlock_::RwLock;

/// A guard holding the exclusive write lock; releases it when dropped.
///
/// A `WriterGuard` is handed out both for a fresh write acquisition
/// ([`RwLock::write`]) and for an in-place promotion from an upgradeable
/// read ([`UpgradableReaderGuard::upgrade`]); the exit path is identical,
/// so dropping a promoted guard falls back to the upgradeable read.
///
/// [`UpgradableReaderGuard::upgrade`]: crate::UpgradableReaderGuard::upgrade
pub struct WriterGuard<'a, T: ?Sized> {
    lock_: &'a RwLock<T>,
    unsend_: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> WriterGuard<'a, T> {
    pub(super) fn new(lock: &'a RwLock<T>) -> Self {
        log::trace!("[WriterGuard::new] lock {:p}", lock);
        WriterGuard {
            lock_: lock,
            unsend_: PhantomData,
        }
    }

    pub fn rwlock(&self) -> &RwLock<T> {
        self.lock_
    }
}

impl<T: ?Sized> Drop for WriterGuard<'_, T> {
    fn drop(&mut self) {
        let r = self.lock_.raw().exit_write();
        debug_assert!(r.is_ok(), "[WriterGuard::drop] {r:?}");
    }
}

impl<T: ?Sized> Deref for WriterGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.lock_.deref_impl()
    }
}

impl<T: ?Sized> DerefMut for WriterGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.lock_.deref_mut_impl()
    }
}

impl<T: fmt::Debug + ?Sized> fmt::Debug for WriterGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WriterGuard(lock: {:p}, value: {:?})",
            self.rwlock(),
            self.deref(),
        )
    }
}

impl<T: fmt::Display + ?Sized> fmt::Display for WriterGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WriterGuard(lock: {:p}, value: {})",
            self.rwlock(),
            self.deref(),
        )
    }
}

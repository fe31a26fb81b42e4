use std::{fmt, marker::PhantomData, ops::Deref};

use crate::rwlock_::RwLock;

/// A guard that releases its shared read lock when dropped.
///
/// Not `Send`: the read lock must be exited on the thread that entered it,
/// because the recursion bookkeeping lives in that thread's local storage.
pub struct ReaderGuard<'a, T: ?Sized> {
    lock_: &'a RwLock<T>,
    unsend_: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> ReaderGuard<'a, T> {
    pub(super) fn new(lock: &'a RwLock<T>) -> Self {
        log::trace!("[ReaderGuard::new] lock {:p}", lock);
        ReaderGuard {
            lock_: lock,
            unsend_: PhantomData,
        }
    }

    pub fn rwlock(&self) -> &RwLock<T> {
        self.lock_
    }
}

impl<T: ?Sized> Drop for ReaderGuard<'_, T> {
    fn drop(&mut self) {
        let r = self.lock_.raw().exit_read();
        debug_assert!(r.is_ok(), "[ReaderGuard::drop] {r:?}");
    }
}

impl<T: ?Sized> Deref for ReaderGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.lock_.deref_impl()
    }
}

impl<T: fmt::Debug + ?Sized> fmt::Debug for ReaderGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReaderGuard(lock: {:p}, value: {:?})",
            self.rwlock(),
            self.deref(),
        )
    }
}

impl<T: fmt::Display + ?Sized> fmt::Display for ReaderGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReaderGuard(lock: {:p}, value: {})",
            self.rwlock(),
            self.deref(),
        )
    }
}

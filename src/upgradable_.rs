use std::{
    fmt,
    marker::PhantomData,
    mem,
    ops::Deref,
};

use crate::{
    errors_::LockResult,
    reader_::ReaderGuard,
    rwlock_::RwLock,
    timeout_::Timeout,
    writer_::WriterGuard,
};

/// A guard holding the upgradeable read lock; releases it when dropped.
///
/// At most one thread holds this guard at a time. While held, other
/// threads may still enter shared reads; the holder can promote to a
/// write lock in place with [`upgrade`](Self::upgrade) or step down to a
/// plain read with [`downgrade`](Self::downgrade).
pub struct UpgradableReaderGuard<'a, T: ?Sized> {
    lock_: &'a RwLock<T>,
    unsend_: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> UpgradableReaderGuard<'a, T> {
    pub(super) fn new(lock: &'a RwLock<T>) -> Self {
        log::trace!("[UpgradableReaderGuard::new] lock {:p}", lock);
        UpgradableReaderGuard {
            lock_: lock,
            unsend_: PhantomData,
        }
    }

    pub fn rwlock(&self) -> &RwLock<T> {
        self.lock_
    }

    /// Promotes this guard to an exclusive write lock, waiting for all
    /// other readers to drain.
    ///
    /// The upgradeable seat stays held for the duration; dropping the
    /// returned [`WriterGuard`] falls back to the upgradeable read held
    /// by `self`.
    pub fn upgrade(&mut self) -> LockResult<WriterGuard<'_, T>> {
        self.lock_.raw().enter_write()?;
        Result::Ok(WriterGuard::new(self.lock_))
    }

    /// Attempts the promotion within `timeout`, returning `Ok(None)` if
    /// the remaining readers did not drain in time.
    pub fn try_upgrade(
        &mut self,
        timeout: impl Into<Timeout>,
    ) -> LockResult<Option<WriterGuard<'_, T>>> {
        if self.lock_.raw().try_enter_write(timeout.into())? {
            Result::Ok(Option::Some(WriterGuard::new(self.lock_)))
        } else {
            Result::Ok(Option::None)
        }
    }

    /// Converts this guard into a plain read guard, freeing the
    /// upgradeable seat for another thread.
    ///
    /// The read lock is acquired before the upgradeable read is
    /// released, so the protected value stays visible throughout.
    pub fn downgrade(self) -> ReaderGuard<'a, T> {
        let raw = self.lock_.raw();
        // Cannot block: the upgradeable holder is always admitted as a
        // reader, and no writer can be granted while the seat is held.
        let acquired = raw.enter_read();
        debug_assert!(
            acquired.is_ok(),
            "[UpgradableReaderGuard::downgrade] {acquired:?}",
        );
        let released = raw.exit_upgradeable_read();
        debug_assert!(
            released.is_ok(),
            "[UpgradableReaderGuard::downgrade] {released:?}",
        );
        let guard = ReaderGuard::new(self.lock_);
        mem::forget(self);
        guard
    }
}

impl<T: ?Sized> Drop for UpgradableReaderGuard<'_, T> {
    fn drop(&mut self) {
        let r = self.lock_.raw().exit_upgradeable_read();
        debug_assert!(r.is_ok(), "[UpgradableReaderGuard::drop] {r:?}");
    }
}

impl<T: ?Sized> Deref for UpgradableReaderGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.lock_.deref_impl()
    }
}

impl<T: fmt::Debug + ?Sized> fmt::Debug for UpgradableReaderGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UpgradableReaderGuard(lock: {:p}, value: {:?})",
            self.rwlock(),
            self.deref(),
        )
    }
}

impl<T: fmt::Display + ?Sized> fmt::Display for UpgradableReaderGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UpgradableReaderGuard(lock: {:p}, value: {})",
            self.rwlock(),
            self.deref(),
        )
    }
}

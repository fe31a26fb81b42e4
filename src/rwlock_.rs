use std::{cell::UnsafeCell, fmt, mem::ManuallyDrop};

use crate::{
    errors_::LockResult,
    impl_::{RawRwLock, RecursionPolicy},
    reader_::ReaderGuard,
    timeout_::Timeout,
    upgradable_::UpgradableReaderGuard,
    writer_::WriterGuard,
};

/// A typed reader-writer lock handing out RAII guards over its data.
///
/// The lock logic lives in [`RawRwLock`]; this wrapper pairs it with an
/// `UnsafeCell<T>` so that the guards can hand out `&T`/`&mut T` with the
/// usual borrow guarantees. Guards release their mode on drop and are not
/// `Send`: a lock mode must be exited on the thread that entered it.
///
/// # Examples
///
/// ```
/// use syncex_rwlock::RwLock;
///
/// let lock = RwLock::new(41usize);
/// {
///     let mut w = lock.write().unwrap();
///     *w += 1;
/// }
/// let r = lock.read().unwrap();
/// assert_eq!(*r, 42);
/// ```
pub struct RwLock<T: ?Sized> {
    raw_: RawRwLock,
    data_cell_: UnsafeCell<T>,
}

unsafe impl<T: Send + ?Sized> Send for RwLock<T> {}
unsafe impl<T: Send + Sync + ?Sized> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a lock with the default `NoRecursion` policy.
    pub fn new(data: T) -> RwLock<T> {
        Self::with_policy(RecursionPolicy::default(), data)
    }

    pub fn with_policy(policy: RecursionPolicy, data: T) -> RwLock<T> {
        RwLock {
            raw_: RawRwLock::new(policy),
            data_cell_: UnsafeCell::new(data),
        }
    }

    /// Unwraps the lock and returns the inner value.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncex_rwlock::RwLock;
    ///
    /// let lock = RwLock::new(5usize);
    /// assert_eq!(lock.into_inner(), 5);
    /// ```
    #[must_use]
    #[inline]
    pub fn into_inner(self) -> T {
        let m = ManuallyDrop::new(self);
        unsafe { m.data_cell_.get().read() }
    }
}

impl<T: ?Sized> RwLock<T> {
    /// The untyped core, for introspection and lifecycle control.
    pub fn raw(&self) -> &RawRwLock {
        &self.raw_
    }

    /// Blocks until a shared read guard is available.
    pub fn read(&self) -> LockResult<ReaderGuard<'_, T>> {
        self.raw_.enter_read()?;
        Result::Ok(ReaderGuard::new(self))
    }

    /// Bounded variant of [`read`](Self::read); `Ok(None)` on timeout.
    pub fn try_read(
        &self,
        timeout: impl Into<Timeout>,
    ) -> LockResult<Option<ReaderGuard<'_, T>>> {
        if self.raw_.try_enter_read(timeout.into())? {
            Result::Ok(Option::Some(ReaderGuard::new(self)))
        } else {
            Result::Ok(Option::None)
        }
    }

    /// Blocks until the exclusive write guard is available.
    pub fn write(&self) -> LockResult<WriterGuard<'_, T>> {
        self.raw_.enter_write()?;
        Result::Ok(WriterGuard::new(self))
    }

    /// Bounded variant of [`write`](Self::write); `Ok(None)` on timeout.
    pub fn try_write(
        &self,
        timeout: impl Into<Timeout>,
    ) -> LockResult<Option<WriterGuard<'_, T>>> {
        if self.raw_.try_enter_write(timeout.into())? {
            Result::Ok(Option::Some(WriterGuard::new(self)))
        } else {
            Result::Ok(Option::None)
        }
    }

    /// Blocks until the upgradeable read guard is available.
    pub fn upgradable_read(&self) -> LockResult<UpgradableReaderGuard<'_, T>> {
        self.raw_.enter_upgradeable_read()?;
        Result::Ok(UpgradableReaderGuard::new(self))
    }

    /// Bounded variant of [`upgradable_read`](Self::upgradable_read);
    /// `Ok(None)` on timeout.
    pub fn try_upgradable_read(
        &self,
        timeout: impl Into<Timeout>,
    ) -> LockResult<Option<UpgradableReaderGuard<'_, T>>> {
        if self.raw_.try_enter_upgradeable_read(timeout.into())? {
            Result::Ok(Option::Some(UpgradableReaderGuard::new(self)))
        } else {
            Result::Ok(Option::None)
        }
    }

    pub(super) fn deref_impl(&self) -> &T {
        unsafe { &*self.data_cell_.get() }
    }

    /// Caller must hold the write lock.
    #[allow(clippy::mut_from_ref)]
    pub(super) fn deref_mut_impl(&self) -> &mut T {
        unsafe { &mut *self.data_cell_.get() }
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        RwLock::new(T::default())
    }
}

impl<T: fmt::Debug + ?Sized> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_read(Timeout::Bounded(std::time::Duration::ZERO)) {
            Result::Ok(Option::Some(guard)) => f
                .debug_struct("RwLock")
                .field("data", &&*guard)
                .finish(),
            _ => f.debug_struct("RwLock").field("data", &"<locked>").finish(),
        }
    }
}

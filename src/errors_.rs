use derive_more::{Display, Error};

/// Errors raised synchronously at the point of lock misuse.
///
/// None of these leave the lock in a partially-acquired state: a failed
/// operation returns the shared bookkeeping exactly as it found it.
#[derive(Clone, Copy, Debug, Display, Error, PartialEq, Eq)]
pub enum LockError {
    /// A recursive or cross-mode acquisition that the current
    /// [`RecursionPolicy`](crate::RecursionPolicy) forbids, or an ordering
    /// that is illegal under every policy (e.g. write-after-read).
    #[display("lock recursion not allowed: {}", _0)]
    Recursion(#[error(not(source))] &'static str),

    /// The calling thread attempted to exit a lock mode it does not hold.
    #[display("unmatched lock release: {}", _0)]
    UnmatchedExit(#[error(not(source))] &'static str),

    /// A timeout value outside the accepted range (the infinite sentinel,
    /// zero, or a positive number of milliseconds).
    #[display("invalid timeout of {} ms", _0)]
    InvalidTimeout(#[error(not(source))] i64),

    /// `dispose` was called while the lock still had holders or waiters.
    #[display("lock disposed while held or awaited")]
    IncorrectDispose,

    /// Any operation on an already disposed lock.
    #[display("operation on a disposed lock")]
    Disposed,
}

pub type LockResult<T> = Result<T, LockError>;

pub(super) const K_RECURSIVE_READ: &str =
    "recursive read acquisition requires SupportsRecursion";
pub(super) const K_RECURSIVE_WRITE: &str =
    "recursive write acquisition requires SupportsRecursion";
pub(super) const K_RECURSIVE_UPGRADE: &str =
    "recursive upgradeable-read acquisition requires SupportsRecursion";
pub(super) const K_READ_AFTER_WRITE: &str =
    "read acquisition while holding the write lock requires SupportsRecursion";
pub(super) const K_WRITE_AFTER_READ: &str =
    "write acquisition while holding a read lock is never allowed";
pub(super) const K_UPGRADE_AFTER_READ: &str =
    "upgradeable-read acquisition while holding a read lock is never allowed";
pub(super) const K_UPGRADE_AFTER_WRITE: &str =
    "upgradeable-read acquisition while holding the write lock requires SupportsRecursion";

pub(super) const K_UNMATCHED_READ: &str = "read lock not held by this thread";
pub(super) const K_UNMATCHED_WRITE: &str = "write lock not held by this thread";
pub(super) const K_UNMATCHED_UPGRADE: &str =
    "upgradeable-read lock not held by this thread";

//! A reentrant-capable blocking reader-writer lock with an upgradeable
//! read mode, timeouts and writer-priority fairness.

mod errors_;
mod events_;
mod gate_;
mod impl_;
mod reader_;
mod records_;
mod rwlock_;
mod state_;
mod timeout_;
mod upgradable_;
mod writer_;

pub use errors_::{LockError, LockResult};
pub use impl_::{RawRwLock, RecursionPolicy};
pub use reader_::ReaderGuard;
pub use rwlock_::RwLock;
pub use timeout_::{Timeout, K_INFINITE_MILLIS};
pub use upgradable_::UpgradableReaderGuard;
pub use writer_::WriterGuard;

#[cfg(test)]mod tests_;

pub mod x_deps {
    pub use derive_more;
    pub use log;
}

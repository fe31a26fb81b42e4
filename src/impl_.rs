use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    thread::{self, ThreadId},
};

use crate::{
    errors_::{
        LockError, LockResult, K_READ_AFTER_WRITE, K_RECURSIVE_READ,
        K_RECURSIVE_UPGRADE, K_RECURSIVE_WRITE, K_UNMATCHED_READ,
        K_UNMATCHED_UPGRADE, K_UNMATCHED_WRITE, K_UPGRADE_AFTER_READ,
        K_UPGRADE_AFTER_WRITE, K_WRITE_AFTER_READ,
    },
    events_::{ResetMode, WaitEvent},
    gate_::{spin_wait, GateGuard, SpinGate},
    records_::{self, ThreadLockRecord},
    state_::LockWord,
    timeout_::{Timeout, TimeoutTracker},
};

/// Optimistic gate-retry passes before an acquisition parks on its event.
const K_MAX_SPIN: u32 = 20;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a thread may re-acquire modes it already holds on this lock.
///
/// Under `NoRecursion` nearly every re-entrant acquisition is an error; the
/// one standing exception is that the upgrade owner may always take a read
/// lock. Under `SupportsRecursion` re-entrant acquisition is counted along
/// the legal read ⊆ upgrade ⊆ write lattice. Write-after-read is illegal
/// under both policies: the pre-existing read could deadlock the writer
/// against other readers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecursionPolicy {
    #[default]
    NoRecursion,
    SupportsRecursion,
}

/// Which wait condition a blocked acquisition parks on.
#[derive(Clone, Copy, Debug)]
enum WaitSet {
    Read,
    Write,
    Upgrade,
    WriteUpgrade,
}

/// Shared bookkeeping, mutated only while the gate is held.
#[derive(Debug, Default)]
struct Core {
    word_: LockWord,
    write_owner_: Option<ThreadId>,
    upgrade_owner_: Option<ThreadId>,
    num_read_waiters_: u32,
    num_write_waiters_: u32,
    num_upgrade_waiters_: u32,
    num_write_upgrade_waiters_: u32,
    /// The upgrade owner also holds an explicit nested read lock; makes a
    /// reader count of exactly 2 upgradable (see wake selection).
    upgrade_owner_holds_read_: bool,
    disposed_: bool,
}

impl Core {
    fn check_disposed_(&self) -> LockResult<()> {
        if self.disposed_ {
            Result::Err(LockError::Disposed)
        } else {
            Result::Ok(())
        }
    }

    fn waiters_mut_(&mut self, set: WaitSet) -> &mut u32 {
        match set {
            WaitSet::Read => &mut self.num_read_waiters_,
            WaitSet::Write => &mut self.num_write_waiters_,
            WaitSet::Upgrade => &mut self.num_upgrade_waiters_,
            WaitSet::WriteUpgrade => &mut self.num_write_upgrade_waiters_,
        }
    }

    fn has_no_waiters_(&self) -> bool {
        self.num_read_waiters_ == 0
            && self.num_write_waiters_ == 0
            && self.num_upgrade_waiters_ == 0
            && self.num_write_upgrade_waiters_ == 0
    }
}

/// A reentrant-capable blocking reader/writer/upgradeable-read lock.
///
/// This is the untyped core: callers pair `enter_*` and `exit_*` manually
/// and every misuse is reported as a [`LockError`]. The typed
/// [`RwLock`](crate::RwLock) wraps it with RAII guards.
///
/// # Examples
///
/// ```
/// use syncex_rwlock::{RawRwLock, RecursionPolicy};
///
/// let lock = RawRwLock::new(RecursionPolicy::NoRecursion);
/// lock.enter_read().unwrap();
/// assert!(lock.is_read_lock_held());
/// assert_eq!(lock.current_read_count(), 1);
///
/// // A second reader from this thread violates NoRecursion.
/// assert!(lock.enter_read().is_err());
///
/// lock.exit_read().unwrap();
/// assert_eq!(lock.current_read_count(), 0);
/// ```
pub struct RawRwLock {
    policy_: RecursionPolicy,
    lock_id_: u64,
    gate_: SpinGate<Core>,
    read_event_: WaitEvent,
    write_event_: WaitEvent,
    upgrade_event_: WaitEvent,
    write_upgrade_event_: WaitEvent,
}

impl RawRwLock {
    pub fn new(policy: RecursionPolicy) -> Self {
        RawRwLock {
            policy_: policy,
            lock_id_: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            gate_: SpinGate::new(Core::default()),
            read_event_: WaitEvent::new(ResetMode::Manual),
            write_event_: WaitEvent::new(ResetMode::Auto),
            upgrade_event_: WaitEvent::new(ResetMode::Auto),
            write_upgrade_event_: WaitEvent::new(ResetMode::Auto),
        }
    }

    pub fn recursion_policy(&self) -> RecursionPolicy {
        self.policy_
    }

    fn is_reentrant_(&self) -> bool {
        matches!(self.policy_, RecursionPolicy::SupportsRecursion)
    }

    fn record_(&self) -> ThreadLockRecord {
        records_::peek_record(self.lock_id_).unwrap_or_default()
    }

    fn event_(&self, set: WaitSet) -> &WaitEvent {
        match set {
            WaitSet::Read => &self.read_event_,
            WaitSet::Write => &self.write_event_,
            WaitSet::Upgrade => &self.upgrade_event_,
            WaitSet::WriteUpgrade => &self.write_upgrade_event_,
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Blocks until the calling thread holds a shared read lock.
    pub fn enter_read(&self) -> LockResult<()> {
        let entered =
            self.try_enter_read_core_(&TimeoutTracker::new(Timeout::Infinite))?;
        debug_assert!(entered);
        Result::Ok(())
    }

    /// Like [`enter_read`](Self::enter_read) bounded by `timeout`; returns
    /// `Ok(false)` only when the timeout expires, with lock state untouched.
    pub fn try_enter_read(&self, timeout: Timeout) -> LockResult<bool> {
        self.try_enter_read_core_(&TimeoutTracker::new(timeout))
    }

    fn try_enter_read_core_(&self, timeout: &TimeoutTracker) -> LockResult<bool> {
        let id = thread::current().id();
        let mut core = self.gate_.lock();
        core.check_disposed_()?;

        if !self.is_reentrant_() {
            if core.write_owner_ == Option::Some(id) {
                return Result::Err(LockError::Recursion(K_READ_AFTER_WRITE));
            }
            if self.record_().reader_count > 0 {
                return Result::Err(LockError::Recursion(K_RECURSIVE_READ));
            }
            if core.upgrade_owner_ == Option::Some(id) {
                // The upgrade owner is always granted read access; this is
                // one extra increment on top of its own reservation.
                core.word_ = core.word_.desire_reader_incr();
                records_::with_record(self.lock_id_, |r| r.reader_count += 1);
                return Result::Ok(true);
            }
        } else {
            if self.record_().reader_count > 0 {
                records_::with_record(self.lock_id_, |r| r.reader_count += 1);
                return Result::Ok(true);
            }
            if core.upgrade_owner_ == Option::Some(id) {
                core.word_ = core.word_.desire_reader_incr();
                records_::with_record(self.lock_id_, |r| r.reader_count += 1);
                core.upgrade_owner_holds_read_ = true;
                return Result::Ok(true);
            }
            if core.write_owner_ == Option::Some(id) {
                core.word_ = core.word_.desire_reader_incr();
                records_::with_record(self.lock_id_, |r| r.reader_count += 1);
                return Result::Ok(true);
            }
        }

        let mut spins = 0u32;
        loop {
            if core.word_.expect_reader_headroom() {
                core.word_ = core.word_.desire_reader_incr();
                records_::with_record(self.lock_id_, |r| r.reader_count += 1);
                return Result::Ok(true);
            }
            if spins < K_MAX_SPIN {
                drop(core);
                if timeout.is_expired() {
                    return Result::Ok(false);
                }
                spins += 1;
                spin_wait(spins);
                core = self.gate_.lock();
                core.check_disposed_()?;
                continue;
            }
            let Option::Some(reacquired) =
                self.wait_on_event_(core, WaitSet::Read, timeout)
            else {
                return Result::Ok(false);
            };
            core = reacquired;
        }
    }

    /// Releases one shared read lock held by the calling thread.
    pub fn exit_read(&self) -> LockResult<()> {
        let id = thread::current().id();
        let mut core = self.gate_.lock();
        core.check_disposed_()?;

        if self.record_().reader_count < 1 {
            return Result::Err(LockError::UnmatchedExit(K_UNMATCHED_READ));
        }
        if self.is_reentrant_() {
            if self.record_().reader_count > 1 {
                records_::with_record(self.lock_id_, |r| r.reader_count -= 1);
                return Result::Ok(());
            }
            if core.upgrade_owner_ == Option::Some(id) {
                core.upgrade_owner_holds_read_ = false;
            }
        }
        core.word_ = core.word_.desire_reader_decr();
        records_::with_record(self.lock_id_, |r| r.reader_count -= 1);
        self.exit_and_wake_(core);
        Result::Ok(())
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Blocks until the calling thread holds the exclusive write lock. For
    /// the upgrade owner this is the in-place promotion path.
    pub fn enter_write(&self) -> LockResult<()> {
        let entered =
            self.try_enter_write_core_(&TimeoutTracker::new(Timeout::Infinite))?;
        debug_assert!(entered);
        Result::Ok(())
    }

    pub fn try_enter_write(&self, timeout: Timeout) -> LockResult<bool> {
        self.try_enter_write_core_(&TimeoutTracker::new(timeout))
    }

    fn try_enter_write_core_(&self, timeout: &TimeoutTracker) -> LockResult<bool> {
        let id = thread::current().id();
        let mut upgrading = false;
        let mut core = self.gate_.lock();
        core.check_disposed_()?;

        if !self.is_reentrant_() {
            if core.write_owner_ == Option::Some(id) {
                return Result::Err(LockError::Recursion(K_RECURSIVE_WRITE));
            }
            if core.upgrade_owner_ == Option::Some(id) {
                upgrading = true;
            }
            if self.record_().reader_count > 0 {
                return Result::Err(LockError::Recursion(K_WRITE_AFTER_READ));
            }
        } else {
            if core.write_owner_ == Option::Some(id) {
                records_::with_record(self.lock_id_, |r| r.writer_count += 1);
                return Result::Ok(true);
            } else if core.upgrade_owner_ == Option::Some(id) {
                upgrading = true;
            } else if self.record_().reader_count > 0 {
                return Result::Err(LockError::Recursion(K_WRITE_AFTER_READ));
            }
        }

        let mut spins = 0u32;
        loop {
            if core.word_.expect_writer_acquirable() {
                core.word_ = core.word_.desire_writer_held();
                break;
            }
            if upgrading {
                let readers = core.word_.reader_count();
                if readers == 1 {
                    // The sole counted reader is our own upgrade
                    // reservation; it stays counted while the write is held.
                    core.word_ = core.word_.desire_writer_held();
                    break;
                }
                if readers == 2 && core.upgrade_owner_holds_read_ {
                    // Reentrant carve-out: both counted readers are this
                    // thread (upgrade reservation + one nested read).
                    core.word_ = core.word_.desire_writer_held();
                    break;
                }
            }
            if spins < K_MAX_SPIN {
                drop(core);
                if timeout.is_expired() {
                    return Result::Ok(false);
                }
                spins += 1;
                spin_wait(spins);
                core = self.gate_.lock();
                core.check_disposed_()?;
                continue;
            }
            // A pending upgrade parks on its own event so that fresh write
            // requests can never starve it.
            let set = if upgrading {
                WaitSet::WriteUpgrade
            } else {
                WaitSet::Write
            };
            let Option::Some(reacquired) = self.wait_on_event_(core, set, timeout)
            else {
                return Result::Ok(false);
            };
            core = reacquired;
        }
        core.write_owner_ = Option::Some(id);
        records_::with_record(self.lock_id_, |r| r.writer_count += 1);
        Result::Ok(true)
    }

    /// Releases one write lock held by the calling thread.
    pub fn exit_write(&self) -> LockResult<()> {
        let id = thread::current().id();
        let mut core = self.gate_.lock();
        core.check_disposed_()?;

        if core.write_owner_ != Option::Some(id) {
            return Result::Err(LockError::UnmatchedExit(K_UNMATCHED_WRITE));
        }
        debug_assert!(self.record_().writer_count > 0);
        records_::with_record(self.lock_id_, |r| r.writer_count -= 1);
        if self.is_reentrant_() && self.record_().writer_count > 0 {
            return Result::Ok(());
        }
        core.word_ = core.word_.desire_writer_released();
        core.write_owner_ = Option::None;
        self.exit_and_wake_(core);
        Result::Ok(())
    }

    // ------------------------------------------------------------------
    // Upgradeable read
    // ------------------------------------------------------------------

    /// Blocks until the calling thread holds the upgradeable read lock: a
    /// read that reserves the right to become the writer without losing its
    /// place in line. At most one thread holds it at a time.
    pub fn enter_upgradeable_read(&self) -> LockResult<()> {
        let entered = self.try_enter_upgradeable_read_core_(
            &TimeoutTracker::new(Timeout::Infinite),
        )?;
        debug_assert!(entered);
        Result::Ok(())
    }

    pub fn try_enter_upgradeable_read(&self, timeout: Timeout) -> LockResult<bool> {
        self.try_enter_upgradeable_read_core_(&TimeoutTracker::new(timeout))
    }

    fn try_enter_upgradeable_read_core_(
        &self,
        timeout: &TimeoutTracker,
    ) -> LockResult<bool> {
        let id = thread::current().id();
        let mut core = self.gate_.lock();
        core.check_disposed_()?;

        if !self.is_reentrant_() {
            if core.upgrade_owner_ == Option::Some(id) {
                return Result::Err(LockError::Recursion(K_RECURSIVE_UPGRADE));
            }
            if core.write_owner_ == Option::Some(id) {
                return Result::Err(LockError::Recursion(K_UPGRADE_AFTER_WRITE));
            }
            if self.record_().reader_count > 0 {
                return Result::Err(LockError::Recursion(K_UPGRADE_AFTER_READ));
            }
        } else {
            if core.upgrade_owner_ == Option::Some(id) {
                records_::with_record(self.lock_id_, |r| r.upgrade_count += 1);
                return Result::Ok(true);
            } else if core.write_owner_ == Option::Some(id) {
                // Write → upgrade is part of the legal lattice: take the
                // upgrade seat alongside the held write lock.
                debug_assert!(core.word_.expect_writer_held());
                core.word_ = core.word_.desire_reader_incr();
                core.upgrade_owner_ = Option::Some(id);
                records_::with_record(self.lock_id_, |r| r.upgrade_count += 1);
                if self.record_().reader_count > 0 {
                    core.upgrade_owner_holds_read_ = true;
                }
                return Result::Ok(true);
            } else if self.record_().reader_count > 0 {
                return Result::Err(LockError::Recursion(K_UPGRADE_AFTER_READ));
            }
        }

        let mut spins = 0u32;
        loop {
            if core.upgrade_owner_.is_none()
                && core.word_.expect_reader_headroom()
            {
                core.word_ = core.word_.desire_reader_incr();
                core.upgrade_owner_ = Option::Some(id);
                break;
            }
            if spins < K_MAX_SPIN {
                drop(core);
                if timeout.is_expired() {
                    return Result::Ok(false);
                }
                spins += 1;
                spin_wait(spins);
                core = self.gate_.lock();
                core.check_disposed_()?;
                continue;
            }
            let Option::Some(reacquired) =
                self.wait_on_event_(core, WaitSet::Upgrade, timeout)
            else {
                return Result::Ok(false);
            };
            core = reacquired;
        }
        records_::with_record(self.lock_id_, |r| r.upgrade_count += 1);
        Result::Ok(true)
    }

    /// Releases one upgradeable read lock held by the calling thread.
    pub fn exit_upgradeable_read(&self) -> LockResult<()> {
        let id = thread::current().id();
        let mut core = self.gate_.lock();
        core.check_disposed_()?;

        if core.upgrade_owner_ != Option::Some(id) {
            return Result::Err(LockError::UnmatchedExit(K_UNMATCHED_UPGRADE));
        }
        debug_assert!(self.record_().upgrade_count > 0);
        records_::with_record(self.lock_id_, |r| r.upgrade_count -= 1);
        if self.is_reentrant_() && self.record_().upgrade_count > 0 {
            return Result::Ok(());
        }
        core.upgrade_owner_ = Option::None;
        core.upgrade_owner_holds_read_ = false;
        core.word_ = core.word_.desire_reader_decr();
        self.exit_and_wake_(core);
        Result::Ok(())
    }

    // ------------------------------------------------------------------
    // Wait / wake
    // ------------------------------------------------------------------

    /// Parks the calling thread on `set` until it is signalled or the
    /// timeout budget runs out. The gate is released for the duration of
    /// the wait; on wake it is reacquired and handed back so the caller can
    /// retry. On timeout the waiter count is rolled back and `None` is
    /// returned with no other side effect on lock state.
    fn wait_on_event_<'g>(
        &'g self,
        mut core: GateGuard<'g, Core>,
        set: WaitSet,
        timeout: &TimeoutTracker,
    ) -> Option<GateGuard<'g, Core>> {
        let event = self.event_(set);
        event.reset();
        *core.waiters_mut_(set) += 1;
        // The waiting flags close the reader admission test until the last
        // corresponding waiter has left.
        match set {
            WaitSet::Write if core.num_write_waiters_ == 1 => {
                core.word_ = core.word_.desire_writers_waiting();
            }
            WaitSet::WriteUpgrade if core.num_write_upgrade_waiters_ == 1 => {
                core.word_ = core.word_.desire_upgrader_waiting();
            }
            _ => {}
        }
        drop(core);

        log::trace!(
            "[RawRwLock::wait_on_event_] lock {} parking on {set:?}",
            self.lock_id_,
        );
        let woken = event.wait(timeout);

        let mut core = self.gate_.lock();
        *core.waiters_mut_(set) -= 1;
        if core.num_write_waiters_ == 0 {
            core.word_ = core.word_.desire_writers_not_waiting();
        }
        if core.num_write_upgrade_waiters_ == 0 {
            core.word_ = core.word_.desire_upgrader_not_waiting();
        }
        if woken {
            Option::Some(core)
        } else {
            log::trace!(
                "[RawRwLock::wait_on_event_] lock {} timed out on {set:?}",
                self.lock_id_,
            );
            // The waiting-writer flags this waiter raised are what closed
            // reader admission; with the flags rolled back the remaining
            // waiters must get a fresh wake pass, or readers parked behind
            // a writer that gave up stay parked until some unrelated
            // release.
            self.exit_and_wake_(core);
            Option::None
        }
    }

    /// The wake-selection routine, run on every ownership release. Priority:
    /// a satisfiable upgrade-to-write first, then exactly one writer once
    /// the reader set has drained, then all readers (plus the single
    /// upgrader candidate when the upgrade seat is free).
    fn exit_and_wake_(&self, core: GateGuard<'_, Core>) {
        if core.has_no_waiters_() {
            return;
        }
        let readers = core.word_.reader_count();
        if core.num_write_upgrade_waiters_ > 0
            && (readers == 1 || (readers == 2 && core.upgrade_owner_holds_read_))
        {
            // Only the upgrader's own reservation(s) remain; promote it
            // ahead of any plain writer.
            drop(core);
            self.write_upgrade_event_.set();
            return;
        }
        if readers == 0 && core.num_write_waiters_ > 0 {
            drop(core);
            self.write_event_.set();
            return;
        }
        let wake_readers = core.num_read_waiters_ > 0;
        let wake_upgrader =
            core.num_upgrade_waiters_ > 0 && core.upgrade_owner_.is_none();
        drop(core);
        if wake_readers {
            self.read_event_.set();
        }
        if wake_upgrader {
            self.upgrade_event_.set();
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// True iff the calling thread holds at least one read lock.
    pub fn is_read_lock_held(&self) -> bool {
        self.record_().reader_count > 0
    }

    /// True iff the calling thread holds the write lock.
    pub fn is_write_lock_held(&self) -> bool {
        self.record_().writer_count > 0
    }

    /// True iff the calling thread holds the upgradeable read lock.
    pub fn is_upgradeable_read_lock_held(&self) -> bool {
        self.record_().upgrade_count > 0
    }

    /// Total read locks currently counted, the upgrade owner's implicit
    /// reservation included.
    pub fn current_read_count(&self) -> u32 {
        self.gate_.lock().word_.reader_count()
    }

    /// The calling thread's recursive read depth on this lock.
    pub fn recursive_read_count(&self) -> u32 {
        self.record_().reader_count
    }

    pub fn recursive_write_count(&self) -> u32 {
        self.record_().writer_count
    }

    pub fn recursive_upgrade_count(&self) -> u32 {
        self.record_().upgrade_count
    }

    /// Threads currently parked waiting for a read lock.
    pub fn waiting_read_count(&self) -> u32 {
        self.gate_.lock().num_read_waiters_
    }

    /// Threads currently parked waiting for exclusive ownership.
    ///
    /// A pending upgrade-to-write waiter is included: it is waiting for
    /// the write lock like any other writer and only parks on a separate
    /// condition so that fresh write requests cannot starve it. Reporting
    /// it here keeps a blocked promotion visible to observers; the plain
    /// write waiters alone are `num_write_waiters_`.
    pub fn waiting_write_count(&self) -> u32 {
        let core = self.gate_.lock();
        core.num_write_waiters_ + core.num_write_upgrade_waiters_
    }

    /// Threads currently parked waiting for the upgradeable read lock.
    pub fn waiting_upgrade_count(&self) -> u32 {
        self.gate_.lock().num_upgrade_waiters_
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Retires the lock. Fails with [`LockError::IncorrectDispose`] while
    /// any mode is held or any waiter is parked; succeeds idempotently
    /// otherwise. Every later operation fails with [`LockError::Disposed`].
    pub fn dispose(&self) -> LockResult<()> {
        let mut core = self.gate_.lock();
        if core.disposed_ {
            return Result::Ok(());
        }
        let busy = !core.has_no_waiters_()
            || core.word_.reader_count() > 0
            || core.word_.expect_writer_held()
            || core.upgrade_owner_.is_some();
        if busy {
            return Result::Err(LockError::IncorrectDispose);
        }
        core.disposed_ = true;
        Result::Ok(())
    }
}

impl Default for RawRwLock {
    fn default() -> Self {
        RawRwLock::new(RecursionPolicy::default())
    }
}

impl fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.gate_.lock();
        f.debug_struct("RawRwLock")
            .field("policy", &self.policy_)
            .field("readers", &core.word_.reader_count())
            .field("writer_held", &core.word_.expect_writer_held())
            .field("upgrade_held", &core.upgrade_owner_.is_some())
            .field("disposed", &core.disposed_)
            .finish()
    }
}

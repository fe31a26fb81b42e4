use std::cell::RefCell;

/// Per-{thread, lock} recursion bookkeeping.
///
/// A record counts how many times the calling thread currently holds each of
/// the three modes on one particular lock. It lives in the owning thread's
/// local storage, keyed by the lock's numeric id, and is never shared across
/// threads; the lock's shared state never aliases it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct ThreadLockRecord {
    pub reader_count: u32,
    pub writer_count: u32,
    pub upgrade_count: u32,
}

impl ThreadLockRecord {
    /// An empty record holds nothing and its slot may be recycled for
    /// another lock id.
    pub fn is_empty(&self) -> bool {
        self.reader_count == 0 && self.writer_count == 0 && self.upgrade_count == 0
    }
}

struct RecordSlot {
    lock_id_: u64,
    record_: ThreadLockRecord,
}

thread_local! {
    static RECORDS: RefCell<Vec<RecordSlot>> = const { RefCell::new(Vec::new()) };
}

/// Runs `f` on the calling thread's record for `lock_id`, creating it on
/// demand. Slots left empty by released locks are recycled before the list
/// grows.
///
/// Callers must not hold the result across a blocking wait; every access
/// re-resolves the slot by lock id, so there is no stale-pointer hazard
/// after a park/wake cycle.
pub(super) fn with_record<R>(
    lock_id: u64,
    f: impl FnOnce(&mut ThreadLockRecord) -> R,
) -> R {
    RECORDS.with(|cell| {
        let mut slots = cell.borrow_mut();
        if let Option::Some(pos) =
            slots.iter().position(|s| s.lock_id_ == lock_id)
        {
            return f(&mut slots[pos].record_);
        }
        if let Option::Some(pos) =
            slots.iter().position(|s| s.record_.is_empty())
        {
            let slot = &mut slots[pos];
            slot.lock_id_ = lock_id;
            slot.record_ = ThreadLockRecord::default();
            return f(&mut slot.record_);
        }
        slots.push(RecordSlot {
            lock_id_: lock_id,
            record_: ThreadLockRecord::default(),
        });
        let last = slots.len() - 1;
        f(&mut slots[last].record_)
    })
}

/// Copies out the calling thread's record for `lock_id` without allocating
/// a slot. `None` when the thread has never touched this lock.
pub(super) fn peek_record(lock_id: u64) -> Option<ThreadLockRecord> {
    RECORDS.with(|cell| {
        cell.borrow()
            .iter()
            .find(|s| s.lock_id_ == lock_id)
            .map(|s| s.record_)
    })
}

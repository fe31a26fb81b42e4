use std::{
    sync::{mpsc, Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use super::{
    LockError, RawRwLock, RecursionPolicy, RwLock, Timeout,
};

fn init_env_logger_() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `pred` until it holds, panicking after five seconds.
fn wait_until_(what: &str, mut pred: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !pred() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn raw_read_smoke() {
    init_env_logger_();

    let lock = RawRwLock::new(RecursionPolicy::NoRecursion);
    assert!(!lock.is_read_lock_held());
    assert_eq!(lock.current_read_count(), 0);

    lock.enter_read().unwrap();
    assert!(lock.is_read_lock_held());
    assert!(!lock.is_write_lock_held());
    assert_eq!(lock.current_read_count(), 1);
    assert_eq!(lock.recursive_read_count(), 1);

    lock.exit_read().unwrap();
    assert!(!lock.is_read_lock_held());
    assert_eq!(lock.current_read_count(), 0);

    let r = lock.exit_read();
    assert!(matches!(r, Result::Err(LockError::UnmatchedExit(_))));
}

#[test]
fn raw_write_smoke() {
    init_env_logger_();

    let lock = RawRwLock::default();
    lock.enter_write().unwrap();
    assert!(lock.is_write_lock_held());
    assert_eq!(lock.recursive_write_count(), 1);
    assert_eq!(lock.current_read_count(), 0);

    lock.exit_write().unwrap();
    assert!(!lock.is_write_lock_held());

    let r = lock.exit_write();
    assert!(matches!(r, Result::Err(LockError::UnmatchedExit(_))));
}

#[test]
fn no_recursion_rejects_reentrant_acquisition() {
    init_env_logger_();

    let lock = RawRwLock::new(RecursionPolicy::NoRecursion);

    lock.enter_read().unwrap();
    assert!(matches!(lock.enter_read(), Result::Err(LockError::Recursion(_))));
    assert!(matches!(lock.enter_write(), Result::Err(LockError::Recursion(_))));
    assert!(matches!(
        lock.enter_upgradeable_read(),
        Result::Err(LockError::Recursion(_)),
    ));
    lock.exit_read().unwrap();

    lock.enter_write().unwrap();
    assert!(matches!(lock.enter_write(), Result::Err(LockError::Recursion(_))));
    assert!(matches!(lock.enter_read(), Result::Err(LockError::Recursion(_))));
    assert!(matches!(
        lock.enter_upgradeable_read(),
        Result::Err(LockError::Recursion(_)),
    ));
    lock.exit_write().unwrap();

    lock.enter_upgradeable_read().unwrap();
    assert!(matches!(
        lock.enter_upgradeable_read(),
        Result::Err(LockError::Recursion(_)),
    ));
    lock.exit_upgradeable_read().unwrap();
}

#[test]
fn supports_recursion_counts_nested_modes() {
    init_env_logger_();

    let lock = RawRwLock::new(RecursionPolicy::SupportsRecursion);

    lock.enter_read().unwrap();
    lock.enter_read().unwrap();
    assert_eq!(lock.recursive_read_count(), 2);
    // Only the outermost acquisition is counted on the lock itself.
    assert_eq!(lock.current_read_count(), 1);
    lock.exit_read().unwrap();
    assert_eq!(lock.current_read_count(), 1);
    lock.exit_read().unwrap();
    assert_eq!(lock.current_read_count(), 0);

    lock.enter_write().unwrap();
    lock.enter_write().unwrap();
    assert_eq!(lock.recursive_write_count(), 2);
    lock.exit_write().unwrap();
    assert!(lock.is_write_lock_held());
    lock.exit_write().unwrap();
    assert!(!lock.is_write_lock_held());

    lock.enter_upgradeable_read().unwrap();
    lock.enter_upgradeable_read().unwrap();
    assert_eq!(lock.recursive_upgrade_count(), 2);
    lock.exit_upgradeable_read().unwrap();
    lock.exit_upgradeable_read().unwrap();
    assert!(!lock.is_upgradeable_read_lock_held());
}

#[test]
fn write_after_read_rejected_under_both_policies() {
    init_env_logger_();

    for policy in [RecursionPolicy::NoRecursion, RecursionPolicy::SupportsRecursion] {
        let lock = RawRwLock::new(policy);
        lock.enter_read().unwrap();
        let r = lock.enter_write();
        assert!(
            matches!(r, Result::Err(LockError::Recursion(_))),
            "policy {policy:?}",
        );
        let r = lock.enter_upgradeable_read();
        assert!(
            matches!(r, Result::Err(LockError::Recursion(_))),
            "policy {policy:?}",
        );
        lock.exit_read().unwrap();
    }
}

#[test]
fn supports_recursion_lattice_from_write() {
    init_env_logger_();

    // Holding the write lock, every weaker mode may be acquired.
    let lock = RawRwLock::new(RecursionPolicy::SupportsRecursion);
    lock.enter_write().unwrap();
    lock.enter_upgradeable_read().unwrap();
    lock.enter_read().unwrap();
    assert!(lock.is_write_lock_held());
    assert!(lock.is_upgradeable_read_lock_held());
    assert!(lock.is_read_lock_held());
    lock.exit_read().unwrap();
    lock.exit_upgradeable_read().unwrap();
    lock.exit_write().unwrap();
}

#[test]
fn upgrade_owner_may_read_under_no_recursion() {
    init_env_logger_();

    let lock = RawRwLock::new(RecursionPolicy::NoRecursion);
    lock.enter_upgradeable_read().unwrap();
    assert_eq!(lock.current_read_count(), 1);

    lock.enter_read().unwrap();
    assert_eq!(lock.current_read_count(), 2);
    assert!(matches!(lock.enter_read(), Result::Err(LockError::Recursion(_))));

    lock.exit_read().unwrap();
    lock.exit_upgradeable_read().unwrap();
    assert_eq!(lock.current_read_count(), 0);
}

#[test]
fn try_enter_write_times_out_against_held_write() {
    init_env_logger_();

    let lock = Arc::new(RawRwLock::default());
    let (held_tx, held_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.enter_write().unwrap();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            lock.exit_write().unwrap();
        })
    };
    held_rx.recv().unwrap();

    assert!(!lock.try_enter_write(Timeout::from(Duration::ZERO)).unwrap());
    assert!(!lock
        .try_enter_write(Timeout::from(Duration::from_millis(20)))
        .unwrap());
    assert!(!lock.try_enter_read(Timeout::from(Duration::ZERO)).unwrap());

    release_tx.send(()).unwrap();
    holder.join().unwrap();

    assert!(lock.try_enter_write(Timeout::from(Duration::ZERO)).unwrap());
    lock.exit_write().unwrap();
}

/// The upgradeable read keeps new writers out, upgrades in place, and only
/// after a full release may a fresh writer enter.
#[test]
fn upgrade_holds_off_new_writers() {
    init_env_logger_();

    let lock = Arc::new(RawRwLock::new(RecursionPolicy::NoRecursion));
    let try_write_elsewhere = |lock: &Arc<RawRwLock>| {
        let lock = Arc::clone(lock);
        thread::spawn(move || {
            let entered =
                lock.try_enter_write(Timeout::from(Duration::ZERO)).unwrap();
            if entered {
                lock.exit_write().unwrap();
            }
            entered
        })
        .join()
        .unwrap()
    };

    lock.enter_upgradeable_read().unwrap();
    assert_eq!(lock.current_read_count(), 1);
    assert!(!try_write_elsewhere(&lock));

    // Promotion is immediate since no other reader is counted.
    lock.enter_write().unwrap();
    assert!(lock.is_write_lock_held());
    assert!(!try_write_elsewhere(&lock));

    lock.exit_write().unwrap();
    assert!(!lock.is_write_lock_held());
    assert!(lock.is_upgradeable_read_lock_held());
    assert!(!try_write_elsewhere(&lock));

    lock.exit_upgradeable_read().unwrap();
    assert!(try_write_elsewhere(&lock));
}

/// Once a writer is parked, later read requests queue behind it instead of
/// overtaking it.
#[test]
fn parked_writer_blocks_new_readers() {
    init_env_logger_();

    let lock = Arc::new(RawRwLock::default());
    let (order_tx, order_rx) = mpsc::channel::<&'static str>();

    lock.enter_read().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        let order_tx = order_tx.clone();
        thread::spawn(move || {
            lock.enter_write().unwrap();
            order_tx.send("write").unwrap();
            lock.exit_write().unwrap();
        })
    };
    wait_until_("writer to park", || lock.waiting_write_count() == 1);

    let reader = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.enter_read().unwrap();
            order_tx.send("read").unwrap();
            lock.exit_read().unwrap();
        })
    };
    wait_until_("reader to park", || lock.waiting_read_count() == 1);

    lock.exit_read().unwrap();

    assert_eq!(order_rx.recv().unwrap(), "write");
    assert_eq!(order_rx.recv().unwrap(), "read");
    writer.join().unwrap();
    reader.join().unwrap();
}

/// A pending upgrade-to-write is promoted ahead of a plain writer that was
/// already parked.
#[test]
fn upgrade_promotes_ahead_of_parked_writer() {
    init_env_logger_();

    let lock = Arc::new(RawRwLock::default());
    let (order_tx, order_rx) = mpsc::channel::<&'static str>();

    lock.enter_upgradeable_read().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        let order_tx = order_tx.clone();
        thread::spawn(move || {
            lock.enter_write().unwrap();
            order_tx.send("writer").unwrap();
            lock.exit_write().unwrap();
        })
    };
    wait_until_("writer to park", || lock.waiting_write_count() == 1);

    lock.enter_write().unwrap();
    order_tx.send("upgrade").unwrap();
    lock.exit_write().unwrap();
    lock.exit_upgradeable_read().unwrap();

    assert_eq!(order_rx.recv().unwrap(), "upgrade");
    assert_eq!(order_rx.recv().unwrap(), "writer");
    writer.join().unwrap();
}

/// Under `SupportsRecursion` the upgrade owner may hold one nested read and
/// still promote immediately once no foreign reader is counted.
#[test]
fn reentrant_upgrade_with_nested_read_promotes() {
    init_env_logger_();

    let lock = RawRwLock::new(RecursionPolicy::SupportsRecursion);
    lock.enter_upgradeable_read().unwrap();
    lock.enter_read().unwrap();
    assert_eq!(lock.current_read_count(), 2);

    lock.enter_write().unwrap();
    assert!(lock.is_write_lock_held());
    lock.exit_write().unwrap();

    lock.exit_read().unwrap();
    lock.exit_upgradeable_read().unwrap();
    assert_eq!(lock.current_read_count(), 0);
}

/// Same shape with a contending reader: the promotion parks, and the exit of
/// the last foreign reader wakes it even though two reads stay counted.
#[test]
fn reentrant_upgrade_promotes_when_foreign_reader_exits() {
    init_env_logger_();

    let lock = Arc::new(RawRwLock::new(RecursionPolicy::SupportsRecursion));
    let (held_tx, held_rx) = mpsc::channel::<()>();

    lock.enter_upgradeable_read().unwrap();
    lock.enter_read().unwrap();

    let reader = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.enter_read().unwrap();
            held_tx.send(()).unwrap();
            wait_until_("upgrade to park", || lock.waiting_write_count() == 1);
            lock.exit_read().unwrap();
        })
    };
    held_rx.recv().unwrap();
    assert_eq!(lock.current_read_count(), 3);

    lock.enter_write().unwrap();
    assert_eq!(lock.current_read_count(), 2);
    lock.exit_write().unwrap();
    lock.exit_read().unwrap();
    lock.exit_upgradeable_read().unwrap();
    reader.join().unwrap();
    assert_eq!(lock.current_read_count(), 0);
}

#[test]
fn readers_share_in_parallel() {
    init_env_logger_();

    const K_READERS: u32 = 4;
    let lock = Arc::new(RawRwLock::default());
    let all_in = Arc::new(Barrier::new(K_READERS as usize));
    let all_out = Arc::new(Barrier::new(K_READERS as usize));

    let handles: Vec<_> = (0..K_READERS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let all_in = Arc::clone(&all_in);
            let all_out = Arc::clone(&all_out);
            thread::spawn(move || {
                lock.enter_read().unwrap();
                all_in.wait();
                assert_eq!(lock.current_read_count(), K_READERS);
                all_out.wait();
                lock.exit_read().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(lock.current_read_count(), 0);
}

#[test]
fn writers_are_mutually_exclusive() {
    init_env_logger_();

    const K_WRITERS: usize = 4;
    const K_ROUNDS: usize = 1000;
    let lock = Arc::new(RwLock::new(0usize));

    let handles: Vec<_> = (0..K_WRITERS)
        .map(|_| {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                for _ in 0..K_ROUNDS {
                    let mut g = lock.write().unwrap();
                    *g += 1;
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = Arc::try_unwrap(lock)
        .unwrap_or_else(|_| panic!("lock still shared"))
        .into_inner();
    assert_eq!(total, K_WRITERS * K_ROUNDS);
}

#[test]
fn dispose_lifecycle_smoke() {
    init_env_logger_();

    let lock = RawRwLock::default();
    lock.enter_read().unwrap();
    assert!(matches!(lock.dispose(), Result::Err(LockError::IncorrectDispose)));
    lock.exit_read().unwrap();

    lock.dispose().unwrap();
    lock.dispose().unwrap();

    assert!(matches!(lock.enter_read(), Result::Err(LockError::Disposed)));
    assert!(matches!(lock.enter_write(), Result::Err(LockError::Disposed)));
    assert!(matches!(
        lock.enter_upgradeable_read(),
        Result::Err(LockError::Disposed),
    ));
    assert!(matches!(lock.exit_read(), Result::Err(LockError::Disposed)));
}

#[test]
fn timeout_from_millis_smoke() {
    init_env_logger_();

    assert!(matches!(Timeout::from_millis(-1), Result::Ok(Timeout::Infinite)));
    assert!(matches!(
        Timeout::from_millis(250),
        Result::Ok(Timeout::Bounded(_)),
    ));
    assert!(matches!(
        Timeout::from_millis(-2),
        Result::Err(LockError::InvalidTimeout(-2)),
    ));
}

#[test]
fn guard_upgrade_downgrade_smoke() {
    init_env_logger_();

    let lock = RwLock::new(1usize);
    {
        let mut upg = lock.upgradable_read().unwrap();
        assert_eq!(*upg, 1);
        {
            // Immediate since no other reader is counted.
            let w = upg.try_upgrade(Duration::ZERO).unwrap();
            assert!(w.is_some());
        }
        {
            let mut w = upg.upgrade().unwrap();
            *w = 2;
        }
        assert_eq!(*upg, 2);

        let reader = upg.downgrade();
        assert_eq!(*reader, 2);
        assert!(!lock.raw().is_upgradeable_read_lock_held());
        assert!(lock.raw().is_read_lock_held());
    }
    assert_eq!(lock.raw().current_read_count(), 0);
    assert_eq!(lock.into_inner(), 2);
}

#[test]
fn guard_try_paths_smoke() {
    init_env_logger_();

    let lock = Arc::new(RwLock::new(7i32));
    let g = lock.write().unwrap();

    let observed = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            assert!(lock.try_read(Duration::ZERO).unwrap().is_none());
            assert!(lock.try_write(Duration::ZERO).unwrap().is_none());
            assert!(lock.try_upgradable_read(Duration::ZERO).unwrap().is_none());
        })
    };
    observed.join().unwrap();
    drop(g);

    let r = lock.try_read(Duration::ZERO).unwrap();
    assert_eq!(*r.unwrap(), 7);
}

/// A reader parked behind the waiting-writer flag must be woken when the
/// last writer gives up, not only when some holder releases.
#[test]
fn reader_admitted_after_last_writer_times_out() {
    init_env_logger_();

    let lock = Arc::new(RawRwLock::default());
    lock.enter_read().unwrap();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let entered = lock
                .try_enter_write(Timeout::from(Duration::from_millis(300)))
                .unwrap();
            assert!(!entered);
        })
    };
    wait_until_("writer to park", || lock.waiting_write_count() == 1);

    let reader = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let entered = lock
                .try_enter_read(Timeout::from(Duration::from_secs(10)))
                .unwrap();
            assert!(entered);
            lock.exit_read().unwrap();
        })
    };
    wait_until_("reader to park", || lock.waiting_read_count() == 1);

    // The original read lock is held throughout: only the writer's
    // timeout can let the parked reader through.
    writer.join().unwrap();
    reader.join().unwrap();

    lock.exit_read().unwrap();
}

/// A timed-out writer must leave the lock fully usable by readers.
#[test]
fn write_timeout_leaves_lock_clean() {
    init_env_logger_();

    let lock = Arc::new(RawRwLock::default());
    let (held_tx, held_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.enter_read().unwrap();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            lock.exit_read().unwrap();
        })
    };
    held_rx.recv().unwrap();

    assert!(!lock
        .try_enter_write(Timeout::from(Duration::from_millis(50)))
        .unwrap());
    assert_eq!(lock.waiting_write_count(), 0);

    // The waiting-writer flag must have been rolled back so that new
    // readers are admitted again.
    {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            assert!(lock.try_enter_read(Timeout::from(Duration::ZERO)).unwrap());
            lock.exit_read().unwrap();
        })
        .join()
        .unwrap();
    }

    release_tx.send(()).unwrap();
    holder.join().unwrap();
}

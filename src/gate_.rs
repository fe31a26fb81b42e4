use std::{
    cell::UnsafeCell,
    hint,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicBool, Ordering},
        OnceLock,
    },
    thread,
    time::Duration,
};

/// Passes of tight spinning before the backoff escalates to yielding.
const K_SPIN_PASSES: u32 = 10;
/// Passes (spin included) before the backoff escalates to sleeping.
const K_YIELD_PASSES: u32 = 15;
/// Busy-loop iterations per tight spin pass, scaled by the pass number.
const K_SPIN_CYCLES: u32 = 20;

fn is_multi_core_() -> bool {
    static CORES: OnceLock<usize> = OnceLock::new();
    *CORES.get_or_init(|| {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }) > 1
}

/// Escalating backoff shared by the gate and the optimistic acquisition
/// loops: tight spin first (multi-core only), then yield, then a short
/// sleep. `pass` is the number of failed attempts so far.
pub(super) fn spin_wait(pass: u32) {
    if pass < K_SPIN_PASSES && is_multi_core_() {
        for _ in 0..K_SPIN_CYCLES * (pass + 1) {
            hint::spin_loop();
        }
    } else if pass < K_YIELD_PASSES {
        thread::yield_now();
    } else {
        thread::sleep(Duration::from_millis(1));
    }
}

/// The internal spin lock guarding all shared lock bookkeeping.
///
/// Critical sections under the gate are O(1) bookkeeping only; the gate is
/// never held across a blocking wait. A thread that must park releases the
/// gate first and reacquires it after waking.
pub(super) struct SpinGate<T> {
    flag_: AtomicBool,
    cell_: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinGate<T> {}
unsafe impl<T: Send> Sync for SpinGate<T> {}

impl<T> SpinGate<T> {
    pub const fn new(data: T) -> Self {
        SpinGate {
            flag_: AtomicBool::new(false),
            cell_: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> GateGuard<'_, T> {
        let mut pass = 0u32;
        loop {
            if self.try_lock_() {
                return GateGuard { gate_: self };
            }
            spin_wait(pass);
            pass = pass.wrapping_add(1);
        }
    }

    fn try_lock_(&self) -> bool {
        // The relaxed pre-check keeps the cache line shared while contended.
        !self.flag_.load(Ordering::Relaxed)
            && self
                .flag_
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }
}

pub(super) struct GateGuard<'a, T> {
    gate_: &'a SpinGate<T>,
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        self.gate_.flag_.store(false, Ordering::Release);
    }
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.gate_.cell_.get() }
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.gate_.cell_.get() }
    }
}

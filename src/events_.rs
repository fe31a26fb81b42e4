use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::timeout_::TimeoutTracker;

/// Whether a successful wait consumes the signal.
///
/// `Auto` releases exactly one parked thread per [`WaitEvent::set`] (the
/// writer, upgrader and upgrade-to-write conditions); `Manual` leaves the
/// signal raised so every parked thread gets through (the reader condition),
/// until some later waiter clears it with [`WaitEvent::reset`].
#[derive(Clone, Copy, Debug)]
pub(super) enum ResetMode {
    Auto,
    Manual,
}

/// A wait condition with Win32-event-style sticky signalling.
///
/// The signal is sticky on purpose: a waiter resets the event while it still
/// holds the gate, then releases the gate, then parks. A wake issued in the
/// window between gate release and parking is remembered by the raised
/// signal, so no wakeup is ever missed.
pub(super) struct WaitEvent {
    mode_: ResetMode,
    signal_: Mutex<bool>,
    cond_: Condvar,
}

impl WaitEvent {
    pub const fn new(mode: ResetMode) -> Self {
        WaitEvent {
            mode_: mode,
            signal_: Mutex::new(false),
            cond_: Condvar::new(),
        }
    }

    fn signal_guard_(&self) -> MutexGuard<'_, bool> {
        // The mutex only guards a bool; a poisoned guard is still coherent.
        self.signal_.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the signal. Called by a waiter under the gate, before parking.
    pub fn reset(&self) {
        *self.signal_guard_() = false;
    }

    /// Raises the signal and notifies per the reset mode. Called after the
    /// gate has been released; the sticky signal carries the wake to waiters
    /// that have not finished parking yet.
    pub fn set(&self) {
        *self.signal_guard_() = true;
        match self.mode_ {
            ResetMode::Auto => self.cond_.notify_one(),
            ResetMode::Manual => self.cond_.notify_all(),
        }
    }

    /// Parks until the signal is raised or the timeout budget runs out.
    /// Returns `false` on timeout.
    pub fn wait(&self, timeout: &TimeoutTracker) -> bool {
        let mut signal = self.signal_guard_();
        loop {
            if *signal {
                if matches!(self.mode_, ResetMode::Auto) {
                    *signal = false;
                }
                return true;
            }
            match timeout.remaining() {
                Option::None => {
                    signal = self
                        .cond_
                        .wait(signal)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Option::Some(rem) if rem.is_zero() => return false,
                Option::Some(rem) => {
                    let (g, _) = self
                        .cond_
                        .wait_timeout(signal, rem)
                        .unwrap_or_else(PoisonError::into_inner);
                    signal = g;
                }
            }
        }
    }
}

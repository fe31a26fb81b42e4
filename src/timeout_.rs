use std::time::{Duration, Instant};

use crate::errors_::{LockError, LockResult};

/// Millisecond sentinel accepted by [`Timeout::from_millis`] meaning
/// "block until the lock is acquired".
pub const K_INFINITE_MILLIS: i64 = -1;

/// How long a `try_enter_*` call may block.
///
/// Zero is an immediate try that never parks the thread; any positive
/// duration bounds the whole acquisition attempt, including every
/// intermediate park/wake cycle.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use syncex_rwlock::Timeout;
///
/// assert_eq!(Timeout::from_millis(-1), Ok(Timeout::Infinite));
/// assert_eq!(
///     Timeout::from_millis(20),
///     Ok(Timeout::Bounded(Duration::from_millis(20))),
/// );
/// assert!(Timeout::from_millis(-2).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    Bounded(Duration),
}

impl Timeout {
    /// Validates a raw millisecond count. `-1` is the infinite sentinel;
    /// any other negative value is an input error.
    pub fn from_millis(millis: i64) -> LockResult<Self> {
        if millis == K_INFINITE_MILLIS {
            Result::Ok(Timeout::Infinite)
        } else if millis < 0 {
            Result::Err(LockError::InvalidTimeout(millis))
        } else {
            Result::Ok(Timeout::Bounded(Duration::from_millis(millis as u64)))
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::Bounded(d)
    }
}

/// Converts a timeout budget captured at acquisition start into "how much
/// time remains" for each subsequent park, so that a single budget spans
/// the spin phase and every wait/wake round trip.
#[derive(Clone, Copy, Debug)]
pub(super) struct TimeoutTracker {
    deadline_: Option<Instant>,
}

impl TimeoutTracker {
    pub fn new(timeout: Timeout) -> Self {
        let deadline = match timeout {
            Timeout::Infinite => Option::None,
            // A deadline beyond the representable range degrades to an
            // infinite wait.
            Timeout::Bounded(d) => Instant::now().checked_add(d),
        };
        TimeoutTracker { deadline_: deadline }
    }

    /// `None` means no deadline; `Some(Duration::ZERO)` means expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline_
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Option::Some(rem) if rem.is_zero())
    }
}

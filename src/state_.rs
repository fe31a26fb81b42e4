/// Packed ownership word.
///
/// With the most significant 4 bits reserved for flags, the low 28 bits
/// count current readers (the upgrade owner's implicit read included):
///
/// - bit 31: writer held
/// - bit 30: writers waiting
/// - bit 29: reserved, never set (kept for flag-block symmetry)
/// - bit 28: an upgrade-to-write waiter is pending
///
/// Reader admission is the single comparison `word < K_MAX_READER`: any flag
/// bit pushes the word past the cap, so a held writer, a waiting writer or a
/// pending upgrade all block new readers through the same test. That is the
/// entire writer-priority fairness mechanism.
pub(super) type StateWord = u32;

pub(super) const K_WRITER_HELD: StateWord = 1 << 31;
pub(super) const K_WAITING_WRITERS: StateWord = 1 << 30;
pub(super) const K_WAITING_UPGRADER: StateWord = 1 << 28;
pub(super) const K_READER_MASK: StateWord = (1 << 28) - 1;

/// One below the mask: the mask value itself is a reserved sentinel the
/// count never reaches, so a reader arriving at the cap blocks instead of
/// overflowing into the flag bits.
pub(super) const K_MAX_READER: StateWord = K_READER_MASK - 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct LockWord(StateWord);

impl LockWord {
    pub const fn new() -> Self {
        LockWord(0)
    }

    #[cfg(test)]
    pub const fn from_raw(raw: StateWord) -> Self {
        LockWord(raw)
    }

    // K_WRITER_HELD
    #[inline]
    pub const fn expect_writer_held(self) -> bool {
        self.0 & K_WRITER_HELD == K_WRITER_HELD
    }
    #[inline]
    pub const fn desire_writer_held(self) -> Self {
        LockWord(self.0 | K_WRITER_HELD)
    }
    #[inline]
    pub const fn desire_writer_released(self) -> Self {
        LockWord(self.0 & !K_WRITER_HELD)
    }

    // K_WAITING_WRITERS
    #[inline]
    pub const fn desire_writers_waiting(self) -> Self {
        LockWord(self.0 | K_WAITING_WRITERS)
    }
    #[inline]
    pub const fn desire_writers_not_waiting(self) -> Self {
        LockWord(self.0 & !K_WAITING_WRITERS)
    }

    // K_WAITING_UPGRADER
    #[inline]
    pub const fn desire_upgrader_waiting(self) -> Self {
        LockWord(self.0 | K_WAITING_UPGRADER)
    }
    #[inline]
    pub const fn desire_upgrader_not_waiting(self) -> Self {
        LockWord(self.0 & !K_WAITING_UPGRADER)
    }

    // Reader count
    #[inline]
    pub const fn reader_count(self) -> u32 {
        self.0 & K_READER_MASK
    }
    /// The reader admission test; false whenever the count is at the cap or
    /// any flag bit is set.
    #[inline]
    pub const fn expect_reader_headroom(self) -> bool {
        self.0 < K_MAX_READER
    }
    #[inline]
    pub const fn desire_reader_incr(self) -> Self {
        LockWord(self.0 + 1)
    }
    #[inline]
    pub const fn desire_reader_decr(self) -> Self {
        LockWord(self.0 - 1)
    }

    /// A fresh writer may take the lock iff nothing but the waiting-writers
    /// flag is set: no readers, no held writer, no pending upgrade-to-write.
    #[inline]
    pub const fn expect_writer_acquirable(self) -> bool {
        self.0 & !K_WAITING_WRITERS == 0
    }
}

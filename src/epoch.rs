//! Time-window checks for conditions.
//!
//! A condition carries a time lock (earliest activation) and a time out
//! (deadline), both offsets from the block at which it was created. A
//! time out of `0` means "no deadline".
//!
//! The free functions take a reference time that is already relative to
//! creation. [`Epoch`] keeps the creation block alongside the offsets and
//! does that subtraction for you.

use crate::types::BlockNumber;
use serde::{Deserialize, Serialize};

/// Sentinel time out meaning the window never closes.
pub const NO_TIME_OUT: u64 = 0;

/// Whether an operation gated by `(time_lock, time_out)` is permitted at `reference`.
///
/// Permitted when `reference >= time_lock` and either there is no deadline
/// or `reference < time_out`.
pub fn is_valid(reference: u64, time_lock: u64, time_out: u64) -> bool {
    !is_time_locked(reference, time_lock) && !is_timed_out(reference, time_out)
}

/// Still before the time lock.
pub fn is_time_locked(reference: u64, time_lock: u64) -> bool {
    reference < time_lock
}

/// At or past a non-zero time out.
pub fn is_timed_out(reference: u64, time_out: u64) -> bool {
    time_out != NO_TIME_OUT && reference >= time_out
}

/// A window that can open at some point: no deadline, or lock strictly before it.
pub fn has_valid_margin(time_lock: u64, time_out: u64) -> bool {
    time_out == NO_TIME_OUT || time_lock < time_out
}

/// Time window anchored at a creation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub time_lock: u64,
    pub time_out: u64,
    pub created_at: BlockNumber,
}

impl Epoch {
    pub fn new(time_lock: u64, time_out: u64, created_at: BlockNumber) -> Self {
        Self {
            time_lock,
            time_out,
            created_at,
        }
    }

    /// Blocks elapsed since creation; `0` if `now` is before creation.
    pub fn elapsed(&self, now: BlockNumber) -> u64 {
        now.saturating_sub(self.created_at)
    }

    pub fn is_valid_at(&self, now: BlockNumber) -> bool {
        is_valid(self.elapsed(now), self.time_lock, self.time_out)
    }

    pub fn is_time_locked_at(&self, now: BlockNumber) -> bool {
        is_time_locked(self.elapsed(now), self.time_lock)
    }

    pub fn is_timed_out_at(&self, now: BlockNumber) -> bool {
        is_timed_out(self.elapsed(now), self.time_out)
    }

    /// First absolute block at which the window is open.
    pub fn opens_at(&self) -> BlockNumber {
        self.created_at.saturating_add(self.time_lock)
    }

    /// First absolute block at which the window is closed, if it has a deadline.
    pub fn closes_at(&self) -> Option<BlockNumber> {
        (self.time_out != NO_TIME_OUT).then(|| self.created_at.saturating_add(self.time_out))
    }
}

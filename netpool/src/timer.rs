//! Connection timers.
//!
//! One logical timer per connection, re-armed in place to play the connect,
//! idle, or send role — never more than one role at a time. Entries live in
//! a min-heap that feeds the poller's wait timeout; cancellation is lazy: a
//! fired entry only counts if its sequence number still matches the
//! connection's current one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::pool::SocketId;

#[derive(Debug, PartialEq, Eq)]
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    id: SocketId,
}

// Reversed so the BinaryHeap pops the earliest deadline first.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
}

impl TimerQueue {
    pub fn new() -> TimerQueue {
        TimerQueue::default()
    }

    /// Arm (or re-arm) the timer for `id`. The caller bumps the
    /// connection's sequence first so any previously armed entry goes
    /// stale.
    pub fn arm(&mut self, id: SocketId, seq: u64, after: Duration) {
        self.heap.push(TimerEntry {
            deadline: Instant::now() + after,
            seq,
            id,
        });
    }

    /// Milliseconds until the next deadline, clamped for an epoll timeout.
    /// Negative means "no timers armed, block indefinitely".
    pub fn next_timeout_ms(&self, now: Instant) -> i32 {
        match self.heap.peek() {
            None => -1,
            Some(entry) => {
                let remaining = entry.deadline.saturating_duration_since(now);
                // Round up so we never spin on a deadline that is a few
                // hundred microseconds away.
                let mut ms = remaining.as_millis();
                if remaining.subsec_nanos() % 1_000_000 != 0 {
                    ms += 1;
                }
                ms.min(i32::MAX as u128) as i32
            }
        }
    }

    /// Pop the next expired entry, if any. The caller validates the
    /// sequence number against the owning connection.
    pub fn pop_expired(&mut self, now: Instant) -> Option<(SocketId, u64)> {
        match self.heap.peek() {
            Some(entry) if entry.deadline <= now => {
                let entry = self.heap.pop().unwrap();
                Some((entry.id, entry.seq))
            }
            _ => None,
        }
    }
}

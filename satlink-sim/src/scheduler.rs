//! Discrete-event scheduler
//!
//! Events are delivered strictly in timestamp order. Events scheduled for the
//! same instant come out in the order they were scheduled.

use satlink_protocol::time::Timestamp;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

struct Entry<E> {
    at: Timestamp,
    id: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.id).cmp(&(other.at, other.id))
    }
}

/// Event queue with a simulated clock
pub struct Scheduler<E> {
    now: Timestamp,
    next_id: u64,
    queue: BinaryHeap<Reverse<Entry<E>>>,
}

impl<E> Scheduler<E> {
    /// Create an empty scheduler at time zero
    pub fn new() -> Self {
        Scheduler {
            now: Timestamp::ZERO,
            next_id: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Current simulation time
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Schedule `event` at an absolute time
    ///
    /// A time in the past is treated as now.
    pub fn schedule_at(&mut self, at: Timestamp, event: E) {
        let at = at.max(self.now);
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Reverse(Entry { at, id, event }));
    }

    /// Schedule `event` after a delay
    pub fn schedule_after(&mut self, after: Duration, event: E) {
        self.schedule_at(self.now + after, event);
    }

    /// Time of the next pending event
    pub fn peek_time(&self) -> Option<Timestamp> {
        self.queue.peek().map(|Reverse(entry)| entry.at)
    }

    /// Remove the next event and advance the clock to it
    pub fn pop(&mut self) -> Option<(Timestamp, E)> {
        let Reverse(entry) = self.queue.pop()?;
        self.now = entry.at;
        Some((entry.at, entry.event))
    }

    /// Remove the next event if it is due no later than `until`
    pub fn pop_until(&mut self, until: Timestamp) -> Option<(Timestamp, E)> {
        match self.peek_time() {
            Some(at) if at <= until => self.pop(),
            _ => None,
        }
    }

    /// Advance the clock without processing events
    pub fn advance_to(&mut self, at: Timestamp) {
        self.now = self.now.max(at);
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if no events are pending
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

//! Timer liveness tracking
//!
//! The host scheduler only promises to call back after a delay; it cannot be
//! relied upon to forget a timer once the engine loses interest in it. Each
//! armed timer therefore gets a [`TimerHandle`] made of a slot index and a
//! generation counter. Cancelling or expiring a timer bumps the generation,
//! so a late callback carrying the old handle is recognised and ignored.

use crate::context::LinkContext;
use crate::sequence::ArqSeqNo;
use std::fmt;
use std::time::Duration;

/// Opaque reference to an armed timer
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    index: u32,
    generation: u32,
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerHandle({}#{})", self.index, self.generation)
    }
}

/// What a timer was armed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Forced-advance timer of the reordering window
    Reordering,
    /// Retransmission timer of an in-flight ARQ PDU
    Retransmit(ArqSeqNo),
    /// Waiting timer of a missing ARQ PDU at the receiver (continuous counter)
    RxWaiting(u64),
}

#[derive(Debug)]
struct Slot<K> {
    generation: u32,
    kind: Option<K>,
}

/// Arena of armed timers
#[derive(Debug)]
pub struct TimerArena<K> {
    slots: Vec<Slot<K>>,
    free: Vec<u32>,
    live: usize,
}

impl<K: Copy> TimerArena<K> {
    /// Create an empty arena
    pub fn new() -> Self {
        TimerArena {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Register a new live timer
    pub fn arm(&mut self, kind: K) -> TimerHandle {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.kind = Some(kind);
            return TimerHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            kind: Some(kind),
        });
        TimerHandle {
            index,
            generation: 0,
        }
    }

    /// Register a new live timer and ask the host to fire it after `after`
    pub fn start<C: LinkContext>(&mut self, kind: K, after: Duration, cx: &mut C) -> TimerHandle {
        let handle = self.arm(kind);
        cx.schedule(handle, after);
        handle
    }

    /// Check whether `handle` still refers to a live timer
    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .map(|slot| slot.generation == handle.generation && slot.kind.is_some())
            .unwrap_or(false)
    }

    /// Logically cancel a timer
    ///
    /// Returns false if the handle was already stale.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.retire(handle).is_some()
    }

    /// Consume a fired timer, returning what it was armed for
    ///
    /// Returns `None` for a stale handle (cancelled, already fired, or never
    /// issued by this arena).
    pub fn expire(&mut self, handle: TimerHandle) -> Option<K> {
        self.retire(handle)
    }

    /// Number of live timers
    pub fn live(&self) -> usize {
        self.live
    }

    fn retire(&mut self, handle: TimerHandle) -> Option<K> {
        if !self.is_live(handle) {
            return None;
        }

        let slot = &mut self.slots[handle.index as usize];
        let kind = slot.kind.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        kind
    }
}

impl<K: Copy> Default for TimerArena<K> {
    fn default() -> Self {
        Self::new()
    }
}

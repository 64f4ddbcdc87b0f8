//! Host context
//!
//! The engine is a pure state machine driven by a discrete-event host. Each
//! operation that can produce a side effect receives the host through this
//! trait: current time, timer requests, upward delivery and the ack channel.

use crate::ack::AckMessage;
use crate::time::Timestamp;
use crate::timer::TimerHandle;
use bytes::Bytes;
use std::time::Duration;

/// Services the surrounding simulation provides to one engine instance
pub trait LinkContext {
    /// Current simulation time
    fn now(&self) -> Timestamp;

    /// Call the engine's `on_timer` with `timer` once `after` has elapsed
    ///
    /// The engine may lose interest in a timer before it fires. The host is
    /// free to fire it anyway; stale handles are ignored.
    fn schedule(&mut self, timer: TimerHandle, after: Duration);

    /// Hand a reassembled SDU to the upper layer
    fn deliver(&mut self, sdu: Bytes);

    /// Send an acknowledgment on the control channel
    fn send_ack(&mut self, ack: AckMessage);
}

impl<C: LinkContext + ?Sized> LinkContext for &mut C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn schedule(&mut self, timer: TimerHandle, after: Duration) {
        (**self).schedule(timer, after)
    }

    fn deliver(&mut self, sdu: Bytes) {
        (**self).deliver(sdu)
    }

    fn send_ack(&mut self, ack: AckMessage) {
        (**self).send_ack(ack)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Context that records every side effect for inspection
    #[derive(Default)]
    pub(crate) struct RecordingContext {
        pub now: Timestamp,
        pub scheduled: Vec<(TimerHandle, Duration)>,
        pub delivered: Vec<Bytes>,
        pub acks: Vec<AckMessage>,
    }

    impl RecordingContext {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn delivered_strs(&self) -> Vec<String> {
            self.delivered
                .iter()
                .map(|sdu| String::from_utf8_lossy(sdu).into_owned())
                .collect()
        }

        pub fn last_timer(&self) -> TimerHandle {
            self.scheduled.last().map(|(t, _)| *t).expect("no timer scheduled")
        }
    }

    impl LinkContext for RecordingContext {
        fn now(&self) -> Timestamp {
            self.now
        }

        fn schedule(&mut self, timer: TimerHandle, after: Duration) {
            self.scheduled.push((timer, after));
        }

        fn deliver(&mut self, sdu: Bytes) {
            self.delivered.push(sdu);
        }

        fn send_ack(&mut self, ack: AckMessage) {
            self.acks.push(ack);
        }
    }
}

//! Shared host for the integration tests
//!
//! [`Host`] implements the engine's context with a plain timer list, so a
//! test can drive one engine step by step and move time forward by hand.

#![allow(dead_code)]

use bytes::Bytes;
use satlink_protocol::{
    AckMessage, FramingInfo, LinkContext, LinkEngine, LinkError, Segment, Sn10, TimerHandle,
    Timestamp,
};
use std::time::Duration;

#[derive(Default)]
pub struct Host {
    pub now: Timestamp,
    pub delivered: Vec<Bytes>,
    pub acks: Vec<AckMessage>,
    pub scheduled: usize,
    pending: Vec<(Timestamp, TimerHandle)>,
    last: Option<TimerHandle>,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the most recently scheduled timer
    pub fn last_timer(&self) -> TimerHandle {
        self.last.expect("no timer scheduled")
    }

    pub fn pending_timers(&self) -> usize {
        self.pending.len()
    }

    /// Remove and return the timers due at the current time, earliest first
    pub fn take_due(&mut self) -> Vec<TimerHandle> {
        let now = self.now;
        let mut due: Vec<_> = self.pending.iter().copied().filter(|(at, _)| *at <= now).collect();
        self.pending.retain(|(at, _)| *at > now);
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Move time forward and fire every timer that became due
    pub fn advance(&mut self, by: Duration, engine: &mut LinkEngine) -> Result<(), LinkError> {
        self.now = self.now + by;
        for handle in self.take_due() {
            engine.on_timer(handle, self)?;
        }
        Ok(())
    }

    /// Jump from timer to timer until none is pending, at most `limit` times
    pub fn run_timers(&mut self, engine: &mut LinkEngine, limit: usize) -> Result<(), LinkError> {
        for _ in 0..limit {
            let Some(at) = self.pending.iter().map(|(at, _)| *at).min() else {
                return Ok(());
            };
            self.now = self.now.max(at);
            for handle in self.take_due() {
                engine.on_timer(handle, self)?;
            }
        }
        Ok(())
    }

    pub fn delivered_strs(&self) -> Vec<String> {
        self.delivered
            .iter()
            .map(|sdu| String::from_utf8_lossy(sdu).into_owned())
            .collect()
    }
}

impl LinkContext for Host {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn schedule(&mut self, timer: TimerHandle, after: Duration) {
        self.scheduled += 1;
        self.last = Some(timer);
        self.pending.push((self.now + after, timer));
    }

    fn deliver(&mut self, sdu: Bytes) {
        self.delivered.push(sdu);
    }

    fn send_ack(&mut self, ack: AckMessage) {
        self.acks.push(ack);
    }
}

/// SDU of `len` bytes whose first eight bytes carry `index`
pub fn sdu(index: usize, len: usize) -> Bytes {
    let mut data = format!("{index:08}").into_bytes();
    data.resize(len.max(8), b'.');
    Bytes::from(data)
}

/// Index written into an SDU by [`sdu`]
pub fn sdu_index(sdu: &Bytes) -> usize {
    std::str::from_utf8(&sdu[..8])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .expect("SDU without index prefix")
}

/// Unacknowledged-mode frame carrying one whole SDU
pub fn full_frame(seq: u16, text: &str) -> Bytes {
    Segment::new(Sn10::new(seq), FramingInfo::FULL, vec![Bytes::from(text.to_string())])
        .to_bytes()
        .expect("encodable segment")
}

/// Collect frames from `engine` until it has nothing more to send
pub fn drain(engine: &mut LinkEngine, budget: usize, host: &mut Host) -> Result<Vec<Bytes>, LinkError> {
    let mut frames = Vec::new();
    while let Some(frame) = engine.notify_tx_opportunity(budget, host)? {
        frames.push(frame);
    }
    Ok(frames)
}

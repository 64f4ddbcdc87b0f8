//! Receive-side reordering window
//!
//! Segments may arrive out of order. The window holds them until the gap
//! before them fills, then hands them to the [`Reassembler`] in sequence
//! order. Three markers drive it:
//!
//! - `low`: the oldest sequence number still awaited
//! - `high`: one past the highest sequence number received
//! - `target`: the `high` value recorded when the forced-advance timer started
//!
//! A segment beyond the window pushes it forward and flushes whatever falls
//! off its trailing edge. When a gap persists for the timer duration, `low`
//! is forced past it and the missing segments count as lost.

use crate::context::LinkContext;
use crate::reassembly::{Reassembler, ReassemblyError};
use crate::segment::Segment;
use crate::sequence::Sn10;
use crate::timer::{TimerArena, TimerHandle, TimerKind};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Reordering window over the 10-bit segment sequence space
#[derive(Debug)]
pub struct ReorderingWindow {
    window_size: u16,
    timeout: Duration,
    low: Sn10,
    high: Sn10,
    target: Sn10,
    slots: Vec<Option<Segment>>,
    timer: Option<TimerHandle>,
    reassembler: Reassembler,
}

impl ReorderingWindow {
    /// Create a window of `window_size` sequence numbers
    ///
    /// `window_size` must not exceed half the sequence space.
    pub fn new(window_size: u16, timeout: Duration) -> Self {
        ReorderingWindow {
            window_size,
            timeout,
            low: Sn10::new(0),
            high: Sn10::new(0),
            target: Sn10::new(0),
            slots: vec![None; Sn10::MODULUS as usize],
            timer: None,
            reassembler: Reassembler::new(),
        }
    }

    /// Oldest sequence number still awaited
    pub fn low_watermark(&self) -> Sn10 {
        self.low
    }

    /// One past the highest sequence number received
    pub fn high_watermark(&self) -> Sn10 {
        self.high
    }

    /// Span between the watermarks; never exceeds the window size
    pub fn span(&self) -> u16 {
        self.high.distance_from(self.low)
    }

    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    /// Check if the forced-advance timer is running
    pub fn timer_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Number of segments held back
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Trailing edge of the window
    fn low_edge(&self) -> Sn10 {
        self.high - self.window_size
    }

    fn in_window(&self, seq: Sn10) -> bool {
        let base = self.low_edge();
        seq.lt(self.high, base)
    }

    /// Accept one segment
    ///
    /// Returns false when the segment was discarded as a duplicate or as
    /// older than the window.
    pub fn receive<C: LinkContext>(
        &mut self,
        segment: Segment,
        timers: &mut TimerArena<TimerKind>,
        cx: &mut C,
    ) -> Result<bool, ReassemblyError> {
        let seq = segment.seq;
        let base = self.low_edge();

        let duplicate = self.low.lt(seq, base)
            && seq.lt(self.high, base)
            && self.slots[seq.index()].is_some();
        let too_old = seq.lt(self.low, base);
        if duplicate || too_old {
            debug!(
                seq = seq.as_raw(),
                low = self.low.as_raw(),
                high = self.high.as_raw(),
                duplicate,
                "discarding segment"
            );
            return Ok(false);
        }

        trace!(seq = seq.as_raw(), low = self.low.as_raw(), high = self.high.as_raw(), "storing segment");
        self.slots[seq.index()] = Some(segment);

        if !self.in_window(seq) {
            self.high = seq.next();
            if !self.in_window(self.low) {
                let edge = self.low_edge();
                self.flush(self.low, edge, cx)?;
                self.low = edge;
            }
        }

        if self.slots[self.low.index()].is_some() {
            let from = self.low;
            let gap = self.first_gap(from);
            self.flush(from, gap, cx)?;
            self.low = gap;
        }

        self.update_timer(timers, cx);
        Ok(true)
    }

    /// Handle expiry of the forced-advance timer
    pub fn on_timeout<C: LinkContext>(
        &mut self,
        handle: TimerHandle,
        timers: &mut TimerArena<TimerKind>,
        cx: &mut C,
    ) -> Result<(), ReassemblyError> {
        if self.timer != Some(handle) {
            warn!(?handle, "reordering timeout for a timer that is not running");
            return Ok(());
        }
        self.timer = None;

        let from = self.low;
        let gap = self.first_gap(self.target);
        debug!(
            from = from.as_raw(),
            to = gap.as_raw(),
            "forcing reordering window past a gap"
        );
        self.flush(from, gap, cx)?;
        self.low = gap;

        let base = self.low_edge();
        if self.low.lt(self.high, base) {
            self.start_timer(timers, cx);
        }
        Ok(())
    }

    fn update_timer<C: LinkContext>(&mut self, timers: &mut TimerArena<TimerKind>, cx: &mut C) {
        let base = self.low_edge();

        if let Some(handle) = self.timer {
            let caught_up = self.target.le(self.low, base);
            let outside = !self.in_window(self.target) && self.target != self.high;
            if caught_up || outside {
                trace!(target = self.target.as_raw(), "stopping reordering timer");
                timers.cancel(handle);
                self.timer = None;
            }
        }

        if self.timer.is_none() && self.low.lt(self.high, base) {
            self.start_timer(timers, cx);
        }
    }

    fn start_timer<C: LinkContext>(&mut self, timers: &mut TimerArena<TimerKind>, cx: &mut C) {
        self.target = self.high;
        self.timer = Some(timers.start(TimerKind::Reordering, self.timeout, cx));
        trace!(target = self.target.as_raw(), "reordering timer started");
    }

    /// First sequence number at or after `from` that has not been received
    fn first_gap(&self, from: Sn10) -> Sn10 {
        let mut seq = from;
        while self.slots[seq.index()].is_some() {
            seq.increment();
        }
        seq
    }

    /// Reassemble every held segment in `[from, to)`, in order
    fn flush<C: LinkContext>(&mut self, from: Sn10, to: Sn10, cx: &mut C) -> Result<(), ReassemblyError> {
        let mut seq = from;
        while seq != to {
            if let Some(segment) = self.slots[seq.index()].take() {
                self.reassembler.process(segment, cx)?;
            }
            seq.increment();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::RecordingContext;
    use crate::segment::FramingInfo;
    use bytes::Bytes;

    fn full(seq: u16) -> Segment {
        Segment::new(
            Sn10::new(seq),
            FramingInfo::FULL,
            vec![Bytes::from(format!("sdu-{seq}"))],
        )
    }

    struct Fixture {
        window: ReorderingWindow,
        timers: TimerArena<TimerKind>,
        cx: RecordingContext,
    }

    impl Fixture {
        fn new(window_size: u16) -> Self {
            Fixture {
                window: ReorderingWindow::new(window_size, Duration::from_millis(100)),
                timers: TimerArena::new(),
                cx: RecordingContext::new(),
            }
        }

        fn receive(&mut self, seq: u16) -> bool {
            self.window
                .receive(full(seq), &mut self.timers, &mut self.cx)
                .unwrap()
        }

        fn fire_timer(&mut self) {
            let handle = self.cx.last_timer();
            if self.timers.expire(handle).is_some() {
                self.window
                    .on_timeout(handle, &mut self.timers, &mut self.cx)
                    .unwrap();
            }
        }

        fn delivered(&self) -> Vec<String> {
            self.cx.delivered_strs()
        }
    }

    #[test]
    fn test_in_order_delivery() {
        let mut f = Fixture::new(8);
        for seq in 0..5 {
            assert!(f.receive(seq));
        }
        assert_eq!(f.delivered(), vec!["sdu-0", "sdu-1", "sdu-2", "sdu-3", "sdu-4"]);
        assert!(!f.window.timer_running());
        assert_eq!(f.window.low_watermark(), Sn10::new(5));
    }

    #[test]
    fn test_swapped_pairs_window_four() {
        let mut f = Fixture::new(4);
        for seq in [1, 0, 3, 2] {
            f.receive(seq);
        }

        assert_eq!(f.delivered(), vec!["sdu-0", "sdu-1", "sdu-2", "sdu-3"]);
        assert_eq!(f.window.buffered(), 0);
        assert!(!f.window.timer_running());
    }

    #[test]
    fn test_gap_filled_later() {
        let mut f = Fixture::new(512);
        for seq in 0..3 {
            f.receive(seq);
        }

        f.receive(5);
        assert_eq!(f.delivered().len(), 3);
        assert!(f.window.timer_running());

        f.receive(3);
        f.receive(4);
        assert_eq!(
            f.delivered(),
            vec!["sdu-0", "sdu-1", "sdu-2", "sdu-3", "sdu-4", "sdu-5"]
        );
        assert!(!f.window.timer_running());
    }

    #[test]
    fn test_duplicate_and_old_segments_discarded() {
        let mut f = Fixture::new(8);
        f.receive(0);
        f.receive(2);

        // Stored but not yet delivered
        assert!(!f.receive(2));
        // Already delivered
        assert!(!f.receive(0));

        f.receive(1);
        assert_eq!(f.delivered(), vec!["sdu-0", "sdu-1", "sdu-2"]);
        assert!(!f.receive(1));
    }

    #[test]
    fn test_forced_advance_on_timeout() {
        let mut f = Fixture::new(512);
        f.receive(0);
        f.receive(2);
        f.receive(3);
        assert!(f.window.timer_running());

        f.fire_timer();
        assert_eq!(f.delivered(), vec!["sdu-0", "sdu-2", "sdu-3"]);
        assert_eq!(f.window.low_watermark(), Sn10::new(4));
        assert!(!f.window.timer_running());

        // The lost segment is now too old
        assert!(!f.receive(1));
    }

    #[test]
    fn test_timeout_restarts_when_gap_remains() {
        let mut f = Fixture::new(512);
        f.receive(1);
        f.receive(3);
        assert!(f.window.timer_running());

        // Timer targets 2: advances past the gap at 0, stops at the gap at 2
        f.fire_timer();
        assert_eq!(f.delivered(), vec!["sdu-1"]);
        assert_eq!(f.window.low_watermark(), Sn10::new(2));
        assert!(f.window.timer_running());

        f.fire_timer();
        assert_eq!(f.delivered(), vec!["sdu-1", "sdu-3"]);
        assert!(!f.window.timer_running());
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut f = Fixture::new(512);
        f.receive(1);
        let handle = f.cx.last_timer();
        f.receive(0);
        assert!(!f.window.timer_running());

        // Host fires the cancelled timer anyway
        assert_eq!(f.timers.expire(handle), None);
        f.window
            .on_timeout(handle, &mut f.timers, &mut f.cx)
            .unwrap();
        assert_eq!(f.delivered(), vec!["sdu-0", "sdu-1"]);
    }

    #[test]
    fn test_jump_beyond_window_flushes_trailing_edge() {
        let mut f = Fixture::new(4);
        f.receive(0);
        f.receive(2);
        assert_eq!(f.window.low_watermark(), Sn10::new(1));

        // Window becomes [6, 10): 2 falls off the trailing edge
        f.receive(9);
        assert_eq!(f.delivered(), vec!["sdu-0", "sdu-2"]);
        assert_eq!(f.window.low_watermark(), Sn10::new(6));
        assert!(f.window.span() <= 4);
    }

    #[test]
    fn test_wraparound() {
        let mut f = Fixture::new(16);
        for seq in 0..1024 {
            f.receive(seq);
        }
        f.receive(1);
        f.receive(0);
        assert_eq!(f.delivered().len(), 1026);
        assert_eq!(f.window.low_watermark(), Sn10::new(2));
    }

    #[test]
    fn test_span_never_exceeds_window() {
        let mut f = Fixture::new(32);
        let pattern = [0u16, 5, 3, 40, 39, 100, 2, 101, 70, 130, 129, 200, 1000, 1020, 3, 7];
        for seq in pattern {
            f.receive(seq);
            assert!(f.window.span() <= 32, "span {} after {}", f.window.span(), seq);
        }
    }
}

//! Two-endpoint link simulation
//!
//! [`LinkPair`] connects two [`LinkEngine`]s through a [`Channel`] in each
//! direction and drives them from a [`Scheduler`]. Data frames cross the
//! lossy channel; acknowledgments travel on a separate control path that is
//! reliable and has a fixed delay. Each endpoint is offered a transmission
//! opportunity every frame interval, sized by its [`RateLimiter`].

use crate::channel::{Channel, ChannelConfig, ChannelStats};
use crate::rate::RateLimiter;
use crate::scheduler::Scheduler;
use bytes::Bytes;
use satlink_protocol::ack::AckMessage;
use satlink_protocol::config::LinkConfig;
use satlink_protocol::context::LinkContext;
use satlink_protocol::engine::{LinkEngine, LinkError, LinkStats};
use satlink_protocol::time::Timestamp;
use satlink_protocol::timer::TimerHandle;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Simulation errors
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Endpoint {side} failed: {source}")]
    Link {
        side: Side,
        #[source]
        source: LinkError,
    },
}

/// One end of the simulated link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Terminal
    A,
    /// Gateway
    B,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    /// The other end
    pub fn peer(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// Simulation events
#[derive(Debug, Clone)]
pub enum Event {
    /// Upper layer hands an SDU to `side`
    Enqueue { side: Side, sdu: Bytes },
    /// The MAC offers `side` a transmission opportunity
    TxOpportunity { side: Side },
    /// A data frame reaches `to`
    Frame { to: Side, frame: Bytes },
    /// An acknowledgment reaches `to`
    Control { to: Side, message: Bytes },
    /// A timer armed by the engine at `side` fires
    Timer { side: Side, handle: TimerHandle },
}

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Engine configuration, shared by both endpoints
    pub link: LinkConfig,
    /// Channel model, used for both directions
    pub channel: ChannelConfig,
    /// Spacing of transmission opportunities
    pub frame_interval: Duration,
    /// Upper bound of a single opportunity
    pub max_frame_bytes: usize,
    /// Capacity granted to each endpoint
    pub rate_bps: u64,
    /// Delay of the acknowledgment path
    pub ack_delay: Duration,
    /// Seed of the channel models
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            link: LinkConfig::default(),
            channel: ChannelConfig::default(),
            frame_interval: Duration::from_millis(10),
            max_frame_bytes: 599,
            rate_bps: 512_000,
            ack_delay: Duration::from_millis(270),
            seed: 1,
        }
    }
}

struct Endpoint {
    engine: LinkEngine,
    limiter: RateLimiter,
    delivered: Vec<Bytes>,
}

/// Host context handed to one endpoint's engine
struct HostContext<'a> {
    side: Side,
    now: Timestamp,
    ack_delay: Duration,
    scheduler: &'a mut Scheduler<Event>,
    delivered: &'a mut Vec<Bytes>,
}

impl LinkContext for HostContext<'_> {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn schedule(&mut self, timer: TimerHandle, after: Duration) {
        self.scheduler.schedule_after(
            after,
            Event::Timer {
                side: self.side,
                handle: timer,
            },
        );
    }

    fn deliver(&mut self, sdu: Bytes) {
        trace!(side = %self.side, len = sdu.len(), "SDU delivered");
        self.delivered.push(sdu);
    }

    fn send_ack(&mut self, ack: AckMessage) {
        self.scheduler.schedule_after(
            self.ack_delay,
            Event::Control {
                to: self.side.peer(),
                message: ack.to_bytes(),
            },
        );
    }
}

/// Summary of a simulation run
#[derive(Debug, Clone)]
pub struct SimReport {
    pub end_time: Timestamp,
    pub stats: [LinkStats; 2],
    pub channels: [ChannelStats; 2],
    pub delivered: [usize; 2],
}

impl SimReport {
    pub fn stats(&self, side: Side) -> &LinkStats {
        &self.stats[side.index()]
    }

    /// Counters of the channel carrying frames sent by `side`
    pub fn channel(&self, side: Side) -> &ChannelStats {
        &self.channels[side.index()]
    }
}

/// Two engines connected by a simulated satellite link
pub struct LinkPair {
    config: SimConfig,
    scheduler: Scheduler<Event>,
    endpoints: [Endpoint; 2],
    channels: [Channel; 2],
    pending_enqueues: usize,
    in_flight: usize,
}

impl LinkPair {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let endpoint = |side: Side| -> Result<Endpoint, SimError> {
            let engine = LinkEngine::new(config.link.clone())
                .map_err(|source| SimError::Link { side, source })?;
            Ok(Endpoint {
                engine,
                limiter: RateLimiter::new(config.rate_bps, config.max_frame_bytes as u64),
                delivered: Vec::new(),
            })
        };
        let endpoints = [endpoint(Side::A)?, endpoint(Side::B)?];

        let channels = [
            Channel::new(config.channel.clone(), config.seed),
            Channel::new(config.channel.clone(), config.seed.wrapping_add(1)),
        ];

        let mut scheduler = Scheduler::new();
        for side in [Side::A, Side::B] {
            scheduler.schedule_at(Timestamp::ZERO, Event::TxOpportunity { side });
        }

        Ok(LinkPair {
            config,
            scheduler,
            endpoints,
            channels,
            pending_enqueues: 0,
            in_flight: 0,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.scheduler.now()
    }

    pub fn engine(&self, side: Side) -> &LinkEngine {
        &self.endpoints[side.index()].engine
    }

    /// SDUs delivered to the upper layer at `side`, in delivery order
    pub fn delivered(&self, side: Side) -> &[Bytes] {
        &self.endpoints[side.index()].delivered
    }

    /// Schedule an SDU for `side` to send at time `at`
    pub fn enqueue_at(&mut self, at: Timestamp, side: Side, sdu: Bytes) {
        self.pending_enqueues += 1;
        self.scheduler.schedule_at(at, Event::Enqueue { side, sdu });
    }

    /// Process every event due up to and including `until`
    pub fn run_until(&mut self, until: Timestamp) -> Result<(), SimError> {
        while let Some((now, event)) = self.scheduler.pop_until(until) {
            self.handle(now, event)?;
        }
        self.scheduler.advance_to(until);
        Ok(())
    }

    /// Run until both endpoints have nothing left to send, or `deadline`
    ///
    /// Returns true if the link went idle before the deadline.
    pub fn run_until_idle(&mut self, deadline: Timestamp) -> Result<bool, SimError> {
        while let Some((now, event)) = self.scheduler.pop_until(deadline) {
            self.handle(now, event)?;
            if self.is_idle() {
                info!(now = %now, "link idle");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Nothing left to send, nothing in flight and no timer that could still
    /// release held-back data
    pub fn is_idle(&self) -> bool {
        self.pending_enqueues == 0
            && self.in_flight == 0
            && self.endpoints.iter().all(|endpoint| {
                endpoint.engine.tx_buffer_size_bytes() == 0 && endpoint.engine.live_timers() == 0
            })
    }

    pub fn report(&self) -> SimReport {
        SimReport {
            end_time: self.scheduler.now(),
            stats: [
                self.endpoints[0].engine.stats().clone(),
                self.endpoints[1].engine.stats().clone(),
            ],
            channels: [
                self.channels[0].stats().clone(),
                self.channels[1].stats().clone(),
            ],
            delivered: [
                self.endpoints[0].delivered.len(),
                self.endpoints[1].delivered.len(),
            ],
        }
    }

    fn handle(&mut self, now: Timestamp, event: Event) -> Result<(), SimError> {
        match event {
            Event::Enqueue { side, sdu } => {
                self.pending_enqueues -= 1;
                let endpoint = &mut self.endpoints[side.index()];
                if let Err(err) = endpoint.engine.enqueue(sdu, now) {
                    debug!(side = %side, %err, "SDU rejected");
                }
            }
            Event::TxOpportunity { side } => {
                self.tx_opportunity(side, now)?;
                self.scheduler
                    .schedule_after(self.config.frame_interval, Event::TxOpportunity { side });
            }
            Event::Frame { to, frame } => {
                self.in_flight -= 1;
                let ack_delay = self.config.ack_delay;
                let Endpoint { engine, delivered, .. } = &mut self.endpoints[to.index()];
                let mut cx = HostContext {
                    side: to,
                    now,
                    ack_delay,
                    scheduler: &mut self.scheduler,
                    delivered,
                };
                engine
                    .receive_pdu(frame, &mut cx)
                    .map_err(|source| SimError::Link { side: to, source })?;
            }
            Event::Control { to, message } => {
                let engine = &mut self.endpoints[to.index()].engine;
                engine
                    .receive_control(&message)
                    .map_err(|source| SimError::Link { side: to, source })?;
            }
            Event::Timer { side, handle } => {
                let ack_delay = self.config.ack_delay;
                let Endpoint { engine, delivered, .. } = &mut self.endpoints[side.index()];
                let mut cx = HostContext {
                    side,
                    now,
                    ack_delay,
                    scheduler: &mut self.scheduler,
                    delivered,
                };
                engine
                    .on_timer(handle, &mut cx)
                    .map_err(|source| SimError::Link { side, source })?;
            }
        }
        Ok(())
    }

    fn tx_opportunity(&mut self, side: Side, now: Timestamp) -> Result<(), SimError> {
        let ack_delay = self.config.ack_delay;
        let max_frame_bytes = self.config.max_frame_bytes;
        let Endpoint {
            engine,
            limiter,
            delivered,
        } = &mut self.endpoints[side.index()];

        let budget = (limiter.available(now) as usize).min(max_frame_bytes);
        let mut cx = HostContext {
            side,
            now,
            ack_delay,
            scheduler: &mut self.scheduler,
            delivered,
        };
        let frame = engine
            .notify_tx_opportunity(budget, &mut cx)
            .map_err(|source| SimError::Link { side, source })?;

        if let Some(frame) = frame {
            limiter.consume(frame.len(), now);
            if let Some(delay) = self.channels[side.index()].transmit(frame.len()) {
                self.in_flight += 1;
                self.scheduler.schedule_after(
                    delay,
                    Event::Frame {
                        to: side.peer(),
                        frame,
                    },
                );
            }
        }
        Ok(())
    }
}

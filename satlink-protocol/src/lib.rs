//! Satellite Link-Layer Protocol Core
//!
//! This crate implements the segmentation and ARQ engine of a satellite
//! link layer: SDU segmentation into budget-sized segments, the bit-packed
//! segment header, reordering-window reassembly, ARQ retransmission with
//! per-PDU acknowledgments, and the timer bookkeeping that drives both.
//!
//! The engine performs no I/O and owns no clock. A host drives it through
//! [`LinkEngine`] and provides time, timers, delivery and the ack channel
//! through [`LinkContext`].

pub mod ack;
pub mod arq_receiver;
pub mod arq_sender;
pub mod assembler;
pub mod config;
pub mod context;
pub mod engine;
pub mod reassembly;
pub mod reorder;
pub mod segment;
pub mod sequence;
pub mod time;
pub mod timer;

pub use ack::AckMessage;
pub use arq_receiver::{ArqReceiver, ArqRxOutcome};
pub use arq_sender::{ArqSender, ArqTransmission, RetransmitOutcome, RetxContext, SendWindow, Slot};
pub use assembler::{BufferError, SduStatus, SegmentAssembler};
pub use config::{ConfigError, LinkConfig, Mode};
pub use context::LinkContext;
pub use engine::{LinkEngine, LinkError, LinkStats};
pub use reassembly::{Reassembler, ReassemblyError, ReassemblyState};
pub use reorder::ReorderingWindow;
pub use segment::{FrameError, FramingInfo, Segment};
pub use sequence::{Anchored, ArqSeqNo, SeqNumber, Sn10, Unwrapper};
pub use time::Timestamp;
pub use timer::{TimerArena, TimerHandle, TimerKind};

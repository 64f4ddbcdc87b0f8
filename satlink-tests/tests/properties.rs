//! Property-based tests
//!
//! Random SDU sizes, opportunity sizes, loss, duplication and reordering
//! patterns, checked against the delivery guarantees of the engine.

mod common;

use bytes::Bytes;
use common::{drain, sdu, sdu_index, Host};
use proptest::prelude::*;
use satlink_protocol::{
    FramingInfo, LinkConfig, LinkEngine, Reassembler, Segment, SegmentAssembler, Sn10, Timestamp,
};
use std::collections::HashMap;
use std::time::Duration;

/// Delivered SDUs are intact, unique and in their original order
fn assert_ordered_subsequence(sent: &[Bytes], delivered: &[Bytes]) {
    let indices: Vec<usize> = delivered.iter().map(sdu_index).collect();
    assert!(
        indices.windows(2).all(|w| w[0] < w[1]),
        "delivery out of order or duplicated: {indices:?}"
    );
    for (index, data) in indices.iter().zip(delivered) {
        assert_eq!(data, &sent[*index]);
    }
}

/// Swap neighbouring frames where `swaps` says so
fn shuffle_locally(frames: &mut [Bytes], swaps: &[bool]) {
    let mut i = 0;
    while i + 1 < frames.len() {
        if swaps.get(i).copied().unwrap_or(false) {
            frames.swap(i, i + 1);
            i += 2;
        } else {
            i += 1;
        }
    }
}

fn segment_strategy() -> impl Strategy<Value = Segment> {
    (
        0u16..1024,
        any::<bool>(),
        any::<bool>(),
        prop::collection::vec(1usize..=2047, 0..4),
        1usize..3000,
    )
        .prop_map(|(seq, first, last, lens, tail)| {
            let mut fields: Vec<Bytes> = lens
                .iter()
                .enumerate()
                .map(|(i, len)| Bytes::from(vec![i as u8; *len]))
                .collect();
            fields.push(Bytes::from(vec![0xEE; tail]));
            Segment::new(Sn10::new(seq), FramingInfo::new(first, last), fields)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_segment_codec_roundtrip(segment in segment_strategy()) {
        let bytes = segment.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), segment.encoded_len());
        let decoded = Segment::from_bytes(&bytes).unwrap();
        prop_assert_eq!(decoded, segment);
    }

    #[test]
    fn prop_segments_fit_budget_and_reassemble(
        sizes in prop::collection::vec(8usize..3000, 1..30),
        budgets in prop::collection::vec(3usize..700, 1..50),
    ) {
        let mut assembler = SegmentAssembler::new(usize::MAX);
        let sent: Vec<Bytes> = sizes.iter().enumerate().map(|(i, len)| sdu(i, *len)).collect();
        for data in &sent {
            assembler.enqueue(data.clone(), Timestamp::ZERO).unwrap();
        }

        let mut reassembler = Reassembler::new();
        let mut host = Host::new();
        let mut round = 0;
        while !assembler.is_empty() {
            let budget = budgets[round % budgets.len()];
            round += 1;
            if let Some(segment) = assembler.notify_tx_opportunity(budget) {
                let encoded = segment.to_bytes().unwrap();
                prop_assert!(encoded.len() <= budget, "{} > {}", encoded.len(), budget);
                reassembler.process(Segment::from_bytes(&encoded).unwrap(), &mut host).unwrap();
            }
        }

        prop_assert_eq!(host.delivered, sent);
        prop_assert_eq!(assembler.buffered_bytes(), 0);
    }

    #[test]
    fn prop_unacknowledged_order_preserved(
        sizes in prop::collection::vec(8usize..1500, 1..40),
        budget in 20usize..600,
        lost in prop::collection::vec(prop::bool::weighted(0.15), 200),
        swaps in prop::collection::vec(prop::bool::weighted(0.3), 200),
        window in 2u16..=512,
    ) {
        let config = LinkConfig {
            reordering_window: window,
            max_tx_buffer_bytes: usize::MAX,
            ..Default::default()
        };
        let mut tx = LinkEngine::new(config.clone()).unwrap();
        let mut rx = LinkEngine::new(config).unwrap();
        let mut tx_host = Host::new();
        let mut rx_host = Host::new();

        let sent: Vec<Bytes> = sizes.iter().enumerate().map(|(i, len)| sdu(i, *len)).collect();
        for data in &sent {
            tx.enqueue(data.clone(), Timestamp::ZERO).unwrap();
        }
        let mut frames = drain(&mut tx, budget, &mut tx_host).unwrap();
        shuffle_locally(&mut frames, &swaps);

        for (i, frame) in frames.into_iter().enumerate() {
            if lost.get(i).copied().unwrap_or(false) {
                continue;
            }
            rx.receive_pdu(frame, &mut rx_host).unwrap();
            let span = rx.reordering_window().unwrap().span();
            prop_assert!(span <= window, "span {} exceeds window {}", span, window);
        }
        rx_host.run_timers(&mut rx, 1000).unwrap();

        assert_ordered_subsequence(&sent, &rx_host.delivered);
        prop_assert_eq!(rx.live_timers(), 0);
    }

    #[test]
    fn prop_duplicates_delivered_once(
        sizes in prop::collection::vec(8usize..800, 1..30),
        copies in prop::collection::vec(1usize..4, 200),
    ) {
        let mut tx = LinkEngine::new(LinkConfig::default()).unwrap();
        let mut rx = LinkEngine::new(LinkConfig::default()).unwrap();
        let mut tx_host = Host::new();
        let mut rx_host = Host::new();

        let sent: Vec<Bytes> = sizes.iter().enumerate().map(|(i, len)| sdu(i, *len)).collect();
        for data in &sent {
            tx.enqueue(data.clone(), Timestamp::ZERO).unwrap();
        }
        let frames = drain(&mut tx, 300, &mut tx_host).unwrap();

        let mut duplicates = 0;
        for (i, frame) in frames.iter().enumerate() {
            let n = copies.get(i).copied().unwrap_or(1);
            duplicates += n - 1;
            for _ in 0..n {
                rx.receive_pdu(frame.clone(), &mut rx_host).unwrap();
            }
        }

        prop_assert_eq!(&rx_host.delivered, &sent);
        prop_assert_eq!(rx.stats().pdus_discarded, duplicates as u64);
    }

    #[test]
    fn prop_retransmissions_bounded(
        count in 1usize..12,
        max_retransmissions in 0u32..5,
        lost in prop::collection::vec(prop::bool::weighted(0.5), 400),
    ) {
        let config = LinkConfig {
            max_retransmissions,
            ..LinkConfig::acknowledged()
        };
        let timeout = config.retransmission_timeout;
        let mut tx = LinkEngine::new(config.clone()).unwrap();
        let mut rx = LinkEngine::new(config).unwrap();
        let mut tx_host = Host::new();
        let mut rx_host = Host::new();

        for i in 0..count {
            tx.enqueue(sdu(i, 100), Timestamp::ZERO).unwrap();
        }

        let mut transmissions: HashMap<Bytes, u32> = HashMap::new();
        let mut sent_frames = 0;
        for _ in 0..200 {
            if tx.tx_buffer_size_bytes() == 0 {
                break;
            }
            for frame in drain(&mut tx, 150, &mut tx_host).unwrap() {
                *transmissions.entry(frame.clone()).or_default() += 1;
                let dropped = lost.get(sent_frames).copied().unwrap_or(false);
                sent_frames += 1;
                if !dropped {
                    rx.receive_pdu(frame, &mut rx_host).unwrap();
                }
            }
            for ack in rx_host.acks.drain(..) {
                tx.receive_ack(ack);
            }
            tx_host.advance(timeout, &mut tx).unwrap();
        }

        prop_assert_eq!(tx.tx_buffer_size_bytes(), 0);
        for (_, n) in transmissions {
            prop_assert!(n <= max_retransmissions + 1);
        }
        prop_assert!(tx.stats().retransmissions <= count as u64 * max_retransmissions as u64);

        rx_host.advance(Duration::from_secs(3600), &mut rx).unwrap();
        rx_host.run_timers(&mut rx, 1000).unwrap();
        assert_ordered_subsequence(
            &(0..count).map(|i| sdu(i, 100)).collect::<Vec<_>>(),
            &rx_host.delivered,
        );
    }
}

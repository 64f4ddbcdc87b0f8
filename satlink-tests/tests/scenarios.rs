//! Reference scenarios through the public engine API

mod common;

use bytes::Bytes;
use common::{drain, full_frame, sdu, Host};
use satlink_protocol::{ArqSeqNo, BufferError, LinkConfig, LinkEngine, Mode, Slot, Timestamp};
use std::time::Duration;

#[test]
fn test_window_four_swapped_pairs_delivered_in_order() {
    let config = LinkConfig {
        reordering_window: 4,
        ..Default::default()
    };
    let mut rx = LinkEngine::new(config).unwrap();
    let mut host = Host::new();

    for seq in [1, 0, 3, 2] {
        rx.receive_pdu(full_frame(seq, &format!("sdu-{seq}")), &mut host)
            .unwrap();
    }

    assert_eq!(host.delivered_strs(), vec!["sdu-0", "sdu-1", "sdu-2", "sdu-3"]);
    assert_eq!(rx.stats().sdus_delivered, 4);
    assert_eq!(rx.stats().pdus_discarded, 0);
}

#[test]
fn test_opportunity_at_header_size_sends_nothing() {
    for config in [LinkConfig::default(), LinkConfig::acknowledged()] {
        let mut tx = LinkEngine::new(config).unwrap();
        let mut host = Host::new();
        tx.enqueue(sdu(0, 100), Timestamp::ZERO).unwrap();
        let before = tx.tx_buffer_size_bytes();

        assert!(tx.notify_tx_opportunity(2, &mut host).unwrap().is_none());
        assert_eq!(tx.tx_buffer_size_bytes(), before);
        assert_eq!(tx.stats().pdus_sent, 0);
        assert_eq!(host.scheduled, 0);
    }
}

#[test]
fn test_unacknowledged_pdu_released_after_max_retransmissions() {
    let config = LinkConfig {
        max_retransmissions: 2,
        ..LinkConfig::acknowledged()
    };
    let timeout = config.retransmission_timeout;
    let mut tx = LinkEngine::new(config).unwrap();
    let mut host = Host::new();

    tx.enqueue(sdu(0, 40), Timestamp::ZERO).unwrap();
    let first = tx.notify_tx_opportunity(100, &mut host).unwrap().unwrap();

    for _ in 0..2 {
        host.advance(timeout, &mut tx).unwrap();
        let retx = tx.notify_tx_opportunity(100, &mut host).unwrap().unwrap();
        assert_eq!(retx, first);
    }
    host.advance(timeout, &mut tx).unwrap();

    assert_eq!(host.scheduled, 3);
    assert_eq!(tx.stats().retransmissions, 2);
    assert_eq!(tx.stats().pdus_dropped_max_retx, 1);
    assert_eq!(tx.tx_buffer_size_bytes(), 0);
    assert_eq!(tx.live_timers(), 0);

    let sender = tx.arq_sender().unwrap();
    assert!(matches!(sender.window().slot(ArqSeqNo::new(0)), Slot::Free));
    assert_eq!(sender.window().in_use(), 0);
    assert!(tx.notify_tx_opportunity(100, &mut host).unwrap().is_none());
}

#[test]
fn test_oversized_sdu_rejected_on_empty_buffer() {
    let config = LinkConfig {
        max_tx_buffer_bytes: 2500,
        ..Default::default()
    };
    let mut tx = LinkEngine::new(config).unwrap();

    let err = tx
        .enqueue(Bytes::from(vec![7u8; 3000]), Timestamp::ZERO)
        .unwrap_err();

    assert_eq!(
        err,
        BufferError::Overflow {
            sdu_len: 3000,
            buffered: 0,
            capacity: 2500
        }
    );
    assert_eq!(tx.tx_buffer_size_bytes(), 0);
    assert_eq!(tx.min_tx_opportunity_bytes(), 0);
}

#[test]
fn test_gap_filled_later_delivers_each_once() {
    let mut rx = LinkEngine::new(LinkConfig::default()).unwrap();
    let mut host = Host::new();

    for seq in [0, 1, 2, 5] {
        rx.receive_pdu(full_frame(seq, &format!("sdu-{seq}")), &mut host)
            .unwrap();
    }
    assert_eq!(host.delivered_strs(), vec!["sdu-0", "sdu-1", "sdu-2"]);

    for seq in [3, 4] {
        rx.receive_pdu(full_frame(seq, &format!("sdu-{seq}")), &mut host)
            .unwrap();
    }
    // A late copy of 5 must not be delivered again
    rx.receive_pdu(full_frame(5, "sdu-5"), &mut host).unwrap();

    assert_eq!(
        host.delivered_strs(),
        vec!["sdu-0", "sdu-1", "sdu-2", "sdu-3", "sdu-4", "sdu-5"]
    );
    assert_eq!(rx.stats().pdus_discarded, 1);
}

#[test]
fn test_arq_gap_filled_later_delivers_each_once() {
    let mut tx = LinkEngine::new(LinkConfig::acknowledged()).unwrap();
    let mut rx = LinkEngine::new(LinkConfig::acknowledged()).unwrap();
    let mut tx_host = Host::new();
    let mut rx_host = Host::new();

    let mut frames = Vec::new();
    for i in 0..6 {
        tx.enqueue(sdu(i, 20), Timestamp::ZERO).unwrap();
        frames.extend(drain(&mut tx, 100, &mut tx_host).unwrap());
    }
    assert_eq!(frames.len(), 6);

    for i in [0, 1, 2, 5, 3, 4] {
        rx.receive_pdu(frames[i].clone(), &mut rx_host).unwrap();
    }
    rx.receive_pdu(frames[5].clone(), &mut rx_host).unwrap();

    let expected: Vec<Bytes> = (0..6).map(|i| sdu(i, 20)).collect();
    assert_eq!(rx_host.delivered, expected);
    assert_eq!(rx.stats().pdus_discarded, 1);

    // Every well-formed frame is acknowledged, duplicates included
    assert_eq!(rx_host.acks.len(), 7);
    for ack in rx_host.acks.drain(..) {
        tx.receive_ack(ack);
    }
    assert_eq!(tx.tx_buffer_size_bytes(), 0);
    assert_eq!(tx.mode(), Mode::Acknowledged);
}

#[test]
fn test_head_of_line_delay_tracks_oldest_sdu() {
    let mut tx = LinkEngine::new(LinkConfig::default()).unwrap();
    let mut host = Host::new();

    tx.enqueue(sdu(0, 30), Timestamp::from_millis(100)).unwrap();
    tx.enqueue(sdu(1, 30), Timestamp::from_millis(250)).unwrap();
    assert_eq!(
        tx.head_of_line_delay(Timestamp::from_millis(400)),
        Duration::from_millis(300)
    );

    host.now = Timestamp::from_millis(400);
    tx.notify_tx_opportunity(40, &mut host).unwrap().unwrap();
    assert_eq!(
        tx.head_of_line_delay(Timestamp::from_millis(400)),
        Duration::from_millis(150)
    );
}

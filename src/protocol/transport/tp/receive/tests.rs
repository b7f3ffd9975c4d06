//! Unit tests for the Transport Protocol receive session.
use super::*;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::tp::{bam_payload, rts_payload, PGN_TP_CM};

const LOCAL: u8 = 0x1C;
const PEER: u8 = 0x2A;
const PGN: u32 = 0xFECA;

fn session() -> TpReceiveSession {
    let mut session = TpReceiveSession::new();
    session.configure(LOCAL);
    session
}

fn next_frame(tx: &mut FrameQueue) -> CanFrame {
    let raw = tx.pop().unwrap();
    CanFrame::decode(&raw).unwrap()
}

/// TP.DT payload carrying `seq` and seven bytes derived from it.
fn dt_data(seq: u8) -> [u8; 8] {
    let mut data = [0xFF; 8];
    data[0] = seq;
    for (i, byte) in data[1..].iter_mut().enumerate() {
        *byte = (seq - 1) * 7 + i as u8;
    }
    data
}

fn feed_packets(session: &mut TpReceiveSession, range: core::ops::RangeInclusive<u8>, tx: &mut FrameQueue) {
    for seq in range {
        session.handle_dt(&dt_data(seq), PEER, tx);
    }
}

//==================================================================================Handshake

#[test]
/// An accepted RTS is answered with a CTS granting a window from
/// packet one.
fn test_rts_answered_with_cts() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);

    let frame = next_frame(&mut tx);
    assert_eq!(frame.id.pgn(), PGN_TP_CM);
    assert_eq!(frame.id.destination(), Some(PEER));
    assert_eq!(frame.id.source_address(), LOCAL);

    let cm = TpCm(&frame.data);
    assert_eq!(cm.control(), Some(ControlByte::Cts));
    assert_eq!(cm.window(), 3);
    assert_eq!(cm.next_packet(), 1);
    assert_eq!(cm.pgn(), PGN);
}

#[test]
/// An RTS whose packet total does not match its byte count is refused.
fn test_rts_inconsistent_announcement_refused() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 5, PGN)), PEER, &mut tx);

    let cm_data = next_frame(&mut tx).data;
    assert_eq!(TpCm(&cm_data).control(), Some(ControlByte::CannotRespond));
    assert!(!session.has_message());
}

#[test]
/// A second RTS while a transfer is in progress is refused without
/// disturbing the ongoing reassembly.
fn test_concurrent_rts_refused() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let _cts = tx.pop();

    session.handle_cm(TpCm(&rts_payload(14, 2, 0xFEE5)), PEER + 1, &mut tx);
    let cm_data = next_frame(&mut tx).data;
    assert_eq!(TpCm(&cm_data).control(), Some(ControlByte::AccessDenied));

    // The original transfer still completes.
    feed_packets(&mut session, 1..=3, &mut tx);
    assert!(session.has_message());
}

#[test]
/// A raised backpressure flag turns new RTS openings away.
fn test_os_busy_refuses_rts() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.set_os_busy(true);
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);

    let cm_data = next_frame(&mut tx).data;
    assert_eq!(TpCm(&cm_data).control(), Some(ControlByte::CannotRespond));

    session.set_os_busy(false);
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let cm_data = next_frame(&mut tx).data;
    assert_eq!(TpCm(&cm_data).control(), Some(ControlByte::Cts));
}

//==================================================================================Reassembly

#[test]
/// Sequenced packets rebuild the message, the sender gets its
/// EndOfMsgACK, and retrieval releases the buffer.
fn test_full_reassembly() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let _cts = tx.pop();

    feed_packets(&mut session, 1..=3, &mut tx);

    let cm_data = next_frame(&mut tx).data;
    let cm = TpCm(&cm_data);
    assert_eq!(cm.control(), Some(ControlByte::EndOfMsgAck));
    assert_eq!(cm.byte_count(), 20);
    assert_eq!(cm.packets_total(), 3);

    assert!(session.has_message());
    assert!(session.is_busy());
    let message = session.take_message().unwrap();
    assert_eq!(message.pgn, PGN);
    assert_eq!(message.address, PEER);
    assert_eq!(message.byte_count, 20);
    for (i, byte) in message.as_slice().iter().enumerate() {
        assert_eq!(*byte, i as u8);
    }
    assert!(!session.is_busy());
    assert!(session.take_message().is_none());
}

#[test]
/// When the granted window runs out mid-message, the next burst is
/// granted with a fresh CTS.
fn test_window_renewal() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    // 120 bytes: 18 packets, one more than a single window.
    session.handle_cm(TpCm(&rts_payload(120, 18, PGN)), PEER, &mut tx);
    let first_cts_data = next_frame(&mut tx).data;
    assert_eq!(TpCm(&first_cts_data).window(), TP_CTS_WINDOW);

    feed_packets(&mut session, 1..=16, &mut tx);
    let cm_data = next_frame(&mut tx).data;
    let cm = TpCm(&cm_data);
    assert_eq!(cm.control(), Some(ControlByte::Cts));
    assert_eq!(cm.window(), 2);
    assert_eq!(cm.next_packet(), 17);

    feed_packets(&mut session, 17..=18, &mut tx);
    let cm_data = next_frame(&mut tx).data;
    assert_eq!(TpCm(&cm_data).control(), Some(ControlByte::EndOfMsgAck));
    assert!(session.has_message());
}

#[test]
/// An out-of-order packet aborts the transfer; no partial message
/// survives and the session is ready for a new opening.
fn test_sequence_violation_aborts() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let _cts = tx.pop();

    session.handle_dt(&dt_data(1), PEER, &mut tx);
    session.handle_dt(&dt_data(3), PEER, &mut tx);

    let cm_data = next_frame(&mut tx).data;
    let cm = TpCm(&cm_data);
    assert_eq!(cm.control(), Some(ControlByte::ConnAbort));
    assert_eq!(cm.abort_reason(), ABORT_REASON_BAD_SEQUENCE);
    assert!(!session.has_message());
    assert_eq!(session.last_error(), Some(SessionError::SequenceViolation));

    // A fresh RTS is accepted right away.
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let cm_data = next_frame(&mut tx).data;
    assert_eq!(TpCm(&cm_data).control(), Some(ControlByte::Cts));
}

#[test]
/// Data from a node other than the connection peer is a protocol
/// violation, not a parallel transfer.
fn test_dt_from_stranger_aborts() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let _cts = tx.pop();

    session.handle_dt(&dt_data(1), PEER + 1, &mut tx);
    assert_eq!(session.last_error(), Some(SessionError::SequenceViolation));
    assert!(!session.has_message());
}

//==================================================================================Broadcast (BAM)

#[test]
/// A broadcast transfer is reassembled without a single reply frame.
fn test_bam_is_silent() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&bam_payload(20, 3, PGN)), PEER, &mut tx);
    assert!(tx.is_empty());

    feed_packets(&mut session, 1..=3, &mut tx);
    assert!(tx.is_empty());
    assert!(session.has_message());
    assert_eq!(session.take_message().unwrap().byte_count, 20);
}

#[test]
/// A broadcast timeout also stays silent: the transfer is dropped
/// without an abort frame.
fn test_bam_timeout_is_silent() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&bam_payload(20, 3, PGN)), PEER, &mut tx);
    session.handle_dt(&dt_data(1), PEER, &mut tx);

    session.tick(TIMEOUT_T1 + 1, &mut tx);
    assert!(tx.is_empty());
    assert!(!session.has_message());
    assert_eq!(session.last_error(), Some(SessionError::Timeout));
}

//==================================================================================Timeouts

#[test]
/// A stalled sender is aborted once the inter-packet timer expires;
/// the transfer never silently continues.
fn test_inter_packet_timeout() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let _cts = tx.pop();
    session.handle_dt(&dt_data(1), PEER, &mut tx);

    session.tick(TIMEOUT_T1, &mut tx);
    assert!(tx.is_empty());
    session.tick(1, &mut tx);

    let cm_data = next_frame(&mut tx).data;
    let cm = TpCm(&cm_data);
    assert_eq!(cm.control(), Some(ControlByte::ConnAbort));
    assert_eq!(cm.abort_reason(), ABORT_REASON_TIMEOUT);
    assert!(!session.has_message());
    assert_eq!(session.last_error(), Some(SessionError::Timeout));

    // A packet arriving after the abort is ignored, never assembled.
    session.handle_dt(&dt_data(2), PEER, &mut tx);
    assert!(tx.is_empty());
    assert!(!session.has_message());
}

#[test]
/// After a CTS the first packet may take up to T2, longer than the
/// inter-packet allowance.
fn test_first_packet_uses_t2() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let _cts = tx.pop();

    session.tick(TIMEOUT_T1 + 1, &mut tx);
    assert!(tx.is_empty());
    session.tick(TIMEOUT_T2 - TIMEOUT_T1, &mut tx);
    assert_eq!(session.last_error(), Some(SessionError::Timeout));
}

#[test]
/// A peer abort drops the transfer without a reply.
fn test_peer_abort() {
    let mut tx = FrameQueue::new();
    let mut session = session();
    session.handle_cm(TpCm(&rts_payload(20, 3, PGN)), PEER, &mut tx);
    let _cts = tx.pop();

    session.handle_cm(TpCm(&abort_payload(ABORT_REASON_TIMEOUT, PGN)), PEER, &mut tx);
    assert!(tx.is_empty());
    assert!(!session.has_message());
    assert_eq!(session.last_error(), Some(SessionError::Rejected));
}

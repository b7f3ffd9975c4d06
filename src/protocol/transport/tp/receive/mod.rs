//! Transport Protocol receive session: reassembles an incoming
//! multi-packet message, enforcing flow control, strict sequencing,
//! and the timeout discipline.
//!
//! One session exists per CAN channel, guarding the single reassembly
//! buffer. While a completed message waits for the application to
//! retrieve it (`os_busy`), new RTS openings are refused rather than
//! overwriting the buffer; the requester retries later.
use crate::error::SessionError;
use crate::infra::queue::FrameQueue;
use crate::protocol::transport::tp::{
    abort_payload, cm_frame, cts_payload, eom_ack_payload, packets_for, refuse_payload,
    ControlByte, TpCm, TpMessage, ABORT_REASON_BAD_SEQUENCE, ABORT_REASON_TIMEOUT,
    MAX_MESSAGE_LENGTH, TIMEOUT_T1, TIMEOUT_T2, TP_CTS_WINDOW, TP_PACKET_PAYLOAD,
};

//==================================================================================States

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Receive session states. Failure is not a resting state: the session
/// records the error and resets straight to `Idle`, delivering no
/// partial data.
enum RxState {
    Idle,
    Receiving,
    Done,
}

//==================================================================================Session

/// Receive half of the Transport Protocol for one CAN channel.
pub struct TpReceiveSession {
    state: RxState,
    /// RTS path (true) or BAM path (false). Only the RTS path ever
    /// sends CTS, EndOfMsgACK, or abort replies.
    acknowledged: bool,
    /// Backpressure flag: a completed message is pending retrieval, or
    /// the application declared itself busy.
    os_busy: bool,
    local_address: u8,
    msg: TpMessage,
    packets_total: u8,
    packets_ok: u8,
    /// Packets left in the burst granted by the last CTS.
    window_left: u8,
    timer_ms: u16,
    /// Deadline for the current wait: T2 after a CTS, T1 between packets.
    timer_limit: u16,
    last_error: Option<SessionError>,
}

impl Default for TpReceiveSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TpReceiveSession {
    /// Create a session in the idle state.
    pub const fn new() -> Self {
        Self {
            state: RxState::Idle,
            acknowledged: false,
            os_busy: false,
            local_address: 0,
            msg: TpMessage::new(),
            packets_total: 0,
            packets_ok: 0,
            window_left: 0,
            timer_ms: 0,
            timer_limit: TIMEOUT_T1,
            last_error: None,
        }
    }

    /// Bind the session to the node address used for replies.
    pub(crate) fn configure(&mut self, local_address: u8) {
        self.local_address = local_address;
    }

    /// Whether a completed message is pending retrieval.
    pub fn has_message(&self) -> bool {
        self.state == RxState::Done
    }

    /// Whether the backpressure flag is raised.
    pub fn is_busy(&self) -> bool {
        self.os_busy
    }

    /// Application override of the backpressure flag. Raising it
    /// refuses new incoming transfers; clearing it is ignored while a
    /// completed message still waits to be retrieved.
    pub fn set_os_busy(&mut self, busy: bool) {
        if busy {
            self.os_busy = true;
        } else if self.state != RxState::Done {
            self.os_busy = false;
        }
    }

    /// Error recorded by the last failed transfer, if any.
    pub fn last_error(&self) -> Option<SessionError> {
        self.last_error
    }

    /// Hand the completed message to the application and reset the
    /// session, releasing the reassembly buffer for the next transfer.
    pub fn take_message(&mut self) -> Option<TpMessage> {
        if self.state != RxState::Done {
            return None;
        }
        let message = self.msg.clone();
        self.state = RxState::Idle;
        self.os_busy = false;
        Some(message)
    }

    /// Process a TP.CM frame addressed to this node (or broadcast).
    pub fn handle_cm(&mut self, cm: TpCm<'_>, source: u8, tx: &mut FrameQueue) {
        match cm.control() {
            Some(ControlByte::Rts) => self.handle_rts(cm, source, tx),
            Some(ControlByte::Bam) => self.handle_bam(cm, source),
            Some(ControlByte::ConnAbort) => {
                if self.state == RxState::Receiving
                    && source == self.msg.address
                    && cm.pgn() == self.msg.pgn
                {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "TP RX: peer {} aborted, reason {}",
                        source,
                        cm.abort_reason()
                    );
                    self.fail(SessionError::Rejected, None);
                }
            }
            _ => {}
        }
    }

    /// Place an inbound TP.DT packet into the reassembly buffer.
    pub fn handle_dt(&mut self, data: &[u8; 8], source: u8, tx: &mut FrameQueue) {
        if self.state != RxState::Receiving {
            return;
        }
        // Data from a node other than the one that opened the session
        // is a protocol violation, not a parallel transfer.
        if source != self.msg.address {
            self.fail(SessionError::SequenceViolation, Some(tx));
            return;
        }
        let seq = data[0];
        if seq != self.packets_ok + 1 {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "TP RX: expected packet {}, got {}",
                self.packets_ok + 1,
                seq
            );
            self.fail(SessionError::SequenceViolation, Some(tx));
            return;
        }

        let start = (seq as usize - 1) * TP_PACKET_PAYLOAD;
        let end = (start + TP_PACKET_PAYLOAD).min(self.msg.byte_count as usize);
        self.msg.data[start..end].copy_from_slice(&data[1..1 + (end - start)]);
        self.packets_ok += 1;
        self.timer_ms = 0;
        self.timer_limit = TIMEOUT_T1;

        if self.packets_ok == self.packets_total {
            if self.acknowledged {
                self.reply(
                    eom_ack_payload(self.msg.byte_count, self.packets_total, self.msg.pgn),
                    tx,
                );
            }
            self.state = RxState::Done;
            self.os_busy = true;
        } else if self.acknowledged {
            self.window_left -= 1;
            if self.window_left == 0 {
                // Burst exhausted: grant the next window.
                self.window_left = TP_CTS_WINDOW.min(self.packets_total - self.packets_ok);
                self.reply(
                    cts_payload(self.window_left, self.packets_ok + 1, self.msg.pgn),
                    tx,
                );
                self.timer_limit = TIMEOUT_T2;
            }
        }
    }

    /// Advance the inter-packet timer. Any expiry aborts the transfer;
    /// there is no silent continuation.
    pub fn tick(&mut self, elapsed_ms: u16, tx: &mut FrameQueue) {
        if self.state != RxState::Receiving {
            return;
        }
        self.timer_ms = self.timer_ms.saturating_add(elapsed_ms);
        if self.timer_ms > self.timer_limit {
            #[cfg(feature = "defmt")]
            defmt::warn!("TP RX: timeout waiting for PGN {}", self.msg.pgn);
            self.fail(SessionError::Timeout, Some(tx));
        }
    }

    //==================================================================================Internals

    fn handle_rts(&mut self, cm: TpCm<'_>, source: u8, tx: &mut FrameQueue) {
        if self.state == RxState::Receiving {
            // Protect the in-progress reassembly; the requester retries.
            self.refuse(ControlByte::AccessDenied, cm.pgn(), source, tx);
            return;
        }
        if self.os_busy {
            // Completed message not yet retrieved, or application busy.
            self.refuse(ControlByte::CannotRespond, cm.pgn(), source, tx);
            return;
        }
        let byte_count = cm.byte_count();
        if !self.announcement_fits(byte_count, cm.packets_total()) {
            self.refuse(ControlByte::CannotRespond, cm.pgn(), source, tx);
            return;
        }

        self.open(cm.pgn(), source, byte_count, true);
        self.window_left = TP_CTS_WINDOW.min(self.packets_total);
        self.reply(cts_payload(self.window_left, 1, self.msg.pgn), tx);
        self.timer_limit = TIMEOUT_T2;
    }

    fn handle_bam(&mut self, cm: TpCm<'_>, source: u8) {
        // Broadcasts are never acknowledged: a busy session simply
        // ignores the announcement, no reply is ever sent.
        if self.os_busy || self.state != RxState::Idle {
            return;
        }
        let byte_count = cm.byte_count();
        if !self.announcement_fits(byte_count, cm.packets_total()) {
            return;
        }
        self.open(cm.pgn(), source, byte_count, false);
        self.timer_limit = TIMEOUT_T1;
    }

    /// An announcement is honored only when it fits the reassembly
    /// buffer and its packet count matches the byte count.
    fn announcement_fits(&self, byte_count: u16, packets_total: u8) -> bool {
        (9..=MAX_MESSAGE_LENGTH as u16).contains(&byte_count)
            && packets_total == packets_for(byte_count)
    }

    fn open(&mut self, pgn: u32, source: u8, byte_count: u16, acknowledged: bool) {
        self.msg.pgn = pgn;
        self.msg.address = source;
        self.msg.byte_count = byte_count;
        self.packets_total = packets_for(byte_count);
        self.packets_ok = 0;
        self.window_left = 0;
        self.acknowledged = acknowledged;
        self.timer_ms = 0;
        self.last_error = None;
        self.state = RxState::Receiving;
    }

    fn refuse(&self, control: ControlByte, pgn: u32, requester: u8, tx: &mut FrameQueue) {
        #[cfg(feature = "defmt")]
        defmt::debug!("TP RX: refusing RTS from {} for PGN {}", requester, pgn);
        if let Ok(frame) = cm_frame(self.local_address, requester, refuse_payload(control, pgn)) {
            let _ = tx.push(frame.encode());
        }
    }

    fn reply(&self, payload: [u8; 8], tx: &mut FrameQueue) {
        if let Ok(frame) = cm_frame(self.local_address, self.msg.address, payload) {
            // Queue full leaves the peer to its own timeout; it will
            // abort and retry the transfer.
            let _ = tx.push(frame.encode());
        }
    }

    /// Abort the transfer: record the error, announce it on the RTS
    /// path when a queue is provided, and reset to idle. No partial
    /// data survives.
    fn fail(&mut self, error: SessionError, tx: Option<&mut FrameQueue>) {
        if self.acknowledged {
            if let Some(tx) = tx {
                let reason = match error {
                    SessionError::Timeout => ABORT_REASON_TIMEOUT,
                    _ => ABORT_REASON_BAD_SEQUENCE,
                };
                self.reply(abort_payload(reason, self.msg.pgn), tx);
            }
        }
        self.last_error = Some(error);
        self.state = RxState::Idle;
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

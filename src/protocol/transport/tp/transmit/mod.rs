//! Transport Protocol transmit session: segments an outgoing message
//! and drives the RTS/CTS handshake (unicast) or the BAM announcement
//! (broadcast) until the transfer completes or aborts.
//!
//! One session exists per CAN channel; at most one outgoing transfer
//! can be in flight on a channel at a time. A second send request is
//! rejected, never queued.
use crate::error::{SendError, SessionError};
use crate::infra::queue::FrameQueue;
use crate::protocol::transport::tp::{
    abort_payload, bam_payload, cm_frame, dt_frame, packets_for, rts_payload, ControlByte,
    TpCm, TpMessage, ABORT_REASON_TIMEOUT, MAX_MESSAGE_LENGTH, TIMEOUT_T3, TIMEOUT_TH,
    TP_PACKET_PAYLOAD,
};
use crate::protocol::transport::GLOBAL_ADDRESS;

//==================================================================================States

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Transmit session states. `Done` and `Failed` are terminal for the
/// current transfer only: the next send request resets the session.
enum TxState {
    Idle,
    ConnectStart,
    ConnectWait,
    DataTransfer,
    WaitFinalAck,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Externally visible session status.
pub enum TxStatus {
    /// No transfer in flight; a new send request is accepted.
    Idle,
    /// A transfer is being negotiated or streamed.
    InProgress,
    /// The last transfer completed.
    Done,
    /// The last transfer aborted with the recorded error.
    Failed(SessionError),
}

//==================================================================================Session

/// Transmit half of the Transport Protocol for one CAN channel.
pub struct TpTransmitSession {
    state: TxState,
    msg: TpMessage,
    src: u8,
    /// Packets already streamed out, 0-based. Always <= `packets_total`.
    packet_offset: u8,
    packets_total: u8,
    /// Packets remaining in the burst granted by the last CTS.
    packets_granted: u8,
    /// Set while the peer holds the connection open with CTS(0).
    holding: bool,
    timer_ms: u16,
    last_error: Option<SessionError>,
}

impl Default for TpTransmitSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TpTransmitSession {
    /// Create a session in the idle state.
    pub const fn new() -> Self {
        Self {
            state: TxState::Idle,
            msg: TpMessage::new(),
            src: 0,
            packet_offset: 0,
            packets_total: 0,
            packets_granted: 0,
            holding: false,
            timer_ms: 0,
            last_error: None,
        }
    }

    /// Whether a new send request would be accepted.
    pub fn is_available(&self) -> bool {
        matches!(self.state, TxState::Idle | TxState::Done | TxState::Failed)
    }

    /// Externally visible status of the session.
    pub fn status(&self) -> TxStatus {
        match self.state {
            TxState::Idle => TxStatus::Idle,
            TxState::Done => TxStatus::Done,
            TxState::Failed => match self.last_error {
                Some(error) => TxStatus::Failed(error),
                None => TxStatus::Idle,
            },
            _ => TxStatus::InProgress,
        }
    }

    /// Accept a new multi-packet send request.
    ///
    /// Fails with `ParamError` when the payload does not need or does
    /// not fit the Transport Protocol (must span 9..=`MAX_MESSAGE_LENGTH`
    /// bytes), or when a transfer is already in flight on this channel.
    pub fn begin(
        &mut self,
        pgn: u32,
        destination: u8,
        payload: &[u8],
        src: u8,
    ) -> Result<(), SendError> {
        if !self.is_available() {
            return Err(SendError::ParamError);
        }
        if payload.len() <= 8 || payload.len() > MAX_MESSAGE_LENGTH {
            return Err(SendError::ParamError);
        }

        self.msg.pgn = pgn;
        self.msg.address = destination;
        self.msg.byte_count = payload.len() as u16;
        self.msg.data[..payload.len()].copy_from_slice(payload);
        self.src = src;
        self.packet_offset = 0;
        self.packets_total = packets_for(self.msg.byte_count);
        self.packets_granted = 0;
        self.holding = false;
        self.timer_ms = 0;
        self.last_error = None;
        self.state = TxState::ConnectStart;
        Ok(())
    }

    /// Advance the session by one poll tick: emit the pending control
    /// or data frames into `tx` and run the wait-state timers. Commits
    /// to at most one state transition per invocation.
    pub fn poll(&mut self, elapsed_ms: u16, tx: &mut FrameQueue) {
        match self.state {
            TxState::ConnectStart => self.connect_start(tx),
            TxState::ConnectWait => {
                let limit = if self.holding { TIMEOUT_TH } else { TIMEOUT_T3 };
                self.run_wait_timer(elapsed_ms, limit, tx);
            }
            TxState::DataTransfer => self.stream_packets(tx),
            TxState::WaitFinalAck => self.run_wait_timer(elapsed_ms, TIMEOUT_T3, tx),
            TxState::Idle | TxState::Done | TxState::Failed => {}
        }
    }

    /// Process a TP.CM frame addressed to this node.
    pub fn handle_cm(&mut self, cm: TpCm<'_>, source: u8) {
        if source != self.msg.address {
            return;
        }
        match cm.control() {
            Some(ControlByte::Cts) if self.state == TxState::ConnectWait => {
                if cm.pgn() != self.msg.pgn {
                    return;
                }
                let window = cm.window();
                if window == 0 {
                    // CTS(0): the peer keeps the connection open but is
                    // not ready yet. Bounded by the holding timer.
                    self.holding = true;
                    self.timer_ms = 0;
                    return;
                }
                let next = cm.next_packet();
                if next == 0 || next > self.packets_total {
                    self.fail(SessionError::SequenceViolation);
                    return;
                }
                self.holding = false;
                self.packet_offset = next - 1;
                self.packets_granted = window.min(self.packets_total - self.packet_offset);
                self.timer_ms = 0;
                self.state = TxState::DataTransfer;
            }
            Some(ControlByte::EndOfMsgAck) if self.state == TxState::WaitFinalAck => {
                if cm.pgn() == self.msg.pgn {
                    self.state = TxState::Done;
                }
            }
            Some(
                ControlByte::Nack | ControlByte::AccessDenied | ControlByte::CannotRespond,
            ) if self.state == TxState::ConnectWait => {
                #[cfg(feature = "defmt")]
                defmt::warn!("TP TX: peer {} declined PGN {}", source, self.msg.pgn);
                self.fail(SessionError::Rejected);
            }
            Some(ControlByte::ConnAbort) if self.in_flight() => {
                if cm.pgn() == self.msg.pgn {
                    #[cfg(feature = "defmt")]
                    defmt::warn!(
                        "TP TX: peer {} aborted, reason {}",
                        source,
                        cm.abort_reason()
                    );
                    self.fail(SessionError::Rejected);
                }
            }
            _ => {}
        }
    }

    /// Error recorded by the last failed transfer, if any.
    pub fn last_error(&self) -> Option<SessionError> {
        self.last_error
    }

    //==================================================================================Internals

    fn in_flight(&self) -> bool {
        matches!(
            self.state,
            TxState::ConnectWait | TxState::DataTransfer | TxState::WaitFinalAck
        )
    }

    fn connect_start(&mut self, tx: &mut FrameQueue) {
        let broadcast = self.msg.address == GLOBAL_ADDRESS;
        let payload = if broadcast {
            bam_payload(self.msg.byte_count, self.packets_total, self.msg.pgn)
        } else {
            rts_payload(self.msg.byte_count, self.packets_total, self.msg.pgn)
        };
        let Ok(frame) = cm_frame(self.src, self.msg.address, payload) else {
            // TP.CM is a fixed PDU1 group; construction cannot fail.
            return;
        };
        if tx.push(frame.encode()).is_err() {
            // Queue full: retry on the next poll without changing state.
            return;
        }
        if broadcast {
            // Broadcasts are never flow-controlled: unbounded grant.
            self.packets_granted = self.packets_total;
            self.state = TxState::DataTransfer;
        } else {
            self.timer_ms = 0;
            self.state = TxState::ConnectWait;
        }
    }

    fn stream_packets(&mut self, tx: &mut FrameQueue) {
        while self.packets_granted > 0 && self.packet_offset < self.packets_total {
            let start = self.packet_offset as usize * TP_PACKET_PAYLOAD;
            let end = (start + TP_PACKET_PAYLOAD).min(self.msg.byte_count as usize);
            let seq = self.packet_offset + 1;
            let Ok(frame) = dt_frame(self.src, self.msg.address, seq, &self.msg.data[start..end])
            else {
                return;
            };
            if tx.push(frame.encode()).is_err() {
                // Queue full: resume the burst on the next poll.
                return;
            }
            self.packet_offset += 1;
            self.packets_granted -= 1;
        }

        if self.packet_offset == self.packets_total {
            if self.msg.address == GLOBAL_ADDRESS {
                self.state = TxState::Done;
            } else {
                self.timer_ms = 0;
                self.state = TxState::WaitFinalAck;
            }
        } else if self.packets_granted == 0 {
            // Grant exhausted with packets remaining: wait for the next CTS.
            self.timer_ms = 0;
            self.state = TxState::ConnectWait;
        }
    }

    fn run_wait_timer(&mut self, elapsed_ms: u16, limit: u16, tx: &mut FrameQueue) {
        self.timer_ms = self.timer_ms.saturating_add(elapsed_ms);
        if self.timer_ms <= limit {
            return;
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("TP TX: timeout waiting for peer, PGN {}", self.msg.pgn);
        // Tell the peer we are giving up; best effort only.
        if let Ok(frame) = cm_frame(
            self.src,
            self.msg.address,
            abort_payload(ABORT_REASON_TIMEOUT, self.msg.pgn),
        ) {
            let _ = tx.push(frame.encode());
        }
        self.fail(SessionError::Timeout);
    }

    fn fail(&mut self, error: SessionError) {
        self.last_error = Some(error);
        self.state = TxState::Failed;
    }
}

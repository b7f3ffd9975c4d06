//! SAE J1939 Transport Protocol (TP): carries payloads larger than
//! eight bytes across successive CAN frames.
//!
//! Two parameter groups implement it: TP.CM (connection management,
//! PGN 0xEC00) and TP.DT (data transfer, PGN 0xEB00). A unicast
//! transfer opens with RTS and is flow-controlled by CTS grants; a
//! broadcast transfer opens with BAM and is never acknowledged. This
//! module holds the wire vocabulary shared by the
//! [`transmit`] and [`receive`] state machines.
use crate::error::CanIdBuildError;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::PRIORITY_TP;

pub mod receive;
pub mod transmit;

//==================================================================================Constants

/// PGN of the TP connection management group (TP.CM).
pub const PGN_TP_CM: u32 = 0xEC00;

/// PGN of the TP data transfer group (TP.DT).
pub const PGN_TP_DT: u32 = 0xEB00;

/// Payload bytes carried by one TP.DT packet.
pub const TP_PACKET_PAYLOAD: usize = 7;

/// Maximum reassembled message length handled by this stack.
/// Configurable up to [`PROTOCOL_MAX_MESSAGE_LENGTH`].
pub const MAX_MESSAGE_LENGTH: usize = 240;

/// Hard ceiling defined by the protocol: 255 packets of 7 bytes.
pub const PROTOCOL_MAX_MESSAGE_LENGTH: usize = 1785;

/// Number of packets granted per CTS by the receive session.
pub const TP_CTS_WINDOW: u8 = 16;

/// Response timer (ms). Also the recommended upper bound for the poll
/// interval: every other timer is a multiple of it.
pub const TIMEOUT_TR: u16 = 200;
/// Holding timer (ms): bounds a CTS(0) "hold the connection open" wait.
pub const TIMEOUT_TH: u16 = 500;
/// Inter-packet timer (ms) on the receive side.
pub const TIMEOUT_T1: u16 = 750;
/// First-packet timer (ms): receive-side wait after emitting a CTS.
pub const TIMEOUT_T2: u16 = 1250;
/// Transmit-side wait (ms) for a CTS or the final acknowledge.
pub const TIMEOUT_T3: u16 = 1250;
/// Reserved transfer timer (ms), exported for deployments that need it.
pub const TIMEOUT_T4: u16 = 1050;

/// Connection abort reasons carried in byte 1 of a TP.Conn_Abort.
pub const ABORT_REASON_BUSY: u8 = 1;
pub const ABORT_REASON_TIMEOUT: u8 = 3;
pub const ABORT_REASON_BAD_SEQUENCE: u8 = 7;

//==================================================================================Control bytes

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// First byte of every TP.CM frame, selecting the control message.
/// The low codes double as handshake refusals.
pub enum ControlByte {
    /// Positive acknowledgment.
    Ack = 0,
    /// The requested PGN is not supported.
    Nack = 1,
    /// Supported but temporarily refused; the requester must retry.
    AccessDenied = 2,
    /// No buffer or send resource available; the requester must retry.
    CannotRespond = 3,
    /// TP.CM_RTS: request to send.
    Rts = 16,
    /// TP.CM_CTS: clear to send.
    Cts = 17,
    /// TP.CM_EndOfMsgACK: whole message acknowledged.
    EndOfMsgAck = 19,
    /// TP.CM_BAM: broadcast announce message.
    Bam = 32,
    /// TP.Conn_Abort: give up the connection.
    ConnAbort = 255,
}

impl ControlByte {
    /// Map a wire value back to a control byte. Reserved values yield `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ack),
            1 => Some(Self::Nack),
            2 => Some(Self::AccessDenied),
            3 => Some(Self::CannotRespond),
            16 => Some(Self::Rts),
            17 => Some(Self::Cts),
            19 => Some(Self::EndOfMsgAck),
            32 => Some(Self::Bam),
            255 => Some(Self::ConnAbort),
            _ => None,
        }
    }
}

//==================================================================================Message

#[derive(Debug, Clone, PartialEq, Eq)]
/// Application message carried by the Transport Protocol: produced by
/// reassembly on the receive side, or submitted for segmentation on
/// the transmit side.
pub struct TpMessage {
    /// Parameter group number of the message.
    pub pgn: u32,
    /// Peer address: destination when transmitting, source when receiving.
    pub address: u8,
    /// Payload bytes; only `byte_count` of them are valid.
    pub data: [u8; MAX_MESSAGE_LENGTH],
    /// Number of valid payload bytes.
    pub byte_count: u16,
}

impl Default for TpMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl TpMessage {
    /// Create an empty message.
    pub const fn new() -> Self {
        Self {
            pgn: 0,
            address: 0,
            data: [0; MAX_MESSAGE_LENGTH],
            byte_count: 0,
        }
    }

    /// Immutable view over the valid payload bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.byte_count as usize]
    }
}

/// Number of TP.DT packets needed for `byte_count` bytes.
#[inline]
pub fn packets_for(byte_count: u16) -> u8 {
    byte_count.div_ceil(TP_PACKET_PAYLOAD as u16) as u8
}

//==================================================================================TP.CM accessors

/// Read-only view over the 8-byte payload of a TP.CM frame.
#[derive(Clone, Copy)]
pub struct TpCm<'a>(pub &'a [u8; 8]);

impl<'a> TpCm<'a> {
    /// Control byte selecting the message kind; `None` for reserved codes.
    #[inline]
    pub fn control(&self) -> Option<ControlByte> {
        ControlByte::from_u8(self.0[0])
    }

    /// Total message size announced by RTS/BAM/EndOfMsgACK.
    #[inline]
    pub fn byte_count(&self) -> u16 {
        u16::from_le_bytes([self.0[1], self.0[2]])
    }

    /// Total packet count announced by RTS/BAM/EndOfMsgACK.
    #[inline]
    pub fn packets_total(&self) -> u8 {
        self.0[3]
    }

    /// Packets granted by a CTS for the next burst.
    #[inline]
    pub fn window(&self) -> u8 {
        self.0[1]
    }

    /// 1-based index of the next packet a CTS expects.
    #[inline]
    pub fn next_packet(&self) -> u8 {
        self.0[2]
    }

    /// Reason byte of a connection abort.
    #[inline]
    pub fn abort_reason(&self) -> u8 {
        self.0[1]
    }

    /// PGN of the message the control frame refers to.
    #[inline]
    pub fn pgn(&self) -> u32 {
        u32::from_le_bytes([self.0[5], self.0[6], self.0[7], 0])
    }
}

//==================================================================================Frame builders

/// Assemble a TP.CM frame addressed from `src` to `dest`.
pub(crate) fn cm_frame(src: u8, dest: u8, payload: [u8; 8]) -> Result<CanFrame, CanIdBuildError> {
    let id = CanId::builder(PGN_TP_CM, src)
        .to_destination(dest)
        .with_priority(PRIORITY_TP)
        .build()?;
    Ok(CanFrame {
        id,
        data: payload,
        len: 8,
    })
}

/// Assemble a TP.DT frame carrying `chunk` under sequence number `seq`.
/// Unused payload bytes are padded with `0xFF` per the protocol.
pub(crate) fn dt_frame(src: u8, dest: u8, seq: u8, chunk: &[u8]) -> Result<CanFrame, CanIdBuildError> {
    let id = CanId::builder(PGN_TP_DT, src)
        .to_destination(dest)
        .with_priority(PRIORITY_TP)
        .build()?;
    let mut data = [0xFF; 8];
    data[0] = seq;
    data[1..1 + chunk.len()].copy_from_slice(chunk);
    Ok(CanFrame { id, data, len: 8 })
}

/// TP.CM_RTS payload. Byte 4 advertises no per-burst limit (0xFF).
pub(crate) fn rts_payload(byte_count: u16, packets_total: u8, pgn: u32) -> [u8; 8] {
    let count = byte_count.to_le_bytes();
    let pgn = pgn.to_le_bytes();
    [
        ControlByte::Rts as u8,
        count[0],
        count[1],
        packets_total,
        0xFF,
        pgn[0],
        pgn[1],
        pgn[2],
    ]
}

/// TP.CM_CTS payload granting `window` packets starting at `next_packet`.
pub(crate) fn cts_payload(window: u8, next_packet: u8, pgn: u32) -> [u8; 8] {
    let pgn = pgn.to_le_bytes();
    [
        ControlByte::Cts as u8,
        window,
        next_packet,
        0xFF,
        0xFF,
        pgn[0],
        pgn[1],
        pgn[2],
    ]
}

/// TP.CM_BAM payload.
pub(crate) fn bam_payload(byte_count: u16, packets_total: u8, pgn: u32) -> [u8; 8] {
    let count = byte_count.to_le_bytes();
    let pgn = pgn.to_le_bytes();
    [
        ControlByte::Bam as u8,
        count[0],
        count[1],
        packets_total,
        0xFF,
        pgn[0],
        pgn[1],
        pgn[2],
    ]
}

/// TP.CM_EndOfMsgACK payload.
pub(crate) fn eom_ack_payload(byte_count: u16, packets_total: u8, pgn: u32) -> [u8; 8] {
    let count = byte_count.to_le_bytes();
    let pgn = pgn.to_le_bytes();
    [
        ControlByte::EndOfMsgAck as u8,
        count[0],
        count[1],
        packets_total,
        0xFF,
        pgn[0],
        pgn[1],
        pgn[2],
    ]
}

/// TP.Conn_Abort payload with the given reason.
pub(crate) fn abort_payload(reason: u8, pgn: u32) -> [u8; 8] {
    let pgn = pgn.to_le_bytes();
    [
        ControlByte::ConnAbort as u8,
        reason,
        0xFF,
        0xFF,
        0xFF,
        pgn[0],
        pgn[1],
        pgn[2],
    ]
}

/// Handshake refusal payload (AccessDenied / CannotRespond / Nack).
pub(crate) fn refuse_payload(control: ControlByte, pgn: u32) -> [u8; 8] {
    let pgn = pgn.to_le_bytes();
    [
        control as u8,
        0xFF,
        0xFF,
        0xFF,
        0xFF,
        pgn[0],
        pgn[1],
        pgn[2],
    ]
}

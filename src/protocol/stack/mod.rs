//! Poll-driven J1939 stack: owns the per-channel queues, the Transport
//! Protocol sessions, and the responder registry, and routes every
//! inbound frame to its consumer.
//!
//! The stack is single-threaded by construction. Interrupt handlers
//! only touch the `isr_*` entry points, which push and pop the bounded
//! channel queues; everything else runs from the application's
//! [`J1939Stack::poll`] loop. Timeouts are driven by the `elapsed_ms`
//! the caller reports, so the poll interval bounds timer resolution:
//! keep it at or below `TIMEOUT_TR`.
use crate::error::{QueueError, RegistryError, SendError, SessionError};
use crate::infra::queue::{FrameQueue, RawFrame};
use crate::protocol::registry::{PgnRegistry, RefreshFn};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::tp::receive::TpReceiveSession;
use crate::protocol::transport::tp::transmit::{TpTransmitSession, TxStatus};
use crate::protocol::transport::tp::{ControlByte, TpCm, TpMessage};
use crate::protocol::transport::{
    GLOBAL_ADDRESS, PF_REQUEST, PF_TP_CM, PF_TP_DT, PGN_REQUEST, PRIORITY_INFO, PRIORITY_REQUEST,
};
use heapless::Deque;

//==================================================================================Channels

/// Number of CAN channels the stack services.
pub const MAX_CAN_CHANNELS: usize = 4;

/// Depth of the per-channel application inbox for single frames.
pub const APP_INBOX_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Identifies one of the serviced CAN channels.
pub enum Channel {
    Can0,
    Can1,
    Can2,
    Can3,
}

impl Channel {
    const ALL: [Self; MAX_CAN_CHANNELS] = [Self::Can0, Self::Can1, Self::Can2, Self::Can3];

    #[inline]
    fn index(self) -> usize {
        match self {
            Self::Can0 => 0,
            Self::Can1 => 1,
            Self::Can2 => 2,
            Self::Can3 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Static configuration of one channel.
pub struct ChannelConfig {
    /// Whether the stack services this channel at all.
    pub active: bool,
    /// Node address used as the source of every frame sent on the
    /// channel and as the unicast filter for inbound frames.
    pub address: u8,
}

impl ChannelConfig {
    /// An unserviced channel.
    pub const fn inactive() -> Self {
        Self {
            active: false,
            address: 0,
        }
    }

    /// An active channel bound to `address`.
    pub const fn active(address: u8) -> Self {
        Self {
            active: true,
            address,
        }
    }
}

/// Everything the stack owns for one channel.
struct ChannelState {
    config: ChannelConfig,
    /// Driver-to-stack FIFO, fed from the receive interrupt.
    rx_queue: FrameQueue,
    /// Stack-to-driver FIFO, drained from the transmit interrupt.
    tx_queue: FrameQueue,
    /// Single frames awaiting the application, oldest first.
    inbox: Deque<CanFrame, APP_INBOX_DEPTH>,
    tp_rx: TpReceiveSession,
    tp_tx: TpTransmitSession,
    /// Frames lost to full queues or malformed identifiers.
    dropped_frames: u16,
}

impl ChannelState {
    fn new(config: ChannelConfig) -> Self {
        let mut tp_rx = TpReceiveSession::new();
        tp_rx.configure(config.address);
        Self {
            config,
            rx_queue: FrameQueue::new(),
            tx_queue: FrameQueue::new(),
            inbox: Deque::new(),
            tp_rx,
            tp_tx: TpTransmitSession::new(),
            dropped_frames: 0,
        }
    }

    fn drop_frame(&mut self) {
        self.dropped_frames = self.dropped_frames.saturating_add(1);
    }
}

//==================================================================================Stack

/// The J1939 protocol stack. One instance services up to
/// [`MAX_CAN_CHANNELS`] independent CAN channels.
pub struct J1939Stack {
    channels: [ChannelState; MAX_CAN_CHANNELS],
    registry: PgnRegistry,
}

impl J1939Stack {
    /// Build a stack from the per-channel configuration.
    pub fn new(configs: [ChannelConfig; MAX_CAN_CHANNELS]) -> Self {
        Self {
            channels: configs.map(ChannelState::new),
            registry: PgnRegistry::new(),
        }
    }

    //==================================================================================Interrupt entry points

    /// Hand a received frame to the stack. Interrupt-safe: only pushes
    /// onto the channel's receive queue. A full queue drops the frame
    /// and bumps the channel's drop counter.
    pub fn isr_receive(&mut self, channel: Channel, raw: RawFrame) -> Result<(), QueueError> {
        let ch = &mut self.channels[channel.index()];
        ch.rx_queue.push(raw).inspect_err(|_| ch.drop_frame())
    }

    /// Pop the next frame to put on the wire. Interrupt-safe: only pops
    /// the channel's transmit queue.
    pub fn isr_next_transmit(&mut self, channel: Channel) -> Option<RawFrame> {
        self.channels[channel.index()].tx_queue.pop()
    }

    //==================================================================================Poll loop

    /// Run one cooperative step: drain every active channel's receive
    /// queue, route each frame, then advance the Transport Protocol
    /// sessions and their timers by `elapsed_ms`.
    pub fn poll(&mut self, elapsed_ms: u16) {
        let Self { channels, registry } = self;
        for (index, ch) in channels.iter_mut().enumerate() {
            if !ch.config.active {
                continue;
            }
            let channel = Channel::ALL[index];
            while let Some(raw) = ch.rx_queue.pop() {
                match CanFrame::decode(&raw) {
                    Ok(frame) => ch.dispatch(channel, &frame, registry),
                    Err(_) => {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("malformed frame on {}, id {:x}", channel, raw.id);
                        ch.drop_frame();
                    }
                }
            }
            ch.tp_tx.poll(elapsed_ms, &mut ch.tx_queue);
            ch.tp_rx.tick(elapsed_ms, &mut ch.tx_queue);
        }
    }

    //==================================================================================Application API

    /// Queue a single frame for transmission on `channel`.
    pub fn send_single(&mut self, channel: Channel, frame: &CanFrame) -> Result<(), SendError> {
        let ch = self.active_channel(channel)?;
        ch.tx_queue
            .push(frame.encode())
            .map_err(|_| SendError::CannotTransmit)
    }

    /// Next single frame addressed to the application on `channel`.
    pub fn receive_single(&mut self, channel: Channel) -> Option<CanFrame> {
        self.channels[channel.index()].inbox.pop_front()
    }

    /// Send `payload` under `pgn` to `destination` (255 broadcasts).
    ///
    /// Payloads of at most eight bytes go out as one frame; anything
    /// longer opens a Transport Protocol transfer, of which at most one
    /// can be in flight per channel.
    pub fn tp_send(
        &mut self,
        channel: Channel,
        pgn: u32,
        destination: u8,
        payload: &[u8],
    ) -> Result<(), SendError> {
        let ch = self.active_channel(channel)?;
        let src = ch.config.address;
        if payload.is_empty() {
            return Err(SendError::ParamError);
        }
        if payload.len() <= 8 {
            let frame = single_frame(pgn, src, destination, payload)?;
            return ch
                .tx_queue
                .push(frame.encode())
                .map_err(|_| SendError::CannotTransmit);
        }
        ch.tp_tx.begin(pgn, destination, payload, src)
    }

    /// Completed Transport Protocol message on `channel`, if one is
    /// waiting. Taking it releases the reassembly buffer.
    pub fn tp_receive(&mut self, channel: Channel) -> Option<TpMessage> {
        self.channels[channel.index()].tp_rx.take_message()
    }

    /// Ask `destination` (255 queries the whole bus) to send `pgn`.
    pub fn request_pgn(
        &mut self,
        channel: Channel,
        pgn: u32,
        destination: u8,
    ) -> Result<(), SendError> {
        let ch = self.active_channel(channel)?;
        let id = CanId::builder(PGN_REQUEST, ch.config.address)
            .to_destination(destination)
            .with_priority(PRIORITY_REQUEST)
            .build()?;
        let pgn_bytes = pgn.to_le_bytes();
        let mut data = [0xFF; 8];
        data[..3].copy_from_slice(&pgn_bytes[..3]);
        ch.tx_queue
            .push(CanFrame { id, data, len: 3 }.encode())
            .map_err(|_| SendError::CannotTransmit)
    }

    /// Register a responder: requests for `pgn` received on `channel`
    /// are answered from a copy of `data`, refreshed through the
    /// callback just before each reply.
    pub fn register_response(
        &mut self,
        channel: Channel,
        pgn: u32,
        data: &[u8],
        refresh: Option<RefreshFn>,
    ) -> Result<(), RegistryError> {
        if !self.channels[channel.index()].config.active {
            return Err(RegistryError::ParamError);
        }
        self.registry.register(pgn, channel, data, refresh)
    }

    //==================================================================================Diagnostics

    /// Status of the outgoing Transport Protocol session on `channel`.
    pub fn tx_status(&self, channel: Channel) -> TxStatus {
        self.channels[channel.index()].tp_tx.status()
    }

    /// Error recorded by the last failed incoming transfer on `channel`.
    pub fn last_rx_error(&self, channel: Channel) -> Option<SessionError> {
        self.channels[channel.index()].tp_rx.last_error()
    }

    /// Frames lost on `channel` since startup (full queues, malformed
    /// identifiers, inbox overflow).
    pub fn dropped_frames(&self, channel: Channel) -> u16 {
        self.channels[channel.index()].dropped_frames
    }

    /// Raise or clear the receive backpressure flag on `channel`: while
    /// raised, incoming unicast transfers are refused.
    pub fn set_os_busy(&mut self, channel: Channel, busy: bool) {
        self.channels[channel.index()].tp_rx.set_os_busy(busy);
    }

    //==================================================================================Internals

    fn active_channel(&mut self, channel: Channel) -> Result<&mut ChannelState, SendError> {
        let ch = &mut self.channels[channel.index()];
        if !ch.config.active {
            return Err(SendError::ParamError);
        }
        Ok(ch)
    }
}

//==================================================================================Routing

impl ChannelState {
    /// Route one decoded frame to the Transport Protocol sessions, the
    /// responder registry, or the application inbox.
    fn dispatch(&mut self, channel: Channel, frame: &CanFrame, registry: &mut PgnRegistry) {
        // Unicast frames for another node are normal bus traffic, not
        // an error; they are ignored without counting.
        let for_us = match frame.id.destination() {
            Some(destination) => {
                destination == self.config.address || destination == GLOBAL_ADDRESS
            }
            None => true,
        };
        if !for_us {
            return;
        }

        match frame.id.pdu_format() {
            // TP frames always carry eight bytes; short ones are junk.
            PF_TP_CM => {
                if frame.len == 8 {
                    self.dispatch_tp_cm(TpCm(&frame.data), frame.id.source_address());
                } else {
                    self.drop_frame();
                }
            }
            PF_TP_DT => {
                if frame.len == 8 {
                    self.tp_rx.handle_dt(
                        &frame.data,
                        frame.id.source_address(),
                        &mut self.tx_queue,
                    );
                } else {
                    self.drop_frame();
                }
            }
            PF_REQUEST => self.answer_request(channel, frame, registry),
            _ => {
                if self.inbox.push_back(*frame).is_err() {
                    self.drop_frame();
                }
            }
        }
    }

    /// TP.CM frames fan out by control byte: openings go to the receive
    /// session, grants and acknowledgments to the transmit session, and
    /// an abort to whichever session knows the connection.
    fn dispatch_tp_cm(&mut self, cm: TpCm<'_>, source: u8) {
        match cm.control() {
            Some(ControlByte::Rts | ControlByte::Bam) => {
                self.tp_rx.handle_cm(cm, source, &mut self.tx_queue)
            }
            Some(
                ControlByte::Cts
                | ControlByte::EndOfMsgAck
                | ControlByte::Nack
                | ControlByte::AccessDenied
                | ControlByte::CannotRespond,
            ) => self.tp_tx.handle_cm(cm, source),
            Some(ControlByte::ConnAbort) => {
                self.tp_rx.handle_cm(cm, source, &mut self.tx_queue);
                self.tp_tx.handle_cm(cm, source);
            }
            Some(ControlByte::Ack) | None => {}
        }
    }

    /// Answer a PGN request from the responder registry. The first
    /// matching registration replies exactly once; an unregistered PGN
    /// is silently ignored, leaving the bus quiet for other nodes that
    /// may serve it.
    fn answer_request(&mut self, channel: Channel, frame: &CanFrame, registry: &mut PgnRegistry) {
        if frame.len < 3 {
            self.drop_frame();
            return;
        }
        let requested = u32::from_le_bytes([frame.data[0], frame.data[1], frame.data[2], 0]);
        let Some(entry) = registry.first_match(requested, channel) else {
            return;
        };
        let requester = frame.id.source_address();
        let payload = entry.refresh_and_payload();
        let src = self.config.address;

        if payload.len() <= 8 {
            let Ok(reply) = single_frame(requested, src, requester, payload) else {
                return;
            };
            if self.tx_queue.push(reply.encode()).is_err() {
                self.drop_frame();
            }
        } else if self.tp_tx.begin(requested, requester, payload, src).is_err() {
            // Outgoing TP session busy: the requester will retry.
            #[cfg(feature = "defmt")]
            defmt::debug!("request for PGN {} dropped, TP session busy", requested);
        }
    }
}

/// Assemble a single-frame message, addressing it when the PGN is a
/// PDU1 group and broadcasting it otherwise.
fn single_frame(
    pgn: u32,
    src: u8,
    destination: u8,
    payload: &[u8],
) -> Result<CanFrame, SendError> {
    let mut builder = CanId::builder(pgn, src).with_priority(PRIORITY_INFO);
    if ((pgn >> 8) & 0xFF) < 240 {
        builder = builder.to_destination(destination);
    }
    let id = builder.build()?;
    let mut data = [0xFF; 8];
    data[..payload.len()].copy_from_slice(payload);
    Ok(CanFrame {
        id,
        data,
        len: payload.len(),
    })
}

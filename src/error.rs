//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (CAN ID construction,
//! queue boundaries, the send path, registry updates, and the protocol
//! errors absorbed by the Transport Protocol state machines).
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors that can occur while building a 29-bit CAN identifier.
pub enum CanIdBuildError {
    /// Provided parameters do not produce a valid identifier.
    #[error("Invalid data")]
    InvalidData,
    /// Attempt to build a broadcast message (PDU2) with PF < 240.
    #[error("Invalid for broadcast message: PF is too low")]
    InvalidForBroadcast,
    /// Attempt to send an addressed message (PDU1) with PF ≥ 240.
    #[error("Invalid for addressed message: PF is too high: {pf}")]
    InvalidForAddressedMessage { pf: u8 },
    /// In PDU1 the lower 8 bits of the PGN must remain zero.
    #[error("PDU1 PGNs require PS = 0")]
    PsAddressedMessageMustBeNull,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures while decoding a raw identifier read from the CAN driver.
pub enum FrameError {
    /// The raw identifier does not fit in 29 bits.
    #[error("Malformed frame: identifier exceeds 29 bits")]
    MalformedFrame,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Non-blocking queue boundary conditions. Routinely handled by callers
/// polling again; never a state-machine transition.
pub enum QueueError {
    /// The queue has no room for another frame.
    #[error("Queue is full")]
    Full,
    /// The queue holds no frame.
    #[error("Queue is empty")]
    Empty,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Synchronous errors returned by the send entry points.
pub enum SendError {
    /// Invalid caller input: bad length, inactive channel, or a transport
    /// session that is already busy with another transfer.
    #[error("Parameter error")]
    ParamError,
    /// The outbound queue refused the frame (driver backpressure).
    #[error("Cannot transmit")]
    CannotTransmit,
}

impl From<CanIdBuildError> for SendError {
    fn from(_: CanIdBuildError) -> Self {
        SendError::ParamError
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while appending a responder registration.
pub enum RegistryError {
    /// Empty payload or payload longer than the configured maximum.
    #[error("Parameter error")]
    ParamError,
    /// The fixed registration table is full.
    #[error("Registry capacity exceeded")]
    CapacityExceeded,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Protocol-level failures absorbed by a Transport Protocol session.
/// These never propagate to the caller as a `Result`: the owning state
/// machine records them, returns to idle, and exposes them through the
/// diagnostic getters.
pub enum SessionError {
    /// The peer declined the connection (NACK, AccessDenied,
    /// CannotRespond, or a connection abort).
    #[error("Peer rejected the transfer")]
    Rejected,
    /// A protocol wait exceeded its deadline.
    #[error("Transport timer expired")]
    Timeout,
    /// A data packet arrived out of order or from the wrong peer.
    #[error("Sequence violation")]
    SequenceViolation,
}

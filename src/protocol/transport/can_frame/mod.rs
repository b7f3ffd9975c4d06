//! In-memory representation of an SAE J1939 CAN frame, plus the
//! conversions to the driver-facing [`RawFrame`] and the
//! `embedded_can::Frame` trait for HAL interop.
use crate::error::FrameError;
use crate::infra::queue::RawFrame;
use crate::protocol::transport::can_id::CanId;
use embedded_can::{ExtendedId, Id};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Decoded J1939 frame as routed by the poll loop.
pub struct CanFrame {
    /// Full 29-bit CAN identifier stored inside a `u32`.
    pub id: CanId,
    /// Payload buffer. Classic CAN frames always provide eight bytes.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Decode a raw frame popped from a channel queue.
    ///
    /// Fails only when the identifier exceeds 29 bits, which an honest
    /// driver never hands over.
    pub fn decode(raw: &RawFrame) -> Result<Self, FrameError> {
        Ok(Self {
            id: CanId::from_raw(raw.id)?,
            data: raw.data,
            len: (raw.len as usize).min(8),
        })
    }

    /// Encode into the driver-facing representation. Never fails: the
    /// identifier was validated at construction.
    pub fn encode(&self) -> RawFrame {
        RawFrame {
            id: self.id.0,
            data: self.data,
            len: self.len as u8,
        }
    }

    /// Immutable view over the valid payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

//==================================================================================embedded-can interop

impl embedded_can::Frame for CanFrame {
    /// Build from any HAL identifier. J1939 only uses extended (29-bit)
    /// identifiers, so standard-frame requests are refused.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let Id::Extended(extended) = id.into() else {
            return None;
        };
        if data.len() > 8 {
            return None;
        }
        let mut buffer = [0xFF; 8];
        buffer[..data.len()].copy_from_slice(data);
        Some(Self {
            id: CanId(extended.as_raw()),
            data: buffer,
            len: data.len(),
        })
    }

    /// Remote frames have no meaning in J1939.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        // A CanId never exceeds 29 bits, so the conversion cannot fail.
        match ExtendedId::new(self.id.0) {
            Some(extended) => Id::Extended(extended),
            None => Id::Extended(ExtendedId::ZERO),
        }
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

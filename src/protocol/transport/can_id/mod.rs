//! Creation and extraction of the 29-bit CAN identifiers defined by
//! SAE J1939.
use crate::error::{CanIdBuildError, FrameError};

// Define, build, and decompose a J1939 CAN identifier. The identifier
// layout, high bit first: Priority:3, Reserved:1, DataPage:1,
// PDUFormat:8, PDUSpecific:8, SourceAddress:8.

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Encapsulates an extended CAN identifier (29 bits) and exposes
/// accessors for priority, PGN, destination, and source.
pub struct CanId(pub u32);

impl CanId {
    // Builder entry point
    /// Creates a pre-configured `CanIdBuilder` for a PGN and source address.
    pub fn builder(pgn: u32, source_address: u8) -> CanIdBuilder {
        CanIdBuilder::new(pgn, source_address)
    }

    /// Validate a raw identifier read from the driver.
    ///
    /// Fails with [`FrameError::MalformedFrame`] only when the value
    /// does not fit in 29 bits, which an honest driver never produces.
    pub fn from_raw(raw: u32) -> Result<Self, FrameError> {
        if raw > 0x1FFF_FFFF {
            return Err(FrameError::MalformedFrame);
        }
        Ok(Self(raw))
    }

    // Getters used to deconstruct the identifier
    /// Returns the priority (3 bits, value 0-7) encoded in the CAN ID.
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// Reserved bit (kept zero by current J1939 documents).
    pub fn reserved(&self) -> u8 {
        ((self.0 >> 25) & 0x01) as u8
    }

    /// Data page bit, selecting one of the two PGN pages.
    pub fn data_page(&self) -> u8 {
        ((self.0 >> 24) & 0x01) as u8
    }

    /// PDU format byte. Values below 240 mean an addressed message
    /// (PDU1); 240 and above mean a broadcast (PDU2).
    pub fn pdu_format(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// PDU specific byte: destination address in PDU1, group extension
    /// in PDU2.
    pub fn pdu_specific(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Extracts the 24-bit PGN, handling the PDU1/PDU2 distinction.
    pub fn pgn(&self) -> u32 {
        let ps = self.pdu_specific() as u32;
        let pf = self.pdu_format() as u32;
        let dp = (self.0 >> 24) & 0x01;
        let r = (self.0 >> 25) & 0x01;

        if pf >= 240 {
            // PDU2: implicit destination, PS becomes part of the PGN.
            (r << 17) | (dp << 16) | (pf << 8) | ps
        } else {
            // PDU1: PS stores the explicit destination.
            (r << 17) | (dp << 16) | (pf << 8)
        }
    }

    /// Returns the destination address (PDU1) when the PGN carries one.
    pub fn destination(&self) -> Option<u8> {
        if self.pdu_format() >= 240 {
            None
        } else {
            Some(self.pdu_specific())
        }
    }

    /// Eight-bit source address of the emitting node.
    pub fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

//==================================================================================CAN_ID_BUILDER
#[derive(Debug)]
/// Fluent builder that enforces the PDU1/PDU2 rules.
pub struct CanIdBuilder {
    pub priority: u8,
    pub pgn: u32,
    pub source_address: u8,
    pub destination: Option<u8>,
}

impl CanIdBuilder {
    /// Initializes the builder for a given PGN and source address.
    pub fn new(pgn: u32, source_address: u8) -> Self {
        Self {
            priority: 6, // Default priority
            pgn,
            source_address,
            destination: None,
        }
    }

    /// Sets the priority (3 bits) to use during construction.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Assigns a destination address (PDU1). Implies an addressed message.
    pub fn to_destination(mut self, destination_address: u8) -> Self {
        self.destination = Some(destination_address);
        self
    }

    /// Builds the CAN identifier while applying the J1939 rules:
    /// - PF < 240 → addressed message (PDU1): `destination` mandatory and the PGN PS byte must be `0`
    /// - PF ≥ 240 → broadcast (PDU2): `destination` must not be provided
    /// - R/DP/PF/PS bits are copied from the provided PGN
    ///
    /// Returns a dedicated error when the configuration violates these rules.
    pub fn build(self) -> Result<CanId, CanIdBuildError> {
        let r_from_pgn = (self.pgn >> 17) & 0x01;
        let dp_from_pgn = (self.pgn >> 16) & 0x01;
        let pf_from_pgn = ((self.pgn >> 8) & 0xFF) as u8;
        let ps_from_pgn = (self.pgn & 0xFF) as u8;

        match self.destination {
            None => {
                if pf_from_pgn < 240 {
                    return Err(CanIdBuildError::InvalidForBroadcast);
                }
                let id = ((self.priority as u32) << 26)
                    | (r_from_pgn << 25)
                    | (dp_from_pgn << 24)
                    | ((pf_from_pgn as u32) << 16)
                    | ((ps_from_pgn as u32) << 8)
                    | (self.source_address as u32);
                Ok(CanId(id))
            }

            Some(da) => {
                if pf_from_pgn >= 240 {
                    return Err(CanIdBuildError::InvalidForAddressedMessage { pf: pf_from_pgn });
                }
                if ps_from_pgn != 0 {
                    return Err(CanIdBuildError::PsAddressedMessageMustBeNull);
                }
                let id = ((self.priority as u32) << 26)
                    | (r_from_pgn << 25)
                    | (dp_from_pgn << 24)
                    | ((pf_from_pgn as u32) << 16)
                    | ((da as u32) << 8)
                    | (self.source_address as u32);
                Ok(CanId(id))
            }
        }
    }
}

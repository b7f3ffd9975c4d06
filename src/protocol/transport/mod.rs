//! SAE J1939 transport layer: CAN frame representations, 29-bit
//! identifier management, and the Transport Protocol (TP) that carries
//! payloads larger than a single frame.
//!
//! ## J1939 addressing and priority constants
//!
//! Addresses and default priorities below come straight from the J1939
//! application layer documents. TP control flow and data transfer run
//! at the lowest default priority (7) so they never starve
//! single-frame traffic.

pub mod can_frame;
pub mod can_id;
pub mod tp;

/// Global (broadcast) destination address.
pub const GLOBAL_ADDRESS: u8 = 255;

/// Null address, used by nodes that have not claimed an address.
pub const NULL_ADDRESS: u8 = 254;

/// PDU format of the Request parameter group (PGN 59904).
pub const PF_REQUEST: u8 = 234;

/// PGN of the Request parameter group.
pub const PGN_REQUEST: u32 = 0xEA00;

/// PDU format of the Acknowledgment parameter group (PGN 59392).
pub const PF_ACKNOWLEDGMENT: u8 = 232;

/// PDU format of TP.DT, the Transport Protocol data transfer group.
pub const PF_TP_DT: u8 = 235;

/// PDU format of TP.CM, the Transport Protocol connection management group.
pub const PF_TP_CM: u8 = 236;

/// Default priority for Request and Acknowledgment frames.
pub const PRIORITY_REQUEST: u8 = 6;

/// Default priority for informational parameter groups.
pub const PRIORITY_INFO: u8 = 6;

/// Default priority for TP.CM and TP.DT frames.
pub const PRIORITY_TP: u8 = 7;

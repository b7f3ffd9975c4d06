//! `axle-j1939` library: an SAE J1939 protocol stack for `no_std`
//! environments. The crate exposes the infrastructure modules (frame
//! queues crossing the interrupt/poll boundary), the protocol logic
//! (29-bit identifier codec, Transport Protocol state machines, PGN
//! request/response registry), and the poll-driven stack tying them
//! together.
#![no_std]
//==================================================================================
/// Domain and low-level errors (CAN identifier construction, queue
/// boundaries, send path, protocol session failures).
pub mod error;
/// Infrastructure shared with the interrupt context (bounded frame FIFOs).
pub mod infra;
/// SAE J1939 protocol implementation: identifier codec, Transport
/// Protocol, registry, and the dispatching stack.
pub mod protocol;
//==================================================================================

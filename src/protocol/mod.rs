//! High-level components of the SAE J1939 protocol: identifier codec,
//! Transport Protocol, PGN request/response registry, and the stack.
pub mod registry;
pub mod stack;
pub mod transport;

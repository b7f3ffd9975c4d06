//! PGN request/response registry: an ordered collection of responder
//! registrations resolved against inbound Request frames.
//!
//! Registrations are appended at the tail and scanned in insertion
//! order; the first entry matching the requested PGN and channel
//! responds. The table is fixed-capacity and entries live for the
//! process lifetime; no removal is defined.
use crate::error::RegistryError;
use crate::protocol::stack::Channel;
use crate::protocol::transport::tp::MAX_MESSAGE_LENGTH;
use heapless::Vec;

//==================================================================================Constants

/// Maximum number of responder registrations.
pub const MAX_RESPONDERS: usize = 8;

/// Callback invoked synchronously before a registration's buffer is
/// sent, free to rewrite the payload in place. Bound at registration
/// time to that registration's own buffer; no hidden shared state.
pub type RefreshFn = fn(&mut [u8]);

//==================================================================================Registration

/// One responder: a PGN served on one channel from an inline buffer.
pub struct ResponderRegistration {
    pgn: u32,
    channel: Channel,
    data: [u8; MAX_MESSAGE_LENGTH],
    len: u16,
    refresh: Option<RefreshFn>,
}

impl ResponderRegistration {
    /// PGN this entry answers for.
    #[inline]
    pub fn pgn(&self) -> u32 {
        self.pgn
    }

    /// Channel this entry answers on.
    #[inline]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Run the refresh callback (exactly once) and expose the payload
    /// to send.
    pub fn refresh_and_payload(&mut self) -> &[u8] {
        let valid = &mut self.data[..self.len as usize];
        if let Some(refresh) = self.refresh {
            refresh(valid);
        }
        &self.data[..self.len as usize]
    }
}

//==================================================================================Registry

/// Ordered, fixed-capacity responder table owned by the dispatcher.
pub struct PgnRegistry {
    entries: Vec<ResponderRegistration, MAX_RESPONDERS>,
}

impl Default for PgnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PgnRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registrations currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the registry holds no registration.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a registration at the tail. The payload is copied into
    /// the entry's own buffer; later registrations for the same PGN are
    /// simply additional entries, scanned after this one.
    pub fn register(
        &mut self,
        pgn: u32,
        channel: Channel,
        data: &[u8],
        refresh: Option<RefreshFn>,
    ) -> Result<(), RegistryError> {
        if data.is_empty() || data.len() > MAX_MESSAGE_LENGTH {
            return Err(RegistryError::ParamError);
        }
        let mut entry = ResponderRegistration {
            pgn,
            channel,
            data: [0xFF; MAX_MESSAGE_LENGTH],
            len: data.len() as u16,
            refresh,
        };
        entry.data[..data.len()].copy_from_slice(data);
        self.entries
            .push(entry)
            .map_err(|_| RegistryError::CapacityExceeded)
    }

    /// First registration matching the requested PGN on the channel,
    /// in insertion order.
    pub fn first_match(
        &mut self,
        pgn: u32,
        channel: Channel,
    ) -> Option<&mut ResponderRegistration> {
        self.entries
            .iter_mut()
            .find(|entry| entry.pgn == pgn && entry.channel == channel)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

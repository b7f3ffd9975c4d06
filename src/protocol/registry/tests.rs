//! Unit tests for the PGN responder registry.
use super::*;

const PGN: u32 = 0xFECA;

#[test]
/// Registrations resolve in insertion order; the first match wins.
fn test_first_match_in_insertion_order() {
    let mut registry = PgnRegistry::new();
    registry
        .register(PGN, Channel::Can0, &[0x11], None)
        .unwrap();
    registry
        .register(PGN, Channel::Can0, &[0x22], None)
        .unwrap();

    let entry = registry.first_match(PGN, Channel::Can0).unwrap();
    assert_eq!(entry.refresh_and_payload(), &[0x11]);
}

#[test]
/// A match is scoped to the channel it was registered on.
fn test_match_is_per_channel() {
    let mut registry = PgnRegistry::new();
    registry
        .register(PGN, Channel::Can1, &[0x33], None)
        .unwrap();

    assert!(registry.first_match(PGN, Channel::Can0).is_none());
    assert!(registry.first_match(PGN, Channel::Can1).is_some());
}

#[test]
/// An unregistered PGN yields no responder.
fn test_unknown_pgn() {
    let mut registry = PgnRegistry::new();
    registry
        .register(PGN, Channel::Can0, &[0x11], None)
        .unwrap();
    assert!(registry.first_match(PGN + 1, Channel::Can0).is_none());
}

#[test]
/// The payload is copied at registration time: later changes to the
/// caller's buffer do not leak into the entry.
fn test_payload_copied_inline() {
    let mut registry = PgnRegistry::new();
    let mut data = [0xAAu8; 4];
    registry.register(PGN, Channel::Can0, &data, None).unwrap();
    data.fill(0xBB);

    let entry = registry.first_match(PGN, Channel::Can0).unwrap();
    assert_eq!(entry.refresh_and_payload(), &[0xAA; 4]);
}

#[test]
/// The refresh callback rewrites the entry's own buffer before it is
/// exposed, and only sees the valid bytes.
fn test_refresh_rewrites_payload() {
    fn bump(data: &mut [u8]) {
        assert_eq!(data.len(), 2);
        data[0] = data[0].wrapping_add(1);
    }

    let mut registry = PgnRegistry::new();
    registry
        .register(PGN, Channel::Can0, &[0, 0x7F], Some(bump))
        .unwrap();

    let entry = registry.first_match(PGN, Channel::Can0).unwrap();
    assert_eq!(entry.refresh_and_payload(), &[1, 0x7F]);
    assert_eq!(entry.refresh_and_payload(), &[2, 0x7F]);
}

#[test]
/// Length bounds and table capacity are enforced at registration.
fn test_register_bounds() {
    let mut registry = PgnRegistry::new();
    assert_eq!(
        registry.register(PGN, Channel::Can0, &[], None),
        Err(RegistryError::ParamError)
    );
    assert_eq!(
        registry.register(PGN, Channel::Can0, &[0; MAX_MESSAGE_LENGTH + 1], None),
        Err(RegistryError::ParamError)
    );

    for i in 0..MAX_RESPONDERS as u32 {
        registry
            .register(PGN + i, Channel::Can0, &[0x01], None)
            .unwrap();
    }
    assert_eq!(
        registry.register(PGN, Channel::Can0, &[0x01], None),
        Err(RegistryError::CapacityExceeded)
    );
    assert_eq!(registry.len(), MAX_RESPONDERS);
}

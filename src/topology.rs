//! Fixed society topology: named building blocks, their floor counts, and
//! the floor → room-suffix map.  Donation records are only valid for rooms
//! that exist here.

use crate::errors::{LedgerError, Result};

/// Building blocks and how many floors each has above ground.
/// A building with `floors = n` has floors `0..=n`; floor 0 is ground.
pub const BUILDINGS: &[(&str, u8)] = &[
    ("D-1", 2),
    ("D-2", 3),
    ("D-3", 2),
    ("D-4", 3),
    ("D-5", 3),
    ("D-6", 2),
    ("D-7", 3),
];

/// Room-number suffixes per floor; every floor has the same four stacks.
const ROOM_STACKS: [&str; 4] = ["01", "02", "03", "04"];

/// Floor count for a building, or `None` for an unknown block name.
pub fn floors_of(building: &str) -> Option<u8> {
    BUILDINGS
        .iter()
        .find(|(name, _)| *name == building)
        .map(|(_, floors)| *floors)
}

/// The room numbers on one floor, e.g. floor 1 → `["101", ..., "104"]`.
pub fn rooms_on_floor(floor: u8) -> Vec<String> {
    ROOM_STACKS
        .iter()
        .map(|stack| format!("{floor}{stack}"))
        .collect()
}

/// Check that `(building, room_number)` names a physical unit.
pub fn validate_room(building: &str, room_number: &str) -> Result<()> {
    let floors = floors_of(building).ok_or_else(|| {
        LedgerError::Validation(format!("unknown building: {building}"))
    })?;

    let valid = (0..=floors).any(|floor| {
        rooms_on_floor(floor)
            .iter()
            .any(|room| room == room_number)
    });
    if !valid {
        return Err(LedgerError::Validation(format!(
            "no room {room_number} in building {building}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_floor_rooms_are_zero_prefixed() {
        assert_eq!(rooms_on_floor(0), vec!["001", "002", "003", "004"]);
        assert_eq!(rooms_on_floor(3), vec!["301", "302", "303", "304"]);
    }

    #[test]
    fn known_rooms_validate() {
        assert!(validate_room("D-2", "101").is_ok());
        assert!(validate_room("D-2", "304").is_ok());
        assert!(validate_room("D-1", "001").is_ok());
        assert!(validate_room("D-1", "204").is_ok());
    }

    #[test]
    fn floor_above_building_height_is_rejected() {
        // D-1 has 2 floors, so the 3xx range does not exist there.
        assert!(validate_room("D-1", "301").is_err());
        // But D-2 has 3 floors.
        assert!(validate_room("D-2", "301").is_ok());
    }

    #[test]
    fn unknown_building_and_bad_suffix_are_rejected() {
        assert!(validate_room("D-9", "101").is_err());
        assert!(validate_room("D-2", "105").is_err());
        assert!(validate_room("D-2", "1").is_err());
    }
}

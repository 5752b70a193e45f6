//! Utility functions for prana-core.

use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they are
/// MAC addresses.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Normalize a Bluetooth address for comparison: lowercase, no separators.
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| !matches!(c, ':' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether two addresses refer to the same device.
///
/// The all-zero address reported by macOS never matches.
pub fn addresses_match(a: &str, b: &str) -> bool {
    let a = normalize_address(a);
    !a.is_empty() && a != "000000000000" && a == normalize_address(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("AA:BB:CC:DD:EE:FF"), "aabbccddeeff");
        assert_eq!(normalize_address("aa-bb-cc-dd-ee-ff"), "aabbccddeeff");
        assert_eq!(normalize_address(""), "");
    }

    #[test]
    fn test_addresses_match() {
        assert!(addresses_match("AA:BB:CC:DD:EE:FF", "aabbccddeeff"));
        assert!(addresses_match("aa:bb:cc:dd:ee:ff", "AA-BB-CC-DD-EE-FF"));
        assert!(!addresses_match("AA:BB:CC:DD:EE:FF", "AA:BB:CC:DD:EE:00"));
        assert!(!addresses_match("00:00:00:00:00:00", "00:00:00:00:00:00"));
        assert!(!addresses_match("", ""));
    }
}

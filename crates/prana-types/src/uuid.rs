//! Bluetooth UUIDs and advertisement names for Prana devices.

use uuid::{Uuid, uuid};

/// Primary service advertised by Prana units.
pub const PRANA_SERVICE: Uuid = uuid!("000000ee-0000-1000-8000-00805f9b34fb");

/// Read/write/notify characteristic carrying commands and state frames.
pub const CONTROL_CHARACTERISTIC: Uuid = uuid!("0000cccc-0000-1000-8000-00805f9b34fb");

/// Local name prefixes used by Prana units in advertisements.
pub const DEVICE_NAME_PREFIXES: [&str; 3] = ["PRNAQaq", "PRANA", "PRNBYav"];

/// Whether an advertised local name looks like a Prana unit.
pub fn is_prana_name(name: &str) -> bool {
    DEVICE_NAME_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

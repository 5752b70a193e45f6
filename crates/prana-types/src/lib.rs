//! Platform-agnostic protocol types for Prana BLE ventilation units.
//!
//! This crate holds everything about the Prana wire protocol that does not
//! need a Bluetooth stack or an async runtime:
//!
//! - [`Command`] encoding and the static command tables
//! - [`DeviceState`] decoding of the 100-byte state frame
//! - [`FrameAssembler`] for rebuilding frames from notification chunks
//! - GATT UUID constants
//!
//! # Example
//!
//! ```
//! use prana_types::{Fan, FrameAssembler, ChunkOutcome, speed_command};
//!
//! let command = speed_command(Fan::Main, 3).unwrap();
//! assert_eq!(command.payload(), &[0xBE, 0xEF, 0x04, 53]);
//!
//! let mut assembler = FrameAssembler::new();
//! assert_eq!(assembler.push(&[0x00]), ChunkOutcome::Discarded);
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod state;
pub mod uuid;

pub use command::{
    COMMAND_PREFIX, Command, DisplayMode, Fan, MAX_BRIGHTNESS, MAX_SPEED, Mode, Switch,
    brightness_command, brightness_table, display_command, display_command_by_name, encode,
    mode_command, mode_command_by_name, power_toggle_command, speed_command, speed_table,
    toggle_command,
};
pub use error::{ParseError, ParseResult};
pub use frame::{ChunkOutcome, Frame, FrameAssembler};
pub use state::{DeviceState, STATE_FRAME_LEN, brightness_from_raw};
pub use uuid as uuids;

/// Decode a raw state frame.
///
/// Equivalent to [`DeviceState::from_bytes`].
pub fn decode(frame: &[u8]) -> ParseResult<DeviceState> {
    DeviceState::from_bytes(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::offset;

    fn frame_with(f: impl FnOnce(&mut [u8])) -> Vec<u8> {
        let mut frame = vec![0u8; STATE_FRAME_LEN];
        frame[..2].copy_from_slice(&COMMAND_PREFIX);
        frame[offset::HUMIDITY] = 128;
        f(&mut frame);
        frame
    }

    #[test]
    fn test_decode_matches_from_bytes() {
        let frame = frame_with(|f| f[offset::POWER] = 1);
        assert_eq!(decode(&frame).unwrap(), DeviceState::from_bytes(&frame).unwrap());
    }

    #[test]
    fn test_unlocked_speed_is_max_of_flows() {
        let frame = frame_with(|f| {
            f[offset::SPEED_IN] = 30;
            f[offset::SPEED_OUT] = 50;
        });
        let state = decode(&frame).unwrap();
        assert!(!state.flows_locked);
        assert_eq!((state.speed, state.speed_in, state.speed_out), (5, 3, 5));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_state_serializes_with_wire_names() {
        let frame = frame_with(|f| {
            f[offset::AUTO_MODE] = 2;
            f[offset::DISPLAY] = 0x1;
        });
        let state = decode(&frame).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["mode"], "auto_plus");
        assert_eq!(json["display"], "temp_in");

        let back: DeviceState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_unknown_display_serializes_as_null() {
        let frame = frame_with(|f| f[offset::DISPLAY] = 0x42);
        let json = serde_json::to_value(decode(&frame).unwrap()).unwrap();
        assert!(json["display"].is_null());
        assert!(json["mode"].is_null());
    }
}

//! Decoding of the 100-byte state frame.

use core::fmt;

use bytes::Buf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::command::{COMMAND_PREFIX, DisplayMode, Fan, Mode, Switch};
use crate::error::{ParseError, ParseResult};

/// Length of a complete state frame.
pub const STATE_FRAME_LEN: usize = 100;

/// Mask stripping the two status bits that share a halfword with the value.
pub const HALFWORD_VALUE_MASK: u16 = 0x3FFF;

/// Byte offsets of the fields in a state frame.
pub mod offset {
    /// Main power flag.
    pub const POWER: usize = 10;
    /// Display brightness, one bit per level.
    pub const BRIGHTNESS: usize = 12;
    /// Mini heating flag (`1` = on).
    pub const MINI_HEATING: usize = 14;
    /// Night mode flag.
    pub const NIGHT_MODE: usize = 16;
    /// Boost mode flag.
    pub const BOOST_MODE: usize = 18;
    /// Auto mode selector (`1` = auto, `2` = auto plus).
    pub const AUTO_MODE: usize = 20;
    /// Flows locked flag.
    pub const FLOWS_LOCKED: usize = 22;
    /// Combined speed (×10), meaningful while flows are locked.
    pub const SPEED: usize = 26;
    /// Supply fan power flag.
    pub const POWER_IN: usize = 28;
    /// Supply fan speed (×10).
    pub const SPEED_IN: usize = 30;
    /// Exhaust fan power flag.
    pub const POWER_OUT: usize = 32;
    /// Exhaust fan speed (×10).
    pub const SPEED_OUT: usize = 34;
    /// Winter mode flag (`1` = on).
    pub const WINTER_MODE: usize = 42;
    /// Indoor temperature halfword (°C ×10).
    pub const TEMP_IN: usize = 48;
    /// Outside temperature halfword (°C ×10).
    pub const TEMP_OUTSIDE: usize = 51;
    /// Exhaust temperature halfword (°C ×10).
    pub const TEMP_OUT: usize = 54;
    /// Humidity, offset by 128.
    pub const HUMIDITY: usize = 60;
    /// CO2 halfword.
    pub const CO2: usize = 61;
    /// TVOC halfword.
    pub const TVOC: usize = 63;
    /// Pressure halfword.
    pub const PRESSURE: usize = 77;
    /// Display mode code.
    pub const DISPLAY: usize = 99;
}

/// Snapshot of one decoded state frame.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceState {
    /// Main power.
    pub power: bool,
    /// Supply fan power.
    pub power_in: bool,
    /// Exhaust fan power.
    pub power_out: bool,
    /// Main fan level (0-10).
    ///
    /// While flows are locked this is the device's combined speed; otherwise
    /// it is `max(speed_in, speed_out)`.
    pub speed: u8,
    /// Supply fan level (0-10).
    pub speed_in: u8,
    /// Exhaust fan level (0-10).
    pub speed_out: u8,
    /// Active preset mode, `None` when no preset is active.
    pub mode: Option<Mode>,
    /// Supply and exhaust locked together.
    pub flows_locked: bool,
    /// Mini heating enabled.
    pub mini_heating: bool,
    /// Winter mode enabled.
    pub winter_mode: bool,
    /// Display brightness (0-6).
    pub brightness: u8,
    /// Current front panel display, `None` for unknown codes.
    pub display: Option<DisplayMode>,
    /// Indoor temperature in °C.
    pub temp_in: f32,
    /// Exhaust temperature in °C.
    pub temp_out: f32,
    /// Outside temperature in °C.
    pub temp_outside: f32,
    /// Relative humidity in percent.
    pub humidity: i16,
    /// Air pressure.
    pub pressure: u16,
    /// CO2 concentration.
    pub co2: u16,
    /// Volatile organic compounds.
    pub tvoc: u16,
}

impl DeviceState {
    /// Decode a state frame.
    ///
    /// Only the first [`STATE_FRAME_LEN`] bytes are inspected.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::FrameTooShort`] if `data` holds fewer than
    /// [`STATE_FRAME_LEN`] bytes, or [`ParseError::BadPrefix`] if it does
    /// not start with [`COMMAND_PREFIX`].
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        if data.len() < STATE_FRAME_LEN {
            return Err(ParseError::FrameTooShort {
                expected: STATE_FRAME_LEN,
                actual: data.len(),
            });
        }
        if data[..COMMAND_PREFIX.len()] != COMMAND_PREFIX {
            return Err(ParseError::BadPrefix {
                found: data[..COMMAND_PREFIX.len()].to_vec(),
            });
        }

        let flows_locked = data[offset::FLOWS_LOCKED] != 0;
        let speed_in = data[offset::SPEED_IN] / 10;
        let speed_out = data[offset::SPEED_OUT] / 10;
        let speed = if flows_locked {
            data[offset::SPEED] / 10
        } else {
            speed_in.max(speed_out)
        };

        Ok(Self {
            power: data[offset::POWER] != 0,
            power_in: data[offset::POWER_IN] != 0,
            power_out: data[offset::POWER_OUT] != 0,
            speed,
            speed_in,
            speed_out,
            mode: decode_mode(data),
            flows_locked,
            mini_heating: data[offset::MINI_HEATING] == 1,
            winter_mode: data[offset::WINTER_MODE] == 1,
            brightness: brightness_from_raw(data[offset::BRIGHTNESS]),
            display: DisplayMode::from_state_code(data[offset::DISPLAY]),
            temp_in: f32::from(masked_halfword(data, offset::TEMP_IN)) / 10.0,
            temp_out: f32::from(masked_halfword(data, offset::TEMP_OUT)) / 10.0,
            temp_outside: f32::from(masked_halfword(data, offset::TEMP_OUTSIDE)) / 10.0,
            humidity: i16::from(data[offset::HUMIDITY]) - 128,
            pressure: masked_halfword(data, offset::PRESSURE),
            co2: masked_halfword(data, offset::CO2),
            tvoc: masked_halfword(data, offset::TVOC),
        })
    }

    /// Power flag of a fan.
    pub fn fan_power(&self, fan: Fan) -> bool {
        match fan {
            Fan::Main => self.power,
            Fan::In => self.power_in,
            Fan::Out => self.power_out,
        }
    }

    /// Speed level of a fan.
    pub fn fan_speed(&self, fan: Fan) -> u8 {
        match fan {
            Fan::Main => self.speed,
            Fan::In => self.speed_in,
            Fan::Out => self.speed_out,
        }
    }

    /// Current position of a switch.
    pub fn switch(&self, switch: Switch) -> bool {
        match switch {
            Switch::FlowsLocked => self.flows_locked,
            Switch::WinterMode => self.winter_mode,
            Switch::MiniHeating => self.mini_heating,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |b: bool| if b { "on" } else { "off" };
        write!(
            f,
            "power={} speed={} (in={} out={}) mode={} temp_in={:.1} temp_out={:.1} \
             temp_outside={:.1} humidity={} co2={} tvoc={} pressure={}",
            on_off(self.power),
            self.speed,
            self.speed_in,
            self.speed_out,
            self.mode.map_or("none", Mode::as_str),
            self.temp_in,
            self.temp_out,
            self.temp_outside,
            self.humidity,
            self.co2,
            self.tvoc,
            self.pressure,
        )
    }
}

/// Decode display brightness from its raw one-bit-per-level byte.
///
/// `0` maps to `0`; otherwise the result is `floor(log2(raw)) + 1`, so the
/// expected powers of two 1, 2, 4, ..., 32 map to 1..=6. Other values are
/// clamped down to their highest set bit (3 decodes as 2, 255 as 8).
pub fn brightness_from_raw(raw: u8) -> u8 {
    if raw == 0 { 0 } else { raw.ilog2() as u8 + 1 }
}

/// Read a big-endian halfword and keep its low 14 bits.
///
/// The halfword is read signed and then masked, so negative magnitudes lose
/// their sign rather than being sign-extended from bit 13.
pub fn masked_halfword(data: &[u8], at: usize) -> u16 {
    let mut buf = &data[at..];
    (buf.get_i16() as u16) & HALFWORD_VALUE_MASK
}

fn decode_mode(data: &[u8]) -> Option<Mode> {
    match data[offset::AUTO_MODE] {
        1 => Some(Mode::Auto),
        2 => Some(Mode::AutoPlus),
        _ if data[offset::BOOST_MODE] == 1 => Some(Mode::Boost),
        _ if data[offset::NIGHT_MODE] == 1 => Some(Mode::Night),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frame() -> [u8; STATE_FRAME_LEN] {
        let mut frame = [0u8; STATE_FRAME_LEN];
        frame[..2].copy_from_slice(&COMMAND_PREFIX);
        frame[offset::HUMIDITY] = 128;
        frame
    }

    #[test]
    fn test_decode_blank_frame() {
        let state = DeviceState::from_bytes(&blank_frame()).unwrap();
        assert!(!state.power);
        assert_eq!(state.speed, 0);
        assert_eq!(state.mode, None);
        assert_eq!(state.brightness, 0);
        assert_eq!(state.display, Some(DisplayMode::Fan));
        assert_eq!(state.humidity, 0);
        assert_eq!(state.co2, 0);
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let frame = blank_frame();
        let err = DeviceState::from_bytes(&frame[..99]).unwrap_err();
        assert_eq!(
            err,
            ParseError::FrameTooShort {
                expected: 100,
                actual: 99
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_prefix() {
        let mut frame = blank_frame();
        frame[1] = 0xEE;
        let err = DeviceState::from_bytes(&frame).unwrap_err();
        assert_eq!(
            err,
            ParseError::BadPrefix {
                found: vec![0xBE, 0xEE]
            }
        );
    }

    #[test]
    fn test_decode_powers_and_speeds() {
        let mut frame = blank_frame();
        frame[offset::POWER] = 1;
        frame[offset::POWER_IN] = 1;
        frame[offset::POWER_OUT] = 0;
        frame[offset::SPEED_IN] = 30;
        frame[offset::SPEED_OUT] = 55;
        frame[offset::SPEED] = 90;

        let state = DeviceState::from_bytes(&frame).unwrap();
        assert!(state.power);
        assert!(state.power_in);
        assert!(!state.power_out);
        assert_eq!(state.speed_in, 3);
        assert_eq!(state.speed_out, 5);
        // Unlocked: combined byte ignored, speed is the larger flow.
        assert_eq!(state.speed, 5);

        frame[offset::FLOWS_LOCKED] = 1;
        let state = DeviceState::from_bytes(&frame).unwrap();
        assert!(state.flows_locked);
        assert_eq!(state.speed, 9);
        assert_eq!(state.speed_in, 3);
        assert_eq!(state.speed_out, 5);
    }

    #[test]
    fn test_decode_mode_priority() {
        let mut frame = blank_frame();
        frame[offset::NIGHT_MODE] = 1;
        assert_eq!(DeviceState::from_bytes(&frame).unwrap().mode, Some(Mode::Night));

        frame[offset::BOOST_MODE] = 1;
        assert_eq!(DeviceState::from_bytes(&frame).unwrap().mode, Some(Mode::Boost));

        frame[offset::AUTO_MODE] = 2;
        assert_eq!(
            DeviceState::from_bytes(&frame).unwrap().mode,
            Some(Mode::AutoPlus)
        );

        frame[offset::AUTO_MODE] = 1;
        assert_eq!(DeviceState::from_bytes(&frame).unwrap().mode, Some(Mode::Auto));

        // Unknown auto selector falls through to the other flags.
        frame[offset::AUTO_MODE] = 3;
        assert_eq!(DeviceState::from_bytes(&frame).unwrap().mode, Some(Mode::Boost));
    }

    #[test]
    fn test_decode_toggles_require_exact_one() {
        let mut frame = blank_frame();
        frame[offset::MINI_HEATING] = 2;
        frame[offset::WINTER_MODE] = 1;
        let state = DeviceState::from_bytes(&frame).unwrap();
        assert!(!state.mini_heating);
        assert!(state.winter_mode);
        assert!(state.switch(Switch::WinterMode));
        assert!(!state.switch(Switch::MiniHeating));
    }

    #[test]
    fn test_brightness_from_raw() {
        assert_eq!(brightness_from_raw(0x00), 0);
        assert_eq!(brightness_from_raw(0x01), 1);
        assert_eq!(brightness_from_raw(0x08), 4);
        assert_eq!(brightness_from_raw(0x20), 6);
        assert_eq!(brightness_from_raw(3), 2);
        assert_eq!(brightness_from_raw(0xFF), 8);
    }

    #[test]
    fn test_decode_humidity() {
        let mut frame = blank_frame();
        frame[offset::HUMIDITY] = 0xA0;
        assert_eq!(DeviceState::from_bytes(&frame).unwrap().humidity, 32);

        frame[offset::HUMIDITY] = 100;
        assert_eq!(DeviceState::from_bytes(&frame).unwrap().humidity, -28);
    }

    #[test]
    fn test_decode_temperatures() {
        let mut frame = blank_frame();
        frame[offset::TEMP_IN..offset::TEMP_IN + 2].copy_from_slice(&[0x00, 0xC8]);
        frame[offset::TEMP_OUTSIDE..offset::TEMP_OUTSIDE + 2].copy_from_slice(&[0x00, 0x19]);
        // Status bits set above the 14-bit value.
        frame[offset::TEMP_OUT..offset::TEMP_OUT + 2].copy_from_slice(&[0xC0, 0xD2]);

        let state = DeviceState::from_bytes(&frame).unwrap();
        assert!((state.temp_in - 20.0).abs() < f32::EPSILON);
        assert!((state.temp_outside - 2.5).abs() < 0.001);
        assert!((state.temp_out - 21.0).abs() < 0.001);
    }

    #[test]
    fn test_masked_halfword_keeps_low_bits_of_negative_values() {
        // -5 as i16 is 0xFFFB; masking leaves 0x3FFB rather than -5.
        let data = [0xFF, 0xFB];
        assert_eq!(masked_halfword(&data, 0), 0x3FFB);
        assert_eq!(masked_halfword(&[0x12, 0x34], 0), 0x1234);
    }

    #[test]
    fn test_decode_air_quality() {
        let mut frame = blank_frame();
        frame[offset::CO2..offset::CO2 + 2].copy_from_slice(&[0x02, 0x58]);
        frame[offset::TVOC..offset::TVOC + 2].copy_from_slice(&[0x00, 0x2A]);
        frame[offset::PRESSURE..offset::PRESSURE + 2].copy_from_slice(&[0x43, 0xF5]);

        let state = DeviceState::from_bytes(&frame).unwrap();
        assert_eq!(state.co2, 600);
        assert_eq!(state.tvoc, 42);
        assert_eq!(state.pressure, 0x03F5);
    }

    #[test]
    fn test_decode_display() {
        let mut frame = blank_frame();
        frame[offset::DISPLAY] = 0x3;
        assert_eq!(
            DeviceState::from_bytes(&frame).unwrap().display,
            Some(DisplayMode::Co2)
        );
        frame[offset::DISPLAY] = 0x8;
        assert_eq!(DeviceState::from_bytes(&frame).unwrap().display, None);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut long = blank_frame().to_vec();
        long.extend_from_slice(&[0xAA; 20]);
        assert_eq!(
            DeviceState::from_bytes(&long).unwrap(),
            DeviceState::from_bytes(&blank_frame()).unwrap()
        );
    }

    #[test]
    fn test_fan_projections() {
        let state = DeviceState {
            power: true,
            power_out: true,
            speed: 4,
            speed_in: 2,
            speed_out: 4,
            ..Default::default()
        };
        assert!(state.fan_power(Fan::Main));
        assert!(!state.fan_power(Fan::In));
        assert_eq!(state.fan_speed(Fan::In), 2);
        assert_eq!(state.fan_speed(Fan::Out), 4);
    }

    #[test]
    fn test_display_format() {
        let state = DeviceState {
            mode: Some(Mode::Night),
            ..Default::default()
        };
        let text = state.to_string();
        assert!(text.contains("power=off"));
        assert!(text.contains("mode=night"));
    }
}

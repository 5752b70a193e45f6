//! Command encoding and the static command tables.
//!
//! Every command written to the control characteristic starts with the
//! two-byte [`COMMAND_PREFIX`]. Two shapes exist on the wire:
//!
//! - the 7-byte state request (`BE EF 05 01 00 00 00 00 5A`), and
//! - 3-byte *set* commands (`BE EF 04 <byte>`), where the last byte selects
//!   the sub-function (a fan level, a display mode, a toggle, ...).
//!
//! The lookup tables are built once on first use and never mutated. Lookups
//! for keys outside a table fail with [`ParseError::UnsupportedValue`]
//! instead of producing an invalid command.

use core::fmt;
use core::str::FromStr;
use std::sync::LazyLock;

use bytes::{BufMut, Bytes, BytesMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Fixed prefix of every command and every state frame.
pub const COMMAND_PREFIX: [u8; 2] = [0xBE, 0xEF];

/// Opcode byte introducing a single-byte set command.
pub const SET_BYTE: u8 = 0x04;

/// Opcode bytes of the state request command.
pub const REQUEST_STATE_OPCODE: [u8; 7] = [0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x5A];

/// Highest fan speed level accepted by the speed tables.
pub const MAX_SPEED: u8 = 10;

/// Highest display brightness level.
pub const MAX_BRIGHTNESS: u8 = 6;

/// First byte of the brightness set commands (level 0).
pub const BRIGHTNESS_BASE: u8 = 0x6E;

/// An outbound instruction for the device.
///
/// Commands are immutable once constructed and compare by payload bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Command {
    payload: Bytes,
}

impl Command {
    /// Build a command from opcode bytes; the prefix is prepended.
    pub fn new(opcode: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(COMMAND_PREFIX.len() + opcode.len());
        payload.put_slice(&COMMAND_PREFIX);
        payload.put_slice(opcode);
        Self {
            payload: payload.freeze(),
        }
    }

    /// Build a single-byte set command (`BE EF 04 <value>`).
    pub fn set(value: u8) -> Self {
        Self::new(&[SET_BYTE, value])
    }

    /// The command that asks the device to push a full state frame.
    pub fn request_state() -> Self {
        Self::new(&REQUEST_STATE_OPCODE)
    }

    /// Raw bytes to write, prefix included.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Opcode bytes following the prefix.
    pub fn opcode(&self) -> &[u8] {
        &self.payload[COMMAND_PREFIX.len()..]
    }

    /// The configuration byte of a set command, `None` for other shapes.
    pub fn set_value(&self) -> Option<u8> {
        match self.opcode() {
            [SET_BYTE, value] => Some(*value),
            _ => None,
        }
    }

    /// Whether this is the state request command.
    pub fn is_state_request(&self) -> bool {
        self.opcode() == REQUEST_STATE_OPCODE
    }
}

/// Encode a command into the bytes written on the wire.
pub fn encode(command: &Command) -> Bytes {
    command.payload.clone()
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.payload.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command([{}])", self)
    }
}

/// Which fan a speed command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Fan {
    /// Both flows together.
    Main,
    /// Supply (inbound) flow.
    In,
    /// Exhaust (outbound) flow.
    Out,
}

impl Fan {
    /// All fans, in table order.
    pub const ALL: [Fan; 3] = [Fan::Main, Fan::In, Fan::Out];

    /// Set byte for level 1 minus one; level `n` maps to `base + n`.
    pub const fn speed_base(self) -> u8 {
        match self {
            Fan::Main => 50,
            Fan::In => 30,
            Fan::Out => 40,
        }
    }

    /// Set byte of the power toggle that level 0 maps to.
    pub const fn toggle_byte(self) -> u8 {
        match self {
            Fan::Main => 0x0A,
            Fan::In => 0x0D,
            Fan::Out => 0x10,
        }
    }

    const fn index(self) -> usize {
        match self {
            Fan::Main => 0,
            Fan::In => 1,
            Fan::Out => 2,
        }
    }

    /// Wire name of the fan.
    pub const fn as_str(self) -> &'static str {
        match self {
            Fan::Main => "main",
            Fan::In => "in",
            Fan::Out => "out",
        }
    }
}

impl fmt::Display for Fan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fan {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fan::ALL
            .into_iter()
            .find(|fan| fan.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::unsupported("fan", s))
    }
}

/// Front panel display modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DisplayMode {
    /// Fan speed.
    Fan,
    /// Indoor air temperature.
    TempIn,
    /// Exhaust air temperature.
    TempOut,
    /// CO2 concentration.
    Co2,
    /// Volatile organic compounds.
    Tvoc,
    /// Relative humidity.
    Humidity,
    /// Heat recovery efficiency.
    Efficiency,
    /// Air pressure.
    Pressure,
    /// Current date.
    Date,
    /// Current time.
    Time,
}

impl DisplayMode {
    /// All display modes, ordered by state code.
    pub const ALL: [DisplayMode; 10] = [
        DisplayMode::Fan,
        DisplayMode::TempIn,
        DisplayMode::TempOut,
        DisplayMode::Co2,
        DisplayMode::Tvoc,
        DisplayMode::Humidity,
        DisplayMode::Efficiency,
        DisplayMode::Pressure,
        DisplayMode::Date,
        DisplayMode::Time,
    ];

    /// Code reported in the state frame. Code 0x8 is unassigned.
    pub const fn state_code(self) -> u8 {
        match self {
            DisplayMode::Fan => 0x0,
            DisplayMode::TempIn => 0x1,
            DisplayMode::TempOut => 0x2,
            DisplayMode::Co2 => 0x3,
            DisplayMode::Tvoc => 0x4,
            DisplayMode::Humidity => 0x5,
            DisplayMode::Efficiency => 0x6,
            DisplayMode::Pressure => 0x7,
            DisplayMode::Date => 0x9,
            DisplayMode::Time => 0xA,
        }
    }

    /// Byte of the set command selecting this mode.
    pub const fn set_byte(self) -> u8 {
        match self {
            DisplayMode::Fan => 0x62,
            DisplayMode::TempIn => 0x5B,
            DisplayMode::TempOut => 0x5C,
            DisplayMode::Co2 => 0x5D,
            DisplayMode::Tvoc => 0x5E,
            DisplayMode::Humidity => 0x5F,
            DisplayMode::Efficiency => 0x60,
            DisplayMode::Pressure => 0x61,
            DisplayMode::Date => 0x63,
            DisplayMode::Time => 0x64,
        }
    }

    /// Look up a display mode by the code found in a state frame.
    pub fn from_state_code(code: u8) -> Option<Self> {
        DisplayMode::ALL
            .into_iter()
            .find(|mode| mode.state_code() == code)
    }

    /// Wire name of the display mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Fan => "fan",
            DisplayMode::TempIn => "temp_in",
            DisplayMode::TempOut => "temp_out",
            DisplayMode::Co2 => "co2",
            DisplayMode::Tvoc => "tvoc",
            DisplayMode::Humidity => "humidity",
            DisplayMode::Efficiency => "efficiency",
            DisplayMode::Pressure => "pressure",
            DisplayMode::Date => "date",
            DisplayMode::Time => "time",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::unsupported("display mode", s))
    }
}

/// Preset operating modes.
///
/// A frame with none of the mode flags set decodes to `None` at the
/// [`DeviceState`](crate::DeviceState) level; there is no command for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Mode {
    /// Automatic ventilation.
    Auto,
    /// Automatic ventilation, extended.
    AutoPlus,
    /// Maximum airflow.
    Boost,
    /// Quiet night operation.
    Night,
}

impl Mode {
    /// All preset modes.
    pub const ALL: [Mode; 4] = [Mode::Auto, Mode::AutoPlus, Mode::Night, Mode::Boost];

    /// Byte of the set command selecting this mode.
    pub const fn set_byte(self) -> u8 {
        match self {
            Mode::Auto => 0x43,
            Mode::AutoPlus => 0x44,
            Mode::Night => 0x06,
            Mode::Boost => 0x07,
        }
    }

    /// Wire name of the mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::AutoPlus => "auto_plus",
            Mode::Boost => "boost",
            Mode::Night => "night",
        }
    }

    const fn index(self) -> usize {
        match self {
            Mode::Auto => 0,
            Mode::AutoPlus => 1,
            Mode::Night => 2,
            Mode::Boost => 3,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::unsupported("preset mode", s))
    }
}

/// On/off features controlled by a single toggle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Switch {
    /// Supply and exhaust fans locked to the same speed.
    FlowsLocked,
    /// Winter (anti-freeze) mode.
    WinterMode,
    /// Mini heating element.
    MiniHeating,
}

impl Switch {
    /// All switches.
    pub const ALL: [Switch; 3] = [Switch::FlowsLocked, Switch::WinterMode, Switch::MiniHeating];

    /// Byte of the toggle command.
    pub const fn toggle_byte(self) -> u8 {
        match self {
            Switch::FlowsLocked => 0x09,
            Switch::WinterMode => 0x16,
            Switch::MiniHeating => 0x05,
        }
    }

    /// Wire name of the switch.
    pub const fn as_str(self) -> &'static str {
        match self {
            Switch::FlowsLocked => "flows_locked",
            Switch::WinterMode => "winter_mode",
            Switch::MiniHeating => "mini_heating",
        }
    }

    const fn index(self) -> usize {
        match self {
            Switch::FlowsLocked => 0,
            Switch::WinterMode => 1,
            Switch::MiniHeating => 2,
        }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Switch {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Switch::ALL
            .into_iter()
            .find(|switch| switch.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::unsupported("switch", s))
    }
}

struct CommandTables {
    speed: [[Command; MAX_SPEED as usize + 1]; 3],
    brightness: [Command; MAX_BRIGHTNESS as usize + 1],
    display: [Command; DisplayMode::ALL.len()],
    mode: [Command; Mode::ALL.len()],
    toggle: [Command; Switch::ALL.len()],
}

impl CommandTables {
    fn build() -> Self {
        let speed: [[Command; MAX_SPEED as usize + 1]; 3] = Fan::ALL.map(|fan| {
            core::array::from_fn(|level| {
                if level == 0 {
                    Command::set(fan.toggle_byte())
                } else {
                    Command::set(fan.speed_base() + level as u8)
                }
            })
        });

        Self {
            speed,
            brightness: core::array::from_fn(|level| Command::set(BRIGHTNESS_BASE + level as u8)),
            display: DisplayMode::ALL.map(|mode| Command::set(mode.set_byte())),
            mode: Mode::ALL.map(|mode| Command::set(mode.set_byte())),
            toggle: Switch::ALL.map(|switch| Command::set(switch.toggle_byte())),
        }
    }
}

static TABLES: LazyLock<CommandTables> = LazyLock::new(CommandTables::build);

/// The full speed table for a fan, indexed by level (`0..=MAX_SPEED`).
///
/// Level 0 is the fan's power toggle, not a "set to zero" command.
pub fn speed_table(fan: Fan) -> &'static [Command] {
    &TABLES.speed[fan.index()]
}

/// The brightness table, indexed by level (`0..=MAX_BRIGHTNESS`).
pub fn brightness_table() -> &'static [Command] {
    &TABLES.brightness
}

/// Command setting `fan` to `level`.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedValue`] if `level > MAX_SPEED`.
pub fn speed_command(fan: Fan, level: u8) -> ParseResult<Command> {
    speed_table(fan)
        .get(usize::from(level))
        .cloned()
        .ok_or_else(|| ParseError::unsupported("speed", level))
}

/// Command toggling the power of `fan` (identical to speed level 0).
pub fn power_toggle_command(fan: Fan) -> Command {
    TABLES.speed[fan.index()][0].clone()
}

/// Command setting the display brightness.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedValue`] if `level > MAX_BRIGHTNESS`.
pub fn brightness_command(level: u8) -> ParseResult<Command> {
    TABLES
        .brightness
        .get(usize::from(level))
        .cloned()
        .ok_or_else(|| ParseError::unsupported("brightness", level))
}

/// Command switching the front panel to `mode`.
pub fn display_command(mode: DisplayMode) -> Command {
    TABLES.display[mode.index()].clone()
}

/// Command switching the front panel to the display mode named `name`.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedValue`] for unknown names.
pub fn display_command_by_name(name: &str) -> ParseResult<Command> {
    name.parse().map(display_command)
}

/// Command selecting a preset mode.
pub fn mode_command(mode: Mode) -> Command {
    TABLES.mode[mode.index()].clone()
}

/// Command selecting the preset mode named `name`.
///
/// # Errors
///
/// Returns [`ParseError::UnsupportedValue`] for unknown names, including `"none"`.
pub fn mode_command_by_name(name: &str) -> ParseResult<Command> {
    name.parse().map(mode_command)
}

/// Command flipping `switch`.
pub fn toggle_command(switch: Switch) -> Command {
    TABLES.toggle[switch.index()].clone()
}

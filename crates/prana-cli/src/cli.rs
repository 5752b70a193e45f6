//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use prana_types::{DisplayMode, Fan, Mode, Switch};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// On/off argument for toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnOff {
    On,
    Off,
}

impl OnOff {
    pub fn is_on(self) -> bool {
        self == OnOff::On
    }
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device BLE address, or use PRANA_DEVICE env var
    #[arg(short, long, env = "PRANA_DEVICE")]
    pub device: Option<String>,

    /// Response timeout in milliseconds (overrides config)
    #[arg(short = 'T', long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Parser)]
#[command(name = "prana")]
#[command(author, version, about = "CLI for Prana ventilation units", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to the config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "PRANA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read the current device state
    State {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Change a device setting
    Set {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format for the resulting state
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        #[command(subcommand)]
        setting: Setting,
    },

    /// Poll the device and print each new state
    Watch {
        #[command(flatten)]
        device: DeviceArgs,

        /// Poll interval in seconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many states (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Settings accepted by `prana set`.
#[derive(Debug, Clone, Subcommand)]
pub enum Setting {
    /// Set a fan speed level (0 toggles the fan's power)
    Speed {
        /// Fan to adjust (main, in, out)
        #[arg(long, default_value = "main")]
        fan: Fan,

        /// Speed level (0-10)
        level: u8,
    },

    /// Set a fan speed as a percentage of the configured max speed
    Percent {
        /// Fan to adjust (main, in, out)
        #[arg(long, default_value = "main")]
        fan: Fan,

        /// Percentage (0-100); 0 turns the fan off
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Turn a fan on or off
    Power {
        /// Fan to switch (main, in, out)
        #[arg(long, default_value = "main")]
        fan: Fan,

        #[arg(value_enum)]
        state: OnOff,
    },

    /// Turn a feature on or off (flows_locked, winter_mode, mini_heating)
    Switch {
        switch: Switch,

        #[arg(value_enum)]
        state: OnOff,
    },

    /// Set display brightness (0-6)
    Brightness { level: u8 },

    /// Select the front panel display (fan, temp_in, temp_out, co2, tvoc,
    /// humidity, efficiency, pressure, date, time)
    Display { mode: DisplayMode },

    /// Select a preset mode (auto, auto_plus, night, boost)
    Mode { mode: Mode },
}

/// Config file actions.
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Device address to store
        #[arg(short, long)]
        device: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

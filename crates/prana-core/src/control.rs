//! High-level control operations on a [`Session`].
//!
//! Toggle commands flip device state rather than set it, so the on/off
//! helpers here compare against the last known state first and only write
//! when a change is needed. The comparison and the write happen under the
//! session's operation lock.

use prana_types::{
    DeviceState, DisplayMode, Fan, MAX_SPEED, Mode, Switch, brightness_command, display_command,
    mode_command, power_toggle_command, speed_command, toggle_command,
};
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::Connector;

/// Default number of user-facing speed steps.
pub const DEFAULT_MAX_SPEED: u8 = 5;

/// Maps percentages onto device speed levels.
///
/// The device supports levels up to [`MAX_SPEED`], but many installations
/// only expose the first few. `max_speed` is the level that 100% maps to.
///
/// # Example
///
/// ```
/// use prana_core::SpeedScale;
///
/// let scale = SpeedScale::new(5).unwrap();
/// assert_eq!(scale.level_for_percentage(0), 0);
/// assert_eq!(scale.level_for_percentage(1), 1);
/// assert_eq!(scale.level_for_percentage(60), 3);
/// assert_eq!(scale.percentage_for_level(3), 60);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedScale {
    max_speed: u8,
}

impl Default for SpeedScale {
    fn default() -> Self {
        Self {
            max_speed: DEFAULT_MAX_SPEED,
        }
    }
}

impl SpeedScale {
    /// Create a scale; `max_speed` must be in `1..=10`.
    pub fn new(max_speed: u8) -> Result<Self> {
        if !(1..=MAX_SPEED).contains(&max_speed) {
            return Err(Error::invalid_config(format!(
                "max speed must be between 1 and {}, got {}",
                MAX_SPEED, max_speed
            )));
        }
        Ok(Self { max_speed })
    }

    /// Highest level on this scale.
    pub fn max_speed(&self) -> u8 {
        self.max_speed
    }

    /// Level for a percentage. 0% is off; any other value maps to at least 1.
    pub fn level_for_percentage(&self, percentage: u8) -> u8 {
        if percentage == 0 {
            return 0;
        }
        let percentage = f64::from(percentage.min(100));
        let level = (percentage / 100.0 * f64::from(self.max_speed)).round_ties_even();
        (level as u8).max(1)
    }

    /// Percentage for a level, clamped to `0..=100`.
    pub fn percentage_for_level(&self, level: u8) -> u8 {
        let pct = (f64::from(level) / f64::from(self.max_speed) * 100.0).round_ties_even();
        pct.clamp(0.0, 100.0) as u8
    }
}

impl<C: Connector> Session<C> {
    /// Set a fan's speed level. Level 0 sends the power toggle.
    pub async fn set_speed(&self, fan: Fan, level: u8) -> Result<DeviceState> {
        let command = speed_command(fan, level)?;
        self.send_command(&command).await
    }

    /// Set a fan speed from a percentage on `scale`.
    ///
    /// 0% turns the fan off (only if it is on).
    pub async fn set_fan_percentage(
        &self,
        fan: Fan,
        percentage: u8,
        scale: SpeedScale,
    ) -> Result<DeviceState> {
        match scale.level_for_percentage(percentage) {
            0 => self.set_fan_power(fan, false).await,
            level => self.set_speed(fan, level).await,
        }
    }

    /// Set panel brightness (0-6).
    pub async fn set_brightness(&self, level: u8) -> Result<DeviceState> {
        let command = brightness_command(level)?;
        self.send_command(&command).await
    }

    /// Select what the front panel shows.
    pub async fn set_display(&self, mode: DisplayMode) -> Result<DeviceState> {
        self.send_command(&display_command(mode)).await
    }

    /// Switch to a preset mode.
    pub async fn set_mode(&self, mode: Mode) -> Result<DeviceState> {
        self.send_command(&mode_command(mode)).await
    }

    /// Turn a switch on or off.
    pub async fn set_switch(&self, switch: Switch, on: bool) -> Result<DeviceState> {
        let _operation = self.lock_operation().await;
        let state = self.known_state_locked().await?;
        if state.switch(switch) == on {
            debug!(%switch, on, "Switch already in requested state");
            return Ok(state);
        }
        self.send_locked(&toggle_command(switch)).await
    }

    /// Turn a fan on or off.
    pub async fn set_fan_power(&self, fan: Fan, on: bool) -> Result<DeviceState> {
        let _operation = self.lock_operation().await;
        let state = self.known_state_locked().await?;
        if state.fan_power(fan) == on {
            debug!(%fan, on, "Fan already in requested state");
            return Ok(state);
        }
        self.send_locked(&power_toggle_command(fan)).await
    }

    async fn known_state_locked(&self) -> Result<DeviceState> {
        match self.last_state() {
            Some(state) => Ok(state),
            None => self.refresh_locked().await,
        }
    }
}

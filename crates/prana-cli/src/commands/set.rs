//! Set command implementation.

use anyhow::Result;
use prana_core::{BleConnector, DeviceState, Session};
use tracing::info;

use crate::cli::{DeviceArgs, OutputFormat, Setting};
use crate::config::Config;
use crate::format::{format_state_json, format_state_text};
use crate::util::open_session;

pub async fn cmd_set(
    device: &DeviceArgs,
    setting: &Setting,
    format: OutputFormat,
    config: &Config,
) -> Result<()> {
    let session = open_session(device, config)?;
    let result = apply(&session, setting, config).await;
    session.shutdown().await;

    let state = result?;
    match format {
        OutputFormat::Text => print!("{}", format_state_text(&state)),
        OutputFormat::Json => println!(
            "{}",
            format_state_json(
                session.address(),
                time::OffsetDateTime::now_utc(),
                &state,
                true
            )?
        ),
    }
    Ok(())
}

async fn apply(
    session: &Session<BleConnector>,
    setting: &Setting,
    config: &Config,
) -> Result<DeviceState> {
    info!("Applying {:?} to {}", setting, session.address());
    let state = match *setting {
        Setting::Speed { fan, level } => session.set_speed(fan, level).await?,
        Setting::Percent { fan, percent } => {
            let scale = config.speed_scale()?;
            session.set_fan_percentage(fan, percent, scale).await?
        }
        Setting::Power { fan, state } => session.set_fan_power(fan, state.is_on()).await?,
        Setting::Switch { switch, state } => session.set_switch(switch, state.is_on()).await?,
        Setting::Brightness { level } => session.set_brightness(level).await?,
        Setting::Display { mode } => session.set_display(mode).await?,
        Setting::Mode { mode } => session.set_mode(mode).await?,
    };
    Ok(state)
}

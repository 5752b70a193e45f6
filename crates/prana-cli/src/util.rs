//! Helpers shared by the device commands.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use prana_core::{BleConnector, Session};

use crate::cli::DeviceArgs;
use crate::config::{Config, resolve_device};

/// Resolve the device address or fail with a hint.
pub fn require_device(device: Option<String>, config: &Config) -> Result<String> {
    match resolve_device(device, config) {
        Some(address) => Ok(address),
        None => bail!(
            "No device specified. Use --device, set PRANA_DEVICE, or add \
             [device] address to the config file."
        ),
    }
}

/// Build a BLE session for the resolved device.
///
/// `--timeout-ms` overrides `[session] response_timeout_ms`.
pub fn open_session(args: &DeviceArgs, config: &Config) -> Result<Session<BleConnector>> {
    let address = require_device(args.device.clone(), config)?;
    let mut session_config = config.session_config();
    if let Some(ms) = args.timeout_ms {
        session_config = session_config.response_timeout(Duration::from_millis(ms));
    }
    Session::with_config(BleConnector::new(), address, session_config)
        .context("Invalid session settings")
}

//! Device lookup by address.
//!
//! Discovery UX is out of scope; this module only finds the one peripheral
//! a session was configured for.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::util::{addresses_match, format_peripheral_id};
use prana_types::uuids::is_prana_name;

/// Options for finding a device.
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Duration of the first scan; later attempts scan longer.
    pub scan_duration: Duration,
    /// Number of scan attempts when the device is not already known.
    pub attempts: u32,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(3),
            attempts: 3,
        }
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Find the peripheral with `address`.
///
/// Peripherals the adapter already knows about are checked first. Otherwise
/// up to `options.attempts` scans are run, each longer than the last, since
/// advertisements are easily missed.
pub async fn find_peripheral(
    adapter: &Adapter,
    address: &str,
    options: &FindOptions,
) -> Result<Peripheral> {
    if let Some(peripheral) = find_known_peripheral(adapter, address).await? {
        info!("Found device in cache (no scan needed)");
        return Ok(peripheral);
    }

    let attempts = options.attempts.max(1);
    for attempt in 1..=attempts {
        let scan_duration = options.scan_duration * attempt;
        info!(
            "Scan attempt {}/{} ({}s)...",
            attempt,
            attempts,
            scan_duration.as_secs()
        );

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(scan_duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) = find_known_peripheral(adapter, address).await? {
            info!("Found device on attempt {}", attempt);
            return Ok(peripheral);
        }

        if attempt < attempts {
            warn!("Device not found, retrying...");
        }
    }

    warn!("Device not found after {} attempts: {}", attempts, address);
    Err(Error::device_not_found(address))
}

/// Search the adapter's known peripherals for `address`.
async fn find_known_peripheral(adapter: &Adapter, address: &str) -> Result<Option<Peripheral>> {
    let wanted = address.to_lowercase();

    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };

        let by_address = addresses_match(&props.address.to_string(), address);
        let by_id = format_peripheral_id(&peripheral.id()).to_lowercase() == wanted;
        if !(by_address || by_id) {
            continue;
        }

        match props.local_name.as_deref() {
            Some(name) if !is_prana_name(name) => {
                warn!("Device {} advertises as '{}', which is not a known Prana name", address, name);
            }
            Some(name) => debug!("Matched {} ({})", address, name),
            None => debug!("Matched {}", address),
        }
        return Ok(Some(peripheral));
    }

    Ok(None)
}

//! BLE transport for Prana devices over btleplug.
//!
//! [`BleConnector`] locates a unit by address, connects, subscribes to the
//! control characteristic and forwards notifications into the session's
//! [`LinkEvents`]. A second task watches adapter events so a link dropped by
//! the BLE stack is reported even when no exchange is in flight.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use prana_types::uuids::CONTROL_CHARACTERISTIC;

use crate::error::{Error, Result};
use crate::scan::{FindOptions, find_peripheral, get_adapter};
use crate::transport::{Connector, LinkEvents, Transport};
use crate::util::format_peripheral_id;

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection timeouts and lookup behavior for [`BleConnector`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use prana_core::device::BleConfig;
///
/// let config = BleConfig::default().connection_timeout(Duration::from_secs(20));
/// assert_eq!(config.connection_timeout, Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// How to find the device when it is not already known.
    pub find: FindOptions,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            find: FindOptions::default(),
        }
    }
}

impl BleConfig {
    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the device lookup options.
    pub fn find(mut self, find: FindOptions) -> Self {
        self.find = find;
        self
    }
}

/// Opens BLE links to Prana devices.
///
/// The Bluetooth adapter is acquired on first connect and reused afterwards.
#[derive(Default)]
pub struct BleConnector {
    config: BleConfig,
    adapter: OnceCell<Adapter>,
}

impl std::fmt::Debug for BleConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleConnector")
            .field("config", &self.config)
            .field("adapter_ready", &self.adapter.initialized())
            .finish()
    }
}

impl BleConnector {
    /// Create a connector with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector with custom timeouts.
    pub fn with_config(config: BleConfig) -> Self {
        Self {
            config,
            adapter: OnceCell::new(),
        }
    }

    async fn adapter(&self) -> Result<&Adapter> {
        self.adapter.get_or_try_init(get_adapter).await
    }

    async fn open(
        &self,
        adapter: &Adapter,
        peripheral: &Peripheral,
        events: LinkEvents,
    ) -> Result<BleTransport> {
        info!("Connecting to device...");
        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| {
                Error::transport(format!(
                    "connect timed out after {:?}",
                    self.config.connection_timeout
                ))
            })??;

        info!("Discovering services...");
        timeout(self.config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| {
                Error::transport(format!(
                    "service discovery timed out after {:?}",
                    self.config.discovery_timeout
                ))
            })??;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == CONTROL_CHARACTERISTIC)
            .ok_or_else(|| {
                Error::transport(format!(
                    "control characteristic {} not found",
                    CONTROL_CHARACTERISTIC
                ))
            })?;

        // Watch adapter events before subscribing so an early drop is seen.
        let central_events = adapter.events().await?;
        peripheral.subscribe(&characteristic).await?;

        let notifications = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = peripheral.unsubscribe(&characteristic).await;
                return Err(e.into());
            }
        };

        let forward_events = events.clone();
        let forwarder = tokio::spawn(async move {
            let mut notifications = notifications;
            while let Some(notification) = notifications.next().await {
                if notification.uuid == CONTROL_CHARACTERISTIC {
                    forward_events.notify(notification.value);
                }
            }
            debug!("Notification stream ended");
            forward_events.disconnected();
        });

        let id = peripheral.id();
        let watcher = tokio::spawn(async move {
            let mut central_events = central_events;
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event
                    && gone == id
                {
                    debug!("Adapter reported disconnect of {}", format_peripheral_id(&gone));
                    events.disconnected();
                    break;
                }
            }
        });

        info!("Subscribed to {}", CONTROL_CHARACTERISTIC);
        Ok(BleTransport {
            peripheral: peripheral.clone(),
            characteristic,
            tasks: Mutex::new(vec![forwarder, watcher]),
        })
    }
}

#[async_trait]
impl Connector for BleConnector {
    type Transport = BleTransport;

    #[tracing::instrument(level = "info", skip_all, fields(address = %address))]
    async fn connect(&self, address: &str, events: LinkEvents) -> Result<BleTransport> {
        let adapter = self.adapter().await?;
        let peripheral = find_peripheral(adapter, address, &self.config.find).await?;

        match self.open(adapter, &peripheral, events).await {
            Ok(transport) => Ok(transport),
            Err(e) => {
                if let Err(cleanup) = peripheral.disconnect().await {
                    debug!("Best-effort disconnect failed: {}", cleanup);
                }
                Err(Error::connect_failed(address, e))
            }
        }
    }
}

/// An established BLE link to one Prana device.
pub struct BleTransport {
    peripheral: Peripheral,
    characteristic: Characteristic,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("peripheral", &format_peripheral_id(&self.peripheral.id()))
            .field("characteristic", &self.characteristic.uuid)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, payload, WriteType::WithResponse)
            .await
            .map_err(|e| Error::transport(e.to_string()))
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from device...");
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Err(e) = self.peripheral.unsubscribe(&self.characteristic).await {
            debug!("Unsubscribe failed: {}", e);
        }
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.try_lock()
            && !tasks.is_empty()
        {
            warn!("BleTransport dropped without disconnect(), aborting notification tasks");
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

//! Mock connector implementation for testing.
//!
//! This module provides a simulated Prana device that can be driven by a
//! [`Session`](crate::Session) without BLE hardware.
//!
//! # Features
//!
//! - **State frames**: state requests are answered with a configurable
//!   100-byte frame, split into notification chunks of configurable size
//! - **Command effects**: power toggles, switch toggles and speed commands
//!   update the simulated frame
//! - **Failure injection**: failing connects, failing writes, or a device
//!   that never answers
//! - **Link control**: simulate the device dropping the link
//! - **Inspection**: connect/disconnect counts, written payloads, and the
//!   maximum number of concurrently outstanding writes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use prana_types::command::{REQUEST_STATE_OPCODE, SET_BYTE};
use prana_types::state::offset;
use prana_types::{COMMAND_PREFIX, Fan, STATE_FRAME_LEN, Switch};

use crate::error::{Error, Result};
use crate::transport::{Connector, LinkEvents, Transport};

/// Build a plausible state frame: powered on, speed 3, 21.5 °C inside.
pub fn sample_state_frame() -> Vec<u8> {
    let mut frame = vec![0u8; STATE_FRAME_LEN];
    frame[..COMMAND_PREFIX.len()].copy_from_slice(&COMMAND_PREFIX);
    frame[offset::POWER] = 1;
    frame[offset::POWER_IN] = 1;
    frame[offset::POWER_OUT] = 1;
    frame[offset::SPEED] = 30;
    frame[offset::SPEED_IN] = 30;
    frame[offset::SPEED_OUT] = 30;
    frame[offset::BRIGHTNESS] = 0x04;
    frame[offset::TEMP_IN..offset::TEMP_IN + 2].copy_from_slice(&215u16.to_be_bytes());
    frame[offset::TEMP_OUT..offset::TEMP_OUT + 2].copy_from_slice(&180u16.to_be_bytes());
    frame[offset::TEMP_OUTSIDE..offset::TEMP_OUTSIDE + 2].copy_from_slice(&52u16.to_be_bytes());
    frame[offset::HUMIDITY] = 128 + 45;
    frame[offset::CO2..offset::CO2 + 2].copy_from_slice(&640u16.to_be_bytes());
    frame[offset::TVOC..offset::TVOC + 2].copy_from_slice(&120u16.to_be_bytes());
    frame[offset::PRESSURE..offset::PRESSURE + 2].copy_from_slice(&1012u16.to_be_bytes());
    frame[offset::DISPLAY] = 0x1;
    frame
}

struct MockState {
    frame: RwLock<Vec<u8>>,
    chunk_size: AtomicUsize,
    silent: AtomicBool,
    fail_writes: AtomicBool,
    remaining_connect_failures: AtomicU32,
    connect_latency_ms: AtomicU64,
    write_latency_ms: AtomicU64,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    writes: RwLock<Vec<Vec<u8>>>,
    current: RwLock<Option<(LinkEvents, Arc<AtomicBool>)>>,
}

/// A mock [`Connector`] simulating one Prana device.
///
/// Cloning yields another handle to the same simulated device, so a test can
/// hand one clone to a session and keep another for control and inspection.
///
/// # Example
///
/// ```
/// use prana_core::{MockConnector, Session};
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockConnector::new();
///     let session = Session::new(mock.clone(), "AA:BB:CC:DD:EE:FF");
///
///     let state = session.request_state().await.unwrap();
///     assert!(state.power);
///     assert_eq!(mock.connect_count(), 1);
/// }
/// ```
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("connect_count", &self.connect_count())
            .field("disconnect_count", &self.disconnect_count())
            .field("silent", &self.state.silent.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Create a mock answering with [`sample_state_frame`] in 20-byte chunks.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                frame: RwLock::new(sample_state_frame()),
                chunk_size: AtomicUsize::new(20),
                silent: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                remaining_connect_failures: AtomicU32::new(0),
                connect_latency_ms: AtomicU64::new(0),
                write_latency_ms: AtomicU64::new(0),
                connect_count: AtomicU32::new(0),
                disconnect_count: AtomicU32::new(0),
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
                writes: RwLock::new(Vec::new()),
                current: RwLock::new(None),
            }),
        }
    }

    // --- Test control methods ---

    /// Replace the frame sent in response to state requests.
    pub async fn set_frame(&self, frame: Vec<u8>) {
        *self.state.frame.write().await = frame;
    }

    /// Current simulated frame.
    pub async fn frame(&self) -> Vec<u8> {
        self.state.frame.read().await.clone()
    }

    /// Modify the simulated frame in place.
    pub async fn update_frame(&self, f: impl FnOnce(&mut [u8])) {
        f(&mut self.state.frame.write().await);
    }

    /// Set the notification chunk size (at least 1).
    pub fn set_chunk_size(&self, size: usize) {
        self.state.chunk_size.store(size.max(1), Ordering::Relaxed);
    }

    /// When set, state requests are accepted but never answered.
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::Relaxed);
    }

    /// When set, every write fails.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` connect attempts, then succeed.
    pub fn set_connect_failures(&self, count: u32) {
        self.state
            .remaining_connect_failures
            .store(count, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.state
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated write latency.
    ///
    /// With no latency, writes still yield once so concurrent callers get a
    /// chance to interleave.
    pub fn set_write_latency(&self, latency: Duration) {
        self.state
            .write_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Simulate the device dropping the current link.
    ///
    /// Returns `false` if no link was open.
    pub async fn trigger_disconnect(&self) -> bool {
        match self.state.current.write().await.take() {
            Some((events, connected)) => {
                connected.store(false, Ordering::SeqCst);
                events.disconnected();
                true
            }
            None => false,
        }
    }

    /// Push raw chunks on the current link, as if notified by the device.
    pub async fn inject_notification(&self, chunk: &[u8]) -> bool {
        match self.state.current.read().await.as_ref() {
            Some((events, _)) => {
                events.notify(chunk);
                true
            }
            None => false,
        }
    }

    /// Number of connect attempts made.
    pub fn connect_count(&self) -> u32 {
        self.state.connect_count.load(Ordering::Relaxed)
    }

    /// Number of times a transport was told to disconnect.
    pub fn disconnect_count(&self) -> u32 {
        self.state.disconnect_count.load(Ordering::Relaxed)
    }

    /// Highest number of writes that were in progress at the same time.
    pub fn max_in_flight(&self) -> u32 {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// All payloads written so far, in order.
    pub async fn writes(&self) -> Vec<Vec<u8>> {
        self.state.writes.read().await.clone()
    }

    /// Number of state requests written so far.
    pub async fn state_request_count(&self) -> usize {
        self.state
            .writes
            .read()
            .await
            .iter()
            .filter(|payload| is_state_request(payload))
            .count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, address: &str, events: LinkEvents) -> Result<MockTransport> {
        self.state.connect_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.state.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.state.remaining_connect_failures.load(Ordering::Relaxed) > 0 {
            self.state
                .remaining_connect_failures
                .fetch_sub(1, Ordering::Relaxed);
            return Err(Error::device_not_found(address));
        }

        let connected = Arc::new(AtomicBool::new(true));
        *self.state.current.write().await = Some((events.clone(), Arc::clone(&connected)));

        Ok(MockTransport {
            state: Arc::clone(&self.state),
            events,
            connected,
        })
    }
}

/// The [`Transport`] handed out by [`MockConnector`].
pub struct MockTransport {
    state: Arc<MockState>,
    events: LinkEvents,
    connected: Arc<AtomicBool>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    async fn respond(&self, payload: &[u8]) {
        if is_state_request(payload) {
            if self.state.silent.load(Ordering::Relaxed) {
                return;
            }
            let frame = self.state.frame.read().await.clone();
            let size = self.state.chunk_size.load(Ordering::Relaxed);
            for chunk in frame.chunks(size) {
                self.events.notify(chunk);
            }
        } else if let Some(value) = set_value(payload) {
            apply_set(&mut self.state.frame.write().await, value);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let latency = self.state.write_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        } else {
            tokio::task::yield_now().await;
        }

        let result = if !self.connected.load(Ordering::SeqCst) {
            Err(Error::transport("not connected"))
        } else if self.state.fail_writes.load(Ordering::Relaxed) {
            Err(Error::transport("injected write failure"))
        } else {
            self.state.writes.write().await.push(payload.to_vec());
            self.respond(payload).await;
            Ok(())
        };

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.state.disconnect_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn is_state_request(payload: &[u8]) -> bool {
    payload.starts_with(&COMMAND_PREFIX) && payload[COMMAND_PREFIX.len()..] == REQUEST_STATE_OPCODE
}

fn set_value(payload: &[u8]) -> Option<u8> {
    match payload {
        [p0, p1, SET_BYTE, value] if [*p0, *p1] == COMMAND_PREFIX => Some(*value),
        _ => None,
    }
}

/// Apply the effect of a set command to a simulated frame.
fn apply_set(frame: &mut [u8], value: u8) {
    let flip = |frame: &mut [u8], at: usize| frame[at] = u8::from(frame[at] == 0);

    for fan in Fan::ALL {
        if value == fan.toggle_byte() {
            let at = match fan {
                Fan::Main => offset::POWER,
                Fan::In => offset::POWER_IN,
                Fan::Out => offset::POWER_OUT,
            };
            flip(frame, at);
            return;
        }
        if let Some(level) = value.checked_sub(fan.speed_base())
            && (1..=prana_types::MAX_SPEED).contains(&level)
        {
            let raw = level * 10;
            match fan {
                Fan::Main => {
                    frame[offset::SPEED] = raw;
                    frame[offset::SPEED_IN] = raw;
                    frame[offset::SPEED_OUT] = raw;
                }
                Fan::In => frame[offset::SPEED_IN] = raw,
                Fan::Out => frame[offset::SPEED_OUT] = raw,
            }
            return;
        }
    }

    for switch in Switch::ALL {
        if value == switch.toggle_byte() {
            let at = match switch {
                Switch::FlowsLocked => offset::FLOWS_LOCKED,
                Switch::WinterMode => offset::WINTER_MODE,
                Switch::MiniHeating => offset::MINI_HEATING,
            };
            flip(frame, at);
            return;
        }
    }
}

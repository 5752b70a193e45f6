//! Connection and exchange management for one Prana device.
//!
//! A [`Session`] owns at most one live link at a time. The link is opened
//! lazily by the first operation, torn down after transport failures,
//! timeouts and disconnects, and reopened transparently by the next
//! operation. Only one command or state exchange is on the wire at any
//! moment; concurrent callers queue on the operation lock.
//!
//! Notification chunks and disconnects reported by the [`Connector`] are
//! drained by a per-link pump task. The pump is the only code that feeds the
//! [`FrameAssembler`] and resolves the waiting request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace, warn};

use prana_types::{ChunkOutcome, Command, DeviceState, Frame, FrameAssembler};

use crate::error::{Error, Result};
use crate::events::{DeviceEvent, DisconnectReason, EventDispatcher, EventReceiver};
use crate::transport::{Connector, LinkEvent, LinkReceiver, Transport, link_channel};

/// Default time to wait for a complete state frame.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a single characteristic write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts and buffer sizes for a [`Session`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use prana_core::SessionConfig;
///
/// let config = SessionConfig::default().response_timeout(Duration::from_secs(8));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a state request waits for the full frame.
    pub response_timeout: Duration,
    /// Timeout for writing one command.
    pub write_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            event_capacity: 100,
        }
    }
}

impl SessionConfig {
    /// Set the response timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check the configuration for values the session cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.response_timeout.is_zero() {
            return Err(Error::invalid_config("response timeout must be greater than zero"));
        }
        if self.write_timeout.is_zero() {
            return Err(Error::invalid_config("write timeout must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event capacity must be greater than zero"));
        }
        Ok(())
    }
}

/// The most recent decoded state together with when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Decoded device state.
    pub state: DeviceState,
    /// Wall-clock capture time.
    pub captured_at: OffsetDateTime,
    /// Monotonic receive time, used for staleness checks.
    pub received_at: Instant,
}

impl Snapshot {
    /// Time elapsed since the frame was received.
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// An established link plus the task draining its events.
struct Link<T> {
    transport: Arc<T>,
    generation: u64,
    pump: Option<JoinHandle<()>>,
}

impl<T: Transport> Link<T> {
    /// Stop the pump and disconnect, ignoring errors.
    async fn release(mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!(generation = self.generation, error = %e, "Best-effort disconnect failed");
        }
    }
}

/// The request-correlation slot.
struct Pending {
    generation: u64,
    reply: oneshot::Sender<Result<Frame>>,
}

struct Exchange {
    assembler: FrameAssembler,
    pending: Option<Pending>,
}

/// State shared between the session and its pump tasks.
struct Shared<T> {
    address: String,
    link: Mutex<Option<Link<T>>>,
    exchange: Mutex<Exchange>,
    events: EventDispatcher,
}

impl<T: Transport> Shared<T> {
    async fn on_chunk(&self, generation: u64, chunk: &[u8]) {
        let mut exchange = self.exchange.lock().await;
        if !exchange
            .pending
            .as_ref()
            .is_some_and(|p| p.generation == generation)
        {
            trace!(len = chunk.len(), "Ignoring notification with no pending request");
            return;
        }

        match exchange.assembler.push(chunk) {
            ChunkOutcome::Complete(frame) => {
                debug!("State frame complete");
                if let Some(pending) = exchange.pending.take() {
                    // The requester may have timed out already.
                    let _ = pending.reply.send(Ok(frame));
                }
            }
            ChunkOutcome::Buffered(len) => trace!(buffered = len, "Buffered chunk"),
            ChunkOutcome::Discarded => debug!(chunk = ?chunk, "Discarded stray chunk"),
            ChunkOutcome::Desynchronized => warn!("Frame prefix mismatch, reassembly reset"),
            ChunkOutcome::Empty => {}
        }
    }

    async fn on_disconnect(&self, generation: u64) {
        self.fail_pending(Some(generation), Error::transport("device disconnected"))
            .await;

        let link = self
            .link
            .lock()
            .await
            .take_if(|link| link.generation == generation);

        if let Some(mut link) = link {
            info!(device = %self.address, generation, "Device disconnected");
            // Detach rather than abort: this runs on the pump itself.
            drop(link.pump.take());
            link.release().await;
            self.events.send(DeviceEvent::Disconnected {
                device: self.address.clone(),
                reason: DisconnectReason::LinkLost,
            });
        } else {
            debug!(generation, "Disconnect from a link that is no longer current");
        }
    }

    /// Resolve the waiting request with `error` and clear the assembler.
    ///
    /// With `generation` set, only a request made on that link is failed.
    async fn fail_pending(&self, generation: Option<u64>, error: Error) {
        let mut exchange = self.exchange.lock().await;
        let matches = exchange
            .pending
            .as_ref()
            .is_some_and(|p| generation.is_none_or(|g| g == p.generation));
        if matches && let Some(pending) = exchange.pending.take() {
            let _ = pending.reply.send(Err(error));
            exchange.assembler.reset();
        }
    }
}

async fn pump<T: Transport>(shared: Arc<Shared<T>>, generation: u64, mut receiver: LinkReceiver) {
    while let Some(event) = receiver.recv().await {
        match event {
            LinkEvent::Notification(chunk) => shared.on_chunk(generation, &chunk).await,
            LinkEvent::Disconnected => {
                shared.on_disconnect(generation).await;
                break;
            }
        }
    }
    trace!(generation, "Link pump finished");
}

/// A managed session with one Prana device.
///
/// # Example
///
/// ```no_run
/// use prana_core::{BleConnector, Session};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let session = Session::new(BleConnector::new(), "AA:BB:CC:DD:EE:FF");
///     let state = session.request_state().await?;
///     println!("{}", state);
///     session.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Session<C: Connector> {
    connector: C,
    config: SessionConfig,
    shared: Arc<Shared<C::Transport>>,
    operation: Mutex<()>,
    generation: AtomicU64,
    shutting_down: AtomicBool,
    snapshot: watch::Sender<Option<Snapshot>>,
}

impl<C: Connector> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.shared.address)
            .field("config", &self.config)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("shutting_down", &self.shutting_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Session<C> {
    /// Create a session with the default configuration.
    ///
    /// No connection is made until the first operation.
    pub fn new(connector: C, address: impl Into<String>) -> Self {
        Self::build(connector, address.into(), SessionConfig::default())
    }

    /// Create a session with a custom configuration.
    pub fn with_config(
        connector: C,
        address: impl Into<String>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(connector, address.into(), config))
    }

    fn build(connector: C, address: String, config: SessionConfig) -> Self {
        let events = EventDispatcher::new(config.event_capacity);
        let (snapshot, _) = watch::channel(None);
        Self {
            connector,
            shared: Arc::new(Shared {
                address,
                link: Mutex::new(None),
                exchange: Mutex::new(Exchange {
                    assembler: FrameAssembler::new(),
                    pending: None,
                }),
                events,
            }),
            config,
            operation: Mutex::new(()),
            generation: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            snapshot,
        }
    }

    /// Device address this session talks to.
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// The event dispatcher, for components layered on the session.
    pub fn events(&self) -> &EventDispatcher {
        &self.shared.events
    }

    /// Watch snapshot updates.
    pub fn watch(&self) -> watch::Receiver<Option<Snapshot>> {
        self.snapshot.subscribe()
    }

    /// The last successfully decoded snapshot, if any.
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// The last successfully decoded state, if any.
    pub fn last_state(&self) -> Option<DeviceState> {
        self.snapshot.borrow().as_ref().map(|s| s.state.clone())
    }

    /// Number of links established so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Whether a link is currently held and reports itself connected.
    pub async fn is_connected(&self) -> bool {
        let link = self.shared.link.lock().await;
        match link.as_ref() {
            Some(link) => link.transport.is_connected().await,
            None => false,
        }
    }

    /// Make sure a live link exists, opening one if needed.
    ///
    /// Returns the link's transport and generation.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.shared.address))]
    pub async fn ensure_connected(&self) -> Result<(Arc<C::Transport>, u64)> {
        if self.is_shut_down() {
            return Err(Error::ShuttingDown);
        }

        let mut current = self.shared.link.lock().await;
        if let Some(link) = current.as_ref()
            && link.transport.is_connected().await
        {
            return Ok((Arc::clone(&link.transport), link.generation));
        }

        if let Some(stale) = current.take() {
            debug!(generation = stale.generation, "Releasing stale link");
            stale.release().await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (events, receiver) = link_channel();

        info!("Connecting...");
        let transport = match self.connector.connect(&self.shared.address, events).await {
            Ok(transport) => Arc::new(transport),
            Err(e @ Error::ConnectFailed { .. }) => return Err(e),
            Err(e) => return Err(Error::connect_failed(&self.shared.address, e)),
        };

        if self.is_shut_down() {
            if let Err(e) = transport.disconnect().await {
                debug!(error = %e, "Best-effort disconnect failed");
            }
            return Err(Error::ShuttingDown);
        }

        self.shared.exchange.lock().await.assembler.reset();
        let pump = tokio::spawn(pump(Arc::clone(&self.shared), generation, receiver));
        *current = Some(Link {
            transport: Arc::clone(&transport),
            generation,
            pump: Some(pump),
        });
        drop(current);

        info!(generation, "Connected");
        self.shared.events.send(DeviceEvent::Connected {
            device: self.shared.address.clone(),
            generation,
        });
        Ok((transport, generation))
    }

    /// Request and decode a fresh state frame.
    ///
    /// Waits at most [`SessionConfig::response_timeout`] for the frame.
    /// Timeouts and transport failures tear the link down so the next call
    /// reconnects; a malformed frame leaves the link in place.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.shared.address))]
    pub async fn request_state(&self) -> Result<DeviceState> {
        let _operation = self.operation.lock().await;
        self.refresh_locked().await
    }

    /// Write a set command, then refresh the state.
    ///
    /// Returns the state read back after the command. A failed write tears
    /// the link down and fails with [`Error::CommandFailed`]; a failed
    /// refresh is returned as-is.
    #[tracing::instrument(level = "debug", skip_all, fields(device = %self.shared.address, command = %command))]
    pub async fn send_command(&self, command: &Command) -> Result<DeviceState> {
        let _operation = self.operation.lock().await;
        self.send_locked(command).await
    }

    /// Fail any waiting request and release the link.
    ///
    /// Safe to call concurrently with an in-flight operation and more than
    /// once; the link is released exactly once. Later operations fail with
    /// [`Error::ShuttingDown`].
    pub async fn shutdown(&self) {
        let first = !self.shutting_down.swap(true, Ordering::SeqCst);

        self.shared.fail_pending(None, Error::ShuttingDown).await;

        let link = self.shared.link.lock().await.take();
        if let Some(link) = link {
            link.release().await;
            self.shared.events.send(DeviceEvent::Disconnected {
                device: self.shared.address.clone(),
                reason: DisconnectReason::Shutdown,
            });
        }

        if first {
            info!(device = %self.shared.address, "Session shut down");
        }
    }

    /// Hold the operation lock for a multi-step exchange.
    pub(crate) async fn lock_operation(&self) -> MutexGuard<'_, ()> {
        self.operation.lock().await
    }

    pub(crate) async fn send_locked(&self, command: &Command) -> Result<DeviceState> {
        let (transport, generation) = self.ensure_connected().await?;

        if let Err(e) = self.write(&transport, command).await {
            let err = Error::CommandFailed {
                command: command.to_string(),
                reason: e.to_string(),
            };
            self.invalidate(generation, &err).await;
            return Err(err);
        }

        self.shared.events.send(DeviceEvent::CommandSent {
            device: self.shared.address.clone(),
            command: command.to_string(),
        });
        self.refresh_locked().await
    }

    pub(crate) async fn refresh_locked(&self) -> Result<DeviceState> {
        let (transport, generation) = self.ensure_connected().await?;
        let reply = self.register_pending(generation).await?;

        let result = self.exchange_state(&transport, reply).await;
        self.clear_pending(generation).await;

        let frame = match result {
            Ok(frame) => frame,
            Err(_) if self.is_shut_down() => return Err(Error::ShuttingDown),
            Err(e) => {
                if e.invalidates_session() {
                    self.invalidate(generation, &e).await;
                }
                return Err(e);
            }
        };

        match frame.decode() {
            Ok(state) => {
                self.publish(state.clone());
                Ok(state)
            }
            Err(e) => {
                warn!(error = %e, "Received malformed state frame");
                Err(e.into())
            }
        }
    }

    async fn register_pending(&self, generation: u64) -> Result<oneshot::Receiver<Result<Frame>>> {
        let mut exchange = self.shared.exchange.lock().await;
        if self.is_shut_down() {
            return Err(Error::ShuttingDown);
        }
        let (reply, receiver) = oneshot::channel();
        exchange.assembler.reset();
        exchange.pending = Some(Pending { generation, reply });
        Ok(receiver)
    }

    async fn clear_pending(&self, generation: u64) {
        let mut exchange = self.shared.exchange.lock().await;
        if exchange
            .pending
            .as_ref()
            .is_some_and(|p| p.generation == generation)
        {
            exchange.pending = None;
            exchange.assembler.reset();
        }
    }

    async fn exchange_state(
        &self,
        transport: &C::Transport,
        reply: oneshot::Receiver<Result<Frame>>,
    ) -> Result<Frame> {
        self.write(transport, &Command::request_state()).await?;

        match timeout(self.config.response_timeout, reply).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::transport("response slot dropped")),
            Err(_) => {
                warn!(timeout = ?self.config.response_timeout, "No state frame received");
                Err(Error::RequestTimeout(self.config.response_timeout))
            }
        }
    }

    async fn write(&self, transport: &C::Transport, command: &Command) -> Result<()> {
        debug!(payload = %command, "Writing command");
        match timeout(self.config.write_timeout, transport.write(command.payload())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ Error::Transport(_))) => Err(e),
            Ok(Err(e)) => Err(Error::transport(e.to_string())),
            Err(_) => Err(Error::transport(format!(
                "write timed out after {:?}",
                self.config.write_timeout
            ))),
        }
    }

    /// Tear down the link if it is still the one identified by `generation`.
    async fn invalidate(&self, generation: u64, cause: &Error) {
        let link = self
            .shared
            .link
            .lock()
            .await
            .take_if(|link| link.generation == generation);

        if let Some(link) = link {
            warn!(generation, error = %cause, "Invalidating link");
            link.release().await;
            self.shared.events.send(DeviceEvent::Disconnected {
                device: self.shared.address.clone(),
                reason: DisconnectReason::Invalidated(cause.to_string()),
            });
        }
    }

    fn publish(&self, state: DeviceState) {
        let captured_at = OffsetDateTime::now_utc();
        self.snapshot.send_replace(Some(Snapshot {
            state: state.clone(),
            captured_at,
            received_at: Instant::now(),
        }));
        self.shared.events.send(DeviceEvent::StateUpdated {
            device: self.shared.address.clone(),
            state,
            captured_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_timeouts() {
        let config = SessionConfig::default().response_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SessionConfig::default().write_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SessionConfig::default().event_capacity(0);
        assert!(config.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_age() {
        let snapshot = Snapshot {
            state: DeviceState::default(),
            captured_at: OffsetDateTime::now_utc(),
            received_at: Instant::now(),
        };
        tokio::time::advance(Duration::from_secs(12)).await;
        assert_eq!(snapshot.age(), Duration::from_secs(12));
    }
}

//! Periodic state refresh for a [`Session`].
//!
//! The poller calls [`Session::request_state`] on a fixed interval in a
//! background task. Failures never stop the loop; they are counted and
//! exposed through [`Poller::health`] and a [`DeviceEvent::PollFailed`]
//! event, while the last good snapshot stays available.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use prana_types::DeviceState;

use crate::error::{Error, Result};
use crate::events::DeviceEvent;
use crate::session::{Session, Snapshot};
use crate::transport::Connector;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of poll intervals after which data counts as stale.
pub const DEFAULT_STALE_FACTOR: u32 = 3;

/// Options for a [`Poller`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Time between state requests.
    pub interval: Duration,
    /// Data older than `interval * stale_factor` is stale.
    pub stale_factor: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            stale_factor: DEFAULT_STALE_FACTOR,
        }
    }
}

impl PollOptions {
    /// Create options with a specific interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Set the staleness factor.
    pub fn stale_factor(mut self, factor: u32) -> Self {
        self.stale_factor = factor;
        self
    }

    /// Age beyond which the last snapshot is stale.
    pub fn stale_threshold(&self) -> Duration {
        self.interval.saturating_mul(self.stale_factor)
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::invalid_config("poll interval must be > 0"));
        }
        if self.stale_factor == 0 {
            return Err(Error::invalid_config("stale factor must be > 0"));
        }
        Ok(())
    }
}

/// Outcome of recent polls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollHealth {
    /// Failures since the last successful poll.
    pub consecutive_failures: u32,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// Total polls attempted.
    pub polls: u64,
}

impl PollHealth {
    /// Whether the most recent poll succeeded (or none has run yet).
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

/// Background poller driving one session.
///
/// Dropping the poller stops the background task but leaves the session
/// open; use [`shutdown`](Self::shutdown) to close both.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use prana_core::{BleConnector, PollOptions, Poller, Session};
///
/// # async fn example() -> prana_core::Result<()> {
/// let session = Arc::new(Session::new(BleConnector::new(), "AA:BB:CC:DD:EE:FF"));
/// let poller = Poller::spawn(session, PollOptions::with_interval(Duration::from_secs(30)))?;
///
/// if let Some(state) = poller.last_state() {
///     println!("{} (stale: {})", state, poller.is_stale());
/// }
/// poller.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Poller<C: Connector> {
    session: Arc<Session<C>>,
    options: PollOptions,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
    health: watch::Receiver<PollHealth>,
}

impl<C: Connector> std::fmt::Debug for Poller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("address", &self.session.address())
            .field("options", &self.options)
            .field("health", &*self.health.borrow())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Poller<C> {
    /// Start polling `session`. The first poll runs immediately.
    pub fn spawn(session: Arc<Session<C>>, options: PollOptions) -> Result<Self> {
        options.validate()?;

        let cancel_token = CancellationToken::new();
        let (health_tx, health) = watch::channel(PollHealth::default());

        let handle = tokio::spawn(poll_loop(
            Arc::clone(&session),
            options.interval,
            cancel_token.clone(),
            health_tx,
        ));

        Ok(Self {
            session,
            options,
            cancel_token,
            handle,
            health,
        })
    }

    /// The polled session.
    pub fn session(&self) -> &Arc<Session<C>> {
        &self.session
    }

    /// Poll options.
    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Last successfully decoded state.
    pub fn last_state(&self) -> Option<DeviceState> {
        self.session.last_state()
    }

    /// Last successful snapshot with its timestamps.
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.session.last_snapshot()
    }

    /// Age beyond which data is stale.
    pub fn stale_threshold(&self) -> Duration {
        self.options.stale_threshold()
    }

    /// Whether the last snapshot is older than the stale threshold.
    ///
    /// Also true when no state has been received yet.
    pub fn is_stale(&self) -> bool {
        match self.session.last_snapshot() {
            Some(snapshot) => snapshot.age() > self.stale_threshold(),
            None => true,
        }
    }

    /// Current poll health.
    pub fn health(&self) -> PollHealth {
        self.health.borrow().clone()
    }

    /// Watch poll health changes.
    pub fn watch_health(&self) -> watch::Receiver<PollHealth> {
        self.health.clone()
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop polling. An in-progress request is allowed to finish.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Stop polling and shut the session down.
    pub async fn shutdown(&self) {
        self.stop();
        self.session.shutdown().await;
    }
}

impl<C: Connector> Drop for Poller<C> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn poll_loop<C: Connector>(
    session: Arc<Session<C>>,
    period: Duration,
    cancel_token: CancellationToken,
    health: watch::Sender<PollHealth>,
) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let address = session.address().to_string();

    info!("Starting poller for {} (interval: {:?})", address, period);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Poller cancelled, stopping");
                break;
            }
            _ = timer.tick() => {
                match session.request_state().await {
                    Ok(state) => {
                        debug!("Polled {}: speed={} power={}", address, state.speed, state.power);
                        health.send_modify(|h| {
                            h.polls += 1;
                            h.consecutive_failures = 0;
                            h.last_error = None;
                        });
                    }
                    Err(Error::ShuttingDown) => {
                        debug!("Session shut down, stopping poller");
                        break;
                    }
                    Err(e) => {
                        let mut failures = 0;
                        health.send_modify(|h| {
                            h.polls += 1;
                            h.consecutive_failures += 1;
                            h.last_error = Some(e.to_string());
                            failures = h.consecutive_failures;
                        });

                        if failures <= 3 {
                            warn!("Failed to poll {}: {} (attempt {})", address, e, failures);
                        } else if failures == 4 {
                            error!(
                                "Failed to poll {} after {} attempts, will continue trying silently",
                                address, failures
                            );
                        }

                        session.events().send(DeviceEvent::PollFailed {
                            device: address.clone(),
                            error: e.to_string(),
                            consecutive_failures: failures,
                        });
                    }
                }
            }
        }
    }
}

//! Core BLE library for Prana ventilation units.
//!
//! This crate manages the link to a Prana recuperator and the exchanges on
//! it. Protocol encoding and decoding live in [`prana_types`].
//!
//! # Features
//!
//! - **Session management**: lazy connect, serialized command/state
//!   exchanges, transparent reconnect after failures
//! - **Frame reassembly**: notification chunks are rebuilt into 100-byte
//!   state frames
//! - **Polling**: periodic state refresh with staleness and health tracking
//! - **Events**: broadcast notifications for connects, disconnects and state
//! - **Testing**: [`MockConnector`] simulates a device without hardware
//!
//! # Error handling
//!
//! Timeouts and transport failures invalidate the link; the next operation
//! reconnects. Nothing is retried inside a single call. See [`Error`].
//!
//! # Quick Start
//!
//! ```no_run
//! use prana_core::{BleConnector, Fan, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(BleConnector::new(), "AA:BB:CC:DD:EE:FF");
//!
//!     let state = session.request_state().await?;
//!     println!("Speed {} / CO2 {} ppm", state.speed, state.co2);
//!
//!     let state = session.set_speed(Fan::Main, 4).await?;
//!     println!("Now at speed {}", state.speed);
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod control;
pub mod device;
pub mod error;
pub mod events;
pub mod mock;
pub mod poller;
pub mod scan;
pub mod session;
pub mod transport;
pub mod util;

// Re-export the protocol crate's modules and common types
pub use prana_types::{
    ChunkOutcome, Command, DeviceState, DisplayMode, Fan, Frame, FrameAssembler, Mode,
    ParseError, Switch,
};
pub use prana_types::{command, state, uuids};

// Core exports
pub use control::{DEFAULT_MAX_SPEED, SpeedScale};
pub use device::{BleConfig, BleConnector, BleTransport};
pub use error::{DeviceNotFoundReason, Error, Result};
pub use events::{DeviceEvent, DisconnectReason, EventDispatcher, EventReceiver};
pub use mock::MockConnector;
pub use poller::{PollHealth, PollOptions, Poller};
pub use session::{Session, SessionConfig, Snapshot};
pub use transport::{Connector, LinkEvent, LinkEvents, Transport, link_channel};

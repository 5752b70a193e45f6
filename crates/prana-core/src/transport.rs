//! Trait abstractions for the BLE link underneath a [`Session`](crate::Session).
//!
//! A [`Connector`] opens a link to a device address and hands back a
//! [`Transport`] for writes. Everything the link reports asynchronously
//! (notification chunks, disconnects) is pushed into the [`LinkEvents`]
//! handle the session passed in, from whatever task or thread the BLE stack
//! uses. The session drains the matching [`LinkReceiver`] on its own task,
//! so link callbacks never touch session state directly.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something the link reported outside of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One notification delivery from the control characteristic.
    Notification(Vec<u8>),
    /// The link went down.
    Disconnected,
}

/// Handle a [`Connector`] uses to report link events.
///
/// Cloneable and usable from any thread. Sends after the session has moved
/// on to a newer link are silently dropped.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    sender: mpsc::UnboundedSender<LinkEvent>,
}

impl LinkEvents {
    /// Report a notification chunk.
    pub fn notify(&self, chunk: impl Into<Vec<u8>>) {
        let _ = self.sender.send(LinkEvent::Notification(chunk.into()));
    }

    /// Report that the link went down.
    pub fn disconnected(&self) {
        let _ = self.sender.send(LinkEvent::Disconnected);
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving side of a [`LinkEvents`] handle.
pub type LinkReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Create a linked event handle and receiver.
pub fn link_channel() -> (LinkEvents, LinkReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (LinkEvents { sender }, receiver)
}

/// An established link to one device.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Whether the underlying link still reports itself as connected.
    async fn is_connected(&self) -> bool;

    /// Write one command payload to the control characteristic.
    async fn write(&self, payload: &[u8]) -> Result<()>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<()>;
}

/// Opens links to devices by address.
///
/// # Example
///
/// ```ignore
/// use prana_core::{Connector, Session};
///
/// async fn read<C: Connector>(connector: C) -> prana_core::Result<()> {
///     let session = Session::new(connector, "AA:BB:CC:DD:EE:FF");
///     let state = session.request_state().await?;
///     println!("{}", state);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The link type this connector produces.
    type Transport: Transport;

    /// Locate the device, connect, and subscribe to notifications.
    ///
    /// Notifications and disconnects for the new link must be reported
    /// through `events`. Implementations release anything they acquired
    /// before returning an error.
    async fn connect(&self, address: &str, events: LinkEvents) -> Result<Self::Transport>;
}

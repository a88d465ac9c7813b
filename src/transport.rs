//! Transport adapter: a thin facade over the external socket.
//!
//! The socket itself (connect, TLS, retry) lives outside the runtime. It is
//! reached through the [`Transport`] trait, which only needs to accept text
//! frames, report readiness and expose the connection's target and peer
//! metadata. [`Link`] adds the adapter policy on top: frames sent while the
//! transport is not ready are dropped without error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

/// Error returned by [`Transport::send_frame`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket writer has gone away.
    #[error("transport closed")]
    Closed,
}

/// Metadata about the connection, queryable independent of frame traffic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    /// Remote socket address, when known.
    pub ip: Option<String>,
    /// Headers exchanged during the handshake.
    pub headers: BTreeMap<String, String>,
    /// User agent this client presented.
    pub agent: Option<String>,
}

/// The external socket primitive.
pub trait Transport: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Hand one encoded frame to the socket.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the frame can no longer be
    /// delivered.
    fn send_frame(&self, frame: String) -> Result<(), TransportError>;

    /// Connection target identifier (the websocket URL).
    fn target(&self) -> &str;

    fn peer(&self) -> PeerInfo;
}

/// Shared handle to the transport with the drop-when-unready policy.
#[derive(Clone)]
pub struct Link {
    transport: Arc<dyn Transport>,
}

impl Link {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.transport.is_ready()
    }

    /// Forward a frame, or drop it silently when the transport is not ready.
    ///
    /// # Errors
    ///
    /// Propagates [`TransportError`] from a ready transport.
    pub fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        if !self.transport.is_ready() {
            tracing::trace!("transport not ready; frame dropped");
            return Ok(());
        }
        self.transport.send_frame(frame)
    }

    #[must_use]
    pub fn target(&self) -> &str {
        self.transport.target()
    }

    #[must_use]
    pub fn peer(&self) -> PeerInfo {
        self.transport.peer()
    }
}

/// Transport backed by the websocket writer task's channel.
pub struct SocketTransport {
    tx: mpsc::UnboundedSender<String>,
    ready: Arc<AtomicBool>,
    target: String,
    peer: PeerInfo,
}

impl SocketTransport {
    /// `ready` is shared with the socket driver, which clears it on close.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<String>, ready: Arc<AtomicBool>, target: String, peer: PeerInfo) -> Self {
        Self { tx, ready, target, peer }
    }
}

impl Transport for SocketTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn peer(&self) -> PeerInfo {
        self.peer.clone()
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;

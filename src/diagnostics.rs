//! Failure taxonomy and the local observer.
//!
//! DESIGN
//! ======
//! Everything the dispatcher or router catches becomes a [`Fault`]. What
//! happens next is decided by the debug flag (see `Session::report`):
//! - debug: the fault is raised to the local [`Observer`]; nothing is sent.
//! - production: the fault's trace text goes to the peer on topic `e`; the
//!   observer sees nothing.

use std::error::Error as _;

use serde_json::Value;

use crate::identity::Info;
use crate::script::ScriptError;
use crate::transport::TransportError;

/// Error raised by a handler or by remote code it ran.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFault {
    #[error("script failed")]
    Script(#[from] ScriptError),
    #[error("{0}")]
    Failed(String),
}

impl HandlerFault {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Anything caught at the dispatcher/router boundary.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    /// An inbound frame could not be decoded.
    #[error("malformed frame")]
    MalformedFrame(#[source] frames::CodecError),
    #[error("handler fault")]
    Handler(#[from] HandlerFault),
    /// An outbound envelope could not be encoded.
    #[error("failed to encode envelope")]
    Encode(#[source] frames::CodecError),
    #[error("failed to send frame")]
    Transport(#[from] TransportError),
}

impl Fault {
    /// Short taxonomy name, used as the first line of the trace.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "MalformedFrame",
            Self::Handler(_) => "HandlerFault",
            Self::Encode(_) => "EncodeFailure",
            Self::Transport(_) => "TransportFailure",
        }
    }
}

/// Render a fault and its `source()` chain as report text.
///
/// ```text
/// HandlerFault: handler fault
///   caused by: script failed
///   caused by: `boom` is not a function
/// ```
#[must_use]
pub fn trace_text(fault: &Fault) -> String {
    let mut out = format!("{}: {fault}", fault.kind());
    let mut source = fault.source();
    while let Some(err) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&err.to_string());
        source = err.source();
    }
    out
}

/// The local observer (developer console equivalent).
pub trait Observer {
    /// A fault re-raised locally in debug mode.
    fn raise(&self, fault: &Fault);
    /// A `log` call that asked for a local mirror.
    fn log(&self, message: &Value);
    /// An `error` report pushed by the peer.
    fn peer_error(&self, payload: &Value);
    /// Debug-mode startup banner.
    fn banner(&self, info: &Info);
}

/// Observer that writes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn raise(&self, fault: &Fault) {
        tracing::error!(kind = fault.kind(), trace = %trace_text(fault), "runtime fault");
    }

    fn log(&self, message: &Value) {
        tracing::info!(%message, "log");
    }

    fn peer_error(&self, payload: &Value) {
        tracing::error!(%payload, "peer reported error");
    }

    fn banner(&self, info: &Info) {
        tracing::warn!(
            project = info.project.as_deref().unwrap_or("-"),
            websocket = %info.websocket,
            ip = info.ip.as_deref().unwrap_or("-"),
            "tether core loaded in debug mode"
        );
    }
}

#[cfg(test)]
#[path = "diagnostics_test.rs"]
mod tests;

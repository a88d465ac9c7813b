//! Client runtime that turns one WebSocket into a topic-addressed RPC
//! channel: `{t, d}` envelopes in both directions, a single active
//! subscription, server-pushed code run in a sandboxed interpreter, remote
//! modules, a keep-alive heartbeat and a debug/production fault policy.

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod identity;
pub mod keepalive;
pub mod modules;
pub mod runtime;
pub mod script;
pub mod session;
pub mod transport;

pub use client::ClientError;
pub use config::{Cli, ClientConfig};
pub use diagnostics::{Fault, HandlerFault, Observer, TracingObserver};
pub use dispatch::TopicFilter;
pub use runtime::Runtime;
pub use transport::{Link, Transport};

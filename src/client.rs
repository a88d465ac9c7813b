//! Socket driver: connects the runtime to a real websocket.
//!
//! Connection establishment lives here, outside the runtime core. One
//! connection, no reconnect: when the peer closes, `run` returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::{MaybeTlsStream, connect_async};

use crate::config::{ClientConfig, ConfigError};
use crate::diagnostics::{Observer, TracingObserver};
use crate::runtime::Runtime;
use crate::transport::{Link, PeerInfo, SocketTransport};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket receive failed: {0}")]
    WsRecv(Box<tokio_tungstenite::tungstenite::Error>),
}

/// Connect, start the runtime and process frames until the peer closes.
///
/// # Errors
///
/// Returns connect or receive errors; a clean close is `Ok`.
pub async fn run(config: &ClientConfig) -> Result<(), ClientError> {
    run_with_observer(config, Box::new(TracingObserver)).await
}

/// [`run`] with a caller-supplied local observer.
///
/// # Errors
///
/// Same as [`run`].
pub async fn run_with_observer(config: &ClientConfig, observer: Box<dyn Observer>) -> Result<(), ClientError> {
    let mut request = config
        .target
        .as_str()
        .into_client_request()
        .map_err(|e| ClientError::WsConnect(Box::new(e)))?;
    request
        .headers_mut()
        .insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);

    let (stream, response) = connect_async(request)
        .await
        .map_err(|e| ClientError::WsConnect(Box::new(e)))?;

    let ip = match stream.get_ref() {
        MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok().map(|addr| addr.to_string()),
        _ => None,
    };
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned())))
        .collect::<BTreeMap<_, _>>();
    let peer = PeerInfo { ip, headers, agent: Some(config.user_agent.clone()) };

    let (mut ws_write, mut ws_read) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let ready = Arc::new(AtomicBool::new(true));
    let transport = SocketTransport::new(tx, ready.clone(), config.target.clone(), peer);

    // Forward outbound frames from the channel to the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_write.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut runtime = Runtime::new(Link::new(Arc::new(transport)), observer).with_heartbeat(config.heartbeat);
    runtime.start();
    tracing::info!(url = %config.target, debug = runtime.debug(), "tether connected");

    let mut outcome = Ok(());
    loop {
        let msg = tokio::select! {
            msg = ws_read.next() => msg,
            () = runtime.report_next_heartbeat_fault() => continue,
        };
        match msg {
            Some(Ok(Message::Text(text))) => runtime.handle_frame(text.as_str()),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                outcome = Err(ClientError::WsRecv(Box::new(e)));
                break;
            }
        }
    }

    ready.store(false, Ordering::Release);
    runtime.stop();
    writer.abort();
    tracing::info!("tether disconnected");
    outcome
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

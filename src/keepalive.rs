//! Keep-alive heartbeat and round-trip latency probe.
//!
//! The heartbeat runs as its own task and cannot reach the runtime's
//! observer, so a failed ping is queued as a [`Fault`] and reported by the
//! runtime through the usual debug/production policy.

use std::time::Duration;

use frames::{TOPIC_PING, TOPIC_PONG};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::diagnostics::{Fault, HandlerFault};
use crate::runtime::Runtime;
use crate::session::timestamp_ms;
use crate::transport::Link;

/// Default heartbeat period.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(5000);

/// Repeating `ping` task. At most one is scheduled at a time.
pub struct KeepAlive {
    period: Duration,
    task: Option<JoinHandle<()>>,
    faults_tx: mpsc::UnboundedSender<Fault>,
    faults_rx: mpsc::UnboundedReceiver<Fault>,
}

impl KeepAlive {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        Self { period, task: None, faults_tx, faults_rx }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel any running heartbeat and schedule a fresh one. The first
    /// ping goes out one period from now.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn arm(&mut self, link: Link) {
        self.cancel();
        let period = self.period;
        let faults = self.faults_tx.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(fault) = beat(&link) {
                    tracing::debug!(error = %fault, "heartbeat ping not sent");
                    if faults.send(fault).is_err() {
                        break;
                    }
                }
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn beat(link: &Link) -> Result<(), Fault> {
    let sent_at = Value::from(timestamp_ms());
    let frame = frames::encode(TOPIC_PING, Some(&sent_at)).map_err(Fault::Encode)?;
    link.send_frame(frame)?;
    Ok(())
}

/// A `pong` answer to [`Runtime::ping_then`].
#[derive(Clone, Debug, PartialEq)]
pub struct Pong {
    pub payload: Option<Value>,
    /// Now minus the echoed timestamp, when the payload is one.
    pub round_trip: Option<Duration>,
}

impl Pong {
    #[must_use]
    pub fn from_payload(payload: Option<Value>) -> Self {
        let round_trip = payload
            .as_ref()
            .and_then(Value::as_i64)
            .map(|sent_at| Duration::from_millis(u64::try_from(timestamp_ms() - sent_at).unwrap_or(0)));
        Self { payload, round_trip }
    }
}

impl Runtime {
    /// (Re)start the heartbeat; a previously scheduled one is cancelled.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start_heartbeat(&mut self) {
        self.keepalive.arm(self.session.link().clone());
    }

    pub fn stop_heartbeat(&mut self) {
        self.keepalive.cancel();
    }

    #[must_use]
    pub fn heartbeat_armed(&self) -> bool {
        self.keepalive.is_armed()
    }

    /// Report every heartbeat failure queued so far.
    pub fn report_heartbeat_faults(&mut self) {
        while let Ok(fault) = self.keepalive.faults_rx.try_recv() {
            self.session.report(&fault);
        }
    }

    /// Wait for the next heartbeat failure and report it. Pending forever
    /// while the heartbeat keeps succeeding.
    pub async fn report_next_heartbeat_fault(&mut self) {
        if let Some(fault) = self.keepalive.faults_rx.recv().await {
            self.session.report(&fault);
        }
    }

    /// Send a `ping` stamped with the current time. Returns the stamp.
    pub fn ping(&mut self) -> i64 {
        self.session.ping()
    }

    /// Send a `ping` and subscribe `callback` to the next `pong`.
    ///
    /// This replaces the active subscription (the router included); only
    /// the first `pong` reaches `callback`. Call [`Runtime::restore_router`]
    /// or re-subscribe once it has fired.
    pub fn ping_then<F>(&mut self, callback: F) -> i64
    where
        F: FnOnce(&mut Runtime, Pong) -> Result<(), HandlerFault> + 'static,
    {
        let sent_at = self.session.ping();
        let mut callback = Some(callback);
        self.listen(TOPIC_PONG, move |runtime, payload, _topic| match callback.take() {
            Some(callback) => callback(runtime, Pong::from_payload(payload)),
            None => Ok(()),
        });
        sent_at
    }
}

#[cfg(test)]
#[path = "keepalive_test.rs"]
mod tests;

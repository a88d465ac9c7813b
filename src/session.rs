//! Outbound side of the channel: sending, logging and fault reporting.

use std::time::{SystemTime, UNIX_EPOCH};

use frames::{ModuleRequest, TOPIC_FAULT, TOPIC_MODULE, TOPIC_PING, TOPIC_REPORT};
use serde_json::Value;

use crate::diagnostics::{Fault, Observer, trace_text};
use crate::identity::{self, Info};
use crate::script::{self, Host, ScriptError};
use crate::transport::Link;

/// Transport link plus the local observer, with the debug/production
/// failure policy applied to everything that goes out.
pub struct Session {
    link: Link,
    observer: Box<dyn Observer>,
}

impl Session {
    #[must_use]
    pub fn new(link: Link, observer: Box<dyn Observer>) -> Self {
        Self { link, observer }
    }

    #[must_use]
    pub fn link(&self) -> &Link {
        &self.link
    }

    #[must_use]
    pub fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    /// Debug flag, recomputed from the transport target on every call.
    #[must_use]
    pub fn debug(&self) -> bool {
        identity::is_debug(self.link.target())
    }

    #[must_use]
    pub fn info(&self) -> Info {
        identity::info(self.link.target(), &self.link.peer())
    }

    /// Fire-and-forget send. Failures are reported, never returned.
    pub fn send(&self, topic: &str, payload: Option<Value>) {
        if let Err(fault) = self.transmit(topic, payload.as_ref()) {
            self.report(&fault);
        }
    }

    /// Report `message` to the peer on `r`, mirroring it locally when asked.
    pub fn log(&self, message: Value, local: bool) {
        if local {
            self.observer.log(&message);
        }
        self.send(TOPIC_REPORT, Some(message));
    }

    /// Send a `ping` stamped with the current time; returns the stamp.
    pub fn ping(&self) -> i64 {
        let sent_at = timestamp_ms();
        self.send(TOPIC_PING, Some(Value::from(sent_at)));
        sent_at
    }

    /// Send a `module` request. Callback bookkeeping belongs to the runtime.
    pub fn request_module(&self, name: &str, params: Option<Value>) {
        let request = ModuleRequest { name: name.to_owned(), params };
        match serde_json::to_value(&request) {
            Ok(payload) => self.send(TOPIC_MODULE, Some(payload)),
            Err(err) => self.report(&Fault::Encode(err.into())),
        }
    }

    /// Apply the failure policy to a caught fault.
    pub fn report(&self, fault: &Fault) {
        if self.debug() {
            self.observer.raise(fault);
            return;
        }
        let trace = Value::String(trace_text(fault));
        if let Err(err) = self.transmit(TOPIC_FAULT, Some(&trace)) {
            // Reporting a failed report would loop; keep it out of the observer too.
            tracing::debug!(error = %err, "fault report not delivered");
        }
    }

    /// Encode and hand to the link, which drops the frame if the transport
    /// is not ready.
    fn transmit(&self, topic: &str, payload: Option<&Value>) -> Result<(), Fault> {
        let frame = frames::encode(topic, payload).map_err(Fault::Encode)?;
        self.link.send_frame(frame)?;
        Ok(())
    }
}

/// Builtins available to server-supplied scripts.
impl Host for Session {
    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        match name {
            "send" => {
                script::check_arity(name, &args, 1, 2, "1 or 2")?;
                let mut args = args.into_iter();
                let topic = args.next().map(|t| script::to_text(&t)).unwrap_or_default();
                self.send(&topic, args.next());
                Ok(Value::Null)
            }
            "log" => {
                script::check_arity(name, &args, 1, 2, "1 or 2")?;
                let local = args.get(1).is_some_and(script::is_truthy);
                let message = args.into_iter().next().unwrap_or(Value::Null);
                self.log(message, local);
                Ok(Value::Null)
            }
            "ping" => {
                script::check_arity(name, &args, 0, 0, "0")?;
                Ok(Value::from(self.ping()))
            }
            "module" => {
                script::check_arity(name, &args, 1, 2, "1 or 2")?;
                let mut args = args.into_iter();
                let module = args.next().map(|n| script::to_text(&n)).unwrap_or_default();
                self.request_module(&module, args.next());
                Ok(Value::Null)
            }
            "info" => {
                script::check_arity(name, &args, 0, 0, "0")?;
                serde_json::to_value(self.info()).map_err(|e| ScriptError::Type(e.to_string()))
            }
            "debug" => {
                script::check_arity(name, &args, 0, 0, "0")?;
                Ok(Value::Bool(self.debug()))
            }
            "now" => {
                script::check_arity(name, &args, 0, 0, "0")?;
                Ok(Value::from(timestamp_ms()))
            }
            _ => Err(ScriptError::UnknownFunction(name.to_owned())),
        }
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

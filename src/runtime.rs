//! The runtime context: one object owning every piece of channel state.
//!
//! DESIGN
//! ======
//! Nothing lives in ambient globals. The [`Runtime`] owns the outbound
//! [`Session`], the single subscription slot, the pending module callbacks,
//! the script root scope and the heartbeat. Handlers and callbacks receive
//! `&mut Runtime`, so they can send, execute and re-subscribe directly.
//!
//! LIFECYCLE
//! =========
//! 1. `new` → nothing installed, nothing scheduled
//! 2. `start` → debug banner, top-level router on `*`, heartbeat armed
//! 3. the socket driver feeds frames to `handle_frame`
//! 4. `stop` → heartbeat cancelled

use std::time::Duration;

use frames::Topic;
use serde_json::Value;

use crate::diagnostics::{HandlerFault, Observer};
use crate::dispatch::{Subscription, TopicFilter};
use crate::identity::Info;
use crate::keepalive::{HEARTBEAT_INTERVAL, KeepAlive};
use crate::modules::PendingModules;
use crate::script::{self, Scope, ScriptError};
use crate::session::Session;
use crate::transport::Link;

pub struct Runtime {
    pub(crate) session: Session,
    pub(crate) subscription: Option<Subscription>,
    /// Bumped by every `listen`; lets dispatch notice a handler replaced itself.
    pub(crate) generation: u64,
    pub(crate) pending: PendingModules,
    pub(crate) globals: Scope,
    pub(crate) keepalive: KeepAlive,
}

impl Runtime {
    #[must_use]
    pub fn new(link: Link, observer: Box<dyn Observer>) -> Self {
        Self {
            session: Session::new(link, observer),
            subscription: None,
            generation: 0,
            pending: PendingModules::default(),
            globals: Scope::new(),
            keepalive: KeepAlive::new(HEARTBEAT_INTERVAL),
        }
    }

    /// Override the heartbeat period (default 5 s).
    #[must_use]
    pub fn with_heartbeat(mut self, period: Duration) -> Self {
        self.keepalive = KeepAlive::new(period);
        self
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The root scope shared by the router, modules and `evaluate`.
    #[must_use]
    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Scope {
        &mut self.globals
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.session.debug()
    }

    #[must_use]
    pub fn info(&self) -> Info {
        self.session.info()
    }

    /// Fire-and-forget send; failures go through the fault policy.
    pub fn send(&self, topic: &str, payload: Option<Value>) {
        self.session.send(topic, payload);
    }

    pub fn log(&self, message: Value, local: bool) {
        self.session.log(message, local);
    }

    /// Bring the runtime up: banner in debug mode, router, heartbeat.
    ///
    /// Calling it again re-installs the router and re-arms the heartbeat
    /// without leaving a second one running.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime (the heartbeat is a task).
    pub fn start(&mut self) {
        if self.debug() {
            self.session.observer().banner(&self.info());
        }
        self.restore_router();
        self.start_heartbeat();
    }

    pub fn stop(&mut self) {
        self.keepalive.cancel();
    }

    /// Install the top-level wildcard router, replacing any subscription.
    pub fn restore_router(&mut self) {
        self.listen(TopicFilter::Any, |runtime, payload, topic| runtime.route(payload, topic));
    }

    /// Run `code` in a throwaway unit attached to `host` (default: the root
    /// scope). The unit is detached before this returns, even on failure.
    ///
    /// # Errors
    ///
    /// Returns the parse or runtime [`ScriptError`]; handling it is the
    /// caller's concern.
    pub fn execute(&mut self, code: &str, host: Option<&mut Scope>) -> Result<Value, ScriptError> {
        let program = script::parse(code)?;
        let scope = match host {
            Some(scope) => scope,
            None => &mut self.globals,
        };
        script::execute(&program, scope, &mut self.session)
    }

    /// Run `code` directly in the root scope, the way module and router
    /// payloads run.
    ///
    /// # Errors
    ///
    /// Returns the parse or runtime [`ScriptError`].
    pub fn evaluate(&mut self, code: &str) -> Result<Value, ScriptError> {
        let program = script::parse(code)?;
        script::evaluate(&program, &mut self.globals, &mut self.session)
    }

    /// Evaluate a code payload; anything but a string is inert.
    pub(crate) fn run_payload(&mut self, payload: Option<&Value>) -> Result<Value, ScriptError> {
        match payload {
            Some(Value::String(code)) => self.evaluate(code),
            _ => Ok(Value::Null),
        }
    }

    fn route(&mut self, payload: Option<Value>, topic: &str) -> Result<(), HandlerFault> {
        match Topic::classify(topic) {
            Topic::Error => {
                // Already an error report; shown locally, never re-raised.
                self.session.observer().peer_error(payload.as_ref().unwrap_or(&Value::Null));
                Ok(())
            }
            Topic::ModuleResponse(name) => self.on_module_response(name, payload),
            _ => {
                self.run_payload(payload.as_ref())?;
                Ok(())
            }
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use frames::Envelope;

    use super::*;
    use crate::diagnostics::{Fault, trace_text};
    use crate::transport::{PeerInfo, Transport, TransportError};

    pub const DEBUG_TARGET: &str = "ws://hub.test/ws?$cHJvamVjdA==";
    pub const PROD_TARGET: &str = "ws://hub.test/ws?cHJvamVjdA==";

    /// In-memory transport recording every frame it accepts.
    pub struct MemoryTransport {
        frames: Mutex<Vec<String>>,
        ready: AtomicBool,
        target: String,
        /// Topic whose frames are refused with `TransportError::Closed`.
        reject: Mutex<Option<String>>,
    }

    impl MemoryTransport {
        #[must_use]
        pub fn new(target: &str) -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
                ready: AtomicBool::new(true),
                target: target.to_owned(),
                reject: Mutex::new(None),
            })
        }

        pub fn reject(&self, topic: Option<&str>) {
            *self.reject.lock().expect("reject mutex") = topic.map(str::to_owned);
        }

        pub fn set_ready(&self, ready: bool) {
            self.ready.store(ready, Ordering::SeqCst);
        }

        #[must_use]
        pub fn frames(&self) -> Vec<String> {
            self.frames.lock().expect("frames mutex").clone()
        }

        #[must_use]
        pub fn envelopes(&self) -> Vec<Envelope> {
            self.frames().iter().map(|f| frames::decode(f).expect("sent frame decodes")).collect()
        }

        /// Envelopes sent on `topic`, in order.
        #[must_use]
        pub fn sent_on(&self, topic: &str) -> Vec<Envelope> {
            self.envelopes().into_iter().filter(|e| e.topic == topic).collect()
        }

        pub fn clear(&self) {
            self.frames.lock().expect("frames mutex").clear();
        }
    }

    impl Transport for MemoryTransport {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn send_frame(&self, frame: String) -> Result<(), TransportError> {
            let rejected = self.reject.lock().expect("reject mutex").clone();
            if rejected.is_some_and(|topic| frames::decode(&frame).is_ok_and(|e| e.topic == topic)) {
                return Err(TransportError::Closed);
            }
            self.frames.lock().expect("frames mutex").push(frame);
            Ok(())
        }

        fn target(&self) -> &str {
            &self.target
        }

        fn peer(&self) -> PeerInfo {
            PeerInfo { ip: Some("127.0.0.1:9".to_owned()), agent: Some("tether/test".to_owned()), ..PeerInfo::default() }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Observed {
        Raised(String),
        Log(Value),
        PeerError(Value),
        Banner(Info),
    }

    /// Observer that records what it was shown.
    #[derive(Clone, Default)]
    pub struct RecordingObserver {
        events: Rc<RefCell<Vec<Observed>>>,
    }

    impl RecordingObserver {
        #[must_use]
        pub fn events(&self) -> Vec<Observed> {
            self.events.borrow().clone()
        }

        #[must_use]
        pub fn raised(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Observed::Raised(trace) => Some(trace),
                    _ => None,
                })
                .collect()
        }
    }

    impl Observer for RecordingObserver {
        fn raise(&self, fault: &Fault) {
            self.events.borrow_mut().push(Observed::Raised(trace_text(fault)));
        }

        fn log(&self, message: &Value) {
            self.events.borrow_mut().push(Observed::Log(message.clone()));
        }

        fn peer_error(&self, payload: &Value) {
            self.events.borrow_mut().push(Observed::PeerError(payload.clone()));
        }

        fn banner(&self, info: &Info) {
            self.events.borrow_mut().push(Observed::Banner(info.clone()));
        }
    }

    /// Runtime over a memory transport, router installed, heartbeat idle.
    #[must_use]
    pub fn runtime(target: &str) -> (Runtime, Arc<MemoryTransport>, RecordingObserver) {
        let transport = MemoryTransport::new(target);
        let observer = RecordingObserver::default();
        let mut runtime = Runtime::new(Link::new(transport.clone()), Box::new(observer.clone()));
        runtime.restore_router();
        (runtime, transport, observer)
    }

    /// Encode an inbound frame the way the peer would.
    #[must_use]
    pub fn frame(topic: &str, payload: Value) -> String {
        frames::encode(topic, Some(&payload)).expect("test frame encodes")
    }
}

#[cfg(test)]
#[path = "runtime_test.rs"]
mod tests;

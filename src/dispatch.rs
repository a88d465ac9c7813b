//! Topic dispatcher: one active subscription, synchronous delivery.

use serde_json::Value;

use crate::diagnostics::{Fault, HandlerFault};
use crate::runtime::Runtime;

/// Boxed handler: `(runtime, payload, topic)`.
pub type Handler = Box<dyn FnMut(&mut Runtime, Option<Value>, &str) -> Result<(), HandlerFault>>;

/// Which topics a subscription accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicFilter {
    /// The `*` wildcard.
    Any,
    Exact(String),
}

impl TopicFilter {
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == topic,
        }
    }
}

impl From<&str> for TopicFilter {
    fn from(topic: &str) -> Self {
        if topic == frames::WILDCARD { Self::Any } else { Self::Exact(topic.to_owned()) }
    }
}

impl From<String> for TopicFilter {
    fn from(topic: String) -> Self {
        if topic == frames::WILDCARD { Self::Any } else { Self::Exact(topic) }
    }
}

pub struct Subscription {
    pub(crate) filter: TopicFilter,
    handler: Handler,
}

impl Runtime {
    /// Install the sole subscription, discarding whatever was there.
    pub fn listen<F>(&mut self, filter: impl Into<TopicFilter>, handler: F)
    where
        F: FnMut(&mut Runtime, Option<Value>, &str) -> Result<(), HandlerFault> + 'static,
    {
        self.generation = self.generation.wrapping_add(1);
        self.subscription = Some(Subscription { filter: filter.into(), handler: Box::new(handler) });
    }

    /// Filter of the active subscription, if any.
    #[must_use]
    pub fn subscribed(&self) -> Option<&TopicFilter> {
        self.subscription.as_ref().map(|s| &s.filter)
    }

    /// Decode, route and handle one inbound text frame.
    ///
    /// Decode and handler failures go through the fault policy; nothing
    /// escapes, so the next frame is always processed.
    pub fn handle_frame(&mut self, frame: &str) {
        let envelope = match frames::decode(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.session.report(&Fault::MalformedFrame(err));
                return;
            }
        };

        // The handler gets `&mut self`, so the subscription is moved out for
        // the call and put back unless the handler installed a new one.
        let Some(mut subscription) = self.subscription.take() else {
            tracing::trace!(topic = %envelope.topic, "no subscription; frame ignored");
            return;
        };
        let generation = self.generation;

        let result = if subscription.filter.matches(&envelope.topic) {
            (subscription.handler)(self, envelope.payload, &envelope.topic)
        } else {
            Ok(())
        };

        if self.generation == generation {
            self.subscription = Some(subscription);
        }
        if let Err(fault) = result {
            self.session.report(&Fault::Handler(fault));
        }
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;

//! Remote module loading.
//!
//! PROTOCOL
//! ========
//! 1. `load_module*` stores the completion callback (if any) under the
//!    module name, then sends `module` `{name, params}`.
//! 2. The server answers on `module:<name>` with the module's source.
//! 3. The router evaluates the source in the root scope and hands
//!    `module.returned` to the callback.
//!
//! The callback is stored before the request goes out, so a response can
//! never arrive ahead of its callback as long as the transport cannot
//! deliver inbound frames while `send_frame` is running.

use std::collections::HashMap;

use serde_json::Value;

use crate::diagnostics::HandlerFault;
use crate::runtime::Runtime;

/// Root-scope object a module writes its result into.
pub const MODULE_SLOT: &str = "module";

/// Field of [`MODULE_SLOT`] holding the result.
pub const RESULT_FIELD: &str = "returned";

/// One-shot completion callback, given `module.returned` (`None` if unset).
pub type ModuleCallback = Box<dyn FnOnce(&mut Runtime, Option<Value>) -> Result<(), HandlerFault>>;

/// Callbacks waiting for their `module:<name>` response.
#[derive(Default)]
pub struct PendingModules {
    callbacks: HashMap<String, ModuleCallback>,
}

impl PendingModules {
    /// Store `callback` for `name`, replacing an earlier one.
    pub fn insert(&mut self, name: &str, callback: ModuleCallback) {
        if self.callbacks.insert(name.to_owned(), callback).is_some() {
            tracing::debug!(module = name, "pending module callback replaced");
        }
    }

    pub fn take(&mut self, name: &str) -> Option<ModuleCallback> {
        self.callbacks.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl Runtime {
    /// Request module `name` without waiting for its result.
    pub fn load_module(&mut self, name: &str, params: Option<Value>) {
        self.session.request_module(name, params);
    }

    /// Request module `name`; `callback` runs once with `module.returned`
    /// when the module arrives.
    pub fn load_module_then<F>(&mut self, name: &str, params: Option<Value>, callback: F)
    where
        F: FnOnce(&mut Runtime, Option<Value>) -> Result<(), HandlerFault> + 'static,
    {
        self.pending.insert(name, Box::new(callback));
        self.session.request_module(name, params);
    }

    #[must_use]
    pub fn pending_modules(&self) -> &PendingModules {
        &self.pending
    }

    /// Handle a `module:<name>` delivery.
    ///
    /// The pending entry is removed up front, so it is gone afterwards
    /// whether or not the callback ran. A literal `false` payload means no
    /// module: nothing runs and the callback is dropped.
    pub(crate) fn on_module_response(&mut self, name: &str, payload: Option<Value>) -> Result<(), HandlerFault> {
        let callback = self.pending.take(name);
        if matches!(payload, Some(Value::Bool(false))) {
            tracing::debug!(module = name, "module declined by peer");
            return Ok(());
        }

        if let Some(Value::Object(slot)) = self.globals.get_mut(MODULE_SLOT) {
            slot.remove(RESULT_FIELD);
        }
        self.run_payload(payload.as_ref())?;

        let returned = self.globals.lookup(&[MODULE_SLOT, RESULT_FIELD]).cloned();
        match callback {
            Some(callback) => callback(self, returned),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "modules_test.rs"]
mod tests;

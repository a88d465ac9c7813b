//! Script namespaces and the throwaway units attached to them.

use serde_json::{Map, Value};

/// A named-value namespace scripts read from and write to.
///
/// The runtime owns one root scope (the ambient global namespace); callers
/// may create others to host isolated executions.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: Map<String, Value>,
    attached: usize,
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Follow `name.field.field...` through nested objects.
    #[must_use]
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let (root, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.bindings.get(*root)?, |value, field| value.get(*field))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.bindings.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    #[must_use]
    pub fn bindings(&self) -> &Map<String, Value> {
        &self.bindings
    }

    pub(super) fn bindings_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.bindings
    }

    /// Number of execution units currently attached. Zero whenever no
    /// `execute` call is in flight.
    #[must_use]
    pub fn attached_units(&self) -> usize {
        self.attached
    }

    pub(super) fn attach(&mut self) -> Unit<'_> {
        self.attached += 1;
        Unit { host: self, locals: Map::new() }
    }
}

/// One throwaway execution context. Detaches from its host when dropped,
/// taking its `let` bindings with it.
pub(super) struct Unit<'a> {
    host: &'a mut Scope,
    locals: Map<String, Value>,
}

impl Unit<'_> {
    pub(super) fn parts(&mut self) -> (&mut Scope, &mut Map<String, Value>) {
        (&mut *self.host, &mut self.locals)
    }
}

impl Drop for Unit<'_> {
    fn drop(&mut self) {
        self.host.attached -= 1;
    }
}

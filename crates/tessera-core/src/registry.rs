//! Process-wide class registry shared by every instance.
//!
//! Receivers are instances of a class. A class maps selectors to methods. The
//! registry sits behind a global read/write lock: every locked instance holds a read
//! guard for as long as it is locked, and the rare writer (class registration) has
//! to go through [`InstanceGuard::global_upgrade`](crate::InstanceGuard::global_upgrade).

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::debug;

use crate::atom::{selectors, Message, Symbol};
use crate::patch::{Outlet, Patch};

/// A class method. Runs with the instance lock held.
pub type Method = fn(&mut MethodContext<'_>, &Message);

/// What a method can reach while handling one message.
pub struct MethodContext<'a> {
    pub(crate) receiver: Symbol,
    pub(crate) receiver_name: &'static str,
    pub(crate) patch: &'a mut Option<Box<dyn Patch>>,
    pub(crate) outlet: Outlet<'a>,
}

impl<'a> MethodContext<'a> {
    /// Name the message was sent to.
    pub fn receiver(&self) -> Symbol {
        self.receiver
    }

    pub fn outlet(&mut self) -> &mut Outlet<'a> {
        &mut self.outlet
    }

    /// Queues `message` for the host's control hooks, tagged with the receiver name.
    pub fn forward_to_host(&mut self, message: &Message) -> bool {
        self.outlet.forward(self.receiver, message)
    }

    /// Hands `message` to the loaded patch, if any.
    pub fn forward_to_patch(&mut self, message: &Message) {
        if let Some(patch) = self.patch.as_mut() {
            patch.receive(self.receiver_name, message, &mut self.outlet);
        }
    }
}

#[derive(Clone)]
pub struct Class {
    name: Symbol,
    methods: HashMap<Symbol, Method>,
}

impl Class {
    pub fn new(name: &str) -> Self {
        Self {
            name: Symbol::new(name),
            methods: HashMap::new(),
        }
    }

    /// Adds a method for `selector`. Use `"anything"` for the catch-all.
    pub fn with_method(mut self, selector: &str, method: Method) -> Self {
        self.methods.insert(Symbol::new(selector), method);
        self
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    /// The method for `selector`, falling back to the catch-all.
    pub fn method(&self, selector: Symbol) -> Option<Method> {
        self.methods
            .get(&selector)
            .or_else(|| self.methods.get(&selectors().anything))
            .copied()
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<Symbol, Class>,
}

impl ClassRegistry {
    pub fn get(&self, name: Symbol) -> Option<&Class> {
        self.classes.get(&name)
    }

    pub fn contains(&self, name: &str) -> bool {
        Symbol::lookup(name).is_some_and(|s| self.classes.contains_key(&s))
    }

    /// Adds or replaces a class. Returns the replaced class.
    pub fn insert(&mut self, class: Class) -> Option<Class> {
        debug!(class = %class.name, "class registered");
        self.classes.insert(class.name, class)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

pub(crate) fn registry() -> &'static RwLock<ClassRegistry> {
    static REGISTRY: OnceLock<RwLock<ClassRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(builtin_classes()))
}

/// Class of receivers created by the host with `bind`.
pub const RECEIVER_CLASS: &str = "receiver";

/// Class of the names a patch listens on.
pub const INLET_CLASS: &str = "inlet";

fn forward_to_host(ctx: &mut MethodContext<'_>, message: &Message) {
    ctx.forward_to_host(message);
}

fn ignore(_: &mut MethodContext<'_>, _: &Message) {}

fn forward_to_patch(ctx: &mut MethodContext<'_>, message: &Message) {
    ctx.forward_to_patch(message);
}

fn builtin_classes() -> ClassRegistry {
    let mut registry = ClassRegistry::default();
    registry.insert(
        Class::new(RECEIVER_CLASS)
            .with_method("bang", forward_to_host)
            .with_method("float", forward_to_host)
            .with_method("symbol", forward_to_host)
            .with_method("pointer", ignore)
            .with_method("list", forward_to_host)
            .with_method("anything", forward_to_host),
    );
    registry.insert(Class::new(INLET_CLASS).with_method("anything", forward_to_patch));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_present() {
        let registry = registry().read();
        assert!(registry.contains(RECEIVER_CLASS));
        assert!(registry.contains(INLET_CLASS));
    }

    #[test]
    fn test_method_falls_back_to_anything() {
        fn first(_: &mut MethodContext<'_>, _: &Message) {}
        let class = Class::new("fallback-test")
            .with_method("bang", first)
            .with_method("anything", ignore);

        assert!(class.method(Symbol::new("bang")).is_some());
        assert!(class.method(Symbol::new("set")).is_some());

        let strict = Class::new("strict-test").with_method("bang", first);
        assert!(strict.method(Symbol::new("set")).is_none());
    }
}

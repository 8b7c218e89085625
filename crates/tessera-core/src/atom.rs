//! Atoms, interned symbols and engine messages.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;
use smallvec::SmallVec;

struct Interner {
    ids: HashMap<&'static str, Symbol>,
    names: Vec<&'static str>,
}

fn interner() -> &'static RwLock<Interner> {
    static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| {
        RwLock::new(Interner {
            ids: HashMap::from([("", Symbol(0))]),
            names: vec![""],
        })
    })
}

/// Process-wide interned string.
///
/// Symbols are never freed, so a symbol id stays valid for the life of the
/// process and can cross the event bridge as a plain 32-bit integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Interns `name`. Only allocates the first time a name is seen.
    pub fn new(name: &str) -> Self {
        if let Some(&sym) = interner().read().ids.get(name) {
            return sym;
        }
        let mut table = interner().write();
        // Another thread may have interned it between the two locks.
        if let Some(&sym) = table.ids.get(name) {
            return sym;
        }
        let name: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let sym = Symbol(table.names.len() as u32);
        table.names.push(name);
        table.ids.insert(name, sym);
        sym
    }

    /// The empty symbol.
    #[inline]
    pub const fn empty() -> Self {
        Symbol(0)
    }

    /// Looks up an already interned name without interning it.
    pub fn lookup(name: &str) -> Option<Self> {
        interner().read().ids.get(name).copied()
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.0
    }

    /// Rebuilds a symbol from an id read off the wire.
    pub(crate) fn from_id(id: u32) -> Option<Self> {
        let table = interner().read();
        ((id as usize) < table.names.len()).then_some(Symbol(id))
    }

    pub fn as_str(&self) -> &'static str {
        interner().read().names[self.0 as usize]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

/// The engine's minimal tagged value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Atom {
    Float(f32),
    Symbol(Symbol),
    /// Opaque engine-internal reference. Carries no data across the bridge.
    Pointer,
}

impl Atom {
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Atom::Float(_))
    }

    #[inline]
    pub fn is_symbol(&self) -> bool {
        matches!(self, Atom::Symbol(_))
    }

    #[inline]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Atom::Float(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<Symbol> {
        match *self {
            Atom::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f32> for Atom {
    fn from(f: f32) -> Self {
        Atom::Float(f)
    }
}

impl From<Symbol> for Atom {
    fn from(s: Symbol) -> Self {
        Atom::Symbol(s)
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::Symbol(Symbol::new(s))
    }
}

/// Selectors every receiver class understands, interned once.
pub(crate) struct Selectors {
    pub bang: Symbol,
    pub float: Symbol,
    pub symbol: Symbol,
    pub pointer: Symbol,
    pub list: Symbol,
    pub anything: Symbol,
}

pub(crate) fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        bang: Symbol::new("bang"),
        float: Symbol::new("float"),
        symbol: Symbol::new("symbol"),
        pointer: Symbol::new("pointer"),
        list: Symbol::new("list"),
        anything: Symbol::new("anything"),
    })
}

/// Atom list. Short lists stay inline.
pub type Atoms = SmallVec<[Atom; 8]>;

/// A message delivered to a receiver.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Bang,
    Float(f32),
    Symbol(Symbol),
    Pointer,
    List(Atoms),
    /// Selector-qualified message, e.g. `set 1 2`.
    Typed { selector: Symbol, args: Atoms },
}

impl Message {
    pub fn list<I: IntoIterator<Item = Atom>>(atoms: I) -> Self {
        Message::List(atoms.into_iter().collect())
    }

    pub fn typed<I: IntoIterator<Item = Atom>>(selector: &str, args: I) -> Self {
        Message::Typed {
            selector: Symbol::new(selector),
            args: args.into_iter().collect(),
        }
    }

    /// The selector a receiver class dispatches on.
    pub fn selector(&self) -> Symbol {
        let s = selectors();
        match self {
            Message::Bang => s.bang,
            Message::Float(_) => s.float,
            Message::Symbol(_) => s.symbol,
            Message::Pointer => s.pointer,
            Message::List(_) => s.list,
            Message::Typed { selector, .. } => *selector,
        }
    }
}

/// Incrementally assembles a list or typed message.
///
/// # Example
/// ```
/// use tessera_core::{Atom, Message, MessageBuilder};
///
/// let msg = MessageBuilder::new().add_float(1.0).add_symbol("two").finish_list();
/// assert_eq!(msg, Message::list([Atom::Float(1.0), Atom::from("two")]));
/// ```
#[derive(Debug, Default, Clone)]
pub struct MessageBuilder {
    atoms: Atoms,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            atoms: Atoms::with_capacity(capacity),
        }
    }

    pub fn add_float(mut self, value: f32) -> Self {
        self.atoms.push(Atom::Float(value));
        self
    }

    pub fn add_symbol(mut self, name: &str) -> Self {
        self.atoms.push(Atom::Symbol(Symbol::new(name)));
        self
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn finish_list(self) -> Message {
        Message::List(self.atoms)
    }

    pub fn finish_message(self, selector: &str) -> Message {
        Message::Typed {
            selector: Symbol::new(selector),
            args: self.atoms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_stable() {
        let a = Symbol::new("osc-freq");
        let b = Symbol::new("osc-freq");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "osc-freq");
        assert_ne!(a, Symbol::new("osc-gain"));
    }

    #[test]
    fn test_empty_symbol() {
        assert!(Symbol::empty().is_empty());
        assert_eq!(Symbol::new(""), Symbol::empty());
    }

    #[test]
    fn test_lookup_does_not_intern() {
        assert_eq!(Symbol::lookup("never-interned-name-xyz"), None);
        let sym = Symbol::new("interned-once");
        assert_eq!(Symbol::lookup("interned-once"), Some(sym));
    }

    #[test]
    fn test_from_id_rejects_unknown() {
        let sym = Symbol::new("known");
        assert_eq!(Symbol::from_id(sym.id()), Some(sym));
        assert_eq!(Symbol::from_id(u32::MAX), None);
    }

    #[test]
    fn test_selectors() {
        assert_eq!(Message::Bang.selector().as_str(), "bang");
        assert_eq!(Message::list([Atom::Float(1.0)]).selector().as_str(), "list");
        assert_eq!(Message::typed("set", []).selector().as_str(), "set");
    }

    #[test]
    fn test_builder_typed_message() {
        let msg = MessageBuilder::with_capacity(2)
            .add_symbol("a")
            .add_float(3.0)
            .finish_message("set");
        match msg {
            Message::Typed { selector, args } => {
                assert_eq!(selector.as_str(), "set");
                assert_eq!(args.as_slice(), &[Atom::from("a"), Atom::Float(3.0)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

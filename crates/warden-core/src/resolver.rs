//! Entry point resolution.
//!
//! Callers identify the code an isolate should run with an opaque numeric
//! token. Before an engine is created the token is resolved into whatever
//! code reference the engine factory understands.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Opaque entry point token supplied by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryPoint(pub i64);

impl From<i64> for EntryPoint {
    fn from(token: i64) -> Self {
        Self(token)
    }
}

impl From<i32> for EntryPoint {
    fn from(token: i32) -> Self {
        Self(token.into())
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps entry point tokens to loadable code references.
///
/// Returning `None` means the token is unknown; the orchestrator reports it
/// to the caller and moves on to the next request.
pub trait EntryPointResolver {
    /// Code reference handed to the engine factory.
    type Code;

    /// Resolve a token. Must be safe to call repeatedly.
    fn resolve(&self, entry_point: EntryPoint) -> Option<Self::Code>;
}

/// Table-driven resolver.
#[derive(Debug, Clone)]
pub struct EntryPointRegistry<C> {
    entries: FxHashMap<EntryPoint, C>,
}

impl<C> Default for EntryPointRegistry<C> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<C> EntryPointRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register code under a token, returning the previous registration.
    pub fn register(&mut self, entry_point: impl Into<EntryPoint>, code: C) -> Option<C> {
        self.entries.insert(entry_point.into(), code)
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, entry_point: impl Into<EntryPoint>, code: C) -> Self {
        self.register(entry_point, code);
        self
    }

    /// Remove a registration.
    pub fn unregister(&mut self, entry_point: EntryPoint) -> Option<C> {
        self.entries.remove(&entry_point)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Clone> EntryPointResolver for EntryPointRegistry<C> {
    type Code = C;

    fn resolve(&self, entry_point: EntryPoint) -> Option<C> {
        self.entries.get(&entry_point).cloned()
    }
}

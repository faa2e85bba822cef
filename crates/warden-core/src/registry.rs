//! Registry of active isolates, keyed by identifier.

use rustc_hash::FxHashMap;

/// Addressable form of a spawn request after its handshake.
///
/// The isolate's control endpoint travels with its engine, so destroying the
/// engine also closes the endpoint.
pub(crate) struct ActiveIsolateHandle<E> {
    isolate_id: String,
    engine: E,
}

impl<E> ActiveIsolateHandle<E> {
    pub fn new(isolate_id: String, engine: E) -> Self {
        Self { isolate_id, engine }
    }

    pub fn isolate_id(&self) -> &str {
        &self.isolate_id
    }

    pub fn into_engine(self) -> E {
        self.engine
    }
}

/// Active isolates. Identifiers are unique keys.
pub(crate) struct ActiveRegistry<E> {
    isolates: FxHashMap<String, ActiveIsolateHandle<E>>,
}

impl<E> Default for ActiveRegistry<E> {
    fn default() -> Self {
        Self {
            isolates: FxHashMap::default(),
        }
    }
}

impl<E> ActiveRegistry<E> {
    /// Insert a handle. An existing entry under the same id is returned and
    /// left for the caller to dispose of.
    pub fn insert(&mut self, handle: ActiveIsolateHandle<E>) -> Option<ActiveIsolateHandle<E>> {
        self.isolates.insert(handle.isolate_id.clone(), handle)
    }

    pub fn remove(&mut self, isolate_id: &str) -> Option<ActiveIsolateHandle<E>> {
        self.isolates.remove(isolate_id)
    }

    pub fn contains(&self, isolate_id: &str) -> bool {
        self.isolates.contains_key(isolate_id)
    }

    /// Active identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.isolates.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn drain(&mut self) -> Vec<ActiveIsolateHandle<E>> {
        self.isolates.drain().map(|(_, handle)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.isolates.len()
    }
}

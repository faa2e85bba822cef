//! FIFO admission queue for spawn requests.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::error::Error;
use crate::ipc::protocol::Completion;
use crate::registry::ActiveIsolateHandle;
use crate::resolver::EntryPoint;

/// Lifecycle state of a spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Waiting for earlier requests to finish starting.
    Queued,
    /// Entry point resolution and engine creation in progress.
    Starting,
    /// Engine created, waiting for the readiness signal.
    AwaitingHandshake,
    /// Handshake complete; addressable through the registry.
    Active,
    /// Killed after being active. The request leaves the registry at this
    /// point, so this state is only ever reported in the kill log.
    Terminated,
    /// Startup failed; the caller received the error.
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Queued => "queued",
            RequestState::Starting => "starting",
            RequestState::AwaitingHandshake => "awaiting_handshake",
            RequestState::Active => "active",
            RequestState::Terminated => "terminated",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Engine and endpoints attached once a startup attempt has created an engine.
pub(crate) struct Startup<E> {
    pub ticket: u64,
    pub engine: E,
    pub started_at: Instant,
}

/// One caller's intent to start an isolate.
pub(crate) struct SpawnRequest<E> {
    isolate_id: String,
    entry_point: EntryPoint,
    completion: Completion,
    state: RequestState,
    startup: Option<Startup<E>>,
}

impl<E> SpawnRequest<E> {
    pub fn new(isolate_id: String, entry_point: EntryPoint, completion: Completion) -> Self {
        Self {
            isolate_id,
            entry_point,
            completion,
            state: RequestState::Queued,
            startup: None,
        }
    }

    pub fn isolate_id(&self) -> &str {
        &self.isolate_id
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.entry_point
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Ticket of the startup attempt, once an engine exists.
    pub fn ticket(&self) -> Option<u64> {
        self.startup.as_ref().map(|startup| startup.ticket)
    }

    pub fn startup(&self) -> Option<&Startup<E>> {
        self.startup.as_ref()
    }

    /// `Queued → Starting`.
    pub fn begin(&mut self) {
        debug_assert_eq!(self.state, RequestState::Queued);
        self.state = RequestState::Starting;
    }

    /// `Starting → AwaitingHandshake`.
    pub fn attach(&mut self, startup: Startup<E>) {
        debug_assert_eq!(self.state, RequestState::Starting);
        self.state = RequestState::AwaitingHandshake;
        self.startup = Some(startup);
    }

    /// Resolve the completion with `error` and hand back the engine, if one was created.
    pub fn fail(self, error: Error) -> Option<E> {
        let Self {
            isolate_id,
            completion,
            startup,
            ..
        } = self;
        completion.resolve(&isolate_id, Err(error));
        startup.map(|startup| startup.engine)
    }

    /// Move an awaiting request into its active form.
    ///
    /// The completion is returned unresolved so the caller can register the
    /// handle before reporting success.
    pub fn activate(self) -> Result<(ActiveIsolateHandle<E>, Completion), Self> {
        if self.state != RequestState::AwaitingHandshake {
            return Err(self);
        }
        let Self {
            isolate_id,
            completion,
            startup,
            entry_point,
            state,
        } = self;
        match startup {
            Some(startup) => Ok((
                ActiveIsolateHandle::new(isolate_id, startup.engine),
                completion,
            )),
            None => Err(Self {
                isolate_id,
                entry_point,
                completion,
                state,
                startup: None,
            }),
        }
    }
}

/// Spawn requests in arrival order.
///
/// Only the head may be past `Queued`.
pub(crate) struct SpawnQueue<E> {
    requests: VecDeque<SpawnRequest<E>>,
}

impl<E> Default for SpawnQueue<E> {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
        }
    }
}

impl<E> SpawnQueue<E> {
    /// Append a request. Returns `true` if the queue was empty before.
    pub fn push(&mut self, request: SpawnRequest<E>) -> bool {
        let was_empty = self.requests.is_empty();
        self.requests.push_back(request);
        was_empty
    }

    pub fn front(&self) -> Option<&SpawnRequest<E>> {
        self.requests.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut SpawnRequest<E>> {
        self.requests.front_mut()
    }

    pub fn pop(&mut self) -> Option<SpawnRequest<E>> {
        self.requests.pop_front()
    }

    pub fn contains(&self, isolate_id: &str) -> bool {
        self.requests.iter().any(|request| request.isolate_id == isolate_id)
    }

    #[cfg(test)]
    pub fn get(&self, isolate_id: &str) -> Option<&SpawnRequest<E>> {
        self.requests.iter().find(|request| request.isolate_id == isolate_id)
    }

    /// Identifiers of requests still in `Queued`, in order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.requests
            .iter()
            .filter(|request| request.state == RequestState::Queued)
            .map(|request| request.isolate_id.clone())
            .collect()
    }

    /// Identifier of the request currently starting or awaiting its handshake.
    pub fn in_flight_id(&self) -> Option<&str> {
        self.requests
            .front()
            .filter(|request| request.state != RequestState::Queued)
            .map(|request| request.isolate_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}

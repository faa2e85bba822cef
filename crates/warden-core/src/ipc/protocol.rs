//! Messages exchanged with the orchestrator.
//!
//! Two layers live here:
//! - the mailbox [`Command`]s processed one at a time by the control thread;
//! - the transport-shaped [`MethodCall`] / [`MethodResponse`] pair used by
//!   [`ControlChannel::invoke`](super::ControlChannel::invoke).

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::orchestrator::OrchestratorStatus;
use crate::resolver::EntryPoint;

/// Method name for spawning an isolate.
pub const SPAWN_ISOLATE: &str = "spawn_isolate";

/// Method name for killing an isolate.
pub const KILL_ISOLATE: &str = "kill_isolate";

/// Event processed by the orchestrator's control thread.
pub(crate) enum Command {
    Spawn {
        isolate_id: String,
        entry_point: EntryPoint,
        completion: Completion,
    },
    Kill {
        isolate_id: String,
        reply: oneshot::Sender<KillOutcome>,
    },
    Handshake(HandshakeEvent),
    Status {
        reply: oneshot::Sender<OrchestratorStatus>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Readiness signal emitted once per startup attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeSignal {
    /// Identifier of the isolate that is reporting.
    pub isolate_id: String,
    /// Startup attempt the signal belongs to.
    pub ticket: u64,
}

/// What happened on a startup endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HandshakeEvent {
    /// The isolate reported itself ready.
    Ready(HandshakeSignal),
    /// The endpoint was dropped without firing.
    Abandoned(HandshakeSignal),
}

/// Single-use notification of a spawn's outcome.
pub(crate) struct Completion(oneshot::Sender<Result<()>>);

impl Completion {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Resolve the completion. Consuming `self` makes this happen at most once.
    pub(crate) fn resolve(self, isolate_id: &str, result: Result<()>) {
        if self.0.send(result).is_err() {
            tracing::debug!("Caller for isolate {} stopped waiting for its spawn", isolate_id);
        }
    }
}

/// Result of a kill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillOutcome {
    /// The isolate was active and its engine was destroyed.
    Destroyed,
    /// The isolate was active; engine teardown reported an error (logged).
    DestroyFailed,
    /// No active isolate had this identifier. Nothing happened.
    NotFound,
}

/// A method call delivered over a control endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Method name, e.g. `spawn_isolate`.
    pub method: String,
    /// Method arguments.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// `spawn_isolate` call.
    pub fn spawn_isolate(isolate_id: &str, entry_point: impl Into<EntryPoint>) -> Self {
        Self::new(
            SPAWN_ISOLATE,
            serde_json::json!({
                "isolate_id": isolate_id,
                "entry_point": entry_point.into(),
            }),
        )
    }

    /// `kill_isolate` call.
    pub fn kill_isolate(isolate_id: &str) -> Self {
        Self::new(KILL_ISOLATE, serde_json::json!({ "isolate_id": isolate_id }))
    }

    pub(crate) fn decode_arguments<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.arguments.clone()).map_err(|e| Error::InvalidArguments {
            method: self.method.clone(),
            message: e.to_string(),
        })
    }
}

/// Arguments of `spawn_isolate`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SpawnArguments {
    pub isolate_id: String,
    pub entry_point: EntryPoint,
}

/// Arguments of `kill_isolate`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct KillArguments {
    pub isolate_id: String,
}

/// Answer to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    /// The call succeeded.
    Success { result: serde_json::Value },
    /// The call failed.
    Error { code: String, message: String },
    /// The method is not known.
    NotImplemented,
}

impl MethodResponse {
    pub fn success(result: serde_json::Value) -> Self {
        Self::Success { result }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Error code, if this is an error response.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<Error> for MethodResponse {
    fn from(error: Error) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

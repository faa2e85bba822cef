//! Control channel: the command surface of the orchestrator.
//!
//! Every caller (the host application and every running isolate) talks to the
//! orchestrator through a `ControlChannel`. Calls are queued on the control
//! thread's mailbox and answered through one-shot replies.

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::orchestrator::OrchestratorStatus;
use crate::resolver::EntryPoint;

use super::protocol::{
    Command, Completion, KILL_ISOLATE, KillArguments, KillOutcome, MethodCall, MethodResponse,
    SPAWN_ISOLATE, SpawnArguments,
};

/// Cloneable sender half of the orchestrator mailbox.
#[derive(Clone)]
pub struct ControlChannel {
    mailbox: mpsc::UnboundedSender<Command>,
}

/// A call that has been queued and is waiting for its answer.
enum Pending {
    Spawn(oneshot::Receiver<Result<()>>),
    Kill(oneshot::Receiver<KillOutcome>),
}

impl Pending {
    async fn wait(self) -> MethodResponse {
        match self {
            Pending::Spawn(rx) => spawn_response(rx.await.unwrap_or(Err(Error::Shutdown))),
            Pending::Kill(rx) => kill_response(rx.await.ok()),
        }
    }

    fn wait_blocking(self) -> MethodResponse {
        match self {
            Pending::Spawn(rx) => spawn_response(rx.blocking_recv().unwrap_or(Err(Error::Shutdown))),
            Pending::Kill(rx) => kill_response(rx.blocking_recv().ok()),
        }
    }
}

fn spawn_response(result: Result<()>) -> MethodResponse {
    match result {
        Ok(()) => MethodResponse::success(serde_json::Value::Null),
        Err(e) => e.into(),
    }
}

// Kill always reports `true` on the method surface, including unknown ids.
fn kill_response(outcome: Option<KillOutcome>) -> MethodResponse {
    match outcome {
        Some(_) => MethodResponse::success(serde_json::Value::Bool(true)),
        None => Error::Shutdown.into(),
    }
}

impl ControlChannel {
    pub(crate) fn new(mailbox: mpsc::UnboundedSender<Command>) -> Self {
        Self { mailbox }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.mailbox.send(command).map_err(|_| Error::Shutdown)
    }

    fn queue_spawn(&self, isolate_id: String, entry_point: EntryPoint) -> Result<oneshot::Receiver<Result<()>>> {
        let (completion, rx) = Completion::new();
        self.send(Command::Spawn {
            isolate_id,
            entry_point,
            completion,
        })?;
        Ok(rx)
    }

    fn queue_kill(&self, isolate_id: String) -> Result<oneshot::Receiver<KillOutcome>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Kill { isolate_id, reply })?;
        Ok(rx)
    }

    /// Request a new isolate. Resolves once it is active or has failed.
    pub async fn spawn(
        &self,
        isolate_id: impl Into<String>,
        entry_point: impl Into<EntryPoint>,
    ) -> Result<()> {
        let rx = self.queue_spawn(isolate_id.into(), entry_point.into())?;
        rx.await.unwrap_or(Err(Error::Shutdown))
    }

    /// Terminate an active isolate.
    pub async fn kill(&self, isolate_id: impl Into<String>) -> Result<KillOutcome> {
        let rx = self.queue_kill(isolate_id.into())?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Snapshot of queued, starting and active isolates.
    pub async fn status(&self) -> Result<OrchestratorStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply })?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Blocking variant of [`spawn`](Self::spawn) for engine threads.
    ///
    /// Must not be called from inside an async runtime.
    pub fn spawn_blocking(
        &self,
        isolate_id: impl Into<String>,
        entry_point: impl Into<EntryPoint>,
    ) -> Result<()> {
        let rx = self.queue_spawn(isolate_id.into(), entry_point.into())?;
        rx.blocking_recv().unwrap_or(Err(Error::Shutdown))
    }

    /// Blocking variant of [`kill`](Self::kill) for engine threads.
    pub fn kill_blocking(&self, isolate_id: impl Into<String>) -> Result<KillOutcome> {
        let rx = self.queue_kill(isolate_id.into())?;
        rx.blocking_recv().map_err(|_| Error::Shutdown)
    }

    fn dispatch(&self, call: &MethodCall) -> std::result::Result<Pending, MethodResponse> {
        match call.method.as_str() {
            SPAWN_ISOLATE => {
                let args: SpawnArguments = call.decode_arguments()?;
                Ok(Pending::Spawn(self.queue_spawn(args.isolate_id, args.entry_point)?))
            }
            KILL_ISOLATE => {
                let args: KillArguments = call.decode_arguments()?;
                Ok(Pending::Kill(self.queue_kill(args.isolate_id)?))
            }
            other => {
                tracing::debug!("Method not implemented: {}", other);
                Err(MethodResponse::NotImplemented)
            }
        }
    }

    /// Handle a method call the way a transport would deliver it.
    pub async fn invoke(&self, call: MethodCall) -> MethodResponse {
        match self.dispatch(&call) {
            Ok(pending) => pending.wait().await,
            Err(response) => response,
        }
    }

    /// Blocking variant of [`invoke`](Self::invoke) for engine threads.
    pub fn invoke_blocking(&self, call: MethodCall) -> MethodResponse {
        match self.dispatch(&call) {
            Ok(pending) => pending.wait_blocking(),
            Err(response) => response,
        }
    }

    /// Whether the orchestrator has stopped.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_method_is_not_implemented() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let channel = ControlChannel::new(tx);
        let response = channel
            .invoke(MethodCall::new("pause_isolate", serde_json::Value::Null))
            .await;
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_rejected_before_queueing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = ControlChannel::new(tx);
        let response = channel
            .invoke(MethodCall::new(SPAWN_ISOLATE, serde_json::json!({ "entry_point": 1 })))
            .await;
        assert_eq!(response.error_code(), Some("invalid_arguments"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_mailbox_reports_shutdown() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let channel = ControlChannel::new(tx);
        assert!(channel.is_closed());
        assert!(matches!(channel.spawn("a", 1).await, Err(Error::Shutdown)));
        assert!(matches!(channel.kill("a").await, Err(Error::Shutdown)));
        let response = channel.invoke(MethodCall::kill_isolate("a")).await;
        assert_eq!(response.error_code(), Some("shutdown"));
    }
}

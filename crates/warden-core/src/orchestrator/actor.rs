//! Control thread hosting the orchestrator.
//!
//! The orchestrator runs on its own named thread with a current-thread tokio
//! runtime. Callers hold an [`OrchestratorHandle`]; engines hold clones of the
//! underlying [`ControlChannel`]. All of them feed the same mailbox.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::config::OrchestratorConfig;
use crate::engine::EngineFactory;
use crate::error::Result;
use crate::ipc::protocol::Command;
use crate::ipc::{ControlChannel, KillOutcome, MethodCall, MethodResponse};
use crate::resolver::{EntryPoint, EntryPointResolver};

use super::{Orchestrator, OrchestratorStatus};

impl<F, R> Orchestrator<F, R>
where
    F: EngineFactory + Send + 'static,
    R: EntryPointResolver<Code = F::Code> + Send + 'static,
{
    /// Start the orchestrator on a dedicated control thread.
    ///
    /// The orchestrator stops when [`OrchestratorHandle::shutdown`] is called
    /// or the last handle clone is dropped. Engines still running at that
    /// point are destroyed.
    pub fn start(factory: F, resolver: R, config: OrchestratorConfig) -> Result<OrchestratorHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mailbox = tx.clone();
        let thread_name = config.thread_name.clone();

        thread::Builder::new().name(thread_name.clone()).spawn(move || {
            Orchestrator::new(factory, resolver, config, mailbox).run(rx);
        })?;

        tracing::debug!("Started orchestrator thread {}", thread_name);

        Ok(OrchestratorHandle {
            control: ControlChannel::new(tx.clone()),
            guard: Arc::new(ShutdownGuard { mailbox: tx }),
        })
    }

    fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Command>) {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Failed to create orchestrator runtime: {}", e);
                return;
            }
        };

        runtime.block_on(async {
            loop {
                let deadline = self.handshake_deadline();
                tokio::select! {
                    command = mailbox.recv() => {
                        let Some(command) = command else { break };
                        if self.handle(command).is_break() {
                            break;
                        }
                    }
                    ticket = wait_until(deadline) => self.on_handshake_timeout(ticket),
                }
            }
        });

        self.shutdown();
        tracing::debug!("Orchestrator stopped");
    }
}

/// Resolve with the ticket once its deadline passes. Never resolves for `None`.
async fn wait_until(deadline: Option<(u64, Instant)>) -> u64 {
    match deadline {
        Some((ticket, at)) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
            ticket
        }
        None => std::future::pending().await,
    }
}

/// Sends `Shutdown` when the last handle clone goes away.
struct ShutdownGuard {
    mailbox: mpsc::UnboundedSender<Command>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.mailbox.send(Command::Shutdown { reply: None });
    }
}

/// Owning handle to a running orchestrator.
///
/// Clones share ownership. Dropping the last clone shuts the orchestrator
/// down; [`ControlChannel`]s held by engines do not keep it alive.
#[derive(Clone)]
pub struct OrchestratorHandle {
    control: ControlChannel,
    guard: Arc<ShutdownGuard>,
}

impl OrchestratorHandle {
    /// Request a new isolate. Resolves once it is active or has failed.
    pub async fn spawn(
        &self,
        isolate_id: impl Into<String>,
        entry_point: impl Into<EntryPoint>,
    ) -> Result<()> {
        self.control.spawn(isolate_id, entry_point).await
    }

    /// Terminate an active isolate.
    pub async fn kill(&self, isolate_id: impl Into<String>) -> Result<KillOutcome> {
        self.control.kill(isolate_id).await
    }

    pub async fn status(&self) -> Result<OrchestratorStatus> {
        self.control.status().await
    }

    /// Handle a `spawn_isolate` / `kill_isolate` method call.
    pub async fn invoke(&self, call: MethodCall) -> MethodResponse {
        self.control.invoke(call).await
    }

    /// A control channel that does not keep the orchestrator alive.
    pub fn control(&self) -> ControlChannel {
        self.control.clone()
    }

    /// Stop the orchestrator and wait until every engine has been destroyed.
    ///
    /// Pending spawns fail with [`Error::Shutdown`](crate::Error::Shutdown).
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.guard.mailbox.send(Command::Shutdown { reply: Some(reply) }).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Whether the orchestrator has stopped.
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::engine::{EntryFunction, IsolateContext, ThreadEngineFactory};
    use crate::error::Error;
    use crate::resolver::EntryPointRegistry;

    fn entries() -> EntryPointRegistry<EntryFunction> {
        EntryPointRegistry::new()
            .with(
                1,
                EntryFunction::new("idle", |mut ctx: IsolateContext| {
                    ctx.ready();
                    ctx.wait_for_termination();
                }),
            )
            .with(
                2,
                EntryFunction::new("silent", |ctx: IsolateContext| ctx.wait_for_termination()),
            )
    }

    #[tokio::test]
    async fn test_spawn_and_kill_through_handle() {
        let handle =
            Orchestrator::start(ThreadEngineFactory::new(), entries(), OrchestratorConfig::default())
                .unwrap();

        handle.spawn("a", 1).await.unwrap();
        assert_eq!(handle.status().await.unwrap().active, vec!["a"]);
        assert_eq!(handle.kill("a").await.unwrap(), KillOutcome::Destroyed);
        assert!(handle.status().await.unwrap().active.is_empty());

        handle.shutdown().await;
        assert!(matches!(handle.spawn("b", 1).await, Err(Error::Shutdown)));
    }

    #[tokio::test]
    async fn test_timeout_fires_on_control_thread() {
        let config = OrchestratorConfig::default().with_handshake_timeout(Some(Duration::from_millis(50)));
        let handle = Orchestrator::start(ThreadEngineFactory::new(), entries(), config).unwrap();

        let result = handle.spawn("quiet", 2).await;
        assert!(matches!(result, Err(Error::HandshakeTimeout { .. })));
        handle.spawn("loud", 1).await.unwrap();
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropping_last_handle_stops_orchestrator() {
        let handle =
            Orchestrator::start(ThreadEngineFactory::new(), entries(), OrchestratorConfig::default())
                .unwrap();
        let control = handle.control();
        handle.spawn("a", 1).await.unwrap();
        drop(handle);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !control.is_closed() {
            assert!(Instant::now() < deadline, "orchestrator did not stop");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(control.status().await, Err(Error::Shutdown)));
    }
}

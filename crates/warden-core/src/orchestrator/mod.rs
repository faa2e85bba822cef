//! Spawn orchestration state machine.
//!
//! The [`Orchestrator`] owns the spawn queue and the active registry and is
//! the only code that mutates them. Every event (spawn, kill, handshake,
//! timeout) is handled to completion before the next one is looked at.
//!
//! # Request lifecycle
//!
//! ```text
//! Queued ──► Starting ──► AwaitingHandshake ──► Active ──► Terminated
//!   │            │                │
//!   └────────────┴────────────────┴──► Failed
//! ```
//!
//! `Terminated` and `Failed` are final: the request is removed from the queue
//! or registry as it enters them, and its identifier becomes free again.
//!
//! Only the head of the queue ever leaves `Queued`, and it does so only when
//! nothing else is starting. A handshake pops the head, registers it, and
//! starts the next request.

mod actor;

pub use actor::OrchestratorHandle;

use std::ops::ControlFlow;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::OrchestratorConfig;
use crate::engine::{EngineEndpoints, EngineFactory};
use crate::error::{Error, Result};
use crate::ipc::protocol::{Command, Completion, HandshakeEvent};
use crate::ipc::{ControlChannel, HandshakeSignal, KillOutcome, StartupEndpoint};
use crate::queue::{RequestState, SpawnQueue, SpawnRequest, Startup};
use crate::registry::ActiveRegistry;
use crate::resolver::{EntryPoint, EntryPointResolver};

/// Snapshot of the orchestrator's queue and registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Requests waiting to start, oldest first.
    pub queued: Vec<String>,
    /// Request currently starting or awaiting its handshake.
    pub starting: Option<String>,
    /// Active isolates, sorted.
    pub active: Vec<String>,
}

/// Owner of the spawn queue and active registry.
pub struct Orchestrator<F: EngineFactory, R> {
    factory: F,
    resolver: R,
    config: OrchestratorConfig,
    queue: SpawnQueue<F::Engine>,
    registry: ActiveRegistry<F::Engine>,
    /// Sender half of our own mailbox, cloned into engine endpoints.
    mailbox: mpsc::UnboundedSender<Command>,
    next_ticket: u64,
}

impl<F, R> Orchestrator<F, R>
where
    F: EngineFactory,
    R: EntryPointResolver<Code = F::Code>,
{
    pub(crate) fn new(
        factory: F,
        resolver: R,
        config: OrchestratorConfig,
        mailbox: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            factory,
            resolver,
            config,
            queue: SpawnQueue::default(),
            registry: ActiveRegistry::default(),
            mailbox,
            next_ticket: 1,
        }
    }

    /// Process one mailbox event. `Break` stops the control loop.
    pub(crate) fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Spawn {
                isolate_id,
                entry_point,
                completion,
            } => self.spawn(isolate_id, entry_point, completion),
            Command::Kill { isolate_id, reply } => {
                let outcome = self.kill(&isolate_id);
                let _ = reply.send(outcome);
            }
            Command::Handshake(event) => self.on_handshake(event),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Admit a spawn request.
    pub(crate) fn spawn(&mut self, isolate_id: String, entry_point: EntryPoint, completion: Completion) {
        if isolate_id.is_empty() {
            completion.resolve(&isolate_id, Err(Error::InvalidIsolateId(isolate_id.clone())));
            return;
        }
        if self.queue.contains(&isolate_id) || self.registry.contains(&isolate_id) {
            tracing::debug!("Rejecting duplicate spawn for isolate {}", isolate_id);
            completion.resolve(&isolate_id, Err(Error::DuplicateIsolate(isolate_id.clone())));
            return;
        }

        tracing::debug!(
            "Queued isolate {} (entry point {}), {} ahead",
            isolate_id,
            entry_point,
            self.queue.len()
        );
        let was_idle = self.queue.push(SpawnRequest::new(isolate_id, entry_point, completion));
        if was_idle {
            self.start_next();
        }
    }

    /// Start the head of the queue if it has not started yet.
    ///
    /// Failures pop the head and move on, so a bad request never stalls the
    /// ones behind it.
    fn start_next(&mut self) {
        loop {
            let (isolate_id, entry_point) = match self.queue.front_mut() {
                Some(request) if request.state() == RequestState::Queued => {
                    request.begin();
                    (request.isolate_id().to_string(), request.entry_point())
                }
                _ => return,
            };

            match self.begin_startup(&isolate_id, entry_point) {
                Ok(startup) => {
                    tracing::debug!(
                        "Isolate {} awaiting handshake (ticket {})",
                        isolate_id,
                        startup.ticket
                    );
                    if let Some(request) = self.queue.front_mut() {
                        request.attach(startup);
                    }
                    return;
                }
                Err(error) => {
                    tracing::warn!("Failed to start isolate {}: {}", isolate_id, error);
                    if let Some(request) = self.queue.pop() {
                        request.fail(error);
                    }
                }
            }
        }
    }

    /// Resolve the entry point and create the engine.
    fn begin_startup(
        &mut self,
        isolate_id: &str,
        entry_point: EntryPoint,
    ) -> Result<Startup<F::Engine>> {
        let code = self
            .resolver
            .resolve(entry_point)
            .ok_or(Error::Resolution(entry_point))?;

        let creation_error = |e: crate::engine::EngineError| Error::Creation {
            isolate_id: isolate_id.to_string(),
            message: e.to_string(),
        };
        self.factory.prepare().map_err(creation_error)?;

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let endpoints = EngineEndpoints {
            isolate_id: isolate_id.to_string(),
            startup: StartupEndpoint::new(isolate_id, ticket, self.mailbox.clone()),
            control: ControlChannel::new(self.mailbox.clone()),
        };
        let engine = self.factory.create(&code, endpoints).map_err(creation_error)?;

        Ok(Startup {
            ticket,
            engine,
            started_at: Instant::now(),
        })
    }

    fn is_awaiting(&self, signal: &HandshakeSignal) -> bool {
        self.queue.front().is_some_and(|request| {
            request.state() == RequestState::AwaitingHandshake && request.ticket() == Some(signal.ticket)
        })
    }

    /// Handle an event from a startup endpoint.
    pub(crate) fn on_handshake(&mut self, event: HandshakeEvent) {
        match event {
            HandshakeEvent::Ready(signal) => {
                if !self.is_awaiting(&signal) {
                    tracing::warn!(
                        "Ignoring handshake from isolate {} (ticket {}): no matching startup in progress",
                        signal.isolate_id,
                        signal.ticket
                    );
                    return;
                }
                let Some(request) = self.queue.pop() else {
                    return;
                };
                self.promote(request);
                self.start_next();
            }
            HandshakeEvent::Abandoned(signal) => {
                if !self.is_awaiting(&signal) {
                    tracing::debug!(
                        "Startup endpoint for isolate {} closed after its attempt ended",
                        signal.isolate_id
                    );
                    return;
                }
                self.fail_in_flight(Error::HandshakeAbandoned(signal.isolate_id));
            }
        }
    }

    fn promote(&mut self, request: SpawnRequest<F::Engine>) {
        match request.activate() {
            Ok((handle, completion)) => {
                let isolate_id = handle.isolate_id().to_string();
                if let Some(previous) = self.registry.insert(handle) {
                    tracing::error!("Isolate {} was already active; destroying the old engine", isolate_id);
                    self.destroy_engine(&isolate_id, previous.into_engine());
                }
                tracing::info!("Isolate {} is active", isolate_id);
                completion.resolve(&isolate_id, Ok(()));
            }
            Err(request) => {
                let isolate_id = request.isolate_id().to_string();
                tracing::error!("Isolate {} handshake arrived in state {}", isolate_id, request.state());
                if let Some(engine) = request.fail(Error::HandshakeAbandoned(isolate_id.clone())) {
                    self.destroy_engine(&isolate_id, engine);
                }
            }
        }
    }

    /// Fail the in-flight head request, tear down its engine and move on.
    fn fail_in_flight(&mut self, error: Error) {
        let Some(request) = self.queue.pop() else {
            return;
        };
        let isolate_id = request.isolate_id().to_string();
        tracing::warn!("Isolate {} failed to start: {}", isolate_id, error);
        if let Some(engine) = request.fail(error) {
            self.destroy_engine(&isolate_id, engine);
        }
        self.start_next();
    }

    /// Deadline of the current handshake, when a timeout is configured.
    pub(crate) fn handshake_deadline(&self) -> Option<(u64, Instant)> {
        let timeout = self.config.handshake_timeout?;
        let startup = self.queue.front()?.startup()?;
        Some((startup.ticket, startup.started_at + timeout))
    }

    /// Fail the in-flight request if `ticket` is still awaiting its handshake.
    pub(crate) fn on_handshake_timeout(&mut self, ticket: u64) {
        let Some(timeout) = self.config.handshake_timeout else {
            return;
        };
        let Some(request) = self.queue.front() else {
            return;
        };
        if request.ticket() != Some(ticket) {
            return;
        }
        let isolate_id = request.isolate_id().to_string();
        self.fail_in_flight(Error::HandshakeTimeout { isolate_id, timeout });
    }

    /// Terminate an active isolate.
    ///
    /// The registry entry is removed whether or not the engine tears down
    /// cleanly. Unknown identifiers are a no-op.
    pub(crate) fn kill(&mut self, isolate_id: &str) -> KillOutcome {
        let Some(handle) = self.registry.remove(isolate_id) else {
            tracing::debug!("Kill requested for unknown isolate {}", isolate_id);
            return KillOutcome::NotFound;
        };
        let destroyed = self.destroy_engine(isolate_id, handle.into_engine());
        tracing::info!("Isolate {} {}", isolate_id, RequestState::Terminated);
        if destroyed {
            KillOutcome::Destroyed
        } else {
            KillOutcome::DestroyFailed
        }
    }

    fn destroy_engine(&mut self, isolate_id: &str, engine: F::Engine) -> bool {
        match self.factory.destroy(engine) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to destroy engine for isolate {}: {}", isolate_id, e);
                false
            }
        }
    }

    pub(crate) fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            queued: self.queue.queued_ids(),
            starting: self.queue.in_flight_id().map(str::to_string),
            active: self.registry.ids(),
        }
    }

    /// Lifecycle state of a queued or active request.
    #[cfg(test)]
    pub(crate) fn state_of(&self, isolate_id: &str) -> Option<RequestState> {
        if self.registry.contains(isolate_id) {
            return Some(RequestState::Active);
        }
        self.queue.get(isolate_id).map(|request| request.state())
    }

    /// Fail every pending request and destroy every engine.
    pub(crate) fn shutdown(&mut self) {
        let pending = self.queue.len();
        let active = self.registry.len();

        while let Some(request) = self.queue.pop() {
            let isolate_id = request.isolate_id().to_string();
            if let Some(engine) = request.fail(Error::Shutdown) {
                self.destroy_engine(&isolate_id, engine);
            }
        }
        for handle in self.registry.drain() {
            let isolate_id = handle.isolate_id().to_string();
            self.destroy_engine(&isolate_id, handle.into_engine());
        }

        if pending + active > 0 {
            tracing::info!(
                "Orchestrator shut down: {} pending requests failed, {} isolates destroyed",
                pending,
                active
            );
        }
    }
}

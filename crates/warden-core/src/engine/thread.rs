//! Thread-backed engines.
//!
//! Each isolate runs its entry function on a dedicated OS thread. The thread
//! receives an [`IsolateContext`] carrying the startup endpoint, the control
//! channel and a termination flag raised by `destroy`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ipc::{ControlChannel, StartupEndpoint};

use super::{EngineEndpoints, EngineError, EngineFactory};

/// How long a waiting isolate parks before re-checking its termination flag.
const TERMINATION_POLL: Duration = Duration::from_millis(50);

type EntryFn = dyn Fn(IsolateContext) + Send + Sync;

/// Named entry function an isolate runs.
#[derive(Clone)]
pub struct EntryFunction {
    name: String,
    run: Arc<EntryFn>,
}

impl EntryFunction {
    pub fn new(name: impl Into<String>, run: impl Fn(IsolateContext) + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for EntryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryFunction").field("name", &self.name).finish()
    }
}

/// Cloneable termination request shared between an engine and its isolate.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
    /// Request termination. Returns `false` if it was already requested.
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an isolate's entry function receives.
pub struct IsolateContext {
    isolate_id: String,
    startup: Option<StartupEndpoint>,
    control: ControlChannel,
    terminate: TerminationFlag,
}

impl IsolateContext {
    pub fn isolate_id(&self) -> &str {
        &self.isolate_id
    }

    /// Complete the startup handshake. Returns `false` if already done.
    pub fn ready(&mut self) -> bool {
        match self.startup.take() {
            Some(endpoint) => {
                endpoint.ready();
                true
            }
            None => false,
        }
    }

    /// Channel for spawning or killing other isolates.
    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate.is_raised()
    }

    /// Block until the engine is destroyed.
    pub fn wait_for_termination(&self) {
        while !self.terminate.is_raised() {
            thread::park_timeout(TERMINATION_POLL);
        }
    }
}

/// A running thread engine.
pub struct ThreadEngine {
    isolate_id: String,
    entry_name: String,
    terminate: TerminationFlag,
    thread: JoinHandle<()>,
}

impl ThreadEngine {
    pub fn isolate_id(&self) -> &str {
        &self.isolate_id
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    /// Termination flag observed by the isolate.
    pub fn termination_flag(&self) -> TerminationFlag {
        self.terminate.clone()
    }

    /// Whether the isolate's entry function has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Engine factory that runs every isolate on its own thread.
#[derive(Debug, Default)]
pub struct ThreadEngineFactory {
    created: u64,
}

impl ThreadEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of engines created so far.
    pub fn created(&self) -> u64 {
        self.created
    }
}

impl EngineFactory for ThreadEngineFactory {
    type Code = EntryFunction;
    type Engine = ThreadEngine;

    fn create(
        &mut self,
        code: &EntryFunction,
        endpoints: EngineEndpoints,
    ) -> Result<ThreadEngine, EngineError> {
        let EngineEndpoints {
            isolate_id,
            startup,
            control,
        } = endpoints;
        let terminate = TerminationFlag::default();
        let context = IsolateContext {
            isolate_id: isolate_id.clone(),
            startup: Some(startup),
            control,
            terminate: terminate.clone(),
        };

        let builder = thread::Builder::new().name(format!("isolate-{}", isolate_id));
        let run = Arc::clone(&code.run);
        let thread = builder.spawn(move || run(context))?;
        self.created += 1;

        tracing::debug!("Started thread engine for isolate {} ({})", isolate_id, code.name);

        Ok(ThreadEngine {
            isolate_id,
            entry_name: code.name.clone(),
            terminate,
            thread,
        })
    }

    fn destroy(&mut self, engine: ThreadEngine) -> Result<(), EngineError> {
        engine.terminate.raise();
        engine.thread.thread().unpark();

        // The isolate winds down on its own; only reap threads that already exited.
        if engine.thread.is_finished() {
            engine.thread.join().map_err(|_| {
                EngineError::Destroy(format!("isolate {} panicked", engine.isolate_id))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use tokio::sync::mpsc;

    use crate::ipc::protocol::{Command, HandshakeEvent};

    fn endpoints(
        isolate_id: &str,
    ) -> (EngineEndpoints, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoints = EngineEndpoints {
            isolate_id: isolate_id.to_string(),
            startup: StartupEndpoint::new(isolate_id, 1, tx.clone()),
            control: ControlChannel::new(tx),
        };
        (endpoints, rx)
    }

    fn recv_handshake(rx: &mut mpsc::UnboundedReceiver<Command>) -> HandshakeEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(Command::Handshake(event)) = rx.try_recv() {
                return event;
            }
            assert!(Instant::now() < deadline, "no handshake received");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_isolate_signals_ready_and_terminates() {
        let entry = EntryFunction::new("idle", |mut ctx: IsolateContext| {
            assert!(ctx.ready());
            assert!(!ctx.ready());
            ctx.wait_for_termination();
        });
        let mut factory = ThreadEngineFactory::new();
        let (endpoints, mut rx) = endpoints("a");

        let engine = factory.create(&entry, endpoints).unwrap();
        assert_eq!(engine.isolate_id(), "a");
        assert_eq!(engine.entry_name(), "idle");
        assert_eq!(factory.created(), 1);
        assert!(matches!(recv_handshake(&mut rx), HandshakeEvent::Ready(_)));

        let flag = engine.termination_flag();
        factory.destroy(engine).unwrap();
        assert!(flag.is_raised());
    }

    #[test]
    fn test_panicking_isolate_abandons_handshake() {
        let entry = EntryFunction::new("crash", |_ctx: IsolateContext| {
            panic!("isolate crashed during startup");
        });
        let mut factory = ThreadEngineFactory::new();
        let (endpoints, mut rx) = endpoints("b");

        let engine = factory.create(&entry, endpoints).unwrap();
        assert!(matches!(recv_handshake(&mut rx), HandshakeEvent::Abandoned(_)));

        while !engine.is_finished() {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(factory.destroy(engine), Err(EngineError::Destroy(_))));
    }

    #[test]
    fn test_termination_flag_raises_once() {
        let flag = TerminationFlag::default();
        assert!(flag.raise());
        assert!(!flag.raise());
        assert!(flag.is_raised());
    }
}

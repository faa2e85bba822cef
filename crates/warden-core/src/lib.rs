//! Spawn orchestration for isolated execution engines.
//!
//! This crate provides:
//! - A FIFO spawn queue that starts one isolate at a time
//! - A one-shot readiness handshake between each engine and the orchestrator
//! - A registry of active isolates addressable by identifier
//! - Control channels so running isolates can spawn and kill further isolates
//!
//! The [`Orchestrator`] state machine runs on its own control thread and is
//! driven through an [`OrchestratorHandle`]. Engines are created by an
//! [`EngineFactory`]; entry-point tokens are mapped to runnable code by an
//! [`EntryPointResolver`].

pub mod config;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod orchestrator;
pub mod queue;
mod registry;
pub mod resolver;

pub use config::OrchestratorConfig;
pub use engine::{
    EngineEndpoints, EngineError, EngineFactory, EntryFunction, IsolateContext, TerminationFlag,
    ThreadEngine, ThreadEngineFactory,
};
pub use error::{Error, Result};
pub use ipc::{ControlChannel, HandshakeSignal, KillOutcome, MethodCall, MethodResponse, StartupEndpoint};
pub use orchestrator::{Orchestrator, OrchestratorHandle, OrchestratorStatus};
pub use queue::RequestState;
pub use resolver::{EntryPoint, EntryPointRegistry, EntryPointResolver};

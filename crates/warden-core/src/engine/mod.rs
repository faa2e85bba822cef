//! Engine creation and teardown.
//!
//! The orchestrator never builds engines itself. It hands a resolved code
//! reference and a fresh set of endpoints to an [`EngineFactory`], then waits
//! for the engine to report readiness on its [`StartupEndpoint`].
//!
//! # Implementations
//!
//! - **`ThreadEngineFactory`** - Runs each isolate on a dedicated OS thread.

mod thread;

pub use thread::{EntryFunction, IsolateContext, TerminationFlag, ThreadEngine, ThreadEngineFactory};

use thiserror::Error;

use crate::ipc::{ControlChannel, StartupEndpoint};

/// Errors reported by engine factories.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be started.
    #[error("failed to start engine: {0}")]
    Start(String),

    /// The engine could not be torn down cleanly.
    #[error("failed to destroy engine: {0}")]
    Destroy(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Endpoints attached to a newly created engine.
pub struct EngineEndpoints {
    /// Identifier the caller chose for the isolate.
    pub isolate_id: String,
    /// One-shot readiness signal.
    pub startup: StartupEndpoint,
    /// Command channel for the isolate's own requests.
    pub control: ControlChannel,
}

/// Creates and destroys execution engines.
///
/// Calls are made from the orchestrator's control thread, one at a time.
/// `create` may block for as long as engine construction takes; no other
/// startup is attempted meanwhile.
pub trait EngineFactory {
    /// Resolved code reference accepted by [`create`](Self::create).
    type Code;
    /// Handle to a running engine.
    type Engine;

    /// Make sure shared engine resources are initialized. Called before every
    /// creation, so it must be idempotent.
    fn prepare(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Create an engine running `code`.
    fn create(
        &mut self,
        code: &Self::Code,
        endpoints: EngineEndpoints,
    ) -> Result<Self::Engine, EngineError>;

    /// Tear down an engine. Best-effort: errors are logged by the caller.
    fn destroy(&mut self, engine: Self::Engine) -> Result<(), EngineError>;
}

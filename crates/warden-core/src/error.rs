//! Error types for warden-core.

use std::time::Duration;

use thiserror::Error;

use crate::resolver::EntryPoint;

/// Result type for warden-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating isolates.
#[derive(Debug, Error)]
pub enum Error {
    /// The entry point token is not known to the resolver.
    #[error("entry point {0} could not be resolved")]
    Resolution(EntryPoint),

    /// The engine factory failed to prepare or create an engine.
    #[error("engine creation failed for isolate {isolate_id}: {message}")]
    Creation { isolate_id: String, message: String },

    /// An isolate with this identifier is already queued or active.
    #[error("isolate already queued or active: {0}")]
    DuplicateIsolate(String),

    /// The isolate identifier is not usable (empty).
    #[error("invalid isolate id: {0:?}")]
    InvalidIsolateId(String),

    /// The engine dropped its startup endpoint without signalling readiness.
    #[error("isolate {0} exited before completing its handshake")]
    HandshakeAbandoned(String),

    /// The engine did not signal readiness within the configured timeout.
    #[error("isolate {isolate_id} did not complete its handshake within {timeout:?}")]
    HandshakeTimeout { isolate_id: String, timeout: Duration },

    /// The orchestrator stopped before the request could be served.
    #[error("orchestrator shut down")]
    Shutdown,

    /// Method call arguments could not be decoded.
    #[error("invalid arguments for {method}: {message}")]
    InvalidArguments { method: String, message: String },

    /// IO error (control thread creation).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable error code reported over the method-call surface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Resolution(_) => "resolution_failed",
            Error::Creation { .. } => "creation_failed",
            Error::DuplicateIsolate(_) => "duplicate_isolate",
            Error::InvalidIsolateId(_) => "invalid_isolate_id",
            Error::HandshakeAbandoned(_) => "handshake_abandoned",
            Error::HandshakeTimeout { .. } => "handshake_timeout",
            Error::Shutdown => "shutdown",
            Error::InvalidArguments { .. } => "invalid_arguments",
            Error::Io(_) => "io",
        }
    }
}

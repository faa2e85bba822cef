//! Channels between callers, engines and the orchestrator.
//!
//! This module provides the mailbox protocol, the per-isolate control
//! channel, and the one-shot startup endpoint used for the handshake.

mod channel;
mod endpoint;
pub mod protocol;

pub use channel::ControlChannel;
pub use endpoint::StartupEndpoint;
pub use protocol::{HandshakeSignal, KillOutcome, MethodCall, MethodResponse};

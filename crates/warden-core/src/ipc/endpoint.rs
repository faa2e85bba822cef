//! Startup endpoint handed to every new engine.

use tokio::sync::mpsc;

use super::protocol::{Command, HandshakeEvent, HandshakeSignal};

/// One-shot readiness signal for a single startup attempt.
///
/// The engine calls [`ready`](Self::ready) once it is running. Dropping the
/// endpoint without calling it reports the attempt as abandoned, so an engine
/// that dies during startup never stalls the queue.
pub struct StartupEndpoint {
    signal: Option<HandshakeSignal>,
    mailbox: mpsc::UnboundedSender<Command>,
}

impl StartupEndpoint {
    pub(crate) fn new(
        isolate_id: &str,
        ticket: u64,
        mailbox: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            signal: Some(HandshakeSignal {
                isolate_id: isolate_id.to_string(),
                ticket,
            }),
            mailbox,
        }
    }

    /// Identifier of the isolate this endpoint belongs to.
    pub fn isolate_id(&self) -> &str {
        self.signal
            .as_ref()
            .map(|signal| signal.isolate_id.as_str())
            .unwrap_or_default()
    }

    /// Report the isolate as ready. Closes the endpoint.
    pub fn ready(mut self) {
        if let Some(signal) = self.signal.take() {
            self.publish(HandshakeEvent::Ready(signal));
        }
    }

    fn publish(&self, event: HandshakeEvent) {
        if self.mailbox.send(Command::Handshake(event)).is_err() {
            tracing::debug!("Handshake published after orchestrator shutdown");
        }
    }
}

impl Drop for StartupEndpoint {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            self.publish(HandshakeEvent::Abandoned(signal));
        }
    }
}

impl std::fmt::Debug for StartupEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupEndpoint")
            .field("signal", &self.signal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_event(rx: &mut mpsc::UnboundedReceiver<Command>) -> Option<HandshakeEvent> {
        match rx.try_recv() {
            Ok(Command::Handshake(event)) => Some(event),
            _ => None,
        }
    }

    #[test]
    fn test_ready_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = StartupEndpoint::new("a", 3, tx);
        assert_eq!(endpoint.isolate_id(), "a");
        endpoint.ready();

        let expected = HandshakeSignal {
            isolate_id: "a".into(),
            ticket: 3,
        };
        assert_eq!(next_event(&mut rx), Some(HandshakeEvent::Ready(expected)));
        // No abandonment follows the drop inside `ready`.
        assert_eq!(next_event(&mut rx), None);
    }

    #[test]
    fn test_drop_reports_abandoned() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(StartupEndpoint::new("b", 8, tx));

        match next_event(&mut rx) {
            Some(HandshakeEvent::Abandoned(signal)) => {
                assert_eq!(signal.isolate_id, "b");
                assert_eq!(signal.ticket, 8);
            }
            other => panic!("Expected abandonment, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_after_shutdown_is_quiet() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        StartupEndpoint::new("c", 1, tx).ready();
    }
}

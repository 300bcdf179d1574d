//! Outgoing message queue of a room and the transport seam that drains it.

use arena_shared::{ServerMessage, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Session(SessionId),
    All,
    AllExcept(SessionId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipient,
    pub message: ServerMessage,
}

/// Reliable ordered delivery to the clients of one room.
pub trait Transport: Send + Sync {
    fn send_to(&self, session: SessionId, message: ServerMessage);

    fn broadcast(&self, sessions: &[SessionId], message: ServerMessage, exclude: Option<SessionId>) {
        for &session in sessions {
            if Some(session) != exclude {
                self.send_to(session, message.clone());
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, session: SessionId, message: ServerMessage) {
        self.queue.push(Envelope {
            to: Recipient::Session(session),
            message,
        });
    }

    pub fn broadcast(&mut self, message: ServerMessage) {
        self.queue.push(Envelope {
            to: Recipient::All,
            message,
        });
    }

    pub fn broadcast_except(&mut self, exclude: SessionId, message: ServerMessage) {
        self.queue.push(Envelope {
            to: Recipient::AllExcept(exclude),
            message,
        });
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queue)
    }

    /// Delivers every queued envelope, resolving room-wide recipients
    /// against `sessions`.
    pub fn flush(&mut self, transport: &dyn Transport, sessions: &[SessionId]) {
        for envelope in self.drain() {
            match envelope.to {
                Recipient::Session(session) => transport.send_to(session, envelope.message),
                Recipient::All => transport.broadcast(sessions, envelope.message, None),
                Recipient::AllExcept(exclude) => {
                    transport.broadcast(sessions, envelope.message, Some(exclude))
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(SessionId, &'static str)>>,
    }

    impl Transport for RecordingTransport {
        fn send_to(&self, session: SessionId, message: ServerMessage) {
            self.sent.lock().push((session, message.name()));
        }
    }

    #[test]
    fn test_flush_resolves_recipients() {
        let mut outbox = Outbox::new();
        outbox.send(2, ServerMessage::MatchGo { server_time: 1 });
        outbox.broadcast(ServerMessage::Pong { client_time: 0, server_time: 0 });
        outbox.broadcast_except(1, ServerMessage::Fx { from: 1, payload: "spark".into() });
        assert_eq!(outbox.len(), 3);

        let transport = RecordingTransport::default();
        outbox.flush(&transport, &[1, 2]);
        assert!(outbox.is_empty());

        let sent = transport.sent.lock().clone();
        assert_eq!(
            sent,
            vec![(2, "match.go"), (1, "pvp.pong"), (2, "pvp.pong"), (2, "pvp.fx")]
        );
    }
}

//! Connection identity and its outbound snapshot channel.

use crate::user::User;
use log::debug;
use shared::Packet;
use tokio::sync::mpsc;

/// Stable identifier for one connection, assigned by the transport layer.
pub type SessionId = u64;

/// A connected peer, optionally bound to one logged-in user.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    outbound: mpsc::UnboundedSender<Packet>,
    pub user: Option<User>,
}

impl Session {
    pub fn new(id: SessionId, outbound: mpsc::UnboundedSender<Packet>) -> Self {
        Session {
            id,
            outbound,
            user: None,
        }
    }

    /// Queues a packet for this peer. Fire-and-forget: a closed channel is
    /// logged and the packet dropped, so a dead client never blocks a tick.
    pub fn send(&self, packet: Packet) {
        if self.outbound.send(packet).is_err() {
            debug!("session {}: outbound channel closed, dropping packet", self.id);
        }
    }

    /// Username of the bound user, if any.
    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_delivers_packet() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::new(1, tx);

        session.send(Packet::Logout);

        match rx.try_recv() {
            Ok(Packet::Logout) => {}
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_send_on_closed_channel_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let session = Session::new(1, tx);

        // Must not panic
        session.send(Packet::Logout);
    }

    #[test]
    fn test_username() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = Session::new(1, tx);
        assert_eq!(session.username(), None);

        session.user = Some(User::new("alice", "F", 0, 0));
        assert_eq!(session.username(), Some("alice"));
    }
}

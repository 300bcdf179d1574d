//! Client connection table for the UDP adapter
//!
//! Maps datagram source addresses to server-assigned sessions, remembers
//! which room each session was seated in and drops sessions that go quiet.

use crate::room::RoomId;
use arena_shared::SessionId;
use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Sessions that send nothing for this long are disconnected
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a connected client
#[derive(Debug, Clone)]
pub struct Client {
    pub session: SessionId,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    /// Room the lobby seated this session in, once the join succeeded
    pub room: Option<RoomId>,
}

impl Client {
    /// Creates a new client with the given session and address
    pub fn new(session: SessionId, addr: SocketAddr) -> Self {
        Self {
            session,
            addr,
            last_seen: Instant::now(),
            room: None,
        }
    }

    /// Checks if client has exceeded the timeout threshold
    ///
    /// Used to detect disconnected clients that haven't sent packets
    /// recently. Any packet from the client refreshes `last_seen`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients and their room assignments
pub struct ClientManager {
    clients: HashMap<SessionId, Client>,
    next_session: SessionId,
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with specified capacity
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_session: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client to the server
    ///
    /// Returns the assigned session id if successful, or None if the server
    /// is at capacity. Session ids are never reused within one process, so
    /// late packets from a dropped session cannot land on a new one.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<SessionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let session = self.next_session;
        self.next_session += 1;
        self.clients.insert(session, Client::new(session, addr));
        info!("Session {} connected from {}", session, addr);
        Some(session)
    }

    /// Removes a client from the server, handing back its record
    pub fn remove_client(&mut self, session: &SessionId) -> Option<Client> {
        let removed = self.clients.remove(session);
        if let Some(client) = &removed {
            info!("Session {} disconnected ({})", session, client.addr);
        }
        removed
    }

    /// Finds the session id associated with a network address
    ///
    /// Used to identify which client sent a received packet, since UDP
    /// packets only carry the source address, not the session.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<SessionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(session, _)| *session)
    }

    pub fn addr_of(&self, session: SessionId) -> Option<SocketAddr> {
        self.clients.get(&session).map(|client| client.addr)
    }

    /// Records traffic from `addr`, returning its session if known
    pub fn touch(&mut self, addr: SocketAddr) -> Option<SessionId> {
        let client = self.clients.values_mut().find(|client| client.addr == addr)?;
        client.last_seen = Instant::now();
        Some(client.session)
    }

    pub fn attach_room(&mut self, session: SessionId, room: RoomId) -> bool {
        match self.clients.get_mut(&session) {
            Some(client) => {
                debug!("Session {} seated in room {}", session, room);
                client.room = Some(room);
                true
            }
            None => false,
        }
    }

    pub fn room_of(&self, session: SessionId) -> Option<RoomId> {
        self.clients.get(&session).and_then(|client| client.room)
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed records so the caller can take each session out
    /// of its room. This frees server resources when clients disappear
    /// without sending a disconnect.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<SessionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(session, _)| *session)
            .collect();

        timed_out
            .iter()
            .filter_map(|session| self.remove_client(session))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.session, 1);
        assert_eq!(client.addr, addr);
        assert!(client.room.is_none());
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert_eq!(manager.add_client(test_addr2()), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_session_ids_are_not_reused() {
        let mut manager = ClientManager::new(2);
        let first = manager.add_client(test_addr()).unwrap();
        manager.remove_client(&first);
        let second = manager.add_client(test_addr()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);

        assert!(manager.remove_client(&999).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let session = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(session));
        assert_eq!(manager.addr_of(session), Some(test_addr()));

        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown), None);
        assert_eq!(manager.touch(unknown), None);
    }

    #[test]
    fn test_room_assignment() {
        let mut manager = ClientManager::new(2);
        let session = manager.add_client(test_addr()).unwrap();

        assert_eq!(manager.room_of(session), None);
        assert!(manager.attach_room(session, 4));
        assert_eq!(manager.room_of(session), Some(4));
        assert!(!manager.attach_room(99, 4));
    }

    #[test]
    fn test_check_timeouts_returns_removed_clients() {
        let mut manager = ClientManager::new(3);
        let stale = manager.add_client(test_addr()).unwrap();
        let fresh = manager.add_client(test_addr2()).unwrap();
        manager.attach_room(stale, 7);
        manager.clients.get_mut(&stale).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        let removed = manager.check_timeouts(CLIENT_TIMEOUT);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].session, stale);
        assert_eq!(removed[0].room, Some(7));
        assert_eq!(manager.len(), 1);
        assert!(manager.addr_of(fresh).is_some());
    }
}

//! Server network layer handling UDP communications and join routing

use crate::auth::SessionVerifier;
use crate::client_manager::{Client, ClientManager, CLIENT_TIMEOUT};
use crate::config::RoomConfig;
use crate::driver::RoomServices;
use crate::lobby::Lobby;
use crate::outbox::Transport;
use crate::party::PartyRegistry;
use crate::store::ProfileStore;
use arena_shared::{ClientMessage, JoinRejectCode, MatchMode, Packet, ServerMessage, SessionId};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Largest datagram the receiver accepts from a client
pub const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

/// Events sent from network tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client: Client,
    },
    Shutdown,
}

/// Packets queued for the sender task
#[derive(Debug)]
pub enum OutboundPacket {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    ToSession {
        session: SessionId,
        message: ServerMessage,
    },
}

/// [`Transport`] that hands room output to the UDP sender task
///
/// Sessions are resolved to addresses when the packet is sent, so messages
/// for sessions that have already disconnected are dropped there.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    tx: mpsc::UnboundedSender<OutboundPacket>,
}

impl UdpTransport {
    pub fn new(tx: mpsc::UnboundedSender<OutboundPacket>) -> Self {
        Self { tx }
    }
}

impl Transport for UdpTransport {
    fn send_to(&self, session: SessionId, message: ServerMessage) {
        if let Err(e) = self.tx.send(OutboundPacket::ToSession { session, message }) {
            error!("Failed to queue message for session {}: {}", session, e);
        }
    }
}

/// Main server coordinating sockets, connected clients and the lobby
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    lobby: Arc<Lobby>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<NetworkEvent>,
    server_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    out_tx: mpsc::UnboundedSender<OutboundPacket>,
    out_rx: mpsc::UnboundedReceiver<OutboundPacket>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: RoomConfig,
        max_clients: usize,
        store: Arc<dyn ProfileStore>,
        verifier: Arc<dyn SessionVerifier>,
    ) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let services = RoomServices {
            transport: Arc::new(UdpTransport::new(out_tx.clone())),
            store,
            parties: Arc::new(PartyRegistry::new()),
        };

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            lobby: Arc::new(Lobby::new(config, services, verifier)),
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender that stops [`Server::run`] when sent [`NetworkEvent::Shutdown`]
    pub fn control(&self) -> mpsc::UnboundedSender<NetworkEvent> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(NetworkEvent::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    OutboundPacket::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundPacket::ToSession { session, message } => {
                        let addr = {
                            let clients_guard = clients.read().await;
                            clients_guard.addr_of(session)
                        };
                        let Some(addr) = addr else {
                            debug!("Dropping {} for departed session {}", message.name(), session);
                            continue;
                        };
                        let packet = Packet::Server(message);
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send to session {}: {}", session, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for client in timed_out {
                    if let Err(e) = server_tx.send(NetworkEvent::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.out_tx.send(OutboundPacket::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Routes one decoded packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                token,
                mode,
                party_key,
            } => self.handle_connect(addr, &token, mode, party_key.as_deref()).await,

            Packet::Client(message) => {
                let session = {
                    let mut clients = self.clients.write().await;
                    clients.touch(addr)
                };
                match session {
                    Some(session) => self.forward(session, message).await,
                    None => debug!("{} from unknown address {}", message.name(), addr),
                }
            }

            Packet::Disconnect => {
                let removed = {
                    let mut clients = self.clients.write().await;
                    let session = clients.find_client_by_addr(addr);
                    session.and_then(|session| clients.remove_client(&session))
                };
                if let Some(client) = removed {
                    self.leave_room(&client);
                }
            }

            Packet::Server(_) => {
                warn!("Unexpected server packet from client at {}", addr);
            }
        }
    }

    async fn handle_connect(
        &mut self,
        addr: SocketAddr,
        token: &str,
        mode: MatchMode,
        party_key: Option<&str>,
    ) {
        info!("Client connecting from {} for {}", addr, mode.as_str());

        // A reconnect from the same address replaces the old session
        let previous = {
            let mut clients = self.clients.write().await;
            let existing = clients.find_client_by_addr(addr);
            existing.and_then(|session| clients.remove_client(&session))
        };
        if let Some(client) = previous {
            info!("Replacing session {} from {}", client.session, addr);
            self.leave_room(&client);
        }

        let session = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };
        let Some(session) = session else {
            let code = JoinRejectCode::RoomFull;
            self.send_packet(Packet::Server(ServerMessage::JoinRejected { code }), addr);
            return;
        };

        if let Ok(handle) = self.lobby.join(session, token, mode, party_key).await {
            let mut clients = self.clients.write().await;
            clients.attach_room(session, handle.id());
        }
    }

    async fn forward(&self, session: SessionId, message: ClientMessage) {
        let room = {
            let clients = self.clients.read().await;
            clients.room_of(session)
        };
        match room.and_then(|id| self.lobby.room(id)) {
            Some(handle) => handle.send_message(session, message),
            None => debug!("Session {} is not in a live room; dropped {}", session, message.name()),
        }
    }

    fn leave_room(&self, client: &Client) {
        if let Some(handle) = client.room.and_then(|id| self.lobby.room(id)) {
            handle.leave(client.session);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut housekeeping = interval(Duration::from_secs(10));

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.server_rx.recv() => {
                    match event {
                        Some(NetworkEvent::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(NetworkEvent::ClientTimeout { client }) => {
                            info!("Session {} timed out", client.session);
                            self.leave_room(&client);
                        },
                        Some(NetworkEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = housekeeping.tick() => {
                    let rooms = self.lobby.prune();
                    let clients = self.clients.read().await.len();
                    if clients > 0 || rooms > 0 {
                        debug!("{} clients connected, {} live rooms", clients, rooms);
                    }
                },
            }
        }

        self.lobby.shutdown_all();
        Ok(())
    }
}

//! Headless bot that joins a room and plays scripted inputs.
//!
//! Useful for smoke-testing a running server: it circles the arena, fires
//! basic attacks at whatever it last saw, spends level-up picks and prints
//! the match result.

use arena_shared::{
    AbilityId, ClientMessage, DamageClaim, EnemySnapshot, MatchMode, Packet, PlayerSnapshot,
    ServerMessage, SessionId, Vec2,
};
use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Session token, `<user_id>:<name>`
    #[clap(short, long, default_value = "bot:Bot")]
    token: String,
    /// duel, survival or coop
    #[clap(short, long, default_value = "survival")]
    mode: String,
    /// Co-op party key
    #[clap(long)]
    party: Option<String>,
    /// Seconds to play before disconnecting
    #[clap(short, long, default_value = "60")]
    duration: u64,
}

fn parse_mode(mode: &str) -> Option<MatchMode> {
    match mode {
        "duel" => Some(MatchMode::Duel),
        "survival" => Some(MatchMode::Survival),
        "coop" => Some(MatchMode::Coop),
        _ => None,
    }
}

/// What the bot remembers between packets
#[derive(Default)]
struct BotView {
    session: Option<SessionId>,
    me: Option<PlayerSnapshot>,
    opponent: Option<PlayerSnapshot>,
    enemies: Vec<EnemySnapshot>,
    running: bool,
    finished: bool,
    unspent: u32,
    pending_offer: Option<AbilityId>,
}

impl BotView {
    fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Profile { session, rating, .. } => {
                self.session.get_or_insert(session);
                info!("Profile: session {} rating {}", session, rating);
            }
            ServerMessage::MatchGo { .. } => {
                info!("Match is live");
                self.running = true;
            }
            ServerMessage::StateSync { players, .. } => {
                let session = self.session;
                self.me = players.iter().find(|p| Some(p.session) == session).cloned();
                self.opponent = players.into_iter().find(|p| Some(p.session) != session);
            }
            ServerMessage::PveSync { enemies, .. } => self.enemies = enemies,
            ServerMessage::Progress { session, unspent, level, .. } => {
                self.session.get_or_insert(session);
                self.unspent = unspent;
                debug!("Level {} ({} unspent)", level, unspent);
            }
            ServerMessage::LevelUpOffer { options, .. } => {
                self.pending_offer = options.first().copied();
            }
            ServerMessage::MatchEnd { reason, winner, stage, elapsed_ms, .. } => {
                info!(
                    "Match over: {} (winner {:?}, stage {}, {:.1}s)",
                    reason.as_str(),
                    winner,
                    stage,
                    elapsed_ms as f32 / 1000.0
                );
                self.running = false;
                self.finished = true;
            }
            ServerMessage::JoinRejected { code } => {
                warn!("Join rejected: {:?}", code);
                self.finished = true;
            }
            other => debug!("{}", other.name()),
        }
    }

    /// Closest thing worth hitting, as a damage claim
    fn attack(&self, mode: MatchMode) -> Option<ClientMessage> {
        let me = self.me.as_ref()?;
        let origin = Vec2::new(me.x, me.y);
        if mode == MatchMode::Duel {
            let foe = self.opponent.as_ref()?;
            let aim = (Vec2::new(foe.x, foe.y) - origin).normalize();
            return Some(ClientMessage::PvpDamage(DamageClaim::basic(Some(foe.session), aim.x, aim.y)));
        }
        let target = self.enemies.iter().min_by(|a, b| {
            let da = Vec2::new(a.x, a.y).distance(&origin);
            let db = Vec2::new(b.x, b.y).distance(&origin);
            da.total_cmp(&db)
        })?;
        let aim = (Vec2::new(target.x, target.y) - origin).normalize();
        Some(ClientMessage::PveDamage(DamageClaim::basic(Some(target.id), aim.x, aim.y)))
    }
}

async fn send(socket: &UdpSocket, addr: SocketAddr, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&serialize(packet)?, addr).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let mode = parse_mode(&args.mode).ok_or_else(|| format!("unknown mode '{}'", args.mode))?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let server_addr = args.server.parse::<SocketAddr>()?;
    info!("Bot bound to {}, joining {} on {}", socket.local_addr()?, mode.as_str(), server_addr);

    let connect = Packet::Connect {
        token: args.token.clone(),
        mode,
        party_key: args.party.clone(),
    };
    send(&socket, server_addr, &connect).await?;

    let started = Instant::now();
    let mut view = BotView::default();
    let mut input_tick = interval(Duration::from_millis(50));
    let mut attack_tick = interval(Duration::from_millis(400));
    let mut buf = [0u8; 8192];

    while !view.finished && started.elapsed() < Duration::from_secs(args.duration) {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[..len]) {
                    Ok(Packet::Server(message)) => view.apply(message),
                    Ok(other) => warn!("Unexpected packet: {:?}", other),
                    Err(e) => warn!("Failed to deserialize packet: {}", e),
                }
            }
            _ = input_tick.tick() => {
                let t = started.elapsed().as_secs_f32();
                let state = ClientMessage::State {
                    move_x: (t * 0.7).cos(),
                    move_y: (t * 0.7).sin(),
                    aim_x: 1.0,
                    aim_y: 0.0,
                };
                send(&socket, server_addr, &Packet::Client(state)).await?;
            }
            _ = attack_tick.tick() => {
                if !view.running {
                    continue;
                }
                if let Some(claim) = view.attack(mode) {
                    send(&socket, server_addr, &Packet::Client(claim)).await?;
                }
                if let Some(ability) = view.pending_offer.take() {
                    let pick = ClientMessage::LevelUpPick { key: ability.key().to_string() };
                    send(&socket, server_addr, &Packet::Client(pick)).await?;
                } else if view.unspent > 0 {
                    let pick = ClientMessage::LevelUpPick { key: AbilityId::Power.key().to_string() };
                    send(&socket, server_addr, &Packet::Client(pick)).await?;
                    view.unspent = 0;
                }
            }
        }
    }

    send(&socket, server_addr, &Packet::Disconnect).await?;
    info!("Bot finished after {:.1}s", started.elapsed().as_secs_f32());
    Ok(())
}

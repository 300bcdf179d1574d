//! # Arena Server Library
//!
//! Authoritative simulation core for a two-player action game: 1v1 duels,
//! solo survival runs and 2-player co-op against waves of enemies and
//! scripted bosses. Clients only send intents; the server validates every
//! claim, resolves combat, runs enemy AI and broadcasts the results.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Each match lives in a [`room::MatchRoom`], a deterministic state machine
//! advanced with the current time in milliseconds. Per tick it runs due
//! timers, integrates movement and regeneration, lets the enemy director
//! spawn, steps chasers and bosses, applies hazard damage, advances co-op
//! revives, checks the end condition and periodically syncs state.
//!
//! ### Anti-Cheat Validation
//! Damage is never taken from the client. The combat resolver checks range,
//! facing arc, cooldown and replay ids, then recomputes damage from the
//! attacker's level and ability ranks. Rejected claims are dropped
//! silently and logged at trace level.
//!
//! ### Progression and Rating
//! Kills grant experience; levels raise max hp and hand out ability ranks,
//! either as timed three-card offers (duel) or as banked tokens (survival,
//! co-op). Duel results are committed to the profile store with an Elo
//! update off the tick path.
//!
//! ## Architecture Design
//!
//! ### One Task per Room
//! The [`driver`] module gives every room its own tokio task that owns the
//! room outright and selects over a command channel and a tick interval.
//! No room state is shared, so the simulation needs no locks. The co-op
//! [`party::PartyRegistry`] is the only cross-room table.
//!
//! ### Collaborator Seams
//! Identity ([`auth::SessionVerifier`]), persistence ([`store::ProfileStore`])
//! and delivery ([`outbox::Transport`]) are traits. The crate ships a dev
//! token verifier, an in-memory store and a bincode-over-UDP transport.
//!
//! ## Module Organization
//!
//! - `state`, `entities`, `hazards`: the per-room entity store
//! - `intake`: latest sanitized intent per session
//! - `combat`: claim validation and damage formulas
//! - `director`, `boss`: spawn pacing, stage tracking and the boss FSM
//! - `progression`, `revive`, `rating`: levels and ranks, co-op revive, Elo
//! - `room`, `scheduler`, `outbox`: the match room and its timers and output
//! - `driver`, `lobby`, `party`: room tasks and join routing
//! - `network`, `client_manager`: the UDP adapter
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use arena_server::auth::DevTokenVerifier;
//! use arena_server::config::RoomConfig;
//! use arena_server::network::Server;
//! use arena_server::store::InMemoryProfileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         RoomConfig::default(),
//!         64,
//!         Arc::new(InMemoryProfileStore::new()),
//!         Arc::new(DevTokenVerifier),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod boss;
pub mod client_manager;
pub mod combat;
pub mod config;
pub mod director;
pub mod driver;
pub mod entities;
pub mod hazards;
pub mod intake;
pub mod lobby;
pub mod network;
pub mod outbox;
pub mod party;
pub mod progression;
pub mod rating;
pub mod revive;
pub mod room;
pub mod scheduler;
pub mod state;
pub mod store;

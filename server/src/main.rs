use arena_server::auth::DevTokenVerifier;
use arena_server::config::RoomConfig;
use arena_server::network::Server;
use arena_server::store::InMemoryProfileStore;
use clap::Parser;
use log::info;
use std::sync::Arc;

/// Authoritative arena server (duel, survival and co-op rooms over UDP)
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Room tick rate (updates per second)
    #[clap(short, long, default_value = "30")]
    tick_rate: u32,
    /// Maximum number of connected sessions
    #[clap(short, long, default_value = "64")]
    max_clients: usize,
    /// Fixed RNG seed for reproducible rooms
    #[clap(long)]
    seed: Option<u64>,
    /// Last co-op stage
    #[clap(long, default_value = "20")]
    final_stage: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = RoomConfig {
        tick_rate: args.tick_rate.max(1),
        seed: args.seed,
        final_stage: args.final_stage.max(1),
        ..RoomConfig::default()
    };
    info!(
        "Starting arena server: {} Hz, {} clients max, final stage {}",
        config.tick_rate, args.max_clients, config.final_stage
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        config,
        args.max_clients,
        Arc::new(InMemoryProfileStore::new()),
        Arc::new(DevTokenVerifier),
    )
    .await?;

    server.run().await?;
    Ok(())
}

use clap::Parser;
use log::info;
use server::network::{Server, ServerEvent};
use shared::NetcodeConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Send a snapshot every N ticks
    #[arg(short, long, default_value = "2")]
    snapshot_every: u32,

    /// Capacity of each player's input queue
    #[arg(long, default_value = "256")]
    max_buffered_inputs: usize,

    /// Ticks a sequence gap may persist before missing inputs count as no input
    #[arg(long, default_value = "8")]
    gap_timeout_ticks: u32,

    /// Maximum players in the room
    #[arg(short, long, default_value = "32")]
    max_players: usize,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Omit the integrity hash from snapshots
    #[arg(long)]
    no_snapshot_hash: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = NetcodeConfig {
        tick_rate_hz: args.tick_rate,
        snapshot_every_n_ticks: args.snapshot_every,
        max_buffered_inputs_per_player: args.max_buffered_inputs,
        gap_timeout_ticks: args.gap_timeout_ticks,
        snapshot_hashes: !args.no_snapshot_hash,
        ..NetcodeConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        config,
        args.max_players,
        Duration::from_secs(args.timeout_secs),
    )
    .await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown.send(ServerEvent::Shutdown);
        }
    });

    server.run().await?;

    Ok(())
}

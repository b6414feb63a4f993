use clap::Parser;
use client::input::InputPattern;
use client::network::{Client, LinkConditions};
use log::info;
use shared::{NetcodeConfig, PlayerId};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player identity issued by the authentication service
    #[arg(short = 'i', long)]
    player_id: u64,

    /// Local simulation steps per second
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,

    /// Movement pattern to drive the local player with
    #[arg(short = 'm', long, value_enum, default_value = "circle")]
    pattern: InputPattern,

    /// Simulate network latency in milliseconds (round trip)
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Probability of dropping each datagram, 0.0 to 1.0
    #[arg(long, default_value = "0.0")]
    loss: f64,

    /// Capacity of the input and predicted-frame histories
    #[arg(long, default_value = "120")]
    history_frames: usize,

    /// Position tolerance before a snapshot triggers a rollback
    #[arg(long, default_value = "0.02")]
    eps_pos: f32,

    /// Velocity tolerance before a snapshot triggers a rollback
    #[arg(long, default_value = "0.05")]
    eps_vel: f32,

    /// Seconds without server records before prediction freezes
    #[arg(long, default_value = "3")]
    timeout_secs: u64,

    /// Stop after this many seconds instead of running until Ctrl+C
    #[arg(short = 'd', long)]
    duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {} as player {}", args.server, args.player_id);
    if args.fake_ping > 0 || args.loss > 0.0 {
        info!(
            "Simulating {}ms latency, {:.1}% loss",
            args.fake_ping,
            args.loss * 100.0
        );
    }

    let config = NetcodeConfig {
        tick_rate_hz: args.tick_rate,
        max_client_history_frames: args.history_frames,
        eps_pos: args.eps_pos,
        eps_vel: args.eps_vel,
        ..NetcodeConfig::default()
    };
    let conditions = LinkConditions {
        fake_ping_ms: args.fake_ping,
        loss: args.loss.clamp(0.0, 1.0),
    };

    let mut client = Client::new(
        &args.server,
        PlayerId(args.player_id),
        config,
        args.pattern,
        conditions,
        Duration::from_secs(args.timeout_secs),
    )
    .await?;

    let run_for = args.duration_secs.map(Duration::from_secs);
    tokio::select! {
        result = client.run(run_for) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    info!("Client finished: {:?}", client.stats());

    Ok(())
}

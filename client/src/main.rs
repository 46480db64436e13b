use clap::Parser;
use log::info;

use client::events::{Channel, EventBus, Signal};
use client::game::LocalWorld;
use client::network::{run_session, DriverConfig, JoinMode};
use shared::Vec2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket endpoint of the game server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080/ws/")]
    server: String,

    /// Room code to join
    #[arg(short = 'c', long)]
    code: Option<String>,

    /// Open a fresh room instead of joining one
    #[arg(long)]
    create: bool,

    /// Outbound state broadcast interval in milliseconds
    #[arg(long, default_value = "100")]
    broadcast_ms: u64,

    /// Ping interval in milliseconds
    #[arg(long, default_value = "2000")]
    ping_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mode = match (args.code, args.create) {
        (Some(code), false) => JoinMode::Join(code),
        (None, true) => JoinMode::Create,
        (Some(_), true) => return Err("pass either --code or --create, not both".into()),
        (None, false) => return Err("pass --code <ROOM> to join or --create to open a room".into()),
    };

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut bus = EventBus::new();
    bus.on(Channel::ServerConnected, |_| info!("server connection established"));
    bus.on(Channel::RoomLeader, |_| {
        info!("this client is now the room leader")
    });
    bus.on(Channel::JoinGame, |signal| {
        if let Signal::JoinGame(answer) = signal {
            if answer.ok {
                info!("joined room {}", answer.code.as_deref().unwrap_or("?"));
            } else {
                info!("join refused: {}", answer.reason.as_deref().unwrap_or("?"));
            }
        }
    });
    bus.once(Channel::StartGame, |_| info!("game started"));
    bus.on(Channel::UpdatePing, |signal| {
        if let Signal::UpdatePing(ms) = signal {
            info!("ping: {} ms", ms);
        }
    });

    let mut world = LocalWorld::new(Vec2::new(100.0, 450.0));
    let config = DriverConfig {
        ping_interval: std::time::Duration::from_millis(args.ping_ms),
        broadcast_interval: std::time::Duration::from_millis(args.broadcast_ms),
    };

    run_session(&args.server, mode, &mut world, &mut bus, config).await?;

    info!("Session ended");
    Ok(())
}

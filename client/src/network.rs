//! WebSocket transport driver.
//!
//! One cooperative `select!` loop multiplexes everything the session reacts
//! to: inbound text frames, the outbound frame queue, and the two periodic
//! timers. All session and world state is touched from this single task, so
//! no locking is needed anywhere in the core.

use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::events::{Channel, EventBus, Signal};
use crate::game::WorldConsumer;
use crate::session::Session;

/// How the client enters a room.
#[derive(Debug, Clone)]
pub enum JoinMode {
    /// Join an existing room by its code.
    Join(String),
    /// Ask the server to open a fresh room; the answer carries its code.
    Create,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub ping_interval: Duration,
    pub broadcast_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(2),
            broadcast_interval: Duration::from_millis(100),
        }
    }
}

/// Connects to the server and drives the session until the transport closes.
///
/// Disconnection is an expected outcome, not an error: the session is
/// degraded to an inert object, the world is notified, and `Ok(())` is
/// returned. Errors are reserved for failing to establish the connection.
pub async fn run_session<W: WorldConsumer>(
    url: &str,
    mode: JoinMode,
    world: &mut W,
    bus: &mut EventBus,
    config: DriverConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Connecting to {}", url);
    let (ws, _) = connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(out_tx);
    session.handle_open(bus);

    // The world is ready to consume events once the join request is
    // answered positively; that is the single initialize_game trigger.
    let ready = Rc::new(Cell::new(false));
    {
        let ready = Rc::clone(&ready);
        bus.once(Channel::JoinGame, move |signal| {
            if let Signal::JoinGame(answer) = signal {
                if answer.ok {
                    ready.set(true);
                } else {
                    warn!("join refused: {:?}", answer.reason);
                }
            }
        });
    }

    match &mode {
        JoinMode::Join(code) => session.connect(code),
        JoinMode::Create => session.create_game(),
    }

    let mut ping_timer = interval(config.ping_interval);
    let mut broadcast_timer = interval(config.broadcast_interval);

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        session.handle_message(&text, world, bus);
                        if ready.take() {
                            session.initialize_game(world);
                        }
                    }
                    // Protocol-level ping/pong and binary frames are not
                    // application frames.
                    Some(Ok(Message::Close(_))) | None => {
                        session.handle_close(world);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("websocket error: {}", e);
                        session.handle_close(world);
                        break;
                    }
                }
            }
            outgoing = out_rx.recv() => {
                if let Some(line) = outgoing {
                    if let Err(e) = sink.send(Message::Text(line)).await {
                        error!("failed to send frame: {}", e);
                        session.handle_close(world);
                        break;
                    }
                }
            }
            _ = ping_timer.tick() => session.tick_ping(),
            _ = broadcast_timer.tick() => session.tick_broadcast(world),
        }
    }

    Ok(())
}

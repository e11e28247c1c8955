//! Game server entry point (§4.3–§4.5, §6): parses CLI options, spawns the
//! turn-engine thread, then loops accepting TCP connections, spawning one
//! sender and one receiver thread per client.

use clap::Parser;
use robots::engine::{self, EngineConfig};
use robots::fanout::{self, hello_message};
use robots::options::ServerArgs;
use robots::transport::StreamTransport;
use robots::world::SharedState;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let args = ServerArgs::parse();
    robots::logging::init(args.verbose);

    if let Err(e) = args.validate() {
        eprintln!("ERROR : {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        eprintln!("ERROR : {e}");
        std::process::exit(1);
    }
}

fn run(args: ServerArgs) -> anyhow::Result<()> {
    let shared = Arc::new(SharedState::new(args.players_count));

    let engine_config = EngineConfig {
        size_x: args.size_x,
        size_y: args.size_y,
        game_length: args.game_length,
        bomb_timer: args.bomb_timer,
        explosion_radius: args.explosion_radius,
        initial_blocks: args.initial_blocks,
        turn_duration: Duration::from_millis(args.turn_duration),
        seed: args.resolved_seed(),
    };

    {
        let shared = Arc::clone(&shared);
        std::thread::spawn(move || engine::run(shared, engine_config));
    }

    let listener = TcpListener::bind(format!("[::]:{}", args.port))?;
    tracing::info!(port = args.port, "server listening");

    let hello = hello_message(&args);

    loop {
        let (socket, peer) = listener.accept()?;
        let address = peer.to_string();
        tracing::info!(%address, "accepted connection");

        let sender_transport = match StreamTransport::new(socket.try_clone()?) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to prepare connection");
                continue;
            }
        };
        let receiver_transport = StreamTransport::new(socket)?;

        let shared_sender = Arc::clone(&shared);
        let hello = hello.clone();
        std::thread::spawn(move || fanout::run_sender(shared_sender, hello, sender_transport));

        let shared_receiver = Arc::clone(&shared);
        std::thread::spawn(move || {
            fanout::run_receiver(shared_receiver, address, receiver_transport)
        });
    }
}

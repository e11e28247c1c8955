//! Per-client fan-out (§4.4): for every accepted TCP connection, one
//! sender thread replays the full protocol history from wherever the
//! client joined, and one receiver thread folds incoming messages into
//! the shared world or the player's move latch.
//!
//! Neither thread ever blocks the other: a sender only reads `SharedState`
//! under its mutex and a receiver only takes it briefly to call
//! `add_player` or check `iteration`. An I/O error on either thread closes
//! the connection and ends both — the simulation itself is unaffected.

use crate::codec::{ClientToServer, Player, PlayerId, ServerToClient};
use crate::error::CodecError;
use crate::options::ServerArgs;
use crate::transport::{StreamTransport, WireWrite};
use crate::world::{PlayerIntent, SharedState};
use std::sync::Arc;

/// §4.4 sender thread: send `Hello`, then loop forever replaying whatever
/// the world has accumulated since this client connected, whichever phase
/// (Lobby or Game) it currently observes.
pub fn run_sender(shared: Arc<SharedState>, hello: ServerToClient, mut out: StreamTransport) {
    if let Err(e) = send(&mut out, &hello) {
        tracing::debug!(error = %e, "sender: failed to send Hello");
        return;
    }

    let mut next_accepted: usize = 0;
    let mut next_turn: usize = 0;

    loop {
        // Lobby phase: replay AcceptedPlayer for everyone registered so
        // far, then wait for more joiners or for the lobby to fill.
        let players_snapshot = {
            let mut world = shared.mutex.lock().unwrap();
            loop {
                // Catch up on any players accepted so far before ever
                // looking at `game_state` — the registry is frozen (not
                // cleared) at game start, so a player accepted in the same
                // critical section that started the game must still be
                // replayed before this sender moves on to `GameStarted`.
                if world.players.len() > next_accepted {
                    let snapshot: Vec<(PlayerId, Player)> = world
                        .players
                        .range(next_accepted as PlayerId..)
                        .map(|(&id, p)| (id, p.clone()))
                        .collect();
                    break Some(snapshot);
                }
                if world.game_state == crate::world::GameState::Game {
                    break None;
                }
                world = shared.new_players.wait(world).unwrap();
            }
        };

        if let Some(new_players) = players_snapshot {
            for (id, player) in new_players {
                if let Err(e) = send(&mut out, &ServerToClient::AcceptedPlayer { id, player }) {
                    tracing::debug!(error = %e, "sender: failed to send AcceptedPlayer");
                    return;
                }
                next_accepted += 1;
            }
            continue;
        }

        // Game just started: send the frozen players snapshot once.
        let game_started = {
            let world = shared.mutex.lock().unwrap();
            ServerToClient::GameStarted { players: world.players.clone() }
        };
        if let Err(e) = send(&mut out, &game_started) {
            tracing::debug!(error = %e, "sender: failed to send GameStarted");
            return;
        }

        // Game phase: replay each newly published turn in order.
        loop {
            let turn_to_send = {
                let mut world = shared.mutex.lock().unwrap();
                loop {
                    // As with the lobby replay above: drain any turn
                    // already appended before concluding the game ended.
                    // `end_game` deliberately leaves `turns` intact (see
                    // `World::end_game`), so a sender that wakes up after
                    // the game has already ended still finds every turn it
                    // hasn't sent yet, and never skips the final one.
                    if world.turns.len() > next_turn {
                        break Some((next_turn as u16, world.turns[next_turn].clone()));
                    }
                    if world.game_state != crate::world::GameState::Game {
                        break None;
                    }
                    world = shared.new_turn.wait(world).unwrap();
                }
            };

            match turn_to_send {
                Some((turn, events)) => {
                    if let Err(e) = send(&mut out, &ServerToClient::Turn { turn, events }) {
                        tracing::debug!(error = %e, "sender: failed to send Turn");
                        return;
                    }
                    next_turn += 1;
                }
                None => break,
            }
        }

        // Back in Lobby: send GameEnded with the final scores, then loop
        // back to replaying the next lobby from scratch.
        let scores = {
            let world = shared.mutex.lock().unwrap();
            world.scores.clone()
        };
        if let Err(e) = send(&mut out, &ServerToClient::GameEnded { scores }) {
            tracing::debug!(error = %e, "sender: failed to send GameEnded");
            return;
        }
        next_accepted = 0;
        next_turn = 0;
    }
}

fn send(out: &mut StreamTransport, msg: &ServerToClient) -> Result<(), CodecError> {
    msg.encode(out)?;
    out.flush()?;
    Ok(())
}

/// §4.4 receiver thread: reads `ClientToServer` messages forever, folding
/// `Join` into `add_player` and every other message into this player's
/// latched move.
pub fn run_receiver(shared: Arc<SharedState>, address: String, mut input: StreamTransport) {
    let mut joined = false;
    let mut id: PlayerId = 0;
    let mut current_iteration = {
        let world = shared.mutex.lock().unwrap();
        world.iteration
    };

    loop {
        let msg = match ClientToServer::decode(&mut input) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "receiver: connection ended");
                return;
            }
        };

        let (observed_iteration, observed_state) = {
            let world = shared.mutex.lock().unwrap();
            (world.iteration, world.game_state)
        };
        // `iteration` also bumps on Lobby→Game (so late joiners can be
        // told a game is already running); only the Game→Lobby bump, a
        // genuinely new lobby, means this player must re-Join. Resetting
        // on every bump would drop a just-joined player's own
        // Move/PlaceBomb the instant their game starts.
        if observed_state == crate::world::GameState::Lobby && observed_iteration != current_iteration {
            current_iteration = observed_iteration;
            joined = false;
        }

        match msg {
            ClientToServer::Join(name) => {
                if joined {
                    continue;
                }
                match shared.add_player(name, address.clone()) {
                    Some(new_id) => {
                        id = new_id;
                        joined = true;
                    }
                    None => tracing::debug!(%address, "join dropped: lobby full or game running"),
                }
            }
            _ if !joined => continue,
            ClientToServer::PlaceBomb => shared.player_moves.set(id, PlayerIntent::PlaceBomb),
            ClientToServer::PlaceBlock => shared.player_moves.set(id, PlayerIntent::PlaceBlock),
            ClientToServer::Move(dir) => shared.player_moves.set(id, PlayerIntent::Move(dir)),
        }
    }
}

pub fn hello_message(args: &ServerArgs) -> ServerToClient {
    ServerToClient::Hello {
        server_name: args.server_name.clone(),
        player_count: args.players_count,
        size_x: args.size_x,
        size_y: args.size_y,
        game_length: args.game_length,
        explosion_radius: args.explosion_radius,
        bomb_timer: args.bomb_timer,
    }
}

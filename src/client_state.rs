//! Client materialized view (§4.6): folds `ServerToClient` messages into
//! an observable world the frontend can render statelessly, and folds
//! `FrontendToClient` intents into the one `ClientToServer` message the
//! orchestrator should forward.
//!
//! Mirrors the original `Client::process_server_message`/
//! `process_gui_message` split: one pure step per direction, each
//! returning the single outgoing message to emit (or `None` when the
//! incoming message is absorbed silently, as `GameStarted` is).

use crate::codec::{
    Bomb, ClientToFrontend, Event, FrontendToClient, Player, PlayerId, Position, Score,
    ServerToClient,
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Game,
}

/// Everything the frontend needs to render either the lobby or an
/// in-progress game, rebuilt purely from the server's event stream.
pub struct ClientState {
    phase: Phase,
    server_name: String,
    player_count: u8,
    size_x: u16,
    size_y: u16,
    game_length: u16,
    explosion_radius: u16,
    bomb_timer: u16,
    turn: u16,
    players: BTreeMap<PlayerId, Player>,
    player_positions: BTreeMap<PlayerId, Position>,
    blocks: BTreeSet<Position>,
    bombs: BTreeMap<crate::codec::BombId, Bomb>,
    explosions: BTreeSet<Position>,
    scores: BTreeMap<PlayerId, Score>,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Lobby,
            server_name: String::new(),
            player_count: 0,
            size_x: 0,
            size_y: 0,
            game_length: 0,
            explosion_radius: 0,
            bomb_timer: 0,
            turn: 0,
            players: BTreeMap::new(),
            player_positions: BTreeMap::new(),
            blocks: BTreeSet::new(),
            bombs: BTreeMap::new(),
            explosions: BTreeSet::new(),
            scores: BTreeMap::new(),
        }
    }

    /// Folds one server message into this state. Returns the datagram the
    /// orchestrator should send to the frontend, or `None` for
    /// `GameStarted`, which is absorbed silently — the following `Turn`
    /// is what actually gives the frontend something new to render.
    pub fn apply_server_message(&mut self, msg: ServerToClient) -> Option<ClientToFrontend> {
        match msg {
            ServerToClient::Hello {
                server_name,
                player_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
            } => {
                self.server_name = server_name;
                self.player_count = player_count;
                self.size_x = size_x;
                self.size_y = size_y;
                self.game_length = game_length;
                self.explosion_radius = explosion_radius;
                self.bomb_timer = bomb_timer;
                Some(self.to_frontend_message())
            }
            ServerToClient::AcceptedPlayer { id, player } => {
                self.players.insert(id, player);
                self.scores.insert(id, 0);
                Some(self.to_frontend_message())
            }
            ServerToClient::GameStarted { players } => {
                self.phase = Phase::Game;
                self.scores = players.keys().map(|&id| (id, 0)).collect();
                self.players = players;
                self.player_positions.clear();
                self.blocks.clear();
                self.bombs.clear();
                self.explosions.clear();
                self.turn = 0;
                None
            }
            ServerToClient::Turn { turn, events } => {
                self.turn = turn;
                self.explosions.clear();
                for bomb in self.bombs.values_mut() {
                    bomb.timer = bomb.timer.saturating_sub(1);
                }

                let mut destroyed_blocks = BTreeSet::new();
                let mut destroyed_players = BTreeSet::new();

                for event in events {
                    match event {
                        Event::BombPlaced { id, position } => {
                            self.bombs.insert(id, Bomb { position, timer: self.bomb_timer });
                        }
                        Event::BombExploded { id, robots_destroyed, blocks_destroyed } => {
                            if let Some(bomb) = self.bombs.get(&id) {
                                self.explosions.extend(explosion_cells(
                                    bomb.position,
                                    self.explosion_radius,
                                    self.size_x,
                                    self.size_y,
                                    &self.blocks,
                                ));
                            }
                            destroyed_blocks.extend(blocks_destroyed);
                            destroyed_players.extend(robots_destroyed);
                            self.bombs.remove(&id);
                        }
                        Event::PlayerMoved { id, position } => {
                            self.player_positions.insert(id, position);
                        }
                        Event::BlockPlaced { position } => {
                            self.blocks.insert(position);
                        }
                    }
                }

                for pos in &destroyed_blocks {
                    self.blocks.remove(pos);
                }
                for id in &destroyed_players {
                    *self.scores.entry(*id).or_insert(0) += 1;
                }

                Some(self.to_frontend_message())
            }
            ServerToClient::GameEnded { scores: _ } => {
                self.phase = Phase::Lobby;
                self.players.clear();
                self.scores.clear();
                Some(self.to_frontend_message())
            }
        }
    }

    /// Folds one frontend intent into the `ClientToServer` message to
    /// forward. In Lobby, any frontend message becomes a `Join` — the
    /// frontend's actual intent is ignored per §4.6/scenario 6.
    pub fn apply_frontend_message(
        &self,
        msg: FrontendToClient,
        player_name: &str,
    ) -> crate::codec::ClientToServer {
        use crate::codec::ClientToServer;
        match self.phase {
            Phase::Lobby => ClientToServer::Join(player_name.to_string()),
            Phase::Game => match msg {
                FrontendToClient::PlaceBomb => ClientToServer::PlaceBomb,
                FrontendToClient::PlaceBlock => ClientToServer::PlaceBlock,
                FrontendToClient::Move(dir) => ClientToServer::Move(dir),
            },
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn to_frontend_message(&self) -> ClientToFrontend {
        match self.phase {
            Phase::Lobby => ClientToFrontend::Lobby {
                server_name: self.server_name.clone(),
                player_count: self.player_count,
                size_x: self.size_x,
                size_y: self.size_y,
                game_length: self.game_length,
                explosion_radius: self.explosion_radius,
                bomb_timer: self.bomb_timer,
                players: self.players.clone(),
            },
            Phase::Game => ClientToFrontend::Game {
                server_name: self.server_name.clone(),
                size_x: self.size_x,
                size_y: self.size_y,
                game_length: self.game_length,
                turn: self.turn,
                players: self.players.clone(),
                player_positions: self.player_positions.clone(),
                blocks: self.blocks.iter().copied().collect(),
                bombs: self.bombs.values().copied().collect(),
                explosions: self.explosions.iter().copied().collect(),
                scores: self.scores.clone(),
            },
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

/// Same four-ray geometry as the engine's `explosion_cells` (§4.5), but
/// display-only: it runs against the client's own block map purely to
/// populate `explosions` for the frontend, and never decides who or what
/// is actually destroyed — the server's `BombExploded` event is
/// authoritative for that.
fn explosion_cells(
    origin: Position,
    radius: u16,
    size_x: u16,
    size_y: u16,
    blocks: &BTreeSet<Position>,
) -> Vec<Position> {
    const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
    let mut seen = BTreeSet::new();
    seen.insert(origin);

    for (dx, dy) in DIRECTIONS {
        for i in 0..=radius as i32 {
            let cx = origin.x as i32 + dx * i;
            let cy = origin.y as i32 + dy * i;
            if cx < 0 || cy < 0 || cx >= size_x as i32 || cy >= size_y as i32 {
                break;
            }
            let cell = Position::new(cx as u16, cy as u16);
            seen.insert(cell);
            if blocks.contains(&cell) {
                break;
            }
        }
    }

    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Direction;

    #[test]
    fn hello_then_accepted_player_builds_lobby_view() {
        let mut state = ClientState::new();
        state.apply_server_message(ServerToClient::Hello {
            server_name: "arena".into(),
            player_count: 2,
            size_x: 10,
            size_y: 10,
            game_length: 100,
            explosion_radius: 3,
            bomb_timer: 5,
        });
        let out = state
            .apply_server_message(ServerToClient::AcceptedPlayer {
                id: 0,
                player: Player { name: "alice".into(), address: "1.2.3.4:5".into() },
            })
            .unwrap();
        match out {
            ClientToFrontend::Lobby { players, .. } => assert_eq!(players.len(), 1),
            _ => panic!("expected Lobby message"),
        }
    }

    #[test]
    fn game_started_is_absorbed_silently() {
        let mut state = ClientState::new();
        let mut players = BTreeMap::new();
        players.insert(0, Player { name: "alice".into(), address: "a".into() });
        let out = state.apply_server_message(ServerToClient::GameStarted { players });
        assert!(out.is_none());
        assert_eq!(state.phase(), Phase::Game);
    }

    #[test]
    fn lobby_frontend_intent_always_becomes_join() {
        let state = ClientState::new();
        let out = state.apply_frontend_message(FrontendToClient::Move(Direction::Up), "bob");
        assert_eq!(out, crate::codec::ClientToServer::Join("bob".into()));
    }

    #[test]
    fn turn_destroys_block_and_scores_player() {
        let mut state = ClientState::new();
        let mut players = BTreeMap::new();
        players.insert(0, Player { name: "alice".into(), address: "a".into() });
        state.apply_server_message(ServerToClient::Hello {
            server_name: "arena".into(),
            player_count: 1,
            size_x: 10,
            size_y: 10,
            game_length: 5,
            explosion_radius: 2,
            bomb_timer: 3,
        });
        state.apply_server_message(ServerToClient::GameStarted { players });
        state.apply_server_message(ServerToClient::Turn {
            turn: 0,
            events: vec![
                Event::PlayerMoved { id: 0, position: Position::new(0, 0) },
                Event::BlockPlaced { position: Position::new(1, 0) },
                Event::BombPlaced { id: 0, position: Position::new(0, 0) },
            ],
        });
        state.apply_server_message(ServerToClient::Turn {
            turn: 1,
            events: vec![Event::BombExploded {
                id: 0,
                robots_destroyed: vec![0],
                blocks_destroyed: vec![Position::new(1, 0)],
            }],
        });
        match state.apply_server_message(ServerToClient::Turn { turn: 2, events: vec![] }).unwrap()
        {
            ClientToFrontend::Game { blocks, scores, .. } => {
                assert!(!blocks.contains(&Position::new(1, 0)));
                assert_eq!(scores.get(&0), Some(&1));
            }
            _ => panic!("expected Game message"),
        }
    }
}

//! Authoritative server state (§3, §4.3): the lobby/game registry, the
//! per-player move latches, and the single mutex + three condition
//! variables every thread kind rendezvous through.
//!
//! Locking order is fixed and must never be reversed: the primary mutex
//! (`SharedState::mutex`) before any per-player move latch.

use crate::codec::{Bomb, BombId, Direction, Event, Player, PlayerId, Position, Score};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Lobby,
    Game,
}

/// The single most recent action a player has requested since the last
/// turn tick. `Join` never reaches here — it's handled by `add_player`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerIntent {
    PlaceBomb,
    PlaceBlock,
    Move(Direction),
}

/// Authoritative world: single writer (the turn engine), read by every
/// sender thread under `SharedState::mutex`.
pub struct World {
    pub game_state: GameState,
    pub players: BTreeMap<PlayerId, Player>,
    pub scores: BTreeMap<PlayerId, Score>,
    pub player_positions: BTreeMap<PlayerId, Position>,
    pub blocks: BTreeSet<Position>,
    pub bombs: BTreeMap<BombId, Bomb>,
    pub next_bomb_id: BombId,
    /// Append-only event log for the current game. `turns.len() ==
    /// current_turn` at every observation point outside the engine's
    /// critical section.
    pub turns: Vec<Vec<Event>>,
    pub current_turn: u16,
    /// Bumped on every Lobby→Game and Game→Lobby transition so receiver
    /// threads can detect a restarted lobby and require a fresh Join.
    pub iteration: u32,
}

impl World {
    fn new() -> Self {
        Self {
            game_state: GameState::Lobby,
            players: BTreeMap::new(),
            scores: BTreeMap::new(),
            player_positions: BTreeMap::new(),
            blocks: BTreeSet::new(),
            bombs: BTreeMap::new(),
            next_bomb_id: 0,
            turns: Vec::new(),
            current_turn: 0,
            iteration: 0,
        }
    }

    fn start_game(&mut self) {
        self.game_state = GameState::Game;
        self.scores = self.players.keys().map(|&id| (id, 0)).collect();
        self.player_positions.clear();
        self.blocks.clear();
        self.bombs.clear();
        self.next_bomb_id = 0;
        self.turns.clear();
        self.current_turn = 0;
        self.iteration += 1;
    }

    fn end_game(&mut self) {
        self.game_state = GameState::Lobby;
        self.players.clear();
        self.player_positions.clear();
        self.blocks.clear();
        self.bombs.clear();
        // `turns`/`current_turn` are deliberately left intact here, the
        // same way `scores` survives for `GameEnded`: a sender thread may
        // still be draining unreplayed turns when this runs, and clearing
        // the log out from under it would silently drop the tail of the
        // game's event history. The next `start_game()` clears both.
        self.iteration += 1;
    }
}

/// Per-player latched move, each behind its own mutex so the receiver
/// threads never contend on the primary lock just to record an intent.
pub struct PlayerMoves {
    latches: Vec<Mutex<Option<PlayerIntent>>>,
}

impl PlayerMoves {
    pub fn new(capacity: u8) -> Self {
        Self { latches: (0..capacity).map(|_| Mutex::new(None)).collect() }
    }

    /// Overwrite this player's latched intent. Called by a receiver thread
    /// without holding the primary mutex.
    pub fn set(&self, id: PlayerId, intent: PlayerIntent) {
        if let Some(m) = self.latches.get(id as usize) {
            *m.lock().unwrap() = intent.into();
        }
    }

    /// Take (and clear) this player's latched intent. Called by the turn
    /// engine, which must hold the primary mutex first.
    pub fn take(&self, id: PlayerId) -> Option<PlayerIntent> {
        self.latches.get(id as usize).and_then(|m| m.lock().unwrap().take())
    }

    pub fn clear_all(&self) {
        for m in &self.latches {
            *m.lock().unwrap() = None;
        }
    }
}

/// Everything three kinds of threads (acceptor-spawned senders/receivers
/// and the single turn-engine thread) rendezvous through.
pub struct SharedState {
    pub mutex: Mutex<World>,
    /// Notified whenever `players` grows during `Lobby`.
    pub new_players: Condvar,
    /// Notified exactly once, when the lobby fills and `Game` begins.
    pub game_start: Condvar,
    /// Notified whenever a new entry is appended to `turns`, and once more
    /// when the game ends (so waiting senders observe the state change).
    pub new_turn: Condvar,
    pub player_moves: PlayerMoves,
    pub players_count: u8,
}

impl SharedState {
    pub fn new(players_count: u8) -> Self {
        Self {
            mutex: Mutex::new(World::new()),
            new_players: Condvar::new(),
            game_start: Condvar::new(),
            new_turn: Condvar::new(),
            player_moves: PlayerMoves::new(players_count),
            players_count,
        }
    }

    /// §4.3's primary operation. Returns `None` if the join is silently
    /// dropped (game already running, or the lobby happened to fill
    /// between the receiver's capacity check and this call).
    pub fn add_player(&self, name: String, address: String) -> Option<PlayerId> {
        let mut world = self.mutex.lock().unwrap();
        if world.game_state == GameState::Game {
            return None;
        }
        if world.players.len() >= self.players_count as usize {
            return None;
        }
        let id = world.players.len() as PlayerId;
        world.players.insert(id, Player { name, address });
        self.new_players.notify_all();
        if world.players.len() as u8 == self.players_count {
            world.start_game();
            self.game_start.notify_all();
        }
        Some(id)
    }

    /// Called once by the turn engine after the final turn is published.
    pub fn end_game(&self) {
        let mut world = self.mutex.lock().unwrap();
        world.end_game();
        self.new_turn.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lobby_fills_exactly_at_capacity() {
        let shared = SharedState::new(2);
        assert_eq!(shared.add_player("a".into(), "addr-a".into()), Some(0));
        {
            let world = shared.mutex.lock().unwrap();
            assert_eq!(world.game_state, GameState::Lobby);
        }
        assert_eq!(shared.add_player("b".into(), "addr-b".into()), Some(1));
        {
            let world = shared.mutex.lock().unwrap();
            assert_eq!(world.game_state, GameState::Game);
            assert_eq!(world.scores.get(&0), Some(&0));
            assert_eq!(world.scores.get(&1), Some(&0));
        }
    }

    #[test]
    fn extra_join_after_full_is_dropped() {
        let shared = SharedState::new(1);
        assert_eq!(shared.add_player("a".into(), "addr-a".into()), Some(0));
        assert_eq!(shared.add_player("b".into(), "addr-b".into()), None);
        let world = shared.mutex.lock().unwrap();
        assert_eq!(world.players.len(), 1);
    }

    #[test]
    fn join_during_game_is_dropped() {
        let shared = SharedState::new(1);
        shared.add_player("a".into(), "addr-a".into());
        assert_eq!(shared.add_player("late".into(), "addr-late".into()), None);
    }

    #[test]
    fn player_moves_latch_is_overwritten_not_queued() {
        let moves = PlayerMoves::new(2);
        moves.set(0, PlayerIntent::PlaceBomb);
        moves.set(0, PlayerIntent::PlaceBlock);
        assert_eq!(moves.take(0), Some(PlayerIntent::PlaceBlock));
        assert_eq!(moves.take(0), None);
    }
}

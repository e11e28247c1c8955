//! The turn engine (§4.5): one thread, one game at a time. Deterministic
//! world init, then a fixed `game_length + 1` iteration loop that appends
//! one event batch per turn, publishes it, sleeps, and computes the next
//! batch — bomb ticks and explosions first, then one action per player in
//! ascending `PlayerId` order.

use crate::codec::{Bomb, BombId, Direction, Event, Player, PlayerId, Position};
use crate::rng::Lcg;
use crate::world::{GameState, PlayerIntent, SharedState};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub size_x: u16,
    pub size_y: u16,
    pub game_length: u16,
    pub bomb_timer: u16,
    pub explosion_radius: u16,
    pub initial_blocks: u16,
    pub turn_duration: Duration,
    pub seed: u32,
}

/// Runs forever, hosting one lobby→game→lobby cycle after another.
pub fn run(shared: Arc<SharedState>, config: EngineConfig) {
    let mut rng = Lcg::new(config.seed);
    loop {
        wait_for_game_start(&shared);
        tracing::info!("game starting");
        run_one_game(&shared, &config, &mut rng);
        tracing::info!("game ended, returning to lobby");
    }
}

fn wait_for_game_start(shared: &SharedState) {
    let mut world = shared.mutex.lock().unwrap();
    while world.game_state != GameState::Game {
        world = shared.game_start.wait(world).unwrap();
    }
}

fn run_one_game(shared: &SharedState, config: &EngineConfig, rng: &mut Lcg) {
    let mut current_events = {
        let mut world = shared.mutex.lock().unwrap();
        build_turn_zero(&mut world.player_positions, &mut world.blocks, players_in_order(&world.players), config, rng)
    };

    for turn in 0..=config.game_length {
        {
            let mut world = shared.mutex.lock().unwrap();
            world.turns.push(std::mem::take(&mut current_events));
            world.current_turn += 1;
            shared.player_moves.clear_all();
        }
        shared.new_turn.notify_all();
        tracing::debug!(turn, "published turn");

        if turn == config.game_length {
            break;
        }
        std::thread::sleep(config.turn_duration);

        let mut world = shared.mutex.lock().unwrap();
        current_events = compute_next_turn(&mut world, &shared.player_moves, config, rng);
    }

    shared.end_game();
}

fn players_in_order(players: &std::collections::BTreeMap<PlayerId, Player>) -> Vec<PlayerId> {
    players.keys().copied().collect()
}

/// Deterministic world init (§4.5 "Game startup"): scatter every player,
/// then drop up to `initial_blocks` blocks, discarding collisions silently.
fn build_turn_zero(
    player_positions: &mut std::collections::BTreeMap<PlayerId, Position>,
    blocks: &mut BTreeSet<Position>,
    player_ids: Vec<PlayerId>,
    config: &EngineConfig,
    rng: &mut Lcg,
) -> Vec<Event> {
    let mut events = Vec::new();
    for id in player_ids {
        let pos = rng.next_position(config.size_x, config.size_y);
        player_positions.insert(id, pos);
        events.push(Event::PlayerMoved { id, position: pos });
    }
    for _ in 0..config.initial_blocks {
        let pos = rng.next_position(config.size_x, config.size_y);
        if blocks.insert(pos) {
            events.push(Event::BlockPlaced { position: pos });
        }
    }
    events
}

/// §4.5 "Next-turn event computation," in the exact order specified:
/// bomb ticks and explosions, then one action per player.
fn compute_next_turn(
    world: &mut crate::world::World,
    player_moves: &crate::world::PlayerMoves,
    config: &EngineConfig,
    rng: &mut Lcg,
) -> Vec<Event> {
    let mut events = Vec::new();

    for bomb in world.bombs.values_mut() {
        bomb.timer -= 1;
    }
    let exploding: Vec<(BombId, Bomb)> =
        world.bombs.iter().filter(|(_, b)| b.timer == 0).map(|(&id, &b)| (id, b)).collect();

    let mut destroyed_blocks_union: BTreeSet<Position> = BTreeSet::new();
    let mut destroyed_robots_union: BTreeSet<PlayerId> = BTreeSet::new();
    for (id, bomb) in &exploding {
        let (robots, blocks) = explosion_cells(
            bomb.position,
            config.explosion_radius,
            config.size_x,
            config.size_y,
            &world.blocks,
            &world.player_positions,
        );
        destroyed_robots_union.extend(robots.iter().copied());
        destroyed_blocks_union.extend(blocks.iter().copied());
        events.push(Event::BombExploded {
            id: *id,
            robots_destroyed: robots,
            blocks_destroyed: blocks,
        });
    }
    for pos in &destroyed_blocks_union {
        world.blocks.remove(pos);
    }
    for (id, _) in &exploding {
        world.bombs.remove(id);
    }

    let player_ids = players_in_order(&world.players);
    for id in player_ids {
        if destroyed_robots_union.contains(&id) {
            let pos = rng.next_position(config.size_x, config.size_y);
            world.player_positions.insert(id, pos);
            events.push(Event::PlayerMoved { id, position: pos });
            *world.scores.entry(id).or_insert(0) += 1;
            continue;
        }

        let Some(pos) = world.player_positions.get(&id).copied() else { continue };
        match player_moves.take(id) {
            Some(PlayerIntent::PlaceBomb) => {
                let bomb_id = world.next_bomb_id;
                world.next_bomb_id += 1;
                world.bombs.insert(bomb_id, Bomb { position: pos, timer: config.bomb_timer });
                events.push(Event::BombPlaced { id: bomb_id, position: pos });
            }
            Some(PlayerIntent::PlaceBlock) => {
                if world.blocks.insert(pos) {
                    events.push(Event::BlockPlaced { position: pos });
                }
            }
            Some(PlayerIntent::Move(dir)) => {
                if let Some(next) = step(pos, dir, config.size_x, config.size_y) {
                    if !world.blocks.contains(&next) {
                        world.player_positions.insert(id, next);
                        events.push(Event::PlayerMoved { id, position: next });
                    }
                }
            }
            None => {}
        }
    }

    events
}

fn step(pos: Position, dir: Direction, size_x: u16, size_y: u16) -> Option<Position> {
    let (dx, dy) = dir.delta();
    let nx = pos.x as i32 + dx;
    let ny = pos.y as i32 + dy;
    if nx < 0 || ny < 0 || nx >= size_x as i32 || ny >= size_y as i32 {
        return None;
    }
    Some(Position::new(nx as u16, ny as u16))
}

/// Four-ray cast from `origin`, one cardinal direction at a time, each up
/// to `radius + 1` cells including the bomb's own cell. A block stops its
/// ray; the grid boundary stops a ray before entering the out-of-bounds
/// cell. Robots and blocks are deduplicated across all four rays.
fn explosion_cells(
    origin: Position,
    radius: u16,
    size_x: u16,
    size_y: u16,
    blocks: &BTreeSet<Position>,
    positions: &std::collections::BTreeMap<PlayerId, Position>,
) -> (Vec<PlayerId>, Vec<Position>) {
    const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

    let mut robots: BTreeSet<PlayerId> = BTreeSet::new();
    let mut blocks_seen: BTreeSet<Position> = BTreeSet::new();
    let mut block_list: Vec<Position> = Vec::new();

    for (dx, dy) in DIRECTIONS {
        for i in 0..=radius as i32 {
            let cx = origin.x as i32 + dx * i;
            let cy = origin.y as i32 + dy * i;
            if cx < 0 || cy < 0 || cx >= size_x as i32 || cy >= size_y as i32 {
                break;
            }
            let cell = Position::new(cx as u16, cy as u16);
            for (&pid, &ppos) in positions {
                if ppos == cell {
                    robots.insert(pid);
                }
            }
            if blocks.contains(&cell) {
                if blocks_seen.insert(cell) {
                    block_list.push(cell);
                }
                break;
            }
        }
    }

    (robots.into_iter().collect(), block_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;
    use std::collections::BTreeMap;

    fn config(size_x: u16, size_y: u16, radius: u16, bomb_timer: u16) -> EngineConfig {
        EngineConfig {
            size_x,
            size_y,
            game_length: 0,
            bomb_timer,
            explosion_radius: radius,
            initial_blocks: 0,
            turn_duration: Duration::from_millis(0),
            seed: 0,
        }
    }

    fn fresh_world(player_count: u8) -> World {
        let shared = SharedState::new(player_count);
        for i in 0..player_count {
            shared.add_player(format!("p{i}"), format!("addr{i}"), );
        }
        shared.mutex.into_inner().unwrap()
    }

    #[test]
    fn scenario_single_player_trivial_game() {
        let shared = SharedState::new(1);
        shared.add_player("alice".into(), "127.0.0.1:1".into());
        let mut rng = Lcg::new(0);
        let mut world = shared.mutex.lock().unwrap();
        let cfg = config(2, 2, 0, 1);
        let events = build_turn_zero(
            &mut world.player_positions,
            &mut world.blocks,
            players_in_order(&world.players),
            &cfg,
            &mut rng,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::PlayerMoved { id: 0, .. }));
        assert_eq!(world.scores.get(&0), Some(&0));
    }

    #[test]
    fn scenario_block_stops_explosion() {
        let mut world = fresh_world(1);
        world.player_positions.insert(0, Position::new(0, 0));
        world.blocks.insert(Position::new(3, 0));
        world.bombs.insert(0, Bomb { position: Position::new(0, 0), timer: 1 });
        let moves = crate::world::PlayerMoves::new(1);
        let cfg = config(10, 10, 5, 1);
        let mut rng = Lcg::new(0);

        let events = compute_next_turn(&mut world, &moves, &cfg, &mut rng);

        let exploded = events
            .iter()
            .find_map(|e| match e {
                Event::BombExploded { blocks_destroyed, .. } => Some(blocks_destroyed.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(exploded, vec![Position::new(3, 0)]);
        assert!(!world.blocks.contains(&Position::new(3, 0)));
    }

    #[test]
    fn scenario_movement_blocked_by_block() {
        let mut world = fresh_world(1);
        world.player_positions.insert(0, Position::new(0, 0));
        world.blocks.insert(Position::new(1, 0));
        let moves = crate::world::PlayerMoves::new(1);
        moves.set(0, PlayerIntent::Move(Direction::Right));
        let cfg = config(10, 10, 0, 1);
        let mut rng = Lcg::new(0);

        let events = compute_next_turn(&mut world, &moves, &cfg, &mut rng);

        assert!(!events.iter().any(|e| matches!(e, Event::PlayerMoved { id: 0, .. })));
        assert_eq!(world.player_positions[&0], Position::new(0, 0));
    }

    #[test]
    fn scenario_robot_respawns_after_destruction_and_scores() {
        let mut world = fresh_world(1);
        world.player_positions.insert(0, Position::new(0, 0));
        world.bombs.insert(0, Bomb { position: Position::new(0, 0), timer: 1 });
        let moves = crate::world::PlayerMoves::new(1);
        let cfg = config(5, 5, 0, 1);
        let mut rng = Lcg::new(99);

        let events = compute_next_turn(&mut world, &moves, &cfg, &mut rng);

        let exploded_destroyed = events.iter().find_map(|e| match e {
            Event::BombExploded { robots_destroyed, .. } => Some(robots_destroyed.clone()),
            _ => None,
        });
        assert_eq!(exploded_destroyed, Some(vec![0]));
        assert!(events.iter().any(|e| matches!(e, Event::PlayerMoved { id: 0, .. })));
        assert_eq!(world.scores.get(&0), Some(&1));
    }

    #[test]
    fn chained_destruction_reports_player_in_both_bombs() {
        let mut world = fresh_world(1);
        world.player_positions.insert(0, Position::new(2, 0));
        world.bombs.insert(0, Bomb { position: Position::new(0, 0), timer: 1 });
        world.bombs.insert(1, Bomb { position: Position::new(4, 0), timer: 1 });
        let moves = crate::world::PlayerMoves::new(1);
        let cfg = config(10, 10, 3, 1);
        let mut rng = Lcg::new(1);

        let events = compute_next_turn(&mut world, &moves, &cfg, &mut rng);
        let hits: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::BombExploded { robots_destroyed, .. } => Some(robots_destroyed.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r == &vec![0]));
    }

    #[test]
    fn explosion_geometry_matches_radius() {
        let blocks = BTreeSet::new();
        let positions = BTreeMap::new();
        let (_, block_list) =
            explosion_cells(Position::new(5, 5), 2, 20, 20, &blocks, &positions);
        assert!(block_list.is_empty());
    }

    #[test]
    fn bomb_own_cell_reported_once() {
        let mut blocks = BTreeSet::new();
        blocks.insert(Position::new(5, 5));
        let positions = BTreeMap::new();
        let (_, block_list) = explosion_cells(Position::new(5, 5), 3, 20, 20, &blocks, &positions);
        assert_eq!(block_list, vec![Position::new(5, 5)]);
    }
}

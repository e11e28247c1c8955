//! Wire types and their bit-exact encodings (§3 and §4.1 of the protocol
//! spec). Every multi-byte integer is big-endian; `String` is a `u8` length
//! prefix followed by that many UTF-8 bytes (255-byte cap); `List<T>`/
//! `Map<K,V>` are `u32`-length-prefixed sequences.
//!
//! Encode/decode are free functions generic over [`WireWrite`]/[`WireRead`]
//! so the same message definitions serve both the TCP server↔client leg and
//! the UDP client↔frontend leg (see `transport.rs`).

use crate::error::CodecError;
use crate::transport::{WireRead, WireWrite};
use std::collections::BTreeMap;

pub type PlayerId = u8;
pub type BombId = u32;
pub type Score = u32;

// ── Primitive helpers ─────────────────────────────────────────────────────

pub fn write_string(w: &mut dyn WireWrite, s: &str) -> Result<(), CodecError> {
    if s.len() > 255 {
        return Err(CodecError::StringTooLong(s.len()));
    }
    w.write_u8(s.len() as u8)?;
    w.write_bytes(s.as_bytes())?;
    Ok(())
}

pub fn read_string(r: &mut dyn WireRead) -> Result<String, CodecError> {
    let len = r.read_u8()? as usize;
    let bytes = r.read_bytes(len)?;
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
}

pub fn write_list<T>(
    w: &mut dyn WireWrite,
    items: &[T],
    mut each: impl FnMut(&mut dyn WireWrite, &T) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    w.write_u32(items.len() as u32)?;
    for item in items {
        each(w, item)?;
    }
    Ok(())
}

pub fn read_list<T>(
    r: &mut dyn WireRead,
    mut each: impl FnMut(&mut dyn WireRead) -> Result<T, CodecError>,
) -> Result<Vec<T>, CodecError> {
    let len = r.read_u32()?;
    let mut out = Vec::with_capacity(len.min(4096) as usize);
    for _ in 0..len {
        out.push(each(r)?);
    }
    Ok(out)
}

pub fn write_map<K, V>(
    w: &mut dyn WireWrite,
    items: &BTreeMap<K, V>,
    mut each: impl FnMut(&mut dyn WireWrite, &K, &V) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    w.write_u32(items.len() as u32)?;
    for (k, v) in items {
        each(w, k, v)?;
    }
    Ok(())
}

pub fn read_map<K: Ord, V>(
    r: &mut dyn WireRead,
    mut each: impl FnMut(&mut dyn WireRead) -> Result<(K, V), CodecError>,
) -> Result<BTreeMap<K, V>, CodecError> {
    let len = r.read_u32()?;
    let mut out = BTreeMap::new();
    for _ in 0..len {
        let (k, v) = each(r)?;
        out.insert(k, v);
    }
    Ok(out)
}

// ── Domain entities (§3) ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        w.write_u16(self.x)?;
        w.write_u16(self.y)?;
        Ok(())
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        Ok(Self { x: r.read_u16()?, y: r.read_u16()? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub address: String,
}

impl Player {
    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        write_string(w, &self.name)?;
        write_string(w, &self.address)?;
        Ok(())
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        Ok(Self { name: read_string(r)?, address: read_string(r)? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bomb {
    pub position: Position,
    pub timer: u16,
}

impl Bomb {
    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        self.position.encode(w)?;
        w.write_u16(self.timer)?;
        Ok(())
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        Ok(Self { position: Position::decode(r)?, timer: r.read_u16()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    pub fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(Self::Up),
            1 => Ok(Self::Right),
            2 => Ok(Self::Down),
            3 => Ok(Self::Left),
            _ => Err(CodecError::InvalidEnumTag { type_name: "Direction", tag }),
        }
    }

    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// `(dx, dy)` delta for a single step in this direction.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }
}

// ── Client → Server (§4.1) ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientToServer {
    Join(String),
    PlaceBomb,
    PlaceBlock,
    Move(Direction),
}

impl ClientToServer {
    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        match self {
            ClientToServer::Join(name) => {
                w.write_u8(0)?;
                write_string(w, name)
            }
            ClientToServer::PlaceBomb => w.write_u8(1).map_err(Into::into),
            ClientToServer::PlaceBlock => w.write_u8(2).map_err(Into::into),
            ClientToServer::Move(dir) => {
                w.write_u8(3)?;
                w.write_u8(dir.tag())?;
                Ok(())
            }
        }
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        match r.read_u8()? {
            0 => Ok(ClientToServer::Join(read_string(r)?)),
            1 => Ok(ClientToServer::PlaceBomb),
            2 => Ok(ClientToServer::PlaceBlock),
            3 => Ok(ClientToServer::Move(Direction::from_tag(r.read_u8()?)?)),
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

// ── Events carried inside a Turn message (§4.1) ───────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BombPlaced { id: BombId, position: Position },
    BombExploded { id: BombId, robots_destroyed: Vec<PlayerId>, blocks_destroyed: Vec<Position> },
    PlayerMoved { id: PlayerId, position: Position },
    BlockPlaced { position: Position },
}

impl Event {
    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        match self {
            Event::BombPlaced { id, position } => {
                w.write_u8(0)?;
                w.write_u32(*id)?;
                position.encode(w)
            }
            Event::BombExploded { id, robots_destroyed, blocks_destroyed } => {
                w.write_u8(1)?;
                w.write_u32(*id)?;
                write_list(w, robots_destroyed, |w, id| w.write_u8(*id).map_err(Into::into))?;
                write_list(w, blocks_destroyed, |w, p| p.encode(w))
            }
            Event::PlayerMoved { id, position } => {
                w.write_u8(2)?;
                w.write_u8(*id)?;
                position.encode(w)
            }
            Event::BlockPlaced { position } => {
                w.write_u8(3)?;
                position.encode(w)
            }
        }
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        match r.read_u8()? {
            0 => Ok(Event::BombPlaced { id: r.read_u32()?, position: Position::decode(r)? }),
            1 => {
                let id = r.read_u32()?;
                let robots_destroyed = read_list(r, |r| Ok(r.read_u8()?))?;
                let blocks_destroyed = read_list(r, Position::decode)?;
                Ok(Event::BombExploded { id, robots_destroyed, blocks_destroyed })
            }
            2 => Ok(Event::PlayerMoved { id: r.read_u8()?, position: Position::decode(r)? }),
            3 => Ok(Event::BlockPlaced { position: Position::decode(r)? }),
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

// ── Server → Client (§4.1) ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerToClient {
    Hello {
        server_name: String,
        player_count: u8,
        size_x: u16,
        size_y: u16,
        game_length: u16,
        explosion_radius: u16,
        bomb_timer: u16,
    },
    AcceptedPlayer { id: PlayerId, player: Player },
    GameStarted { players: BTreeMap<PlayerId, Player> },
    Turn { turn: u16, events: Vec<Event> },
    GameEnded { scores: BTreeMap<PlayerId, Score> },
}

impl ServerToClient {
    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        match self {
            ServerToClient::Hello {
                server_name,
                player_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
            } => {
                w.write_u8(0)?;
                write_string(w, server_name)?;
                w.write_u8(*player_count)?;
                w.write_u16(*size_x)?;
                w.write_u16(*size_y)?;
                w.write_u16(*game_length)?;
                w.write_u16(*explosion_radius)?;
                w.write_u16(*bomb_timer)?;
                Ok(())
            }
            ServerToClient::AcceptedPlayer { id, player } => {
                w.write_u8(1)?;
                w.write_u8(*id)?;
                player.encode(w)
            }
            ServerToClient::GameStarted { players } => {
                w.write_u8(2)?;
                write_map(w, players, |w, id, p| {
                    w.write_u8(*id)?;
                    p.encode(w)
                })
            }
            ServerToClient::Turn { turn, events } => {
                w.write_u8(3)?;
                w.write_u16(*turn)?;
                write_list(w, events, |w, e| e.encode(w))
            }
            ServerToClient::GameEnded { scores } => {
                w.write_u8(4)?;
                write_map(w, scores, |w, id, s| {
                    w.write_u8(*id)?;
                    w.write_u32(*s)?;
                    Ok(())
                })
            }
        }
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        match r.read_u8()? {
            0 => Ok(ServerToClient::Hello {
                server_name: read_string(r)?,
                player_count: r.read_u8()?,
                size_x: r.read_u16()?,
                size_y: r.read_u16()?,
                game_length: r.read_u16()?,
                explosion_radius: r.read_u16()?,
                bomb_timer: r.read_u16()?,
            }),
            1 => Ok(ServerToClient::AcceptedPlayer { id: r.read_u8()?, player: Player::decode(r)? }),
            2 => Ok(ServerToClient::GameStarted {
                players: read_map(r, |r| Ok((r.read_u8()?, Player::decode(r)?)))?,
            }),
            3 => Ok(ServerToClient::Turn {
                turn: r.read_u16()?,
                events: read_list(r, Event::decode)?,
            }),
            4 => Ok(ServerToClient::GameEnded {
                scores: read_map(r, |r| Ok((r.read_u8()?, r.read_u32()?)))?,
            }),
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

// ── Frontend → Client (§4.1) ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendToClient {
    PlaceBomb,
    PlaceBlock,
    Move(Direction),
}

impl FrontendToClient {
    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        match self {
            FrontendToClient::PlaceBomb => w.write_u8(0).map_err(Into::into),
            FrontendToClient::PlaceBlock => w.write_u8(1).map_err(Into::into),
            FrontendToClient::Move(dir) => {
                w.write_u8(2)?;
                w.write_u8(dir.tag())?;
                Ok(())
            }
        }
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        match r.read_u8()? {
            0 => Ok(FrontendToClient::PlaceBomb),
            1 => Ok(FrontendToClient::PlaceBlock),
            2 => Ok(FrontendToClient::Move(Direction::from_tag(r.read_u8()?)?)),
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

// ── Client → Frontend (§4.1) ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientToFrontend {
    Lobby {
        server_name: String,
        player_count: u8,
        size_x: u16,
        size_y: u16,
        game_length: u16,
        explosion_radius: u16,
        bomb_timer: u16,
        players: BTreeMap<PlayerId, Player>,
    },
    Game {
        server_name: String,
        size_x: u16,
        size_y: u16,
        game_length: u16,
        turn: u16,
        players: BTreeMap<PlayerId, Player>,
        player_positions: BTreeMap<PlayerId, Position>,
        blocks: Vec<Position>,
        bombs: Vec<Bomb>,
        explosions: Vec<Position>,
        scores: BTreeMap<PlayerId, Score>,
    },
}

impl ClientToFrontend {
    pub fn encode(&self, w: &mut dyn WireWrite) -> Result<(), CodecError> {
        match self {
            ClientToFrontend::Lobby {
                server_name,
                player_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
                players,
            } => {
                w.write_u8(0)?;
                write_string(w, server_name)?;
                w.write_u8(*player_count)?;
                w.write_u16(*size_x)?;
                w.write_u16(*size_y)?;
                w.write_u16(*game_length)?;
                w.write_u16(*explosion_radius)?;
                w.write_u16(*bomb_timer)?;
                write_map(w, players, |w, id, p| {
                    w.write_u8(*id)?;
                    p.encode(w)
                })
            }
            ClientToFrontend::Game {
                server_name,
                size_x,
                size_y,
                game_length,
                turn,
                players,
                player_positions,
                blocks,
                bombs,
                explosions,
                scores,
            } => {
                w.write_u8(1)?;
                write_string(w, server_name)?;
                w.write_u16(*size_x)?;
                w.write_u16(*size_y)?;
                w.write_u16(*game_length)?;
                w.write_u16(*turn)?;
                write_map(w, players, |w, id, p| {
                    w.write_u8(*id)?;
                    p.encode(w)
                })?;
                write_map(w, player_positions, |w, id, p| {
                    w.write_u8(*id)?;
                    p.encode(w)
                })?;
                write_list(w, blocks, |w, p| p.encode(w))?;
                write_list(w, bombs, |w, b| b.encode(w))?;
                write_list(w, explosions, |w, p| p.encode(w))?;
                write_map(w, scores, |w, id, s| {
                    w.write_u8(*id)?;
                    w.write_u32(*s)?;
                    Ok(())
                })
            }
        }
    }

    pub fn decode(r: &mut dyn WireRead) -> Result<Self, CodecError> {
        match r.read_u8()? {
            0 => Ok(ClientToFrontend::Lobby {
                server_name: read_string(r)?,
                player_count: r.read_u8()?,
                size_x: r.read_u16()?,
                size_y: r.read_u16()?,
                game_length: r.read_u16()?,
                explosion_radius: r.read_u16()?,
                bomb_timer: r.read_u16()?,
                players: read_map(r, |r| Ok((r.read_u8()?, Player::decode(r)?)))?,
            }),
            1 => Ok(ClientToFrontend::Game {
                server_name: read_string(r)?,
                size_x: r.read_u16()?,
                size_y: r.read_u16()?,
                game_length: r.read_u16()?,
                turn: r.read_u16()?,
                players: read_map(r, |r| Ok((r.read_u8()?, Player::decode(r)?)))?,
                player_positions: read_map(r, |r| Ok((r.read_u8()?, Position::decode(r)?)))?,
                blocks: read_list(r, Position::decode)?,
                bombs: read_list(r, Bomb::decode)?,
                explosions: read_list(r, Position::decode)?,
                scores: read_map(r, |r| Ok((r.read_u8()?, r.read_u32()?)))?,
            }),
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }
}

#[cfg(test)]
pub(crate) mod mem {
    //! An in-memory `WireRead`/`WireWrite` implementation for unit and
    //! property tests that don't need a real socket.
    use crate::error::TransportError;
    use crate::transport::{WireRead, WireWrite};

    #[derive(Default)]
    pub struct MemBuf {
        data: Vec<u8>,
        pos: usize,
    }

    impl MemBuf {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn has_more(&self) -> bool {
            self.pos < self.data.len()
        }
    }

    impl WireRead for MemBuf {
        fn read_u8(&mut self) -> Result<u8, TransportError> {
            Ok(self.read_bytes(1)?[0])
        }

        fn read_u16(&mut self) -> Result<u16, TransportError> {
            let b = self.read_bytes(2)?;
            Ok(u16::from_be_bytes([b[0], b[1]]))
        }

        fn read_u32(&mut self) -> Result<u32, TransportError> {
            let b = self.read_bytes(4)?;
            Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        }

        fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
            if self.data.len() - self.pos < len {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "short buffer",
                )));
            }
            let out = self.data[self.pos..self.pos + len].to_vec();
            self.pos += len;
            Ok(out)
        }
    }

    impl WireWrite for MemBuf {
        fn write_u8(&mut self, v: u8) -> Result<(), TransportError> {
            self.data.push(v);
            Ok(())
        }

        fn write_u16(&mut self, v: u16) -> Result<(), TransportError> {
            self.data.extend_from_slice(&v.to_be_bytes());
            Ok(())
        }

        fn write_u32(&mut self, v: u32) -> Result<(), TransportError> {
            self.data.extend_from_slice(&v.to_be_bytes());
            Ok(())
        }

        fn write_bytes(&mut self, b: &[u8]) -> Result<(), TransportError> {
            self.data.extend_from_slice(b);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mem::MemBuf;
    use super::*;
    use proptest::prelude::*;

    fn roundtrip_client_to_server(msg: &ClientToServer) -> ClientToServer {
        let mut buf = MemBuf::new();
        msg.encode(&mut buf).unwrap();
        ClientToServer::decode(&mut buf).unwrap()
    }

    #[test]
    fn join_roundtrips() {
        let msg = ClientToServer::Join("alice".to_string());
        assert_eq!(roundtrip_client_to_server(&msg), msg);
    }

    #[test]
    fn place_bomb_is_tag_only() {
        let mut buf = MemBuf::new();
        ClientToServer::PlaceBomb.encode(&mut buf).unwrap();
        assert_eq!(ClientToServer::decode(&mut buf).unwrap(), ClientToServer::PlaceBomb);
    }

    #[test]
    fn move_roundtrips_all_directions() {
        for dir in [Direction::Up, Direction::Right, Direction::Down, Direction::Left] {
            let msg = ClientToServer::Move(dir);
            assert_eq!(roundtrip_client_to_server(&msg), msg);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = MemBuf::new();
        buf.write_u8(200).unwrap();
        assert!(matches!(ClientToServer::decode(&mut buf), Err(CodecError::UnknownTag(200))));
    }

    #[test]
    fn direction_rejects_out_of_range_tag() {
        assert!(Direction::from_tag(4).is_err());
        assert!(Direction::from_tag(3).is_ok());
    }

    #[test]
    fn truncated_input_fails() {
        let mut buf = MemBuf::new();
        buf.write_u8(3).unwrap(); // Move tag, but no direction byte follows
        assert!(ClientToServer::decode(&mut buf).is_err());
    }

    #[test]
    fn event_bomb_exploded_roundtrips() {
        let msg = Event::BombExploded {
            id: 7,
            robots_destroyed: vec![0, 2, 3],
            blocks_destroyed: vec![Position::new(1, 1), Position::new(4, 4)],
        };
        let mut buf = MemBuf::new();
        msg.encode(&mut buf).unwrap();
        assert_eq!(Event::decode(&mut buf).unwrap(), msg);
    }

    #[test]
    fn server_hello_roundtrips() {
        let msg = ServerToClient::Hello {
            server_name: "arena".to_string(),
            player_count: 4,
            size_x: 20,
            size_y: 20,
            game_length: 300,
            explosion_radius: 3,
            bomb_timer: 5,
        };
        let mut buf = MemBuf::new();
        msg.encode(&mut buf).unwrap();
        assert_eq!(ServerToClient::decode(&mut buf).unwrap(), msg);
    }

    #[test]
    fn string_over_255_bytes_is_rejected() {
        let long = "x".repeat(256);
        let mut buf = MemBuf::new();
        assert!(write_string(&mut buf, &long).is_err());
    }

    fn position_strategy() -> impl Strategy<Value = Position> {
        (any::<u16>(), any::<u16>()).prop_map(|(x, y)| Position::new(x, y))
    }

    fn direction_strategy() -> impl Strategy<Value = Direction> {
        prop_oneof![
            Just(Direction::Up),
            Just(Direction::Right),
            Just(Direction::Down),
            Just(Direction::Left),
        ]
    }

    fn client_to_server_strategy() -> impl Strategy<Value = ClientToServer> {
        prop_oneof![
            "[a-zA-Z0-9]{0,32}".prop_map(ClientToServer::Join),
            Just(ClientToServer::PlaceBomb),
            Just(ClientToServer::PlaceBlock),
            direction_strategy().prop_map(ClientToServer::Move),
        ]
    }

    proptest! {
        #[test]
        fn prop_client_to_server_roundtrips(msg in client_to_server_strategy()) {
            prop_assert_eq!(roundtrip_client_to_server(&msg), msg);
        }

        #[test]
        fn prop_position_roundtrips(pos in position_strategy()) {
            let mut buf = MemBuf::new();
            pos.encode(&mut buf).unwrap();
            prop_assert_eq!(Position::decode(&mut buf).unwrap(), pos);
        }

        #[test]
        fn prop_event_player_moved_roundtrips(id: u8, pos in position_strategy()) {
            let msg = Event::PlayerMoved { id, position: pos };
            let mut buf = MemBuf::new();
            msg.encode(&mut buf).unwrap();
            prop_assert_eq!(Event::decode(&mut buf).unwrap(), msg);
        }
    }
}

//! CLI option parsing for both binaries (§6). A thin collaborator by
//! design: `clap`'s derive macros do the flag plumbing, and the only
//! nontrivial logic here is the last-colon address split called out
//! explicitly below.

use crate::error::OptionsError;
use clap::Parser;

/// Split `HOST:PORT` on the *last* colon, so bracket-less IPv6 is out of
/// scope but a hostname or IPv4 literal containing no colon of its own
/// parses unambiguously.
pub fn split_address(addr: &str) -> Result<(String, String), OptionsError> {
    match addr.rfind(':') {
        Some(idx) if idx > 0 && idx + 1 < addr.len() => {
            Ok((addr[..idx].to_string(), addr[idx + 1..].to_string()))
        }
        _ => Err(OptionsError::InvalidAddress(addr.to_string())),
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "robots-server",
    version,
    about = "Bomb-placing-robots game server — lobby, deterministic simulation, fan-out."
)]
pub struct ServerArgs {
    /// Bomb fuse length, in turns
    #[arg(short = 'b', long = "bomb-timer")]
    pub bomb_timer: u16,

    /// Number of players required to start a game
    #[arg(short = 'c', long = "players-count")]
    pub players_count: u8,

    /// Duration of a turn, in milliseconds
    #[arg(short = 'd', long = "turn-duration")]
    pub turn_duration: u64,

    /// Blast radius of an explosion, in cells
    #[arg(short = 'e', long = "explosion-radius")]
    pub explosion_radius: u16,

    /// Number of blocks scattered at game start
    #[arg(short = 'k', long = "initial-blocks")]
    pub initial_blocks: u16,

    /// Game length, in turns
    #[arg(short = 'l', long = "game-length")]
    pub game_length: u16,

    /// Name broadcast to clients in the Hello message
    #[arg(short = 'n', long = "server-name")]
    pub server_name: String,

    /// TCP port to listen on
    #[arg(short = 'p', long = "port")]
    pub port: u16,

    /// PRNG seed; defaults to a value derived from system time
    #[arg(short = 's', long = "seed")]
    pub seed: Option<u32>,

    /// Board width, in cells
    #[arg(short = 'x', long = "size-x")]
    pub size_x: u16,

    /// Board height, in cells
    #[arg(short = 'y', long = "size-y")]
    pub size_y: u16,

    /// Increase output verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ServerArgs {
    /// Validates the numeric bounds the original CLI enforced
    /// (`bound_check`): certain options must be non-zero.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.players_count == 0 {
            return Err(OptionsError::ZeroPlayers);
        }
        if self.game_length == 0 {
            return Err(OptionsError::ZeroGameLength);
        }
        if self.bomb_timer == 0 {
            return Err(OptionsError::ZeroBombTimer);
        }
        if self.port == 0 {
            return Err(OptionsError::ZeroPort);
        }
        if self.size_x == 0 {
            return Err(OptionsError::ZeroSizeX);
        }
        if self.size_y == 0 {
            return Err(OptionsError::ZeroSizeY);
        }
        if self.server_name.len() > 255 {
            return Err(OptionsError::ServerNameTooLong);
        }
        Ok(())
    }

    pub fn resolved_seed(&self) -> u32 {
        self.seed.unwrap_or_else(crate::rng::time_derived_seed)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "robots-client",
    version,
    about = "Proxy client bridging an authoritative server and a local frontend."
)]
pub struct ClientArgs {
    /// Frontend address (HOST:PORT) to send state datagrams to
    #[arg(short = 'd', long = "gui-address")]
    pub gui_address: String,

    /// Game server address (HOST:PORT) to connect to
    #[arg(short = 's', long = "server-address")]
    pub server_address: String,

    /// Player name to Join with
    #[arg(short = 'n', long = "player-name")]
    pub player_name: String,

    /// Local UDP port the frontend talks to
    #[arg(short = 'p', long = "port")]
    pub port: u16,

    /// Increase output verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ClientArgs {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.player_name.len() > 255 {
            return Err(OptionsError::ServerNameTooLong);
        }
        if self.port == 0 {
            return Err(OptionsError::ZeroPort);
        }
        Ok(())
    }
}

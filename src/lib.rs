//! Core of the bomb-placing-robots multiplayer system: the wire codec, the
//! two transports it rides on, the server's authoritative world and turn
//! engine, the per-client fan-out threads, and the proxy client's
//! materialized state. Binaries in `src/bin/` wire these together with CLI
//! parsing and logging.

pub mod client_state;
pub mod codec;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod options;
pub mod rng;
pub mod transport;
pub mod world;

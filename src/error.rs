//! Shared error types for the wire codec, the transports, and CLI options.

use thiserror::Error;

/// A transport-level failure. Any short read or write is fatal — the owning
/// thread tears down its connection rather than attempt to resynchronize.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport closed")]
    Closed,

    #[error("datagram exceeds maximum size of {max} bytes")]
    DatagramTooLarge { max: usize },
}

/// A codec-level failure: the bytes on the wire don't describe a valid
/// message. Fatal for the message being decoded; on a reliable stream this
/// terminates the connection, on a datagram it discards just that datagram.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("string exceeds 255 bytes ({0})")]
    StringTooLong(usize),

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("{type_name} tag {tag} is out of range")]
    InvalidEnumTag { type_name: &'static str, tag: u8 },
}

/// A startup-time failure parsing CLI options. Always fatal for the process.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid address {0:?}: expected HOST:PORT")]
    InvalidAddress(String),

    #[error("players-count must be at least 1")]
    ZeroPlayers,

    #[error("game-length must be at least 1")]
    ZeroGameLength,

    #[error("bomb-timer must be at least 1")]
    ZeroBombTimer,

    #[error("port must be at least 1")]
    ZeroPort,

    #[error("size-x must be at least 1")]
    ZeroSizeX,

    #[error("size-y must be at least 1")]
    ZeroSizeY,

    #[error("server-name exceeds 255 bytes")]
    ServerNameTooLong,
}

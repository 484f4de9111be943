//! Error types for the audio transport engine

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Packet framing/validation errors
///
/// All variants are recoverable: the caller drops the packet, counts it as
/// lost, and keeps going. Nothing here ever unwinds a session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("Bad magic constant")]
    BadMagic,

    #[error("Packet shorter than declared length")]
    Truncated,

    #[error("Payload checksum mismatch")]
    Corrupt,
}

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Fatal at startup: the session cannot come up without its socket.
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    /// Recoverable: counted as loss, broken peers are evicted.
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("Transport not started")]
    NotStarted,
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session is not running")]
    NotRunning,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

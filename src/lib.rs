//! # Car Audio Transport
//!
//! Real-time adaptive audio transport between a car head unit and the
//! assistant backend, over UDP (best effort) or TCP (connection oriented).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            HEAD UNIT (sender)                        │
//! │  ┌──────────────┐    ┌────────────────┐    ┌────────────────────┐   │
//! │  │ Capture      │───▶│ Delta Codec    │───▶│ Packet Codec       │   │
//! │  │ (PCM frames) │    │ (codec::delta) │    │ (protocol::packet) │   │
//! │  └──────────────┘    └────────────────┘    └─────────┬──────────┘   │
//! │                                                      │              │
//! │                      ┌───────────────────────────────▼──────────┐   │
//! │                      │ Transport (network::udp / network::tcp)  │   │
//! │                      └───────────────────────────────┬──────────┘   │
//! └──────────────────────────────────────────────────────┼──────────────┘
//!                                                        │ unreliable net
//! ┌──────────────────────────────────────────────────────▼──────────────┐
//! │                          BACKEND (receiver)                         │
//! │  ┌──────────────────┐   ┌────────────────┐   ┌──────────────────┐  │
//! │  │ Packet Codec     │──▶│ Jitter Buffer  │──▶│ Chunk Assembler  │──▶ STT/VAD
//! │  │ (validate, drop) │   │ (buffer::jitter)   │ (buffer::chunk)  │  │
//! │  └──────────────────┘   └───────┬────────┘   └──────────────────┘  │
//! │                                 │ loss / latency / jitter           │
//! │  ┌──────────────────┐   ┌───────▼────────────┐                     │
//! │  │ Adaptive Quality │◀──│ Quality Monitor    │                     │
//! │  │ Controller       │   │ (quality::monitor) │                     │
//! │  └────────┬─────────┘   └────────────────────┘                     │
//! │           └──▶ profile switch ──▶ codec/framing params             │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Wake-word detection, VAD, STT/TTS and dialog flow are external
//! collaborators; this crate only moves validated, ordered audio.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod quality;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio transport
    pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

    /// Default channel count (mono voice)
    pub const DEFAULT_CHANNELS: u8 = 1;

    /// Default bit depth
    pub const DEFAULT_BIT_DEPTH: u8 = 16;

    /// Default UDP port for the inbound audio stream
    pub const DEFAULT_UDP_PORT: u16 = 5000;

    /// Conventional reply/broadcast port for the UDP backend (inbound + 1)
    pub const DEFAULT_UDP_REPLY_PORT: u16 = 5001;

    /// Default TCP listener port
    pub const DEFAULT_TCP_PORT: u16 = 5002;

    /// Maximum packet size for UDP
    pub const MAX_PACKET_SIZE: usize = 1472; // MTU - IP/UDP headers

    /// Default jitter buffer capacity (packets)
    pub const DEFAULT_JITTER_CAPACITY: usize = 64;

    /// Default quality assessment interval in milliseconds
    pub const DEFAULT_ASSESS_INTERVAL_MS: u64 = 2_000;

    /// Default profile-switch cooldown in milliseconds
    pub const DEFAULT_COOLDOWN_MS: u64 = 5_000;
}

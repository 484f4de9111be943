//! Payload compression codecs

pub mod delta;

pub use delta::{bytes_to_pcm, pcm_to_bytes, DeltaCodec};

//! Receive-side buffering: packet reordering and chunk assembly

pub mod chunk;
pub mod jitter;

pub use chunk::{AudioChunk, ChunkAssembler};
pub use jitter::{InsertOutcome, JitterBuffer, JitterEntry, JitterStats};

//! Chunk assembly for the downstream consumer
//!
//! Combines a few consecutive released packets into one decoded chunk so the
//! VAD/STT consumer sees fewer, larger buffers with stable metadata.

/// Ordered, decoded audio handed to the consumer
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u8,
    /// Chunk duration derived from sample count and format
    pub duration_ms: f32,
    /// Sequence of the first packet in the chunk
    pub first_sequence: u32,
    /// Capture timestamp of the first packet, sender epoch
    pub timestamp_ms: u32,
    /// Set when the chunk closes an utterance
    pub end_of_utterance: bool,
}

/// Accumulates released packets into consumer chunks
pub struct ChunkAssembler {
    /// Packets combined per chunk, clamped to 2-4
    chunk_packets: usize,
    sample_rate: u32,
    channels: u8,
    pending: Vec<i16>,
    pending_packets: usize,
    first_sequence: u32,
    first_timestamp_ms: u32,
}

impl ChunkAssembler {
    pub fn new(chunk_packets: usize, sample_rate: u32, channels: u8) -> Self {
        Self {
            chunk_packets: chunk_packets.clamp(2, 4),
            sample_rate,
            channels,
            pending: Vec::new(),
            pending_packets: 0,
            first_sequence: 0,
            first_timestamp_ms: 0,
        }
    }

    /// Adopt a new audio format (profile switch); pending data is flushed
    /// first so a chunk never mixes formats.
    pub fn set_format(&mut self, sample_rate: u32, channels: u8) -> Option<AudioChunk> {
        let flushed = self.flush();
        self.sample_rate = sample_rate;
        self.channels = channels;
        flushed
    }

    /// Append one released packet; returns a chunk when enough accumulated
    /// or the utterance ended.
    pub fn push(
        &mut self,
        sequence: u32,
        timestamp_ms: u32,
        samples: &[i16],
        end_of_utterance: bool,
    ) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            self.first_sequence = sequence;
            self.first_timestamp_ms = timestamp_ms;
        }
        self.pending.extend_from_slice(samples);
        self.pending_packets += 1;

        if self.pending_packets >= self.chunk_packets || end_of_utterance {
            self.emit(end_of_utterance)
        } else {
            None
        }
    }

    /// Emit whatever is pending (stream stop)
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            None
        } else {
            self.emit(false)
        }
    }

    fn emit(&mut self, end_of_utterance: bool) -> Option<AudioChunk> {
        if self.pending.is_empty() {
            return None;
        }

        let samples = std::mem::take(&mut self.pending);
        self.pending_packets = 0;

        let frames = samples.len() / self.channels.max(1) as usize;
        let duration_ms = frames as f32 * 1_000.0 / self.sample_rate as f32;

        Some(AudioChunk {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            duration_ms,
            first_sequence: self.first_sequence,
            timestamp_ms: self.first_timestamp_ms,
            end_of_utterance,
        })
    }
}

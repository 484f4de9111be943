//! Audio packet framing
//!
//! Fixed-header wire format, big-endian throughout:
//!
//! ```text
//! Base header (16 bytes):
//!   magic:u32  sequence:u32  timestamp:u32(ms)  payload_len:u16  flags:u8  checksum:u8
//! Enhanced header (24 bytes): base header followed by
//!   profile_id:u16  sample_rate:u16  bit_depth:u8  channels:u8  reserved:u16(zero)
//! ```
//!
//! The checksum is an additive mod-256 fold over the payload. It reliably
//! catches single-byte corruption but is not CRC-strength; changing the
//! algorithm would break wire compatibility, so it stays weak on purpose.
//!
//! Flags bit 3 marks the enhanced header so datagram and byte-stream
//! transports can both frame a packet without guessing its length.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FramingError;

/// Protocol magic constant ("CARA"). Foreign traffic is rejected on it.
pub const PROTOCOL_MAGIC: u32 = 0x4341_5241;

/// Base header size in bytes
pub const BASE_HEADER_LEN: usize = 16;

/// Enhanced header size in bytes
pub const ENHANCED_HEADER_LEN: usize = 24;

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const FLAG_PRIORITY: u8 = 0b0000_0010;
const FLAG_END_OF_UTTERANCE: u8 = 0b0000_0100;
const FLAG_EXTENDED: u8 = 0b0000_1000;

/// Packet flags bitfield
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags {
    /// Payload went through the delta compressor
    pub compressed: bool,
    /// High-priority frame (e.g. wake-word tail)
    pub priority: bool,
    /// Final packet of the current utterance
    pub end_of_utterance: bool,
}

impl PacketFlags {
    fn to_byte(self, extended: bool) -> u8 {
        let mut b = 0u8;
        if self.compressed {
            b |= FLAG_COMPRESSED;
        }
        if self.priority {
            b |= FLAG_PRIORITY;
        }
        if self.end_of_utterance {
            b |= FLAG_END_OF_UTTERANCE;
        }
        if extended {
            b |= FLAG_EXTENDED;
        }
        b
    }

    fn from_byte(b: u8) -> Self {
        Self {
            compressed: b & FLAG_COMPRESSED != 0,
            priority: b & FLAG_PRIORITY != 0,
            end_of_utterance: b & FLAG_END_OF_UTTERANCE != 0,
        }
    }
}

/// Enhanced-header metadata describing the sender's active profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderExtension {
    pub profile_id: u16,
    pub sample_rate: u16,
    pub bit_depth: u8,
    pub channels: u8,
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u32,
    pub timestamp_ms: u32,
    pub payload_len: u16,
    pub flags: PacketFlags,
    pub checksum: u8,
    pub extension: Option<HeaderExtension>,
}

impl PacketHeader {
    /// Header length on the wire
    pub fn len(&self) -> usize {
        if self.extension.is_some() {
            ENHANCED_HEADER_LEN
        } else {
            BASE_HEADER_LEN
        }
    }
}

/// Additive mod-256 checksum over the payload
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Encode a payload into a framed packet
///
/// With an extension the enhanced 24-byte header is produced, otherwise the
/// base 16-byte header.
pub fn encode(
    payload: &[u8],
    sequence: u32,
    timestamp_ms: u32,
    flags: PacketFlags,
    extension: Option<HeaderExtension>,
) -> Bytes {
    debug_assert!(payload.len() <= u16::MAX as usize);

    let header_len = if extension.is_some() {
        ENHANCED_HEADER_LEN
    } else {
        BASE_HEADER_LEN
    };
    let mut buf = BytesMut::with_capacity(header_len + payload.len());

    buf.put_u32(PROTOCOL_MAGIC);
    buf.put_u32(sequence);
    buf.put_u32(timestamp_ms);
    buf.put_u16(payload.len() as u16);
    buf.put_u8(flags.to_byte(extension.is_some()));
    buf.put_u8(checksum(payload));

    if let Some(ext) = extension {
        buf.put_u16(ext.profile_id);
        buf.put_u16(ext.sample_rate);
        buf.put_u8(ext.bit_depth);
        buf.put_u8(ext.channels);
        buf.put_u16(0); // reserved
    }

    buf.put_slice(payload);
    buf.freeze()
}

/// Decode and validate a framed packet
///
/// Returns the header plus a borrowed payload slice. Corrupt packets must be
/// dropped by the caller and counted as lost, never passed downstream.
pub fn decode(packet: &[u8]) -> Result<(PacketHeader, &[u8]), FramingError> {
    if packet.len() < BASE_HEADER_LEN {
        return Err(FramingError::Truncated);
    }

    let mut buf = packet;
    if buf.get_u32() != PROTOCOL_MAGIC {
        return Err(FramingError::BadMagic);
    }

    let sequence = buf.get_u32();
    let timestamp_ms = buf.get_u32();
    let payload_len = buf.get_u16();
    let flag_byte = buf.get_u8();
    let stored_checksum = buf.get_u8();

    let extension = if flag_byte & FLAG_EXTENDED != 0 {
        if packet.len() < ENHANCED_HEADER_LEN {
            return Err(FramingError::Truncated);
        }
        let profile_id = buf.get_u16();
        let sample_rate = buf.get_u16();
        let bit_depth = buf.get_u8();
        let channels = buf.get_u8();
        let _reserved = buf.get_u16();
        Some(HeaderExtension {
            profile_id,
            sample_rate,
            bit_depth,
            channels,
        })
    } else {
        None
    };

    if buf.len() != payload_len as usize {
        return Err(FramingError::Truncated);
    }

    if checksum(buf) != stored_checksum {
        return Err(FramingError::Corrupt);
    }

    let header = PacketHeader {
        sequence,
        timestamp_ms,
        payload_len,
        flags: PacketFlags::from_byte(flag_byte),
        checksum: stored_checksum,
        extension,
    };

    Ok((header, buf))
}

/// Whether a raw flag byte marks the enhanced header
///
/// Stream transports need this to know how many header bytes to read before
/// the payload; datagram transports get the whole packet at once.
#[inline]
pub fn flags_extended(byte: u8) -> bool {
    byte & FLAG_EXTENDED != 0
}

/// Wraparound-safe "is `a` strictly after `b`" for u32 sequence numbers
#[inline]
pub fn seq_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// Wraparound-safe "is `a` strictly before `b`"
#[inline]
pub fn seq_older(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Signed distance from `b` to `a`, wraparound-safe
#[inline]
pub fn seq_distance(a: u32, b: u32) -> i32 {
    a.wrapping_sub(b) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flags() -> PacketFlags {
        PacketFlags {
            compressed: true,
            priority: false,
            end_of_utterance: true,
        }
    }

    #[test]
    fn test_roundtrip_base() {
        let payload = b"hello audio world";
        let encoded = encode(payload, 42, 123_456, flags(), None);
        assert_eq!(encoded.len(), BASE_HEADER_LEN + payload.len());

        let (header, decoded) = decode(&encoded).unwrap();
        assert_eq!(header.sequence, 42);
        assert_eq!(header.timestamp_ms, 123_456);
        assert_eq!(header.payload_len as usize, payload.len());
        assert_eq!(header.flags, flags());
        assert!(header.extension.is_none());
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_roundtrip_enhanced() {
        let ext = HeaderExtension {
            profile_id: 2,
            sample_rate: 16_000,
            bit_depth: 16,
            channels: 1,
        };
        let payload = vec![7u8; 320];
        let encoded = encode(&payload, u32::MAX, 1, PacketFlags::default(), Some(ext));
        assert_eq!(encoded.len(), ENHANCED_HEADER_LEN + payload.len());

        let (header, decoded) = decode(&encoded).unwrap();
        assert_eq!(header.sequence, u32::MAX);
        assert_eq!(header.extension, Some(ext));
        assert_eq!(decoded, &payload[..]);
    }

    #[test]
    fn test_empty_payload() {
        let encoded = encode(&[], 0, 0, PacketFlags::default(), None);
        let (header, payload) = decode(&encoded).unwrap();
        assert_eq!(header.payload_len, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let mut encoded = encode(b"x", 0, 0, PacketFlags::default(), None).to_vec();
        encoded[0] ^= 0xFF;
        assert_eq!(decode(&encoded), Err(FramingError::BadMagic));
    }

    #[test]
    fn test_truncated() {
        let encoded = encode(b"payload", 9, 9, PacketFlags::default(), None);
        assert_eq!(decode(&encoded[..10]), Err(FramingError::Truncated));
        // Full header but missing payload bytes
        assert_eq!(
            decode(&encoded[..encoded.len() - 2]),
            Err(FramingError::Truncated)
        );
    }

    #[test]
    fn test_every_payload_byte_flip_detected() {
        let payload = b"the quick brown fox jumps over the lazy dog";
        let encoded = encode(payload, 1, 1, PacketFlags::default(), None);

        for i in BASE_HEADER_LEN..encoded.len() {
            for bit in 0..8 {
                let mut corrupted = encoded.to_vec();
                corrupted[i] ^= 1 << bit;
                assert_eq!(
                    decode(&corrupted),
                    Err(FramingError::Corrupt),
                    "flip at byte {} bit {} not detected",
                    i,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_sequence_wraparound_compare() {
        assert!(seq_newer(1, 0));
        assert!(seq_newer(0, u32::MAX));
        assert!(seq_older(u32::MAX, 0));
        assert!(seq_older(u32::MAX - 5, 3));
        assert!(!seq_newer(5, 5));
        assert_eq!(seq_distance(2, u32::MAX), 3);
        assert_eq!(seq_distance(u32::MAX, 2), -3);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            payload in proptest::collection::vec(any::<u8>(), 0..1024),
            sequence in any::<u32>(),
            timestamp in any::<u32>(),
        ) {
            let encoded = encode(&payload, sequence, timestamp, flags(), None);
            let (header, decoded) = decode(&encoded).unwrap();
            prop_assert_eq!(header.sequence, sequence);
            prop_assert_eq!(header.timestamp_ms, timestamp);
            prop_assert_eq!(header.payload_len as usize, payload.len());
            prop_assert_eq!(decoded, &payload[..]);
        }
    }
}

//! Wire protocol: packet framing and quality profiles

pub mod packet;
pub mod profile;

pub use packet::{
    decode, encode, seq_distance, seq_newer, seq_older, HeaderExtension, PacketFlags,
    PacketHeader, BASE_HEADER_LEN, ENHANCED_HEADER_LEN, PROTOCOL_MAGIC,
};
pub use profile::{Compression, QualityProfile};

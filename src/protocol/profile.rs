//! Quality profiles
//!
//! A fixed, totally ordered set of parameter bundles. Adaptation walks the
//! order one step at a time; there is no string-keyed lookup anywhere.

use serde::{Deserialize, Serialize};

use crate::protocol::packet::HeaderExtension;

/// Compression variant applied to packet payloads under a profile
///
/// Encoder and decoder must agree on the variant; the receiver derives it
/// from the profile id carried in the enhanced header, never by guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Payload is raw PCM
    Off,
    /// Plain neighbor differences, no predictor feedback
    Legacy,
    /// First-order predictive delta with feedback rate ~0.1
    Adaptive,
}

/// Ordered audio quality profiles, lowest bandwidth first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityProfile {
    UltraLow,
    Low,
    Medium,
    High,
    UltraHigh,
}

impl QualityProfile {
    /// All profiles in upgrade order
    pub const ALL: [QualityProfile; 5] = [
        QualityProfile::UltraLow,
        QualityProfile::Low,
        QualityProfile::Medium,
        QualityProfile::High,
        QualityProfile::UltraHigh,
    ];

    /// Sample rate in Hz
    pub fn sample_rate(self) -> u32 {
        match self {
            QualityProfile::UltraLow => 8_000,
            QualityProfile::Low => 8_000,
            QualityProfile::Medium => 16_000,
            QualityProfile::High => 24_000,
            QualityProfile::UltraHigh => 48_000,
        }
    }

    /// Bit depth of transported samples
    pub fn bit_depth(self) -> u8 {
        match self {
            QualityProfile::UltraLow => 8,
            _ => 16,
        }
    }

    /// Samples per outgoing frame
    pub fn chunk_size(self) -> usize {
        match self {
            QualityProfile::UltraLow => 160,
            QualityProfile::Low => 160,
            QualityProfile::Medium => 320,
            QualityProfile::High => 480,
            QualityProfile::UltraHigh => 960,
        }
    }

    /// Compression variant for this profile
    ///
    /// Low-bandwidth profiles pay the CPU for the adaptive predictor; the
    /// high-rate profiles ship raw PCM.
    pub fn compression(self) -> Compression {
        match self {
            QualityProfile::UltraLow => Compression::Adaptive,
            QualityProfile::Low => Compression::Adaptive,
            QualityProfile::Medium => Compression::Legacy,
            QualityProfile::High => Compression::Off,
            QualityProfile::UltraHigh => Compression::Off,
        }
    }

    /// Whether payloads are compressed under this profile
    pub fn compression_enabled(self) -> bool {
        self.compression() != Compression::Off
    }

    /// Wire identifier carried in the enhanced header
    pub fn wire_id(self) -> u16 {
        match self {
            QualityProfile::UltraLow => 0,
            QualityProfile::Low => 1,
            QualityProfile::Medium => 2,
            QualityProfile::High => 3,
            QualityProfile::UltraHigh => 4,
        }
    }

    /// Resolve a wire identifier back to a profile
    pub fn from_wire_id(id: u16) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// One step up the order; `None` at the top
    pub fn step_up(self) -> Option<Self> {
        Self::from_wire_id(self.wire_id() + 1)
    }

    /// One step down the order; `None` at the bottom
    pub fn step_down(self) -> Option<Self> {
        self.wire_id().checked_sub(1).and_then(Self::from_wire_id)
    }

    /// Enhanced-header metadata for this profile
    pub fn header_extension(self, channels: u8) -> HeaderExtension {
        HeaderExtension {
            profile_id: self.wire_id(),
            sample_rate: self.sample_rate() as u16,
            bit_depth: self.bit_depth(),
            channels,
        }
    }
}

impl Default for QualityProfile {
    fn default() -> Self {
        QualityProfile::Medium
    }
}

impl std::fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QualityProfile::UltraLow => "ultra-low",
            QualityProfile::Low => "low",
            QualityProfile::Medium => "medium",
            QualityProfile::High => "high",
            QualityProfile::UltraHigh => "ultra-high",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for pair in QualityProfile::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].sample_rate() <= pair[1].sample_rate());
        }
    }

    #[test]
    fn test_stepping() {
        assert_eq!(QualityProfile::UltraLow.step_down(), None);
        assert_eq!(QualityProfile::UltraHigh.step_up(), None);
        assert_eq!(
            QualityProfile::Medium.step_up(),
            Some(QualityProfile::High)
        );
        assert_eq!(
            QualityProfile::Medium.step_down(),
            Some(QualityProfile::Low)
        );
    }

    #[test]
    fn test_wire_id_roundtrip() {
        for profile in QualityProfile::ALL {
            assert_eq!(QualityProfile::from_wire_id(profile.wire_id()), Some(profile));
        }
        assert_eq!(QualityProfile::from_wire_id(5), None);
    }

    #[test]
    fn test_header_extension() {
        let ext = QualityProfile::High.header_extension(2);
        assert_eq!(ext.profile_id, 3);
        assert_eq!(ext.sample_rate, 24_000);
        assert_eq!(ext.bit_depth, 16);
        assert_eq!(ext.channels, 2);
    }
}

//! Network quality measurement and adaptation

pub mod controller;
pub mod monitor;

pub use controller::{AdaptiveQualityController, AdjustmentReason, ProfileChange};
pub use monitor::{NetworkMetrics, NetworkQualityMonitor, QualityCategory};

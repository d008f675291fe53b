use serde::{Deserialize, Serialize};

/// Which capture stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mic,
    System,
}

/// An input device as reported by the backend catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Position in the backend's enumeration order; stable for one process run.
    pub index: usize,
    pub name: String,
    pub channels: u16,
    pub default_sample_rate: u32,
    pub is_default: bool,
}

/// Stream format the engine requests from a capture provider.
///
/// Both sources are opened at the same rate so cross-source alignment can
/// stay length-based (no resampling layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Counters for debugging a capture session.
#[derive(Debug, Clone, Default)]
pub struct CaptureDiagnostics {
    pub mic_frames: u64,
    pub system_frames: u64,
    pub mic_samples: u64,
    pub system_samples: u64,
    pub windows_emitted: u64,
    pub drift_warnings: u64,
    pub last_drift_secs: Option<f64>,
}

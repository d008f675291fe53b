use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result returned when a recording session completes successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingResult {
    pub id: String,
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// SHA-256 hex digest of the finalized file.
    pub checksum: String,
    pub created_at: String,
}

impl RecordingResult {
    pub fn new(
        file_path: PathBuf,
        duration_secs: f64,
        sample_rate: u32,
        channels: u16,
        checksum: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path,
            duration_secs,
            sample_rate,
            channels,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

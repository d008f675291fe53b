use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::error::RecorderError;

/// Engine configuration: one flat document of DSP and lifecycle parameters.
///
/// Persisted as flat JSON. Unknown keys on disk are ignored, missing keys
/// fall back to the defaults below, and out-of-range values are clamped into
/// their valid ranges rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Capture and output sample rate in Hz, forced for both sources.
    pub sample_rate: u32,
    /// Output channel count. 1..=2; output files are written at this count.
    pub channels: u16,
    /// Specific input device index, or None for the system default.
    pub input_device: Option<usize>,
    /// Capture the system-output (loopback) source alongside the mic.
    pub system_audio_enabled: bool,

    /// Mic gain in dB. -20.0..=20.0.
    pub mic_gain_db: f32,
    /// System-source gain in dB. -40.0..=6.0.
    pub system_gain_db: f32,

    pub highpass_enabled: bool,
    /// High-pass cutoff in Hz. 20.0..=400.0.
    pub highpass_cutoff_hz: f32,

    /// Noise gate (applied to the mic source only).
    pub gate_enabled: bool,
    /// Gate threshold in dBFS. -80.0..=-10.0.
    pub gate_threshold_db: f32,
    /// 0.1..=100.0.
    pub gate_attack_ms: f32,
    /// 1.0..=1000.0.
    pub gate_release_ms: f32,
    /// 0.0..=2000.0.
    pub gate_hold_ms: f32,
    /// Minimum gate multiplier; the gate never fully silences. 0.0..=0.9.
    pub gate_floor: f32,

    pub echo_reduction_enabled: bool,
    /// Echo subtraction strength. 0.0..=0.8.
    pub echo_strength: f32,

    pub compressor_enabled: bool,
    /// -40.0..=0.0 dBFS.
    pub compressor_threshold_db: f32,
    /// 1.0..=20.0.
    pub compressor_ratio: f32,
    /// 0.0..=12.0 dB.
    pub compressor_makeup_db: f32,

    pub normalize_enabled: bool,
    /// Normalization target RMS in dBFS. -30.0..=-3.0.
    pub normalize_target_db: f32,

    /// Live window length in seconds. 2.0..=60.0.
    pub chunk_duration_secs: f32,
    /// Context repeated between consecutive windows, in seconds.
    /// Clamped below the window length.
    pub chunk_overlap_secs: f32,

    /// Directory for finalized recordings.
    pub output_dir: PathBuf,
    /// Directory for realtime chunk files.
    pub temp_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            input_device: None,
            system_audio_enabled: true,
            mic_gain_db: 0.0,
            system_gain_db: -8.0,
            highpass_enabled: true,
            highpass_cutoff_hz: 80.0,
            gate_enabled: true,
            gate_threshold_db: -45.0,
            gate_attack_ms: 5.0,
            gate_release_ms: 60.0,
            gate_hold_ms: 150.0,
            gate_floor: 0.1,
            echo_reduction_enabled: true,
            echo_strength: 0.5,
            compressor_enabled: true,
            compressor_threshold_db: -12.0,
            compressor_ratio: 3.0,
            compressor_makeup_db: 2.0,
            normalize_enabled: true,
            normalize_target_db: -6.0,
            chunk_duration_secs: 8.0,
            chunk_overlap_secs: 2.0,
            output_dir: PathBuf::from("data"),
            temp_dir: PathBuf::from("temp"),
        }
    }
}

impl RecorderConfig {
    /// Clamp every parameter into its valid range.
    pub fn clamped(mut self) -> Self {
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.channels = self.channels.clamp(1, 2);
        self.mic_gain_db = self.mic_gain_db.clamp(-20.0, 20.0);
        self.system_gain_db = self.system_gain_db.clamp(-40.0, 6.0);
        self.highpass_cutoff_hz = self.highpass_cutoff_hz.clamp(20.0, 400.0);
        self.gate_threshold_db = self.gate_threshold_db.clamp(-80.0, -10.0);
        self.gate_attack_ms = self.gate_attack_ms.clamp(0.1, 100.0);
        self.gate_release_ms = self.gate_release_ms.clamp(1.0, 1000.0);
        self.gate_hold_ms = self.gate_hold_ms.clamp(0.0, 2000.0);
        self.gate_floor = self.gate_floor.clamp(0.0, 0.9);
        self.echo_strength = self.echo_strength.clamp(0.0, 0.8);
        self.compressor_threshold_db = self.compressor_threshold_db.clamp(-40.0, 0.0);
        self.compressor_ratio = self.compressor_ratio.clamp(1.0, 20.0);
        self.compressor_makeup_db = self.compressor_makeup_db.clamp(0.0, 12.0);
        self.normalize_target_db = self.normalize_target_db.clamp(-30.0, -3.0);
        self.chunk_duration_secs = self.chunk_duration_secs.clamp(2.0, 60.0);
        // Overlap must leave a positive step between windows.
        self.chunk_overlap_secs = self
            .chunk_overlap_secs
            .clamp(0.0, self.chunk_duration_secs - 0.5);
        self
    }

    /// Interleaved samples per live window.
    pub fn chunk_samples(&self) -> usize {
        (self.chunk_duration_secs as f64 * self.sample_rate as f64) as usize
            * self.channels as usize
    }

    /// Interleaved samples the rolling buffers advance between windows.
    pub fn step_samples(&self) -> usize {
        let step = ((self.chunk_duration_secs - self.chunk_overlap_secs) as f64
            * self.sample_rate as f64) as usize
            * self.channels as usize;
        step.max(self.channels as usize)
    }

    /// Load from a JSON file, falling back to defaults.
    ///
    /// A missing file is the first-run case; a malformed one is logged and
    /// replaced by defaults. Either way the result is already clamped.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<RecorderConfig>(&text) {
                Ok(config) => config.clamped(),
                Err(e) => {
                    log::warn!("ignoring malformed config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Rewrite the whole document at `path`.
    pub fn save(&self, path: &Path) -> Result<(), RecorderError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| RecorderError::Storage(format!("create config dir: {}", e)))?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RecorderError::Config(format!("serialize config: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| RecorderError::Storage(format!("write config {}: {}", path.display(), e)))
    }
}

/// Shared configuration handle.
///
/// Readers take a cheap `Arc` snapshot; writers swap the whole snapshot, so
/// a concurrent window sees either the old or the new parameter set, never a
/// torn one.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<Mutex<Arc<RecorderConfig>>>,
}

impl SharedConfig {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<RecorderConfig> {
        Arc::clone(&self.inner.lock())
    }

    pub fn replace(&self, config: RecorderConfig) {
        *self.inner.lock() = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RecorderConfig::default();
        assert_eq!(config, config.clone().clamped());
    }

    #[test]
    fn clamp_pulls_values_into_range() {
        let config = RecorderConfig {
            mic_gain_db: 99.0,
            system_gain_db: -99.0,
            gate_floor: 4.0,
            echo_strength: 1.5,
            compressor_ratio: 0.0,
            chunk_duration_secs: 1.0,
            chunk_overlap_secs: 30.0,
            ..Default::default()
        }
        .clamped();

        assert_eq!(config.mic_gain_db, 20.0);
        assert_eq!(config.system_gain_db, -40.0);
        assert_eq!(config.gate_floor, 0.9);
        assert_eq!(config.echo_strength, 0.8);
        assert_eq!(config.compressor_ratio, 1.0);
        assert_eq!(config.chunk_duration_secs, 2.0);
        assert!(config.chunk_overlap_secs < config.chunk_duration_secs);
    }

    #[test]
    fn window_arithmetic() {
        let config = RecorderConfig::default();
        assert_eq!(config.chunk_samples(), 8 * 44_100 * 2);
        assert_eq!(config.step_samples(), 6 * 44_100 * 2);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig::load(&dir.path().join("absent.json"));
        assert_eq!(config, RecorderConfig::default());
    }

    #[test]
    fn load_ignores_unknown_keys_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "mic_gain_db": 500.0, "some_future_key": true }"#,
        )
        .unwrap();

        let config = RecorderConfig::load(&path);
        assert_eq!(config.mic_gain_db, 20.0);
        assert_eq!(config.sample_rate, 44_100);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut config = RecorderConfig::default();
        config.system_audio_enabled = false;
        config.normalize_target_db = -12.0;
        config.save(&path).unwrap();

        assert_eq!(RecorderConfig::load(&path), config);
    }

    #[test]
    fn shared_config_swaps_whole_snapshots() {
        let shared = SharedConfig::new(RecorderConfig::default());
        let before = shared.snapshot();

        let mut updated = RecorderConfig::default();
        updated.mic_gain_db = 6.0;
        shared.replace(updated);

        assert_eq!(before.mic_gain_db, 0.0);
        assert_eq!(shared.snapshot().mic_gain_db, 6.0);
    }
}

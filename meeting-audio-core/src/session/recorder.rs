//! Session orchestration: device lifecycles, capture, and final rendering.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};

use crate::capture::sync_buffer::SynchronizedCaptureBuffer;
use crate::models::audio_models::{CaptureDiagnostics, SourceKind, StreamSpec};
use crate::models::config::{RecorderConfig, SharedConfig};
use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecorderState;
use crate::processing::pipeline;
use crate::session::windower::{RealtimeChunkCallback, StreamingWindower};
use crate::storage::wav_writer::WavFileWriter;
use crate::traits::capture_provider::{AudioFrameCallback, CaptureHost, CaptureProvider};

/// Dual-source meeting recorder.
///
/// Owns the capture providers, the synchronized buffer, the optional
/// streaming windower, and final-file rendering. Callers drive it through
/// `start`/`stop` and react to emitted chunks and the finished file.
///
/// State machine: idle → recording → idle. `stop` while idle is a no-op.
pub struct AudioRecorder {
    host: Arc<dyn CaptureHost>,
    config: SharedConfig,
    config_path: PathBuf,
    state: RecorderState,
    buffer: Arc<SynchronizedCaptureBuffer>,
    mic: Option<Box<dyn CaptureProvider>>,
    system: Option<Box<dyn CaptureProvider>>,
    windower: Option<StreamingWindower>,
    realtime_callback: Option<RealtimeChunkCallback>,
    session_start: Option<Instant>,
    session_started_at: Option<DateTime<Local>>,
}

impl AudioRecorder {
    /// Create a recorder backed by `host`, loading persisted settings from
    /// `config_path` (a missing file means defaults).
    pub fn new(host: Arc<dyn CaptureHost>, config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let config = RecorderConfig::load(&config_path);

        // Auto-detection at construction: warn early if system capture was
        // requested but no loopback-capable device exists.
        if config.system_audio_enabled && host.list_loopback_devices().is_empty() {
            log::info!("no loopback-capable device detected; system audio will be unavailable");
        }

        Self {
            host,
            config: SharedConfig::new(config),
            config_path,
            state: RecorderState::Idle,
            buffer: Arc::new(SynchronizedCaptureBuffer::new(false)),
            mic: None,
            system: None,
            windower: None,
            realtime_callback: None,
            session_start: None,
            session_started_at: None,
        }
    }

    /// Begin capturing.
    ///
    /// Microphone failure is fatal — recording never proceeds mic-less.
    /// System-audio capture is attempted through the backend's ordered
    /// strategy chain; total failure there degrades the session to mic-only
    /// with a logged warning. The windower worker is spawned only when a
    /// realtime callback is registered.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if !self.state.is_idle() {
            return Err(RecorderError::AlreadyRecording);
        }

        let cfg = self.config.snapshot();
        let spec = StreamSpec {
            sample_rate: cfg.sample_rate,
            channels: cfg.channels,
        };

        let mut mic = self
            .host
            .mic_provider(cfg.input_device)
            .map_err(|e| RecorderError::MicUnavailable(e.to_string()))?;

        // Fresh buffers every session; no audio state survives between runs.
        self.buffer = Arc::new(SynchronizedCaptureBuffer::new(
            self.realtime_callback.is_some(),
        ));

        let mic_buffer = Arc::clone(&self.buffer);
        let mic_callback: AudioFrameCallback =
            Arc::new(move |samples, _channels| mic_buffer.push(SourceKind::Mic, samples));
        mic.start(spec, mic_callback)
            .map_err(|e| RecorderError::MicUnavailable(e.to_string()))?;
        log::info!("microphone capture started: {}", mic.device_info().name);
        self.mic = Some(mic);

        if cfg.system_audio_enabled {
            self.system = self.start_system_capture(spec);
            if self.system.is_none() {
                log::warn!("no system-audio strategy succeeded; recording microphone only");
            }
        }

        if let Some(callback) = self.realtime_callback.clone() {
            self.windower = Some(StreamingWindower::spawn(
                Arc::clone(&self.buffer),
                self.config.clone(),
                callback,
            ));
        }

        self.session_start = Some(Instant::now());
        self.session_started_at = Some(Local::now());
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Walk the ordered system-capture strategies until one opens.
    fn start_system_capture(&mut self, spec: StreamSpec) -> Option<Box<dyn CaptureProvider>> {
        for mut strategy in self.host.system_strategies() {
            let label = strategy.device_info().name;
            if !strategy.is_available() {
                continue;
            }
            let buffer = Arc::clone(&self.buffer);
            let callback: AudioFrameCallback =
                Arc::new(move |samples, _channels| buffer.push(SourceKind::System, samples));
            match strategy.start(spec, callback) {
                Ok(()) => {
                    log::info!("system audio capture started via {}", label);
                    return Some(strategy);
                }
                Err(e) => log::debug!("system capture strategy {} failed: {}", label, e),
            }
        }
        None
    }

    /// Stop capturing, render the session, and return the finished file.
    ///
    /// A no-op returning `Ok(None)` when not recording. Stream close is
    /// best-effort — device errors are logged, never propagated — but a
    /// failed final write is a failed stop.
    pub fn stop(&mut self) -> Result<Option<RecordingResult>, RecorderError> {
        if !self.state.is_recording() {
            return Ok(None);
        }
        self.state = RecorderState::Stopping;

        if let Some(mut mic) = self.mic.take() {
            if let Err(e) = mic.stop() {
                log::warn!("mic stream close failed: {}", e);
            }
        }
        if let Some(mut system) = self.system.take() {
            if let Err(e) = system.stop() {
                log::warn!("system stream close failed: {}", e);
            }
        }
        if let Some(windower) = self.windower.take() {
            windower.stop();
        }

        // Final sync check; advisory only.
        self.buffer.check_drift();

        let result = self.render_session();
        self.state = RecorderState::Idle;
        result.map(Some)
    }

    fn render_session(&mut self) -> Result<RecordingResult, RecorderError> {
        let cfg = self.config.snapshot();
        let mic_samples = self.buffer.take_session(SourceKind::Mic);
        let system_samples = self.buffer.take_session(SourceKind::System);

        let duration = self
            .session_start
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let started_at = self.session_started_at.take().unwrap_or_else(Local::now);

        // The final pass runs the same chain once over the complete signal,
        // independent of any windowing overlap.
        let rendered = pipeline::render_mix(&mic_samples, &system_samples, &cfg);

        let file_name = format!("recording_{}.wav", started_at.format("%Y%m%d_%H%M%S"));
        let path = cfg.output_dir.join(file_name);

        let mut writer = WavFileWriter::new(path.clone(), cfg.sample_rate, cfg.channels);
        writer.open()?;
        writer.write_samples(&rendered)?;
        let checksum = writer.close()?;

        log::info!("recording saved: {}", path.display());
        Ok(RecordingResult::new(
            path,
            duration,
            cfg.sample_rate,
            cfg.channels,
            checksum,
        ))
    }

    /// Select a specific input device for the next session, or None for the
    /// system default.
    pub fn set_input_device(&mut self, device_index: Option<usize>) {
        self.update_config(|c| c.input_device = device_index);
    }

    pub fn set_system_audio_enabled(&mut self, enabled: bool) {
        self.update_config(|c| c.system_audio_enabled = enabled);
    }

    /// Register (or clear) the realtime chunk consumer.
    ///
    /// Takes effect at the next `start`; the callback owns deleting each
    /// chunk file after use.
    pub fn set_realtime_callback(&mut self, callback: Option<RealtimeChunkCallback>) {
        self.realtime_callback = callback;
    }

    /// Replace the whole configuration snapshot and persist it.
    ///
    /// Values are clamped into their valid ranges. A running capture picks
    /// the new parameters up on its next processing pass.
    pub fn configure(&mut self, config: RecorderConfig) -> Result<(), RecorderError> {
        let config = config.clamped();
        config.save(&self.config_path)?;
        self.config.replace(config);
        Ok(())
    }

    /// Cheap 0–100 mic level for UI meters, from the last few frames.
    pub fn audio_level(&self) -> u8 {
        let rms = self.buffer.recent_mic_rms();
        ((rms / i16::MAX as f32 * 100.0) as u8).min(100)
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn config(&self) -> Arc<RecorderConfig> {
        self.config.snapshot()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.buffer.diagnostics()
    }

    fn update_config(&mut self, mutate: impl FnOnce(&mut RecorderConfig)) {
        let mut config = (*self.config.snapshot()).clone();
        mutate(&mut config);
        let config = config.clamped();
        if let Err(e) = config.save(&self.config_path) {
            log::warn!("failed to persist settings: {}", e);
        }
        self.config.replace(config);
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        if self.state.is_recording() {
            let _ = self.stop();
        }
    }
}

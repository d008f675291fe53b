//! # meeting-audio-core
//!
//! Platform-agnostic audio engine for the meeting recorder.
//!
//! Captures two independent sources (microphone + system loopback), keeps
//! them time-aligned despite independent hardware clocks, runs a
//! deterministic DSP chain, and exposes the mix both as a live stream of
//! overlapping chunk files and as one finalized WAV per session. Hardware
//! backends (e.g. `meeting-audio-cpal`) implement the `CaptureProvider` /
//! `CaptureHost` traits and plug into the generic `AudioRecorder`.
//!
//! ## Architecture
//!
//! ```text
//! meeting-audio-core (this crate)
//! ├── traits/       ← CaptureProvider, CaptureHost, frame callback
//! ├── models/       ← RecorderError, RecorderState, RecorderConfig, DeviceInfo, ...
//! ├── processing/   ← DSP function library, mixdown pipeline, WAV headers
//! ├── capture/      ← SynchronizedCaptureBuffer
//! ├── session/      ← AudioRecorder, StreamingWindower
//! └── storage/      ← WavFileWriter
//! ```

pub mod capture;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::sync_buffer::SynchronizedCaptureBuffer;
pub use models::audio_models::{CaptureDiagnostics, DeviceInfo, SourceKind, StreamSpec};
pub use models::config::{RecorderConfig, SharedConfig};
pub use models::error::RecorderError;
pub use models::recording_result::RecordingResult;
pub use models::state::RecorderState;
pub use session::recorder::AudioRecorder;
pub use session::windower::{RealtimeChunkCallback, StreamingWindower};
pub use storage::wav_writer::WavFileWriter;
pub use traits::capture_provider::{AudioFrameCallback, CaptureHost, CaptureProvider};

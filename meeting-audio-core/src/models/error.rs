use thiserror::Error;

/// Errors surfaced by the recording engine.
///
/// Microphone failure is fatal to `start()`; system-audio failure is a
/// degraded-mode warning handled internally and never reaches this enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("microphone unavailable: {0}")]
    MicUnavailable(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("recording already in progress")]
    AlreadyRecording,
}

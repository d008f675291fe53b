use std::sync::Arc;

use crate::models::audio_models::{DeviceInfo, StreamSpec};
use crate::models::error::RecorderError;

/// Callback a provider invokes with each captured frame.
///
/// Parameters:
/// - `samples`: interleaved int16 samples at the requested stream spec.
/// - `channels`: channel count of the delivered frame.
///
/// The callback fires on the provider's capture thread — keep processing
/// minimal and never block on I/O or long-held locks.
pub type AudioFrameCallback = Arc<dyn Fn(&[i16], u16) + Send + Sync + 'static>;

/// One capture source: a microphone, or one system-loopback strategy.
///
/// Implemented by the backend crate (`meeting-audio-cpal`); mocked directly
/// in engine tests.
pub trait CaptureProvider: Send {
    /// Whether this source can currently be opened.
    fn is_available(&self) -> bool;

    /// Begin delivering frames at `spec` through `callback`.
    ///
    /// Both sources are opened at the same `spec.sample_rate` so
    /// cross-source alignment stays length-based.
    fn start(&mut self, spec: StreamSpec, callback: AudioFrameCallback)
        -> Result<(), RecorderError>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<(), RecorderError>;

    /// Information about the device backing this provider.
    fn device_info(&self) -> DeviceInfo;
}

/// Hardware backend seam: device queries plus provider construction.
pub trait CaptureHost: Send + Sync {
    /// Devices with at least one input channel.
    fn list_input_devices(&self) -> Vec<DeviceInfo>;

    /// Input devices whose names mark them as system-loopback capable.
    fn list_loopback_devices(&self) -> Vec<DeviceInfo>;

    fn default_input_device(&self) -> Option<DeviceInfo>;

    /// Provider for the given input device index, or the system default.
    fn mic_provider(
        &self,
        device_index: Option<usize>,
    ) -> Result<Box<dyn CaptureProvider>, RecorderError>;

    /// Ordered fallback chain for system-audio capture. The recorder walks
    /// it at start; the first strategy that opens wins, and total failure
    /// degrades the session to mic-only capture.
    fn system_strategies(&self) -> Vec<Box<dyn CaptureProvider>>;
}

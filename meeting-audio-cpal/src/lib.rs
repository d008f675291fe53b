//! # meeting-audio-cpal
//!
//! Hardware backend for `meeting-audio-core` built on cpal: input-device
//! enumeration with loopback classification, plus capture providers that
//! deliver int16 frames at the engine's requested stream spec.

pub mod catalog;
pub mod stream;

use meeting_audio_core::{CaptureHost, CaptureProvider, DeviceInfo, RecorderError};

use crate::catalog::DeviceCatalog;
use crate::stream::CpalCapture;

/// Backend wired to the platform's default audio host.
#[derive(Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureHost for CpalBackend {
    fn list_input_devices(&self) -> Vec<DeviceInfo> {
        DeviceCatalog::list_input_devices()
    }

    fn list_loopback_devices(&self) -> Vec<DeviceInfo> {
        DeviceCatalog::list_loopback_devices()
    }

    fn default_input_device(&self) -> Option<DeviceInfo> {
        DeviceCatalog::default_input_device()
    }

    fn mic_provider(
        &self,
        device_index: Option<usize>,
    ) -> Result<Box<dyn CaptureProvider>, RecorderError> {
        let info = match device_index {
            Some(index) => DeviceCatalog::list_input_devices()
                .into_iter()
                .find(|device| device.index == index)
                .ok_or_else(|| {
                    RecorderError::Device(format!("no input device at index {}", index))
                })?,
            None => DeviceCatalog::default_input_device()
                .ok_or_else(|| RecorderError::Device("no default input device".into()))?,
        };
        Ok(Box::new(CpalCapture::microphone(device_index, info)))
    }

    fn system_strategies(&self) -> Vec<Box<dyn CaptureProvider>> {
        DeviceCatalog::list_loopback_devices()
            .into_iter()
            .map(|info| Box::new(CpalCapture::loopback(info.index, info)) as Box<dyn CaptureProvider>)
            .collect()
    }
}

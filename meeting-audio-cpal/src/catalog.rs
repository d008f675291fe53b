//! Input-device enumeration and loopback classification.

use cpal::traits::{DeviceTrait, HostTrait};

use meeting_audio_core::DeviceInfo;

/// Name markers for the stereo-mix class of loopback endpoints, including
/// Portuguese-localized variants.
const STEREO_MIX_MARKERS: &[&str] = &["stereo mix", "mixagem estéreo", "mixagem estereo"];

/// Generic loopback markers. "monitor" covers PulseAudio/PipeWire monitor
/// sources.
const LOOPBACK_MARKERS: &[&str] = &["what u hear", "wave out mix", "loopback", "monitor"];

/// Last resort: output endpoints that also expose an input channel.
const SPEAKER_MARKERS: &[&str] = &["speakers", "alto-falante"];

/// Priority tier of a loopback-capable device name; lower tries first.
/// None when the name carries no loopback marker.
pub(crate) fn loopback_priority(name: &str) -> Option<u8> {
    let lower = name.to_lowercase();
    if STEREO_MIX_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(0);
    }
    if LOOPBACK_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(1);
    }
    if SPEAKER_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(2);
    }
    None
}

/// Queries over the host's input devices.
///
/// Enumeration is best-effort: backend errors are logged and produce empty
/// results, never an error for the caller.
pub struct DeviceCatalog;

impl DeviceCatalog {
    /// Every input endpoint with at least one input channel.
    pub fn list_input_devices() -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices = match host.input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("input device enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for (index, device) in devices.enumerate() {
            let name = device.name().unwrap_or_else(|_| format!("Input {}", index));
            let config = match device.default_input_config() {
                Ok(config) => config,
                Err(e) => {
                    log::debug!("skipping {}: no input config ({})", name, e);
                    continue;
                }
            };
            if config.channels() == 0 {
                continue;
            }
            out.push(DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                channels: config.channels(),
                default_sample_rate: config.sample_rate().0,
                name,
            });
        }
        out
    }

    /// Input devices whose names mark them as capturing system output.
    ///
    /// Ordered stereo-mix class first, generic loopback next,
    /// speakers-with-input last — the order the recorder tries them in.
    pub fn list_loopback_devices() -> Vec<DeviceInfo> {
        let mut devices: Vec<(u8, DeviceInfo)> = Self::list_input_devices()
            .into_iter()
            .filter_map(|device| loopback_priority(&device.name).map(|p| (p, device)))
            .collect();
        devices.sort_by_key(|(priority, device)| (*priority, device.index));
        devices.into_iter().map(|(_, device)| device).collect()
    }

    pub fn default_input_device() -> Option<DeviceInfo> {
        Self::list_input_devices()
            .into_iter()
            .find(|device| device.is_default)
    }

    /// Resolve an enumeration index back to a cpal device.
    pub(crate) fn device_at(index: usize) -> Option<cpal::Device> {
        cpal::default_host().input_devices().ok()?.nth(index)
    }

    pub(crate) fn default_device() -> Option<cpal::Device> {
        cpal::default_host().default_input_device()
    }
}

//! cpal capture provider: one input stream owned by a dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;

use meeting_audio_core::{
    AudioFrameCallback, CaptureProvider, DeviceInfo, RecorderError, StreamSpec,
};

use crate::catalog::DeviceCatalog;

/// How long `start` waits for the capture thread to report the stream open.
const OPEN_TIMEOUT: Duration = Duration::from_secs(3);

/// Poll interval for the stop flag on the stream-owning thread.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Capture provider for one cpal input device.
///
/// cpal streams are not `Send`, so the stream is created and parked on a
/// dedicated capture thread; `start` blocks until that thread reports
/// whether the stream opened, and `stop` flags the thread down and joins it.
pub struct CpalCapture {
    info: DeviceInfo,
    /// None selects the host default input device.
    device_index: Option<usize>,
    thread_name: String,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalCapture {
    /// Capture from the default microphone or a specific input index.
    pub fn microphone(device_index: Option<usize>, info: DeviceInfo) -> Self {
        Self::new(device_index, info, "cpal-mic-capture")
    }

    /// Capture from a loopback-capable input device.
    pub fn loopback(device_index: usize, info: DeviceInfo) -> Self {
        Self::new(Some(device_index), info, "cpal-loopback-capture")
    }

    fn new(device_index: Option<usize>, info: DeviceInfo, thread_name: &str) -> Self {
        Self {
            info,
            device_index,
            thread_name: thread_name.into(),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }
}

impl CaptureProvider for CpalCapture {
    fn is_available(&self) -> bool {
        match self.device_index {
            Some(index) => DeviceCatalog::device_at(index).is_some(),
            None => DeviceCatalog::default_device().is_some(),
        }
    }

    fn start(
        &mut self,
        spec: StreamSpec,
        callback: AudioFrameCallback,
    ) -> Result<(), RecorderError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::Device(format!(
                "{} already capturing",
                self.info.name
            )));
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), RecorderError>>();
        let running = Arc::clone(&self.running);
        let device_index = self.device_index;
        let device_name = self.info.name.clone();

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                capture_thread(
                    device_index,
                    device_name,
                    spec,
                    callback,
                    Arc::clone(&running),
                    ready_tx,
                );
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| RecorderError::Device(format!("spawn capture thread: {}", e)))?;
        *self.handle.lock() = Some(handle);

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stop()?;
                Err(e)
            }
            Err(_) => {
                self.stop()?;
                Err(RecorderError::Device(format!(
                    "timed out opening {}",
                    self.info.name
                )))
            }
        }
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }
}

/// Owns the stream for its whole lifetime; reports the open outcome once.
fn capture_thread(
    device_index: Option<usize>,
    device_name: String,
    spec: StreamSpec,
    callback: AudioFrameCallback,
    running: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<(), RecorderError>>,
) {
    let device = match device_index {
        Some(index) => DeviceCatalog::device_at(index),
        None => DeviceCatalog::default_device(),
    };
    let device = match device {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(RecorderError::Device(format!(
                "{} not found",
                device_name
            ))));
            return;
        }
    };

    let default_config = match device.default_input_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = ready_tx.send(Err(RecorderError::Device(format!(
                "{}: no input config: {}",
                device_name, e
            ))));
            return;
        }
    };

    // Open with the device's native channel count, capped at the requested
    // one; the frame converter adapts to the requested layout. The sample
    // rate is forced so both sources share one clock.
    let channels = default_config.channels().min(spec.channels).max(1);
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, spec.channels, callback),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, spec.channels, callback),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, spec.channels, callback),
        other => Err(RecorderError::Device(format!(
            "{}: unsupported sample format {:?}",
            device_name, other
        ))),
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(RecorderError::Device(format!(
            "{}: start stream: {}",
            device_name, e
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        thread::sleep(STOP_POLL);
    }
    drop(stream);
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    out_channels: u16,
    callback: AudioFrameCallback,
) -> Result<cpal::Stream, RecorderError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let in_channels = config.channels;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let frame = convert_frame(data, in_channels, out_channels);
                callback(&frame, out_channels);
            },
            |e| log::warn!("input stream error: {}", e),
            None,
        )
        .map_err(|e| RecorderError::Device(format!("open input stream: {}", e)))
}

/// Convert a hardware buffer to interleaved int16 at the requested channel
/// count. Mono input is duplicated across the stereo pair; extra input
/// channels are averaged down.
fn convert_frame<T>(data: &[T], in_channels: u16, out_channels: u16) -> Vec<i16>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let to_i16 = |sample: T| {
        let value: f32 = cpal::Sample::from_sample(sample);
        (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    };

    let in_channels = in_channels.max(1) as usize;
    let out_channels = out_channels.max(1) as usize;
    if in_channels == out_channels {
        return data.iter().map(|&s| to_i16(s)).collect();
    }

    let frames = data.len() / in_channels;
    let mut out = Vec::with_capacity(frames * out_channels);
    for frame in 0..frames {
        let base = frame * in_channels;
        if out_channels == 2 {
            if in_channels == 1 {
                let sample = to_i16(data[base]);
                out.push(sample);
                out.push(sample);
            } else {
                out.push(to_i16(data[base]));
                out.push(to_i16(data[base + 1]));
            }
        } else {
            let sum: f32 = data[base..base + in_channels]
                .iter()
                .map(|&s| -> f32 { cpal::Sample::from_sample(s) })
                .sum();
            let avg = (sum / in_channels as f32).clamp(-1.0, 1.0);
            out.push((avg * i16::MAX as f32) as i16);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_input_duplicates_to_stereo() {
        let out = convert_frame(&[0.5f32, -0.25], 1, 2);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], out[1]);
        assert_eq!(out[2], out[3]);
        assert!((out[0] as f32 - 0.5 * i16::MAX as f32).abs() <= 1.0);
    }

    #[test]
    fn int16_passthrough_preserves_samples() {
        let samples = [100i16, -200, 300, -400];
        let out = convert_frame(&samples, 2, 2);
        for (&y, &x) in out.iter().zip(samples.iter()) {
            assert!((y as i32 - x as i32).abs() <= 1);
        }
    }

    #[test]
    fn out_of_range_float_input_is_clamped() {
        let out = convert_frame(&[2.0f32, -2.0], 2, 2);
        assert_eq!(out, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn stereo_input_averages_down_to_mono() {
        let out = convert_frame(&[0.2f32, 0.8, -0.4, -0.6], 2, 1);
        assert_eq!(out.len(), 2);
        assert!((out[0] as f32 - 0.5 * i16::MAX as f32).abs() <= 1.0);
        assert!((out[1] as f32 + 0.5 * i16::MAX as f32).abs() <= 1.0);
    }
}

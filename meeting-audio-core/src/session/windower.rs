//! Overlapping-window streaming for incremental consumers.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::capture::sync_buffer::SynchronizedCaptureBuffer;
use crate::models::audio_models::SourceKind;
use crate::models::config::{RecorderConfig, SharedConfig};
use crate::processing::pipeline;
use crate::storage::wav_writer::WavFileWriter;

/// Callback invoked with each emitted chunk file and its sequential index.
///
/// Runs on the windower thread, not the caller's. The callee owns deleting
/// the file once it is done with it. Panics inside the callback are caught
/// and logged; the stream continues with the next window.
pub type RealtimeChunkCallback = Arc<dyn Fn(&Path, u64) + Send + Sync + 'static>;

/// Bound on how long the worker sleeps with no data before rechecking the
/// stop flag.
const IDLE_WAIT: Duration = Duration::from_millis(200);

/// Rolling per-source accumulation that cuts fixed-length overlapping
/// windows.
///
/// Pure state machine: `absorb` appends drained frames, `next_window` cuts a
/// full window whenever the mic side holds one, `flush` hands back whatever
/// remains. Consecutive windows share the configured overlap because the
/// buffers advance by the step, not the full window — duplicate work traded
/// for continuity at window boundaries.
pub(crate) struct WindowAssembler {
    mic: Vec<i16>,
    system: Vec<i16>,
}

impl WindowAssembler {
    pub(crate) fn new() -> Self {
        Self {
            mic: Vec::new(),
            system: Vec::new(),
        }
    }

    pub(crate) fn absorb(&mut self, mic_frames: Vec<Vec<i16>>, system_frames: Vec<Vec<i16>>) {
        for frame in mic_frames {
            self.mic.extend_from_slice(&frame);
        }
        for frame in system_frames {
            self.system.extend_from_slice(&frame);
        }
    }

    /// Cut the next full window and advance both sides by `step` samples.
    ///
    /// The mic side gates the cut; the system slice may be shorter or empty
    /// if that source has produced less data.
    pub(crate) fn next_window(&mut self, chunk: usize, step: usize) -> Option<(Vec<i16>, Vec<i16>)> {
        if chunk == 0 || self.mic.len() < chunk {
            return None;
        }
        let mic = self.mic[..chunk].to_vec();
        let system = self.system[..chunk.min(self.system.len())].to_vec();
        let step = step.max(1);
        self.mic.drain(..step.min(self.mic.len()));
        self.system.drain(..step.min(self.system.len()));
        Some((mic, system))
    }

    /// Remaining partial content, if any.
    pub(crate) fn flush(&mut self) -> Option<(Vec<i16>, Vec<i16>)> {
        if self.mic.is_empty() && self.system.is_empty() {
            return None;
        }
        Some((std::mem::take(&mut self.mic), std::mem::take(&mut self.system)))
    }
}

/// Worker thread that turns the capture buffer into overlapping chunk files.
pub struct StreamingWindower {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    buffer: Arc<SynchronizedCaptureBuffer>,
}

impl StreamingWindower {
    /// Spawn the worker. It wakes on buffer arrivals or a bounded timeout,
    /// emits every complete window, and flushes the remainder on stop.
    pub fn spawn(
        buffer: Arc<SynchronizedCaptureBuffer>,
        config: SharedConfig,
        callback: RealtimeChunkCallback,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let worker_buffer = Arc::clone(&buffer);

        let handle = thread::Builder::new()
            .name("stream-windower".into())
            .spawn(move || worker_loop(worker_buffer, config, callback, worker_running))
            .expect("failed to spawn windower thread");

        Self {
            running,
            handle: Some(handle),
            buffer,
        }
    }

    /// Signal the worker and join it.
    ///
    /// Worker waits are bounded, so the join returns promptly even when no
    /// more data arrives.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.buffer.wake();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    buffer: Arc<SynchronizedCaptureBuffer>,
    config: SharedConfig,
    callback: RealtimeChunkCallback,
    running: Arc<AtomicBool>,
) {
    let mut assembler = WindowAssembler::new();
    let mut index: u64 = 0;

    while running.load(Ordering::SeqCst) {
        buffer.wait_for_data(IDLE_WAIT);
        pump(&buffer, &config, &callback, &mut assembler, &mut index);
        buffer.check_drift();
    }

    // Stop: emit any complete windows still queued, then the partial tail.
    pump(&buffer, &config, &callback, &mut assembler, &mut index);
    let cfg = config.snapshot();
    if let Some((mic, system)) = assembler.flush() {
        emit_window(&cfg, &callback, &buffer, &mic, &system, &mut index);
    }
}

/// Drain pending frames and emit every complete window they allow.
fn pump(
    buffer: &SynchronizedCaptureBuffer,
    config: &SharedConfig,
    callback: &RealtimeChunkCallback,
    assembler: &mut WindowAssembler,
    index: &mut u64,
) {
    assembler.absorb(buffer.drain(SourceKind::Mic), buffer.drain(SourceKind::System));

    // Fresh snapshot per pass: a running capture picks up configuration
    // changes on the next window.
    let cfg = config.snapshot();
    let chunk = cfg.chunk_samples();
    let step = cfg.step_samples();

    while let Some((mic, system)) = assembler.next_window(chunk, step) {
        emit_window(&cfg, callback, buffer, &mic, &system, index);
    }
}

fn emit_window(
    cfg: &RecorderConfig,
    callback: &RealtimeChunkCallback,
    buffer: &SynchronizedCaptureBuffer,
    mic: &[i16],
    system: &[i16],
    index: &mut u64,
) {
    let rendered = pipeline::render_mix(mic, system, cfg);
    let path = cfg.temp_dir.join(format!("realtime_chunk_{}.wav", *index));

    let mut writer = WavFileWriter::new(path.clone(), cfg.sample_rate, cfg.channels);
    let written = writer
        .open()
        .and_then(|_| writer.write_samples(&rendered))
        .and_then(|_| writer.close().map(|_| ()));

    match written {
        Ok(()) => {
            buffer.note_window_emitted();
            let chunk_index = *index;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&path, chunk_index)));
            if outcome.is_err() {
                log::error!("realtime callback panicked on chunk {}", chunk_index);
            }
        }
        // A failed chunk is dropped; the live stream continues.
        Err(e) => log::warn!("dropping window {}: {}", *index, e),
    }
    *index += 1;
}

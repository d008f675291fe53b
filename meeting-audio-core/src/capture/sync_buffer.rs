//! Thread-safe storage for the two independently arriving capture streams.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{CaptureDiagnostics, SourceKind};
use crate::processing::dsp;

/// Arrival-time gap between sources that triggers the drift advisory.
const DRIFT_WARN_SECS: f64 = 0.1;
/// Rolling arrival-time sample count per source for the drift estimate.
const DRIFT_WINDOW: usize = 10;
/// Minimum arrivals per source before drift is estimated.
const DRIFT_MIN_FRAMES: usize = 5;
/// Throttle between drift advisory log lines.
const DRIFT_LOG_INTERVAL_SECS: f64 = 5.0;
/// Mic frames considered by the UI level meter.
const LEVEL_METER_FRAMES: usize = 5;

struct SourceQueue {
    /// Frames awaiting the windower. Only populated in live mode.
    pending: Vec<Vec<i16>>,
    /// Every frame of the session, for the final render.
    session: Vec<Vec<i16>>,
    /// Arrival time of each appended frame, seconds since the buffer epoch.
    /// Diagnostics only — never used to reorder or drop samples.
    timestamps: Vec<f64>,
    total_samples: u64,
}

impl SourceQueue {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            session: Vec::new(),
            timestamps: Vec::new(),
            total_samples: 0,
        }
    }
}

struct Inner {
    live: bool,
    mic: SourceQueue,
    system: SourceQueue,
    dirty: bool,
    last_drift: Option<f64>,
    last_drift_log: Option<f64>,
    drift_warnings: u64,
    windows_emitted: u64,
}

impl Inner {
    fn queue_mut(&mut self, kind: SourceKind) -> &mut SourceQueue {
        match kind {
            SourceKind::Mic => &mut self.mic,
            SourceKind::System => &mut self.system,
        }
    }

    /// Absolute difference of the rolling mean arrival times, when both
    /// sources have produced enough frames to average.
    fn drift_estimate(&self) -> Option<f64> {
        if self.mic.timestamps.len() < DRIFT_MIN_FRAMES
            || self.system.timestamps.len() < DRIFT_MIN_FRAMES
        {
            return None;
        }
        let rolling_mean = |timestamps: &[f64]| {
            let tail = &timestamps[timestamps.len().saturating_sub(DRIFT_WINDOW)..];
            tail.iter().sum::<f64>() / tail.len() as f64
        };
        Some((rolling_mean(&self.mic.timestamps) - rolling_mean(&self.system.timestamps)).abs())
    }
}

/// Lock-protected frame queues for the mic and system streams.
///
/// Appends come from the hardware callback threads; the windower drains
/// pending frames and the recorder takes the full session at stop. The lock
/// is held only long enough to copy sample vectors — no signal processing
/// happens under it. No sample-accurate realignment is attempted between
/// sources: both streams run at the same forced clock rate and alignment is
/// length-based at mix time.
pub struct SynchronizedCaptureBuffer {
    inner: Mutex<Inner>,
    data_ready: Condvar,
    epoch: Instant,
}

impl SynchronizedCaptureBuffer {
    /// `live` controls whether frames are also queued for the windower;
    /// the full-session accumulation happens either way.
    pub fn new(live: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                live,
                mic: SourceQueue::new(),
                system: SourceQueue::new(),
                dirty: false,
                last_drift: None,
                last_drift_log: None,
                drift_warnings: 0,
                windows_emitted: 0,
            }),
            data_ready: Condvar::new(),
            epoch: Instant::now(),
        }
    }

    /// Append one capture frame, timestamped at arrival.
    ///
    /// Called from the hardware callback threads; must stay cheap.
    pub fn push(&self, kind: SourceKind, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }
        let at = self.epoch.elapsed().as_secs_f64();
        self.push_at(kind, samples, at);
    }

    fn push_at(&self, kind: SourceKind, samples: &[i16], at: f64) {
        let mut inner = self.inner.lock();
        let live = inner.live;
        let queue = inner.queue_mut(kind);
        queue.timestamps.push(at);
        queue.total_samples += samples.len() as u64;
        queue.session.push(samples.to_vec());
        if live {
            queue.pending.push(samples.to_vec());
        }
        inner.dirty = true;
        drop(inner);
        self.data_ready.notify_one();
    }

    /// Take all pending frames for one source, in arrival order.
    pub fn drain(&self, kind: SourceKind) -> Vec<Vec<i16>> {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.queue_mut(kind).pending)
    }

    /// Concatenate and clear the full-session frames for one source.
    pub fn take_session(&self, kind: SourceKind) -> Vec<i16> {
        let mut inner = self.inner.lock();
        let queue = inner.queue_mut(kind);
        let total: usize = queue.session.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total);
        for frame in queue.session.drain(..) {
            out.extend_from_slice(&frame);
        }
        out
    }

    /// Block until new data arrives or `timeout` elapses.
    ///
    /// Returns whether data arrived; clears the arrival flag either way so
    /// the same state is never reported twice.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        if !inner.dirty {
            self.data_ready.wait_for(&mut inner, timeout);
        }
        std::mem::replace(&mut inner.dirty, false)
    }

    /// Wake any worker blocked in `wait_for_data` (used on shutdown).
    pub fn wake(&self) {
        let _guard = self.inner.lock();
        self.data_ready.notify_all();
    }

    /// Estimate arrival-time drift between the sources and log a non-fatal
    /// advisory (throttled) when it exceeds 100 ms.
    ///
    /// Returns the drift when it is over the warning threshold. Never
    /// alters captured sample data.
    pub fn check_drift(&self) -> Option<f64> {
        let now = self.epoch.elapsed().as_secs_f64();
        let mut inner = self.inner.lock();
        let drift = inner.drift_estimate()?;
        inner.last_drift = Some(drift);
        if drift <= DRIFT_WARN_SECS {
            return None;
        }
        let should_log = inner
            .last_drift_log
            .map_or(true, |t| now - t >= DRIFT_LOG_INTERVAL_SECS);
        if should_log {
            inner.last_drift_log = Some(now);
            inner.drift_warnings += 1;
            log::warn!(
                "capture streams drifting: {:.3}s between mic and system arrivals",
                drift
            );
        }
        Some(drift)
    }

    /// RMS of the most recent mic frames, in raw i16 units.
    ///
    /// Meant for a UI level meter, not decision logic.
    pub fn recent_mic_rms(&self) -> f32 {
        let inner = self.inner.lock();
        let frames = &inner.mic.session;
        if frames.is_empty() {
            return 0.0;
        }
        let tail = &frames[frames.len().saturating_sub(LEVEL_METER_FRAMES)..];
        let joined: Vec<i16> = tail.iter().flat_map(|f| f.iter().copied()).collect();
        dsp::rms_raw(&joined)
    }

    pub fn note_window_emitted(&self) {
        self.inner.lock().windows_emitted += 1;
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        let inner = self.inner.lock();
        CaptureDiagnostics {
            mic_frames: inner.mic.timestamps.len() as u64,
            system_frames: inner.system.timestamps.len() as u64,
            mic_samples: inner.mic.total_samples,
            system_samples: inner.system.total_samples,
            windows_emitted: inner.windows_emitted,
            drift_warnings: inner.drift_warnings,
            last_drift_secs: inner.last_drift,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_drain_in_arrival_order() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        buffer.push(SourceKind::Mic, &[1, 2]);
        buffer.push(SourceKind::Mic, &[3, 4]);
        buffer.push(SourceKind::System, &[9, 9]);

        let mic = buffer.drain(SourceKind::Mic);
        assert_eq!(mic, vec![vec![1, 2], vec![3, 4]]);
        assert!(buffer.drain(SourceKind::Mic).is_empty());
        assert_eq!(buffer.drain(SourceKind::System), vec![vec![9, 9]]);
    }

    #[test]
    fn timestamp_series_matches_frame_count() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        for _ in 0..7 {
            buffer.push(SourceKind::Mic, &[0, 0]);
        }
        for _ in 0..3 {
            buffer.push(SourceKind::System, &[0, 0]);
        }
        let diag = buffer.diagnostics();
        assert_eq!(diag.mic_frames, 7);
        assert_eq!(diag.system_frames, 3);
        assert_eq!(diag.mic_samples, 14);
    }

    #[test]
    fn empty_frames_are_ignored() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        buffer.push(SourceKind::Mic, &[]);
        assert_eq!(buffer.diagnostics().mic_frames, 0);
    }

    #[test]
    fn non_live_buffer_accumulates_session_but_not_pending() {
        let buffer = SynchronizedCaptureBuffer::new(false);
        buffer.push(SourceKind::Mic, &[5, 6]);
        assert!(buffer.drain(SourceKind::Mic).is_empty());
        assert_eq!(buffer.take_session(SourceKind::Mic), vec![5, 6]);
    }

    #[test]
    fn take_session_concatenates_and_clears() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        buffer.push(SourceKind::Mic, &[1, 2]);
        buffer.push(SourceKind::Mic, &[3]);
        assert_eq!(buffer.take_session(SourceKind::Mic), vec![1, 2, 3]);
        assert!(buffer.take_session(SourceKind::Mic).is_empty());
    }

    #[test]
    fn wait_for_data_returns_after_push() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        buffer.push(SourceKind::Mic, &[1]);
        assert!(buffer.wait_for_data(Duration::from_millis(1)));
        // Flag cleared: the same arrival is not reported twice.
        assert!(!buffer.wait_for_data(Duration::from_millis(1)));
    }

    #[test]
    fn drift_advisory_fires_without_touching_data() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        // Mic arrivals run 200 ms ahead of the system arrivals.
        for i in 0..10 {
            let t = i as f64 * 0.05;
            buffer.push_at(SourceKind::Mic, &[i as i16], t + 0.2);
            buffer.push_at(SourceKind::System, &[-(i as i16)], t);
        }

        let drift = buffer.check_drift().expect("drift should exceed 100 ms");
        assert!((drift - 0.2).abs() < 1e-9);
        assert_eq!(buffer.diagnostics().drift_warnings, 1);

        // Advisory only — captured samples are untouched.
        let mic: Vec<i16> = buffer
            .drain(SourceKind::Mic)
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(mic, (0..10).map(|i| i as i16).collect::<Vec<_>>());
    }

    #[test]
    fn drift_in_sync_streams_reports_nothing() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        for i in 0..10 {
            let t = i as f64 * 0.05;
            buffer.push_at(SourceKind::Mic, &[1], t + 0.01);
            buffer.push_at(SourceKind::System, &[1], t);
        }
        assert!(buffer.check_drift().is_none());
        assert_eq!(buffer.diagnostics().drift_warnings, 0);
    }

    #[test]
    fn drift_needs_enough_frames_on_both_sides() {
        let buffer = SynchronizedCaptureBuffer::new(true);
        for i in 0..10 {
            buffer.push_at(SourceKind::Mic, &[1], i as f64);
        }
        assert!(buffer.check_drift().is_none());
    }

    #[test]
    fn recent_mic_rms_tracks_the_tail() {
        let buffer = SynchronizedCaptureBuffer::new(false);
        // Old loud content followed by many quiet frames.
        buffer.push(SourceKind::Mic, &[20_000; 64]);
        for _ in 0..6 {
            buffer.push(SourceKind::Mic, &[100; 64]);
        }
        let rms = buffer.recent_mic_rms();
        assert!((rms - 100.0).abs() < 1.0);
    }
}

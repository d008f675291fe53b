//! Sample-array transforms for the capture pipeline.
//!
//! Every function is pure with respect to its input: int16 samples in, a new
//! int16 buffer out, no hidden state between calls. Empty input is a
//! legitimate value and always yields empty output; numeric edge cases
//! (silence, clipping) are handled in-function, never signalled as errors.

/// Full-scale reference for dBFS math.
const FULL_SCALE: f32 = i16::MAX as f32;

/// Moving-RMS window for the noise gate, in seconds.
const GATE_RMS_WINDOW_SECS: f32 = 0.010;

/// Leading window used for the echo correlation estimate, in seconds.
const ECHO_PROBE_SECS: f32 = 0.050;

/// Correlation magnitude below which no echo is assumed.
const ECHO_CORRELATION_GATE: f32 = 0.1;

/// Hard ceiling on echo subtraction strength.
const ECHO_MAX_STRENGTH: f32 = 0.8;

/// RMS (in raw i16 units) below which normalization is skipped.
const NORMALIZE_RMS_FLOOR: f32 = 1.0;

/// Maximum linear gain the normalizer will apply.
const NORMALIZE_MAX_GAIN: f32 = 5.0;

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

fn clip(value: f32) -> i16 {
    value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// RMS of the samples in raw i16 units. Zero for empty input.
pub(crate) fn rms_raw(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let x = s as f64;
            x * x
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Scale samples by `gain_db` decibels, clipped to the int16 range.
///
/// Identity (bitwise) at 0 dB or on empty input.
pub fn apply_gain(samples: &[i16], gain_db: f32) -> Vec<i16> {
    if samples.is_empty() || gain_db == 0.0 {
        return samples.to_vec();
    }
    let factor = db_to_linear(gain_db);
    samples.iter().map(|&s| clip(s as f32 * factor)).collect()
}

/// Single-pole IIR high-pass: removes DC offset and rumble before gain
/// staging.
///
/// `alpha = rc/(rc + dt)` with `rc = 1/(2π·cutoff)` and `dt = 1/rate`;
/// recurrence `y[n] = alpha·(y[n-1] + x[n] − x[n-1])`.
pub fn high_pass_filter(samples: &[i16], sample_rate: u32, cutoff_hz: f32) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    let mut prev_x = samples[0] as f32;
    let mut prev_y = samples[0] as f32;
    out.push(samples[0]);
    for &sample in &samples[1..] {
        let x = sample as f32;
        let y = alpha * (prev_y + x - prev_x);
        out.push(clip(y));
        prev_x = x;
        prev_y = y;
    }
    out
}

/// Noise gate with attack/release/hold driven by a short moving RMS.
///
/// While the windowed RMS sits at or above `threshold_db` the gate ramps
/// toward 1.0 over `attack_ms` and the hold timer is re-armed; once below
/// the threshold with the hold expired, the gate decays toward `floor` over
/// `release_ms`. The multiplier never leaves `[floor, 1.0]`, so a source is
/// attenuated but never fully silenced.
pub fn noise_gate(
    samples: &[i16],
    sample_rate: u32,
    threshold_db: f32,
    attack_ms: f32,
    release_ms: f32,
    hold_ms: f32,
    floor: f32,
) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }

    let floor = floor.clamp(0.0, 1.0);
    let window = ((sample_rate as f32 * GATE_RMS_WINDOW_SECS) as usize).max(1);
    let threshold = db_to_linear(threshold_db) * FULL_SCALE;

    let ms_to_samples = |ms: f32| ((ms / 1000.0) * sample_rate as f32).max(1.0);
    let attack_step = (1.0 - floor) / ms_to_samples(attack_ms);
    let release_step = (1.0 - floor) / ms_to_samples(release_ms);
    let hold_samples = ((hold_ms / 1000.0) * sample_rate as f32) as u32;

    let mut out = Vec::with_capacity(samples.len());
    let mut sum_sq = 0.0f64;
    let mut gate = floor;
    let mut hold = 0u32;

    for (i, &sample) in samples.iter().enumerate() {
        let x = sample as f64;
        sum_sq += x * x;
        if i >= window {
            let old = samples[i - window] as f64;
            sum_sq -= old * old;
        }
        let count = window.min(i + 1);
        let rms = (sum_sq.max(0.0) / count as f64).sqrt() as f32;

        if rms >= threshold {
            gate = (gate + attack_step).min(1.0);
            hold = hold_samples;
        } else if hold > 0 {
            hold -= 1;
        } else {
            gate = (gate - release_step).max(floor);
        }

        out.push(clip(sample as f32 * gate));
    }
    out
}

/// Hard-knee compressor: magnitudes above the linear threshold become
/// `threshold + excess/ratio` (sign preserved), then uniform makeup gain.
pub fn compressor(samples: &[i16], threshold_db: f32, ratio: f32, makeup_gain_db: f32) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    let ratio = ratio.max(1.0);
    let threshold = db_to_linear(threshold_db) * FULL_SCALE;
    let makeup = db_to_linear(makeup_gain_db);

    samples
        .iter()
        .map(|&sample| {
            let x = sample as f32;
            let magnitude = x.abs();
            let shaped = if magnitude > threshold {
                threshold + (magnitude - threshold) / ratio
            } else {
                magnitude
            };
            clip(shaped.copysign(x) * makeup)
        })
        .collect()
}

/// Scale the signal so its RMS reaches `target_db` dBFS.
///
/// A signal below the negligible-RMS floor is returned unchanged (avoids a
/// divide-by-near-zero gain explosion), and the applied gain is capped at
/// 5.0x so near-silence is never amplified into noise.
pub fn normalize(samples: &[i16], target_db: f32) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    let rms = rms_raw(samples);
    if rms < NORMALIZE_RMS_FLOOR {
        return samples.to_vec();
    }
    let target = db_to_linear(target_db) * FULL_SCALE;
    let factor = (target / rms).min(NORMALIZE_MAX_GAIN);
    samples.iter().map(|&s| clip(s as f32 * factor)).collect()
}

/// Correlation-gated echo estimate: subtract a scaled copy of the mic
/// signal from the system signal when the two are measurably correlated.
///
/// The normalized cross-correlation is taken over a short leading window of
/// both signals; below 0.1 the system audio is returned unchanged. This is a
/// linear estimate, not adaptive cancellation — nonlinear speaker/mic
/// coupling is under-cancelled by design.
pub fn reduce_echo(system: &[i16], mic: &[i16], sample_rate: u32, strength: f32) -> Vec<i16> {
    if system.is_empty() || mic.is_empty() {
        return system.to_vec();
    }

    let window = ((sample_rate as f32 * ECHO_PROBE_SECS) as usize)
        .max(1)
        .min(system.len())
        .min(mic.len());

    let mut dot = 0.0f64;
    let mut sys_sq = 0.0f64;
    let mut mic_sq = 0.0f64;
    for i in 0..window {
        let s = system[i] as f64;
        let m = mic[i] as f64;
        dot += s * m;
        sys_sq += s * s;
        mic_sq += m * m;
    }
    let denom = (sys_sq * mic_sq).sqrt();
    if denom <= f64::EPSILON {
        return system.to_vec();
    }
    let correlation = (dot / denom) as f32;
    if correlation.abs() < ECHO_CORRELATION_GATE {
        return system.to_vec();
    }

    let weight = correlation.abs() * strength.min(ECHO_MAX_STRENGTH);
    system
        .iter()
        .enumerate()
        .map(|(i, &s)| match mic.get(i) {
            Some(&m) => clip(s as f32 - m as f32 * weight),
            None => s,
        })
        .collect()
}

/// Sum two tracks over their common prefix, widened to i32 before summing
/// so intermediate overflow cannot occur, then clipped back to int16.
///
/// If either input is empty the other is returned unchanged.
pub fn mix_tracks(mic: &[i16], system: &[i16]) -> Vec<i16> {
    if mic.is_empty() {
        return system.to_vec();
    }
    if system.is_empty() {
        return mic.to_vec();
    }
    mic.iter()
        .zip(system.iter())
        .map(|(&m, &s)| (m as i32 + s as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect()
}

/// Peak and RMS levels in dBFS relative to int16 full scale.
///
/// Returns negative infinity for an empty or all-zero signal.
pub fn analyze_levels(samples: &[i16]) -> (f32, f32) {
    let peak = samples
        .iter()
        .map(|&s| (s as f32).abs())
        .fold(0.0f32, f32::max);
    let rms = rms_raw(samples);
    let to_db = |v: f32| {
        if v > 0.0 {
            20.0 * (v / FULL_SCALE).log10()
        } else {
            f32::NEG_INFINITY
        }
    };
    (to_db(peak), to_db(rms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, sample_rate: u32, secs: f32, amplitude_db: f32) -> Vec<i16> {
        let amp = db_to_linear(amplitude_db) * FULL_SCALE;
        let count = (sample_rate as f32 * secs) as usize;
        (0..count)
            .map(|n| {
                let t = n as f32 / sample_rate as f32;
                (amp * (2.0 * std::f32::consts::PI * freq * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn gain_zero_db_is_identity() {
        let samples = sine(440.0, 8000, 0.1, -12.0);
        assert_eq!(apply_gain(&samples, 0.0), samples);
    }

    #[test]
    fn gain_six_db_doubles() {
        let out = apply_gain(&[1000, -1000], 6.0206);
        assert!((out[0] - 2000).abs() <= 1);
        assert!((out[1] + 2000).abs() <= 1);
    }

    #[test]
    fn gain_clips_to_int16_range() {
        let out = apply_gain(&[30000, -30000], 12.0);
        assert_eq!(out, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn every_transform_handles_empty_input() {
        assert!(apply_gain(&[], 6.0).is_empty());
        assert!(high_pass_filter(&[], 44_100, 80.0).is_empty());
        assert!(noise_gate(&[], 44_100, -45.0, 5.0, 60.0, 150.0, 0.1).is_empty());
        assert!(compressor(&[], -12.0, 3.0, 2.0).is_empty());
        assert!(normalize(&[], -6.0).is_empty());
        assert!(reduce_echo(&[], &[1, 2], 44_100, 0.5).is_empty());
        assert!(mix_tracks(&[], &[]).is_empty());
        assert_eq!(analyze_levels(&[]), (f32::NEG_INFINITY, f32::NEG_INFINITY));
    }

    #[test]
    fn high_pass_removes_dc_offset() {
        let samples = vec![8000i16; 4000];
        let out = high_pass_filter(&samples, 8000, 80.0);
        assert_eq!(out.len(), samples.len());
        // A constant input decays toward zero within the filter time constant.
        assert!(out[out.len() - 1].abs() < 100);
    }

    #[test]
    fn high_pass_passes_signal_above_cutoff() {
        let samples = sine(1000.0, 8000, 0.5, -12.0);
        let out = high_pass_filter(&samples, 8000, 80.0);
        let (_, rms_in) = analyze_levels(&samples);
        let (_, rms_out) = analyze_levels(&out);
        assert!((rms_in - rms_out).abs() < 0.5);
    }

    #[test]
    fn gate_multiplier_stays_within_floor_and_unity() {
        let floor = 0.2;
        // Loud burst followed by near-silence, so the gate traverses attack,
        // hold, and release.
        let mut samples = sine(500.0, 8000, 0.25, -6.0);
        samples.extend(std::iter::repeat(30i16).take(8000));
        let out = noise_gate(&samples, 8000, -30.0, 5.0, 40.0, 50.0, floor);

        assert_eq!(out.len(), samples.len());
        for (&y, &x) in out.iter().zip(samples.iter()) {
            let xf = (x as f32).abs();
            let yf = (y as f32).abs();
            assert!(yf <= xf + 1.0, "gate amplified a sample");
            assert!(yf >= floor * xf - 1.0, "gate fell below its floor");
        }
    }

    #[test]
    fn gate_passes_loud_signal_after_attack() {
        let samples = sine(500.0, 8000, 0.5, -12.0);
        let out = noise_gate(&samples, 8000, -40.0, 5.0, 60.0, 150.0, 0.1);
        // Skip the attack ramp, then expect near-unity gain.
        let settled_in = &samples[800..];
        let settled_out = &out[800..];
        let (_, rms_in) = analyze_levels(settled_in);
        let (_, rms_out) = analyze_levels(settled_out);
        assert!((rms_in - rms_out).abs() < 0.3);
    }

    #[test]
    fn gate_attenuates_noise_floor() {
        let quiet = sine(500.0, 8000, 1.0, -60.0);
        let out = noise_gate(&quiet, 8000, -40.0, 5.0, 20.0, 0.0, 0.1);
        let (_, rms_in) = analyze_levels(&quiet);
        let (_, rms_out) = analyze_levels(&out);
        assert!(rms_out < rms_in - 10.0);
    }

    #[test]
    fn compressor_reduces_peaks_above_threshold() {
        let samples = sine(500.0, 8000, 0.25, -3.0);
        let out = compressor(&samples, -12.0, 4.0, 0.0);
        let (peak_in, _) = analyze_levels(&samples);
        let (peak_out, _) = analyze_levels(&out);
        // 9 dB over threshold at 4:1 leaves ~2.25 dB over.
        assert!(peak_out < peak_in - 5.0);
        assert!(peak_out > -12.5);
    }

    #[test]
    fn compressor_below_threshold_applies_only_makeup() {
        let samples = sine(500.0, 8000, 0.25, -30.0);
        let out = compressor(&samples, -12.0, 4.0, 0.0);
        // Quantization aside, a signal under the threshold passes through.
        for (&y, &x) in out.iter().zip(samples.iter()) {
            assert!((y as i32 - x as i32).abs() <= 1);
        }
    }

    #[test]
    fn normalize_reaches_target_rms() {
        // Tone RMS starts at -23 dBFS; an 11 dB boost is under the gain cap.
        let samples = sine(500.0, 8000, 0.5, -20.0);
        let out = normalize(&samples, -12.0);
        let (_, rms) = analyze_levels(&out);
        assert_relative_eq!(rms, -12.0, epsilon = 0.3);
    }

    #[test]
    fn normalize_is_idempotent_within_tolerance() {
        let samples = sine(500.0, 8000, 0.5, -15.0);
        let once = normalize(&samples, -12.0);
        let twice = normalize(&once, -12.0);
        let (_, rms_once) = analyze_levels(&once);
        let (_, rms_twice) = analyze_levels(&twice);
        assert!((rms_once - rms_twice).abs() < 0.2);
    }

    #[test]
    fn normalize_caps_gain_at_five_x() {
        let samples = sine(500.0, 8000, 0.5, -40.0);
        let out = normalize(&samples, -3.0);
        let (_, rms_in) = analyze_levels(&samples);
        let (_, rms_out) = analyze_levels(&out);
        // 5.0x linear is ~14 dB; the 37 dB requested boost must be capped.
        assert!((rms_out - rms_in - 13.98).abs() < 0.3);
    }

    #[test]
    fn normalize_skips_near_silence() {
        let silence = vec![0i16; 1000];
        assert_eq!(normalize(&silence, -6.0), silence);
    }

    #[test]
    fn echo_uncorrelated_signals_pass_through() {
        let system = sine(700.0, 8000, 0.2, -12.0);
        let mic = sine(1100.0, 8000, 0.2, -12.0);
        assert_eq!(reduce_echo(&system, &mic, 8000, 0.8), system);
    }

    #[test]
    fn echo_correlated_signal_is_attenuated() {
        let mic = sine(500.0, 8000, 0.2, -12.0);
        let system = apply_gain(&mic, -3.0); // system carries a copy of the mic
        let out = reduce_echo(&system, &mic, 8000, 0.8);
        let (_, rms_before) = analyze_levels(&system);
        let (_, rms_after) = analyze_levels(&out);
        assert!(rms_after < rms_before - 3.0);
    }

    #[test]
    fn echo_empty_mic_leaves_system_unchanged() {
        let system = sine(700.0, 8000, 0.1, -12.0);
        assert_eq!(reduce_echo(&system, &[], 8000, 0.5), system);
    }

    #[test]
    fn mix_truncates_to_common_prefix() {
        let mic = vec![100i16; 10];
        let system = vec![200i16; 6];
        let out = mix_tracks(&mic, &system);
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|&s| s == 300));
    }

    #[test]
    fn mix_with_one_empty_returns_other_exactly() {
        let mic = vec![1i16, 2, 3];
        assert_eq!(mix_tracks(&mic, &[]), mic);
        assert_eq!(mix_tracks(&[], &mic), mic);
    }

    #[test]
    fn mix_clips_instead_of_wrapping() {
        let out = mix_tracks(&[30_000, -30_000], &[30_000, -30_000]);
        assert_eq!(out, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn levels_of_full_scale_square_wave() {
        let samples = vec![i16::MAX; 100];
        let (peak, rms) = analyze_levels(&samples);
        assert_relative_eq!(peak, 0.0, epsilon = 0.01);
        assert_relative_eq!(rms, 0.0, epsilon = 0.01);
    }

    #[test]
    fn levels_of_sine_tone() {
        let samples = sine(500.0, 8000, 1.0, -20.0);
        let (peak, rms) = analyze_levels(&samples);
        assert_relative_eq!(peak, -20.0, epsilon = 0.1);
        // Sine RMS sits 3.01 dB below its peak.
        assert_relative_eq!(rms, -23.01, epsilon = 0.1);
    }
}

//! The mixdown chain shared by live windows and the final render.

use crate::models::config::RecorderConfig;

use super::dsp;

/// Run the full processing chain over one window or a whole session.
///
/// Stage order is contractual: each source is cleaned individually
/// (high-pass → gain → gate on the mic) before the mix so gated noise never
/// leaks into the mixed signal; echo reduction runs before the mix because
/// it needs both sources separately; compression and normalization run on
/// the already-mixed signal to control final loudness.
///
/// Either source may be empty — a mic-only or system-only window is valid
/// and passes through the same chain.
pub fn render_mix(mic: &[i16], system: &[i16], config: &RecorderConfig) -> Vec<i16> {
    let mic = condition_source(mic, config, true);
    let mut system = condition_source(system, config, false);

    if config.echo_reduction_enabled && !mic.is_empty() && !system.is_empty() {
        system = dsp::reduce_echo(&system, &mic, config.sample_rate, config.echo_strength);
    }

    let mut mixed = dsp::mix_tracks(&mic, &system);

    if config.compressor_enabled {
        mixed = dsp::compressor(
            &mixed,
            config.compressor_threshold_db,
            config.compressor_ratio,
            config.compressor_makeup_db,
        );
    }
    if config.normalize_enabled {
        mixed = dsp::normalize(&mixed, config.normalize_target_db);
    }

    // Whole interleaved frames only.
    let remainder = mixed.len() % config.channels as usize;
    if remainder != 0 {
        mixed.truncate(mixed.len() - remainder);
    }
    mixed
}

fn condition_source(samples: &[i16], config: &RecorderConfig, is_mic: bool) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut out = if config.highpass_enabled {
        dsp::high_pass_filter(samples, config.sample_rate, config.highpass_cutoff_hz)
    } else {
        samples.to_vec()
    };
    let gain_db = if is_mic {
        config.mic_gain_db
    } else {
        config.system_gain_db
    };
    out = dsp::apply_gain(&out, gain_db);
    if is_mic && config.gate_enabled {
        out = dsp::noise_gate(
            &out,
            config.sample_rate,
            config.gate_threshold_db,
            config.gate_attack_ms,
            config.gate_release_ms,
            config.gate_hold_ms,
            config.gate_floor,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough_config() -> RecorderConfig {
        RecorderConfig {
            sample_rate: 8000,
            highpass_enabled: false,
            gate_enabled: false,
            echo_reduction_enabled: false,
            compressor_enabled: false,
            normalize_enabled: false,
            mic_gain_db: 0.0,
            system_gain_db: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn empty_sources_render_empty() {
        let config = passthrough_config();
        assert!(render_mix(&[], &[], &config).is_empty());
    }

    #[test]
    fn all_stages_disabled_is_a_plain_mix() {
        let config = passthrough_config();
        let mic = vec![100i16, 200, 300, 400];
        let system = vec![10i16, 20, 30, 40];
        assert_eq!(render_mix(&mic, &system, &config), vec![110, 220, 330, 440]);
    }

    #[test]
    fn mic_only_window_passes_the_mix_unchanged() {
        let mut config = passthrough_config();
        config.gate_enabled = true;
        let mic: Vec<i16> = (0..8000).map(|n| ((n % 100) * 300 - 15_000) as i16).collect();

        let mixed = render_mix(&mic, &[], &config);
        let conditioned = condition_source(&mic, &config, true);
        assert_eq!(mixed, conditioned);
    }

    #[test]
    fn output_length_is_common_prefix() {
        let config = passthrough_config();
        let mic = vec![1i16; 1000];
        let system = vec![1i16; 600];
        assert_eq!(render_mix(&mic, &system, &config).len(), 600);
    }

    #[test]
    fn output_is_whole_frames() {
        let config = passthrough_config(); // stereo
        let mic = vec![1i16; 7]; // odd length
        let out = render_mix(&mic, &[], &config);
        assert_eq!(out.len() % 2, 0);
    }
}

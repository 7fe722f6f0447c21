//! Offline renders of the session mix.

use redub_core::Track;

/// Vocal-only mono render at the vocal gain ("save take").
pub fn render_solo_vocal(vocal: &Track, vocal_gain: f32) -> Track {
    let samples = vocal
        .channel(0)
        .iter()
        .map(|s| s * vocal_gain)
        .collect();
    Track::mono(samples, vocal.sample_rate())
}

/// Instrumental plus optional vocal, rendered to stereo at the
/// instrumental's rate and length ("export"). The mono vocal is broadcast
/// to both output channels. No clipping is applied; that happens at
/// encode time.
pub fn render_full_mix(
    instrumental: &Track,
    vocal: Option<&Track>,
    instrumental_gain: f32,
    vocal_gain: f32,
) -> Track {
    let frames = instrumental.len_samples();
    let vocal_data = vocal.map(|t| t.channel(0));

    let channels = (0..2)
        .map(|ch| {
            let inst = instrumental.channel(ch.min(instrumental.channel_count() - 1));
            (0..frames)
                .map(|i| {
                    let voc = vocal_data.and_then(|v| v.get(i)).copied().unwrap_or(0.0);
                    inst[i] * instrumental_gain + voc * vocal_gain
                })
                .collect()
        })
        .collect();

    Track::new(channels, instrumental.sample_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solo_vocal_applies_gain() {
        let vocal = Track::mono(vec![0.5, -0.5, 1.0], 44100);
        let render = render_solo_vocal(&vocal, 0.8);

        assert_eq!(render.channel_count(), 1);
        assert_eq!(render.channel(0), &[0.4, -0.4, 0.8]);
    }

    #[test]
    fn test_full_mix_broadcasts_mono_sources() {
        let instrumental = Track::mono(vec![0.5, 0.5], 44100);
        let vocal = Track::mono(vec![0.25, 0.25], 44100);
        let render = render_full_mix(&instrumental, Some(&vocal), 0.5, 1.0);

        assert_eq!(render.channel_count(), 2);
        assert_eq!(render.channel(0), &[0.5, 0.5]);
        assert_eq!(render.channel(1), &[0.5, 0.5]);
    }

    #[test]
    fn test_full_mix_sized_to_instrumental() {
        let instrumental = Track::new(vec![vec![0.2; 100], vec![0.4; 100]], 48000);
        let vocal = Track::mono(vec![1.0; 40], 48000);
        let render = render_full_mix(&instrumental, Some(&vocal), 1.0, 0.5);

        assert_eq!(render.len_samples(), 100);
        assert_eq!(render.sample_rate(), 48000);
        // Stereo instrumental keeps its channel split
        assert_eq!(render.channel(0)[0], 0.2 + 0.5);
        assert_eq!(render.channel(1)[0], 0.4 + 0.5);
        // Past the vocal's end only the instrumental remains
        assert_eq!(render.channel(0)[50], 0.2);
    }

    #[test]
    fn test_full_mix_without_vocal() {
        let instrumental = Track::mono(vec![0.3; 10], 44100);
        let render = render_full_mix(&instrumental, None, 1.0, 1.0);

        assert_eq!(render.channel(0), render.channel(1));
        assert_eq!(render.channel(0)[0], 0.3);
    }

    #[test]
    fn test_render_is_deterministic() {
        let instrumental = Track::mono((0..500).map(|i| (i as f32 * 0.01).sin()).collect(), 44100);
        let vocal = Track::mono((0..300).map(|i| (i as f32 * 0.02).cos()).collect(), 44100);

        let a = render_full_mix(&instrumental, Some(&vocal), 0.5, 0.8);
        let b = render_full_mix(&instrumental, Some(&vocal), 0.5, 0.8);
        assert_eq!(a.channel(0), b.channel(0));
        assert_eq!(a.channel(1), b.channel(1));
    }

    #[test]
    fn test_full_mix_does_not_clip() {
        let instrumental = Track::mono(vec![0.9], 44100);
        let vocal = Track::mono(vec![0.9], 44100);
        let render = render_full_mix(&instrumental, Some(&vocal), 1.0, 1.0);

        // Sum exceeds 1.0 and is preserved; clamping is the encoder's job
        assert!((render.channel(0)[0] - 1.8).abs() < 1e-6);
    }
}

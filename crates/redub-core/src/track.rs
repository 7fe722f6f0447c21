//! Decoded audio track representation

use serde::{Deserialize, Serialize};

/// Decoded audio: one sample array per channel plus a sample rate.
///
/// A track is immutable once constructed. Components that need a modified
/// view (a slice for a split segment, a mono downmix for capture) build a
/// new track instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Per-channel sample data, normalized to [-1.0, 1.0]
    #[serde(skip)]
    channels: Vec<Vec<f32>>,
    /// Sample rate in Hz
    sample_rate: u32,
}

impl Track {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self { channels, sample_rate }
    }

    /// Single-channel track from one sample array.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Samples per channel.
    pub fn len_samples(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.len_samples() as f64 / self.sample_rate as f64
    }

    /// Average all channels into a single sample array.
    pub fn downmix_mono(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let frames = self.len_samples();
        let count = self.channels.len() as f32;
        (0..frames)
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / count)
            .collect()
    }

    /// Slice a time range out of this track, returning `None` when the
    /// range rounds to zero samples.
    pub fn slice_secs(&self, start_secs: f64, duration_secs: f64) -> Option<Track> {
        let rate = self.sample_rate as f64;
        let start = (start_secs * rate).floor() as usize;
        let end = ((start_secs + duration_secs) * rate).floor() as usize;
        if end <= start {
            return None;
        }

        let channels = self
            .channels
            .iter()
            .map(|data| {
                let end = end.min(data.len());
                let start = start.min(end);
                data[start..end].to_vec()
            })
            .collect();
        Some(Track::new(channels, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_sample_count() {
        let track = Track::mono(vec![0.0; 44100], 44100);
        assert_eq!(track.duration_secs(), 1.0);
        assert_eq!(track.len_samples(), 44100);
        assert_eq!(track.channel_count(), 1);
    }

    #[test]
    fn test_slice_secs_bounds() {
        let samples: Vec<f32> = (0..1000).map(|i| i as f32 / 1000.0).collect();
        let track = Track::mono(samples, 100);

        // 2s..5s of a 10s track at 100Hz -> samples 200..500
        let slice = track.slice_secs(2.0, 3.0).unwrap();
        assert_eq!(slice.len_samples(), 300);
        assert_eq!(slice.channel(0)[0], 0.2);

        // Zero-length range yields nothing
        assert!(track.slice_secs(2.0, 0.0).is_none());
        assert!(track.slice_secs(2.0, -1.0).is_none());
    }

    #[test]
    fn test_slice_secs_clamps_past_end() {
        let track = Track::mono(vec![0.5; 100], 100);
        let slice = track.slice_secs(0.5, 10.0).unwrap();
        assert_eq!(slice.len_samples(), 50);
    }

    #[test]
    fn test_downmix_mono_averages_channels() {
        let track = Track::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 44100);
        assert_eq!(track.downmix_mono(), vec![0.5, 0.5]);
    }
}

//! Synchronized playback of the instrumental and flattened vocal buffers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use redub_core::Track;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
#[error("resample failed: {0}")]
pub struct ResampleError(String);

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output devices found")]
    NoDevices,
    #[error("failed to get default output config: {0}")]
    Config(String),
    #[error("failed to build output stream: {0}")]
    Stream(String),
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// Track gains read by the realtime callback on every buffer, so slider
/// moves are audible without restarting playback. Stored as f32 bits in
/// atomics; values clamp to [0.0, 1.0].
pub struct LiveGains {
    instrumental_raw: AtomicU32,
    vocal_raw: AtomicU32,
}

impl LiveGains {
    pub fn new(instrumental: f32, vocal: f32) -> Self {
        let gains = Self {
            instrumental_raw: AtomicU32::new(0),
            vocal_raw: AtomicU32::new(0),
        };
        gains.set_instrumental(instrumental);
        gains.set_vocal(vocal);
        gains
    }

    pub fn instrumental(&self) -> f32 {
        f32::from_bits(self.instrumental_raw.load(Ordering::Relaxed))
    }

    pub fn vocal(&self) -> f32 {
        f32::from_bits(self.vocal_raw.load(Ordering::Relaxed))
    }

    pub fn set_instrumental(&self, gain: f32) {
        self.instrumental_raw
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn set_vocal(&self, gain: f32) {
        self.vocal_raw
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

/// Everything the output callback needs to play the session from an offset.
pub struct PlaybackMix {
    pub instrumental: Arc<Track>,
    /// Flattened vocal buffer, mono, broadcast to all output channels.
    pub vocal: Option<Arc<Track>>,
    pub gains: Arc<LiveGains>,
}

/// Seam between the timeline engine and the audio output device.
pub trait PlaybackSink {
    /// Start (or restart) playback of the mix at `offset_secs`. A sink that
    /// is already playing restarts at the new offset.
    fn start(&mut self, mix: PlaybackMix, offset_secs: f64) -> Result<(), PlaybackError>;

    /// Stop playback. Safe to call when nothing is playing.
    fn stop(&mut self);
}

struct ActiveStream {
    stop_flag: Arc<AtomicBool>,
    _stream: cpal::Stream,
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

/// cpal-backed output sink on the default device.
pub struct CpalPlayback {
    active: Option<ActiveStream>,
}

impl CpalPlayback {
    pub fn new() -> Self {
        Self { active: None }
    }
}

impl Default for CpalPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSink for CpalPlayback {
    fn start(&mut self, mix: PlaybackMix, offset_secs: f64) -> Result<(), PlaybackError> {
        self.stop();

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(PlaybackError::NoDevices)?;
        let supported_config = device
            .default_output_config()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        let device_rate = supported_config.sample_rate().0;
        let out_channels = supported_config.channels() as usize;

        // Convert both buffers to the device rate up front; the callback
        // then just walks a cursor.
        let track_rate = mix.instrumental.sample_rate();
        let instrumental: Vec<Vec<f32>> = mix
            .instrumental
            .channels()
            .iter()
            .map(|ch| resample(ch, track_rate, device_rate))
            .collect::<Result<_, _>>()?;
        let vocal: Option<Vec<f32>> = match &mix.vocal {
            Some(track) => Some(resample(track.channel(0), track.sample_rate(), device_rate)?),
            None => None,
        };
        let gains = mix.gains;

        let mut cursor = (offset_secs * device_rate as f64).floor() as usize;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let config: StreamConfig = supported_config.into();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stop_clone.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        return;
                    }
                    let inst_gain = gains.instrumental();
                    let vocal_gain = gains.vocal();

                    for frame in data.chunks_mut(out_channels) {
                        for (ch, out) in frame.iter_mut().enumerate() {
                            let inst_ch = &instrumental[ch.min(instrumental.len() - 1)];
                            let inst = inst_ch.get(cursor).copied().unwrap_or(0.0);
                            let voc = vocal
                                .as_ref()
                                .and_then(|v| v.get(cursor))
                                .copied()
                                .unwrap_or(0.0);
                            *out = inst * inst_gain + voc * vocal_gain;
                        }
                        cursor += 1;
                    }
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        stream.play().map_err(|e| PlaybackError::Stream(e.to_string()))?;

        info!(device_rate, out_channels, offset_secs, "Playback started");

        self.active = Some(ActiveStream {
            stop_flag,
            _stream: stream,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop_flag.store(true, Ordering::SeqCst);
            info!("Playback stopped");
        }
    }
}

/// Sinc resampling between sample rates; pass-through when they match.
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ResampleError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| ResampleError(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| ResampleError(e.to_string()))?;

    Ok(output.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_gains_clamp() {
        let gains = LiveGains::new(0.5, 0.8);
        assert_eq!(gains.instrumental(), 0.5);
        assert_eq!(gains.vocal(), 0.8);

        gains.set_vocal(1.7);
        assert_eq!(gains.vocal(), 1.0);
        gains.set_instrumental(-0.2);
        assert_eq!(gains.instrumental(), 0.0);
    }

    #[test]
    fn test_resample_passthrough_when_rates_match() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 44100, 44100).unwrap(), samples);
        assert_eq!(resample(&[], 44100, 48000).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_resample_changes_length_by_ratio() {
        let samples: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.05).sin()).collect();
        let out = resample(&samples, 44100, 22050).unwrap();
        let expected = samples.len() as f64 * 0.5;
        assert!((out.len() as f64 - expected).abs() / expected < 0.05);
    }
}

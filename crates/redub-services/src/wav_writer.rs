//! 16-bit PCM WAV serialization for take and mix exports.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unsupported channel count {0} (expected 1 or 2)")]
    UnsupportedChannelCount(usize),
    #[error("channel sample counts differ: {0} vs {1}")]
    ChannelLengthMismatch(usize, usize),
    #[error("sample rate must be positive")]
    ZeroSampleRate,
    #[error("WAV write failed: {0}")]
    Write(#[from] hound::Error),
}

/// Serialize one or two equal-length channels of f32 samples into a
/// 16-bit little-endian PCM WAV container (44-byte canonical header,
/// interleaved data).
pub fn encode(channels: &[Vec<f32>], sample_rate: u32) -> Result<Vec<u8>, EncodeError> {
    if channels.is_empty() || channels.len() > 2 {
        return Err(EncodeError::UnsupportedChannelCount(channels.len()));
    }
    if sample_rate == 0 {
        return Err(EncodeError::ZeroSampleRate);
    }
    let frames = channels[0].len();
    for ch in &channels[1..] {
        if ch.len() != frames {
            return Err(EncodeError::ChannelLengthMismatch(frames, ch.len()));
        }
    }

    let spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for i in 0..frames {
        for ch in channels {
            writer.write_sample(quantize(ch[i]))?;
        }
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

/// Clamp to [-1.0, 1.0] and convert to i16. The negative half scales by
/// 32768 and the positive half by 32767, so the full float range maps onto
/// the signed 16-bit range with -1.0 landing exactly on i16::MIN.
fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

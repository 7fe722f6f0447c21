//! Manual RIFF/WAV parser that handles extended fmt chunks and various bit depths.

use std::io::{Cursor, Read, Seek, SeekFrom};

use redub_core::Track;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not a RIFF container")]
    NotRiff,
    #[error("not a WAVE stream")]
    NotWave,
    #[error("truncated {0} chunk")]
    Truncated(&'static str),
    #[error("no data chunk")]
    NoData,
    #[error("invalid fmt chunk")]
    InvalidFormat,
    #[error("unsupported audio format {0}")]
    UnsupportedFormat(u16),
    #[error("unsupported bit depth {0}")]
    UnsupportedBitDepth(u16),
}

/// Decode WAV bytes into a channel-separated track.
pub fn decode(bytes: &[u8]) -> Result<Track, DecodeError> {
    let mut r = Cursor::new(bytes);
    let mut buf4 = [0u8; 4];
    let mut buf2 = [0u8; 2];

    // RIFF header
    r.read_exact(&mut buf4).map_err(|_| DecodeError::NotRiff)?;
    if &buf4 != b"RIFF" {
        return Err(DecodeError::NotRiff);
    }
    r.read_exact(&mut buf4).map_err(|_| DecodeError::NotRiff)?; // file size, skip
    r.read_exact(&mut buf4).map_err(|_| DecodeError::NotWave)?;
    if &buf4 != b"WAVE" {
        return Err(DecodeError::NotWave);
    }

    let mut sample_rate = 0u32;
    let mut channels = 0u16;
    let mut bits_per_sample = 0u16;
    let mut audio_format = 0u16;
    let mut data_bytes: Vec<u8> = Vec::new();
    let mut saw_data = false;

    // Walk chunks
    loop {
        let Ok(()) = r.read_exact(&mut buf4) else { break };
        let chunk_id = buf4;
        let Ok(()) = r.read_exact(&mut buf4) else { break };
        let chunk_size = u32::from_le_bytes(buf4);

        if &chunk_id == b"fmt " {
            r.read_exact(&mut buf2).map_err(|_| DecodeError::Truncated("fmt"))?;
            audio_format = u16::from_le_bytes(buf2);
            r.read_exact(&mut buf2).map_err(|_| DecodeError::Truncated("fmt"))?;
            channels = u16::from_le_bytes(buf2);
            r.read_exact(&mut buf4).map_err(|_| DecodeError::Truncated("fmt"))?;
            sample_rate = u32::from_le_bytes(buf4);
            r.read_exact(&mut buf4).ok(); // byte rate
            r.read_exact(&mut buf2).ok(); // block align
            r.read_exact(&mut buf2).map_err(|_| DecodeError::Truncated("fmt"))?;
            bits_per_sample = u16::from_le_bytes(buf2);
            // Skip remaining fmt bytes (extended chunk)
            let read_so_far = 16u32;
            if chunk_size > read_so_far {
                r.seek(SeekFrom::Current((chunk_size - read_so_far) as i64)).ok();
            }
            continue;
        }

        if &chunk_id == b"data" {
            data_bytes.resize(chunk_size as usize, 0);
            r.read_exact(&mut data_bytes).map_err(|_| DecodeError::Truncated("data"))?;
            saw_data = true;
            break;
        }

        // Skip unknown chunk
        r.seek(SeekFrom::Current(chunk_size as i64)).ok();
    }

    if !saw_data {
        return Err(DecodeError::NoData);
    }
    if channels == 0 || sample_rate == 0 {
        return Err(DecodeError::InvalidFormat);
    }
    // audio_format 1 = PCM, 3 = IEEE float, 65534 = WAVE_FORMAT_EXTENSIBLE
    if audio_format != 1 && audio_format != 3 && audio_format != 65534 {
        return Err(DecodeError::UnsupportedFormat(audio_format));
    }

    let interleaved: Vec<f32> = match (audio_format, bits_per_sample) {
        (3, 32) => data_bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        (_, 16) => data_bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect(),
        (_, 24) => data_bytes
            .chunks_exact(3)
            .map(|b| {
                let val = (b[0] as i32) | ((b[1] as i32) << 8) | ((b[2] as i32) << 16);
                let signed = if val & 0x800000 != 0 { val | !0xFFFFFF } else { val };
                signed as f32 / 8388608.0
            })
            .collect(),
        (_, 32) => data_bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2147483648.0)
            .collect(),
        _ => return Err(DecodeError::UnsupportedBitDepth(bits_per_sample)),
    };

    debug!(channels, sample_rate, bits_per_sample, samples = interleaved.len(), "decoded WAV");

    Ok(Track::new(split_channels(&interleaved, channels as usize), sample_rate))
}

/// Split interleaved samples into per-channel arrays.
fn split_channels(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = interleaved.len() / channels;
    let mut split = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            split[ch].push(sample);
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-build a minimal WAV: 44-byte header + raw data.
    fn build_wav(format: u16, channels: u16, rate: u32, bits: u16, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&format.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * channels as u32 * bits as u32 / 8).to_le_bytes());
        out.extend_from_slice(&(channels * bits / 8).to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_decode_pcm16_stereo_deinterleaves() {
        let mut data = Vec::new();
        for (l, r) in [(16384i16, -16384i16), (0, 32767)] {
            data.extend_from_slice(&l.to_le_bytes());
            data.extend_from_slice(&r.to_le_bytes());
        }
        let track = decode(&build_wav(1, 2, 48000, 16, &data)).unwrap();

        assert_eq!(track.channel_count(), 2);
        assert_eq!(track.sample_rate(), 48000);
        assert_eq!(track.len_samples(), 2);
        assert_eq!(track.channel(0), &[0.5, 0.0]);
        assert_eq!(track.channel(1)[0], -0.5);
    }

    #[test]
    fn test_decode_float32() {
        let mut data = Vec::new();
        for s in [0.25f32, -1.0, 0.0] {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let track = decode(&build_wav(3, 1, 44100, 32, &data)).unwrap();
        assert_eq!(track.channel(0), &[0.25, -1.0, 0.0]);
    }

    #[test]
    fn test_decode_pcm24() {
        // -8388608 (min) and 4194304 (0.5) as little-endian 24-bit
        let data = [0x00, 0x00, 0x80, 0x00, 0x00, 0x40];
        let track = decode(&build_wav(1, 1, 44100, 24, &data)).unwrap();
        assert_eq!(track.channel(0), &[-1.0, 0.5]);
    }

    #[test]
    fn test_decode_skips_unknown_chunks() {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&0u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        // LIST chunk before fmt
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(b"INFO");
        let rest = build_wav(1, 1, 8000, 16, &0i16.to_le_bytes());
        wav.extend_from_slice(&rest[12..]);

        let track = decode(&wav).unwrap();
        assert_eq!(track.sample_rate(), 8000);
        assert_eq!(track.len_samples(), 1);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(decode(b"OggS"), Err(DecodeError::NotRiff)));
        assert!(matches!(decode(b"RIFF\x00\x00\x00\x00MP3 "), Err(DecodeError::NotWave)));
        // fmt but no data chunk
        let headerless = &build_wav(1, 1, 44100, 16, &[])[..36];
        assert!(matches!(decode(headerless), Err(DecodeError::NoData)));
        // truncated data chunk
        let mut short = build_wav(1, 1, 44100, 16, &[0u8; 4]);
        short.truncate(short.len() - 2);
        assert!(matches!(short_decode_err(&short), DecodeError::Truncated(_)));
        // unsupported codec id
        assert!(matches!(
            decode(&build_wav(85, 1, 44100, 16, &[0u8; 2])),
            Err(DecodeError::UnsupportedFormat(85))
        ));
    }

    fn short_decode_err(bytes: &[u8]) -> DecodeError {
        decode(bytes).unwrap_err()
    }
}

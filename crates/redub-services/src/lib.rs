//! redub-services: audio I/O, WAV codecs, and the take-timeline engine

pub mod capture;
pub mod client;
pub mod engine;
pub mod playback;
pub mod renderer;
pub mod wav_reader;
pub mod wav_writer;

pub use capture::{CaptureError, CaptureFormat, CaptureMeter, CaptureStream, CpalCapture};
pub use client::{ApiConfig, HttpStore, MixMetadata, MixStore, PersistAck, StoreError, TrackStore};
pub use engine::{Command, EngineConfig, EngineError, ExportError, LoadError, TimelineEngine};
pub use playback::{CpalPlayback, LiveGains, PlaybackError, PlaybackMix, PlaybackSink};
pub use renderer::{render_full_mix, render_solo_vocal};
pub use wav_reader::{decode, DecodeError};
pub use wav_writer::{encode, EncodeError};

//! The take-timeline engine: transport state machine, take capture, and
//! session export.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver};
use redub_core::{RecordingSegment, SegmentSet, TimelinePosition, Track, TransportState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::capture::{CaptureError, CaptureFormat, CaptureMeter, CaptureStream, CpalCapture};
use crate::client::{MixMetadata, MixStore, PersistAck, StoreError, TrackStore};
use crate::playback::{
    resample, CpalPlayback, LiveGains, PlaybackMix, PlaybackSink, ResampleError,
};
use crate::renderer;
use crate::wav_reader::{self, DecodeError};
use crate::wav_writer::{self, EncodeError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("track fetch failed: {0}")]
    Fetch(#[from] StoreError),
    #[error("track decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("vocal resample failed: {0}")]
    Resample(#[from] ResampleError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no instrumental track loaded")]
    NoInstrumental,
    #[error("nothing recorded yet")]
    NoVocal,
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Engine configuration. The gain defaults mirror the editor this engine
/// was built for: backing track at half volume, vocal forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_instrumental_gain")]
    pub instrumental_gain: f32,
    #[serde(default = "default_vocal_gain")]
    pub vocal_gain: f32,
    /// Capture device name, or "default"
    #[serde(default = "default_capture_device")]
    pub capture_device: String,
}

fn default_instrumental_gain() -> f32 {
    0.5
}

fn default_vocal_gain() -> f32 {
    0.8
}

fn default_capture_device() -> String {
    "default".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instrumental_gain: default_instrumental_gain(),
            vocal_gain: default_vocal_gain(),
            capture_device: default_capture_device(),
        }
    }
}

/// Transport commands, processed strictly in arrival order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Seek(f64),
    StartRecording,
    StopRecording,
}

struct ActiveTake {
    chunks: Receiver<Vec<f32>>,
    format: CaptureFormat,
    start_position: f64,
    saved_vocal_gain: f32,
}

/// Owns all mutable session state: the loaded tracks, gains, playhead,
/// transport state, the segment set, and the flattened vocal buffer.
/// One instance per editing session; commands are serialized through
/// `&mut self`.
pub struct TimelineEngine {
    state: TransportState,
    position: TimelinePosition,
    instrumental: Option<Arc<Track>>,
    /// Flattened vocal buffer, rebuilt whenever the segment set changes
    vocal: Option<Arc<Track>>,
    segments: SegmentSet,
    gains: Arc<LiveGains>,
    playback: Box<dyn PlaybackSink>,
    capture: Box<dyn CaptureStream>,
    meter: Arc<CaptureMeter>,
    /// Monotonic playback origin; position = origin_position + elapsed
    origin_instant: Option<Instant>,
    origin_position: f64,
    active_take: Option<ActiveTake>,
}

impl TimelineEngine {
    /// Engine wired to the default cpal devices.
    pub fn new(config: EngineConfig) -> Self {
        let capture = CpalCapture::new(config.capture_device.clone());
        Self::with_io(config, Box::new(CpalPlayback::new()), Box::new(capture))
    }

    /// Engine with explicit playback/capture implementations. Tests drive
    /// the state machine through in-process fakes.
    pub fn with_io(
        config: EngineConfig,
        playback: Box<dyn PlaybackSink>,
        capture: Box<dyn CaptureStream>,
    ) -> Self {
        Self {
            state: TransportState::Idle,
            position: TimelinePosition::default(),
            instrumental: None,
            vocal: None,
            segments: SegmentSet::new(),
            gains: Arc::new(LiveGains::new(config.instrumental_gain, config.vocal_gain)),
            playback,
            capture,
            meter: Arc::new(CaptureMeter::new()),
            origin_instant: None,
            origin_position: 0.0,
            active_take: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Live playhead position (clock-derived while playing).
    pub fn position(&self) -> TimelinePosition {
        let mut position = self.position;
        position.set_current(self.clock_position());
        position
    }

    pub fn segments(&self) -> &[RecordingSegment] {
        self.segments.segments()
    }

    pub fn flattened_vocal(&self) -> Option<&Track> {
        self.vocal.as_deref()
    }

    pub fn instrumental(&self) -> Option<&Track> {
        self.instrumental.as_deref()
    }

    pub fn meter(&self) -> Arc<CaptureMeter> {
        self.meter.clone()
    }

    pub fn instrumental_gain(&self) -> f32 {
        self.gains.instrumental()
    }

    pub fn set_instrumental_gain(&self, gain: f32) {
        self.gains.set_instrumental(gain);
    }

    pub fn vocal_gain(&self) -> f32 {
        match &self.active_take {
            Some(take) => take.saved_vocal_gain,
            None => self.gains.vocal(),
        }
    }

    /// Set the vocal gain. During capture the live gain stays muted; the
    /// new value takes effect when the take ends.
    pub fn set_vocal_gain(&mut self, gain: f32) {
        match &mut self.active_take {
            Some(take) => take.saved_vocal_gain = gain.clamp(0.0, 1.0),
            None => self.gains.set_vocal(gain),
        }
    }

    /// Dispatch a transport command.
    pub fn apply(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Play => {
                self.play();
                Ok(())
            }
            Command::Pause => {
                self.pause();
                Ok(())
            }
            Command::Seek(secs) => {
                self.seek(secs);
                Ok(())
            }
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
        }
    }

    /// Fetch, decode, and install the backing track. Resets the playhead
    /// and clears any previous takes. No-op while the transport is busy.
    pub fn load_instrumental(
        &mut self,
        store: &dyn TrackStore,
        track_id: &str,
    ) -> Result<(), LoadError> {
        if self.state != TransportState::Idle {
            warn!("load ignored: transport busy");
            return Ok(());
        }

        let bytes = store.fetch_track_bytes(track_id)?;
        let track = wav_reader::decode(&bytes)?;

        info!(
            track_id,
            duration = track.duration_secs(),
            channels = track.channel_count(),
            "instrumental loaded"
        );

        self.position = TimelinePosition::new(track.duration_secs());
        self.instrumental = Some(Arc::new(track));
        self.segments = SegmentSet::new();
        self.vocal = None;
        Ok(())
    }

    /// Fetch and decode a previously persisted vocal take; it becomes a
    /// single segment starting at 0. Requires a loaded instrumental.
    pub fn load_vocal(&mut self, store: &dyn TrackStore, track_id: &str) -> Result<(), LoadError> {
        if self.state != TransportState::Idle {
            warn!("load ignored: transport busy");
            return Ok(());
        }
        let Some(instrumental) = self.instrumental.clone() else {
            warn!("load vocal ignored: no instrumental loaded");
            return Ok(());
        };

        let bytes = store.fetch_track_bytes(track_id)?;
        let decoded = wav_reader::decode(&bytes)?;

        let timeline_rate = instrumental.sample_rate();
        let mono = resample(&decoded.downmix_mono(), decoded.sample_rate(), timeline_rate)?;

        let end = (mono.len() as f64 / timeline_rate as f64).min(self.position.duration());
        let segment = match RecordingSegment::new(Track::mono(mono, timeline_rate), 0.0, end) {
            Ok(segment) => segment,
            Err(e) => {
                warn!("loaded vocal ignored: {e}");
                return Ok(());
            }
        };

        self.segments = SegmentSet::from_single(segment);
        self.vocal = Some(Arc::new(
            self.segments.flatten(self.position.duration(), timeline_rate),
        ));
        info!(track_id, end, "vocal recording loaded");
        Ok(())
    }

    /// Start synchronized playback from the current position. No-op when
    /// no instrumental is loaded, the playhead is at the end, or the
    /// transport is already running.
    pub fn play(&mut self) {
        if self.state != TransportState::Idle {
            return;
        }
        if self.instrumental.is_none() {
            warn!("play ignored: no instrumental loaded");
            return;
        }
        if self.position.remaining() <= 0.0 {
            return;
        }

        let offset = self.position.current();
        if !self.start_sources(offset) {
            return;
        }
        self.origin_instant = Some(Instant::now());
        self.origin_position = offset;
        self.state = TransportState::Playing;
        info!(offset, "playback started");
    }

    /// Stop playback, keeping the playhead where it is. During a take this
    /// commits the take first. Safe to call from any state.
    pub fn pause(&mut self) {
        if self.state.is_recording() {
            if let Err(e) = self.stop_recording() {
                warn!("stop recording on pause failed: {e}");
            }
            return;
        }
        if self.state.is_playing() {
            self.freeze_position();
            self.playback.stop();
            self.origin_instant = None;
            self.state = TransportState::Idle;
            info!(position = self.position.current(), "paused");
        }
    }

    /// Move the playhead, clamped to the timeline. While playing, both
    /// sources restart at the new offset to stay synchronized — no
    /// crossfade. Rejected during recording.
    pub fn seek(&mut self, secs: f64) {
        if self.state.is_recording() {
            warn!("seek rejected while recording");
            return;
        }

        self.position.set_current(secs);

        if self.state.is_playing() {
            let offset = self.position.current();
            self.playback.stop();
            if self.start_sources(offset) {
                self.origin_instant = Some(Instant::now());
                self.origin_position = offset;
            } else {
                self.origin_instant = None;
                self.state = TransportState::Idle;
            }
        }
    }

    /// Jump the playhead back by `secs`.
    pub fn skip_back(&mut self, secs: f64) {
        let target = self.clock_position() - secs;
        self.seek(target);
    }

    /// Open the capture stream and begin a take at the current position,
    /// starting playback if it is not already running. The vocal source is
    /// muted for the duration of the capture. Rejected while a capture is
    /// already active.
    pub fn start_recording(&mut self) -> Result<(), EngineError> {
        if self.state.is_recording() {
            warn!("start recording rejected: capture already active");
            return Ok(());
        }
        if self.instrumental.is_none() {
            warn!("start recording ignored: no instrumental loaded");
            return Ok(());
        }
        self.freeze_position();
        if self.position.remaining() <= 0.0 {
            warn!("start recording ignored: playhead at end of timeline");
            return Ok(());
        }

        // Mute the prior take so the performer doesn't hear it doubled;
        // restored when the capture ends.
        let saved_vocal_gain = self.gains.vocal();
        self.gains.set_vocal(0.0);

        let (tx, rx) = unbounded();
        let format = match self.capture.open(tx, self.meter.clone()) {
            Ok(format) => format,
            Err(e) => {
                self.gains.set_vocal(saved_vocal_gain);
                return Err(e.into());
            }
        };

        if self.state == TransportState::Idle {
            self.play();
            if self.state != TransportState::Playing {
                self.capture.close();
                self.gains.set_vocal(saved_vocal_gain);
                warn!("start recording aborted: playback did not start");
                return Ok(());
            }
        }

        let start_position = self.clock_position();
        self.active_take = Some(ActiveTake {
            chunks: rx,
            format,
            start_position,
            saved_vocal_gain,
        });
        self.state = TransportState::Recording;
        info!(start = start_position, "recording started");
        Ok(())
    }

    /// Close the capture stream, commit the take through the segment
    /// resolver, rebuild the flattened vocal buffer, and stop playback.
    /// Safe to call when no capture is active.
    pub fn stop_recording(&mut self) -> Result<(), EngineError> {
        let Some(take) = self.active_take.take() else {
            warn!("stop recording ignored: no active capture");
            return Ok(());
        };

        self.freeze_position();
        let end_position = self.position.current();

        self.capture.close();
        self.meter.reset();
        self.gains.set_vocal(take.saved_vocal_gain);

        self.playback.stop();
        self.origin_instant = None;
        self.state = TransportState::Idle;

        // Chunks arrive in real-time order; concatenation preserves it.
        let mut captured: Vec<f32> = Vec::new();
        while let Ok(chunk) = take.chunks.try_recv() {
            captured.extend(chunk);
        }

        let result = self.commit_take(captured, take.format, take.start_position, end_position);
        if let Err(e) = &result {
            warn!("take not committed: {e}");
        }
        result
    }

    /// Scheduling tick: refresh the clock-derived position and handle the
    /// end-of-timeline transition. Hosts call this once per UI frame.
    pub fn tick(&mut self) {
        if !self.state.is_playing() {
            return;
        }
        self.freeze_position();
        if self.position.at_end() {
            if self.state.is_recording() {
                // Timeline ran out under an active take: commit it.
                if let Err(e) = self.stop_recording() {
                    warn!("auto-stop at end of timeline failed: {e}");
                }
            } else {
                self.playback.stop();
                self.origin_instant = None;
                self.state = TransportState::Idle;
                info!("playback reached end of timeline");
            }
        }
    }

    /// Render instrumental + vocal to stereo and encode ("export").
    pub fn export_mix(&self) -> Result<Vec<u8>, ExportError> {
        let instrumental = self.instrumental.as_ref().ok_or(ExportError::NoInstrumental)?;
        let rendered = renderer::render_full_mix(
            instrumental,
            self.vocal.as_deref(),
            self.gains.instrumental(),
            self.vocal_gain(),
        );
        Ok(wav_writer::encode(rendered.channels(), rendered.sample_rate())?)
    }

    /// Render the vocal alone to mono and encode ("save take").
    pub fn save_take(&self) -> Result<Vec<u8>, ExportError> {
        let vocal = self.vocal.as_ref().ok_or(ExportError::NoVocal)?;
        let rendered = renderer::render_solo_vocal(vocal, self.vocal_gain());
        Ok(wav_writer::encode(rendered.channels(), rendered.sample_rate())?)
    }

    /// Render the solo take and hand it to the persistence collaborator.
    pub fn persist_take(
        &self,
        store: &dyn MixStore,
        meta: &MixMetadata,
    ) -> Result<PersistAck, EngineError> {
        let bytes = self.save_take()?;
        let ack = store.persist_final_mix(&bytes, meta)?;
        info!(name = %meta.name, "take persisted");
        Ok(ack)
    }

    fn start_sources(&mut self, offset: f64) -> bool {
        let Some(instrumental) = &self.instrumental else {
            return false;
        };
        let mix = PlaybackMix {
            instrumental: instrumental.clone(),
            vocal: self.vocal.clone(),
            gains: self.gains.clone(),
        };
        match self.playback.start(mix, offset) {
            Ok(()) => true,
            Err(e) => {
                warn!("playback start failed: {e}");
                false
            }
        }
    }

    /// Position per the monotonic clock: origin + elapsed, clamped.
    fn clock_position(&self) -> f64 {
        match (self.state.is_playing(), self.origin_instant) {
            (true, Some(origin)) => (self.origin_position + origin.elapsed().as_secs_f64())
                .clamp(0.0, self.position.duration()),
            _ => self.position.current(),
        }
    }

    fn freeze_position(&mut self) {
        let current = self.clock_position();
        self.position.set_current(current);
    }

    /// Build the segment for a finished take and swap in the re-resolved
    /// segment set plus its flattened buffer. All-or-nothing: on any
    /// failure the previous set stays untouched.
    fn commit_take(
        &mut self,
        captured: Vec<f32>,
        format: CaptureFormat,
        start: f64,
        end: f64,
    ) -> Result<(), EngineError> {
        let Some(instrumental) = &self.instrumental else {
            return Ok(());
        };
        let timeline_rate = instrumental.sample_rate();
        let duration = self.position.duration();

        let end = end.min(duration);
        if captured.is_empty() || end <= start {
            info!("empty take discarded");
            return Ok(());
        }

        let mono: Vec<f32> = if format.channels <= 1 {
            captured
        } else {
            let n = format.channels as usize;
            captured
                .chunks(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        };
        let mono = resample(&mono, format.sample_rate, timeline_rate)?;

        let segment = match RecordingSegment::new(Track::mono(mono, timeline_rate), start, end) {
            Ok(segment) => segment,
            Err(e) => {
                warn!("take segment rejected: {e}");
                return Ok(());
            }
        };

        self.segments = self.segments.resolve(segment);
        self.vocal = Some(Arc::new(self.segments.flatten(duration, timeline_rate)));
        info!(segments = self.segments.len(), start, end, "take committed");
        Ok(())
    }
}

impl Drop for TimelineEngine {
    fn drop(&mut self) {
        self.capture.close();
        self.playback.stop();
    }
}

//! Recorded take segments and overlap resolution

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::track::Track;

/// A time-bounded recorded excerpt of vocal audio.
///
/// Invariant: `0 <= start_time < end_time` and the buffer is mono. The
/// engine guarantees `end_time` never exceeds the timeline duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSegment {
    buffer: Track,
    start_time: f64,
    end_time: f64,
}

impl RecordingSegment {
    pub fn new(buffer: Track, start_time: f64, end_time: f64) -> Result<Self> {
        if !(start_time >= 0.0 && start_time < end_time) {
            return Err(CoreError::InvalidSegmentRange {
                start: start_time,
                end: end_time,
            });
        }
        if buffer.channel_count() != 1 {
            return Err(CoreError::NotMono(buffer.channel_count()));
        }
        Ok(Self {
            buffer,
            start_time,
            end_time,
        })
    }

    pub fn buffer(&self) -> &Track {
        &self.buffer
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    fn overlaps(&self, other: &RecordingSegment) -> bool {
        !(self.end_time <= other.start_time || self.start_time >= other.end_time)
    }
}

/// Ordered, pairwise non-overlapping set of recorded segments.
///
/// Rebuilt via [`SegmentSet::resolve`] on every take commit rather than
/// mutated in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentSet {
    segments: Vec<RecordingSegment>,
}

impl SegmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set containing one segment, e.g. a previously persisted take loaded
    /// back into the session.
    pub fn from_single(segment: RecordingSegment) -> Self {
        Self {
            segments: vec![segment],
        }
    }

    pub fn segments(&self) -> &[RecordingSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Merge a newly recorded segment into the set. The incoming segment
    /// wins every overlap: overlapped portions of existing segments are
    /// discarded, with any leading or trailing remainder sliced off and
    /// kept. Slices that round to zero samples are dropped.
    pub fn resolve(&self, incoming: RecordingSegment) -> SegmentSet {
        let mut resolved: Vec<RecordingSegment> = Vec::with_capacity(self.segments.len() + 1);

        for segment in &self.segments {
            if !segment.overlaps(&incoming) {
                resolved.push(segment.clone());
                continue;
            }

            // Leading remainder before the incoming segment
            if segment.start_time < incoming.start_time {
                let duration = incoming.start_time - segment.start_time;
                if let Some(buffer) = segment.buffer.slice_secs(0.0, duration) {
                    resolved.push(RecordingSegment {
                        buffer,
                        start_time: segment.start_time,
                        end_time: incoming.start_time,
                    });
                }
            }

            // Trailing remainder after the incoming segment
            if segment.end_time > incoming.end_time {
                let offset = incoming.end_time - segment.start_time;
                let duration = segment.end_time - incoming.end_time;
                if let Some(buffer) = segment.buffer.slice_secs(offset, duration) {
                    resolved.push(RecordingSegment {
                        buffer,
                        start_time: incoming.end_time,
                        end_time: segment.end_time,
                    });
                }
            }
        }

        resolved.push(incoming);
        resolved.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        SegmentSet { segments: resolved }
    }

    /// Flatten all segments into one continuous mono buffer spanning
    /// `[0, duration_secs)`, silence everywhere no segment covers. Segment
    /// data falling past the end of the buffer is truncated.
    pub fn flatten(&self, duration_secs: f64, sample_rate: u32) -> Track {
        let total_samples = (duration_secs * sample_rate as f64).floor() as usize;
        let mut combined = vec![0.0f32; total_samples];

        for segment in &self.segments {
            let start_sample = (segment.start_time * sample_rate as f64).floor() as usize;
            let data = segment.buffer.channel(0);
            for (i, &sample) in data.iter().enumerate() {
                let Some(slot) = combined.get_mut(start_sample + i) else {
                    break;
                };
                *slot = sample;
            }
        }

        Track::mono(combined, sample_rate)
    }
}

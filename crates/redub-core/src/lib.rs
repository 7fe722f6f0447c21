//! redub-core: Domain types for the redub take-timeline engine

mod error;
mod position;
mod segment;
mod track;
mod transport;

pub use error::{CoreError, Result};
pub use position::TimelinePosition;
pub use segment::{RecordingSegment, SegmentSet};
pub use track::Track;
pub use transport::TransportState;

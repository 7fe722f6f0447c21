//! Error types for redub-core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid segment range {start}..{end}")]
    InvalidSegmentRange { start: f64, end: f64 },
    #[error("segment buffer must be mono, got {0} channels")]
    NotMono(usize),
}

pub type Result<T> = std::result::Result<T, CoreError>;

//! Error taxonomy for the AVI demuxer.
//!
//! Fatal errors mean the container (or the navigator that hit them) must not
//! be used any further. Everything else rejects a single call. Reaching the end
//! of a stream is not an error at all: navigation returns `Ok(None)`.

use std::io;

use thiserror::Error;

use crate::avi_demux::FourCc;

pub type Result<T> = std::result::Result<T, AviError>;

#[derive(Debug, Error)]
pub enum AviError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Tried to read {expected} bytes, got {got} bytes")]
    ShortRead { expected: usize, got: usize },
    #[error("Matching FourCC failed: {found} != {expected}")]
    FourCcMismatch { expected: FourCc, found: FourCc },
    #[error("AVI file format corrupted: duplicated main AVI header \"avih\"")]
    DuplicateMainHeader,
    #[error("Missing main AVI header \"avih\"")]
    MissingMainHeader,
    #[error("Missing required chunk: {0}")]
    MissingChunk(&'static str),
    #[error("No stream found in the AVI file")]
    NoStreams,
    #[error("Too many streams in the AVI file, max supported streams is {limit}")]
    TooManyStreams { limit: usize },
    #[error("Inside LIST(movi): expected LIST(rec ), got LIST({0})")]
    UnexpectedMoviList(FourCc),
    #[error("Chunk \"{id}\" is {size} bytes, at least {min} required")]
    ChunkTooSmall { id: FourCc, size: u64, min: u64 },
    #[error("Index chunk mismatch: {0}")]
    IndexMismatch(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Bad stream id {id} (stream count: {count})")]
    InvalidStream { id: usize, count: usize },
    #[error("Unknown stream packet type: \"{0}\"")]
    UnknownPacketType(FourCc),
    #[error("Stream {stream}: moving backward requires an index")]
    BackwardScanUnsupported { stream: usize },
    #[error("Stream {stream} does not use indexed color")]
    NotIndexedColor { stream: usize },
    #[error("Invalid palette change: {0}")]
    InvalidPaletteChange(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AviError {
    /// True when the error leaves the container or navigator unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AviError::InvalidStream { .. }
                | AviError::BackwardScanUnsupported { .. }
                | AviError::NotIndexedColor { .. }
                | AviError::InvalidPaletteChange(_)
                | AviError::InvalidConfig(_)
                | AviError::Json(_)
        )
    }
}

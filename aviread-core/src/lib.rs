//! # aviread core
//!
//! AVI/RIFF demuxer: container parsing, `idx1` and OpenDML index lookup,
//! per-stream packet navigation and time-based seeking.
//!
//! The library never opens files on its own account and never installs a
//! log subscriber. Callers pass a byte source (any `Read + Seek`) and
//! receive packet locations.

// ============================================================================
// Ambient
// ============================================================================
pub mod config;
pub mod error;
pub mod source;

// ============================================================================
// Container Demuxer
// ============================================================================
pub mod avi_demux;

pub use avi_demux::{Container, PacketSink, StreamReader};
pub use config::DemuxConfig;
pub use error::{AviError, Result};
pub use source::ByteSource;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

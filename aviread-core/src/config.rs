//! Demuxer limits and tunables.

use serde::{Deserialize, Serialize};

use crate::error::{AviError, Result};

/// Where `idx1` entry offsets are measured from.
///
/// Most encoders store offsets relative to the `movi` FourCC, a few write
/// absolute file positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Idx1Anchor {
    /// Probe the first entry and pick whichever anchor lands on a matching chunk tag
    #[default]
    Auto,
    MoviRelative,
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    /// Stream table capacity; a file declaring more streams is rejected.
    pub max_streams: usize,
    /// Stream name buffer size, including the terminator the format reserves.
    pub max_stream_name: usize,
    /// Segment slots in each navigator's OpenDML index cache.
    pub index_cache_capacity: usize,
    pub idx1_anchor: Idx1Anchor,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            max_streams: 8,
            max_stream_name: 64,
            index_cache_capacity: 16,
            idx1_anchor: Idx1Anchor::Auto,
        }
    }
}

impl DemuxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_streams == 0 {
            return Err(AviError::InvalidConfig("max_streams must be at least 1".into()));
        }
        if self.max_stream_name == 0 {
            return Err(AviError::InvalidConfig("max_stream_name must be at least 1".into()));
        }
        if self.index_cache_capacity == 0 {
            return Err(AviError::InvalidConfig(
                "index_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| AviError::InvalidConfig(format!("JSON error: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

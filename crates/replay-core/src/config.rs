//! Replay configuration, loadable from JSON.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReplayError, Result};
use crate::frame::NANOS_PER_SECOND;

/// Sizes and defaults for a replay filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Capacity of the video clip buffer in bytes.
    pub video_buffer_bytes: usize,
    /// Capacity of the audio clip buffer in bytes.
    pub audio_buffer_bytes: usize,
    /// Length of a saved replay when the caller does not give one.
    pub replay_duration_ns: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        // 128 entries per stream
        Self {
            video_buffer_bytes: 128 * 1024 * 1024,
            audio_buffer_bytes: 128 * 16 * 1024,
            replay_duration_ns: 10 * NANOS_PER_SECOND,
        }
    }
}

impl ReplayConfig {
    /// Reject configurations no buffer can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.video_buffer_bytes == 0 {
            return Err(ReplayError::InvalidParameter(
                "video_buffer_bytes must be non-zero".into(),
            ));
        }
        if self.audio_buffer_bytes == 0 {
            return Err(ReplayError::InvalidParameter(
                "audio_buffer_bytes must be non-zero".into(),
            ));
        }
        if self.replay_duration_ns == 0 {
            return Err(ReplayError::InvalidParameter(
                "replay_duration_ns must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| ReplayError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Deserialize and validate. Missing fields take their defaults.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| ReplayError::Serialization(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config = Self::from_json(&data)?;
        debug!(path = %path.display(), "Replay config loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let config = ReplayConfig {
            video_buffer_bytes: 4096,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(ReplayConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = ReplayConfig::from_json(br#"{"audio_buffer_bytes": 512}"#).unwrap();
        assert_eq!(config.audio_buffer_bytes, 512);
        assert_eq!(
            config.video_buffer_bytes,
            ReplayConfig::default().video_buffer_bytes
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ReplayConfig::from_json(br#"{"video_buffer_bytes": 0}"#);
        assert!(matches!(result, Err(ReplayError::InvalidParameter(_))));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let result = ReplayConfig::from_json(b"{not json");
        assert!(matches!(result, Err(ReplayError::Serialization(_))));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().expect("failed to create tempdir");
        let path = tmp.path().join("replay.json");
        std::fs::write(&path, br#"{"replay_duration_ns": 5000000000}"#).unwrap();
        let config = ReplayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.replay_duration_ns, 5 * NANOS_PER_SECOND);

        let missing = ReplayConfig::load_from_file(&tmp.path().join("missing.json"));
        assert!(matches!(missing, Err(ReplayError::Io(_))));
    }
}

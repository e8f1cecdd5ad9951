//! Link configuration
//!
//! Timing and retry parameters for the co-processor link, loadable from a
//! JSON file. Every field has a default, so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::protocol::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS, MAX_FRAME_LEN};

/// Link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port name; `None` picks the platform default
    pub port_name: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Wait after opening the port before flushing stale bytes
    pub open_settle_ms: u64,
    /// Wait after each line-abort control byte
    pub settle_delay_ms: u64,
    /// Wait between a reset command and scanning for its acknowledgement
    pub reset_poll_interval_ms: u64,
    /// Reset attempts before warning that the co-processor is slow to respond
    pub reset_attempts_before_warning: u32,
    /// Total reset attempts before giving up; `None` retries forever
    pub reset_attempt_limit: Option<u32>,
    /// Longest frame accepted before a terminator must appear
    pub max_frame_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            open_settle_ms: 50,
            settle_delay_ms: 20,
            reset_poll_interval_ms: 200,
            reset_attempts_before_warning: 50,
            reset_attempt_limit: Some(250),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl LinkConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ProtocolError> {
        let content = std::fs::read_to_string(path)?;
        let config: LinkConfig = serde_json::from_str(&content)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ProtocolError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProtocolError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the link cannot run with
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.baud_rate == 0 {
            return Err(ProtocolError::Config("baud_rate must be non-zero".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ProtocolError::Config(
                "read_timeout_ms must be non-zero".into(),
            ));
        }
        if self.max_frame_len == 0 {
            return Err(ProtocolError::Config("max_frame_len must be non-zero".into()));
        }
        if self.reset_attempt_limit == Some(0) {
            return Err(ProtocolError::Config(
                "reset_attempt_limit must allow at least one attempt".into(),
            ));
        }
        Ok(())
    }

    /// Configuration with every delay removed, for simulated links and tests.
    /// The read window shrinks to 1ms since such channels never block.
    pub fn immediate() -> Self {
        Self {
            read_timeout_ms: 1,
            open_settle_ms: 0,
            settle_delay_ms: 0,
            reset_poll_interval_ms: 0,
            ..Self::default()
        }
    }

    /// Window for one frame to arrive
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Pause after each line-abort control byte
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Pause between a reset command and scanning for `RST`
    pub fn reset_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reset_poll_interval_ms)
    }

    /// Pause after opening before stale bytes are flushed
    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_wire_protocol() {
        let config = LinkConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.settle_delay(), Duration::from_millis(20));
        assert_eq!(config.reset_poll_interval(), Duration::from_millis(200));
        assert_eq!(config.reset_attempts_before_warning, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LinkConfig =
            serde_json::from_str(r#"{"port_name": "/dev/ttyACM0", "reset_attempt_limit": null}"#)
                .unwrap();
        assert_eq!(config.port_name.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.reset_attempt_limit, None);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.json");
        let config = LinkConfig {
            port_name: Some("COM3".to_string()),
            read_timeout_ms: 250,
            ..LinkConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(LinkConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.json");
        std::fs::write(&path, r#"{"read_timeout_ms": 0}"#).unwrap();
        assert!(matches!(
            LinkConfig::load(&path),
            Err(ProtocolError::Config(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            LinkConfig::load(&path),
            Err(ProtocolError::Config(_))
        ));
    }
}

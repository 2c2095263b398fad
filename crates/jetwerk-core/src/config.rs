// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Controller configuration: device port, protocol timeouts and worker pacing.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Persistent controller settings. All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Device TCP port (default 9100).
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Default acknowledgement timeout for simple commands.
    pub command_timeout_ms: u64,
    /// StartJet/StopJet need mechanical settle time.
    pub jet_timeout_ms: u64,
    /// Best-effort status poll; must stay short.
    pub status_timeout_ms: u64,
    pub request_pop_ms: u64,
    pub poll_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Initial state of the auto-reconnect switch.
    pub auto_reconnect: bool,
    /// Bounded join when stopping the worker thread.
    pub stop_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: 9100,
            connect_timeout_ms: 3000,
            command_timeout_ms: 3000,
            jet_timeout_ms: 60_000,
            status_timeout_ms: 100,
            request_pop_ms: 50,
            poll_interval_ms: 500,
            reconnect_interval_ms: 2000,
            max_reconnect_attempts: 5,
            auto_reconnect: true,
            stop_timeout_ms: 3000,
        }
    }
}

impl ControllerConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        debug!(path = %path.display(), "controller config loaded");
        Ok(config.sanitized())
    }

    /// Write the config as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Raise zero timeouts to 1 ms so no wait degenerates into a spin.
    pub fn sanitized(mut self) -> Self {
        for ms in [
            &mut self.connect_timeout_ms,
            &mut self.command_timeout_ms,
            &mut self.jet_timeout_ms,
            &mut self.status_timeout_ms,
            &mut self.request_pop_ms,
            &mut self.poll_interval_ms,
            &mut self.reconnect_interval_ms,
            &mut self.stop_timeout_ms,
        ] {
            if *ms == 0 {
                *ms = 1;
            }
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn jet_timeout(&self) -> Duration {
        Duration::from_millis(self.jet_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn request_pop(&self) -> Duration {
        Duration::from_millis(self.request_pop_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timings() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.jet_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.status_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert!(cfg.auto_reconnect);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let cfg = ControllerConfig {
            port: 9200,
            max_reconnect_attempts: 2,
            ..ControllerConfig::default()
        };
        cfg.save(&path).unwrap();

        let loaded = ControllerConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults_and_sanitizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "port": 7000, "poll_interval_ms": 0 }"#).unwrap();

        let loaded = ControllerConfig::load(&path).unwrap();
        assert_eq!(loaded.port, 7000);
        assert_eq!(loaded.poll_interval_ms, 1);
        assert_eq!(loaded.command_timeout_ms, 3000);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ControllerConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, crate::error::JetwerkError::Io(_)));
    }
}

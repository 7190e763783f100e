// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocwerkError, Result};

/// All tunables for the execution layer. Every section has a default, so a
/// partial JSON file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub governor: GovernorConfig,
    pub invoker: InvokerConfig,
    pub compression: CompressionConfig,
    pub protection: ProtectionConfig,
    pub conversion: ConversionConfig,
    pub ledger: LedgerConfig,
}

impl EngineConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.governor.capacity == 0 {
            return Err(DocwerkError::Config(
                "governor.capacity must be at least 1".into(),
            ));
        }
        if self.ledger.soft_limit == 0 {
            return Err(DocwerkError::Config(
                "ledger.soft_limit must be at least 1".into(),
            ));
        }
        if self.invoker.default_timeout_ms == 0 {
            return Err(DocwerkError::Config(
                "invoker.default_timeout_ms must be at least 1".into(),
            ));
        }
        if self.ledger.session_ttl_minutes < 1 {
            return Err(DocwerkError::Config(
                "ledger.session_ttl_minutes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Maximum number of external processes alive at once.
    pub capacity: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self { capacity: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Deadline for a process whose caller sets none.
    pub default_timeout_ms: u64,
    /// Time between the polite termination signal and the forced kill.
    pub kill_grace_ms: u64,
    pub probe_timeout_ms: u64,
    /// Directories searched after PATH when locating an engine.
    pub search_dirs: Vec<PathBuf>,
    /// Parent directory for per-job workspaces. `None` uses the OS temp dir.
    pub temp_root: Option<PathBuf>,
}

impl InvokerConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60_000,
            kill_grace_ms: 5_000,
            probe_timeout_ms: 5_000,
            search_dirs: default_search_dirs(),
            temp_root: None,
        }
    }
}

fn default_search_dirs() -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(windows) {
        &[
            r"C:\Program Files\gs\bin",
            r"C:\Program Files\qpdf\bin",
            r"C:\Program Files\LibreOffice\program",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/opt/homebrew/bin",
            "/usr/local/bin",
            "/usr/bin",
            "/Applications/LibreOffice.app/Contents/MacOS",
        ]
    } else {
        &[
            "/usr/bin",
            "/usr/local/bin",
            "/opt/homebrew/bin",
            "/snap/bin",
            "/opt/libreoffice/program",
        ]
    };
    dirs.iter().map(PathBuf::from).collect()
}

/// Compression backends, in the order the chain tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionEngine {
    Ghostscript,
    Qpdf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub engines: Vec<CompressionEngine>,
    pub timeout_ms: u64,
}

impl CompressionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            engines: vec![CompressionEngine::Ghostscript, CompressionEngine::Qpdf],
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Deadline for each external encryption engine.
    pub timeout_ms: u64,
}

impl ProtectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub timeout_ms: u64,
}

impl ConversionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self { timeout_ms: 120_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Number of distinct operations before a caller is asked to sign up.
    pub soft_limit: u32,
    /// Records untouched for this long are evicted (unless converted).
    pub retention_days: i64,
    /// Window after reaching the limit in which a signup is attributed.
    pub attribution_window_hours: i64,
    /// How many recent file fingerprints each record remembers.
    pub recent_files: usize,
    /// Idle time after which a visit session is forgotten.
    pub session_ttl_minutes: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            soft_limit: 2,
            retention_days: 7,
            attribution_window_hours: 24,
            recent_files: 20,
            session_ttl_minutes: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docwerk.json");
        std::fs::write(&path, r#"{ "governor": { "capacity": 5 }, "ledger": { "soft_limit": 4 } }"#)
            .expect("write config");

        let config = EngineConfig::load(&path).expect("load");
        assert_eq!(config.governor.capacity, 5);
        assert_eq!(config.ledger.soft_limit, 4);
        assert_eq!(config.ledger.retention_days, 7);
        assert_eq!(config.conversion.timeout_ms, 120_000);
        assert_eq!(config.protection.timeout_ms, 30_000);
        assert_eq!(config.invoker.default_timeout(), Duration::from_secs(60));
        assert_eq!(config.ledger.session_ttl_minutes, 30);
        assert_eq!(
            config.compression.engines,
            vec![CompressionEngine::Ghostscript, CompressionEngine::Qpdf]
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = EngineConfig::default();
        config.governor.capacity = 0;
        assert!(matches!(config.validate(), Err(DocwerkError::Config(_))));
    }

    #[test]
    fn zero_deadlines_and_lifetimes_are_rejected() {
        let mut config = EngineConfig::default();
        config.invoker.default_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(DocwerkError::Config(_))));

        let mut config = EngineConfig::default();
        config.ledger.session_ttl_minutes = 0;
        assert!(matches!(config.validate(), Err(DocwerkError::Config(_))));
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.json");
        let mut config = EngineConfig::default();
        config.invoker.kill_grace_ms = 250;
        config.persist(&path).expect("persist");
        let loaded = EngineConfig::load(&path).expect("load");
        assert_eq!(loaded.invoker.kill_grace(), Duration::from_millis(250));
    }
}

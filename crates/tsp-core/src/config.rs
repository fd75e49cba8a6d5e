use crate::error::{Result, TspError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const DEFAULT_CONFIG_FILE: &str = "tsp.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller watchdog: externally asserted bits revert after this long
    /// without re-assertion.
    #[serde(default = "default_backup_time")]
    pub backup_time_secs: u32,
    #[serde(default = "default_timing_plan_interval")]
    pub timing_plan_update_interval_secs: u64,
}

fn default_backup_time() -> u32 {
    20
}

fn default_timing_plan_interval() -> u64 {
    60
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backup_time_secs: default_backup_time(),
            timing_plan_update_interval_secs: default_timing_plan_interval(),
        }
    }
}

impl ControllerConfig {
    /// Re-assertion period: one second inside the watchdog window.
    pub fn reassert_interval(&self) -> Result<Duration> {
        if self.backup_time_secs < 2 {
            return Err(TspError::InvalidBackupTime(self.backup_time_secs));
        }
        Ok(Duration::from_secs(u64::from(self.backup_time_secs) - 1))
    }

    pub fn timing_plan_interval(&self) -> Result<Duration> {
        if self.timing_plan_update_interval_secs == 0 {
            return Err(TspError::InvalidInterval(
                "timing_plan_update_interval_secs must be at least 1".into(),
            ));
        }
        Ok(Duration::from_secs(self.timing_plan_update_interval_secs))
    }
}

// ---------------------------------------------------------------------------
// ReceiverConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_datagram")]
    pub max_datagram_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:20002".to_string()
}

fn default_max_datagram() -> usize {
    8192
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_datagram_bytes: default_max_datagram(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpatConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// ServiceConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub spat: SpatConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            controller: ControllerConfig::default(),
            receiver: ReceiverConfig::default(),
            spat: SpatConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: ServiceConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write atomically through a tempfile in the target directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.to_yaml()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = self.controller.reassert_interval() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            });
        }

        if let Err(e) = self.controller.timing_plan_interval() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            });
        }

        if self.receiver.bind.parse::<SocketAddr>().is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "receiver.bind '{}' is not a socket address",
                    self.receiver.bind
                ),
            });
        }

        if self.receiver.max_datagram_bytes < 512 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "receiver.max_datagram_bytes={} may truncate schedules",
                    self.receiver.max_datagram_bytes
                ),
            });
        }

        if let Some(path) = &self.spat.translation_path {
            if !path.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "spat.translation_path '{}' does not exist",
                        path.display()
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

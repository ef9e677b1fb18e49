//! Configuration file support.
//!
//! The file is JSON. Every field has a default, so `{}` is a complete
//! configuration and only the values that differ need to be written.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub enumeration: EnumerationSettings,
    pub inspection: InspectionSettings,
    pub workflow: WorkflowSettings,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load `path` when given, otherwise fall back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// The command whose output lists the attached devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnumerationSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for EnumerationSettings {
    fn default() -> Self {
        Self {
            program: "lsusb".to_string(),
            args: Vec::new(),
        }
    }
}

/// Commands and deadlines used by the detailed inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InspectionSettings {
    /// Program queried with `-v -d vid:pid`.
    pub lsusb_program: String,
    pub verbose_timeout_ms: u64,
    /// Root of the sysfs device tree searched by bus number.
    pub device_tree_root: String,
    pub find_program: String,
    pub udevadm_program: String,
    /// Deadline for the path search and for each metadata query.
    pub lookup_timeout_ms: u64,
}

impl Default for InspectionSettings {
    fn default() -> Self {
        Self {
            lsusb_program: "lsusb".to_string(),
            verbose_timeout_ms: 10_000,
            device_tree_root: "/sys/bus/usb/devices/".to_string(),
            find_program: "find".to_string(),
            udevadm_program: "udevadm".to_string(),
            lookup_timeout_ms: 5_000,
        }
    }
}

impl InspectionSettings {
    pub fn verbose_timeout(&self) -> Duration {
        Duration::from_millis(self.verbose_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Pacing of the interactive workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowSettings {
    /// Delay between two polls of the change monitor.
    pub poll_interval_ms: u64,
    /// Number of countdown ticks before the user acts.
    pub countdown_secs: u32,
    /// Length of one countdown tick.
    pub countdown_tick_ms: u64,
    /// Pause between the baseline capture and the disconnect countdown.
    pub lead_in_ms: u64,
    /// Length of the startup progress sequence, 0 to skip it.
    pub startup_ms: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            countdown_secs: 3,
            countdown_tick_ms: 1_000,
            lead_in_ms: 2_000,
            startup_ms: 3_000,
        }
    }
}

impl WorkflowSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn lead_in(&self) -> Duration {
        Duration::from_millis(self.lead_in_ms)
    }

    pub fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default_config() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.enumeration.program, "lsusb");
        assert_eq!(config.workflow.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.inspection.verbose_timeout(), Duration::from_secs(10));
        assert_eq!(config.inspection.lookup_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config =
            Config::from_json(r#"{ "workflow": { "poll_interval_ms": 250 } }"#).unwrap();
        assert_eq!(config.workflow.poll_interval_ms, 250);
        assert_eq!(config.workflow.countdown_secs, 3);
        assert_eq!(config.inspection, InspectionSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_json(r#"{ "workflow": { "poll_ms": 1 } }"#).is_err());
        assert!(Config::from_json(r#"{ "extra": true }"#).is_err());
    }
}

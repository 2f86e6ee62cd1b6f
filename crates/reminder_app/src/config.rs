use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// User-facing notification toggles. Read by the caller before anything is
/// handed to the reminder service; the service itself never sees them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlertSettings {
    pub missed_meal_notifications_enabled: bool,
    pub mealtime_reminder_notifications_enabled: bool,
    pub critical_alerts_enabled: bool,
}

impl AlertSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings to {}", path.display()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub events_path: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    pub settings: AlertSettings,
    pub start_time: Option<DateTime<Utc>>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup("REMINDER_EVENTS") {
            config.events_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("REMINDER_SETTINGS_PATH") {
            let path = PathBuf::from(path);
            config.settings = AlertSettings::load(&path)?;
            info!(path = %path.display(), "loaded alert settings");
            config.settings_path = Some(path);
        }
        if let Some(value) = lookup("REMINDER_MISSED_MEAL_ENABLED").and_then(|v| parse_flag(&v)) {
            config.settings.missed_meal_notifications_enabled = value;
        }
        if let Some(value) = lookup("REMINDER_MEALTIME_ENABLED").and_then(|v| parse_flag(&v)) {
            config.settings.mealtime_reminder_notifications_enabled = value;
        }
        if let Some(value) = lookup("REMINDER_CRITICAL_ALERTS").and_then(|v| parse_flag(&v)) {
            config.settings.critical_alerts_enabled = value;
        }
        if let Some(raw) = lookup("REMINDER_START_TIME") {
            match DateTime::parse_from_rfc3339(raw.trim()) {
                Ok(start) => config.start_time = Some(start.with_timezone(&Utc)),
                Err(err) => warn!(%err, value = %raw, "ignoring invalid REMINDER_START_TIME"),
            }
        }
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

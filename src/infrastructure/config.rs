use crate::domain::models::Settings;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULT_APP_NAME: &str = "Pomodoro Timer";
const DEFAULT_SOUND_CUE: &str = "notification";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub title: String,
    pub sound_cue: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: DEFAULT_APP_NAME.to_string(),
            sound_cue: DEFAULT_SOUND_CUE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub app_name: String,
    pub default_settings: Settings,
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            default_settings: Settings::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

fn default_app_json() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": DEFAULT_APP_NAME,
        "defaultSettings": {
            "focus": 25,
            "break": 5,
            "cycles": 4
        },
        "notifications": {
            "enabled": true,
            "title": DEFAULT_APP_NAME,
            "soundCue": DEFAULT_SOUND_CUE
        }
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_json())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Reads `app.json`. Individual fields that are missing or out of range keep
/// their built-in values.
pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let parsed = read_config(&config_dir.join(APP_JSON))?;
    let mut config = AppConfig::default();

    if let Some(name) = non_empty_str(parsed.get("appName")) {
        config.app_name = name;
    }

    if let Some(defaults) = parsed.get("defaultSettings") {
        let minutes = |key: &str, fallback: u32| {
            defaults
                .get(key)
                .and_then(serde_json::Value::as_u64)
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .unwrap_or(fallback)
        };
        let fallback = config.default_settings;
        config.default_settings = Settings {
            focus_minutes: minutes("focus", fallback.focus_minutes),
            break_minutes: minutes("break", fallback.break_minutes),
            cycles_per_round: minutes("cycles", fallback.cycles_per_round),
        };
        if config.default_settings.validate().is_err() {
            config.default_settings = fallback;
        }
    }

    if let Some(notifications) = parsed.get("notifications") {
        if let Some(enabled) = notifications
            .get("enabled")
            .and_then(serde_json::Value::as_bool)
        {
            config.notifications.enabled = enabled;
        }
        if let Some(title) = non_empty_str(notifications.get("title")) {
            config.notifications.title = title;
        }
        if let Some(cue) = non_empty_str(notifications.get("soundCue")) {
            config.notifications.sound_cue = cue;
        }
    }

    Ok(config)
}

fn non_empty_str(value: Option<&serde_json::Value>) -> Option<String> {
    value
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

use crate::domain::models::Settings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{KeyValueStore, Record, SETTINGS_KEY};
use std::sync::Arc;
use tracing::warn;

pub struct SettingsStore<S>
where
    S: KeyValueStore,
{
    store: Arc<S>,
    defaults: Settings,
}

impl<S> SettingsStore<S>
where
    S: KeyValueStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            defaults: Settings::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: Settings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Loads persisted settings. Absent or malformed records fall back to defaults.
    pub async fn load(&self) -> Result<Settings, InfraError> {
        let record = self.store.get(&[SETTINGS_KEY]).await?;
        let Some(raw) = record.get(SETTINGS_KEY) else {
            return Ok(self.defaults);
        };
        match serde_json::from_value::<Settings>(raw.clone()) {
            Ok(settings) if settings.validate().is_ok() => Ok(settings),
            Ok(settings) => {
                warn!(?settings, "stored settings are not positive; using defaults");
                Ok(self.defaults)
            }
            Err(error) => {
                warn!(%error, "stored settings are malformed; using defaults");
                Ok(self.defaults)
            }
        }
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), InfraError> {
        settings.validate().map_err(InfraError::Validation)?;
        let mut record = Record::new();
        record.insert(SETTINGS_KEY.to_string(), serde_json::to_value(settings)?);
        self.store.set(record).await
    }

    /// Writes the defaults when no settings record exists yet. Returns whether
    /// anything was written.
    pub async fn seed_defaults(&self) -> Result<bool, InfraError> {
        let record = self.store.get(&[SETTINGS_KEY]).await?;
        if record.contains_key(SETTINGS_KEY) {
            return Ok(false);
        }
        self.save(&self.defaults).await?;
        Ok(true)
    }
}

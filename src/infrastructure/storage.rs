use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub const SETTINGS_KEY: &str = "settings";
pub const TASKS_KEY: &str = "tasks";
pub const SESSIONS_KEY: &str = "sessions";

pub type Record = Map<String, Value>;

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Key-value persistence with eventual durability and no multi-key atomicity.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored values for `keys`; missing keys are absent from the record.
    async fn get(&self, keys: &[&str]) -> Result<Record, InfraError>;
    /// Writes every entry of `record`, leaving other keys untouched.
    async fn set(&self, record: Record) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db_path: PathBuf,
}

impl SqliteKeyValueStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(db_path: &Path) -> Result<Connection, InfraError> {
        Connection::open(db_path).map_err(InfraError::from)
    }

    fn read_keys(db_path: &Path, keys: &[String]) -> Result<Record, InfraError> {
        let connection = Self::connect(db_path)?;
        let mut record = Record::new();
        for key in keys {
            let raw: Option<String> = connection
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            if let Some(raw) = raw {
                record.insert(key.clone(), serde_json::from_str(&raw)?);
            }
        }
        Ok(record)
    }

    fn write_record(db_path: &Path, record: &Record) -> Result<(), InfraError> {
        let connection = Self::connect(db_path)?;
        let updated_at = Utc::now().to_rfc3339();
        for (key, value) in record {
            connection.execute(
                "INSERT INTO kv (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, serde_json::to_string(value)?, updated_at],
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, keys: &[&str]) -> Result<Record, InfraError> {
        let db_path = self.db_path.clone();
        let keys = keys.iter().map(|key| key.to_string()).collect::<Vec<_>>();
        tokio::task::spawn_blocking(move || Self::read_keys(&db_path, &keys))
            .await
            .map_err(|error| InfraError::Persistence(format!("storage read task failed: {error}")))?
    }

    async fn set(&self, record: Record) -> Result<(), InfraError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || Self::write_record(&db_path, &record))
            .await
            .map_err(|error| {
                InfraError::Persistence(format!("storage write task failed: {error}"))
            })?
    }
}

/// Process-local store. `latency` delays every read and write to mimic the
/// asynchronous durability of the extension storage area.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, Value>>,
    latency: Option<Duration>,
    fail_writes: AtomicBool,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn lock_values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, InfraError> {
        self.values
            .lock()
            .map_err(|error| {
                InfraError::Persistence(format!("in-memory store lock poisoned: {error}"))
            })
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, keys: &[&str]) -> Result<Record, InfraError> {
        self.wait().await;
        let values = self.lock_values()?;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, record: Record) -> Result<(), InfraError> {
        self.wait().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(InfraError::Persistence("simulated write failure".to_string()));
        }
        let mut values = self.lock_values()?;
        values.extend(record);
        Ok(())
    }
}

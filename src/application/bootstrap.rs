use crate::infrastructure::config::{AppConfig, ensure_default_configs, load_app_config};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::settings_store::SettingsStore;
use crate::infrastructure::storage::{KeyValueStore, initialize_database};
use crate::infrastructure::task_ledger::TaskLedger;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub database_path: PathBuf,
    pub logs_dir: PathBuf,
    pub config: AppConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("pomodoro.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_app_config(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        database_path,
        logs_dir,
        config,
    })
}

/// First-open seeding: default settings and an empty task list, each only
/// when the record is absent.
pub async fn seed_default_records<S>(
    settings: &SettingsStore<S>,
    tasks: &TaskLedger<S>,
) -> Result<(), InfraError>
where
    S: KeyValueStore,
{
    if settings.seed_defaults().await? {
        info!("seeded default settings");
    }
    if tasks.seed_empty().await? {
        info!("seeded empty task list");
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod notifier;
pub mod session_ledger;
pub mod settings_store;
pub mod storage;
pub mod task_ledger;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

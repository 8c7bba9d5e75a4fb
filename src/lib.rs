pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{BootstrapResult, bootstrap_workspace};
pub use application::commands::{
    AppState, add_task_impl, close_popup_impl, delete_task_impl, get_settings_impl,
    get_timer_state_impl, list_sessions_impl, list_tasks_impl, pause_timer_impl, reset_timer_impl,
    save_settings_impl, session_stats_impl, start_timer_impl, switch_phase_impl, toggle_task_impl,
};
pub use application::timer::{PhaseTimer, TimerNotice, TimerOptions, TimerSnapshot};
pub use domain::models::{Phase, SessionRecord, SessionStats, Settings, Task, TimerStatus};
pub use infrastructure::error::InfraError;
pub use infrastructure::notifier::{InMemoryNotifier, LogNotifier, Notifier};

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber for hosts that have none. `RUST_LOG` overrides
/// the default `info` filter; a second call is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init();
}

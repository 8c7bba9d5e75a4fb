use crate::application::bootstrap::{bootstrap_workspace, seed_default_records};
use crate::application::timer::{PhaseTimer, TimerOptions, TimerSnapshot};
use crate::domain::models::{Phase, SessionRecord, SessionStats, Settings, Task, local_date};
use crate::infrastructure::NowProvider;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::session_ledger::SessionLedger;
use crate::infrastructure::settings_store::SettingsStore;
use crate::infrastructure::storage::SqliteKeyValueStore;
use crate::infrastructure::task_ledger::TaskLedger;
use chrono::{Duration, NaiveDate, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const DEFAULT_STATS_WINDOW_DAYS: i64 = 7;

pub struct AppState {
    database_path: PathBuf,
    logs_dir: PathBuf,
    tasks: TaskLedger<SqliteKeyValueStore>,
    sessions: Arc<SessionLedger<SqliteKeyValueStore>>,
    timer: PhaseTimer<SqliteKeyValueStore>,
    now_provider: NowProvider,
    log_guard: Mutex<()>,
}

impl AppState {
    pub async fn open(
        workspace_root: PathBuf,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, InfraError> {
        Self::open_with_options(workspace_root, notifier, TimerOptions::default()).await
    }

    /// Opens the popup against `workspace_root`. `options.notifications` is
    /// replaced by the workspace config.
    pub async fn open_with_options(
        workspace_root: PathBuf,
        notifier: Arc<dyn Notifier>,
        options: TimerOptions,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));

        let settings = Arc::new(
            SettingsStore::new(Arc::clone(&store)).with_defaults(bootstrap.config.default_settings),
        );
        let now_provider = Arc::clone(&options.now_provider);
        let tasks =
            TaskLedger::new(Arc::clone(&store)).with_now_provider(Arc::clone(&now_provider));
        let sessions = Arc::new(SessionLedger::new(Arc::clone(&store)));
        seed_default_records(&settings, &tasks).await?;

        let options = TimerOptions {
            notifications: bootstrap.config.notifications.clone(),
            ..options
        };
        let timer =
            PhaseTimer::open(settings, Arc::clone(&sessions), notifier, options).await?;

        Ok(Self {
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            tasks,
            sessions,
            timer,
            now_provider,
            log_guard: Mutex::new(()),
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn timer(&self) -> &PhaseTimer<SqliteKeyValueStore> {
        &self.timer
    }

    fn today(&self) -> NaiveDate {
        local_date((self.now_provider)())
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

pub async fn start_timer_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let snapshot = state.timer.start().await;
    state.log_info(
        "start_timer",
        &format!("phase={} remaining={}", snapshot.phase, snapshot.display),
    );
    Ok(snapshot)
}

pub async fn pause_timer_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let snapshot = state.timer.pause().await;
    state.log_info("pause_timer", &format!("paused at {}", snapshot.display));
    Ok(snapshot)
}

pub async fn reset_timer_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let snapshot = state.timer.reset().await;
    state.log_info("reset_timer", &format!("phase={}", snapshot.phase));
    Ok(snapshot)
}

pub async fn switch_phase_impl(
    state: &AppState,
    phase: String,
) -> Result<TimerSnapshot, InfraError> {
    let phase = Phase::parse(&phase).map_err(InfraError::Validation)?;
    let snapshot = state.timer.switch_phase(phase).await;
    state.log_info("switch_phase", &format!("phase={phase}"));
    Ok(snapshot)
}

pub async fn get_timer_state_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    Ok(state.timer.snapshot().await)
}

pub async fn get_settings_impl(state: &AppState) -> Result<Settings, InfraError> {
    Ok(state.timer.settings().await)
}

/// Takes the raw form values; any missing, non-numeric or non-positive field
/// rejects the whole save.
pub async fn save_settings_impl(
    state: &AppState,
    focus: String,
    break_minutes: String,
    cycles: String,
) -> Result<TimerSnapshot, InfraError> {
    let settings =
        Settings::from_form(&focus, &break_minutes, &cycles).map_err(InfraError::Validation)?;
    let snapshot = state.timer.save_settings(settings).await?;
    state.log_info(
        "save_settings",
        &format!(
            "focus={} break={} cycles={}",
            settings.focus_minutes, settings.break_minutes, settings.cycles_per_round
        ),
    );
    Ok(snapshot)
}

pub async fn add_task_impl(state: &AppState, text: String) -> Result<Vec<Task>, InfraError> {
    let tasks = state.tasks.add(&text).await?;
    state.log_info("add_task", &format!("task_count={}", tasks.len()));
    Ok(tasks)
}

pub async fn toggle_task_impl(state: &AppState, task_id: i64) -> Result<Vec<Task>, InfraError> {
    let tasks = state.tasks.toggle(task_id).await?;
    state.log_info("toggle_task", &format!("task_id={task_id}"));
    Ok(tasks)
}

pub async fn delete_task_impl(state: &AppState, task_id: i64) -> Result<Vec<Task>, InfraError> {
    let tasks = state.tasks.delete(task_id).await?;
    state.log_info("delete_task", &format!("task_id={task_id}"));
    Ok(tasks)
}

pub async fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    state.tasks.list().await
}

/// Sessions completed on `date` (`YYYY-MM-DD`, default today), newest first.
pub async fn list_sessions_impl(
    state: &AppState,
    date: Option<String>,
) -> Result<Vec<SessionRecord>, InfraError> {
    let date = match date {
        Some(raw) => parse_date_input(&raw, "date")?,
        None => state.today(),
    };
    state.sessions.list_by_date(date).await
}

/// Per-phase totals for `start..=end`; defaults to the last seven days.
pub async fn session_stats_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<Vec<SessionStats>, InfraError> {
    let end = match end {
        Some(raw) => parse_date_input(&raw, "end")?,
        None => state.today(),
    };
    let start = match start {
        Some(raw) => parse_date_input(&raw, "start")?,
        None => end - Duration::days(DEFAULT_STATS_WINDOW_DAYS - 1),
    };
    state.sessions.stats_between(start, end).await
}

/// Popup close. Persisted settings, tasks and sessions are kept.
pub async fn close_popup_impl(state: &AppState) -> Result<TimerSnapshot, InfraError> {
    let snapshot = state.timer.close().await;
    state.log_info("close_popup", "timer state discarded");
    Ok(snapshot)
}

fn parse_date_input(raw: &str, field: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|error| InfraError::Validation(format!("{field} must be YYYY-MM-DD: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{SETTINGS_VALIDATION_MESSAGE, TimerStatus};
    use crate::infrastructure::notifier::InMemoryNotifier;
    use chrono::DateTime;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomodoro-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        async fn app_state(&self) -> AppState {
            // Ticks are driven by hand in these tests.
            let options = TimerOptions {
                tick_period: std::time::Duration::from_secs(3600),
                now_provider: Arc::new(|| {
                    DateTime::parse_from_rfc3339("2026-02-16T12:00:00Z")
                        .expect("valid datetime")
                        .with_timezone(&Utc)
                }),
                ..TimerOptions::default()
            };
            let notifier = Arc::new(InMemoryNotifier::default());
            AppState::open_with_options(self.path.clone(), notifier, options)
                .await
                .expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn today() -> String {
        local_date(
            DateTime::parse_from_rfc3339("2026-02-16T12:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
        )
        .format("%Y-%m-%d")
        .to_string()
    }

    #[tokio::test]
    async fn first_open_seeds_defaults_and_shows_full_focus() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let snapshot = get_timer_state_impl(&state).await.expect("timer state");
        assert_eq!(snapshot.phase, Phase::Focus);
        assert_eq!(snapshot.display, "25:00");
        assert_eq!(snapshot.status, TimerStatus::Idle);
        assert_eq!(get_settings_impl(&state).await.expect("settings"), Settings::default());
        assert!(list_tasks_impl(&state).await.expect("tasks").is_empty());
        assert!(state.database_path().is_file());
    }

    #[tokio::test]
    async fn tasks_survive_reopening_the_workspace() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state().await;
            add_task_impl(&state, "Draft outline".to_string()).await.expect("add");
            let tasks = add_task_impl(&state, "Send email".to_string()).await.expect("add");
            toggle_task_impl(&state, tasks[1].id).await.expect("toggle");
            close_popup_impl(&state).await.expect("close");
        }

        let reopened = workspace.app_state().await;
        let tasks = list_tasks_impl(&reopened).await.expect("list");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].text, "Draft outline");
        assert!(tasks[1].completed);

        let remaining = delete_task_impl(&reopened, tasks[0].id).await.expect("delete");
        assert_eq!(remaining.len(), 1);
        assert_eq!(delete_task_impl(&reopened, -7).await.expect("unknown id"), remaining);
    }

    #[tokio::test]
    async fn blank_task_text_is_ignored() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        assert!(add_task_impl(&state, "   ".to_string()).await.expect("blank").is_empty());
    }

    #[tokio::test]
    async fn invalid_settings_report_user_message() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let error = save_settings_impl(&state, "25".to_string(), "abc".to_string(), "4".to_string())
            .await
            .expect_err("invalid settings");
        assert_eq!(state.command_error("save_settings", &error), SETTINGS_VALIDATION_MESSAGE);

        let log_path = workspace.path.join("logs").join("commands.log");
        let log = fs::read_to_string(log_path).expect("read log");
        assert!(log.contains("\"level\":\"error\""));
        assert!(log.contains(SETTINGS_VALIDATION_MESSAGE));
    }

    #[tokio::test]
    async fn saved_settings_apply_now_and_on_next_open() {
        let workspace = TempWorkspace::new();
        {
            let state = workspace.app_state().await;
            start_timer_impl(&state).await.expect("start");
            let snapshot =
                save_settings_impl(&state, "50".to_string(), "10".to_string(), "2".to_string())
                    .await
                    .expect("save settings");
            assert_eq!(snapshot.display, "50:00");
            assert!(!snapshot.running);
            assert_eq!(snapshot.cycles_per_round, 2);
            close_popup_impl(&state).await.expect("close");
        }

        let reopened = workspace.app_state().await;
        let snapshot = get_timer_state_impl(&reopened).await.expect("timer state");
        assert_eq!(snapshot.display, "50:00");
        assert_eq!(snapshot.cycles_completed, 0);
    }

    #[tokio::test]
    async fn switch_phase_rejects_unknown_names() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        let snapshot = switch_phase_impl(&state, "break".to_string()).await.expect("switch");
        assert_eq!(snapshot.display, "05:00");
        assert!(matches!(
            switch_phase_impl(&state, "long_break".to_string()).await,
            Err(InfraError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn completed_phase_is_listed_and_counted() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        save_settings_impl(&state, "1".to_string(), "1".to_string(), "4".to_string())
            .await
            .expect("save settings");

        start_timer_impl(&state).await.expect("start");
        for _ in 0..60 {
            state.timer().tick().await;
        }
        let snapshot = get_timer_state_impl(&state).await.expect("timer state");
        assert_eq!(snapshot.phase, Phase::Break);
        assert_eq!(snapshot.cycles_completed, 1);

        let sessions = list_sessions_impl(&state, Some(today())).await.expect("sessions");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].phase, Phase::Focus);
        assert_eq!(sessions[0].duration_minutes, 1);

        let stats = session_stats_impl(&state, Some(today()), Some(today()))
            .await
            .expect("stats");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].count, 1);
        assert_eq!(stats[0].total_minutes, 1);
    }

    #[tokio::test]
    async fn default_dates_follow_the_session_clock() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;
        save_settings_impl(&state, "1".to_string(), "1".to_string(), "4".to_string())
            .await
            .expect("save settings");
        start_timer_impl(&state).await.expect("start");
        for _ in 0..60 {
            state.timer().tick().await;
        }

        let sessions = list_sessions_impl(&state, None).await.expect("sessions today");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].date.format("%Y-%m-%d").to_string(), today());

        let stats = session_stats_impl(&state, None, None).await.expect("default window");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].phase, Phase::Focus);
    }

    #[tokio::test]
    async fn session_queries_validate_dates() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state().await;

        assert!(matches!(
            list_sessions_impl(&state, Some("16/02/2026".to_string())).await,
            Err(InfraError::Validation(_))
        ));
        assert!(matches!(
            session_stats_impl(
                &state,
                Some("2026-02-18".to_string()),
                Some("2026-02-16".to_string()),
            )
            .await,
            Err(InfraError::Validation(_))
        ));
        assert!(session_stats_impl(&state, None, None).await.expect("default window").is_empty());
    }
}

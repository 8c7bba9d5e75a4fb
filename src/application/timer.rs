use crate::domain::models::{Phase, SessionRecord, Settings, TimerState, TimerStatus};
use crate::domain::phase_machine::{TimerCommand, TimerEffect, transition};
use crate::infrastructure::NowProvider;
use crate::infrastructure::config::NotificationConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::session_ledger::SessionLedger;
use crate::infrastructure::settings_store::SettingsStore;
use crate::infrastructure::storage::KeyValueStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);
pub const ROUND_COMPLETE_MESSAGE: &str = "All cycles completed! Take a longer break.";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerNotice {
    RoundComplete,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub phase: Phase,
    pub status: TimerStatus,
    pub remaining_seconds: u32,
    pub elapsed_seconds: u32,
    pub cycles_completed: u32,
    pub cycles_per_round: u32,
    pub running: bool,
    pub display: String,
    pub notice: Option<TimerNotice>,
}

#[derive(Clone)]
pub struct TimerOptions {
    pub tick_period: Duration,
    pub notifications: NotificationConfig,
    pub now_provider: NowProvider,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            tick_period: TICK_PERIOD,
            notifications: NotificationConfig::default(),
            now_provider: Arc::new(Utc::now),
        }
    }
}

/// Owns the live timer state and the single tick task for one popup lifetime.
///
/// User intents and ticks are serialized through one lock, so each runs to
/// completion (including phase-completion side effects) before the next one
/// observes the state.
pub struct PhaseTimer<S>
where
    S: KeyValueStore + 'static,
{
    shared: Arc<TimerShared<S>>,
}

impl<S> Clone for PhaseTimer<S>
where
    S: KeyValueStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct TimerShared<S>
where
    S: KeyValueStore + 'static,
{
    runtime: Mutex<TimerRuntime>,
    settings_store: Arc<SettingsStore<S>>,
    session_ledger: Arc<SessionLedger<S>>,
    notifier: Arc<dyn Notifier>,
    options: TimerOptions,
    snapshots: watch::Sender<TimerSnapshot>,
    next_generation: AtomicU64,
}

struct TimerRuntime {
    state: TimerState,
    settings: Settings,
    ticker: Option<TickerHandle>,
    notice: Option<TimerNotice>,
}

struct TickerHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl TimerRuntime {
    fn new(settings: Settings) -> Self {
        Self {
            state: TimerState::initial(&settings),
            settings,
            ticker: None,
            notice: None,
        }
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            phase: self.state.phase,
            status: self.state.status(),
            remaining_seconds: self.state.remaining_seconds,
            elapsed_seconds: self.state.elapsed_seconds,
            cycles_completed: self.state.cycles_completed,
            cycles_per_round: self.settings.cycles_per_round,
            running: self.state.running,
            display: self.state.display(),
            notice: self.notice,
        }
    }

    fn ticker_generation(&self) -> Option<u64> {
        self.ticker.as_ref().map(|ticker| ticker.generation)
    }
}

impl<S> PhaseTimer<S>
where
    S: KeyValueStore + 'static,
{
    /// Fails with `Validation` unless every setting is positive and the
    /// phase lengths fit the countdown.
    pub fn new(
        settings: Settings,
        settings_store: Arc<SettingsStore<S>>,
        session_ledger: Arc<SessionLedger<S>>,
        notifier: Arc<dyn Notifier>,
        options: TimerOptions,
    ) -> Result<Self, InfraError> {
        settings.validate().map_err(InfraError::Validation)?;
        let runtime = TimerRuntime::new(settings);
        let (snapshots, _) = watch::channel(runtime.snapshot());
        Ok(Self {
            shared: Arc::new(TimerShared {
                runtime: Mutex::new(runtime),
                settings_store,
                session_ledger,
                notifier,
                options,
                snapshots,
                next_generation: AtomicU64::new(1),
            }),
        })
    }

    /// Loads the persisted settings and starts a fresh focus phase at full
    /// duration; there is no mid-countdown resume across popup opens.
    pub async fn open(
        settings_store: Arc<SettingsStore<S>>,
        session_ledger: Arc<SessionLedger<S>>,
        notifier: Arc<dyn Notifier>,
        options: TimerOptions,
    ) -> Result<Self, InfraError> {
        let settings = settings_store.load().await?;
        Self::new(settings, settings_store, session_ledger, notifier, options)
    }

    pub async fn start(&self) -> TimerSnapshot {
        self.shared.user_command(TimerCommand::Start).await
    }

    pub async fn pause(&self) -> TimerSnapshot {
        self.shared.user_command(TimerCommand::Pause).await
    }

    pub async fn reset(&self) -> TimerSnapshot {
        self.shared.user_command(TimerCommand::Reset).await
    }

    pub async fn switch_phase(&self, phase: Phase) -> TimerSnapshot {
        self.shared.user_command(TimerCommand::SwitchPhase(phase)).await
    }

    /// One-second decrement. Normally driven by the internal ticker; hosts
    /// with their own scheduler may call it directly.
    pub async fn tick(&self) -> TimerSnapshot {
        let mut runtime = self.shared.runtime.lock().await;
        self.shared
            .apply_locked(&mut runtime, TimerCommand::Tick, None)
            .await
    }

    /// Persists `settings` and restarts the current phase under them with the
    /// cycle counter cleared. Nothing changes when validation or the write fails.
    pub async fn save_settings(&self, settings: Settings) -> Result<TimerSnapshot, InfraError> {
        settings.validate().map_err(InfraError::Validation)?;
        let mut runtime = self.shared.runtime.lock().await;
        self.shared.settings_store.save(&settings).await?;
        runtime.notice = None;
        Ok(self
            .shared
            .apply_locked(&mut runtime, TimerCommand::ApplySettings(settings), None)
            .await)
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        self.shared.runtime.lock().await.snapshot()
    }

    pub async fn settings(&self) -> Settings {
        self.shared.runtime.lock().await.settings
    }

    pub async fn has_active_ticker(&self) -> bool {
        self.shared.runtime.lock().await.ticker.is_some()
    }

    /// Receives a snapshot after every command and every tick.
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Popup close: cancels the ticker and discards the in-memory state.
    pub async fn close(&self) -> TimerSnapshot {
        let mut runtime = self.shared.runtime.lock().await;
        TimerShared::<S>::stop_ticker(&mut runtime, None);
        let settings = runtime.settings;
        *runtime = TimerRuntime::new(settings);
        let snapshot = runtime.snapshot();
        self.shared.snapshots.send_replace(snapshot.clone());
        debug!("timer closed");
        snapshot
    }
}

impl<S> TimerShared<S>
where
    S: KeyValueStore + 'static,
{
    async fn user_command(self: &Arc<Self>, command: TimerCommand) -> TimerSnapshot {
        let mut runtime = self.runtime.lock().await;
        runtime.notice = None;
        self.apply_locked(&mut runtime, command, None).await
    }

    /// Tick issued by ticker `generation`. Returns whether that ticker is
    /// still the live one afterwards.
    async fn tick_from(self: &Arc<Self>, generation: u64) -> bool {
        let mut runtime = self.runtime.lock().await;
        if runtime.ticker_generation() != Some(generation) {
            return false;
        }
        self.apply_locked(&mut runtime, TimerCommand::Tick, Some(generation))
            .await;
        runtime.ticker_generation() == Some(generation)
    }

    async fn apply_locked(
        self: &Arc<Self>,
        runtime: &mut TimerRuntime,
        command: TimerCommand,
        caller: Option<u64>,
    ) -> TimerSnapshot {
        let next = transition(&runtime.state, &runtime.settings, command);
        runtime.state = next.state;
        runtime.settings = next.settings;

        for effect in next.effects {
            match effect {
                TimerEffect::StartTicker => self.spawn_ticker(runtime),
                TimerEffect::StopTicker => Self::stop_ticker(runtime, caller),
                TimerEffect::NotifyPhaseComplete(phase) => {
                    self.announce_completion(&format!("{} phase completed!", phase.label()))
                        .await;
                }
                TimerEffect::RecordSession {
                    phase,
                    duration_minutes,
                } => self.record_session(phase, duration_minutes).await,
                TimerEffect::RoundCompleted => {
                    info!("round complete");
                    runtime.notice = Some(TimerNotice::RoundComplete);
                    self.notify(ROUND_COMPLETE_MESSAGE).await;
                }
                TimerEffect::PhaseChanged(phase) => debug!(%phase, "phase changed"),
            }
        }

        let snapshot = runtime.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    fn spawn_ticker(self: &Arc<Self>, runtime: &mut TimerRuntime) {
        if runtime.ticker.is_some() {
            return;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(run_ticker(
            Arc::downgrade(self),
            generation,
            self.options.tick_period,
        ));
        runtime.ticker = Some(TickerHandle { generation, task });
        debug!(generation, "ticker started");
    }

    // The ticker that triggered the stop is already on its way out and must
    // not be aborted mid-orchestration.
    fn stop_ticker(runtime: &mut TimerRuntime, caller: Option<u64>) {
        let Some(ticker) = runtime.ticker.take() else {
            return;
        };
        if caller != Some(ticker.generation) {
            ticker.task.abort();
        }
        debug!(generation = ticker.generation, "ticker stopped");
    }

    // One sound cue per completed phase; the round message rides on it.
    async fn announce_completion(&self, body: &str) {
        let notifications = &self.options.notifications;
        if !notifications.enabled {
            return;
        }
        if let Err(error) = self.notifier.play_sound(&notifications.sound_cue).await {
            warn!(%error, "failed to play sound cue");
        }
        self.notify(body).await;
    }

    async fn notify(&self, body: &str) {
        let notifications = &self.options.notifications;
        if !notifications.enabled {
            return;
        }
        if let Err(error) = self.notifier.notify(&notifications.title, body).await {
            warn!(%error, "failed to deliver notification");
        }
    }

    async fn record_session(&self, phase: Phase, duration_minutes: u32) {
        let record = SessionRecord::new(phase, duration_minutes, (self.options.now_provider)());
        match self.session_ledger.append(record).await {
            Ok(()) => info!(%phase, duration_minutes, "phase completed"),
            Err(error) => warn!(%error, %phase, "failed to record completed session"),
        }
    }
}

impl<S> Drop for TimerShared<S>
where
    S: KeyValueStore + 'static,
{
    fn drop(&mut self) {
        if let Some(ticker) = self.runtime.get_mut().ticker.take() {
            ticker.task.abort();
        }
    }
}

async fn run_ticker<S>(shared: Weak<TimerShared<S>>, generation: u64, period: Duration)
where
    S: KeyValueStore + 'static,
{
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.tick_from(generation).await {
            break;
        }
    }
}

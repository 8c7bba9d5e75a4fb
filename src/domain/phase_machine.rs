//! Pure phase transitions.
//!
//! Every user intent and every tick is a [`TimerCommand`]. [`transition`] maps
//! the current [`TimerState`] and [`Settings`] to the next state plus an ordered
//! list of [`TimerEffect`]s that the controller executes (ticker control,
//! notifications, session persistence).

use crate::domain::models::{Phase, Settings, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Reset,
    SwitchPhase(Phase),
    Tick,
    ApplySettings(Settings),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEffect {
    StartTicker,
    StopTicker,
    NotifyPhaseComplete(Phase),
    RecordSession { phase: Phase, duration_minutes: u32 },
    RoundCompleted,
    PhaseChanged(Phase),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: TimerState,
    pub settings: Settings,
    pub effects: Vec<TimerEffect>,
}

impl Transition {
    fn unchanged(state: &TimerState, settings: &Settings) -> Self {
        Self {
            state: *state,
            settings: *settings,
            effects: Vec::new(),
        }
    }

    pub fn completed_phase(&self) -> Option<Phase> {
        self.effects.iter().find_map(|effect| match effect {
            TimerEffect::NotifyPhaseComplete(phase) => Some(*phase),
            _ => None,
        })
    }
}

pub fn transition(state: &TimerState, settings: &Settings, command: TimerCommand) -> Transition {
    match command {
        TimerCommand::Start => {
            if state.running {
                return Transition::unchanged(state, settings);
            }
            Transition {
                state: TimerState {
                    running: true,
                    ..*state
                },
                settings: *settings,
                effects: vec![TimerEffect::StartTicker],
            }
        }
        TimerCommand::Pause => {
            if !state.running {
                return Transition::unchanged(state, settings);
            }
            Transition {
                state: TimerState {
                    running: false,
                    ..*state
                },
                settings: *settings,
                effects: vec![TimerEffect::StopTicker],
            }
        }
        TimerCommand::Reset => Transition {
            state: TimerState::at_phase_start(state.phase, settings, state.cycles_completed),
            settings: *settings,
            effects: vec![TimerEffect::StopTicker],
        },
        TimerCommand::SwitchPhase(target) => Transition {
            state: TimerState::at_phase_start(target, settings, state.cycles_completed),
            settings: *settings,
            effects: vec![TimerEffect::StopTicker, TimerEffect::PhaseChanged(target)],
        },
        TimerCommand::Tick => tick(state, settings),
        TimerCommand::ApplySettings(next) => Transition {
            state: TimerState::at_phase_start(state.phase, &next, 0),
            settings: next,
            effects: vec![TimerEffect::StopTicker],
        },
    }
}

fn tick(state: &TimerState, settings: &Settings) -> Transition {
    // Stale ticks after pause or expiry must not count down or re-fire completion.
    if !state.running || state.remaining_seconds == 0 {
        return Transition::unchanged(state, settings);
    }

    let duration = settings.duration_seconds(state.phase);
    let remaining_seconds = state.remaining_seconds - 1;
    let counted = TimerState {
        remaining_seconds,
        elapsed_seconds: duration.saturating_sub(remaining_seconds),
        ..*state
    };
    if remaining_seconds > 0 {
        return Transition {
            state: counted,
            settings: *settings,
            effects: Vec::new(),
        };
    }

    complete_phase(&counted, settings)
}

fn complete_phase(state: &TimerState, settings: &Settings) -> Transition {
    let completed = state.phase;
    let mut effects = vec![
        TimerEffect::StopTicker,
        TimerEffect::NotifyPhaseComplete(completed),
        TimerEffect::RecordSession {
            phase: completed,
            duration_minutes: settings.minutes_for(completed),
        },
    ];

    let (next_phase, cycles_completed) = match completed {
        Phase::Focus => {
            let cycles = state.cycles_completed.saturating_add(1);
            if cycles >= settings.cycles_per_round {
                effects.push(TimerEffect::RoundCompleted);
                (Phase::Focus, 0)
            } else {
                (Phase::Break, cycles)
            }
        }
        Phase::Break => (Phase::Focus, state.cycles_completed),
    };

    effects.push(TimerEffect::PhaseChanged(next_phase));
    Transition {
        state: TimerState::at_phase_start(next_phase, settings, cycles_completed),
        settings: *settings,
        effects,
    }
}

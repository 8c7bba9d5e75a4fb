use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_CYCLES_PER_ROUND: u32 = 4;

/// Largest phase length whose duration in seconds still fits in `u32`.
pub const MAX_PHASE_MINUTES: u32 = u32::MAX / 60;

pub const SETTINGS_VALIDATION_MESSAGE: &str = "Please enter valid numbers for all settings.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Focus,
    Break,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
        }
    }

    /// Capitalized name used in notification captions.
    pub fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::Break => "Break",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "focus" => Ok(Self::Focus),
            "break" => Ok(Self::Break),
            other => Err(format!("unsupported phase: {other}")),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(rename = "focus")]
    pub focus_minutes: u32,
    #[serde(rename = "break")]
    pub break_minutes: u32,
    #[serde(rename = "cycles")]
    pub cycles_per_round: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            break_minutes: DEFAULT_BREAK_MINUTES,
            cycles_per_round: DEFAULT_CYCLES_PER_ROUND,
        }
    }
}

impl Settings {
    /// Builds settings from untrusted numeric input, rejecting anything that is
    /// not a positive integer fitting in `u32`.
    pub fn from_values(focus: i64, break_: i64, cycles: i64) -> Result<Self, String> {
        let settings = Self {
            focus_minutes: positive_u32(focus).ok_or(SETTINGS_VALIDATION_MESSAGE)?,
            break_minutes: positive_u32(break_).ok_or(SETTINGS_VALIDATION_MESSAGE)?,
            cycles_per_round: positive_u32(cycles).ok_or(SETTINGS_VALIDATION_MESSAGE)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parses raw settings form fields.
    pub fn from_form(focus: &str, break_: &str, cycles: &str) -> Result<Self, String> {
        let parse = |raw: &str| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| SETTINGS_VALIDATION_MESSAGE.to_string())
        };
        Self::from_values(parse(focus)?, parse(break_)?, parse(cycles)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.focus_minutes == 0 || self.break_minutes == 0 || self.cycles_per_round == 0 {
            return Err(SETTINGS_VALIDATION_MESSAGE.to_string());
        }
        if self.focus_minutes > MAX_PHASE_MINUTES || self.break_minutes > MAX_PHASE_MINUTES {
            return Err(SETTINGS_VALIDATION_MESSAGE.to_string());
        }
        Ok(())
    }

    pub fn minutes_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus_minutes,
            Phase::Break => self.break_minutes,
        }
    }

    pub fn duration_seconds(&self, phase: Phase) -> u32 {
        self.minutes_for(phase).saturating_mul(60)
    }
}

fn positive_u32(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|value| *value > 0)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    #[serde(rename = "type")]
    pub phase: Phase,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
    pub date: NaiveDate,
}

impl SessionRecord {
    pub fn new(phase: Phase, duration_minutes: u32, completed_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            duration_minutes,
            completed_at,
            date: local_date(completed_at),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.duration_minutes == 0 {
            return Err("session.duration must be > 0".to_string());
        }
        Ok(())
    }
}

/// Calendar date of `time` in the user's local timezone.
pub fn local_date(time: DateTime<Utc>) -> NaiveDate {
    time.with_timezone(&Local).date_naive()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    #[serde(rename = "type")]
    pub phase: Phase,
    pub count: u32,
    pub total_minutes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub elapsed_seconds: u32,
    pub cycles_completed: u32,
    pub running: bool,
}

impl TimerState {
    pub fn initial(settings: &Settings) -> Self {
        Self::at_phase_start(Phase::Focus, settings, 0)
    }

    pub fn at_phase_start(phase: Phase, settings: &Settings, cycles_completed: u32) -> Self {
        Self {
            phase,
            remaining_seconds: settings.duration_seconds(phase),
            elapsed_seconds: 0,
            cycles_completed,
            running: false,
        }
    }

    pub fn status(&self) -> TimerStatus {
        if self.running {
            TimerStatus::Running
        } else if self.elapsed_seconds > 0 {
            TimerStatus::Paused
        } else {
            TimerStatus::Idle
        }
    }

    pub fn display(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/*!
 # Application state

 Everything the configurator edits lives in one owned [`AppState`]. The
 synchronizer owns it; collaborators read it and mutate it through the
 synchronizer.
*/

use thiserror::Error;
use tracing::debug;

use crate::channel::{Channels, ColumnDescriptor};
use crate::codec::{SettingsAggregate, SystemSettings};
use crate::dataset::{self, Series};
use crate::schedule::{Schedule, ScheduleEntry};
use crate::timer::Timers;

/// A local check that failed before anything was sent to the device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Timer {id}: frequency {freq} Hz must be between 1 and 50000 Hz")]
    TimerFrequency { id: u8, freq: u32 },

    #[error("Channel {id}: GPIO {gpio} out of range (0..=31)")]
    GpioOutOfRange { id: u8, gpio: u8 },

    #[error("Channel {id}: timer {timer} does not exist")]
    UnknownTimer { id: u8, timer: u8 },

    #[error("Channel {id}: GPIO {gpio} is already used by channel {other}")]
    DuplicateGpio { id: u8, gpio: u8, other: u8 },

    #[error("Channel {id}: cannot be enabled without a GPIO and timer")]
    EnabledWithoutAssignment { id: u8 },

    #[error("Schedule row {row}: time of day is required")]
    MissingTimeOfDay { row: usize },

    #[error("Schedule row {row}: invalid time of day '{tod}'")]
    MalformedTimeOfDay { row: usize, tod: String },

    #[error("Schedule: time of day {tod} is used by more than one row")]
    DuplicateTimeOfDay { tod: String },

    #[error("Schedule {tod}: channel {channel} intensity {value} out of range (0..=100)")]
    IntensityOutOfRange { tod: String, channel: u8, value: i32 },

    #[error("Schedule {tod}: channel {channel} does not exist")]
    UnknownChannel { tod: String, channel: u8 },
}

impl ValidationError {
    /// Summary line for the table the error belongs to
    pub fn summary(&self) -> &'static str {
        match self {
            ValidationError::TimerFrequency { .. } => "Invalid timer setup. Please fix errors.",
            ValidationError::GpioOutOfRange { .. }
            | ValidationError::UnknownTimer { .. }
            | ValidationError::DuplicateGpio { .. }
            | ValidationError::EnabledWithoutAssignment { .. } => {
                "Invalid channel setup. Please fix errors."
            }
            ValidationError::MissingTimeOfDay { .. }
            | ValidationError::MalformedTimeOfDay { .. }
            | ValidationError::DuplicateTimeOfDay { .. }
            | ValidationError::IntensityOutOfRange { .. }
            | ValidationError::UnknownChannel { .. } => "Invalid schedule. Please fix errors.",
        }
    }
}

/// The configurator's in-memory model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub timers: Timers,
    pub channels: Channels,
    pub schedule: Schedule,
    pub system: SystemSettings,
    /// Rows reported by the grid since the last save
    staged_rows: Option<Vec<ScheduleEntry>>,
}

impl AppState {
    pub fn from_aggregate(settings: SettingsAggregate) -> Self {
        let mut state = Self::default();
        state.apply(settings);
        state
    }

    /// Replaces every collection with the aggregate's contents
    pub fn apply(&mut self, settings: SettingsAggregate) {
        debug!(
            "Applying settings: {} schedule rows, {} enabled channels",
            settings.schedule.len(),
            settings.channels.enabled().count()
        );
        let mut schedule = settings.schedule;
        schedule.sort();

        self.timers = settings.timers;
        self.channels = settings.channels;
        self.schedule = schedule;
        self.system = settings.system;
        self.staged_rows = None;
    }

    /// Records the grid's current rows; they replace the schedule on the next save
    pub fn stage_rows(&mut self, rows: Vec<ScheduleEntry>) {
        self.staged_rows = Some(rows);
    }

    pub fn has_staged_rows(&self) -> bool {
        self.staged_rows.is_some()
    }

    /// Moves staged grid rows into the schedule
    pub fn commit_rows(&mut self) {
        if let Some(rows) = self.staged_rows.take() {
            self.schedule.replace_rows(rows);
        }
    }

    /// Checks timers, then channels, then the schedule
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.timers.validate()?;
        self.channels.validate()?;
        self.schedule.validate()
    }

    pub fn to_aggregate(&self) -> SettingsAggregate {
        SettingsAggregate {
            timers: self.timers.clone(),
            channels: self.channels.clone(),
            schedule: self.schedule.clone(),
            system: self.system.clone(),
        }
    }

    /// Schedule columns for the enabled channels
    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.channels.columns()
    }

    /// Chart series for the enabled channels
    pub fn dataset(&self) -> Vec<Series> {
        dataset::project(&self.schedule, &self.channels)
    }
}

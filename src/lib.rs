/*!
 # LEDC Schedule Configurator Library

 A Rust library for configuring multi-channel PWM intensity controllers.
 A controller exposes 4 shared timers, 8 output channels and a time-of-day
 intensity schedule, all exchanged with the device as one JSON settings document.

 ## Features

 * Timer, channel and schedule entity model with validation
 * Dictionary codec for the device's settings wire format
 * Intensity sweeps (linear and smoothstep) merged into the schedule
 * Per-channel chart datasets with day wraparound
 * Load, save, backup and restore against the device over HTTP
 * Liveness tracking for the device's clock push channel

 ## Example

 ```rust,no_run
 use ledc_scheduler::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let config = SyncConfig::new("http://ledc.local");
     let sync = Synchronizer::new(HttpTransport::new(&config)?, config);

     // Fetch the current settings from the device
     sync.load().await?;

     // Fade channel 0 up over the first hour of the morning
     let sweep = SweepRequest::linear(0, "07:00", 0, "08:00", 100, StepMode::Time(10.0))?;
     sync.update(|state| state.schedule.apply_sweep(&sweep));

     sync.save().await?;
     Ok(())
 }
 ```
*/

use std::time::Duration;

use thiserror::Error;

/// Custom error types for the LEDC schedule library
#[derive(Error, Debug)]
pub enum Error {
    /// Local validation failed, nothing was sent to the device
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The device answered with a non-success status
    #[error("Error: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, used as the failure detail
        body: String,
    },

    /// The device did not answer in time
    #[error("Timeout")]
    Timeout(Duration),

    /// Settings document could not be parsed
    #[error("Invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Settings document parsed but has an invalid shape
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Another load/save/backup/restore is still running
    #[error("Another settings operation is already in progress")]
    Busy,

    /// Invalid time of day
    #[error("Invalid time of day '{0}' (expected HH:MM)")]
    InvalidTimeOfDay(String),

    /// Value out of range
    #[error("Value {0} out of range ({1}..{2})")]
    ValueOutOfRange(i64, i64, i64),

    /// HTTP client error
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// File system error during backup or restore
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// General error
    #[error("Error: {0}")]
    General(String),

    /// Other errors
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod channel;
pub mod codec;
pub mod dataset;
pub mod liveness;
pub mod schedule;
pub mod state;
pub mod status;
pub mod sweep;
pub mod sync;
pub mod timer;
pub mod transport;

// Re-export key types
pub use channel::{Channel, Channels, ColumnDescriptor, CHANNEL_COUNT};
pub use codec::{CodecError, DictionaryEntity, SettingsAggregate, SystemSettings};
pub use dataset::{project, Point, Series};
pub use liveness::{ClockMessage, Watchdog};
pub use schedule::{Schedule, ScheduleEntry, TimeOfDay};
pub use state::{AppState, ValidationError};
pub use status::Status;
pub use sweep::{Interpolation, MinuteRounding, StepMode, SweepRequest};
pub use sync::{SyncConfig, Synchronizer, DEFAULT_TIMEOUT};
pub use timer::{Timer, Timers, TIMER_COUNT};
pub use transport::{HttpTransport, Response, SettingsTransport};

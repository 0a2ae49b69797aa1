/*!
 # Intensity sweeps

 A sweep fills the schedule with a run of rows that ramp one channel from a
 start intensity to an end intensity between two times of day.
*/

use tracing::{debug, instrument, warn};

use crate::channel::CHANNEL_COUNT;
use crate::schedule::{ScheduleEntry, TimeOfDay};
use crate::{Error, Result};

/// Slack for float error in step offsets
const STEP_EPSILON: f64 = 1e-9;

/// Smallest step accepted, one second; anything finer is treated as degenerate
const MIN_STEP_MINUTES: f64 = 1.0 / 60.0;

/// How the distance between sweep rows is chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepMode {
    /// Fixed step in minutes
    Time(f64),
    /// Split the sweep into this many steps
    Count(f64),
}

/// Shape of the intensity ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Smoothstep, eases in and out
    #[default]
    Cubic,
    /// Straight line
    Linear,
}

impl Interpolation {
    /// Intensity change at normalized position `x` (0-1) of a ramp of `delta`
    pub fn delta(self, delta: f64, x: f64) -> f64 {
        match self {
            Interpolation::Cubic => 3.0 * delta * x.powi(2) - 2.0 * delta * x.powi(3),
            Interpolation::Linear => delta * x,
        }
    }
}

/// How a fractional step offset maps onto a whole minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinuteRounding {
    /// Drop the fractional minute
    #[default]
    Floor,
    /// Round to the nearest minute
    Nearest,
}

impl MinuteRounding {
    fn apply(self, minutes: f64) -> f64 {
        // An offset a hair below a whole minute is that minute
        let whole = minutes.round();
        if (minutes - whole).abs() < STEP_EPSILON {
            return whole;
        }
        match self {
            MinuteRounding::Floor => minutes.floor(),
            MinuteRounding::Nearest => minutes.round(),
        }
    }
}

/// Parameters of one sweep on one channel
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRequest {
    /// Channel receiving the ramp
    pub channel: u8,
    /// First row time
    pub start: TimeOfDay,
    /// Last possible row time, must be after `start` on the same day
    pub end: TimeOfDay,
    /// Intensity at `start`
    pub start_intensity: i32,
    /// Intensity at `end`
    pub end_intensity: i32,
    /// Row spacing
    pub step: StepMode,
    /// Ramp shape
    pub interpolation: Interpolation,
    /// Fractional minute handling
    pub rounding: MinuteRounding,
}

impl SweepRequest {
    /// Creates a sweep from `HH:MM` endpoints. The channel must exist.
    pub fn new(
        channel: u8,
        start: &str,
        start_intensity: i32,
        end: &str,
        end_intensity: i32,
        step: StepMode,
        interpolation: Interpolation,
    ) -> Result<Self> {
        if channel as usize >= CHANNEL_COUNT {
            return Err(Error::ValueOutOfRange(
                channel.into(),
                0,
                CHANNEL_COUNT as i64 - 1,
            ));
        }
        Ok(Self {
            channel,
            start: start.parse()?,
            end: end.parse()?,
            start_intensity,
            end_intensity,
            step,
            interpolation,
            rounding: MinuteRounding::default(),
        })
    }

    /// Creates a linear sweep
    pub fn linear(
        channel: u8,
        start: &str,
        start_intensity: i32,
        end: &str,
        end_intensity: i32,
        step: StepMode,
    ) -> Result<Self> {
        Self::new(
            channel,
            start,
            start_intensity,
            end,
            end_intensity,
            step,
            Interpolation::Linear,
        )
    }

    /// Creates a smoothstep sweep
    pub fn cubic(
        channel: u8,
        start: &str,
        start_intensity: i32,
        end: &str,
        end_intensity: i32,
        step: StepMode,
    ) -> Result<Self> {
        Self::new(
            channel,
            start,
            start_intensity,
            end,
            end_intensity,
            step,
            Interpolation::Cubic,
        )
    }

    pub fn with_rounding(mut self, rounding: MinuteRounding) -> Self {
        self.rounding = rounding;
        self
    }

    /// Sweep length in minutes; zero or negative when `end` is not after `start`
    pub fn duration(&self) -> f64 {
        self.end.minutes() as f64 - self.start.minutes() as f64
    }

    /// Distance between rows in minutes
    pub fn step_minutes(&self) -> f64 {
        match self.step {
            StepMode::Time(minutes) => minutes,
            StepMode::Count(count) if count != 0.0 => self.duration() / count,
            StepMode::Count(_) => 0.0,
        }
    }

    /// Offsets in minutes from `start`, end inclusive. Each call starts over.
    pub fn steps(&self) -> Steps {
        Steps {
            step: self.step_minutes(),
            span: self.duration(),
            index: 0,
        }
    }

    /// Schedule rows for this sweep, each setting only the sweep's channel
    #[instrument(skip(self), fields(channel = self.channel, start = %self.start, end = %self.end))]
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        let span = self.duration();
        let delta = (self.end_intensity - self.start_intensity) as f64;

        let entries: Vec<ScheduleEntry> = self
            .steps()
            .filter_map(|t| {
                let x = t / span;
                let intensity = (self.start_intensity as f64 + self.interpolation.delta(delta, x))
                    .round() as i32;

                let minutes = self.rounding.apply(self.start.minutes() as f64 + t);
                match TimeOfDay::from_minutes(minutes as u32) {
                    Ok(tod) => Some(ScheduleEntry::new(tod.to_string()).with_level(self.channel, intensity)),
                    Err(e) => {
                        warn!("Dropping sweep step at {} minutes: {}", minutes, e);
                        None
                    }
                }
            })
            .collect();

        if entries.is_empty() {
            debug!("Sweep produced no rows (step {} over {} minutes)", self.step_minutes(), span);
        }
        entries
    }
}

/// Iterator over sweep offsets in minutes
#[derive(Debug, Clone)]
pub struct Steps {
    step: f64,
    span: f64,
    index: u64,
}

impl Iterator for Steps {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.step < MIN_STEP_MINUTES || !self.step.is_finite() || self.span <= 0.0 {
            return None;
        }
        let t = self.index as f64 * self.step;
        if t > self.span + STEP_EPSILON {
            return None;
        }
        self.index += 1;
        if t >= self.span - STEP_EPSILON {
            return Some(self.span);
        }
        Some(t)
    }
}

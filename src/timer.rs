/*!
 # Shared PWM timers

 A controller has a fixed set of timers. Channels reference a timer by id and
 inherit its output frequency.
*/

use serde::Serialize;

use crate::state::ValidationError;

/// Number of timers on the controller
pub const TIMER_COUNT: usize = 4;

/// Highest frequency the device accepts, in Hz
pub const MAX_FREQUENCY_HZ: u32 = 50_000;

/// Frequency assigned when the device reports none
pub const DEFAULT_FREQUENCY_HZ: u32 = 500;

/// A timer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timer {
    /// Timer id (0-3)
    pub id: u8,
    /// Output frequency in Hz (0-50000)
    pub freq: u32,
}

impl Timer {
    /// Creates a timer with the default frequency
    pub fn new(id: u8) -> Self {
        Self {
            id,
            freq: DEFAULT_FREQUENCY_HZ,
        }
    }

    /// Creates a timer with an explicit frequency
    pub fn with_frequency(id: u8, freq: u32) -> Self {
        Self { id, freq }
    }

    /// A timer with a zero frequency cannot drive a channel
    pub fn valid(&self) -> bool {
        self.freq != 0
    }

    /// Display name, derived from the id
    pub fn name(&self) -> String {
        format!("Timer {}", self.id)
    }

    /// Names are a projection of the id; renaming is ignored.
    pub fn set_name(&mut self, _name: &str) {}

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.freq == 0 || self.freq > MAX_FREQUENCY_HZ {
            return Err(ValidationError::TimerFrequency {
                id: self.id,
                freq: self.freq,
            });
        }
        Ok(())
    }
}

/// The full, fixed-size set of timers indexed by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timers {
    timers: Vec<Timer>,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            timers: (0..TIMER_COUNT as u8).map(Timer::new).collect(),
        }
    }
}

impl Timers {
    /// Builds the set from timers placed by their own id.
    ///
    /// Ids missing from `timers` keep their defaults and ids out of range are
    /// dropped, so the set always holds exactly [`TIMER_COUNT`] timers.
    pub fn from_timers(timers: impl IntoIterator<Item = Timer>) -> Self {
        let mut set = Self::default();
        for timer in timers {
            if let Some(slot) = set.timers.get_mut(timer.id as usize) {
                *slot = timer;
            }
        }
        set
    }

    pub fn all(&self) -> &[Timer] {
        &self.timers
    }

    pub fn get(&self, id: u8) -> Option<&Timer> {
        self.timers.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Timer> {
        self.timers.get_mut(id as usize)
    }

    /// Display name for a channel's timer reference, empty when unassigned
    pub fn name_of(&self, id: Option<u8>) -> String {
        id.and_then(|id| self.get(id))
            .map(Timer::name)
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.timers.iter().try_for_each(Timer::validate)
    }
}

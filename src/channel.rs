/*!
 # Output channels

 Each channel drives one GPIO from one of the shared timers. Enabled channels
 become columns of the schedule.
*/

use serde::Serialize;

use crate::state::ValidationError;
use crate::timer::TIMER_COUNT;
use crate::{Error, Result};

/// Number of output channels on the controller
pub const CHANNEL_COUNT: usize = 8;

/// Highest GPIO number a channel may be wired to
pub const MAX_GPIO: u8 = 31;

/// Highest intensity a schedule cell accepts
pub const MAX_INTENSITY: i32 = 100;

/// Grid step for intensity editing
pub const INTENSITY_STEP: i32 = 10;

/// A channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Channel id (0-7)
    pub id: u8,
    /// User facing name
    pub name: String,
    /// Timer driving this channel, `None` when unassigned
    pub timer: Option<u8>,
    /// Output pin (0-31), `None` when unassigned
    pub gpio: Option<u8>,
    /// Whether the channel is part of the schedule
    pub enabled: bool,
}

/// Column a grid collaborator renders for an enabled channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    /// Header text
    pub title: String,
    /// Schedule entry field key, the stringified channel id
    pub field: String,
    /// Lowest editable intensity
    pub min: i32,
    /// Highest editable intensity
    pub max: i32,
    /// Editor step
    pub step: i32,
}

impl Channel {
    /// Creates a disabled channel with default name and timer 0
    pub fn new(id: u8) -> Self {
        Self {
            id,
            name: Self::default_name(id),
            timer: Some(0),
            gpio: None,
            enabled: false,
        }
    }

    pub(crate) fn default_name(id: u8) -> String {
        format!("Channel {id}")
    }

    /// A channel is valid once both its GPIO and timer are assigned
    pub fn valid(&self) -> bool {
        self.gpio.is_some() && self.timer.is_some()
    }

    /// Grid column for this channel
    pub fn column(&self) -> ColumnDescriptor {
        ColumnDescriptor {
            title: format!("Channel {}\n{}", self.id, self.name),
            field: self.id.to_string(),
            min: 0,
            max: MAX_INTENSITY,
            step: INTENSITY_STEP,
        }
    }
}

/// The full, fixed-size set of channels indexed by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    channels: Vec<Channel>,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            channels: (0..CHANNEL_COUNT as u8).map(Channel::new).collect(),
        }
    }
}

impl Channels {
    /// Builds the set from channels placed by their own id.
    ///
    /// Missing ids keep their defaults and out of range ids are dropped.
    pub fn from_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let mut set = Self::default();
        for channel in channels {
            let id = channel.id as usize;
            if let Some(slot) = set.channels.get_mut(id) {
                *slot = channel;
            }
        }
        set
    }

    pub fn all(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, id: u8) -> Option<&Channel> {
        self.channels.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Channel> {
        self.channels.get_mut(id as usize)
    }

    /// Enabled channels in id order
    pub fn enabled(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.enabled)
    }

    /// Column descriptors for the enabled channels.
    ///
    /// Must be regenerated whenever the enabled set changes.
    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.enabled().map(Channel::column).collect()
    }

    /// Sets a channel's wiring and enabled flag in one step.
    ///
    /// Nothing changes when the result would be an enabled channel without a
    /// GPIO or timer.
    pub fn assign(
        &mut self,
        id: u8,
        gpio: Option<u8>,
        timer: Option<u8>,
        enabled: bool,
    ) -> Result<()> {
        let channel = self
            .get_mut(id)
            .ok_or(Error::ValueOutOfRange(id as i64, 0, CHANNEL_COUNT as i64 - 1))?;
        if enabled && (gpio.is_none() || timer.is_none()) {
            return Err(ValidationError::EnabledWithoutAssignment { id }.into());
        }
        channel.gpio = gpio;
        channel.timer = timer;
        channel.enabled = enabled;
        Ok(())
    }

    /// Enables or disables a channel, refusing to enable an unassigned one
    pub fn set_enabled(&mut self, id: u8, enabled: bool) -> Result<()> {
        let channel = self
            .get_mut(id)
            .ok_or(Error::ValueOutOfRange(id as i64, 0, CHANNEL_COUNT as i64))?;
        if enabled && !channel.valid() {
            return Err(ValidationError::EnabledWithoutAssignment { id }.into());
        }
        channel.enabled = enabled;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        for channel in &self.channels {
            if let Some(gpio) = channel.gpio {
                if gpio > MAX_GPIO {
                    return Err(ValidationError::GpioOutOfRange { id: channel.id, gpio });
                }
            }
            if let Some(timer) = channel.timer {
                if timer as usize >= TIMER_COUNT {
                    return Err(ValidationError::UnknownTimer { id: channel.id, timer });
                }
            }
            if channel.enabled && !channel.valid() {
                return Err(ValidationError::EnabledWithoutAssignment { id: channel.id });
            }
        }

        for (i, channel) in self.channels.iter().enumerate() {
            let Some(gpio) = channel.gpio else { continue };
            if let Some(other) = self.channels[..i].iter().find(|c| c.gpio == Some(gpio)) {
                return Err(ValidationError::DuplicateGpio {
                    id: channel.id,
                    gpio,
                    other: other.id,
                });
            }
        }

        Ok(())
    }
}

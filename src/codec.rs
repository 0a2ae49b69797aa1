/*!
 # Settings wire format

 The device exchanges one JSON document holding every collection as a
 dictionary: timers and channels keyed by id, schedule rows keyed by time of
 day. Decoding always places an entity by its dictionary key, never by the
 order keys happen to arrive in.

 ```json
 {
   "timers":   { "0": { "id": 0, "freq": 500 } },
   "channels": { "0": { "id": 0, "name": "Blue", "timer": 0, "gpio": 18, "enabled": true } },
   "schedule": { "08:00": { "tod": "08:00", "0": 20 } },
   "system":   { "hostname": "ledc", "timezone": "MST7MDT", "ntp_servers": ["pool.ntp.org", ""] }
 }
 ```
*/

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::channel::{Channel, Channels, CHANNEL_COUNT, MAX_GPIO};
use crate::schedule::{Schedule, ScheduleEntry, TimeOfDay};
use crate::timer::{Timer, Timers, DEFAULT_FREQUENCY_HZ, TIMER_COUNT};

/// A settings document that parsed as JSON but has an invalid shape
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid {kind} key '{key}'")]
    InvalidKey { kind: &'static str, key: String },

    #[error("Duplicate {kind} key '{key}'")]
    DuplicateKey { kind: &'static str, key: String },

    #[error("{kind} '{key}' carries mismatched {field} '{found}'")]
    KeyMismatch {
        kind: &'static str,
        key: String,
        field: &'static str,
        found: String,
    },

    #[error("Invalid {kind} '{key}': {source}")]
    Record {
        kind: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} '{key}': {field} {value} out of range")]
    OutOfRange {
        kind: &'static str,
        key: String,
        field: &'static str,
        value: i64,
    },

    #[error("Schedule entry '{tod}': unknown channel '{channel}'")]
    UnknownChannel { tod: String, channel: String },

    #[error("Schedule entry '{tod}': invalid intensity {value} for channel {channel}")]
    InvalidIntensity { tod: String, channel: u8, value: Value },

    #[error("Schedule entry has an invalid time of day: {0}")]
    InvalidTimeOfDay(Value),

    #[error("Failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// An entity that travels as a value in a keyed dictionary
pub trait DictionaryEntity: Serialize + Sized {
    /// Dictionary key type
    type Key: Ord + Clone + fmt::Display;

    /// Name used in error messages
    const KIND: &'static str;

    /// Key this entity is stored under
    fn dictionary_key(&self) -> Self::Key;

    /// Parses and range-checks a raw dictionary key
    fn parse_key(raw: &str) -> Result<Self::Key, CodecError>;

    /// Builds the entity stored under `key`, applying defaults for missing fields
    fn from_record(key: &Self::Key, record: Value) -> Result<Self, CodecError>;
}

/// Encodes a collection as a dictionary keyed by each entity's key
pub fn to_dictionary<'a, T, I>(items: I) -> Result<Map<String, Value>, CodecError>
where
    T: DictionaryEntity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items
        .into_iter()
        .map(|item| {
            let value = serde_json::to_value(item).map_err(|source| CodecError::Encode {
                kind: T::KIND,
                source,
            })?;
            Ok((item.dictionary_key().to_string(), value))
        })
        .collect()
}

/// Decodes a dictionary into entities ordered by key
pub fn from_dictionary<T: DictionaryEntity>(
    dictionary: Map<String, Value>,
) -> Result<BTreeMap<T::Key, T>, CodecError> {
    let mut decoded = BTreeMap::new();
    for (raw, record) in dictionary {
        let key = T::parse_key(&raw)?;
        let entity = T::from_record(&key, record)?;
        if decoded.insert(key, entity).is_some() {
            return Err(CodecError::DuplicateKey { kind: T::KIND, key: raw });
        }
    }
    Ok(decoded)
}

/// Replaces every empty-string object field with `null`.
///
/// Numeric fields on the device cannot parse `""`. Array elements are left as is.
pub fn nullify_empty_strings(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for field in map.values_mut() {
                if field.as_str() == Some("") {
                    *field = Value::Null;
                } else {
                    nullify_empty_strings(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(nullify_empty_strings),
        _ => {}
    }
}

/// Null and blank strings both read as "not assigned"
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        value => T::deserialize(value).map(Some).map_err(de::Error::custom),
    }
}

/// Like [`blank_as_none`] but keeps an absent field (outer `None`) apart from a blank one
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    blank_as_none(deserializer).map(Some)
}

fn blank_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    blank_as_none(deserializer).map(Option::unwrap_or_default)
}

fn ntp_pair<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[String; 2], D::Error> {
    let servers: Option<Vec<Option<String>>> = blank_as_none(deserializer)?;
    let mut servers = servers.unwrap_or_default().into_iter().map(Option::unwrap_or_default);
    Ok([
        servers.next().unwrap_or_default(),
        servers.next().unwrap_or_default(),
    ])
}

fn parse_record<R: DeserializeOwned>(
    kind: &'static str,
    key: &impl fmt::Display,
    record: Value,
) -> Result<R, CodecError> {
    serde_json::from_value(record).map_err(|source| CodecError::Record {
        kind,
        key: key.to_string(),
        source,
    })
}

fn parse_id(kind: &'static str, raw: &str, count: usize) -> Result<u8, CodecError> {
    raw.parse::<u8>()
        .ok()
        .filter(|id| (*id as usize) < count)
        .ok_or_else(|| CodecError::InvalidKey {
            kind,
            key: raw.to_string(),
        })
}

fn check_id(kind: &'static str, key: u8, embedded: Option<u8>) -> Result<(), CodecError> {
    match embedded {
        Some(id) if id != key => Err(CodecError::KeyMismatch {
            kind,
            key: key.to_string(),
            field: "id",
            found: id.to_string(),
        }),
        _ => Ok(()),
    }
}

#[derive(Deserialize)]
struct TimerRecord {
    #[serde(default, deserialize_with = "blank_as_none")]
    id: Option<u8>,
    #[serde(default, deserialize_with = "blank_as_none")]
    freq: Option<u32>,
}

impl DictionaryEntity for Timer {
    type Key = u8;
    const KIND: &'static str = "timer";

    fn dictionary_key(&self) -> u8 {
        self.id
    }

    fn parse_key(raw: &str) -> Result<u8, CodecError> {
        parse_id(Self::KIND, raw, TIMER_COUNT)
    }

    fn from_record(key: &u8, record: Value) -> Result<Self, CodecError> {
        let record: TimerRecord = parse_record(Self::KIND, key, record)?;
        check_id(Self::KIND, *key, record.id)?;
        Ok(Timer::with_frequency(
            *key,
            record.freq.unwrap_or(DEFAULT_FREQUENCY_HZ),
        ))
    }
}

#[derive(Deserialize)]
struct ChannelRecord {
    #[serde(default, deserialize_with = "blank_as_none")]
    id: Option<u8>,
    #[serde(default, deserialize_with = "blank_as_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    timer: Option<Option<i64>>,
    #[serde(default, deserialize_with = "blank_as_none")]
    gpio: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    enabled: Option<bool>,
}

impl DictionaryEntity for Channel {
    type Key = u8;
    const KIND: &'static str = "channel";

    fn dictionary_key(&self) -> u8 {
        self.id
    }

    fn parse_key(raw: &str) -> Result<u8, CodecError> {
        parse_id(Self::KIND, raw, CHANNEL_COUNT)
    }

    fn from_record(key: &u8, record: Value) -> Result<Self, CodecError> {
        let record: ChannelRecord = parse_record(Self::KIND, key, record)?;
        check_id(Self::KIND, *key, record.id)?;

        // The device reports an unassigned timer as the timer count and an
        // unconnected pin as a negative number.
        let timer = match record.timer {
            None => Some(0),
            Some(Some(t)) if (0..TIMER_COUNT as i64).contains(&t) => Some(t as u8),
            Some(_) => None,
        };
        let gpio = match record.gpio {
            Some(g) if g > MAX_GPIO as i64 => {
                return Err(CodecError::OutOfRange {
                    kind: Self::KIND,
                    key: key.to_string(),
                    field: "gpio",
                    value: g,
                })
            }
            Some(g) if g >= 0 => Some(g as u8),
            _ => None,
        };

        Ok(Channel {
            id: *key,
            name: record.name.unwrap_or_else(|| Channel::default_name(*key)),
            timer,
            gpio,
            enabled: record.enabled.unwrap_or(false),
        })
    }
}

impl Serialize for ScheduleEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.levels().count()))?;
        map.serialize_entry("tod", &self.tod)?;
        for (channel, value) in self.levels() {
            map.serialize_entry(&channel.to_string(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScheduleEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        entry_from_map(map).map_err(de::Error::custom)
    }
}

fn entry_from_map(mut map: Map<String, Value>) -> Result<ScheduleEntry, CodecError> {
    let tod = match map.remove("tod") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(tod)) => tod,
        Some(other) => return Err(CodecError::InvalidTimeOfDay(other)),
    };
    let mut entry = ScheduleEntry::new(tod);

    for (key, value) in map {
        // Non-numeric fields belong to the grid, not the device
        let Ok(channel) = key.parse::<u8>() else {
            continue;
        };
        if channel as usize >= CHANNEL_COUNT {
            return Err(CodecError::UnknownChannel {
                tod: entry.tod,
                channel: key,
            });
        }
        if value.is_null() || value.as_str() == Some("") {
            continue;
        }
        match value.as_f64() {
            Some(v) => entry.set_level(channel, Some(v.round() as i32)),
            None => {
                return Err(CodecError::InvalidIntensity {
                    tod: entry.tod,
                    channel,
                    value,
                })
            }
        }
    }

    Ok(entry)
}

impl DictionaryEntity for ScheduleEntry {
    type Key = String;
    const KIND: &'static str = "schedule entry";

    fn dictionary_key(&self) -> String {
        self.tod.clone()
    }

    fn parse_key(raw: &str) -> Result<String, CodecError> {
        raw.parse::<TimeOfDay>()
            .map(|_| raw.to_string())
            .map_err(|_| CodecError::InvalidKey {
                kind: Self::KIND,
                key: raw.to_string(),
            })
    }

    fn from_record(key: &String, record: Value) -> Result<Self, CodecError> {
        let mut entry: ScheduleEntry = parse_record(Self::KIND, key, record)?;
        if entry.tod.is_empty() {
            entry.tod = key.clone();
        } else if entry.tod != *key {
            return Err(CodecError::KeyMismatch {
                kind: Self::KIND,
                key: key.clone(),
                field: "tod",
                found: entry.tod,
            });
        }
        Ok(entry)
    }
}

impl Serialize for Timers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_dictionary(self.all())
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dictionary = Map::deserialize(deserializer)?;
        let timers = from_dictionary::<Timer>(dictionary).map_err(de::Error::custom)?;
        Ok(Timers::from_timers(timers.into_values()))
    }
}

impl Serialize for Channels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_dictionary(self.all())
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Channels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dictionary = Map::deserialize(deserializer)?;
        let channels = from_dictionary::<Channel>(dictionary).map_err(de::Error::custom)?;
        Ok(Channels::from_channels(channels.into_values()))
    }
}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_dictionary(self.entries())
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dictionary = Map::deserialize(deserializer)?;
        let entries = from_dictionary::<ScheduleEntry>(dictionary).map_err(de::Error::custom)?;
        // Keys are `HH:MM`, so key order is chronological
        Ok(Schedule::from_entries(entries.into_values().collect()))
    }
}

/// Device-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemSettings {
    #[serde(default, deserialize_with = "blank_string")]
    pub hostname: String,
    #[serde(default, deserialize_with = "blank_string")]
    pub timezone: String,
    #[serde(default, deserialize_with = "ntp_pair")]
    pub ntp_servers: [String; 2],
}

/// The complete settings document exchanged with the device
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SettingsAggregate {
    #[serde(default)]
    pub timers: Timers,
    #[serde(default)]
    pub channels: Channels,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub system: SystemSettings,
}

impl SettingsAggregate {
    /// Parses a settings document as received from the device or a backup file
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The document as sent to the device, blank fields replaced with `null`
    pub fn to_wire_value(&self) -> crate::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        nullify_empty_strings(&mut value);
        Ok(value)
    }

    pub fn to_wire_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.to_wire_value()?)?)
    }
}

/*!
 # Time-of-day intensity schedule

 The schedule is a set of rows keyed by time of day. Each row optionally sets
 an intensity for any channel; a channel keeps its last set value until the
 next row that mentions it, wrapping around midnight.
*/

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};

use crate::channel::{CHANNEL_COUNT, MAX_INTENSITY};
use crate::state::ValidationError;
use crate::sweep::SweepRequest;
use crate::{Error, Result};

/// Minutes in a day
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A wall-clock time of day with minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    /// Builds a time of day from minutes after midnight (0-1439)
    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if minutes >= MINUTES_PER_DAY {
            return Err(Error::ValueOutOfRange(
                minutes as i64,
                0,
                MINUTES_PER_DAY as i64,
            ));
        }
        Ok(Self(minutes as u16))
    }

    pub fn minutes(self) -> u32 {
        self.0 as u32
    }

    /// Truncates a chrono time to the minute
    pub fn from_time(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    /// Parses the zero-padded `HH:MM` form used on the wire
    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 5 {
            return Err(Error::InvalidTimeOfDay(s.to_string()));
        }
        NaiveTime::parse_from_str(s, "%H:%M")
            .map(Self::from_time)
            .map_err(|_| Error::InvalidTimeOfDay(s.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// One schedule row: a time of day and a sparse set of channel intensities
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScheduleEntry {
    /// Time of day as `HH:MM`; may be blank while a row is being edited
    pub tod: String,
    levels: BTreeMap<u8, i32>,
}

impl ScheduleEntry {
    pub fn new(tod: impl Into<String>) -> Self {
        Self {
            tod: tod.into(),
            levels: BTreeMap::new(),
        }
    }

    /// Builder-style variant of [`ScheduleEntry::set_level`]
    pub fn with_level(mut self, channel: u8, value: i32) -> Self {
        self.levels.insert(channel, value);
        self
    }

    pub fn level(&self, channel: u8) -> Option<i32> {
        self.levels.get(&channel).copied()
    }

    /// Sets or clears one channel's intensity
    pub fn set_level(&mut self, channel: u8, value: Option<i32>) {
        match value {
            Some(value) => self.levels.insert(channel, value),
            None => self.levels.remove(&channel),
        };
    }

    /// Channel intensities in channel order
    pub fn levels(&self) -> impl Iterator<Item = (u8, i32)> + '_ {
        self.levels.iter().map(|(c, v)| (*c, *v))
    }

    /// Copies every level of `other` into this row, keeping channels it does not set
    pub fn merge_from(&mut self, other: &ScheduleEntry) {
        self.levels.extend(other.levels());
    }

    pub fn time_of_day(&self) -> Option<TimeOfDay> {
        self.tod.parse().ok()
    }
}

/// Ordered collection of schedule rows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps rows as given, without sorting or merging
    pub fn from_entries(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tod: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.tod == tod)
    }

    pub fn get_mut(&mut self, tod: &str) -> Option<&mut ScheduleEntry> {
        self.entries.iter_mut().find(|e| e.tod == tod)
    }

    /// Replaces all rows with the grid's current rows
    pub fn replace_rows(&mut self, rows: Vec<ScheduleEntry>) {
        self.entries = rows;
    }

    /// Appends a row without merging, the way a grid adds a blank row
    pub fn push_row(&mut self, row: ScheduleEntry) {
        self.entries.push(row);
    }

    /// Inserts a row, merging into an existing row with the same time of day
    pub fn upsert(&mut self, entry: ScheduleEntry) {
        match self.get_mut(&entry.tod) {
            Some(existing) => existing.merge_from(&entry),
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, tod: &str) -> Option<ScheduleEntry> {
        let index = self.entries.iter().position(|e| e.tod == tod)?;
        Some(self.entries.remove(index))
    }

    /// Sorts rows by time of day; `HH:MM` strings sort chronologically
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.tod.cmp(&b.tod));
    }

    /// Upserts every row of a sweep and re-sorts. Returns the number of rows emitted.
    pub fn apply_sweep(&mut self, sweep: &SweepRequest) -> usize {
        let entries = sweep.entries();
        let count = entries.len();
        for entry in entries {
            self.upsert(entry);
        }
        self.sort();
        count
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut seen = HashSet::new();

        for (row, entry) in self.entries.iter().enumerate() {
            if entry.tod.trim().is_empty() {
                return Err(ValidationError::MissingTimeOfDay { row });
            }
            if entry.time_of_day().is_none() {
                return Err(ValidationError::MalformedTimeOfDay {
                    row,
                    tod: entry.tod.clone(),
                });
            }
            if !seen.insert(entry.tod.as_str()) {
                return Err(ValidationError::DuplicateTimeOfDay {
                    tod: entry.tod.clone(),
                });
            }
            for (channel, value) in entry.levels() {
                if channel as usize >= CHANNEL_COUNT {
                    return Err(ValidationError::UnknownChannel {
                        tod: entry.tod.clone(),
                        channel,
                    });
                }
                if !(0..=MAX_INTENSITY).contains(&value) {
                    return Err(ValidationError::IntensityOutOfRange {
                        tod: entry.tod.clone(),
                        channel,
                        value,
                    });
                }
            }
        }

        Ok(())
    }

    /// Rows with a well-formed time, in chronological order
    fn timed(&self) -> Vec<(TimeOfDay, &ScheduleEntry)> {
        let mut timed: Vec<_> = self
            .entries
            .iter()
            .filter_map(|e| e.time_of_day().map(|t| (t, e)))
            .collect();
        timed.sort_by_key(|(t, _)| *t);
        timed
    }

    /// First row strictly after `now`, wrapping to the first row of the day
    pub fn next_event(&self, now: TimeOfDay) -> Option<&ScheduleEntry> {
        let timed = self.timed();
        timed
            .iter()
            .find(|(t, _)| *t > now)
            .or_else(|| timed.first())
            .map(|(_, e)| *e)
    }

    /// Minutes from `now` until `next`, wrapping past midnight
    pub fn minutes_until(next: TimeOfDay, now: TimeOfDay) -> u32 {
        (next.minutes() + MINUTES_PER_DAY - now.minutes()) % MINUTES_PER_DAY
    }

    /// Intensity a channel holds at `now`.
    ///
    /// This is the last value set at or before `now`, or the last value of the
    /// day when nothing has been set yet today.
    pub fn level_at(&self, channel: u8, now: TimeOfDay) -> Option<i32> {
        let timed = self.timed();
        let set = timed
            .iter()
            .filter_map(|(t, e)| e.level(channel).map(|v| (*t, v)));

        let mut today = None;
        let mut last = None;
        for (t, v) in set {
            if t <= now {
                today = Some(v);
            }
            last = Some(v);
        }
        today.or(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tod(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn time_of_day_parse_and_format() {
        assert_eq!(tod("08:05").minutes(), 485);
        assert_eq!(tod("23:59").to_string(), "23:59");
        assert_eq!(TimeOfDay::from_minutes(61).unwrap().to_string(), "01:01");

        for bad in ["", "8:00", "24:00", "12:60", "ab:cd", "12:00:00"] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "{bad} should be rejected");
        }
        assert!(TimeOfDay::from_minutes(MINUTES_PER_DAY).is_err());
    }

    #[test]
    fn upsert_merges_rows_with_same_time() {
        let mut schedule = Schedule::new();
        schedule.upsert(ScheduleEntry::new("08:00").with_level(0, 20).with_level(1, 40));
        schedule.upsert(ScheduleEntry::new("08:00").with_level(0, 30));

        assert_eq!(schedule.len(), 1);
        let row = schedule.get("08:00").unwrap();
        assert_eq!(row.level(0), Some(30));
        assert_eq!(row.level(1), Some(40));
    }

    #[test]
    fn sort_is_chronological() {
        let mut schedule = Schedule::from_entries(vec![
            ScheduleEntry::new("20:00"),
            ScheduleEntry::new("08:30"),
            ScheduleEntry::new("08:00"),
        ]);
        schedule.sort();
        let tods: Vec<_> = schedule.entries().iter().map(|e| e.tod.as_str()).collect();
        assert_eq!(tods, ["08:00", "08:30", "20:00"]);
    }

    #[test]
    fn validate_requires_unique_non_empty_times() {
        let mut schedule = Schedule::from_entries(vec![ScheduleEntry::new("08:00"), ScheduleEntry::new("")]);
        assert_eq!(
            schedule.validate(),
            Err(ValidationError::MissingTimeOfDay { row: 1 })
        );

        schedule.replace_rows(vec![ScheduleEntry::new("08:00"), ScheduleEntry::new("08:00")]);
        assert_eq!(
            schedule.validate(),
            Err(ValidationError::DuplicateTimeOfDay { tod: "08:00".into() })
        );

        schedule.replace_rows(vec![ScheduleEntry::new("8:00")]);
        assert!(matches!(
            schedule.validate(),
            Err(ValidationError::MalformedTimeOfDay { row: 0, .. })
        ));
    }

    #[test]
    fn validate_checks_intensity_range() {
        let schedule = Schedule::from_entries(vec![ScheduleEntry::new("08:00").with_level(2, 101)]);
        assert_eq!(
            schedule.validate(),
            Err(ValidationError::IntensityOutOfRange {
                tod: "08:00".into(),
                channel: 2,
                value: 101
            })
        );
    }

    #[test]
    fn validate_rejects_unknown_channel() {
        let schedule = Schedule::from_entries(vec![ScheduleEntry::new("08:00").with_level(9, 50)]);
        assert_eq!(
            schedule.validate(),
            Err(ValidationError::UnknownChannel {
                tod: "08:00".into(),
                channel: 9
            })
        );
    }

    #[test]
    fn next_event_wraps_to_first_row() {
        let schedule = Schedule::from_entries(vec![
            ScheduleEntry::new("20:00"),
            ScheduleEntry::new("08:00"),
        ]);
        assert_eq!(schedule.next_event(tod("07:00")).unwrap().tod, "08:00");
        assert_eq!(schedule.next_event(tod("08:00")).unwrap().tod, "20:00");
        assert_eq!(schedule.next_event(tod("21:00")).unwrap().tod, "08:00");
        assert!(Schedule::new().next_event(tod("21:00")).is_none());
    }

    #[test]
    fn minutes_until_wraps_past_midnight() {
        assert_eq!(Schedule::minutes_until(tod("08:00"), tod("07:30")), 30);
        assert_eq!(Schedule::minutes_until(tod("01:00"), tod("23:00")), 120);
        assert_eq!(Schedule::minutes_until(tod("05:00"), tod("05:00")), 0);
    }

    #[test]
    fn level_at_carries_previous_day_value() {
        let schedule = Schedule::from_entries(vec![
            ScheduleEntry::new("08:00").with_level(0, 20),
            ScheduleEntry::new("12:00").with_level(1, 50),
            ScheduleEntry::new("20:00").with_level(0, 80),
        ]);
        assert_eq!(schedule.level_at(0, tod("06:00")), Some(80));
        assert_eq!(schedule.level_at(0, tod("08:00")), Some(20));
        assert_eq!(schedule.level_at(0, tod("21:00")), Some(80));
        assert_eq!(schedule.level_at(1, tod("00:00")), Some(50));
        assert_eq!(schedule.level_at(3, tod("12:00")), None);
    }
}

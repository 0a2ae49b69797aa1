/*!
 # Chart datasets

 Projects the schedule into one point series per enabled channel. The day is
 cyclic, so every non-empty series is pinned at `00:00` and `24:00` with the
 last value the channel was set to.
*/

use std::collections::BTreeMap;

use serde::Serialize;

use crate::channel::Channels;
use crate::schedule::Schedule;

/// Label of the start of day point
pub const DAY_START: &str = "00:00";

/// Label of the end of day point
pub const DAY_END: &str = "24:00";

/// One chart point
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Point {
    /// Time of day label
    pub x: String,
    /// Intensity
    pub y: i32,
}

impl Point {
    pub fn new(x: impl Into<String>, y: i32) -> Self {
        Self { x: x.into(), y }
    }
}

/// Points for one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Series {
    pub channel: u8,
    pub label: String,
    pub points: Vec<Point>,
}

/// Builds the series for every enabled channel, in channel order.
///
/// Rows are read in stored order and rows without a time are skipped.
pub fn project(schedule: &Schedule, channels: &Channels) -> Vec<Series> {
    let mut series: Vec<Series> = channels
        .enabled()
        .map(|c| Series {
            channel: c.id,
            label: c.name.clone(),
            points: Vec::new(),
        })
        .collect();

    let index: BTreeMap<u8, usize> = series
        .iter()
        .enumerate()
        .map(|(i, s)| (s.channel, i))
        .collect();
    let mut last: BTreeMap<u8, i32> = BTreeMap::new();

    for entry in schedule.entries().iter().filter(|e| !e.tod.is_empty()) {
        for (channel, value) in entry.levels() {
            let Some(&i) = index.get(&channel) else { continue };
            series[i].points.push(Point::new(entry.tod.as_str(), value));
            last.insert(channel, value);
        }
    }

    for s in &mut series {
        if let Some(&value) = last.get(&s.channel) {
            s.points.insert(0, Point::new(DAY_START, value));
            s.points.push(Point::new(DAY_END, value));
        }
    }

    series
}

/*!
 # Push channel liveness

 The device pushes `{"time": "..."}` messages periodically. A [`Watchdog`] fed
 with those messages tells whether the connection is still up.
*/

use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, instrument, warn};

use crate::{Error, Result};

/// One push channel message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClockMessage {
    pub time: String,
}

impl ClockMessage {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Device time as reported, without any timezone conversion
    pub fn timestamp(&self) -> Result<NaiveDateTime> {
        let time = self.time.trim();
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(time) {
            return Ok(dt.naive_local());
        }
        NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M:%S")
            .map_err(|_| Error::General(format!("Invalid device time: {time}")))
    }
}

/// Tracks when the device was last heard from
#[derive(Debug, Clone)]
pub struct Watchdog {
    interval: Duration,
    last_seen: Option<Instant>,
    device_time: Option<NaiveDateTime>,
}

impl Watchdog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_seen: None,
            device_time: None,
        }
    }

    /// Records a message. A message with an unreadable time still counts as a sign of life.
    pub fn feed(&mut self, message: &ClockMessage, now: Instant) {
        self.last_seen = Some(now);
        match message.timestamp() {
            Ok(time) => self.device_time = Some(time),
            Err(e) => debug!("{}", e),
        }
    }

    pub fn is_alive(&self, now: Instant) -> bool {
        self.last_seen
            .is_some_and(|seen| now.saturating_duration_since(seen) <= self.interval)
    }

    /// Last device time received
    pub fn device_time(&self) -> Option<NaiveDateTime> {
        self.device_time
    }
}

/// Consumes raw push messages and publishes connection state on `alive`.
///
/// Returns when the message channel closes.
#[instrument(skip(messages, alive))]
pub async fn monitor(
    mut messages: mpsc::Receiver<String>,
    interval: Duration,
    alive: watch::Sender<bool>,
) {
    let mut watchdog = Watchdog::new(interval);
    loop {
        match time::timeout(interval, messages.recv()).await {
            Ok(Some(text)) => {
                match ClockMessage::parse(&text) {
                    Ok(message) => watchdog.feed(&message, Instant::now()),
                    Err(e) => {
                        warn!("Ignoring push message: {}", e);
                        continue;
                    }
                }
                alive.send_replace(true);
            }
            Ok(None) => {
                alive.send_replace(false);
                return;
            }
            Err(_) => {
                if *alive.borrow() {
                    warn!("Connection lost, nothing heard for {:?}", interval);
                }
                alive.send_replace(false);
            }
        }
    }
}

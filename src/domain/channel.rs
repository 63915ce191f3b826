// Channel identity and requested time windows
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;

/// SEED channel key: `{network, station, location, channel}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelKey {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl ChannelKey {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.trim().to_string(),
            station: station.trim().to_string(),
            location: Self::normalize_location(location),
            channel: channel.trim().to_string(),
        }
    }

    /// Like `new`, but `None` when network, station or channel is blank.
    pub fn try_new(network: &str, station: &str, location: &str, channel: &str) -> Option<Self> {
        let key = Self::new(network, station, location, channel);
        let complete =
            !key.network.is_empty() && !key.station.is_empty() && !key.channel.is_empty();
        complete.then_some(key)
    }

    /// Parse a composite id such as `IU.ANMO.00.BHZ` or `IU.ANMO..BHZ`.
    pub fn parse(id: &str) -> Option<Self> {
        let parts: Vec<&str> = id.split('.').collect();
        match parts.as_slice() {
            [net, sta, loc, cha] => Self::try_new(net, sta, loc, cha),
            _ => None,
        }
    }

    /// Composite id used to key records and segments.
    pub fn id(&self) -> String {
        self.to_string()
    }

    // Station services show an empty location code as "--"
    fn normalize_location(location: &str) -> String {
        let trimmed = location.trim();
        if trimmed == "--" {
            String::new()
        } else {
            trimmed.to_string()
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Parse both bounds; accepts RFC 3339 or naive `YYYY-MM-DDTHH:MM:SS[.fff]` (UTC).
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn start_ms(&self) -> f64 {
        epoch_ms(&self.start)
    }

    pub fn end_ms(&self) -> f64 {
        epoch_ms(&self.end)
    }

    pub fn contains_ms(&self, time_ms: f64) -> bool {
        time_ms >= self.start_ms() && time_ms <= self.end_ms()
    }
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Some(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Milliseconds since the Unix epoch, keeping sub-millisecond precision.
pub fn epoch_ms(time: &DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1000.0
}

/// Format for FDSN web-service query parameters.
pub fn fdsn_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

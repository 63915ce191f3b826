// Waveform domain models
use super::channel::epoch_ms;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Sample encodings understood by the record decoder (SEED blockette 1000 tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Encoding {
    Int16,
    Int32,
    Float32,
    Float64,
    Steim1,
    Steim2,
}

impl Encoding {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Encoding::Int16),
            3 => Some(Encoding::Int32),
            4 => Some(Encoding::Float32),
            5 => Some(Encoding::Float64),
            10 => Some(Encoding::Steim1),
            11 => Some(Encoding::Steim2),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Encoding::Int16 => 1,
            Encoding::Int32 => 3,
            Encoding::Float32 => 4,
            Encoding::Float64 => 5,
            Encoding::Steim1 => 10,
            Encoding::Steim2 => 11,
        }
    }
}

/// One decoded data record.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub channel_id: String,
    pub start_time: DateTime<Utc>,
    pub sample_rate: f64,
    pub sample_count: usize,
    pub encoding: Encoding,
    /// Encoded payload, a slice of the fetched buffer.
    pub payload: Bytes,
    pub samples: Vec<f64>,
}

impl RawRecord {
    /// Time just past the last sample (`start + count / rate`).
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + span(self.sample_count, self.sample_rate)
    }
}

/// Gap-free run of samples at a fixed rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub channel_id: String,
    pub start_time: DateTime<Utc>,
    pub sample_rate: f64,
    pub samples: Vec<f64>,
}

impl Segment {
    pub fn from_record(record: RawRecord) -> Self {
        Self {
            channel_id: record.channel_id,
            start_time: record.start_time,
            sample_rate: record.sample_rate,
            samples: record.samples,
        }
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + span(self.samples.len(), self.sample_rate)
    }

    pub fn period_ms(&self) -> f64 {
        1000.0 / self.sample_rate
    }

    pub fn start_ms(&self) -> f64 {
        epoch_ms(&self.start_time)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaveformPoint {
    pub time_ms: f64,
    pub value: f64,
}

impl WaveformPoint {
    pub fn new(time_ms: f64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// Full logical series for one channel; `points` never step backwards in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub channel_id: String,
    pub points: Vec<WaveformPoint>,
    pub segment_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecimatedSeries {
    pub points: Vec<WaveformPoint>,
    pub y_min: f64,
    pub y_max: f64,
}

/// What a finished run hands to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayedSeries {
    pub channel_id: String,
    #[serde(flatten)]
    pub series: DecimatedSeries,
    /// Mean removed from every displayed value.
    pub mean: f64,
    pub sample_count: usize,
    pub segment_count: usize,
    pub rejected_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaveformOutcome {
    Series(DisplayedSeries),
    NoData,
}

fn span(sample_count: usize, sample_rate: f64) -> Duration {
    if sample_rate <= 0.0 {
        return Duration::zero();
    }
    let micros = (sample_count as f64 * 1_000_000.0 / sample_rate).round() as i64;
    Duration::microseconds(micros)
}

// Segment assembler - Groups decoded records into gap-free runs per channel
use crate::domain::waveform::{RawRecord, Segment};
use std::collections::HashMap;

/// Relative difference under which two sample rates count as the same.
const RATE_TOLERANCE: f64 = 1e-4;

/// Segments per channel, iterated in first-seen order.
#[derive(Debug, Default)]
pub struct ChannelSegments {
    order: Vec<String>,
    by_channel: HashMap<String, Vec<Segment>>,
}

impl ChannelSegments {
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn segments(&self, channel_id: &str) -> &[Segment] {
        self.by_channel
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Take ownership of one channel's segments, dropping the rest.
    pub fn into_channel(mut self, channel_id: &str) -> Vec<Segment> {
        self.by_channel.remove(channel_id).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn entry(&mut self, channel_id: &str) -> &mut Vec<Segment> {
        if !self.by_channel.contains_key(channel_id) {
            self.order.push(channel_id.to_string());
        }
        self.by_channel.entry(channel_id.to_string()).or_default()
    }
}

/// Sort records by start time and merge contiguous ones.
///
/// A record continues the current segment of its channel when its start lies within
/// `gap_tolerance` sample periods of the segment's end and the sample rate matches.
/// Anything else, a gap or an overlap, starts a new segment.
pub fn assemble_segments(mut records: Vec<RawRecord>, gap_tolerance: f64) -> ChannelSegments {
    // stable: equal start times keep buffer order
    records.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    let mut assembled = ChannelSegments::default();
    for record in records {
        if record.samples.is_empty() {
            continue;
        }
        tracing::trace!(
            "{} {} to {}: {} samples, encoding {}, {} payload bytes",
            record.channel_id,
            record.start_time,
            record.end_time(),
            record.sample_count,
            record.encoding.tag(),
            record.payload.len()
        );
        let segments = assembled.entry(&record.channel_id);
        match segments.last_mut() {
            Some(current) if continues(current, &record, gap_tolerance) => {
                current.samples.extend_from_slice(&record.samples);
            }
            Some(previous) => {
                tracing::debug!(
                    "New segment for {} at {} (previous ended {})",
                    record.channel_id,
                    record.start_time,
                    previous.end_time()
                );
                segments.push(Segment::from_record(record));
            }
            None => segments.push(Segment::from_record(record)),
        }
    }

    assembled
}

fn continues(segment: &Segment, record: &RawRecord, gap_tolerance: f64) -> bool {
    let rate_delta = (segment.sample_rate - record.sample_rate).abs();
    if rate_delta > RATE_TOLERANCE * segment.sample_rate {
        return false;
    }

    let Some(gap_us) = (record.start_time - segment.end_time()).num_microseconds() else {
        return false;
    };
    let gap_ms = gap_us as f64 / 1000.0;
    gap_ms.abs() <= gap_tolerance * segment.period_ms()
}

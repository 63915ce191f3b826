// Trace builder - Concatenates a channel's segments into one timestamped series
use crate::domain::channel::TimeWindow;
use crate::domain::waveform::{Segment, Trace, WaveformPoint};

/// Build the trace for one channel. Returns `None` when there is nothing to show.
///
/// Gaps between segments are left as larger time steps. Samples that would step
/// backwards in time (overlapping segments) are dropped, and so are samples outside
/// `window` when one is given.
pub fn build_trace(mut segments: Vec<Segment>, window: Option<&TimeWindow>) -> Option<Trace> {
    if segments.is_empty() {
        return None;
    }
    segments.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    let channel_id = segments[0].channel_id.clone();
    let segment_count = segments.len();
    let capacity = segments.iter().map(Segment::len).sum();
    let mut points: Vec<WaveformPoint> = Vec::with_capacity(capacity);
    let mut dropped_overlap = 0usize;

    for segment in &segments {
        let start_ms = segment.start_ms();
        let period_ms = segment.period_ms();
        for (i, value) in segment.samples.iter().enumerate() {
            let time_ms = start_ms + i as f64 * period_ms;
            if window.is_some_and(|w| !w.contains_ms(time_ms)) {
                continue;
            }
            if points.last().is_some_and(|last| time_ms < last.time_ms) {
                dropped_overlap += 1;
                continue;
            }
            points.push(WaveformPoint::new(time_ms, *value));
        }
    }

    if dropped_overlap > 0 {
        tracing::debug!(
            "Dropped {} overlapping samples while building {}",
            dropped_overlap,
            channel_id
        );
    }
    if points.is_empty() {
        return None;
    }

    Some(Trace {
        channel_id,
        points,
        segment_count,
    })
}

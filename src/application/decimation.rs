// Decimation engine - Min/max windowed reduction for display
use crate::domain::waveform::WaveformPoint;
use std::cmp::Ordering;

/// Reduce `points` to at most `2 * target_bins` points, keeping each bin's envelope.
///
/// Traces already within budget come back unchanged. Otherwise the points are cut into
/// `target_bins` bins of `len / target_bins` points (the last bin takes the remainder)
/// and each bin contributes its minimum and maximum in index order. Ties go to the
/// earliest sample; a bin whose minimum and maximum are the same sample yields one point.
/// Non-finite values never win a bin, and a bin holding nothing else yields no point.
pub fn decimate(points: Vec<WaveformPoint>, target_bins: usize) -> Vec<WaveformPoint> {
    let target_bins = target_bins.max(1);
    if points.len() <= target_bins.saturating_mul(2) {
        return points;
    }

    let total = points.len();
    let bin_size = total / target_bins;
    let mut decimated = Vec::with_capacity(2 * target_bins);

    for bin in 0..target_bins {
        let start = bin * bin_size;
        let end = if bin + 1 == target_bins {
            total
        } else {
            start + bin_size
        };
        let chunk = &points[start..end];
        let Some((min_idx, max_idx)) = extrema(chunk) else {
            continue;
        };

        match min_idx.cmp(&max_idx) {
            Ordering::Less => {
                decimated.push(chunk[min_idx]);
                decimated.push(chunk[max_idx]);
            }
            Ordering::Greater => {
                decimated.push(chunk[max_idx]);
                decimated.push(chunk[min_idx]);
            }
            Ordering::Equal => decimated.push(chunk[min_idx]),
        }
    }

    tracing::debug!(
        "Decimated {} points into {} ({} bins of {})",
        total,
        decimated.len(),
        target_bins,
        bin_size
    );
    decimated
}

/// Indices of the first finite minimum and first finite maximum.
fn extrema(chunk: &[WaveformPoint]) -> Option<(usize, usize)> {
    let mut found: Option<(usize, usize)> = None;
    for (i, point) in chunk.iter().enumerate() {
        if !point.value.is_finite() {
            continue;
        }
        found = Some(match found {
            None => (i, i),
            Some((min_idx, max_idx)) => (
                if point.value < chunk[min_idx].value { i } else { min_idx },
                if point.value > chunk[max_idx].value { i } else { max_idx },
            ),
        });
    }
    found
}

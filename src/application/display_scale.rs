// Display scaler - Demeaning and a spike-resistant value range
use crate::domain::waveform::WaveformPoint;
use crate::infrastructure::config::PipelineSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayScale {
    /// Copy of the input with the mean removed.
    pub points: Vec<WaveformPoint>,
    pub mean: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Demean `points` and suggest a value-axis range.
///
/// The range spans the low/high nearest-rank percentiles of the demeaned values
/// (index `floor(len * p)`, no interpolation), padded by `padding_fraction` of the span on
/// each side. A flat signal is padded by `min_padding` so the axis never collapses.
/// Values beyond the range are expected; the renderer may clip them.
/// Non-finite samples are left out of the result.
pub fn scale_for_display(points: &[WaveformPoint], settings: &PipelineSettings) -> Option<DisplayScale> {
    let finite: Vec<WaveformPoint> = points
        .iter()
        .copied()
        .filter(|p| p.value.is_finite())
        .collect();
    if finite.is_empty() {
        return None;
    }
    if finite.len() < points.len() {
        tracing::debug!("Left out {} non-finite samples", points.len() - finite.len());
    }

    let mean = finite.iter().map(|p| p.value).sum::<f64>() / finite.len() as f64;
    let demeaned: Vec<WaveformPoint> = finite
        .iter()
        .map(|p| WaveformPoint::new(p.time_ms, p.value - mean))
        .collect();

    let mut sorted: Vec<f64> = demeaned.iter().map(|p| p.value).collect();
    sorted.sort_by(f64::total_cmp);

    let low = sorted[percentile_index(sorted.len(), settings.percentile_low)];
    let high = sorted[percentile_index(sorted.len(), settings.percentile_high)];
    let span = high - low;
    let padding = if span > 0.0 {
        span * settings.padding_fraction
    } else {
        settings.min_padding
    };

    Some(DisplayScale {
        points: demeaned,
        mean,
        y_min: low - padding,
        y_max: high + padding,
    })
}

fn percentile_index(len: usize, percentile: f64) -> usize {
    let index = (len as f64 * percentile / 100.0).floor() as usize;
    index.min(len - 1)
}

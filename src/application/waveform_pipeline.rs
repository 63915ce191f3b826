// Waveform pipeline - Fetch, decode and prepare one channel for display
use crate::application::decimation::decimate;
use crate::application::display_scale::scale_for_display;
use crate::application::pipeline_error::PipelineError;
use crate::application::segment_assembler::assemble_segments;
use crate::application::trace_builder::build_trace;
use crate::application::waveform_source::{WaveformRequest, WaveformSource};
use crate::domain::channel::TimeWindow;
use crate::domain::waveform::{DecimatedSeries, DisplayedSeries, WaveformOutcome};
use crate::infrastructure::config::PipelineSettings;
use crate::infrastructure::miniseed::decode_records;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Latest accepted state of a view. `run` identifies the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Fetching { run: u64 },
    Decoding { run: u64 },
    Ready { run: u64, outcome: WaveformOutcome },
    Failed { run: u64, error: PipelineError },
}

impl PipelineState {
    pub fn run(&self) -> Option<u64> {
        match self {
            PipelineState::Idle => None,
            PipelineState::Fetching { run }
            | PipelineState::Decoding { run }
            | PipelineState::Ready { run, .. }
            | PipelineState::Failed { run, .. } => Some(*run),
        }
    }

    /// A run is fetching or decoding.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PipelineState::Fetching { .. } | PipelineState::Decoding { .. }
        )
    }
}

/// Cooperative cancellation flag shared between a run and whoever supersedes it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::DecodeAborted)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The run's final state was published.
    Completed(PipelineState),
    /// A newer request or an abort replaced the run; its result was dropped.
    Superseded,
}

/// Decode `buffer` and prepare `channel_id` for display. CPU bound.
///
/// The token is checked between stages, never inside one.
pub fn process_buffer(
    buffer: &Bytes,
    channel_id: &str,
    window: Option<&TimeWindow>,
    settings: &PipelineSettings,
    token: &CancelToken,
) -> Result<WaveformOutcome, PipelineError> {
    let report = decode_records(buffer);
    if report.is_undecodable() {
        return Err(PipelineError::Undecodable {
            rejected: report.rejected.len(),
        });
    }
    let rejected_records = report.rejected.len();
    token.checkpoint()?;

    let assembled = assemble_segments(report.records, settings.gap_tolerance);
    token.checkpoint()?;

    if assembled.segments(channel_id).is_empty() && !assembled.is_empty() {
        tracing::debug!(
            "No segments for {}; buffer holds {:?}",
            channel_id,
            assembled.channels().collect::<Vec<_>>()
        );
    }
    let Some(trace) = build_trace(assembled.into_channel(channel_id), window) else {
        return Ok(WaveformOutcome::NoData);
    };
    let sample_count = trace.points.len();
    let segment_count = trace.segment_count;
    token.checkpoint()?;

    let decimated = decimate(trace.points, settings.target_bins);
    token.checkpoint()?;

    let Some(scale) = scale_for_display(&decimated, settings) else {
        return Ok(WaveformOutcome::NoData);
    };

    Ok(WaveformOutcome::Series(DisplayedSeries {
        channel_id: trace.channel_id,
        series: DecimatedSeries {
            points: scale.points,
            y_min: scale.y_min,
            y_max: scale.y_max,
        },
        mean: scale.mean,
        sample_count,
        segment_count,
        rejected_records,
    }))
}

/// Run the decode stages on a blocking thread.
pub async fn process_detached(
    buffer: Bytes,
    channel_id: String,
    window: Option<TimeWindow>,
    settings: PipelineSettings,
    token: CancelToken,
) -> Result<WaveformOutcome, PipelineError> {
    tokio::task::spawn_blocking(move || {
        process_buffer(&buffer, &channel_id, window.as_ref(), &settings, &token)
    })
    .await
    .unwrap_or_else(|e| Err(PipelineError::DecodeTaskFailed(e.to_string())))
}

/// One visualization instance: at most one active run, newest request wins.
pub struct WaveformView {
    source: Arc<dyn WaveformSource>,
    settings: PipelineSettings,
    epoch: AtomicU64,
    active: Mutex<CancelToken>,
    state: watch::Sender<PipelineState>,
}

impl WaveformView {
    pub fn new(source: Arc<dyn WaveformSource>, settings: PipelineSettings) -> Self {
        let (state, _rx) = watch::channel(PipelineState::Idle);
        Self {
            source,
            settings,
            epoch: AtomicU64::new(0),
            active: Mutex::new(CancelToken::new()),
            state,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub async fn request(&self, request: WaveformRequest) -> RunOutcome {
        self.request_with(request, self.settings).await
    }

    /// Start a run, cancelling whatever run is in flight.
    pub async fn request_with(
        &self,
        request: WaveformRequest,
        settings: PipelineSettings,
    ) -> RunOutcome {
        let (run, token) = self.begin_run();
        tracing::debug!("Run {} fetching {} from {}", run, request.channel, request.source);

        let fetched = tokio::select! {
            _ = token.cancelled() => return self.discard(run),
            fetched = self.source.fetch(&request) => fetched,
        };

        let buffer = match fetched {
            Ok(Some(buffer)) => buffer,
            Ok(None) => Bytes::new(),
            Err(e) => {
                tracing::error!("Run {} fetch failed for {}: {:#}", run, request.channel, e);
                let error = PipelineError::FetchFailed(format!("{:#}", e));
                return self.finish(run, PipelineState::Failed { run, error });
            }
        };

        if !self.publish(run, PipelineState::Decoding { run }) {
            return self.discard(run);
        }
        tracing::debug!("Run {} decoding {} bytes", run, buffer.len());

        let decoded = process_detached(
            buffer,
            request.channel.id(),
            Some(request.window),
            settings,
            token,
        )
        .await;

        let state = match decoded {
            Ok(outcome) => PipelineState::Ready { run, outcome },
            Err(PipelineError::DecodeAborted) => return self.discard(run),
            Err(error) => PipelineState::Failed { run, error },
        };
        self.finish(run, state)
    }

    /// Cancel the in-flight run, if any, and return to `Idle`.
    pub fn abort(&self) -> bool {
        self.state.send_if_modified(|current| {
            if !current.is_active() {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::AcqRel);
            self.lock_active().cancel();
            *current = PipelineState::Idle;
            true
        })
    }

    fn begin_run(&self) -> (u64, CancelToken) {
        let token = CancelToken::new();
        let mut run = 0;
        self.state.send_modify(|current| {
            run = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            let previous = std::mem::replace(&mut *self.lock_active(), token.clone());
            previous.cancel();
            *current = PipelineState::Fetching { run };
        });
        (run, token)
    }

    /// Store `state` only if `run` is still the newest run. The epoch is compared
    /// under the slot's write lock, so a stale run can never overwrite a newer one.
    fn publish(&self, run: u64, state: PipelineState) -> bool {
        self.state.send_if_modified(|current| {
            if self.epoch.load(Ordering::Acquire) != run {
                return false;
            }
            *current = state;
            true
        })
    }

    fn finish(&self, run: u64, state: PipelineState) -> RunOutcome {
        if self.publish(run, state.clone()) {
            match &state {
                PipelineState::Ready { outcome: WaveformOutcome::Series(series), .. } => {
                    tracing::info!(
                        "Run {} ready: {} samples of {} shown as {} points",
                        run,
                        series.sample_count,
                        series.channel_id,
                        series.series.points.len()
                    );
                }
                PipelineState::Ready { .. } => tracing::info!("Run {} ready: no data", run),
                _ => tracing::info!("Run {} finished: {:?}", run, state),
            }
            RunOutcome::Completed(state)
        } else {
            self.discard(run)
        }
    }

    fn discard(&self, run: u64) -> RunOutcome {
        tracing::debug!("Run {} superseded, result discarded", run);
        RunOutcome::Superseded
    }

    fn lock_active(&self) -> MutexGuard<'_, CancelToken> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

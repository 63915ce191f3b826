// HTTP request handlers
use crate::application::pipeline_error::PipelineError;
use crate::application::waveform_pipeline::{
    process_detached, CancelToken, PipelineState, RunOutcome,
};
use crate::application::waveform_source::WaveformRequest;
use crate::domain::channel::{ChannelKey, TimeWindow};
use crate::infrastructure::config::PipelineSettings;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct WaveformQuery {
    pub source: Option<String>,
    pub net: String,
    pub sta: String,
    #[serde(default)]
    pub loc: String,
    pub cha: String,
    pub starttime: String,
    pub endtime: String,
    pub bins: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DecodeQuery {
    /// Composite `NET.STA.LOC.CHA`, instead of the separate fields.
    pub id: Option<String>,
    pub net: Option<String>,
    pub sta: Option<String>,
    #[serde(default)]
    pub loc: String,
    pub cha: Option<String>,
    pub starttime: Option<String>,
    pub endtime: Option<String>,
    pub bins: Option<usize>,
}

impl WaveformQuery {
    fn channel(&self) -> Option<ChannelKey> {
        ChannelKey::try_new(&self.net, &self.sta, &self.loc, &self.cha)
    }
}

impl DecodeQuery {
    fn channel(&self) -> Option<ChannelKey> {
        if let Some(id) = &self.id {
            return ChannelKey::parse(id);
        }
        match (&self.net, &self.sta, &self.cha) {
            (Some(net), Some(sta), Some(cha)) => ChannelKey::try_new(net, sta, &self.loc, cha),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct DeleteBody {
    removed: bool,
    aborted: bool,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List configured FDSN data centres
pub async fn list_sources(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    respond(&state.sources, StatusCode::OK, accepts_brotli(&headers)).await
}

/// Fetch, decode and prepare one channel on a view
pub async fn fetch_waveform(
    Path(view_id): Path<String>,
    Query(query): Query<WaveformQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = accepts_brotli(&headers);

    let Some(window) = TimeWindow::parse(&query.starttime, &query.endtime) else {
        return bad_request("starttime and endtime must be valid timestamps with start < end", compress).await;
    };
    let Some(source) = query
        .source
        .as_deref()
        .or_else(|| state.default_source())
        .map(str::to_string)
    else {
        return bad_request("no data source configured", compress).await;
    };
    let Some(channel) = query.channel() else {
        return bad_request("net, sta and cha must not be blank", compress).await;
    };
    let settings = bins_override(*state.views.settings(), query.bins);

    let view = state.views.get_or_create(&view_id);
    let request = WaveformRequest {
        source,
        channel,
        window,
    };

    match view.request_with(request, settings).await {
        RunOutcome::Completed(run_state) => {
            let status = match &run_state {
                PipelineState::Failed { error, .. } => error_status(error),
                _ => StatusCode::OK,
            };
            respond(&run_state, status, compress).await
        }
        RunOutcome::Superseded => {
            let body = ErrorBody {
                error: "superseded by a newer request on this view".to_string(),
            };
            respond(&body, StatusCode::CONFLICT, compress).await
        }
    }
}

/// Latest accepted state of a view
pub async fn view_state(
    Path(view_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let snapshot = state
        .views
        .get(&view_id)
        .map(|view| view.state())
        .unwrap_or(PipelineState::Idle);
    respond(&snapshot, StatusCode::OK, accepts_brotli(&headers)).await
}

/// Abort the in-flight run of a view and forget the view
pub async fn abort_view(
    Path(view_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let removed = state.views.remove(&view_id);
    let aborted = removed.as_ref().is_some_and(|view| view.abort());
    if removed.is_some() {
        tracing::info!("Removed view {} (aborted run: {})", view_id, aborted);
    }
    let body = DeleteBody {
        removed: removed.is_some(),
        aborted,
    };
    respond(&body, StatusCode::OK, accepts_brotli(&headers)).await
}

/// Run the decode stages on an uploaded miniSEED buffer
pub async fn decode_upload(
    Query(query): Query<DecodeQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let compress = accepts_brotli(&headers);

    let window = match (query.starttime.as_deref(), query.endtime.as_deref()) {
        (None, None) => None,
        (Some(start), Some(end)) => match TimeWindow::parse(start, end) {
            Some(window) => Some(window),
            None => {
                return bad_request("starttime and endtime must be valid timestamps with start < end", compress).await;
            }
        },
        _ => return bad_request("starttime and endtime must be given together", compress).await,
    };
    let Some(channel) = query.channel() else {
        return bad_request("give either id or net, sta and cha", compress).await;
    };
    let settings = bins_override(*state.views.settings(), query.bins);

    tracing::info!("Decoding uploaded buffer of {} bytes for {}", body.len(), channel);
    match process_detached(body, channel.id(), window, settings, CancelToken::new()).await {
        Ok(outcome) => respond(&outcome, StatusCode::OK, compress).await,
        Err(error) => {
            if error.is_user_visible() {
                tracing::warn!("Upload for {} failed: {}", channel, error);
            }
            let body = ErrorBody {
                error: error.to_string(),
            };
            respond(&body, error_status(&error), compress).await
        }
    }
}

fn bins_override(settings: PipelineSettings, bins: Option<usize>) -> PipelineSettings {
    match bins {
        Some(bins) => settings.with_target_bins(bins),
        None => settings,
    }
}

fn error_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::FetchFailed(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Undecodable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::DecodeAborted => StatusCode::CONFLICT,
        PipelineError::DecodeTaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn bad_request(message: &str, compress: bool) -> Response {
    let body = ErrorBody {
        error: message.to_string(),
    };
    respond(&body, StatusCode::BAD_REQUEST, compress).await
}

async fn respond<T: Serialize>(data: &T, status: StatusCode, compress: bool) -> Response {
    match json_response(data, status, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::MAX_TARGET_BINS;

    #[test]
    fn test_error_status() {
        assert_eq!(
            error_status(&PipelineError::FetchFailed("timeout".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&PipelineError::Undecodable { rejected: 1 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    fn decode_query(id: Option<&str>, net: Option<&str>, loc: &str) -> DecodeQuery {
        DecodeQuery {
            id: id.map(str::to_string),
            net: net.map(str::to_string),
            sta: Some("ANMO".to_string()),
            loc: loc.to_string(),
            cha: Some("BHZ".to_string()),
            starttime: None,
            endtime: None,
            bins: None,
        }
    }

    #[test]
    fn test_decode_query_channel() {
        let key = decode_query(None, Some("IU"), "--").channel().unwrap();
        assert_eq!(key.id(), "IU.ANMO..BHZ");

        let key = decode_query(Some("GE.APE.00.HHZ"), None, "").channel().unwrap();
        assert_eq!(key.id(), "GE.APE.00.HHZ");

        assert!(decode_query(None, None, "").channel().is_none());
        assert!(decode_query(Some("GE.APE"), Some("IU"), "").channel().is_none());
    }

    #[test]
    fn test_bins_override() {
        let settings = PipelineSettings::default();
        assert_eq!(bins_override(settings, None).target_bins, 1000);
        assert_eq!(bins_override(settings, Some(64)).target_bins, 64);
        assert_eq!(bins_override(settings, Some(0)).target_bins, 1);
        assert_eq!(bins_override(settings, Some(usize::MAX)).target_bins, MAX_TARGET_BINS);
        assert_eq!(bins_override(settings, Some(1 << 63)).target_bins, MAX_TARGET_BINS);
    }

    fn waveform_query(net: &str, sta: &str, cha: &str) -> WaveformQuery {
        WaveformQuery {
            source: None,
            net: net.to_string(),
            sta: sta.to_string(),
            loc: String::new(),
            cha: cha.to_string(),
            starttime: "2024-01-01T00:00:00".to_string(),
            endtime: "2024-01-01T01:00:00".to_string(),
            bins: None,
        }
    }

    #[test]
    fn test_waveform_query_rejects_blank_codes() {
        assert_eq!(
            waveform_query("IU", "ANMO", "BHZ").channel().unwrap().id(),
            "IU.ANMO..BHZ"
        );
        assert!(waveform_query("", "ANMO", "BHZ").channel().is_none());
        assert!(waveform_query("IU", " ", "BHZ").channel().is_none());
        assert!(waveform_query("IU", "ANMO", "").channel().is_none());
    }
}

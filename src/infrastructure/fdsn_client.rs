// FDSN dataselect client implementation
use crate::application::waveform_source::{WaveformRequest, WaveformSource};
use crate::domain::channel::fdsn_timestamp;
use crate::infrastructure::config::SourceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;

const DATASELECT_PATH: &str = "/fdsnws/dataselect/1/query";

#[derive(Debug, Clone)]
pub struct FdsnDataselectClient {
    client: reqwest::Client,
    sources: Vec<SourceConfig>,
}

impl FdsnDataselectClient {
    pub fn new(sources: Vec<SourceConfig>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, sources })
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    fn base_url(&self, source: &str) -> Result<&str> {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(source))
            .map(|s| s.base_url.trim_end_matches('/'))
            .with_context(|| format!("Unknown data source '{}'", source))
    }

    fn build_query_url(&self, request: &WaveformRequest) -> Result<String> {
        let base = self.base_url(&request.source)?;
        let channel = &request.channel;

        let mut params = vec![
            ("net", channel.network.as_str()),
            ("sta", channel.station.as_str()),
        ];
        if !channel.location.is_empty() {
            params.push(("loc", channel.location.as_str()));
        }
        params.push(("cha", channel.channel.as_str()));

        let start = fdsn_timestamp(&request.window.start);
        let end = fdsn_timestamp(&request.window.end);
        let query = params
            .into_iter()
            .chain([("starttime", start.as_str()), ("endtime", end.as_str())])
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{}{}?{}", base, DATASELECT_PATH, query))
    }
}

#[async_trait]
impl WaveformSource for FdsnDataselectClient {
    async fn fetch(&self, request: &WaveformRequest) -> Result<Option<Bytes>> {
        let url = self.build_query_url(request)?;
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", request.source))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            tracing::info!("{} has no data for {}", request.source, request.channel);
            return Ok(None);
        }
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "{} dataselect failed with status {}: {}",
                request.source,
                status,
                body.trim()
            );
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read dataselect response")?;
        tracing::info!(
            "Fetched {} bytes for {} from {}",
            bytes.len(),
            request.channel,
            request.source
        );
        Ok(Some(bytes))
    }
}

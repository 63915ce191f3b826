// Fetch collaborator for raw waveform buffers
use crate::domain::channel::{ChannelKey, TimeWindow};
use async_trait::async_trait;
use bytes::Bytes;

/// One fetch: which data centre, which channel, which window.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformRequest {
    pub source: String,
    pub channel: ChannelKey,
    pub window: TimeWindow,
}

#[async_trait]
pub trait WaveformSource: Send + Sync {
    /// Fetch the raw miniSEED buffer. `Ok(None)` means the source has no data for the request.
    async fn fetch(&self, request: &WaveformRequest) -> anyhow::Result<Option<Bytes>>;
}

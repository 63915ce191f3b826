use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub fetch: FetchSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_address: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// An FDSN data centre.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub description: String,
}

/// Upper bound on display bins, whether configured or requested per call.
pub const MAX_TARGET_BINS: usize = 100_000;

/// Tunables for decimation, gap detection and display scaling.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Number of min/max bins; up to twice this many points are displayed.
    pub target_bins: usize,
    /// Fraction of a sample period tolerated before records are split into segments.
    pub gap_tolerance: f64,
    pub percentile_low: f64,
    pub percentile_high: f64,
    pub padding_fraction: f64,
    pub min_padding: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_bins: 1000,
            gap_tolerance: 0.5,
            percentile_low: 1.0,
            percentile_high: 99.0,
            padding_fraction: 0.1,
            min_padding: 1.0,
        }
    }
}

impl PipelineSettings {
    pub fn with_target_bins(self, target_bins: usize) -> Self {
        Self {
            target_bins: target_bins.clamp(1, MAX_TARGET_BINS),
            ..self
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_TARGET_BINS).contains(&self.target_bins),
            "pipeline.target_bins must be between 1 and {}",
            MAX_TARGET_BINS
        );
        anyhow::ensure!(
            self.gap_tolerance >= 0.0,
            "pipeline.gap_tolerance must not be negative"
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&self.percentile_low)
                && (0.0..=100.0).contains(&self.percentile_high)
                && self.percentile_low <= self.percentile_high,
            "pipeline percentiles must satisfy 0 <= low <= high <= 100"
        );
        anyhow::ensure!(
            self.padding_fraction >= 0.0 && self.min_padding > 0.0,
            "pipeline padding must be non-negative with a positive minimum"
        );
        Ok(())
    }
}

pub fn load_service_config() -> anyhow::Result<ServiceConfig> {
    let defaults = PipelineSettings::default();
    let settings = config::Config::builder()
        .set_default("server.bind_address", "0.0.0.0:8080")?
        .set_default("fetch.timeout_secs", 60_u64)?
        .set_default("pipeline.target_bins", defaults.target_bins as u64)?
        .set_default("pipeline.gap_tolerance", defaults.gap_tolerance)?
        .set_default("pipeline.percentile_low", defaults.percentile_low)?
        .set_default("pipeline.percentile_high", defaults.percentile_high)?
        .set_default("pipeline.padding_fraction", defaults.padding_fraction)?
        .set_default("pipeline.min_padding", defaults.min_padding)?
        .add_source(config::File::with_name("config/waveforms").required(false))
        .add_source(
            config::Environment::with_prefix("WAVEFORM")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut service: ServiceConfig = settings.try_deserialize()?;
    if service.fetch.sources.is_empty() {
        service.fetch.sources = default_sources();
    }
    service.pipeline.validate()?;
    Ok(service)
}

pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "IRIS".to_string(),
            base_url: "https://service.iris.edu".to_string(),
            description: "IRIS Data Management Center".to_string(),
        },
        SourceConfig {
            name: "ORFEUS".to_string(),
            base_url: "https://www.orfeus-eu.org".to_string(),
            description: "ORFEUS Data Center (Europe)".to_string(),
        },
    ]
}

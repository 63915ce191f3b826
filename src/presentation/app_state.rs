// Application state for HTTP handlers
use crate::application::view_registry::WaveformViews;
use crate::infrastructure::config::SourceConfig;

#[derive(Clone)]
pub struct AppState {
    pub views: WaveformViews,
    pub sources: Vec<SourceConfig>,
}

impl AppState {
    /// Source used when a request names none.
    pub fn default_source(&self) -> Option<&str> {
        self.sources.first().map(|s| s.name.as_str())
    }
}

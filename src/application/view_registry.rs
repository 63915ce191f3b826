// View registry - One pipeline per visualization instance
use crate::application::waveform_pipeline::WaveformView;
use crate::application::waveform_source::WaveformSource;
use crate::infrastructure::config::PipelineSettings;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct WaveformViews {
    source: Arc<dyn WaveformSource>,
    settings: PipelineSettings,
    views: Arc<Mutex<HashMap<String, Arc<WaveformView>>>>,
}

impl WaveformViews {
    pub fn new(source: Arc<dyn WaveformSource>, settings: PipelineSettings) -> Self {
        Self {
            source,
            settings,
            views: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn get(&self, view_id: &str) -> Option<Arc<WaveformView>> {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(view_id)
            .cloned()
    }

    /// Forget a view. A run still in flight keeps its own handle.
    pub fn remove(&self, view_id: &str) -> Option<Arc<WaveformView>> {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(view_id)
    }

    pub fn get_or_create(&self, view_id: &str) -> Arc<WaveformView> {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        views
            .entry(view_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating view {}", view_id);
                Arc::new(WaveformView::new(self.source.clone(), self.settings))
            })
            .clone()
    }
}

// Run-level failures of the waveform pipeline
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    /// The fetch collaborator reported an error; no retry happens here.
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    /// Records were present but none of them could be decoded.
    #[error("all {rejected} records in the buffer were unreadable")]
    Undecodable { rejected: usize },
    /// A newer request or an explicit abort cancelled the run.
    #[error("decode aborted")]
    DecodeAborted,
    /// The blocking decode task panicked or was torn down.
    #[error("decode task failed: {0}")]
    DecodeTaskFailed(String),
}

impl PipelineError {
    /// Whether the failure should be shown to the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, PipelineError::DecodeAborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility() {
        assert!(PipelineError::FetchFailed("timeout".to_string()).is_user_visible());
        assert!(PipelineError::Undecodable { rejected: 3 }.is_user_visible());
        assert!(!PipelineError::DecodeAborted.is_user_visible());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(PipelineError::Undecodable { rejected: 2 }).unwrap();
        assert_eq!(json["kind"], "undecodable");
        assert_eq!(json["detail"]["rejected"], 2);
    }
}

// Domain layer - Waveform data models
pub mod channel;
pub mod waveform;

// Application layer - Waveform pipeline stages and orchestration
pub mod decimation;
pub mod display_scale;
pub mod pipeline_error;
pub mod segment_assembler;
pub mod trace_builder;
pub mod view_registry;
pub mod waveform_pipeline;
pub mod waveform_source;

//! Dwell-timeline annotation.
//!
//! Synchronizes a video's frame timeline with a stream of per-frame object
//! detections, classifies each frame into activity labels, accumulates the
//! time spent in each label, and renders a deterministic overlay (boxes,
//! captions, dwell panel, frame counter) onto every frame.
//!
//! # Module Structure
//!
//! - `rate`: playback-frame to record-index mapping
//! - `records`: pre-computed prediction stores (CSV / JSON Lines / memory)
//! - `classify`: keyword label groups and colors
//! - `dwell`: per-label dwell accumulation, frame clocks, run reports
//! - `render`: overlay renderer
//! - `ingest` / `output`: frame sources and sinks
//! - `pipeline`: batch (pull) and live (push) orchestration
//! - `extract`: frame subsampling utilities

pub mod classify;
pub mod config;
pub mod detect;
pub mod dwell;
pub mod error;
pub mod extract;
pub mod frame;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod rate;
pub mod records;
pub mod render;
pub mod ui;

pub use classify::{default_labels, ActivityLabel, LabelSpec, StateClassifier};
pub use detect::{BoxCorners, Detection};
pub use dwell::{DwellReport, DwellStats, FrameClock, LabelReport};
pub use error::{RecordError, SourceError};
pub use extract::{extract_frames, ExtractMode, FrameSelector};
pub use frame::{frame_digest, frame_digest_hex, Frame};
pub use ingest::{FrameSource, SequenceSource, SyntheticSource, VideoConfig, VideoSource};
pub use output::{FrameSink, ImageFormat, MemorySink, NullSink, SequenceSink};
pub use pipeline::{
    run_batch, BatchSource, FrameInput, FrameOutcome, FramePipeline, LiveConfig, LiveSession,
    PipelineController, PredictionSource, StopHandle,
};
pub use rate::RateMapper;
pub use records::{PredictionRecord, RecordStore};
pub use render::{OverlayRenderer, OverlayStyle, RenderSummary};

//! Frame pipeline orchestration.
//!
//! Both control paths feed the same [`FramePipeline`]:
//! - pull (batch): [`BatchSource`] walks a video and maps each frame onto a
//!   record store with [`RateMapper`](crate::rate::RateMapper);
//! - push (live): a [`LiveProducer`] drives [`PipelineController`], which
//!   invokes one serialized callback per frame.
//!
//! Per frame the pipeline classifies, accumulates dwell time, renders the
//! overlay, logs a summary line and hands the frame to the sink. The
//! [`DwellStats`] it owns live exactly as long as the run.

pub mod batch;
pub mod live;
mod source;

pub use batch::{run_batch, BatchItem, BatchOptions, BatchSource};
pub use live::{
    open_live_producer, FrameCallback, LiveConfig, LiveFrame, LiveProducer, LiveSession,
    PipelineController, ReplayProducer, StopHandle, SyntheticProducer,
};
pub use source::PredictionSource;

use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::classify::ActivityLabel;
use crate::detect::Detection;
use crate::dwell::{DwellReport, DwellStats};
use crate::frame::{frame_digest_hex, Frame};
use crate::output::FrameSink;
use crate::render::{OverlayRenderer, RenderSummary};

/// One frame ready for processing, with the detections resolved for it.
#[derive(Clone, Debug)]
pub struct FrameInput {
    pub frame: Frame,
    pub detections: Vec<Detection>,
    /// Record row the detections came from, if any.
    pub record_index: Option<usize>,
    /// The mapped record existed but its payload could not be parsed.
    pub parse_failed: bool,
}

impl FrameInput {
    /// Input whose detections do not come from a record store.
    pub fn new(frame: Frame, detections: Vec<Detection>) -> Self {
        Self {
            frame,
            detections,
            record_index: None,
            parse_failed: false,
        }
    }

    /// Input resolved from record `row`.
    pub fn from_record(frame: Frame, detections: Vec<Detection>, row: usize) -> Self {
        Self {
            record_index: Some(row),
            ..Self::new(frame, detections)
        }
    }
}

/// What happened to one frame.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    /// The annotated frame.
    pub frame: Frame,
    pub labels: BTreeSet<ActivityLabel>,
    pub render: RenderSummary,
    /// Playback time of the frame in seconds.
    pub playback_secs: f64,
    pub log_line: String,
}

pub struct FramePipeline<S: FrameSink> {
    renderer: OverlayRenderer,
    stats: DwellStats,
    sink: S,
    frame_rate: f64,
    log_level: log::Level,
    frames_processed: u64,
    frames_with_records: u64,
    parse_errors: u64,
    finished: bool,
}

impl<S: FrameSink> FramePipeline<S> {
    /// `frame_rate` is the native playback rate of the frames being fed in.
    pub fn new(renderer: OverlayRenderer, frame_rate: f64, sink: S) -> Self {
        let stats = DwellStats::new(renderer.classifier());
        Self {
            renderer,
            stats,
            sink,
            frame_rate,
            log_level: log::Level::Debug,
            frames_processed: 0,
            frames_with_records: 0,
            parse_errors: 0,
            finished: false,
        }
    }

    /// Level for the per-frame summary line.
    pub fn with_log_level(mut self, level: log::Level) -> Self {
        self.log_level = level;
        self
    }

    pub fn stats(&self) -> &DwellStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Classify, accumulate, render and write one frame. Must be called once
    /// per frame; `duration_secs` is the time the frame represents.
    pub fn process(&mut self, input: FrameInput, duration_secs: f64) -> Result<FrameOutcome> {
        let FrameInput {
            mut frame,
            detections,
            record_index,
            parse_failed,
        } = input;

        if record_index.is_some() && !parse_failed {
            self.frames_with_records += 1;
        }
        if parse_failed {
            self.parse_errors += 1;
        }

        let labels = self.renderer.classifier().classify(&detections);
        self.stats.accumulate(&labels, duration_secs);
        let render = self
            .renderer
            .render(&mut frame.image, &detections, &self.stats, frame.index);

        let playback_secs = frame.timestamp_secs(self.frame_rate);
        let log_line = format_frame_line(frame.index, playback_secs, &detections, &self.stats);
        log::log!(self.log_level, "{}", log_line);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("frame={} digest={}", frame.index + 1, frame_digest_hex(&frame.image));
        }

        self.sink.write_frame(&frame)?;
        self.frames_processed += 1;

        Ok(FrameOutcome {
            frame,
            labels,
            render,
            playback_secs,
            log_line,
        })
    }

    /// Flushes the sink and summarizes the run. Safe to call more than once.
    pub fn finish(&mut self) -> Result<DwellReport> {
        if !self.finished {
            self.sink.finish()?;
            self.finished = true;
        }
        Ok(self.report())
    }

    pub fn report(&self) -> DwellReport {
        let elapsed_seconds = if self.frame_rate > 0.0 {
            self.frames_processed as f64 / self.frame_rate
        } else {
            0.0
        };
        DwellReport {
            frames_processed: self.frames_processed,
            frames_with_records: self.frames_with_records,
            parse_errors: self.parse_errors,
            elapsed_seconds,
            labels: DwellReport::label_entries(&self.stats),
        }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// `frame=<n> t=<secs>s detections=[..] dwell=[..]`
pub fn format_frame_line(
    frame_index: u64,
    playback_secs: f64,
    detections: &[Detection],
    stats: &DwellStats,
) -> String {
    let mut line = format!("frame={} t={:.2}s detections=[", frame_index + 1, playback_secs);
    for (i, det) in detections.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{}:{:.2}", det.class, det.confidence);
    }
    line.push_str("] dwell=[");
    for (i, (label, secs)) in stats.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{}={:.2}s", label, secs);
    }
    line.push(']');
    line
}

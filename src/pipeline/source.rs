use anyhow::Result;

use super::batch::{run_batch, BatchSource};
use super::live::{LiveConfig, LiveProducer, LiveSession, PipelineController, StopHandle};
use super::{FrameOutcome, FramePipeline};
use crate::dwell::DwellReport;
use crate::error::SourceError;
use crate::ingest::FrameSource;
use crate::output::FrameSink;

/// Where frames and detections come from for a run. Both variants are
/// already open, so [`frame_rate`](Self::frame_rate) is the source's
/// native rate and can size the renderer and sink.
pub enum PredictionSource {
    /// Frames and detections are pushed by a producer thread.
    Push {
        producer: Box<dyn LiveProducer>,
        /// Duration credited to the first live frame is `1 / nominal_fps`.
        nominal_fps: f64,
    },
    /// Frames are pulled from a video and matched against stored records.
    Pull(BatchSource<Box<dyn FrameSource>>),
}

impl PredictionSource {
    /// Opens `producer` on the calling thread.
    pub fn live(
        mut producer: Box<dyn LiveProducer>,
        config: &LiveConfig,
    ) -> Result<Self, SourceError> {
        producer.open()?;
        log::info!(
            "live source {} opened at {:.2} fps (max {} fps)",
            config.reference,
            producer.frame_rate(),
            config.max_fps
        );
        Ok(PredictionSource::Push {
            producer,
            nominal_fps: config.nominal_fps(),
        })
    }

    pub fn batch(source: BatchSource<Box<dyn FrameSource>>) -> Self {
        PredictionSource::Pull(source)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, PredictionSource::Push { .. })
    }

    /// Native frame rate of the frames this source delivers.
    pub fn frame_rate(&self) -> f64 {
        match self {
            PredictionSource::Push { producer, .. } => producer.frame_rate(),
            PredictionSource::Pull(source) => source.frame_rate(),
        }
    }

    pub fn frame_count_hint(&self) -> Option<u64> {
        match self {
            PredictionSource::Push { .. } => None,
            PredictionSource::Pull(source) => source.frame_count_hint(),
        }
    }

    /// Runs to completion (end of input or `stop`) and returns the report
    /// together with the finalized sink. Live runs log each frame at info.
    pub fn run<S, F>(
        self,
        pipeline: FramePipeline<S>,
        stop: StopHandle,
        mut on_frame: F,
    ) -> Result<(DwellReport, S)>
    where
        S: FrameSink + Send + 'static,
        F: FnMut(&FrameOutcome, &StopHandle) + Send + 'static,
    {
        match self {
            PredictionSource::Pull(mut source) => {
                let mut pipeline = pipeline;
                let report = run_batch(&mut source, &mut pipeline, &stop, |outcome| {
                    on_frame(outcome, &stop)
                })?;
                Ok((report, pipeline.into_sink()))
            }
            PredictionSource::Push {
                producer,
                nominal_fps,
            } => {
                let pipeline = pipeline.with_log_level(log::Level::Info);
                let session = LiveSession::new(pipeline, nominal_fps).with_hook(on_frame);
                let controller = PipelineController::start_opened(producer, session, stop)?;
                let session = controller.join()?;
                let report = session.report();
                Ok((report, session.into_sink()))
            }
        }
    }
}

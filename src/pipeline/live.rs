//! Live (push) mode.
//!
//! A single producer thread acquires frames with their detections and invokes
//! one registered [`FrameCallback`] per frame, serially and in frame order.
//! Cancellation is cooperative: the stop flag is checked at the top of the
//! acquisition loop and again before each callback. Once the loop exits the
//! callback's `finish` runs on the producer thread, so output is finalized
//! before [`PipelineController::join`] returns.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::batch::BatchSource;
use super::{FrameInput, FrameOutcome, FramePipeline};
use crate::detect::Detection;
use crate::dwell::{DwellReport, FrameClock};
use crate::error::SourceError;
use crate::frame::Frame;
use crate::ingest::synthetic::STUB_SCHEME;
use crate::ingest::{FrameSource, SyntheticSource, VideoConfig, VideoSource};
use crate::output::FrameSink;
use crate::records::RecordStore;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

const DEFAULT_MAX_FPS: u32 = 30;

/// Connection settings for a live prediction source.
#[derive(Clone)]
pub struct LiveConfig {
    /// Device, file, or stream reference.
    pub reference: String,
    /// Upper bound on frames per second delivered to the callback. 0 = unpaced.
    pub max_fps: u32,
    /// Inference pipeline/workflow identifier.
    pub workflow_id: String,
    /// Access credential for the inference service. Never logged.
    pub api_key: Option<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            reference: "stub://live".to_string(),
            max_fps: DEFAULT_MAX_FPS,
            workflow_id: String::new(),
            api_key: None,
        }
    }
}

impl fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConfig")
            .field("reference", &self.reference)
            .field("max_fps", &self.max_fps)
            .field("workflow_id", &self.workflow_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl LiveConfig {
    /// Nominal rate used for the first frame's duration and for pacing.
    pub fn nominal_fps(&self) -> f64 {
        if self.max_fps == 0 {
            DEFAULT_MAX_FPS as f64
        } else {
            self.max_fps as f64
        }
    }
}

// ----------------------------------------------------------------------------
// Producer / callback contracts
// ----------------------------------------------------------------------------

/// One processed frame as delivered by a producer.
#[derive(Clone, Debug)]
pub struct LiveFrame {
    pub frame: Frame,
    pub detections: Vec<Detection>,
    /// Stored record the detections came from, for replaying producers.
    pub record_index: Option<usize>,
    /// The mapped record existed but could not be parsed.
    pub parse_failed: bool,
}

impl LiveFrame {
    /// Frame with freshly inferred detections and no backing record.
    pub fn new(frame: Frame, detections: Vec<Detection>) -> Self {
        Self {
            frame,
            detections,
            record_index: None,
            parse_failed: false,
        }
    }
}

impl From<FrameInput> for LiveFrame {
    fn from(input: FrameInput) -> Self {
        Self {
            frame: input.frame,
            detections: input.detections,
            record_index: input.record_index,
            parse_failed: input.parse_failed,
        }
    }
}

impl From<LiveFrame> for FrameInput {
    fn from(live: LiveFrame) -> Self {
        FrameInput {
            frame: live.frame,
            detections: live.detections,
            record_index: live.record_index,
            parse_failed: live.parse_failed,
        }
    }
}

/// Acquisition + inference side of live mode.
pub trait LiveProducer: Send {
    /// Connect to the source. Must fail fast rather than block.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Native frame rate of delivered frames. Valid once `open` succeeded.
    fn frame_rate(&self) -> f64;

    /// Next frame with detections; `None` at end of stream.
    fn next(&mut self) -> Result<Option<LiveFrame>>;
}

impl<P: LiveProducer + ?Sized> LiveProducer for Box<P> {
    fn open(&mut self) -> Result<(), SourceError> {
        (**self).open()
    }

    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn next(&mut self) -> Result<Option<LiveFrame>> {
        (**self).next()
    }
}

/// The single callback registered with a [`PipelineController`].
pub trait FrameCallback: Send {
    /// Called once per frame, never concurrently. `stop` may be used to end
    /// the run from inside the callback.
    fn on_frame(&mut self, frame: LiveFrame, stop: &StopHandle) -> Result<()>;

    /// Called once on the producer thread after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Cloneable stop request shared by the controller, callback and signal
/// handlers.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests termination. Idempotent and safe from any thread.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

pub struct PipelineController<C: FrameCallback + 'static> {
    stop: StopHandle,
    handle: Option<JoinHandle<Result<C>>>,
}

impl<C: FrameCallback + 'static> PipelineController<C> {
    /// Opens `producer` on the calling thread, then starts the producer
    /// thread and returns immediately.
    pub fn start<P>(producer: P, callback: C) -> Result<Self, SourceError>
    where
        P: LiveProducer + 'static,
    {
        Self::start_with(producer, callback, StopHandle::new())
    }

    /// Like [`start`](Self::start) with a caller-supplied stop handle, so a
    /// signal handler can be wired up before the first frame.
    pub fn start_with<P>(mut producer: P, callback: C, stop: StopHandle) -> Result<Self, SourceError>
    where
        P: LiveProducer + 'static,
    {
        producer.open()?;
        Self::start_opened(producer, callback, stop)
    }

    /// Starts the producer thread for a producer the caller already opened,
    /// e.g. to size the output from its native frame rate first.
    pub fn start_opened<P>(producer: P, callback: C, stop: StopHandle) -> Result<Self, SourceError>
    where
        P: LiveProducer + 'static,
    {
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("live-producer".to_string())
            .spawn(move || producer_loop(producer, callback, thread_stop))
            .map_err(|e| SourceError::open("live-producer", e))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Requests termination and waits for the producer thread. No callback
    /// starts after this returns. Callbacks stop the run through the
    /// [`StopHandle`] they are handed instead.
    pub fn stop(&mut self) -> Result<()> {
        self.stop.stop();
        self.wait().map(|_| ())
    }

    /// Waits for the run to end and returns the callback.
    pub fn join(mut self) -> Result<C> {
        self.wait()?
            .ok_or_else(|| anyhow!("live pipeline already joined"))
    }

    fn wait(&mut self) -> Result<Option<C>> {
        let Some(handle) = self.handle.take() else {
            return Ok(None);
        };
        match handle.join() {
            Ok(result) => result.map(Some),
            Err(_) => Err(anyhow!("live producer thread panicked")),
        }
    }
}

impl<C: FrameCallback + 'static> Drop for PipelineController<C> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop() {
                log::error!("live pipeline shutdown failed: {:#}", e);
            }
        }
    }
}

fn producer_loop<P, C>(mut producer: P, mut callback: C, stop: StopHandle) -> Result<C>
where
    P: LiveProducer,
    C: FrameCallback,
{
    let mut failure = None;
    while !stop.is_stopped() {
        let frame = match producer.next() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("live source reached end of stream");
                break;
            }
            Err(e) => {
                log::error!("live source failed: {:#}", e);
                failure = Some(e);
                break;
            }
        };
        if stop.is_stopped() {
            break;
        }
        if let Err(e) = callback.on_frame(frame, &stop) {
            log::error!("frame callback failed: {:#}", e);
            failure = Some(e);
            stop.stop();
            break;
        }
    }

    let finished = callback.finish();
    if let Some(e) = failure {
        return Err(e);
    }
    finished?;
    Ok(callback)
}

// ----------------------------------------------------------------------------
// Session: the shared frame pipeline as a live callback
// ----------------------------------------------------------------------------

type FrameHook = Box<dyn FnMut(&FrameOutcome, &StopHandle) + Send>;

/// Feeds live frames through a [`FramePipeline`] with wall-clock durations.
pub struct LiveSession<S: FrameSink + Send> {
    pipeline: FramePipeline<S>,
    clock: FrameClock,
    hook: Option<FrameHook>,
    report: Option<DwellReport>,
}

impl<S: FrameSink + Send> LiveSession<S> {
    pub fn new(pipeline: FramePipeline<S>, nominal_fps: f64) -> Self {
        Self {
            pipeline,
            clock: FrameClock::measured(nominal_fps),
            hook: None,
            report: None,
        }
    }

    /// Observer run after each frame (display, quit-key checks, ...).
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&FrameOutcome, &StopHandle) + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Replaces the wall clock, e.g. with a fixed per-frame duration.
    pub fn with_clock(mut self, clock: FrameClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn pipeline(&self) -> &FramePipeline<S> {
        &self.pipeline
    }

    /// Final report, available once the controller has been joined.
    pub fn report(&self) -> DwellReport {
        self.report
            .clone()
            .unwrap_or_else(|| self.pipeline.report())
    }

    pub fn into_sink(self) -> S {
        self.pipeline.into_sink()
    }
}

impl<S: FrameSink + Send> FrameCallback for LiveSession<S> {
    fn on_frame(&mut self, live: LiveFrame, stop: &StopHandle) -> Result<()> {
        let duration = self.clock.tick();
        let outcome = self.pipeline.process(live.into(), duration)?;
        if let Some(hook) = self.hook.as_mut() {
            hook(&outcome, stop);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.report = Some(self.pipeline.finish()?);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Producers
// ----------------------------------------------------------------------------

/// Sleeps so that successive frames are at least `1 / max_fps` apart.
struct Pacer {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl Pacer {
    fn new(max_fps: u32) -> Self {
        let interval = (max_fps > 0).then(|| Duration::from_secs_f64(1.0 / max_fps as f64));
        Self {
            interval,
            next_due: None,
        }
    }

    fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + interval);
    }
}

/// Scripted `stub://` producer: synthetic frames with a repeating cycle of
/// standing, clinch and ground detections.
pub struct SyntheticProducer {
    reference: String,
    source: Option<SyntheticSource>,
    pacer: Pacer,
    cycle_frames: u64,
}

impl SyntheticProducer {
    pub fn new(config: &LiveConfig) -> Self {
        Self {
            reference: config.reference.clone(),
            source: None,
            pacer: Pacer::new(config.max_fps),
            cycle_frames: 30,
        }
    }

    /// Frames spent in each scripted phase.
    pub fn with_cycle(mut self, frames: u64) -> Self {
        self.cycle_frames = frames.max(1);
        self
    }

    fn script(&self, index: u64, width: u32, height: u32) -> Vec<Detection> {
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let w = width as f32 / 4.0;
        let h = height as f32 / 2.0;
        let class = match (index / self.cycle_frames) % 3 {
            0 => "Standing",
            1 => "Clinch",
            _ => "Ground",
        };
        vec![Detection::new(class, 0.9, cx, cy, w, h)]
    }
}

impl LiveProducer for SyntheticProducer {
    fn open(&mut self) -> Result<(), SourceError> {
        self.source = Some(SyntheticSource::open(&self.reference)?);
        Ok(())
    }

    fn frame_rate(&self) -> f64 {
        self.source.as_ref().map(|s| s.frame_rate()).unwrap_or(0.0)
    }

    fn next(&mut self) -> Result<Option<LiveFrame>> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| anyhow!("synthetic producer used before open"))?;
        let Some(frame) = source.next_frame()? else {
            return Ok(None);
        };
        self.pacer.wait();
        let detections = self.script(frame.index, frame.width(), frame.height());
        Ok(Some(LiveFrame::new(frame, detections)))
    }
}

/// Pushes a pre-computed record store against a video, paced at `max_fps`.
pub struct ReplayProducer {
    video: VideoConfig,
    records: Option<RecordStore>,
    record_rate: f64,
    batch: Option<BatchSource<VideoSource>>,
    pacer: Pacer,
}

impl ReplayProducer {
    pub fn new(config: &LiveConfig, records: RecordStore, record_rate: f64) -> Self {
        Self {
            video: VideoConfig {
                reference: config.reference.clone(),
                ..Default::default()
            },
            records: Some(records),
            record_rate,
            batch: None,
            pacer: Pacer::new(config.max_fps),
        }
    }
}

impl LiveProducer for ReplayProducer {
    fn open(&mut self) -> Result<(), SourceError> {
        let video = VideoSource::open(&self.video)?;
        let records = self.records.take().unwrap_or_default();
        let batch = BatchSource::new(video, records, self.record_rate)
            .map_err(|e| SourceError::open(&self.video.reference, format!("{:#}", e)))?;
        self.batch = Some(batch);
        Ok(())
    }

    fn frame_rate(&self) -> f64 {
        self.batch.as_ref().map(|b| b.frame_rate()).unwrap_or(0.0)
    }

    fn next(&mut self) -> Result<Option<LiveFrame>> {
        let batch = self
            .batch
            .as_mut()
            .ok_or_else(|| anyhow!("replay producer used before open"))?;
        let Some(item) = batch.next_item()? else {
            return Ok(None);
        };
        self.pacer.wait();
        Ok(Some(item.input.into()))
    }
}

/// Builds the producer for `config`: a record replay when `records` are
/// given, the scripted synthetic producer for `stub://` references.
/// Any other live reference needs an external inference engine.
pub fn open_live_producer(
    config: &LiveConfig,
    records: Option<(RecordStore, f64)>,
) -> Result<Box<dyn LiveProducer>, SourceError> {
    if !config.workflow_id.is_empty() {
        log::info!(
            "live workflow '{}' (credential {})",
            config.workflow_id,
            if config.api_key.is_some() { "set" } else { "unset" }
        );
    }
    match records {
        Some((store, record_rate)) => Ok(Box::new(ReplayProducer::new(config, store, record_rate))),
        None if config.reference.starts_with(STUB_SCHEME) => {
            Ok(Box::new(SyntheticProducer::new(config)))
        }
        None => Err(SourceError::Unsupported(format!(
            "{} (live inference requires an external producer; pass --records to replay)",
            config.reference
        ))),
    }
}

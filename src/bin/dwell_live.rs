//! dwell_live - Live dwell-time annotation.
//!
//! A producer thread acquires frames with detections and the pipeline
//! annotates each one as it arrives. Frame durations are measured on the wall
//! clock. Ctrl-C (or --max-frames) stops the run; the output is finalized
//! before the report is written.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use dwell_timeline::config::AnnotateConfig;
use dwell_timeline::output::{FrameSink, ImageFormat, NullSink, SequenceSink};
use dwell_timeline::pipeline::{open_live_producer, FramePipeline, PredictionSource, StopHandle};
use dwell_timeline::records::RecordStore;
use dwell_timeline::render::OverlayRenderer;

#[derive(Parser, Debug)]
#[command(name = "dwell_live", version, about = "Annotate a live stream with activity dwell time")]
struct Args {
    /// Device, stream, or stub:// reference (overrides DWELL_LIVE_REFERENCE).
    #[arg(long, value_name = "REF")]
    reference: Option<String>,

    /// Replay these prediction records against the reference instead of
    /// running inference.
    #[arg(long, value_name = "PATH")]
    records: Option<PathBuf>,

    /// Rate the replayed records were produced at.
    #[arg(long, value_name = "FPS")]
    record_fps: Option<f64>,

    /// Upper bound on processed frames per second (0 = unpaced).
    #[arg(long, value_name = "FPS")]
    max_fps: Option<u32>,

    /// Inference workflow identifier.
    #[arg(long, value_name = "ID")]
    workflow_id: Option<String>,

    /// Write annotated frames to this directory.
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Output image format (png|jpeg).
    #[arg(long, value_name = "FORMAT")]
    format: Option<String>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Write the dwell report as JSON.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = AnnotateConfig::load()?;
    if let Some(reference) = args.reference.clone() {
        cfg.live.reference = reference;
    }
    if let Some(fps) = args.record_fps {
        cfg.record_fps = fps;
    }
    if let Some(max_fps) = args.max_fps {
        cfg.live.max_fps = max_fps;
    }
    if let Some(workflow) = args.workflow_id.clone() {
        cfg.live.workflow_id = workflow;
    }
    if let Some(format) = args.format.as_deref() {
        cfg.output_format = ImageFormat::parse(format)?;
    }
    log::info!("live config: {:?}", cfg.live);

    let records = match args.records.as_deref() {
        Some(path) => Some((RecordStore::open(path)?, cfg.record_fps)),
        None => None,
    };
    let source = PredictionSource::live(open_live_producer(&cfg.live, records)?, &cfg.live)?;
    // Playback time and output rate follow the source; max_fps only paces it.
    let fps = source.frame_rate();

    let sink: Box<dyn FrameSink + Send> = match args.output.as_deref() {
        Some(dir) => Box::new(SequenceSink::create(dir, cfg.output_format, fps)?),
        None => Box::new(NullSink::default()),
    };
    let pipeline = FramePipeline::new(OverlayRenderer::new(cfg.classifier()?, fps), fps, sink);

    let stop = StopHandle::new();
    let signal_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping live pipeline...");
        signal_stop.stop();
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("dwell_live running (Ctrl-C to stop)");
    let max_frames = args.max_frames;
    let (report, _sink) = source.run(pipeline, stop, move |outcome, stop| {
        if max_frames.is_some_and(|max| outcome.frame.index + 1 >= max) {
            stop.stop();
        }
    })?;

    for entry in &report.labels {
        log::info!(
            "{}: {:.1}s ({:.1}%)",
            entry.label,
            entry.seconds,
            entry.percent
        );
    }
    if let Some(path) = args.report.as_deref() {
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)
            .with_context(|| format!("writing report {}", path.display()))?;
        log::info!("report written to {}", path.display());
    }
    Ok(())
}

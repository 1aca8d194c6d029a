//! dwell_annotate - Annotate a video with pre-computed predictions.
//!
//! Pairs each video frame with the prediction record at the mapped rate,
//! draws boxes, captions, the dwell panel and a frame counter, and writes the
//! annotated frames as an image sequence at the video's native rate.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use dwell_timeline::config::AnnotateConfig;
use dwell_timeline::ingest::{FrameSource, VideoConfig, VideoSource};
use dwell_timeline::output::{FrameSink, ImageFormat, NullSink, SequenceSink};
use dwell_timeline::pipeline::{
    BatchOptions, BatchSource, FramePipeline, PredictionSource, StopHandle,
};
use dwell_timeline::records::RecordStore;
use dwell_timeline::render::OverlayRenderer;
use dwell_timeline::ui;

#[derive(Parser, Debug)]
#[command(
    name = "dwell_annotate",
    version,
    about = "Overlay detections and activity dwell time onto a video"
)]
struct Args {
    /// Video file, image-sequence directory, or stub:// reference.
    #[arg(long, value_name = "PATH")]
    video: String,

    /// Prediction records (.csv with a `predictions` column, or .jsonl).
    #[arg(long, value_name = "PATH")]
    records: PathBuf,

    /// Rate the records were produced at (overrides DWELL_RECORD_FPS).
    #[arg(long, value_name = "FPS")]
    record_fps: Option<f64>,

    /// Output directory for annotated frames (overrides DWELL_OUTPUT_DIR).
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Output image format (png|jpeg).
    #[arg(long, value_name = "FORMAT")]
    format: Option<String>,

    /// Skip writing frames; only log and report.
    #[arg(long)]
    no_output: bool,

    /// End the run when the records run out instead of at end of video.
    #[arg(long)]
    stop_at_record_end: bool,

    /// Write the dwell report as JSON.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let mut cfg = AnnotateConfig::load()?;
    if let Some(fps) = args.record_fps {
        cfg.record_fps = fps;
    }
    if let Some(dir) = args.output.clone() {
        cfg.output_dir = dir;
    }
    if let Some(format) = args.format.as_deref() {
        cfg.output_format = ImageFormat::parse(format)?;
    }
    let classifier = cfg.classifier()?;

    let (video, records) = {
        let _stage = ui.stage("Open inputs");
        let video = VideoSource::open(&VideoConfig {
            reference: args.video.clone(),
            ..Default::default()
        })?;
        let records = RecordStore::open(&args.records)?;
        (video, records)
    };
    let video: Box<dyn FrameSource> = Box::new(video);
    let batch = BatchSource::new(video, records, cfg.record_fps)?.with_options(BatchOptions {
        stop_when_records_exhausted: args.stop_at_record_end,
    });
    let source = PredictionSource::batch(batch);
    let fps = source.frame_rate();
    let total_frames = source.frame_count_hint();

    let sink: Box<dyn FrameSink + Send> = if args.no_output {
        Box::new(NullSink::default())
    } else {
        Box::new(SequenceSink::create(&cfg.output_dir, cfg.output_format, fps)?)
    };
    let pipeline = FramePipeline::new(OverlayRenderer::new(classifier, fps), fps, sink);

    let stop = StopHandle::new();
    let signal_stop = stop.clone();
    ctrlc::set_handler(move || signal_stop.stop()).context("error setting Ctrl-C handler")?;

    let report = {
        let _stage = ui.stage("Annotate frames");
        let progress = ui.frames(total_frames);
        let ticker = progress.clone();
        let result = source.run(pipeline, stop, move |outcome, _| {
            ticker.tick(&format!("t={:.1}s", outcome.playback_secs));
        });
        progress.finish();
        result?.0
    };

    for entry in &report.labels {
        log::info!(
            "{}: {:.1}s ({:.1}%)",
            entry.label,
            entry.seconds,
            entry.percent
        );
    }
    log::info!(
        "processed {} frames ({} with records, {} parse errors)",
        report.frames_processed,
        report.frames_with_records,
        report.parse_errors
    );
    if !args.no_output {
        log::info!("annotated frames written to {}", cfg.output_dir.display());
    }
    if let Some(path) = args.report.as_deref() {
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)
            .with_context(|| format!("writing report {}", path.display()))?;
        log::info!("report written to {}", path.display());
    }
    Ok(())
}

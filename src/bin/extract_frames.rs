//! extract_frames - Save every Nth frame, or one frame per interval, of a video.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use dwell_timeline::extract::{extract_frames, ExtractMode};
use dwell_timeline::ingest::{FrameSource, VideoConfig, VideoSource};
use dwell_timeline::output::{ImageFormat, SequenceSink};
use dwell_timeline::pipeline::StopHandle;
use dwell_timeline::ui;

#[derive(Parser, Debug)]
#[command(name = "extract_frames", version, about = "Extract frames from a video")]
struct Args {
    /// Video file, image-sequence directory, or stub:// reference.
    #[arg(long, value_name = "PATH")]
    video: String,

    /// Output directory.
    #[arg(long, value_name = "DIR", default_value = "frames")]
    output: PathBuf,

    /// Keep every Nth frame.
    #[arg(long, value_name = "N", conflicts_with = "interval")]
    every: Option<u64>,

    /// Keep one frame per this many seconds.
    #[arg(long, value_name = "SECS", conflicts_with = "every")]
    interval: Option<f64>,

    /// Output image format (png|jpeg).
    #[arg(long, default_value = "jpeg", value_name = "FORMAT")]
    format: String,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let mode = match (args.every, args.interval) {
        (Some(n), None) => ExtractMode::EveryNth(n),
        (None, Some(secs)) => ExtractMode::Interval(secs),
        _ => return Err(anyhow!("pass exactly one of --every or --interval")),
    };

    let mut video = {
        let _stage = ui.stage("Open video");
        VideoSource::open(&VideoConfig {
            reference: args.video.clone(),
            ..Default::default()
        })?
    };
    let mut sink = SequenceSink::create(
        &args.output,
        ImageFormat::parse(&args.format)?,
        video.frame_rate(),
    )?;

    let stop = StopHandle::new();
    let signal_stop = stop.clone();
    ctrlc::set_handler(move || signal_stop.stop()).context("error setting Ctrl-C handler")?;

    let count = {
        let _stage = ui.stage("Extract frames");
        extract_frames(&mut video, &mut sink, mode, || stop.is_stopped())?
    };
    log::info!("saved {} frames to {}", count, args.output.display());
    Ok(())
}

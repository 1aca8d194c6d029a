//! Annotated frame outputs.
//!
//! Sinks receive frames in playback order. `finish` flushes and closes the
//! output; it is idempotent and must run before a run is reported complete.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::frame::Frame;
use crate::ingest::sequence::{SequenceManifest, MANIFEST_FILE};

pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn frames_written(&self) -> u64;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }

    fn frames_written(&self) -> u64 {
        (**self).frames_written()
    }
}

/// On-disk image format for [`SequenceSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(anyhow!("unsupported image format '{}'", other)),
        }
    }

    fn as_image(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Writes `frame_000001.<ext>`, `frame_000002.<ext>`, ... plus a
/// `sequence.json` manifest carrying the native frame rate, so the sequence
/// can be muxed into a video at the source's rate.
pub struct SequenceSink {
    dir: PathBuf,
    prefix: String,
    format: ImageFormat,
    fps: f64,
    written: u64,
    dimensions: Option<(u32, u32)>,
    finished: bool,
}

impl SequenceSink {
    pub fn create(dir: &Path, format: ImageFormat, fps: f64) -> Result<Self> {
        Self::with_prefix(dir, "frame", format, fps)
    }

    pub fn with_prefix(dir: &Path, prefix: &str, format: ImageFormat, fps: f64) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            format,
            fps,
            written: 0,
            dimensions: None,
            finished: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the next frame will be written to.
    pub fn next_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}_{:06}.{}",
            self.prefix,
            self.written + 1,
            self.format.extension()
        ))
    }

    fn write_image(&mut self, image: &RgbImage) -> Result<()> {
        if self.finished {
            return Err(anyhow!("sink {} already finished", self.dir.display()));
        }
        let path = self.next_path();
        image
            .save_with_format(&path, self.format.as_image())
            .with_context(|| format!("writing frame {}", path.display()))?;
        self.dimensions.get_or_insert((image.width(), image.height()));
        self.written += 1;
        Ok(())
    }
}

impl FrameSink for SequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_image(&frame.image)
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let (width, height) = self.dimensions.unwrap_or((0, 0));
        let manifest = SequenceManifest {
            fps: self.fps,
            frames: self.written,
            width,
            height,
            extension: self.format.extension().to_string(),
        };
        let path = self.dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&manifest)?)
            .with_context(|| format!("writing manifest {}", path.display()))?;
        log::info!(
            "SequenceSink: finalized {} ({} frames @ {:.2} fps)",
            self.dir.display(),
            self.written,
            self.fps
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

/// Keeps frames in memory.
#[derive(Default)]
pub struct MemorySink {
    pub frames: Vec<Frame>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("memory sink already finished"));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.len() as u64
    }
}

/// Discards frames (display-only or log-only runs).
#[derive(Default)]
pub struct NullSink {
    written: u64,
}

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FrameSource, SequenceSource};

    #[test]
    fn sequence_sink_round_trips_through_source() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("annotated");
        let mut sink = SequenceSink::create(&out, ImageFormat::Png, 25.0).unwrap();
        for i in 0..3 {
            sink.write_frame(&Frame::blank(i, 6, 4)).unwrap();
        }
        sink.finish().unwrap();
        sink.finish().unwrap();
        assert!(out.join("frame_000001.png").exists());
        assert!(out.join("frame_000003.png").exists());

        let manifest = SequenceManifest::read(&out).unwrap().unwrap();
        assert_eq!(manifest.frames, 3);
        assert_eq!((manifest.width, manifest.height), (6, 4));

        let source = SequenceSource::open(&out, 1.0).unwrap();
        assert_eq!(source.frame_rate(), 25.0);
    }

    #[test]
    fn finished_sinks_reject_writes() {
        let mut sink = MemorySink::new();
        sink.write_frame(&Frame::blank(0, 1, 1)).unwrap();
        sink.finish().unwrap();
        assert!(sink.write_frame(&Frame::blank(1, 1, 1)).is_err());
        assert_eq!(sink.frames_written(), 1);
    }

    #[test]
    fn parses_image_formats() {
        assert_eq!(ImageFormat::parse("JPEG").unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::parse("png").unwrap(), ImageFormat::Png);
        assert!(ImageFormat::parse("gif").is_err());
    }
}

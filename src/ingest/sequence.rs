//! Image-sequence directory source.
//!
//! A directory of `.png`/`.jpg`/`.jpeg` frames read in file-name order. The
//! playback rate comes from a `sequence.json` manifest when present (as
//! written by [`SequenceSink`](crate::output::SequenceSink)), otherwise from
//! the caller.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::error::SourceError;
use crate::frame::Frame;

pub const MANIFEST_FILE: &str = "sequence.json";

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Sidecar describing an image sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub fps: f64,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub extension: String,
}

impl SequenceManifest {
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let manifest = serde_json::from_str(&raw)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        Ok(Some(manifest))
    }
}

pub struct SequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    fps: f64,
    dimensions: (u32, u32),
    next_index: usize,
}

impl SequenceSource {
    /// Opens `dir`. `fallback_fps` is used only when no manifest exists.
    pub fn open(dir: &Path, fallback_fps: f64) -> Result<Self, SourceError> {
        let reference = dir.display().to_string();
        let entries = std::fs::read_dir(dir).map_err(|e| SourceError::open(&reference, e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_frame_file(path))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(SourceError::open(&reference, "directory contains no frame images"));
        }

        let manifest =
            SequenceManifest::read(dir).map_err(|e| SourceError::open(&reference, format!("{:#}", e)))?;
        let fps = manifest.as_ref().map(|m| m.fps).unwrap_or(fallback_fps);
        if !(fps.is_finite() && fps > 0.0) {
            return Err(SourceError::open(&reference, "frame rate must be positive"));
        }

        let first = image::image_dimensions(&files[0])
            .map_err(|e| SourceError::open(files[0].display().to_string(), e))?;

        log::info!(
            "SequenceSource: opened {} ({} frames @ {:.2} fps, {}x{})",
            reference,
            files.len(),
            fps,
            first.0,
            first.1
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            fps,
            dimensions: first,
            next_index: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

impl FrameSource for SequenceSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.files.len() as u64)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next_index) else {
            return Ok(None);
        };
        let image = image::open(path)
            .map_err(|e| SourceError::read(path.display().to_string(), e))?
            .to_rgb8();
        let index = self.next_index as u64;
        self.next_index += 1;
        Ok(Some(Frame::new(index, image)))
    }
}

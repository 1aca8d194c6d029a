//! Video source selection.
//!
//! `VideoSource` picks a backend from the reference:
//! - `stub://...` -> synthetic frames
//! - a directory -> image sequence
//! - a local file -> FFmpeg decode (feature: video-ffmpeg)

use anyhow::Result;
use std::path::Path;

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::STUB_SCHEME;
use super::{FrameSource, SequenceSource, SyntheticSource};
use crate::error::SourceError;
use crate::frame::Frame;

/// Configuration for opening a video.
#[derive(Clone, Debug)]
pub struct VideoConfig {
    /// `stub://` reference, image directory, or local video path.
    pub reference: String,
    /// Rate assumed for image sequences without a manifest.
    pub fallback_fps: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            reference: String::new(),
            fallback_fps: 30.0,
        }
    }
}

pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticSource),
    Sequence(SequenceSource),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl VideoSource {
    pub fn open(config: &VideoConfig) -> Result<Self, SourceError> {
        let reference = config.reference.trim();
        if reference.is_empty() {
            return Err(SourceError::open(reference, "empty video reference"));
        }
        if reference.starts_with(STUB_SCHEME) {
            return Ok(Self {
                backend: VideoBackend::Synthetic(SyntheticSource::open(reference)?),
            });
        }
        if reference.contains("://") {
            return Err(SourceError::Unsupported(reference.to_string()));
        }
        let path = Path::new(reference);
        if path.is_dir() {
            return Ok(Self {
                backend: VideoBackend::Sequence(SequenceSource::open(path, config.fallback_fps)?),
            });
        }
        if !path.exists() {
            return Err(SourceError::open(reference, "no such file or directory"));
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            Ok(Self {
                backend: VideoBackend::Ffmpeg(FfmpegFileSource::open(path)?),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(SourceError::open(
                reference,
                "video file decoding requires the video-ffmpeg feature",
            ))
        }
    }

    fn inner(&self) -> &dyn FrameSource {
        match &self.backend {
            VideoBackend::Synthetic(source) => source,
            VideoBackend::Sequence(source) => source,
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            VideoBackend::Synthetic(source) => source,
            VideoBackend::Sequence(source) => source,
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source,
        }
    }
}

impl FrameSource for VideoSource {
    fn frame_rate(&self) -> f64 {
        self.inner().frame_rate()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner().dimensions()
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.inner().frame_count_hint()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.inner_mut().next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(reference: &str) -> VideoConfig {
        VideoConfig {
            reference: reference.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn stub_reference_opens_synthetic() {
        let source = VideoSource::open(&config("stub://x?frames=4&fps=15")).unwrap();
        assert_eq!(source.frame_rate(), 15.0);
        assert_eq!(source.frame_count_hint(), Some(4));
    }

    #[test]
    fn remote_and_missing_references_fail_fast() {
        assert!(matches!(
            VideoSource::open(&config("rtsp://camera/1")),
            Err(SourceError::Unsupported(_))
        ));
        assert!(matches!(
            VideoSource::open(&config("/definitely/not/here.mp4")),
            Err(SourceError::Open { .. })
        ));
        assert!(VideoSource::open(&config("  ")).is_err());
    }
}

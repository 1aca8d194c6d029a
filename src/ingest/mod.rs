//! Video frame sources.
//!
//! This module provides the bounded frame sequences that batch mode pairs
//! with a record store, and that live producers pace into callbacks:
//! - Synthetic `stub://` streams (tests, demos)
//! - Image-sequence directories
//! - Local video files (feature: video-ffmpeg)
//!
//! Every source reports its native frame rate and yields frames with strictly
//! increasing, 0-based indices. Opening a source fails fast with
//! [`SourceError::Open`](crate::error::SourceError::Open).

#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod sequence;
pub mod synthetic;
pub mod video;

pub use sequence::SequenceSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
pub use video::{VideoConfig, VideoSource};

use anyhow::Result;

use crate::frame::Frame;

/// A pull-based, bounded sequence of decoded frames.
pub trait FrameSource {
    /// Native playback rate in frames per second.
    fn frame_rate(&self) -> f64;

    /// `(width, height)` of produced frames.
    fn dimensions(&self) -> (u32, u32);

    /// Total frame count when known up front.
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn frame_count_hint(&self) -> Option<u64> {
        (**self).frame_count_hint()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

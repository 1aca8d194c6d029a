//! Synthetic `stub://` frame source.
//!
//! Reference form: `stub://<name>?frames=N&fps=F&width=W&height=H`. Every
//! query key is optional. Pixels are a deterministic function of the frame
//! index, so repeated runs produce identical frames.

use anyhow::Result;
use image::{Rgb, RgbImage};

use super::FrameSource;
use crate::error::SourceError;
use crate::frame::Frame;

pub const STUB_SCHEME: &str = "stub://";

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub name: String,
    pub frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            frames: 90,
            fps: 30.0,
            width: 640,
            height: 480,
        }
    }
}

impl SyntheticConfig {
    pub fn from_reference(reference: &str) -> Result<Self, SourceError> {
        let rest = reference
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| SourceError::Unsupported(reference.to_string()))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, query),
            None => (rest, ""),
        };
        let mut cfg = SyntheticConfig {
            name: if name.is_empty() {
                "synthetic".to_string()
            } else {
                name.to_string()
            },
            ..Default::default()
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                SourceError::open(reference, format!("malformed query '{}'", pair))
            })?;
            match key {
                "frames" => cfg.frames = parse_value(reference, key, value)?,
                "fps" => cfg.fps = parse_value(reference, key, value)?,
                "width" => cfg.width = parse_value(reference, key, value)?,
                "height" => cfg.height = parse_value(reference, key, value)?,
                other => {
                    return Err(SourceError::open(
                        reference,
                        format!("unknown query key '{}'", other),
                    ))
                }
            }
        }
        if !(cfg.fps.is_finite() && cfg.fps > 0.0) || cfg.width == 0 || cfg.height == 0 {
            return Err(SourceError::open(reference, "fps, width and height must be positive"));
        }
        Ok(cfg)
    }
}

fn parse_value<T>(reference: &str, key: &str, value: &str) -> Result<T, SourceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        SourceError::open(reference, format!("invalid value for '{}': {}", key, e))
    })
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    next_index: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!(
            "SyntheticSource: opened {} ({} frames @ {:.2} fps, {}x{})",
            config.name,
            config.frames,
            config.fps,
            config.width,
            config.height
        );
        Self {
            config,
            next_index: 0,
        }
    }

    pub fn open(reference: &str) -> Result<Self, SourceError> {
        SyntheticConfig::from_reference(reference).map(Self::new)
    }

    fn render_pixels(&self, index: u64) -> RgbImage {
        let shift = (index % 256) as u32;
        RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift / 2) % 256) as u8,
                ((x / 4 + y / 4) % 256) as u8,
            ])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn frame_rate(&self) -> f64 {
        self.config.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.config.frames)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.config.frames {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame::new(index, self.render_pixels(index))))
    }
}

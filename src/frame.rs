//! Video frames as they move through the pipeline.
//!
//! - `Frame`: a decoded RGB image tagged with its playback index.
//! - `frame_digest`: content hash used to check that rendering is reproducible.

use image::RgbImage;
use sha2::{Digest, Sha256};

/// A decoded video frame.
///
/// `index` is 0-based and strictly increasing within one stream. The frame's
/// implied timestamp is `index / nominal_frame_rate`.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Blank (black) frame of the given size.
    pub fn blank(index: u64, width: u32, height: u32) -> Self {
        Self::new(index, RgbImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Implied playback timestamp in seconds. Zero when the rate is unusable.
    pub fn timestamp_secs(&self, frame_rate: f64) -> f64 {
        if frame_rate > 0.0 && frame_rate.is_finite() {
            self.index as f64 / frame_rate
        } else {
            0.0
        }
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// SHA-256 over dimensions and pixel bytes.
pub fn frame_digest(image: &RgbImage) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_raw());
    hasher.finalize().into()
}

/// Hex form of [`frame_digest`], as carried in debug logs.
pub fn frame_digest_hex(image: &RgbImage) -> String {
    hex::encode(frame_digest(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn timestamp_follows_nominal_rate() {
        let frame = Frame::blank(45, 4, 4);
        assert!((frame.timestamp_secs(30.0) - 1.5).abs() < 1e-9);
        assert_eq!(frame.timestamp_secs(0.0), 0.0);
    }

    #[test]
    fn digest_changes_with_content() {
        let a = RgbImage::new(8, 8);
        let mut b = a.clone();
        assert_eq!(frame_digest(&a), frame_digest(&b));
        b.put_pixel(3, 3, Rgb([1, 0, 0]));
        assert_ne!(frame_digest(&a), frame_digest(&b));
        assert_eq!(frame_digest_hex(&a).len(), 64);
    }
}

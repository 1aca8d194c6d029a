//! Playback-frame to prediction-record index mapping.
//!
//! Records may have been produced at a different rate than the video plays.
//! A frame maps to `floor(frame_index * record_rate / frame_rate)`. This one
//! floor-based rule is also used by the frame extraction utilities, so every
//! rate conversion in the crate rounds the same way.

use anyhow::{anyhow, Result};

/// Absorbs representation error in `i * r / f` when the exact quotient is an
/// integer (e.g. 29.97 vs 59.94). Far below one record step at any sane rate.
const FLOOR_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateMapper {
    frame_rate: f64,
    record_rate: f64,
}

impl RateMapper {
    pub fn new(frame_rate: f64, record_rate: f64) -> Result<Self> {
        for (name, rate) in [("frame rate", frame_rate), ("record rate", record_rate)] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(anyhow!("{} must be a positive number, got {}", name, rate));
            }
        }
        Ok(Self {
            frame_rate,
            record_rate,
        })
    }

    /// Identity mapper for streams where every frame carries its own record.
    pub fn identity(rate: f64) -> Result<Self> {
        Self::new(rate, rate)
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn record_rate(&self) -> f64 {
        self.record_rate
    }

    /// Unbounded record index for a frame. Non-decreasing in `frame_index`.
    pub fn map(&self, frame_index: u64) -> u64 {
        if self.frame_rate == self.record_rate {
            return frame_index;
        }
        let scaled = frame_index as f64 * self.record_rate / self.frame_rate;
        (scaled + FLOOR_EPSILON).floor() as u64
    }

    /// Record index within `[0, record_count - 1]`, or `None` when the frame
    /// lies past the end of the store. Running out of records is not an error.
    pub fn resolve(&self, frame_index: u64, record_count: usize) -> Option<usize> {
        let index = self.map(frame_index);
        usize::try_from(index)
            .ok()
            .filter(|&index| index < record_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_rates_are_identity() {
        let mapper = RateMapper::new(29.97, 29.97).unwrap();
        for i in [0u64, 1, 2, 999, 123_456_789] {
            assert_eq!(mapper.map(i), i);
        }
    }

    #[test]
    fn half_rate_records_pair_frames() {
        let mapper = RateMapper::new(30.0, 15.0).unwrap();
        assert_eq!(mapper.map(0), 0);
        assert_eq!(mapper.map(1), 0);
        assert_eq!(mapper.map(2), 1);
        assert_eq!(mapper.map(3), 1);
    }

    #[test]
    fn mapping_is_non_decreasing() {
        for (f, r) in [(30.0, 15.0), (29.97, 30.0), (25.0, 7.5), (24.0, 60.0)] {
            let mapper = RateMapper::new(f, r).unwrap();
            let mut prev = 0;
            for i in 0..5_000 {
                let idx = mapper.map(i);
                assert!(idx >= prev, "rates {f}/{r} decreased at frame {i}");
                prev = idx;
            }
        }
    }

    #[test]
    fn resolve_past_end_is_none() {
        let mapper = RateMapper::new(30.0, 15.0).unwrap();
        assert_eq!(mapper.resolve(5, 3), Some(2));
        assert_eq!(mapper.resolve(6, 3), None);
        assert_eq!(mapper.resolve(0, 0), None);
    }

    #[test]
    fn rejects_unusable_rates() {
        assert!(RateMapper::new(0.0, 30.0).is_err());
        assert!(RateMapper::new(30.0, -1.0).is_err());
        assert!(RateMapper::new(f64::NAN, 30.0).is_err());
    }
}

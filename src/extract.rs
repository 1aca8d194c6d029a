//! Frame extraction: copy a subsample of a source's frames to a sink.

use anyhow::{anyhow, Result};

use crate::ingest::FrameSource;
use crate::output::FrameSink;
use crate::rate::RateMapper;

const PROGRESS_EVERY: u64 = 20;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExtractMode {
    /// Every Nth frame, starting with the first.
    EveryNth(u64),
    /// One frame per interval of playback seconds.
    Interval(f64),
}

impl ExtractMode {
    /// Samples per second of playback at `fps`.
    fn sample_rate(self, fps: f64) -> Result<f64> {
        match self {
            ExtractMode::EveryNth(0) => Err(anyhow!("frame step must be at least 1")),
            ExtractMode::EveryNth(n) => Ok(fps / n as f64),
            ExtractMode::Interval(secs) if !(secs.is_finite() && secs > 0.0) => {
                Err(anyhow!("extraction interval must be positive, got {}", secs))
            }
            ExtractMode::Interval(secs) => Ok(1.0 / secs),
        }
    }
}

/// Decides which frame indices are kept. A frame is kept when the sample
/// index it maps to advances, using the same floor rule as record mapping.
#[derive(Debug)]
pub struct FrameSelector {
    mapper: RateMapper,
    last_sample: Option<u64>,
}

impl FrameSelector {
    pub fn new(mode: ExtractMode, fps: f64) -> Result<Self> {
        let mapper = RateMapper::new(fps, mode.sample_rate(fps)?)?;
        Ok(Self {
            mapper,
            last_sample: None,
        })
    }

    /// Must be called with increasing frame indices.
    pub fn select(&mut self, frame_index: u64) -> bool {
        let sample = self.mapper.map(frame_index);
        if self.last_sample.map_or(true, |last| sample > last) {
            self.last_sample = Some(sample);
            true
        } else {
            false
        }
    }
}

/// Copies the selected frames of `source` into `sink` and finalizes it, also
/// when extraction fails part-way. Returns the number of frames extracted.
pub fn extract_frames<V, S, F>(
    source: &mut V,
    sink: &mut S,
    mode: ExtractMode,
    should_stop: F,
) -> Result<u64>
where
    V: FrameSource + ?Sized,
    S: FrameSink + ?Sized,
    F: FnMut() -> bool,
{
    let selector = FrameSelector::new(mode, source.frame_rate())?;
    let mut progress = Progress::default();
    let result = copy_selected(source, sink, selector, should_stop, &mut progress);
    let finished = sink.finish();
    log::info!(
        "extraction {}: {} of {} frames ({:?})",
        if result.is_ok() { "complete" } else { "aborted" },
        progress.extracted,
        progress.scanned,
        mode
    );
    result?;
    finished?;
    Ok(progress.extracted)
}

#[derive(Default)]
struct Progress {
    extracted: u64,
    scanned: u64,
}

fn copy_selected<V, S, F>(
    source: &mut V,
    sink: &mut S,
    mut selector: FrameSelector,
    mut should_stop: F,
    progress: &mut Progress,
) -> Result<()>
where
    V: FrameSource + ?Sized,
    S: FrameSink + ?Sized,
    F: FnMut() -> bool,
{
    while !should_stop() {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        progress.scanned += 1;
        if !selector.select(frame.index) {
            continue;
        }
        sink.write_frame(&frame)?;
        progress.extracted += 1;
        if progress.extracted % PROGRESS_EVERY == 0 {
            log::info!(
                "extracted {} frames (scanned {})",
                progress.extracted,
                progress.scanned
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SyntheticSource;
    use crate::output::MemorySink;

    fn selected(mode: ExtractMode, fps: f64, frames: u64) -> Vec<u64> {
        let mut selector = FrameSelector::new(mode, fps).unwrap();
        (0..frames).filter(|&i| selector.select(i)).collect()
    }

    #[test]
    fn every_nth_matches_modulo() {
        assert_eq!(selected(ExtractMode::EveryNth(3), 30.0, 10), vec![0, 3, 6, 9]);
        assert_eq!(selected(ExtractMode::EveryNth(1), 30.0, 3), vec![0, 1, 2]);
    }

    #[test]
    fn interval_uses_floor_of_rate_ratio() {
        // 0.5 s at 30 fps
        assert_eq!(selected(ExtractMode::Interval(0.5), 30.0, 46), vec![0, 15, 30, 45]);
        // 1 s at 29.97 fps: one frame per elapsed second
        let picks = selected(ExtractMode::Interval(1.0), 29.97, 91);
        assert_eq!(picks, vec![0, 30, 60, 90]);
    }

    #[test]
    fn invalid_modes_are_rejected() {
        assert!(FrameSelector::new(ExtractMode::EveryNth(0), 30.0).is_err());
        assert!(FrameSelector::new(ExtractMode::Interval(0.0), 30.0).is_err());
        assert!(FrameSelector::new(ExtractMode::Interval(f64::NAN), 30.0).is_err());
    }

    struct FailingSource {
        inner: SyntheticSource,
        fail_at: u64,
    }

    impl FrameSource for FailingSource {
        fn frame_rate(&self) -> f64 {
            self.inner.frame_rate()
        }

        fn dimensions(&self) -> (u32, u32) {
            self.inner.dimensions()
        }

        fn next_frame(&mut self) -> Result<Option<crate::frame::Frame>> {
            match self.inner.next_frame()? {
                Some(frame) if frame.index == self.fail_at => Err(anyhow!("decode error")),
                other => Ok(other),
            }
        }
    }

    #[test]
    fn failed_extraction_still_finalizes_the_sink() {
        let mut source = FailingSource {
            inner: SyntheticSource::open("stub://x?frames=50&width=8&height=8").unwrap(),
            fail_at: 25,
        };
        let mut sink = MemorySink::new();
        let result = extract_frames(&mut source, &mut sink, ExtractMode::EveryNth(10), || false);
        assert!(result.is_err());
        assert!(sink.finished);
        assert_eq!(sink.frames.len(), 3);
    }

    #[test]
    fn failed_extraction_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FailingSource {
            inner: SyntheticSource::open("stub://x?frames=50&width=8&height=8").unwrap(),
            fail_at: 5,
        };
        let mut sink = crate::output::SequenceSink::create(
            dir.path(),
            crate::output::ImageFormat::Png,
            30.0,
        )
        .unwrap();
        assert!(extract_frames(&mut source, &mut sink, ExtractMode::EveryNth(2), || false).is_err());
        let manifest = crate::ingest::sequence::SequenceManifest::read(dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(manifest.frames, 3);
    }

    #[test]
    fn extracts_into_sink() {
        let mut source = SyntheticSource::open("stub://x?frames=50&width=8&height=8").unwrap();
        let mut sink = MemorySink::new();
        let count = extract_frames(&mut source, &mut sink, ExtractMode::EveryNth(10), || false)
            .unwrap();
        assert_eq!(count, 5);
        let indices: Vec<u64> = sink.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 10, 20, 30, 40]);
        assert!(sink.finished);
    }
}

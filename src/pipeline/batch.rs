//! Batch (pull) mode: a bounded video paired with a pre-computed record store.
//!
//! Synchronous and single-threaded. A frame whose mapped record lies past the
//! end of the store, or whose payload is malformed, is processed with no
//! detections; it is still written to the output.

use anyhow::Result;

use super::live::StopHandle;
use super::{FrameInput, FrameOutcome, FramePipeline};
use crate::dwell::{DwellReport, FrameClock};
use crate::error::RecordError;
use crate::ingest::FrameSource;
use crate::output::FrameSink;
use crate::rate::RateMapper;
use crate::records::RecordStore;

#[derive(Clone, Copy, Debug, Default)]
pub struct BatchOptions {
    /// End the run at the first frame that maps past the last record,
    /// instead of writing the remaining frames without detections.
    pub stop_when_records_exhausted: bool,
}

/// A frame together with the record resolved for it.
#[derive(Debug)]
pub struct BatchItem {
    pub input: FrameInput,
    /// Parse failure for the mapped row, already logged.
    pub parse_error: Option<RecordError>,
}

/// Pairs a frame source with a record store through a [`RateMapper`].
pub struct BatchSource<V: FrameSource> {
    video: V,
    records: RecordStore,
    mapper: RateMapper,
    options: BatchOptions,
    exhausted: bool,
}

impl<V: FrameSource> BatchSource<V> {
    /// `record_rate` is the rate the records were produced at.
    pub fn new(video: V, records: RecordStore, record_rate: f64) -> Result<Self> {
        let mapper = RateMapper::new(video.frame_rate(), record_rate)?;
        log::info!(
            "BatchSource: {} records @ {:.2} fps against video @ {:.2} fps (ratio {:.3})",
            records.len(),
            record_rate,
            video.frame_rate(),
            record_rate / video.frame_rate()
        );
        Ok(Self {
            video,
            records,
            mapper,
            options: BatchOptions::default(),
            exhausted: false,
        })
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn frame_rate(&self) -> f64 {
        self.video.frame_rate()
    }

    pub fn mapper(&self) -> &RateMapper {
        &self.mapper
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn frame_count_hint(&self) -> Option<u64> {
        self.video.frame_count_hint()
    }

    /// Next frame with its detections, or `None` when the run is over.
    pub fn next_item(&mut self) -> Result<Option<BatchItem>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(frame) = self.video.next_frame()? else {
            self.exhausted = true;
            return Ok(None);
        };

        let record_index = self.mapper.resolve(frame.index, self.records.len());
        if record_index.is_none() && self.options.stop_when_records_exhausted {
            log::info!(
                "BatchSource: records exhausted at frame {} (record {})",
                frame.index + 1,
                self.mapper.map(frame.index)
            );
            self.exhausted = true;
            return Ok(None);
        }

        let (detections, parse_error) = match record_index {
            None => (Vec::new(), None),
            Some(row) => match self.records.get(row) {
                Ok(Some(record)) => (record.detections, None),
                Ok(None) => (Vec::new(), None),
                Err(err) => {
                    log::warn!(
                        "error parsing predictions for video frame {} (record row {}): {}",
                        frame.index,
                        row,
                        err
                    );
                    (Vec::new(), Some(err))
                }
            },
        };

        Ok(Some(BatchItem {
            input: FrameInput {
                frame,
                detections,
                record_index,
                parse_failed: parse_error.is_some(),
            },
            parse_error,
        }))
    }
}

/// Drives `source` through `pipeline` until either input runs out or `stop`
/// is signalled, then finalizes the sink. `on_frame` observes each outcome.
pub fn run_batch<V, S, F>(
    source: &mut BatchSource<V>,
    pipeline: &mut FramePipeline<S>,
    stop: &StopHandle,
    mut on_frame: F,
) -> Result<DwellReport>
where
    V: FrameSource,
    S: FrameSink,
    F: FnMut(&FrameOutcome),
{
    let result = drive(source, pipeline, stop, &mut on_frame);
    // Finalize the output even when the loop failed part-way.
    let report = pipeline.finish();
    result?;
    report
}

fn drive<V, S, F>(
    source: &mut BatchSource<V>,
    pipeline: &mut FramePipeline<S>,
    stop: &StopHandle,
    on_frame: &mut F,
) -> Result<()>
where
    V: FrameSource,
    S: FrameSink,
    F: FnMut(&FrameOutcome),
{
    let mut clock = FrameClock::fixed(source.frame_rate());
    loop {
        if stop.is_stopped() {
            log::info!("batch run interrupted");
            return Ok(());
        }
        let Some(item) = source.next_item()? else {
            return Ok(());
        };
        let outcome = pipeline.process(item.input, clock.tick())?;
        on_frame(&outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StateClassifier;
    use crate::ingest::SyntheticSource;
    use crate::output::MemorySink;
    use crate::render::OverlayRenderer;

    const STANDING: &str = r#"{"predictions":[{"x":50,"y":50,"width":20,"height":30,"class":"Standing","confidence":0.9}]}"#;
    const GROUND: &str = r#"{"predictions":[{"x":50,"y":50,"width":20,"height":30,"class":"Ground","confidence":0.7}]}"#;

    fn video(frames: u64, fps: f64) -> SyntheticSource {
        SyntheticSource::open(&format!("stub://t?frames={}&fps={}&width=96&height=64", frames, fps))
            .unwrap()
    }

    fn pipeline(fps: f64) -> FramePipeline<MemorySink> {
        FramePipeline::new(
            OverlayRenderer::new(StateClassifier::default(), fps),
            fps,
            MemorySink::new(),
        )
    }

    #[test]
    fn half_rate_records_cover_two_frames_each() {
        let records = RecordStore::from_payloads([STANDING, GROUND]);
        let mut source = BatchSource::new(video(4, 30.0), records, 15.0).unwrap();
        let rows: Vec<Option<usize>> = std::iter::from_fn(|| source.next_item().unwrap())
            .map(|item| item.input.record_index)
            .collect();
        assert_eq!(rows, vec![Some(0), Some(0), Some(1), Some(1)]);
    }

    #[test]
    fn malformed_row_does_not_halt_the_run() {
        let records = RecordStore::from_payloads([STANDING, "{oops", STANDING]);
        let mut source = BatchSource::new(video(3, 30.0), records, 30.0).unwrap();
        let mut p = pipeline(30.0);
        let report = run_batch(&mut source, &mut p, &StopHandle::new(), |_| {}).unwrap();
        assert_eq!(report.frames_processed, 3);
        assert_eq!(report.parse_errors, 1);
        assert_eq!(p.sink().frames_written(), 3);
        let standing = &report.labels[0];
        assert_eq!(standing.label.as_str(), "standing");
        assert!((standing.seconds - 2.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn frames_past_the_store_get_no_detections() {
        let records = RecordStore::from_payloads([GROUND]);
        let mut source = BatchSource::new(video(5, 30.0), records, 30.0).unwrap();
        let mut p = pipeline(30.0);
        let report = run_batch(&mut source, &mut p, &StopHandle::new(), |_| {}).unwrap();
        assert_eq!(report.frames_processed, 5);
        assert_eq!(report.frames_with_records, 1);
        let ground = report.labels.iter().find(|l| l.label.as_str() == "ground").unwrap();
        assert!((ground.percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn can_stop_at_record_end() {
        let records = RecordStore::from_payloads([GROUND, GROUND]);
        let mut source = BatchSource::new(video(10, 30.0), records, 30.0)
            .unwrap()
            .with_options(BatchOptions {
                stop_when_records_exhausted: true,
            });
        let mut p = pipeline(30.0);
        let report = run_batch(&mut source, &mut p, &StopHandle::new(), |_| {}).unwrap();
        assert_eq!(report.frames_processed, 2);
    }

    #[test]
    fn stop_handle_interrupts_and_finalizes() {
        let records = RecordStore::from_payloads([STANDING]);
        let mut source = BatchSource::new(video(100, 30.0), records, 30.0).unwrap();
        let mut p = pipeline(30.0);
        let stop = StopHandle::new();
        let mut seen = 0;
        let report = run_batch(&mut source, &mut p, &stop, |_| {
            seen += 1;
            if seen == 3 {
                stop.stop();
            }
        })
        .unwrap();
        assert_eq!(report.frames_processed, 3);
        assert!(p.sink().finished);
    }
}

//! Per-label dwell-time accumulation.
//!
//! `DwellStats` is created at the start of a run, threaded by `&mut` through
//! every frame, and turned into a `DwellReport` at the end. It is never
//! global. Callers must accumulate each rendered frame exactly once; a second
//! call for the same frame double-counts and cannot be detected here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::classify::{ActivityLabel, StateClassifier};

#[derive(Clone, Debug, PartialEq)]
pub struct DwellStats {
    /// Label order matches the classifier's display order.
    entries: Vec<(ActivityLabel, f64)>,
}

impl DwellStats {
    /// Zeroed counters for every label known to `classifier`.
    pub fn new(classifier: &StateClassifier) -> Self {
        Self::with_labels(classifier.labels().cloned())
    }

    pub fn with_labels(labels: impl IntoIterator<Item = ActivityLabel>) -> Self {
        let mut entries: Vec<(ActivityLabel, f64)> = Vec::new();
        for label in labels {
            if !entries.iter().any(|(l, _)| l == &label) {
                entries.push((label, 0.0));
            }
        }
        Self { entries }
    }

    /// Adds `duration_secs` to every label in `labels`; others are untouched.
    ///
    /// Negative or non-finite durations are ignored so counters stay
    /// monotonically non-decreasing.
    pub fn accumulate(&mut self, labels: &BTreeSet<ActivityLabel>, duration_secs: f64) {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return;
        }
        for (label, secs) in self.entries.iter_mut() {
            if labels.contains(label) {
                *secs += duration_secs;
            }
        }
    }

    pub fn seconds(&self, label: &ActivityLabel) -> f64 {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, s)| *s)
            .unwrap_or(0.0)
    }

    /// Labels with their seconds, in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&ActivityLabel, f64)> {
        self.entries.iter().map(|(l, s)| (l, *s))
    }

    /// Sum of all label-seconds. Labels overlap, so this can exceed wall time.
    pub fn total_seconds(&self) -> f64 {
        self.entries.iter().map(|(_, s)| s).sum()
    }

    /// Share of each label against the sum of all label-seconds, in 0..=100.
    /// All zero when nothing has been accumulated.
    pub fn percentages(&self) -> Vec<(ActivityLabel, f64)> {
        let total = self.total_seconds();
        self.entries
            .iter()
            .map(|(label, secs)| {
                let pct = if total > 0.0 { secs / total * 100.0 } else { 0.0 };
                (label.clone(), pct)
            })
            .collect()
    }

    pub fn percentage(&self, label: &ActivityLabel) -> f64 {
        let total = self.total_seconds();
        if total > 0.0 {
            self.seconds(label) / total * 100.0
        } else {
            0.0
        }
    }
}

/// Source of the per-frame duration fed into [`DwellStats::accumulate`].
#[derive(Clone, Debug)]
pub enum FrameClock {
    /// Batch mode: `1 / original_video_frame_rate`.
    Fixed(f64),
    /// Live mode: wall-clock delta between consecutive callbacks. The first
    /// tick has no predecessor and uses `first`.
    Measured { last: Option<Instant>, first: f64 },
}

impl FrameClock {
    pub fn fixed(frame_rate: f64) -> Self {
        let secs = if frame_rate > 0.0 { 1.0 / frame_rate } else { 0.0 };
        FrameClock::Fixed(secs)
    }

    pub fn measured(nominal_rate: f64) -> Self {
        let first = if nominal_rate > 0.0 { 1.0 / nominal_rate } else { 0.0 };
        FrameClock::Measured { last: None, first }
    }

    /// Duration of the frame being processed now.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f64 {
        match self {
            FrameClock::Fixed(secs) => *secs,
            FrameClock::Measured { last, first } => {
                let delta = match last {
                    Some(prev) => now.saturating_duration_since(*prev),
                    None => Duration::from_secs_f64(*first),
                };
                *last = Some(now);
                delta.as_secs_f64()
            }
        }
    }
}

/// End-of-run summary, serialized when a report path is requested.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DwellReport {
    pub frames_processed: u64,
    pub frames_with_records: u64,
    pub parse_errors: u64,
    /// Playback seconds covered (`frames_processed / frame_rate`).
    pub elapsed_seconds: f64,
    pub labels: Vec<LabelReport>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabelReport {
    pub label: ActivityLabel,
    pub seconds: f64,
    pub percent: f64,
}

impl DwellReport {
    pub fn label_entries(stats: &DwellStats) -> Vec<LabelReport> {
        stats
            .percentages()
            .into_iter()
            .map(|(label, percent)| LabelReport {
                seconds: stats.seconds(&label),
                label,
                percent,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> BTreeSet<ActivityLabel> {
        names.iter().map(|n| ActivityLabel::new(*n)).collect()
    }

    fn stats() -> DwellStats {
        DwellStats::new(&StateClassifier::default())
    }

    #[test]
    fn single_frame_with_two_labels() {
        let mut s = stats();
        s.accumulate(&labels(&["standing", "ground"]), 0.033);
        assert!((s.seconds(&ActivityLabel::new("standing")) - 0.033).abs() < 1e-12);
        assert!((s.seconds(&ActivityLabel::new("ground")) - 0.033).abs() < 1e-12);
        assert_eq!(s.seconds(&ActivityLabel::new("clinch")), 0.0);

        let pct = s.percentages();
        assert_eq!(pct[0].0.as_str(), "standing");
        assert!((pct[0].1 - 50.0).abs() < 1e-9);
        assert_eq!(pct[1].1, 0.0);
        assert!((pct[2].1 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn counts_scale_with_frames() {
        let mut s = stats();
        let d = 1.0 / 30.0;
        let frames = [
            labels(&["standing"]),
            labels(&["standing", "clinch"]),
            labels(&[]),
            labels(&["clinch"]),
            labels(&["standing"]),
        ];
        for f in &frames {
            s.accumulate(f, d);
        }
        assert!((s.seconds(&ActivityLabel::new("standing")) - 3.0 * d).abs() < 1e-12);
        assert!((s.seconds(&ActivityLabel::new("clinch")) - 2.0 * d).abs() < 1e-12);
        assert_eq!(s.seconds(&ActivityLabel::new("ground")), 0.0);
    }

    #[test]
    fn percentages_sum_to_hundred_or_zero() {
        let empty = stats();
        assert!(empty.percentages().iter().all(|(_, p)| *p == 0.0));
        assert_eq!(empty.percentage(&ActivityLabel::new("standing")), 0.0);

        let mut s = stats();
        s.accumulate(&labels(&["standing"]), 0.7);
        s.accumulate(&labels(&["ground", "clinch"]), 0.13);
        let sum: f64 = s.percentages().iter().map(|(_, p)| p).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_labels_and_bad_durations_are_ignored() {
        let mut s = stats();
        s.accumulate(&labels(&["referee"]), 1.0);
        s.accumulate(&labels(&["standing"]), -1.0);
        s.accumulate(&labels(&["standing"]), f64::NAN);
        assert_eq!(s.total_seconds(), 0.0);
    }

    #[test]
    fn fixed_clock_is_reciprocal_rate() {
        let mut clock = FrameClock::fixed(25.0);
        assert!((clock.tick() - 0.04).abs() < 1e-12);
        assert!((clock.tick() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn measured_clock_uses_deltas() {
        let mut clock = FrameClock::measured(30.0);
        let t0 = Instant::now();
        assert!((clock.tick_at(t0) - 1.0 / 30.0).abs() < 1e-6);
        let t1 = t0 + Duration::from_millis(50);
        assert!((clock.tick_at(t1) - 0.05).abs() < 1e-6);
    }
}

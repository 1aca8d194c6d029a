//! Frame classification into activity labels.
//!
//! Each detection's class text is matched case-insensitively against every
//! label's keyword group. Matching is independent per detection and per
//! group, so one frame can carry several labels at once (e.g. a
//! "Standing_guard" box and a "Ground_control" box yield both `standing` and
//! `ground`). Labels are not forced to be mutually exclusive.

use anyhow::{anyhow, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::detect::Detection;

/// Color for detections that match no label group.
pub const UNRECOGNIZED_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Named activity category. The set of labels is defined by configuration.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLabel(String);

impl ActivityLabel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One label: its keyword group and overlay color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    pub keywords: Vec<String>,
    /// RGB overlay color.
    pub color: [u8; 3],
}

impl LabelSpec {
    pub fn new(name: &str, keywords: &[&str], color: [u8; 3]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            color,
        }
    }
}

/// Default label set: standing (green), clinch (yellow), ground (red).
pub fn default_labels() -> Vec<LabelSpec> {
    vec![
        LabelSpec::new("standing", &["standing"], [0, 255, 0]),
        LabelSpec::new("clinch", &["clinch"], [255, 255, 0]),
        LabelSpec::new("ground", &["ground"], [255, 0, 0]),
    ]
}

#[derive(Clone, Debug)]
struct CompiledLabel {
    label: ActivityLabel,
    keywords: Vec<String>,
    color: Rgb<u8>,
}

impl CompiledLabel {
    fn matches(&self, class_lower: &str) -> bool {
        self.keywords.iter().any(|k| class_lower.contains(k.as_str()))
    }
}

/// Keyword classifier over an ordered label set.
///
/// Label order is stable and drives both the stats panel layout and the
/// color chosen for a detection that matches more than one group.
#[derive(Clone, Debug)]
pub struct StateClassifier {
    labels: Vec<CompiledLabel>,
}

impl StateClassifier {
    pub fn new(specs: &[LabelSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(anyhow!("label set must not be empty"));
        }
        let mut labels: Vec<CompiledLabel> = Vec::with_capacity(specs.len());
        for spec in specs {
            let label = ActivityLabel::new(spec.name.trim());
            if label.as_str().is_empty() {
                return Err(anyhow!("label name must not be empty"));
            }
            if labels.iter().any(|l| l.label == label) {
                return Err(anyhow!("duplicate label '{}'", label));
            }
            let keywords: Vec<String> = spec
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                return Err(anyhow!("label '{}' has no keywords", label));
            }
            labels.push(CompiledLabel {
                label,
                keywords,
                color: Rgb(spec.color),
            });
        }
        Ok(Self { labels })
    }

    /// Labels in stable display order.
    pub fn labels(&self) -> impl Iterator<Item = &ActivityLabel> {
        self.labels.iter().map(|l| &l.label)
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn color_of(&self, label: &ActivityLabel) -> Rgb<u8> {
        self.labels
            .iter()
            .find(|l| &l.label == label)
            .map(|l| l.color)
            .unwrap_or(UNRECOGNIZED_COLOR)
    }

    /// First label (in display order) whose keywords match `class`.
    pub fn group_of(&self, class: &str) -> Option<&ActivityLabel> {
        let lower = class.to_lowercase();
        self.labels
            .iter()
            .find(|l| l.matches(&lower))
            .map(|l| &l.label)
    }

    /// Box color for a detection class.
    pub fn color_for_class(&self, class: &str) -> Rgb<u8> {
        self.group_of(class)
            .map(|label| self.color_of(label))
            .unwrap_or(UNRECOGNIZED_COLOR)
    }

    /// Every label matched by any detection in the frame.
    pub fn classify(&self, detections: &[Detection]) -> BTreeSet<ActivityLabel> {
        let mut out = BTreeSet::new();
        for det in detections {
            let lower = det.class.to_lowercase();
            for l in &self.labels {
                if l.matches(&lower) {
                    out.insert(l.label.clone());
                }
            }
        }
        out
    }
}

impl Default for StateClassifier {
    fn default() -> Self {
        let labels = default_labels()
            .into_iter()
            .map(|spec| CompiledLabel {
                label: ActivityLabel::new(spec.name),
                keywords: spec.keywords,
                color: Rgb(spec.color),
            })
            .collect();
        Self { labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: &str, conf: f32) -> Detection {
        Detection::new(class, conf, 50.0, 50.0, 10.0, 10.0)
    }

    #[test]
    fn labels_are_non_exclusive() {
        let classifier = StateClassifier::default();
        let labels = classifier.classify(&[det("Standing_guard", 0.9), det("Ground_control", 0.8)]);
        let expected: BTreeSet<_> = [ActivityLabel::new("standing"), ActivityLabel::new("ground")]
            .into_iter()
            .collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let classifier = StateClassifier::default();
        let labels = classifier.classify(&[det("CLINCH-against-cage", 0.7)]);
        assert!(labels.contains(&ActivityLabel::new("clinch")));
    }

    #[test]
    fn unknown_classes_contribute_nothing() {
        let classifier = StateClassifier::default();
        assert!(classifier.classify(&[det("referee", 0.99)]).is_empty());
        assert!(classifier.classify(&[]).is_empty());
        assert_eq!(classifier.color_for_class("referee"), UNRECOGNIZED_COLOR);
    }

    #[test]
    fn one_detection_may_match_several_groups() {
        let classifier = StateClassifier::default();
        let labels = classifier.classify(&[det("standing_to_ground_transition", 0.5)]);
        assert_eq!(labels.len(), 2);
        // Color follows the first group in display order.
        assert_eq!(
            classifier.color_for_class("standing_to_ground_transition"),
            Rgb([0, 255, 0])
        );
    }

    #[test]
    fn palette_follows_label_groups() {
        let classifier = StateClassifier::default();
        assert_eq!(classifier.color_for_class("Standing"), Rgb([0, 255, 0]));
        assert_eq!(classifier.color_for_class("Clinch"), Rgb([255, 255, 0]));
        assert_eq!(classifier.color_for_class("Ground"), Rgb([255, 0, 0]));
    }

    #[test]
    fn rejects_bad_label_sets() {
        assert!(StateClassifier::new(&[]).is_err());
        let dup = vec![
            LabelSpec::new("a", &["x"], [0, 0, 0]),
            LabelSpec::new("A", &["y"], [0, 0, 0]),
        ];
        assert!(StateClassifier::new(&dup).is_err());
        assert!(StateClassifier::new(&[LabelSpec::new("a", &[" "], [0, 0, 0])]).is_err());
    }

    #[test]
    fn custom_labels_extend_the_set() {
        let mut specs = default_labels();
        specs.push(LabelSpec::new("scramble", &["scramble", "transition"], [0, 128, 255]));
        let classifier = StateClassifier::new(&specs).unwrap();
        assert_eq!(classifier.label_count(), 4);
        let labels = classifier.classify(&[det("Scramble", 0.6)]);
        assert!(labels.contains(&ActivityLabel::new("scramble")));
    }
}

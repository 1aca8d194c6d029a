use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classify::{default_labels, LabelSpec, StateClassifier};
use crate::output::ImageFormat;
use crate::pipeline::LiveConfig;

const DEFAULT_RECORD_FPS: f64 = 30.0;
const DEFAULT_OUTPUT_DIR: &str = "annotated";
const DEFAULT_LIVE_REFERENCE: &str = "stub://live";
const DEFAULT_MAX_FPS: u32 = 30;

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    record_fps: Option<f64>,
    output: Option<OutputConfigFile>,
    live: Option<LiveConfigFile>,
    labels: Option<Vec<LabelSpec>>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    format: Option<ImageFormat>,
}

#[derive(Deserialize, Default)]
struct LiveConfigFile {
    reference: Option<String>,
    max_fps: Option<u32>,
    workflow_id: Option<String>,
    api_key: Option<String>,
}

impl std::fmt::Debug for LiveConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfigFile")
            .field("reference", &self.reference)
            .field("max_fps", &self.max_fps)
            .field("workflow_id", &self.workflow_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AnnotateConfig {
    /// Rate the prediction records were produced at.
    pub record_fps: f64,
    pub output_dir: PathBuf,
    pub output_format: ImageFormat,
    pub live: LiveConfig,
    /// Label set in display order.
    pub labels: Vec<LabelSpec>,
}

impl AnnotateConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DWELL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Classifier over the configured label set.
    pub fn classifier(&self) -> Result<StateClassifier> {
        StateClassifier::new(&self.labels)
    }

    fn from_file(file: AnnotateConfigFile) -> Self {
        let output = file.output.unwrap_or_default();
        let live = file.live.unwrap_or_default();
        Self {
            record_fps: file.record_fps.unwrap_or(DEFAULT_RECORD_FPS),
            output_dir: output
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            output_format: output.format.unwrap_or_default(),
            live: LiveConfig {
                reference: live
                    .reference
                    .unwrap_or_else(|| DEFAULT_LIVE_REFERENCE.to_string()),
                max_fps: live.max_fps.unwrap_or(DEFAULT_MAX_FPS),
                workflow_id: live.workflow_id.unwrap_or_default(),
                api_key: live.api_key,
            },
            labels: file.labels.unwrap_or_else(default_labels),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(fps) = std::env::var("DWELL_RECORD_FPS") {
            self.record_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("DWELL_RECORD_FPS must be a number of frames per second"))?;
        }
        if let Ok(dir) = std::env::var("DWELL_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(fps) = std::env::var("DWELL_MAX_FPS") {
            self.live.max_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("DWELL_MAX_FPS must be a non-negative integer"))?;
        }
        if let Ok(reference) = std::env::var("DWELL_LIVE_REFERENCE") {
            if !reference.trim().is_empty() {
                self.live.reference = reference;
            }
        }
        if let Ok(workflow) = std::env::var("DWELL_WORKFLOW_ID") {
            if !workflow.trim().is_empty() {
                self.live.workflow_id = workflow;
            }
        }
        if let Ok(key) = std::env::var("DWELL_API_KEY") {
            if !key.trim().is_empty() {
                self.live.api_key = Some(key);
            }
        }
        if let Ok(labels) = std::env::var("DWELL_LABELS") {
            let names = split_csv(&labels);
            if !names.is_empty() {
                self.labels = select_labels(&self.labels, &names)?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !(self.record_fps.is_finite() && self.record_fps > 0.0) {
            return Err(anyhow!(
                "record fps must be a positive number, got {}",
                self.record_fps
            ));
        }
        if self.live.reference.trim().is_empty() {
            return Err(anyhow!("live reference must not be empty"));
        }
        for label in &mut self.labels {
            label.name = label.name.trim().to_lowercase();
            label.keywords = label
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
        }
        StateClassifier::new(&self.labels)?;
        Ok(())
    }
}

/// Restricts and reorders `labels` to `names`.
fn select_labels(labels: &[LabelSpec], names: &[String]) -> Result<Vec<LabelSpec>> {
    names
        .iter()
        .map(|name| {
            labels
                .iter()
                .find(|label| label.name.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| anyhow!("DWELL_LABELS names unknown label '{}'", name))
        })
        .collect()
}

fn read_config_file(path: &Path) -> Result<AnnotateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

use crate::architecture::TestDefaults;
use crate::errors::DetectError;
use common::{env_flag, env_or};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub use common::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" | "gpu" => Ok(ExecutionProvider::Cuda),
            other => Err(format!("unknown execution provider {other:?}")),
        }
    }
}

/// Process-level settings for the inference service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub environment: Environment,
    /// Architecture description (JSON).
    pub model_config_path: PathBuf,
    /// Directory holding the exported graphs the architecture names.
    pub checkpoint_path: PathBuf,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
    /// Defer the model load to the first request instead of start-up.
    pub lazy_load: bool,
}

impl ServiceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let model_config_path = env::var("MODEL_CONFIG_PATH")
            .unwrap_or_else(|_| "/models/cascade_tabnet/architecture.json".to_string())
            .into();

        let checkpoint_path = env::var("MODEL_CHECKPOINT_PATH")
            .unwrap_or_else(|_| "/models/cascade_tabnet".to_string())
            .into();

        let execution_provider = env::var("EXECUTION_PROVIDER")
            .ok()
            .map(|s| s.parse::<ExecutionProvider>())
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))?
            .unwrap_or_default();

        let intra_threads = env_or("INTRA_THREADS", 4usize)?;
        let lazy_load = env_flag("LAZY_LOAD", false)?;

        Ok(Self {
            environment,
            model_config_path,
            checkpoint_path,
            execution_provider,
            intra_threads,
            lazy_load,
        })
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            model_config_path: "/models/architecture.json".into(),
            checkpoint_path: "/models".into(),
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 1,
            lazy_load: false,
        }
    }
}

/// Output size cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionLimit {
    /// Use the model's `max_per_image`.
    #[default]
    ModelDefault,
    Unbounded,
    AtMost(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOrder {
    /// Descending score across all classes.
    #[default]
    Score,
    /// Grouped by class id, descending score within a class.
    Class,
}

/// Per-request options. Unset fields fall back to the model's defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub confidence_threshold: Option<f32>,
    pub nms_iou_threshold: Option<f32>,
    pub max_detections: DetectionLimit,
    pub max_per_class: Option<usize>,
    pub order: DetectionOrder,
}

impl InferenceConfig {
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_nms_iou_threshold(mut self, threshold: f32) -> Self {
        self.nms_iou_threshold = Some(threshold);
        self
    }

    pub fn with_max_detections(mut self, limit: DetectionLimit) -> Self {
        self.max_detections = limit;
        self
    }

    pub fn with_max_per_class(mut self, limit: usize) -> Self {
        self.max_per_class = Some(limit);
        self
    }

    pub fn with_order(mut self, order: DetectionOrder) -> Self {
        self.order = order;
        self
    }

    /// Fill unset options from `defaults` and validate the result.
    pub fn resolve(&self, defaults: &TestDefaults) -> Result<PostProcessParams, DetectError> {
        let confidence_threshold = self
            .confidence_threshold
            .unwrap_or(defaults.score_threshold);
        let nms_iou_threshold = self.nms_iou_threshold.unwrap_or(defaults.nms_iou_threshold);

        check_unit_interval("confidence_threshold", confidence_threshold)?;
        check_unit_interval("nms_iou_threshold", nms_iou_threshold)?;

        let max_detections = match self.max_detections {
            DetectionLimit::ModelDefault => defaults.max_per_image,
            DetectionLimit::Unbounded => None,
            DetectionLimit::AtMost(n) => Some(n),
        };

        Ok(PostProcessParams {
            confidence_threshold,
            nms_iou_threshold,
            max_detections,
            max_per_class: self.max_per_class,
            order: self.order,
        })
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<(), DetectError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DetectError::InvalidConfiguration(format!(
            "{name} must lie in [0, 1], got {value}"
        )))
    }
}

/// Fully resolved post-processing parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessParams {
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
    pub max_detections: Option<usize>,
    pub max_per_class: Option<usize>,
    pub order: DetectionOrder,
}

//! Architecture description loaded from the model's config resource.
//!
//! Everything model-specific lives here: the label set, input geometry,
//! proposal filtering, the cascade stage list with each stage's box-offset
//! normalization, and the default post-processing thresholds.

use crate::errors::LoadError;
use preprocess::PreprocessConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Position of the background column in the classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundPosition {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProposalConfig {
    pub pre_nms_top_k: usize,
    pub iou_threshold: f32,
    pub max_proposals: usize,
    /// Proposals narrower or shorter than this (canvas pixels) are dropped.
    pub min_box_size: f32,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            pre_nms_top_k: 1000,
            iou_threshold: 0.7,
            max_proposals: 1000,
            min_box_size: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StageConfig {
    /// Graph file, relative to the checkpoint directory.
    pub graph: String,
    #[serde(default)]
    pub target_means: [f32; 4],
    #[serde(default = "default_target_stds")]
    pub target_stds: [f32; 4],
    /// One offset set shared by all classes (4 values per region) instead
    /// of one set per class.
    #[serde(default = "default_true")]
    pub class_agnostic: bool,
}

fn default_target_stds() -> [f32; 4] {
    [0.1, 0.1, 0.2, 0.2]
}

fn default_true() -> bool {
    true
}

/// Runtime graph layout of the exported checkpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backbone: String,
    pub rpn: String,
    pub image_input: String,
    /// Backbone outputs, in the order later graphs consume them.
    pub features: Vec<String>,
    pub proposal_boxes: String,
    pub proposal_scores: String,
    pub rois_input: String,
    pub cls_output: String,
    pub bbox_output: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backbone: "backbone.onnx".to_string(),
            rpn: "rpn.onnx".to_string(),
            image_input: "image".to_string(),
            features: ["p2", "p3", "p4", "p5", "p6"]
                .into_iter()
                .map(String::from)
                .collect(),
            proposal_boxes: "proposals".to_string(),
            proposal_scores: "objectness".to_string(),
            rois_input: "rois".to_string(),
            cls_output: "cls_score".to_string(),
            bbox_output: "bbox_pred".to_string(),
        }
    }
}

/// Post-processing defaults shipped with the model.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TestDefaults {
    pub score_threshold: f32,
    pub nms_iou_threshold: f32,
    pub max_per_image: Option<usize>,
}

impl Default for TestDefaults {
    fn default() -> Self {
        Self {
            score_threshold: 0.05,
            nms_iou_threshold: 0.5,
            max_per_image: Some(100),
        }
    }
}

/// How cell detections are attached to table detections.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub cell_label: String,
    /// Minimum fraction of a cell's area that must lie inside a table.
    pub min_cell_overlap: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            cell_label: "Cell".to_string(),
            min_cell_overlap: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArchitectureConfig {
    #[serde(default)]
    pub name: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub background: BackgroundPosition,
    #[serde(default)]
    pub input: PreprocessConfig,
    #[serde(default)]
    pub graphs: GraphConfig,
    #[serde(default)]
    pub proposals: ProposalConfig,
    pub stages: Vec<StageConfig>,
    /// Average the class distributions of all stages for the final scores.
    #[serde(default = "default_true")]
    pub ensemble_scores: bool,
    #[serde(default)]
    pub test: TestDefaults,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl ArchitectureConfig {
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn label_set(&self) -> LabelSet {
        LabelSet::new(self.labels.clone())
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |msg: String| Err(LoadError::InvalidArchitecture(msg));

        if self.labels.is_empty() {
            return invalid("label set is empty".into());
        }
        if self.labels.len() > u16::MAX as usize {
            return invalid(format!("{} labels exceed the class id range", self.labels.len()));
        }
        if self.stages.is_empty() {
            return invalid("at least one cascade stage is required".into());
        }
        if let Err(msg) = self.input.validate() {
            return invalid(msg);
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.target_stds.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                return invalid(format!("stage {i} target_stds must be positive"));
            }
        }
        for (name, value) in [
            ("proposals.iou_threshold", self.proposals.iou_threshold),
            ("test.score_threshold", self.test.score_threshold),
            ("test.nms_iou_threshold", self.test.nms_iou_threshold),
            ("layout.min_cell_overlap", self.layout.min_cell_overlap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must lie in [0, 1], got {value}"));
            }
        }
        if self.proposals.max_proposals == 0 || self.proposals.pre_nms_top_k == 0 {
            return invalid("proposal limits must be positive".into());
        }
        if !self.proposals.min_box_size.is_finite() || self.proposals.min_box_size < 0.0 {
            return invalid(format!(
                "proposals.min_box_size must be finite and non-negative, got {}",
                self.proposals.min_box_size
            ));
        }
        if self.label_set().id_of(&self.layout.cell_label).is_none() {
            return invalid(format!(
                "layout.cell_label {:?} is not one of the labels",
                self.layout.cell_label
            ));
        }
        Ok(())
    }
}

/// Class id to name mapping, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    names: Arc<[String]>,
}

impl LabelSet {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names: names.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.names.iter().position(|n| n == name).map(|i| i as u16)
    }
}

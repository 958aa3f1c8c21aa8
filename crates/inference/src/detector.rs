//! Two-stage cascaded detector: backbone, proposal network and an ordered
//! list of refinement stages.

use crate::architecture::{ArchitectureConfig, BackgroundPosition, ProposalConfig};
use crate::backend::{FeatureBackbone, ProposalNetwork, RefinementStage, RegionProposal};
use crate::errors::{DetectError, LoadError};
use crate::processing::box_coder::DeltaBoxCoder;
use crate::processing::nms::{nms, sort_by_score_desc};
use common::span;
use ndarray::Array2;
use preprocess::ImageTensor;
use schema::BoundingBox;

/// Output of one cascade stage for a set of regions.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePrediction {
    /// Regions the stage evaluated, canvas coordinates.
    pub rois: Vec<BoundingBox>,
    /// `[N, C + 1]` class distribution, background in the last column.
    pub class_scores: Array2<f32>,
    /// `[N, 4]` (class-agnostic) or `[N, 4 * C]` box offsets.
    pub box_deltas: Array2<f32>,
}

impl StagePrediction {
    pub fn empty(num_classes: usize) -> Self {
        Self {
            rois: Vec::new(),
            class_scores: Array2::zeros((0, num_classes + 1)),
            box_deltas: Array2::zeros((0, 4)),
        }
    }

    /// Build from raw classifier logits, applying a row-wise softmax and
    /// moving the background column last.
    pub fn from_logits(
        rois: Vec<BoundingBox>,
        logits: Array2<f32>,
        box_deltas: Array2<f32>,
        background: BackgroundPosition,
    ) -> Self {
        let mut scores = logits;
        for mut row in scores.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }

        let cols = scores.ncols();
        if background == BackgroundPosition::First && cols > 1 {
            scores = Array2::from_shape_fn(scores.dim(), |(i, j)| scores[[i, (j + 1) % cols]]);
        }

        Self {
            rois,
            class_scores: scores,
            box_deltas,
        }
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_scores.ncols().saturating_sub(1)
    }

    pub fn is_class_agnostic(&self) -> bool {
        self.box_deltas.ncols() == 4
    }

    /// Offsets row `row` predicts for foreground class `class`.
    pub fn offsets(&self, row: usize, class: usize) -> [f32; 4] {
        let base = if self.is_class_agnostic() { 0 } else { class * 4 };
        let r = self.box_deltas.row(row);
        [r[base], r[base + 1], r[base + 2], r[base + 3]]
    }

    /// Highest-scoring foreground class of `row`; ties go to the lower id.
    pub fn best_foreground(&self, row: usize) -> usize {
        let scores = self.class_scores.row(row);
        let mut best = 0;
        for c in 1..self.num_classes() {
            if scores[c] > scores[best] {
                best = c;
            }
        }
        best
    }

    /// Check row counts and column widths against the model layout.
    pub fn check_shape(&self, num_classes: usize, context: &str) -> Result<(), DetectError> {
        let n = self.rois.len();
        if self.class_scores.nrows() != n || self.box_deltas.nrows() != n {
            return Err(DetectError::shape(format!(
                "{context}: {n} regions but class scores {:?} and box deltas {:?}",
                self.class_scores.dim(),
                self.box_deltas.dim()
            )));
        }
        if self.class_scores.ncols() != num_classes + 1 {
            return Err(DetectError::shape(format!(
                "{context}: expected {} score columns, got {}",
                num_classes + 1,
                self.class_scores.ncols()
            )));
        }
        let deltas = self.box_deltas.ncols();
        if deltas != 4 && deltas != 4 * num_classes {
            return Err(DetectError::shape(format!(
                "{context}: expected 4 or {} offset columns, got {deltas}",
                4 * num_classes
            )));
        }
        Ok(())
    }
}

struct CascadeStage {
    head: Box<dyn RefinementStage>,
    coder: DeltaBoxCoder,
    class_agnostic: bool,
}

pub struct CascadedDetector {
    backbone: Box<dyn FeatureBackbone>,
    proposals: Box<dyn ProposalNetwork>,
    stages: Vec<CascadeStage>,
    proposal_config: ProposalConfig,
    num_classes: usize,
    input_size: (u32, u32),
    ensemble_scores: bool,
}

impl CascadedDetector {
    /// Assemble a detector; `heads` must match `arch.stages` one to one.
    pub fn new(
        arch: &ArchitectureConfig,
        backbone: Box<dyn FeatureBackbone>,
        proposals: Box<dyn ProposalNetwork>,
        heads: Vec<Box<dyn RefinementStage>>,
    ) -> Result<Self, LoadError> {
        if heads.len() != arch.stages.len() {
            return Err(LoadError::InvalidArchitecture(format!(
                "architecture declares {} stages but {} were provided",
                arch.stages.len(),
                heads.len()
            )));
        }

        let stages = heads
            .into_iter()
            .zip(&arch.stages)
            .map(|(head, cfg)| CascadeStage {
                head,
                coder: DeltaBoxCoder::new(cfg.target_means, cfg.target_stds),
                class_agnostic: cfg.class_agnostic,
            })
            .collect();

        Ok(Self {
            backbone,
            proposals,
            stages,
            proposal_config: arch.proposals.clone(),
            num_classes: arch.num_classes(),
            input_size: arch.input.input_size(),
            ensemble_scores: arch.ensemble_scores,
        })
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Box coder of the last stage, which produced the final offsets.
    pub fn final_coder(&self) -> DeltaBoxCoder {
        self.stages.last().map(|s| s.coder).unwrap_or_default()
    }

    /// Run the full cascade on one preprocessed image.
    ///
    /// Stage `i + 1` only ever sees the boxes stage `i` refined. The result
    /// holds the last stage's offsets and, when ensembling is enabled, the
    /// mean class distribution over all stages.
    pub fn forward(&self, image: &ImageTensor) -> Result<StagePrediction, DetectError> {
        let (width, height) = self.input_size;
        let expected = [3, height as usize, width as usize];
        if image.shape() != &expected[..] {
            return Err(DetectError::shape(format!(
                "expected image tensor {expected:?}, got {:?}",
                image.shape()
            )));
        }

        let features = {
            let _s = span!("backbone");
            self.backbone.extract(image)?
        };
        if features.is_empty() {
            return Err(DetectError::shape("backbone produced no feature maps"));
        }

        let mut regions = {
            let _s = span!("proposals");
            let raw = self.proposals.propose(&features)?;
            self.filter_proposals(raw)?
        };
        tracing::debug!(regions = regions.len(), "Proposals filtered");

        if regions.is_empty() {
            return Ok(StagePrediction::empty(self.num_classes));
        }

        let mut score_sum: Option<Array2<f32>> = None;
        let mut last = None;

        for (i, stage) in self.stages.iter().enumerate() {
            let _s = span!("cascade_stage", stage = i, regions = regions.len());

            let prediction = stage.head.refine(&regions, &features)?;
            self.check_stage(i, stage, &regions, &prediction)?;

            if self.ensemble_scores {
                match score_sum.as_mut() {
                    Some(sum) => *sum += &prediction.class_scores,
                    None => score_sum = Some(prediction.class_scores.clone()),
                }
            }

            if i + 1 < self.stages.len() {
                regions = self.refine_regions(stage, &prediction);
            }
            last = Some(prediction);
        }

        let mut prediction = last.ok_or_else(|| DetectError::shape("cascade has no stages"))?;
        if let Some(sum) = score_sum {
            prediction.class_scores = sum / self.stages.len() as f32;
        }

        Ok(prediction)
    }

    fn check_stage(
        &self,
        index: usize,
        stage: &CascadeStage,
        regions: &[BoundingBox],
        prediction: &StagePrediction,
    ) -> Result<(), DetectError> {
        let context = format!("stage {index}");
        if prediction.rois.len() != regions.len() {
            return Err(DetectError::shape(format!(
                "{context}: received {} regions but returned {}",
                regions.len(),
                prediction.rois.len()
            )));
        }
        if prediction.rois != regions {
            return Err(DetectError::shape(format!(
                "{context}: returned regions differ from the ones it was given"
            )));
        }
        prediction.check_shape(self.num_classes, &context)?;

        let expected = if stage.class_agnostic { 4 } else { 4 * self.num_classes };
        if prediction.box_deltas.ncols() != expected {
            return Err(DetectError::shape(format!(
                "{context}: expected {expected} offset columns, got {}",
                prediction.box_deltas.ncols()
            )));
        }
        Ok(())
    }

    /// Decoded boxes a stage hands to its successor.
    fn refine_regions(&self, stage: &CascadeStage, prediction: &StagePrediction) -> Vec<BoundingBox> {
        let (width, height) = (self.input_size.0 as f32, self.input_size.1 as f32);
        (0..prediction.len())
            .map(|i| {
                let class = if stage.class_agnostic { 0 } else { prediction.best_foreground(i) };
                stage
                    .coder
                    .decode(&prediction.rois[i], &prediction.offsets(i, class), width, height)
            })
            .collect()
    }

    fn filter_proposals(&self, raw: Vec<RegionProposal>) -> Result<Vec<BoundingBox>, DetectError> {
        let cfg = &self.proposal_config;
        let (width, height) = (self.input_size.0 as f32, self.input_size.1 as f32);

        let mut boxes = Vec::with_capacity(raw.len());
        let mut scores = Vec::with_capacity(raw.len());
        for p in raw {
            if !p.bbox.is_finite() || !p.objectness.is_finite() {
                tracing::error!(bbox = ?p.bbox, objectness = p.objectness, "Non-finite region proposal");
                return Err(DetectError::CorruptPrediction(format!(
                    "non-finite proposal {:?} with objectness {}",
                    p.bbox, p.objectness
                )));
            }
            let b = p.bbox.clamp_to(width, height);
            if b.width() > cfg.min_box_size && b.height() > cfg.min_box_size {
                boxes.push(b);
                scores.push(p.objectness);
            }
        }

        let mut order = sort_by_score_desc(&scores);
        order.truncate(cfg.pre_nms_top_k);
        let top_boxes: Vec<BoundingBox> = order.iter().map(|&i| boxes[i]).collect();
        let top_scores: Vec<f32> = order.iter().map(|&i| scores[i]).collect();

        let mut keep = nms(&top_boxes, &top_scores, cfg.iou_threshold);
        keep.truncate(cfg.max_proposals);

        Ok(keep.into_iter().map(|i| top_boxes[i]).collect())
    }
}

//! Scripted in-memory model: no graph files, fixed proposals and a stage
//! whose class is decided by region geometry.

#![allow(dead_code)]

use inference::architecture::{ArchitectureConfig, BackgroundPosition};
use inference::backend::{FeatureBackbone, FeatureMaps, ProposalNetwork, RefinementStage, RegionProposal};
use inference::{BoundingBox, DetectError, ModelArtifact, StagePrediction};
use ndarray::Array2;
use preprocess::ImageTensor;

/// 64x64 canvas, two class-agnostic stages with unit stds.
pub const ARCH: &str = r#"{
    "name": "scripted",
    "labels": ["Bordered", "Cell", "Borderless"],
    "input": { "width": 64, "height": 64 },
    "stages": [
        { "graph": "stage0.onnx", "target_stds": [1, 1, 1, 1] },
        { "graph": "stage1.onnx", "target_stds": [1, 1, 1, 1] }
    ]
}"#;

pub struct ImageBackbone;

impl FeatureBackbone for ImageBackbone {
    fn extract(&self, image: &ImageTensor) -> Result<FeatureMaps, DetectError> {
        let mut maps = FeatureMaps::new();
        maps.push("p2", image.data().clone().into_dyn());
        Ok(maps)
    }
}

pub struct FixedProposals(pub Vec<RegionProposal>);

impl ProposalNetwork for FixedProposals {
    fn propose(&self, _features: &FeatureMaps) -> Result<Vec<RegionProposal>, DetectError> {
        Ok(self.0.clone())
    }
}

/// Large regions are tables (Bordered above the middle, Borderless below),
/// small ones are cells. Confidence grows towards the bottom-right.
pub struct GeometryStage;

impl RefinementStage for GeometryStage {
    fn refine(
        &self,
        regions: &[BoundingBox],
        _features: &FeatureMaps,
    ) -> Result<StagePrediction, DetectError> {
        let mut logits = Array2::from_elem((regions.len(), 4), -2.0f32);
        for (i, r) in regions.iter().enumerate() {
            let class = if r.area() > 500.0 {
                if r.y_min < 32.0 { 0 } else { 2 }
            } else {
                1
            };
            logits[[i, class]] = 2.0 + (r.x_min + r.y_min) / 20.0;
        }
        Ok(StagePrediction::from_logits(
            regions.to_vec(),
            logits,
            Array2::zeros((regions.len(), 4)),
            BackgroundPosition::Last,
        ))
    }
}

pub fn proposal(x0: f32, y0: f32, x1: f32, y1: f32, objectness: f32) -> RegionProposal {
    RegionProposal {
        bbox: BoundingBox::new(x0, y0, x1, y1),
        objectness,
    }
}

/// Two tables, the upper one holding two cells.
pub fn page_proposals() -> Vec<RegionProposal> {
    vec![
        proposal(2.0, 2.0, 62.0, 40.0, 0.9),
        proposal(4.0, 4.0, 20.0, 20.0, 0.8),
        proposal(22.0, 4.0, 40.0, 20.0, 0.7),
        proposal(2.0, 44.0, 62.0, 62.0, 0.6),
    ]
}

pub fn artifact_with(proposals: Vec<RegionProposal>) -> ModelArtifact {
    let arch = ArchitectureConfig::from_json(ARCH).unwrap();
    ModelArtifact::new(
        arch,
        Box::new(ImageBackbone),
        Box::new(FixedProposals(proposals)),
        vec![Box::new(GeometryStage), Box::new(GeometryStage)],
    )
    .unwrap()
}

pub fn artifact() -> ModelArtifact {
    artifact_with(page_proposals())
}

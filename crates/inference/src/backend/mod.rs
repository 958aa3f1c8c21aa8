use crate::detector::StagePrediction;
use crate::errors::DetectError;
use ndarray::ArrayD;
use preprocess::ImageTensor;
use schema::BoundingBox;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Named backbone outputs, in the order the graphs produced them.
#[derive(Debug, Clone, Default)]
pub struct FeatureMaps {
    maps: Vec<(String, ArrayD<f32>)>,
}

impl FeatureMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, map: ArrayD<f32>) {
        self.maps.push((name.into(), map));
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.maps.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Look up `names` in order, failing on the first missing map.
    pub fn ordered<'a>(&'a self, names: &'a [String]) -> Result<Vec<(&'a str, &'a ArrayD<f32>)>, DetectError> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .map(|m| (name.as_str(), m))
                    .ok_or_else(|| DetectError::shape(format!("missing feature map {name:?}")))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Candidate region from the proposal network, in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionProposal {
    pub bbox: BoundingBox,
    pub objectness: f32,
}

/// Image tensor to feature maps.
pub trait FeatureBackbone: Send + Sync {
    fn extract(&self, image: &ImageTensor) -> Result<FeatureMaps, DetectError>;
}

/// Feature maps to raw (unfiltered) region proposals.
pub trait ProposalNetwork: Send + Sync {
    fn propose(&self, features: &FeatureMaps) -> Result<Vec<RegionProposal>, DetectError>;
}

/// One cascade stage: pools features inside each region and scores it.
///
/// The returned prediction must have one row per entry of `regions`, in the
/// same order.
pub trait RefinementStage: Send + Sync {
    fn refine(
        &self,
        regions: &[BoundingBox],
        features: &FeatureMaps,
    ) -> Result<StagePrediction, DetectError>;
}

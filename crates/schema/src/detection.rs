use crate::bbox::BoundingBox;
use serde::{Deserialize, Serialize};

/// Final output unit of the pipeline.
///
/// `bbox` is in original-image pixel coordinates and `score` lies in `[0, 1]`.
/// `label` is the name the model's label set gives to `class_id`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Detection {
    pub label: String,
    pub class_id: u16,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub score: f32,
}

impl Detection {
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }
}

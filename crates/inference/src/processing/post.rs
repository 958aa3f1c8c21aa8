use crate::architecture::LabelSet;
use crate::config::{DetectionOrder, PostProcessParams};
use crate::detector::StagePrediction;
use crate::errors::DetectError;
use crate::processing::box_coder::DeltaBoxCoder;
use crate::processing::nms::{nms, sort_by_score_desc};
use preprocess::TransformRecord;
use schema::{BoundingBox, Detection};

/// Turns the final stage output into labelled detections on the original
/// image.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    labels: LabelSet,
}

impl PostProcessor {
    pub fn new(labels: LabelSet) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Per class: decode, map to the original image, threshold, NMS, cap.
    /// Then apply the overall cap and the requested order.
    #[tracing::instrument(skip_all, fields(regions = prediction.len()))]
    pub fn process(
        &self,
        prediction: &StagePrediction,
        coder: &DeltaBoxCoder,
        transform: &TransformRecord,
        params: &PostProcessParams,
    ) -> Result<Vec<Detection>, DetectError> {
        let num_classes = self.labels.len();
        prediction.check_shape(num_classes, "final prediction")?;
        check_scores(prediction)?;

        let canvas_w = transform.input_width as f32;
        let canvas_h = transform.input_height as f32;

        let mut detections = Vec::new();

        for (class, label) in self.labels.iter().enumerate() {
            let mut boxes: Vec<BoundingBox> = Vec::new();
            let mut scores: Vec<f32> = Vec::new();

            for (row, roi) in prediction.rois.iter().enumerate() {
                let score = prediction.class_scores[[row, class]];
                if score < params.confidence_threshold {
                    continue;
                }

                let decoded = coder.decode(roi, &prediction.offsets(row, class), canvas_w, canvas_h);
                let bbox = transform.to_original(&decoded);
                if !bbox.is_finite() {
                    tracing::error!(row, class, bbox = ?bbox, "Non-finite decoded box");
                    return Err(DetectError::CorruptPrediction(format!(
                        "non-finite box {bbox:?} for region {row}, class {class}"
                    )));
                }
                if bbox.is_empty() {
                    continue;
                }

                boxes.push(bbox);
                scores.push(score);
            }

            let mut keep = nms(&boxes, &scores, params.nms_iou_threshold);
            if let Some(cap) = params.max_per_class {
                keep.truncate(cap);
            }

            detections.extend(keep.into_iter().map(|i| Detection {
                label: label.to_string(),
                class_id: class as u16,
                bbox: boxes[i],
                score: scores[i],
            }));
        }

        if let Some(max) = params.max_detections
            && detections.len() > max
        {
            detections = by_score(detections);
            detections.truncate(max);
        }

        let detections = match params.order {
            DetectionOrder::Score => by_score(detections),
            DetectionOrder::Class => {
                // stable: score order within a class is kept
                detections.sort_by_key(|d| d.class_id);
                detections
            }
        };

        tracing::debug!(count = detections.len(), "Detections produced");
        Ok(detections)
    }
}

fn by_score(detections: Vec<Detection>) -> Vec<Detection> {
    let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
    let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
    sort_by_score_desc(&scores)
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

fn check_scores(prediction: &StagePrediction) -> Result<(), DetectError> {
    if let Some(((row, col), &score)) = prediction
        .class_scores
        .indexed_iter()
        .find(|(_, s)| !(0.0..=1.0).contains(*s))
    {
        tracing::error!(row, col, score, "Class score outside [0, 1]");
        return Err(DetectError::CorruptPrediction(format!(
            "score {score} at region {row}, column {col}"
        )));
    }
    Ok(())
}

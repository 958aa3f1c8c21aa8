use schema::BoundingBox;
use std::cmp::Ordering;

/// Indices of `scores` in descending order; equal scores keep input order.
pub fn sort_by_score_desc(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order
}

/// Greedy non-maximum suppression.
///
/// Returns the kept indices, highest score first. A candidate is removed
/// when its IoU with an already kept box is strictly greater than
/// `iou_threshold`, so every kept pair satisfies `iou <= iou_threshold`.
pub fn nms(boxes: &[BoundingBox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());

    let order = sort_by_score_desc(scores);
    let mut suppressed = vec![false; boxes.len()];
    let mut keep = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &order[pos + 1..] {
            if !suppressed[j] && boxes[i].iou(&boxes[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

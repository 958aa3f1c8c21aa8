mod support;

use inference::{
    DetectError, DetectionLimit, DetectionOrder, InferenceConfig, InferenceService, RawImage,
};
use support::{artifact, artifact_with, page_proposals, proposal};

fn gradient_image(width: u32, height: u32) -> RawImage {
    let pixels = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
    RawImage::new(width, height, 3, pixels)
}

fn service() -> InferenceService {
    InferenceService::from_artifact(artifact())
}

#[test]
fn test_all_zero_image_with_defaults() {
    let service = service();
    let image = RawImage::filled(100, 100, 3, 0);

    let detections = service.detect(&image, &InferenceConfig::default()).unwrap();

    assert_eq!(detections.len(), 4);
    for d in &detections {
        assert!(d.score >= 0.05 && d.score <= 1.0);
    }
}

#[test]
fn test_zero_width_image_is_invalid() {
    let service = service();
    let image = RawImage::new(0, 100, 3, vec![]);

    let err = service.detect(&image, &InferenceConfig::default()).unwrap_err();
    assert!(matches!(err, DetectError::InvalidImage(_)));
}

#[test]
fn test_unsupported_channels_is_invalid() {
    let service = service();
    let image = RawImage::filled(10, 10, 4, 0);

    let err = service.detect(&image, &InferenceConfig::default()).unwrap_err();
    assert!(matches!(err, DetectError::InvalidImage(_)));
}

#[test]
fn test_grayscale_image_accepted() {
    let service = service();
    let image = RawImage::filled(100, 100, 1, 200);

    assert!(service.detect(&image, &InferenceConfig::default()).is_ok());
}

#[test]
fn test_boxes_mapped_to_original_image() {
    let service = service();
    let image = gradient_image(100, 100);

    let detections = service.detect(&image, &InferenceConfig::default()).unwrap();

    // highest score first: the lower table
    let best = &detections[0];
    assert_eq!(best.label, "Borderless");
    assert!((best.bbox.x_min - 3.125).abs() < 1e-3, "{:?}", best.bbox);
    assert!((best.bbox.y_min - 68.75).abs() < 1e-3, "{:?}", best.bbox);
    assert!((best.bbox.x_max - 96.875).abs() < 1e-3, "{:?}", best.bbox);
    assert!((best.bbox.y_max - 96.875).abs() < 1e-3, "{:?}", best.bbox);
}

#[test]
fn test_detections_within_bounds_and_nms_invariant() {
    // Overlapping cells so per-class suppression has work to do
    let mut proposals = page_proposals();
    proposals.push(proposal(8.0, 4.0, 24.0, 20.0, 0.85));
    proposals.push(proposal(4.0, 8.0, 20.0, 24.0, 0.65));
    let service = InferenceService::from_artifact(artifact_with(proposals));
    let image = gradient_image(160, 90);

    for iou in [0.1, 0.3, 0.5, 0.9] {
        let config = InferenceConfig::default()
            .with_confidence_threshold(0.01)
            .with_nms_iou_threshold(iou)
            .with_max_detections(DetectionLimit::Unbounded);
        let detections = service.detect(&image, &config).unwrap();

        for d in &detections {
            assert!(d.bbox.x_min >= 0.0 && d.bbox.x_max <= 160.0, "{:?}", d.bbox);
            assert!(d.bbox.y_min >= 0.0 && d.bbox.y_max <= 90.0, "{:?}", d.bbox);
            assert!(d.score >= 0.01 && d.score <= 1.0);
        }
        for (i, a) in detections.iter().enumerate() {
            for b in &detections[i + 1..] {
                if a.class_id == b.class_id {
                    assert!(a.iou(b) <= iou, "same-class IoU {} > {iou}", a.iou(b));
                }
            }
        }
    }
}

#[test]
fn test_deterministic() {
    let service = service();
    let image = gradient_image(123, 77);
    let config = InferenceConfig::default().with_confidence_threshold(0.01);

    let first = service.detect(&image, &config).unwrap();
    let second = service.detect(&image, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_raising_threshold_never_increases_count() {
    let service = service();
    let image = gradient_image(100, 100);

    let mut previous = usize::MAX;
    for t in [0.0, 0.01, 0.5, 0.96, 0.97, 0.99, 1.0] {
        let config = InferenceConfig::default()
            .with_confidence_threshold(t)
            .with_max_detections(DetectionLimit::Unbounded);
        let count = service.detect(&image, &config).unwrap().len();
        assert!(count <= previous, "threshold {t}: {count} > {previous}");
        previous = count;
    }
}

#[test]
fn test_max_detections_one_keeps_best() {
    let service = service();
    let config = InferenceConfig::default().with_max_detections(DetectionLimit::AtMost(1));

    let detections = service.detect(&gradient_image(100, 100), &config).unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, "Borderless");
}

#[test]
fn test_class_order() {
    let service = service();
    let config = InferenceConfig::default().with_order(DetectionOrder::Class);

    let detections = service.detect(&gradient_image(100, 100), &config).unwrap();
    let ids: Vec<u16> = detections.iter().map(|d| d.class_id).collect();
    assert_eq!(ids, vec![0, 1, 1, 2]);
    // score order inside the cell class
    assert!(detections[1].score >= detections[2].score);
}

#[test]
fn test_out_of_range_threshold_rejected() {
    let service = service();
    let config = InferenceConfig::default().with_confidence_threshold(1.5);

    let err = service.detect(&gradient_image(10, 10), &config).unwrap_err();
    assert!(matches!(err, DetectError::InvalidConfiguration(_)));
}

#[test]
fn test_no_proposals_gives_no_detections() {
    let service = InferenceService::from_artifact(artifact_with(vec![]));

    let detections = service
        .detect(&gradient_image(50, 50), &InferenceConfig::default())
        .unwrap();
    assert!(detections.is_empty());
}

#[test]
fn test_detect_page_groups_cells() {
    let service = service();

    let page = service
        .detect_page(&gradient_image(100, 100), &InferenceConfig::default(), 2)
        .unwrap();

    assert_eq!(page.page_num, 2);
    assert_eq!(page.tables.len(), 2);
    assert_eq!(page.tables[0].label, "Bordered");
    assert_eq!(page.tables[0].cells.len(), 2);
    assert!(page.tables[1].cells.is_empty());
    assert!(page.loose_cells.is_empty());

    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["bbox"]["width"], 100.0);
}

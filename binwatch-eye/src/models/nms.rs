//! Non-maximum suppression

use super::{BoundingBox, Detection};
use std::cmp::Ordering;

/// Keep the most confident detection of every overlapping group.
///
/// Boxes only suppress each other within the same class.
pub fn apply_nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.is_empty() {
        return detections;
    }

    detections.retain(|d| d.confidence.is_finite() && (0.0..=1.0).contains(&d.confidence));
    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

    let mut keep: Vec<Detection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[j].class_id != detections[i].class_id {
                continue;
            }
            if compute_iou(&detections[i].bbox, &detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }

        keep.push(detections[i].clone());
    }

    keep
}

/// Intersection over union of two boxes; 0 for degenerate input
pub fn compute_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    if !a.is_finite() || !b.is_finite() {
        return 0.0;
    }
    if a.width < 0.0 || a.height < 0.0 || b.width < 0.0 || b.height < 0.0 {
        return 0.0;
    }

    let inter_x_min = a.x.max(b.x);
    let inter_y_min = a.y.max(b.y);
    let inter_x_max = (a.x + a.width).min(b.x + b.width);
    let inter_y_max = (a.y + a.height).min(b.y + b.height);

    if inter_x_max <= inter_x_min || inter_y_max <= inter_y_min {
        return 0.0;
    }

    let inter_area = (inter_x_max - inter_x_min) * (inter_y_max - inter_y_min);
    let union_area = a.area() + b.area() - inter_area;

    if union_area <= 0.0 || !union_area.is_finite() {
        return 0.0;
    }

    let iou = inter_area / union_area;
    if iou.is_finite() && (0.0..=1.0).contains(&iou) {
        iou
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, confidence: f32, bbox: (f32, f32, f32, f32)) -> Detection {
        Detection {
            class_id,
            label: format!("class{}", class_id),
            confidence,
            bbox: BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
        }
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(compute_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        // 50 / 150
        assert!((compute_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_rejects_nan() {
        let a = BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(compute_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlap() {
        let kept = apply_nms(
            vec![
                det(2, 0.4, (0.0, 0.0, 10.0, 10.0)),
                det(2, 0.9, (1.0, 1.0, 10.0, 10.0)),
                det(2, 0.8, (100.0, 100.0, 10.0, 10.0)),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.8);
    }

    #[test]
    fn test_nms_is_per_class() {
        let kept = apply_nms(
            vec![
                det(2, 0.9, (0.0, 0.0, 10.0, 10.0)),
                det(5, 0.8, (0.0, 0.0, 10.0, 10.0)),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_drops_invalid_confidence() {
        let kept = apply_nms(
            vec![det(0, f32::NAN, (0.0, 0.0, 1.0, 1.0)), det(0, 1.5, (5.0, 5.0, 1.0, 1.0))],
            0.45,
        );
        assert!(kept.is_empty());
    }
}

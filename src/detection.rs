use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One detected object, in the pixel space of the uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_id: usize,
    pub name: String,
    pub confidence: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.xmax - self.xmin).max(0.) * (self.ymax - self.ymin).max(0.)
    }

    pub fn intersection(&self, other: &Detection) -> f32 {
        let w = self.xmax.min(other.xmax) - self.xmin.max(other.xmin);
        let h = self.ymax.min(other.ymax) - self.ymin.max(other.ymin);
        w.max(0.) * h.max(0.)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0. {
            return 0.;
        }
        intersection / union
    }
}

/// Highest-confidence detection of `class_name`, if any.
pub fn best_detection_for<'a>(detections: &'a [Detection], class_name: &str) -> Option<&'a Detection> {
    detections
        .iter()
        .filter(|d| d.name == class_name)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Greedy per-class suppression. Output is sorted by descending confidence
/// and holds at most `max_detections` entries.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f32,
}

/// Response body of the JSON detection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DetectionSummary {
    pub detect_objects: Vec<DetectedObject>,
    /// Names of all detected objects, joined by `", "`.
    #[schema(example = "person, dog, person")]
    pub detect_objects_names: String,
}

impl From<&[Detection]> for DetectionSummary {
    fn from(detections: &[Detection]) -> Self {
        let detect_objects: Vec<DetectedObject> = detections
            .iter()
            .map(|d| DetectedObject {
                name: d.name.clone(),
                confidence: d.confidence,
            })
            .collect();
        let detect_objects_names = detect_objects
            .iter()
            .map(|o| o.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            detect_objects,
            detect_objects_names,
        }
    }
}

#[cfg(test)]
pub(crate) fn detection(class_id: usize, name: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
    Detection {
        class_id,
        name: name.to_string(),
        confidence,
        xmin: bbox[0],
        ymin: bbox[1],
        xmax: bbox[2],
        ymax: bbox[3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = detection(0, "person", 0.9, [0., 0., 10., 10.]);
        let b = detection(0, "person", 0.8, [5., 0., 15., 10.]);
        let c = detection(0, "person", 0.8, [20., 20., 30., 30.]);

        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.);
        assert_eq!(a.iou(&a), 1.);
    }

    #[test]
    fn test_nms_keeps_most_confident_of_overlapping_same_class() {
        let detections = vec![
            detection(0, "person", 0.6, [0., 0., 100., 100.]),
            detection(0, "person", 0.9, [2., 2., 100., 100.]),
            detection(16, "dog", 0.7, [0., 0., 100., 100.]),
        ];

        let kept = non_max_suppression(detections, 0.7, 300);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].name, "person");
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].name, "dog");
    }

    #[test]
    fn test_nms_respects_max_detections() {
        let detections = (0..10)
            .map(|i| detection(0, "car", 0.5 + i as f32 * 0.01, [i as f32 * 50., 0., i as f32 * 50. + 10., 10.]))
            .collect();

        let kept = non_max_suppression(detections, 0.7, 3);

        assert_eq!(kept.len(), 3);
        assert!(kept[0].confidence > kept[1].confidence);
        assert!(kept[1].confidence > kept[2].confidence);
    }

    #[test]
    fn test_best_detection_for() {
        let detections = vec![
            detection(0, "person", 0.6, [0., 0., 10., 10.]),
            detection(0, "person", 0.9, [20., 20., 30., 30.]),
            detection(2, "car", 0.95, [0., 0., 5., 5.]),
        ];

        let best = best_detection_for(&detections, "person").unwrap();
        assert_eq!(best.confidence, 0.9);
        assert!(best_detection_for(&detections, "giraffe").is_none());
    }

    #[test]
    fn test_summary_joins_names() {
        let detections = vec![
            detection(0, "person", 0.9, [0., 0., 10., 10.]),
            detection(16, "dog", 0.8, [0., 0., 10., 10.]),
        ];

        let summary = DetectionSummary::from(detections.as_slice());

        assert_eq!(summary.detect_objects_names, "person, dog");
        assert_eq!(summary.detect_objects.len(), 2);
        assert_eq!(summary.detect_objects[1].name, "dog");

        let empty = DetectionSummary::from(&[][..]);
        assert_eq!(empty.detect_objects_names, "");
        assert!(empty.detect_objects.is_empty());
    }

    #[test]
    fn test_detection_serializes_class_field() {
        let value = serde_json::to_value(detection(3, "motorcycle", 0.5, [1., 2., 3., 4.])).unwrap();
        assert_eq!(value["class"], 3);
        assert_eq!(value["name"], "motorcycle");
    }
}

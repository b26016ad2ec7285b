#[cfg(feature = "python")]
pub mod nms_py;

use crate::utils::bbox::DetectedBox;
use itertools::Itertools;

/// Default IoU threshold used by the SSD demo applications
pub const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.5;

#[derive(Clone, Debug)]
struct Candidate<'a> {
    bbox: &'a DetectedBox,
    rank: f32,
}

impl<'a> Candidate<'a> {
    pub fn new(bbox: &'a DetectedBox) -> Self {
        Self {
            bbox,
            rank: bbox.confidence,
        }
    }
}

/// NMS algorithm implementation
///
/// The candidates are ordered by confidence (descending) with a stable sort, so candidates with
/// equal confidence keep their input order and the result is reproducible. Every candidate that
/// survives removes all the lower-ranked candidates which overlap it with IoU above the
/// threshold. The comparison is class-agnostic.
///
/// The survivors are returned in the ranking order; callers must not rely on any particular
/// order besides that.
///
/// # Parameters
/// * `detections` - decoded candidates of a single frame;
/// * `iou_threshold` - when to exclude the box from the set.
///
pub fn nms(detections: &[DetectedBox], iou_threshold: f32) -> Vec<DetectedBox> {
    let nms_boxes = detections
        .iter()
        .map(Candidate::new)
        .sorted_by(|a, b| b.rank.total_cmp(&a.rank))
        .collect::<Vec<_>>();

    let mut excluded = vec![false; nms_boxes.len()];

    for (index, cb) in nms_boxes.iter().enumerate() {
        if excluded[index] {
            continue;
        }

        for (other, ob) in nms_boxes.iter().enumerate().skip(index + 1) {
            if excluded[other] {
                continue;
            }

            if DetectedBox::iou(cb.bbox, ob.bbox) > iou_threshold {
                excluded[other] = true;
            }
        }
    }

    nms_boxes
        .into_iter()
        .zip(excluded)
        .filter(|(_, excluded)| !excluded)
        .map(|(e, _)| *e.bbox)
        .collect()
}

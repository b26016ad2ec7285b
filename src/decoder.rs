use crate::anchors::{AnchorPrior, AnchorTable, SSD_MOBILENET_V2_DETECTION_MAX};
use crate::utils::bbox::DetectedBox;
use crate::{floats_from_bytes, sigmoid, Errors, BOX_SIZE, FLOAT_SIZE};
use anyhow::Result;
use rayon::prelude::*;
use std::sync::Arc;

/// Center regression scale used by the TensorFlow SSD exports
pub const DEFAULT_CENTER_SCALE: f32 = 10.0;

/// Size regression scale used by the TensorFlow SSD exports
pub const DEFAULT_SIZE_SCALE: f32 = 5.0;

/// Score cutoff inherited from the TensorFlow demo application.
///
/// It loses good detections in some scenes and lets noise through in others, so it is only a
/// default.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// Number of labels of the COCO label list (background included)
pub const COCO_LABEL_SIZE: usize = 91;

/// Class id reserved for the background
pub const BACKGROUND_CLASS: usize = 0;

/// Decoder configuration: tensor geometry, decode scales and the score cutoff
///
#[derive(Clone, Debug, PartialEq)]
pub struct DecoderOptions {
    detection_max: usize,
    label_size: usize,
    model_width: u32,
    model_height: u32,
    y_scale: f32,
    x_scale: f32,
    h_scale: f32,
    w_scale: f32,
    score_threshold: f32,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self::ssd_mobilenet_v2()
    }
}

impl DecoderOptions {
    /// SSD MobileNet v2 trained on COCO: 1917 anchors, 91 labels, 300x300 input
    ///
    pub fn ssd_mobilenet_v2() -> Self {
        Self {
            detection_max: SSD_MOBILENET_V2_DETECTION_MAX,
            label_size: COCO_LABEL_SIZE,
            model_width: 300,
            model_height: 300,
            y_scale: DEFAULT_CENTER_SCALE,
            x_scale: DEFAULT_CENTER_SCALE,
            h_scale: DEFAULT_SIZE_SCALE,
            w_scale: DEFAULT_SIZE_SCALE,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    /// The number of anchors the model was exported with
    ///
    pub fn detection_max(mut self, n: usize) -> Self {
        assert!(n > 0, "The number of anchors must be a positive number");
        self.detection_max = n;
        self
    }

    /// The number of scores per anchor, the background class included
    ///
    pub fn label_size(mut self, n: usize) -> Self {
        assert!(n > 0, "The label size must be a positive number");
        self.label_size = n;
        self
    }

    /// Model input resolution, the boxes are decoded into this pixel space
    ///
    pub fn model_size(mut self, width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "Model size must be positive");
        self.model_width = width;
        self.model_height = height;
        self
    }

    /// Regression scales in the order of the box record: y, x, height, width
    ///
    pub fn scales(mut self, y_scale: f32, x_scale: f32, h_scale: f32, w_scale: f32) -> Self {
        assert!(
            y_scale > 0.0 && x_scale > 0.0 && h_scale > 0.0 && w_scale > 0.0,
            "Scales must be positive"
        );
        self.y_scale = y_scale;
        self.x_scale = x_scale;
        self.h_scale = h_scale;
        self.w_scale = w_scale;
        self
    }

    /// Minimal post-sigmoid score of the emitted candidates
    ///
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn get_detection_max(&self) -> usize {
        self.detection_max
    }

    pub fn get_label_size(&self) -> usize {
        self.label_size
    }

    pub fn get_model_size(&self) -> (u32, u32) {
        (self.model_width, self.model_height)
    }

    pub fn get_score_threshold(&self) -> f32 {
        self.score_threshold
    }

    /// Expected byte length of the boxes tensor
    ///
    pub fn boxes_bytes(&self) -> usize {
        self.detection_max * BOX_SIZE * FLOAT_SIZE
    }

    /// Expected byte length of the detections (class scores) tensor
    ///
    pub fn detections_bytes(&self) -> usize {
        self.detection_max * self.label_size * FLOAT_SIZE
    }
}

/// Converts the raw SSD outputs into detection candidates
///
/// The decoder is immutable after construction and can be shared between threads.
///
#[derive(Clone, Debug)]
pub struct BoxDecoder {
    anchors: Arc<AnchorTable>,
    opts: DecoderOptions,
}

impl BoxDecoder {
    /// Constructor
    ///
    /// Fails with [AnchorTableMismatch](Errors::AnchorTableMismatch) when the number of anchors
    /// differs from `detection_max`.
    ///
    pub fn new(anchors: Arc<AnchorTable>, opts: DecoderOptions) -> Result<Self> {
        if anchors.len() != opts.detection_max {
            return Err(Errors::AnchorTableMismatch {
                expected: opts.detection_max,
                actual: anchors.len(),
            }
            .into());
        }
        Ok(Self { anchors, opts })
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.opts
    }

    pub fn anchors(&self) -> &AnchorTable {
        &self.anchors
    }

    /// Decodes the raw memory blocks delivered by the tensor sink
    ///
    /// # Parameters
    /// * `boxes` - `detection_max` records of `(y, x, height, width)` floats;
    /// * `detections` - `detection_max` records of `label_size` raw class scores.
    ///
    /// Both blocks are validated before decoding; a length mismatch is reported as
    /// [ShapeMismatch](Errors::ShapeMismatch) and nothing is decoded.
    ///
    pub fn decode(&self, boxes: &[u8], detections: &[u8]) -> Result<Vec<DetectedBox>> {
        check_len("boxes", self.opts.boxes_bytes(), boxes.len())?;
        check_len("detections", self.opts.detections_bytes(), detections.len())?;
        self.decode_tensors(&floats_from_bytes(boxes), &floats_from_bytes(detections))
    }

    /// Decodes already converted float tensors
    ///
    pub fn decode_tensors(&self, boxes: &[f32], detections: &[f32]) -> Result<Vec<DetectedBox>> {
        check_len("boxes", self.opts.boxes_bytes(), boxes.len() * FLOAT_SIZE)?;
        check_len(
            "detections",
            self.opts.detections_bytes(),
            detections.len() * FLOAT_SIZE,
        )?;

        Ok(boxes
            .par_chunks_exact(BOX_SIZE)
            .zip(detections.par_chunks_exact(self.opts.label_size))
            .zip(self.anchors.priors().par_iter())
            .flat_map_iter(|((record, scores), prior)| self.decode_anchor(record, scores, prior))
            .collect())
    }

    fn decode_anchor<'a>(
        &'a self,
        record: &[f32],
        scores: &'a [f32],
        prior: &AnchorPrior,
    ) -> impl Iterator<Item = DetectedBox> + 'a {
        let opts = &self.opts;

        let ycenter = record[0] / opts.y_scale * prior.h + prior.y;
        let xcenter = record[1] / opts.x_scale * prior.w + prior.x;
        let h = (record[2] / opts.h_scale).exp() * prior.h;
        let w = (record[3] / opts.w_scale).exp() * prior.w;

        let ymin = ycenter - h / 2.0;
        let xmin = xcenter - w / 2.0;
        let ymax = ycenter + h / 2.0;
        let xmax = xcenter + w / 2.0;

        let (model_width, model_height) = (opts.model_width as f32, opts.model_height as f32);
        let x = (xmin * model_width) as i32;
        let y = (ymin * model_height) as i32;
        let width = ((xmax - xmin) * model_width) as i32;
        let height = ((ymax - ymin) * model_height) as i32;

        scores
            .iter()
            .enumerate()
            .skip(BACKGROUND_CLASS + 1)
            .filter_map(move |(class_id, raw)| {
                let score = sigmoid(*raw);
                // NaN never passes the comparison
                if score >= opts.score_threshold {
                    Some(DetectedBox::new(
                        x,
                        y,
                        width,
                        height,
                        class_id as u32,
                        score,
                    ))
                } else {
                    None
                }
            })
    }
}

fn check_len(tensor: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        Err(Errors::ShapeMismatch {
            tensor,
            expected,
            actual,
        }
        .into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::anchors::{ssd_mobilenet_v2_anchors, AnchorTable};
    use crate::decoder::{BoxDecoder, DecoderOptions};
    use crate::examples::RawFrameGen;
    use crate::test_stuff::{two_anchor_decoder, two_anchor_frame};
    use crate::utils::bbox::DetectedBox;
    use crate::{floats_to_bytes, sigmoid, Errors, EstimateClose, EPS};
    use std::sync::Arc;

    fn shape_error(decoder: &BoxDecoder, boxes: &[u8], detections: &[u8]) -> Errors {
        let e = decoder.decode(boxes, detections).unwrap_err();
        e.downcast_ref::<Errors>().unwrap().clone()
    }

    #[test]
    fn two_identical_anchors() {
        let decoder = two_anchor_decoder();
        let (boxes, detections) = two_anchor_frame();
        let res = decoder.decode(&boxes, &detections).unwrap();
        assert_eq!(res.len(), 2);
        assert!(res[0].almost_same(&DetectedBox::new(0, 0, 300, 300, 1, sigmoid(5.0)), EPS));
        assert!(res[1].almost_same(&DetectedBox::new(0, 0, 300, 300, 1, sigmoid(3.0)), EPS));
        assert!((res[0].confidence - 0.9933).abs() < 0.0001);
        assert!((res[1].confidence - 0.9526).abs() < 0.0001);
    }

    #[test]
    fn regression_offsets() {
        let decoder = two_anchor_decoder();
        // y, x offsets move the center by value / 10 * prior size; h, w scale by exp(value / 5)
        let boxes = floats_to_bytes(&[2.5, -2.5, 0.0, 0.0, 0.0, 0.0, -5.0, -5.0]);
        let detections = floats_to_bytes(&[-100.0, 5.0, -100.0, -100.0, 5.0, -100.0]);
        let res = decoder.decode(&boxes, &detections).unwrap();

        assert_eq!(res[0], DetectedBox::new(-75, 75, 300, 300, 1, sigmoid(5.0)));

        // exp(-1) * 300 = 110.36, centered at 150
        let small = &res[1];
        assert_eq!((small.width, small.height), (110, 110));
        assert_eq!((small.x, small.y), (94, 94));
    }

    #[test]
    fn shape_validation() {
        let decoder = two_anchor_decoder();
        let (boxes, detections) = two_anchor_frame();

        assert_eq!(
            shape_error(&decoder, &boxes[..28], &detections),
            Errors::ShapeMismatch {
                tensor: "boxes",
                expected: 32,
                actual: 28
            }
        );

        let mut longer = detections.clone();
        longer.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(
            shape_error(&decoder, &boxes, &longer),
            Errors::ShapeMismatch {
                tensor: "detections",
                expected: 24,
                actual: 28
            }
        );

        assert!(decoder.decode_tensors(&[0.0; 4], &[0.0; 6]).is_err());
    }

    #[test]
    fn anchor_mismatch() {
        let e = BoxDecoder::new(
            Arc::new(AnchorTable::default()),
            DecoderOptions::ssd_mobilenet_v2(),
        )
        .unwrap_err();
        assert_eq!(
            e.downcast_ref::<Errors>(),
            Some(&Errors::AnchorTableMismatch {
                expected: 1917,
                actual: 0
            })
        );
    }

    #[test]
    fn threshold_and_background() {
        let decoder =
            BoxDecoder::new(ssd_mobilenet_v2_anchors(), DecoderOptions::ssd_mobilenet_v2())
                .unwrap();
        let mut gen = RawFrameGen::new(1917, 91);
        for _ in 0..5 {
            let (boxes, detections) = gen.next_frame();
            let res = decoder.decode(&boxes, &detections).unwrap();
            assert!(!res.is_empty());
            assert!(res.iter().all(|b| b.class_id != 0));
            assert!(res.iter().all(|b| b.confidence >= 0.5));
            assert!(res.iter().all(|b| (b.class_id as usize) < 91));
        }
    }

    #[test]
    fn configurable_threshold() {
        let anchors = Arc::new(two_anchor_decoder().anchors().clone());
        let opts = DecoderOptions::default()
            .detection_max(2)
            .label_size(3)
            .score_threshold(0.96);
        let decoder = BoxDecoder::new(anchors, opts).unwrap();
        let (boxes, detections) = two_anchor_frame();
        let res = decoder.decode(&boxes, &detections).unwrap();
        assert_eq!(res.len(), 1);
        assert!((res[0].confidence - sigmoid(5.0)).abs() < EPS);
    }

    #[test]
    fn nan_scores_are_skipped() {
        let decoder = two_anchor_decoder();
        let (boxes, _) = two_anchor_frame();
        let detections = floats_to_bytes(&[f32::NAN; 6]);
        assert!(decoder.decode(&boxes, &detections).unwrap().is_empty());
    }

    #[test]
    fn score_equal_to_threshold_is_emitted() {
        let decoder = two_anchor_decoder();
        let (boxes, _) = two_anchor_frame();
        // sigmoid(0.0) is exactly the default threshold 0.5
        let detections = floats_to_bytes(&[-100.0, 0.0, -100.0, -100.0, -100.0, -100.0]);
        let res = decoder.decode(&boxes, &detections).unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].confidence, 0.5);
        assert_eq!(res[0].class_id, 1);
    }
}

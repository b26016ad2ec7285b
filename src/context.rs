use crate::anchors::{ssd_mobilenet_v2_anchors, AnchorTable};
use crate::decoder::{BoxDecoder, DecoderOptions};
use crate::labels::Labels;
use crate::suppressor::{Suppressor, SuppressorOptions};
use crate::utils::bbox::DetectedBox;
use crate::worker::FrameProcessor;
use crate::Errors;
use anyhow::Result;
use log::{debug, info};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of boxes a display snapshot carries by default
pub const DEFAULT_DISPLAY_LIMIT: usize = 5;

/// Memory blocks of an SSD frame: boxes and detections
pub const SSD_FRAME_BLOCKS: usize = 2;

#[derive(Debug)]
enum AnchorSource {
    Generated,
    Path(PathBuf),
    Table(Arc<AnchorTable>),
}

#[derive(Debug)]
enum LabelSource {
    Path(PathBuf),
    List(Labels),
}

/// Assembles a [DetectorContext]
///
/// Without an anchor source the generated SSD MobileNet v2 table is used. When labels are given
/// and [label_size](DetectorContextBuilder::label_size) is not called, the label size of the
/// decoder is the number of labels.
///
#[derive(Debug)]
pub struct DetectorContextBuilder {
    anchors: AnchorSource,
    labels: Option<LabelSource>,
    decoder_opts: DecoderOptions,
    label_size: Option<usize>,
    suppressor_opts: SuppressorOptions,
    display_limit: usize,
}

impl Default for DetectorContextBuilder {
    fn default() -> Self {
        Self {
            anchors: AnchorSource::Generated,
            labels: None,
            decoder_opts: DecoderOptions::default(),
            label_size: None,
            suppressor_opts: SuppressorOptions::default(),
            display_limit: DEFAULT_DISPLAY_LIMIT,
        }
    }
}

impl DetectorContextBuilder {
    /// Box-prior text file
    ///
    pub fn anchors_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.anchors = AnchorSource::Path(path.as_ref().to_path_buf());
        self
    }

    /// Box-prior text read right away from `reader`
    ///
    pub fn anchors_reader<R: Read>(mut self, reader: R) -> Result<Self> {
        self.anchors = AnchorSource::Table(Arc::new(AnchorTable::from_reader(reader)?));
        Ok(self)
    }

    pub fn anchor_table(mut self, table: Arc<AnchorTable>) -> Self {
        self.anchors = AnchorSource::Table(table);
        self
    }

    pub fn generated_anchors(mut self) -> Self {
        self.anchors = AnchorSource::Generated;
        self
    }

    pub fn labels_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.labels = Some(LabelSource::Path(path.as_ref().to_path_buf()));
        self
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = Some(LabelSource::List(labels));
        self
    }

    pub fn decoder_options(mut self, opts: DecoderOptions) -> Self {
        self.decoder_opts = opts;
        self
    }

    /// Overrides the label size derived from the label list
    ///
    pub fn label_size(mut self, n: usize) -> Self {
        self.label_size = Some(n);
        self
    }

    pub fn suppressor_options(mut self, opts: SuppressorOptions) -> Self {
        self.suppressor_opts = opts;
        self
    }

    pub fn display_limit(mut self, n: usize) -> Self {
        self.display_limit = n;
        self
    }

    pub fn build(self) -> Result<DetectorContext> {
        let anchors = match self.anchors {
            AnchorSource::Generated => ssd_mobilenet_v2_anchors(),
            AnchorSource::Path(path) => Arc::new(AnchorTable::load(path)?),
            AnchorSource::Table(table) => table,
        };

        let labels = match self.labels {
            None => None,
            Some(LabelSource::Path(path)) => Some(Labels::load(path)?),
            Some(LabelSource::List(labels)) => Some(labels),
        };

        let mut decoder_opts = self.decoder_opts;
        if self.label_size == Some(0) {
            return Err(Errors::InvalidOption(
                "the label size must be a positive number".to_string(),
            )
            .into());
        }
        match (self.label_size, &labels) {
            (Some(n), _) => decoder_opts = decoder_opts.label_size(n),
            (None, Some(labels)) if !labels.is_empty() => {
                decoder_opts = decoder_opts.label_size(labels.len())
            }
            _ => {}
        }

        let decoder = BoxDecoder::new(anchors, decoder_opts)?;
        let opts = decoder.options();
        info!(
            "Detector context: {} anchors, {} labels, model {:?}, score/IoU thresholds {}/{}",
            opts.get_detection_max(),
            opts.get_label_size(),
            opts.get_model_size(),
            opts.get_score_threshold(),
            self.suppressor_opts.get_iou_threshold()
        );

        Ok(DetectorContext {
            decoder,
            suppressor: Suppressor::new(self.suppressor_opts),
            labels,
            display_limit: self.display_limit,
        })
    }
}

/// Detector state of one pipeline: the decoder with its anchors, the suppressor with the
/// published detections and the label list
///
/// The inference thread calls [process_frame](FrameProcessor::process_frame) or
/// [update](DetectorContext::update); any thread may read the detections concurrently.
///
#[derive(Debug)]
pub struct DetectorContext {
    decoder: BoxDecoder,
    suppressor: Suppressor,
    labels: Option<Labels>,
    display_limit: usize,
}

impl DetectorContext {
    pub fn builder() -> DetectorContextBuilder {
        DetectorContextBuilder::default()
    }

    pub fn new(decoder: BoxDecoder, suppressor: Suppressor) -> Self {
        Self {
            decoder,
            suppressor,
            labels: None,
            display_limit: DEFAULT_DISPLAY_LIMIT,
        }
    }

    /// Decodes one SSD frame, suppresses overlaps and publishes the survivors
    ///
    /// Returns the number of published boxes. The published list stays as is when the frame
    /// is rejected.
    ///
    pub fn update(&self, boxes: &[u8], detections: &[u8]) -> Result<usize> {
        let candidates = self.decoder.decode(boxes, detections)?;
        let published = self.suppressor.update(&candidates);
        debug!(
            "Frame decoded: {} candidates, {} published",
            candidates.len(),
            published
        );
        Ok(published)
    }

    pub fn detections(&self) -> Vec<DetectedBox> {
        self.suppressor.detections()
    }

    /// The most confident published boxes, at most the display limit
    ///
    pub fn detections_for_display(&self) -> Vec<DetectedBox> {
        self.suppressor.detections_limited(self.display_limit)
    }

    pub fn published(&self) -> (u64, Arc<Vec<DetectedBox>>) {
        self.suppressor.published()
    }

    pub fn label(&self, class_id: u32) -> Option<&str> {
        self.labels.as_ref().and_then(|l| l.get(class_id))
    }

    pub fn labels(&self) -> Option<&Labels> {
        self.labels.as_ref()
    }

    pub fn decoder(&self) -> &BoxDecoder {
        &self.decoder
    }

    pub fn suppressor(&self) -> &Suppressor {
        &self.suppressor
    }

    pub fn display_limit(&self) -> usize {
        self.display_limit
    }
}

impl FrameProcessor for DetectorContext {
    fn process_frame(&self, blocks: &[&[u8]]) -> Result<usize> {
        match blocks {
            [boxes, detections] => self.update(boxes, detections),
            _ => Err(Errors::BlockCountMismatch {
                expected: SSD_FRAME_BLOCKS,
                actual: blocks.len(),
            }
            .into()),
        }
    }
}

#[cfg(feature = "python")]
pub mod python {
    use super::DetectorContext;
    use crate::decoder::DecoderOptions;
    use crate::suppressor::SuppressorOptions;
    use crate::utils::bbox::python::PyDetectedBox;
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    #[pyclass]
    #[pyo3(name = "DetectorContext")]
    #[derive(Debug)]
    pub struct PyDetectorContext(DetectorContext);

    #[pymethods]
    impl PyDetectorContext {
        /// Without `anchors_path` the generated SSD MobileNet v2 anchors are used
        ///
        #[new]
        #[pyo3(
            signature = (anchors_path = None, labels_path = None, iou_threshold = 0.5, score_threshold = 0.5)
        )]
        fn new(
            anchors_path: Option<String>,
            labels_path: Option<String>,
            iou_threshold: f32,
            score_threshold: f32,
        ) -> PyResult<Self> {
            let mut builder = DetectorContext::builder()
                .decoder_options(DecoderOptions::default().score_threshold(score_threshold))
                .suppressor_options(SuppressorOptions::default().iou_threshold(iou_threshold));
            if let Some(path) = anchors_path {
                builder = builder.anchors_path(path);
            }
            if let Some(path) = labels_path {
                builder = builder.labels_path(path);
            }
            builder
                .build()
                .map(Self)
                .map_err(|e| PyValueError::new_err(e.to_string()))
        }

        #[classattr]
        const __hash__: Option<Py<PyAny>> = None;

        fn __repr__(&self) -> String {
            format!("{:?}", self.0.decoder().options())
        }

        /// Decodes one frame, returns the number of published boxes
        ///
        fn process(&self, py: Python<'_>, boxes: &[u8], detections: &[u8]) -> PyResult<usize> {
            py.allow_threads(|| self.0.update(boxes, detections))
                .map_err(|e| PyValueError::new_err(e.to_string()))
        }

        fn detections(&self) -> Vec<PyDetectedBox> {
            self.0.detections().into_iter().map(PyDetectedBox).collect()
        }

        fn detections_for_display(&self) -> Vec<PyDetectedBox> {
            self.0
                .detections_for_display()
                .into_iter()
                .map(PyDetectedBox)
                .collect()
        }

        fn label(&self, class_id: u32) -> Option<String> {
            self.0.label(class_id).map(String::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::DetectorContext;
    use crate::examples::RawFrameGen;
    use crate::labels::Labels;
    use crate::suppressor::SuppressorOptions;
    use crate::test_stuff::{init_logs, two_anchor_frame, two_anchor_options, two_anchor_table};
    use crate::utils::bbox::DetectedBox;
    use crate::worker::FrameProcessor;
    use crate::Errors;
    use std::sync::Arc;

    fn two_anchor_context() -> DetectorContext {
        DetectorContext::builder()
            .anchor_table(Arc::new(two_anchor_table()))
            .decoder_options(two_anchor_options())
            .build()
            .unwrap()
    }

    #[test]
    fn two_identical_boxes() {
        init_logs();
        let ctx = two_anchor_context();
        let (boxes, detections) = two_anchor_frame();
        assert_eq!(ctx.process_frame(&[&boxes, &detections]).unwrap(), 1);

        let res = ctx.detections();
        assert_eq!(res.len(), 1);
        assert_eq!((res[0].x, res[0].y, res[0].width, res[0].height), (0, 0, 300, 300));
        assert_eq!(res[0].class_id, 1);
        assert!((res[0].confidence - 0.9933).abs() < 0.0001);
    }

    #[test]
    fn rejected_frame_keeps_published() {
        let ctx = two_anchor_context();
        let (boxes, detections) = two_anchor_frame();
        ctx.update(&boxes, &detections).unwrap();
        let (generation, before) = ctx.published();

        let e = ctx.update(&boxes[..16], &detections).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<Errors>(),
            Some(Errors::ShapeMismatch { tensor: "boxes", .. })
        ));

        let e = ctx.process_frame(&[&boxes]).unwrap_err();
        assert_eq!(
            e.downcast_ref::<Errors>(),
            Some(&Errors::BlockCountMismatch {
                expected: 2,
                actual: 1
            })
        );

        let (after_generation, after) = ctx.published();
        assert_eq!(generation, after_generation);
        assert_eq!(before, after);
    }

    #[test]
    fn label_size_from_labels() {
        let labels = Labels::from(vec!["???".to_string(), "person".to_string(), "car".to_string()]);
        let ctx = DetectorContext::builder()
            .anchor_table(Arc::new(two_anchor_table()))
            .decoder_options(two_anchor_options().label_size(91))
            .labels(labels)
            .build()
            .unwrap();
        assert_eq!(ctx.decoder().options().get_label_size(), 3);
        assert_eq!(ctx.label(1), Some("person"));
        assert_eq!(ctx.label(7), None);

        let ctx = DetectorContext::builder()
            .anchor_table(Arc::new(two_anchor_table()))
            .decoder_options(two_anchor_options())
            .labels(Labels::from(vec!["only".to_string()]))
            .label_size(4)
            .build()
            .unwrap();
        assert_eq!(ctx.decoder().options().get_label_size(), 4);
    }

    #[test]
    fn zero_label_size() {
        let e = DetectorContext::builder()
            .anchor_table(Arc::new(two_anchor_table()))
            .decoder_options(two_anchor_options())
            .label_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(
            e.downcast_ref::<Errors>(),
            Some(Errors::InvalidOption(_))
        ));
    }

    #[test]
    fn anchors_from_text() {
        let text = "0.5 0.5\n0.5 0.5\n1.0 1.0\n1.0 1.0\n";
        let ctx = DetectorContext::builder()
            .anchors_reader(text.as_bytes())
            .unwrap()
            .decoder_options(two_anchor_options())
            .build()
            .unwrap();
        assert_eq!(ctx.decoder().anchors().len(), 2);

        let e = DetectorContext::builder()
            .anchors_reader("0.5 0.5\n0.5 0.5\n1.0 1.0\n1.0 1.0\n".as_bytes())
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(
            e.downcast_ref::<Errors>(),
            Some(&Errors::AnchorTableMismatch {
                expected: 1917,
                actual: 2
            })
        );
    }

    #[test]
    fn missing_files() {
        assert!(DetectorContext::builder()
            .anchors_path("/nonexistent/box_priors.txt")
            .build()
            .is_err());
        assert!(DetectorContext::builder()
            .labels_path("/nonexistent/coco_labels_list.txt")
            .build()
            .is_err());
    }

    #[test]
    fn display_limit() {
        let ctx = DetectorContext::builder()
            .suppressor_options(SuppressorOptions::default().iou_threshold(0.5))
            .display_limit(3)
            .build()
            .unwrap();
        let mut gen = RawFrameGen::new(1917, 91).hot_cells(50);
        let mut limited = false;
        for _ in 0..10 {
            let (boxes, detections) = gen.next_frame();
            let published = ctx.process_frame(&[&boxes, &detections]).unwrap();
            let all = ctx.detections();
            assert_eq!(all.len(), published);
            let shown = ctx.detections_for_display();
            assert_eq!(shown.len(), published.min(3));
            assert_eq!(shown[..], all[..shown.len()]);
            limited |= published > 3;

            for (i, a) in all.iter().enumerate() {
                for b in &all[i + 1..] {
                    assert!(DetectedBox::iou(a, b) <= 0.5);
                }
            }
        }
        assert!(limited);
    }
}

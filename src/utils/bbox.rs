use crate::EstimateClose;

/// Decoded detection candidate in the pixel space of the model input (x, y, width, height)
///
/// `class_id` indexes the external label list; `0` is the background class and is never produced
/// by the decoder. `confidence` is the post-sigmoid score of `class_id`.
///
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct DetectedBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub class_id: u32,
    pub confidence: f32,
}

impl DetectedBox {
    /// Constructor
    ///
    pub fn new(x: i32, y: i32, width: i32, height: i32, class_id: u32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            class_id,
            confidence,
        }
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    /// Right edge, computed without `i32` overflow
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Bottom edge, computed without `i32` overflow
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Intersection area with inclusive pixel edges
    ///
    /// Two boxes sharing a single edge pixel intersect with an area of `1`; the width and the
    /// height of the intersection are `max(0, x2 - x1 + 1)` and `max(0, y2 - y1 + 1)`.
    ///
    pub fn intersection(l: &DetectedBox, r: &DetectedBox) -> f64 {
        let (x1, y1) = ((l.x as i64).max(r.x as i64), (l.y as i64).max(r.y as i64));
        let (x2, y2) = (l.right().min(r.right()), l.bottom().min(r.bottom()));

        let int_width = (x2 - x1 + 1).max(0);
        let int_height = (y2 - y1 + 1).max(0);

        int_width as f64 * int_height as f64
    }

    /// Intersection over union, the overlap metric used by NMS
    ///
    /// Because of the inclusive edges the ratio of identical boxes is slightly above `1.0`.
    /// Degenerate inputs never produce a negative or NaN ratio: both are reported as `0.0`.
    ///
    pub fn iou(l: &DetectedBox, r: &DetectedBox) -> f32 {
        let intersection = DetectedBox::intersection(l, r);
        let union = l.area() + r.area() - intersection;
        let res = (intersection / union) as f32;
        if res >= 0.0 {
            res
        } else {
            0.0
        }
    }
}

impl EstimateClose for DetectedBox {
    /// Allows comparing boxes decoded from the same tensors by different code paths
    ///
    fn almost_same(&self, other: &Self, eps: f32) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
            && self.class_id == other.class_id
            && (self.confidence - other.confidence).abs() < eps
    }
}

#[cfg(feature = "python")]
pub mod python {
    use super::DetectedBox;
    use pyo3::prelude::*;

    #[pyclass]
    #[pyo3(name = "DetectedBox")]
    #[derive(Clone, Copy, Debug)]
    #[repr(transparent)]
    pub struct PyDetectedBox(pub DetectedBox);

    #[pymethods]
    impl PyDetectedBox {
        #[new]
        fn new(x: i32, y: i32, width: i32, height: i32, class_id: u32, confidence: f32) -> Self {
            Self(DetectedBox::new(x, y, width, height, class_id, confidence))
        }

        #[classattr]
        const __hash__: Option<Py<PyAny>> = None;

        fn __repr__(&self) -> String {
            format!("{:?}", self.0)
        }

        fn __str__(&self) -> String {
            format!("{:#?}", self.0)
        }

        #[getter]
        fn x(&self) -> i32 {
            self.0.x
        }

        #[getter]
        fn y(&self) -> i32 {
            self.0.y
        }

        #[getter]
        fn width(&self) -> i32 {
            self.0.width
        }

        #[getter]
        fn height(&self) -> i32 {
            self.0.height
        }

        #[getter]
        fn class_id(&self) -> u32 {
            self.0.class_id
        }

        #[getter]
        fn confidence(&self) -> f32 {
            self.0.confidence
        }

        /// `(x, y, width, height)` tuple for drawing
        ///
        fn as_xywh(&self) -> (i32, i32, i32, i32) {
            (self.0.x, self.0.y, self.0.width, self.0.height)
        }

        fn iou(&self, other: &Self) -> f32 {
            DetectedBox::iou(&self.0, &other.0)
        }
    }
}

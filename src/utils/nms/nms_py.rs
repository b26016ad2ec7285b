use crate::utils::bbox::python::PyDetectedBox;
use crate::utils::bbox::DetectedBox;
use crate::utils::nms::nms;
use pyo3::prelude::*;

/// # NMS Python interface
///
/// The python function name is `nms`. The GIL is released while the suppression runs.
///
/// The signature is:
/// ```python
/// def nms(detections: List[DetectedBox], iou_threshold: float = 0.5) -> List[DetectedBox]
/// ```
/// # Parameters
/// * `detections` - the candidates of one frame, ranked by their `confidence`;
/// * `iou_threshold` - the overlap above which the less confident box is removed.
///

/**
# Example

```python
from nnsdetect import nms, DetectedBox

 if __name__ == '__main__':
     a = DetectedBox(0, 0, 300, 300, 1, 0.99)
     b = DetectedBox(0, 0, 300, 300, 1, 0.95)
     res = nms([b, a], iou_threshold = 0.5)
     print(res[0].as_xywh(), res[0].confidence)
 ```
*/
#[pyfunction]
#[pyo3(
    name = "nms",
    signature = (detections, iou_threshold = 0.5)
)]
pub fn nms_py(
    py: Python<'_>,
    detections: Vec<PyDetectedBox>,
    iou_threshold: f32,
) -> Vec<PyDetectedBox> {
    py.allow_threads(|| {
        let detections = detections.into_iter().map(|b| b.0).collect::<Vec<DetectedBox>>();
        nms(&detections, iou_threshold)
            .into_iter()
            .map(PyDetectedBox)
            .collect()
    })
}

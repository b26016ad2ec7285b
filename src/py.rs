use crate::context::python::PyDetectorContext;
use crate::pose::python::{PyPoseEstimator, PyPoseKeypoint};
use crate::utils::bbox::python::PyDetectedBox;
use crate::utils::nms::nms_py::nms_py;
use pyo3::prelude::*;

#[pymodule]
#[pyo3(name = "nnsdetect")]
fn nnsdetect(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_class::<PyDetectedBox>()?;
    m.add_class::<PyPoseKeypoint>()?;
    m.add_class::<PyDetectorContext>()?;
    m.add_class::<PyPoseEstimator>()?;

    m.add_function(wrap_pyfunction!(nms_py, m)?)?;
    Ok(())
}

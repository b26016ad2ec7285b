use thiserror::Error;

/// Raw anchor priors, the box-prior text file and the SSD anchor generator
pub mod anchors;

/// Regression/score tensor decoding into detection candidates
pub mod decoder;

/// NMS stage that owns the published detection list
pub mod suppressor;

/// Pose keypoint decoding from heatmaps
pub mod pose;

/// Per-pipeline detector state that replaces the process-wide globals
pub mod context;

/// Frame processing thread with two-phase shutdown
pub mod worker;

/// Label list loading
pub mod labels;

/// Utility objects: bounding boxes, NMS, published result store
pub mod utils;

/// Candidate and raw tensor generators for benchmarks and demos
pub mod examples;

/// Frequently used structures and functions
pub mod prelude;

#[cfg(test)]
mod test_stuff;

#[cfg(feature = "python")]
pub mod py;

/// Number of floats in one box regression record: (y, x, height, width)
pub const BOX_SIZE: usize = 4;

/// Size of a raw `f32` tensor element in bytes
pub const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Errors {
    #[error("Tensor `{tensor}` has {actual} bytes while {expected} bytes are expected.")]
    ShapeMismatch {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Anchor table has {actual} priors while the decoder expects {expected}.")]
    AnchorTableMismatch { expected: usize, actual: usize },
    #[error("Malformed anchor prior data: {0}")]
    AnchorFormat(String),
    #[error("Frame carries {actual} memory blocks while {expected} are expected.")]
    BlockCountMismatch { expected: usize, actual: usize },
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    #[error("Frame worker no longer accepts frames.")]
    PipelineStopped,
    #[error("Frame queue is full, the frame is dropped.")]
    WorkerBusy,
}

pub(crate) const EPS: f32 = 0.00001;

/// Allows comparing float-carrying objects with tolerance
///
pub trait EstimateClose {
    fn almost_same(&self, other: &Self, eps: f32) -> bool;
}

/// Logistic function used to convert raw logits to confidences
///
#[inline]
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Converts a raw memory block into `f32` values (native byte order)
///
/// The caller is responsible for checking the length before the conversion; the trailing
/// bytes that do not form a complete float are ignored.
///
pub fn floats_from_bytes(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(FLOAT_SIZE)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Converts `f32` values into a raw memory block (native byte order)
///
pub fn floats_to_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|f| f.to_ne_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use crate::{floats_from_bytes, floats_to_bytes, sigmoid, Errors, EPS};

    #[test]
    fn sigmoid_values() {
        assert!((sigmoid(0.0) - 0.5).abs() < EPS);
        assert!((sigmoid(5.0) - 0.9933071).abs() < EPS);
        assert!((sigmoid(3.0) - 0.95257413).abs() < EPS);
        assert!(sigmoid(-100.0) < 0.001);
        assert!(sigmoid(f32::NAN).is_nan());
    }

    #[test]
    fn raw_blocks() {
        let v = vec![0.5, -1.25, 100.0];
        let bytes = floats_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(floats_from_bytes(&bytes), v);
        assert_eq!(floats_from_bytes(&bytes[..11]), vec![0.5, -1.25]);
    }

    #[test]
    fn error_messages() {
        let e = Errors::ShapeMismatch {
            tensor: "boxes",
            expected: 16,
            actual: 12,
        };
        assert_eq!(
            e.to_string(),
            "Tensor `boxes` has 12 bytes while 16 bytes are expected."
        );
    }
}

use crate::utils::published::PublishedResult;
use crate::worker::FrameProcessor;
use crate::{floats_from_bytes, Errors, FLOAT_SIZE};
use anyhow::Result;
use log::debug;
use std::sync::Arc;

/// Limb edges between keypoint indices of the 14-point pose model
///
pub const POSE_SKELETON: [(usize, usize); 13] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (1, 5),
    (5, 6),
    (6, 7),
    (1, 8),
    (8, 9),
    (9, 10),
    (1, 11),
    (11, 12),
    (12, 13),
];

/// Number of keypoints of the pose model
pub const DEFAULT_POSE_KEYPOINTS: usize = 14;

/// Heatmap side of the 192x192 pose model
pub const DEFAULT_HEATMAP_SIZE: u32 = 96;

pub const DEFAULT_KEYPOINT_THRESHOLD: f32 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct PoseOptions {
    keypoints: usize,
    heatmap_width: u32,
    heatmap_height: u32,
    score_threshold: f32,
}

impl Default for PoseOptions {
    fn default() -> Self {
        Self {
            keypoints: DEFAULT_POSE_KEYPOINTS,
            heatmap_width: DEFAULT_HEATMAP_SIZE,
            heatmap_height: DEFAULT_HEATMAP_SIZE,
            score_threshold: DEFAULT_KEYPOINT_THRESHOLD,
        }
    }
}

impl PoseOptions {
    pub fn keypoints(mut self, n: usize) -> Self {
        assert!(n > 0, "The number of keypoints must be a positive number");
        self.keypoints = n;
        self
    }

    pub fn heatmap_size(mut self, width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "Heatmap size must be positive");
        self.heatmap_width = width;
        self.heatmap_height = height;
        self
    }

    /// A keypoint is valid when its score is strictly above the threshold
    ///
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn get_keypoints(&self) -> usize {
        self.keypoints
    }

    pub fn get_heatmap_size(&self) -> (u32, u32) {
        (self.heatmap_width, self.heatmap_height)
    }

    pub fn get_score_threshold(&self) -> f32 {
        self.score_threshold
    }

    /// Expected byte length of the heatmap tensor
    ///
    pub fn heatmap_bytes(&self) -> usize {
        self.heatmap_width as usize * self.heatmap_height as usize * self.keypoints * FLOAT_SIZE
    }
}

/// Heatmap argmax of one keypoint
///
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct PoseKeypoint {
    pub x: u32,
    pub y: u32,
    pub score: f32,
    pub valid: bool,
}

impl PoseKeypoint {
    /// Maps heatmap coordinates into a `display_width` x `display_height` surface
    ///
    pub fn scale_to(
        &self,
        display_width: u32,
        display_height: u32,
        opts: &PoseOptions,
    ) -> (f64, f64) {
        (
            self.x as f64 * display_width as f64 / opts.heatmap_width as f64,
            self.y as f64 * display_height as f64 / opts.heatmap_height as f64,
        )
    }
}

/// Decodes pose heatmaps and owns the published keypoint list
///
#[derive(Debug, Default)]
pub struct PoseEstimator {
    opts: PoseOptions,
    published: PublishedResult<PoseKeypoint>,
}

impl PoseEstimator {
    pub fn new(opts: PoseOptions) -> Self {
        Self {
            opts,
            published: PublishedResult::new(),
        }
    }

    pub fn options(&self) -> &PoseOptions {
        &self.opts
    }

    /// Finds the strongest heatmap cell of every keypoint
    ///
    /// The heatmap is laid out as `[y][x][keypoint]`. Rows are scanned top to bottom, so the
    /// first of equal maxima wins. A keypoint without a positive cell lands at `(0, 0)` with
    /// zero score.
    ///
    pub fn decode(&self, heatmap: &[u8]) -> Result<Vec<PoseKeypoint>> {
        let expected = self.opts.heatmap_bytes();
        if heatmap.len() != expected {
            return Err(Errors::ShapeMismatch {
                tensor: "heatmap",
                expected,
                actual: heatmap.len(),
            }
            .into());
        }
        let heatmap = floats_from_bytes(heatmap);

        let k_total = self.opts.keypoints;
        let width = self.opts.heatmap_width as usize;
        let height = self.opts.heatmap_height as usize;

        Ok((0..k_total)
            .map(|k| {
                let mut best = PoseKeypoint::default();
                for y in 0..height {
                    for x in 0..width {
                        let score = heatmap[x * k_total + y * width * k_total + k];
                        if score > best.score {
                            best.x = x as u32;
                            best.y = y as u32;
                            best.score = score;
                        }
                    }
                }
                best.valid = best.score > self.opts.score_threshold;
                best
            })
            .collect())
    }

    /// Decodes the heatmap and replaces the published keypoints
    ///
    /// Returns the number of valid keypoints. On error the published list is unchanged.
    ///
    pub fn update(&self, heatmap: &[u8]) -> Result<usize> {
        let keypoints = self.decode(heatmap)?;
        let valid = keypoints.iter().filter(|k| k.valid).count();
        let generation = self.published.publish(keypoints);
        debug!("Published {} valid keypoints, generation {}", valid, generation);
        Ok(valid)
    }

    pub fn keypoints(&self) -> Vec<PoseKeypoint> {
        self.published.snapshot()
    }

    pub fn published(&self) -> (u64, Arc<Vec<PoseKeypoint>>) {
        self.published.shared()
    }

    /// Skeleton segments with both endpoints valid
    ///
    pub fn segments(&self) -> Vec<(PoseKeypoint, PoseKeypoint)> {
        let (_, keypoints) = self.published.shared();
        if keypoints.len() != self.opts.keypoints {
            return Vec::default();
        }
        POSE_SKELETON
            .iter()
            .filter_map(|&(from, to)| {
                let (from, to) = (keypoints.get(from)?, keypoints.get(to)?);
                if from.valid && to.valid {
                    Some((*from, *to))
                } else {
                    None
                }
            })
            .collect()
    }
}

impl FrameProcessor for PoseEstimator {
    fn process_frame(&self, blocks: &[&[u8]]) -> Result<usize> {
        match blocks {
            [heatmap] => self.update(heatmap),
            _ => Err(Errors::BlockCountMismatch {
                expected: 1,
                actual: blocks.len(),
            }
            .into()),
        }
    }
}

#[cfg(feature = "python")]
pub mod python {
    use super::{PoseEstimator, PoseKeypoint, PoseOptions};
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    #[pyclass]
    #[pyo3(name = "PoseKeypoint")]
    #[derive(Clone, Copy, Debug)]
    #[repr(transparent)]
    pub struct PyPoseKeypoint(pub PoseKeypoint);

    #[pymethods]
    impl PyPoseKeypoint {
        #[classattr]
        const __hash__: Option<Py<PyAny>> = None;

        fn __repr__(&self) -> String {
            format!("{:?}", self.0)
        }

        #[getter]
        fn x(&self) -> u32 {
            self.0.x
        }

        #[getter]
        fn y(&self) -> u32 {
            self.0.y
        }

        #[getter]
        fn score(&self) -> f32 {
            self.0.score
        }

        #[getter]
        fn valid(&self) -> bool {
            self.0.valid
        }
    }

    #[pyclass]
    #[pyo3(name = "PoseEstimator")]
    #[derive(Debug)]
    pub struct PyPoseEstimator(PoseEstimator);

    #[pymethods]
    impl PyPoseEstimator {
        #[new]
        #[pyo3(
            signature = (keypoints = 14, heatmap_width = 96, heatmap_height = 96, score_threshold = 0.5)
        )]
        fn new(
            keypoints: usize,
            heatmap_width: u32,
            heatmap_height: u32,
            score_threshold: f32,
        ) -> Self {
            Self(PoseEstimator::new(
                PoseOptions::default()
                    .keypoints(keypoints)
                    .heatmap_size(heatmap_width, heatmap_height)
                    .score_threshold(score_threshold),
            ))
        }

        #[classattr]
        const __hash__: Option<Py<PyAny>> = None;

        /// Decodes one heatmap, returns the number of valid keypoints
        ///
        fn process(&self, py: Python<'_>, heatmap: &[u8]) -> PyResult<usize> {
            py.allow_threads(|| self.0.update(heatmap))
                .map_err(|e| PyValueError::new_err(e.to_string()))
        }

        fn keypoints(&self) -> Vec<PyPoseKeypoint> {
            self.0.keypoints().into_iter().map(PyPoseKeypoint).collect()
        }
    }
}

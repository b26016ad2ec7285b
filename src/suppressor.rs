use crate::utils::bbox::DetectedBox;
use crate::utils::nms::{nms, DEFAULT_NMS_IOU_THRESHOLD};
use crate::utils::published::PublishedResult;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Suppressor configuration
///
#[derive(Clone, Debug, PartialEq)]
pub struct SuppressorOptions {
    iou_threshold: f32,
    max_published: Option<usize>,
}

impl Default for SuppressorOptions {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
            max_published: None,
        }
    }
}

impl SuppressorOptions {
    /// Boxes overlapping a better one with IoU above the threshold are removed
    ///
    pub fn iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Keeps only the `n` most confident survivors in the published list
    ///
    pub fn max_published(mut self, n: Option<usize>) -> Self {
        self.max_published = n;
        self
    }

    pub fn get_iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    pub fn get_max_published(&self) -> Option<usize> {
        self.max_published
    }
}

/// NMS stage and the exclusive owner of the published detection list
///
/// [update](Suppressor::update) is called from the inference thread once per frame; readers on
/// other threads take snapshots with [detections](Suppressor::detections). NMS runs outside the
/// lock, the lock is taken only to swap the list.
///
#[derive(Debug, Default)]
pub struct Suppressor {
    opts: SuppressorOptions,
    published: PublishedResult<DetectedBox>,
}

impl Suppressor {
    pub fn new(opts: SuppressorOptions) -> Self {
        Self {
            opts,
            published: PublishedResult::new(),
        }
    }

    pub fn options(&self) -> &SuppressorOptions {
        &self.opts
    }

    /// Runs NMS without touching the published list
    ///
    pub fn suppress(&self, candidates: &[DetectedBox]) -> Vec<DetectedBox> {
        let mut survivors = nms(candidates, self.opts.iou_threshold);
        if let Some(n) = self.opts.max_published {
            survivors.truncate(n);
        }
        survivors
    }

    /// Runs NMS and replaces the published list with the survivors
    ///
    /// Returns the number of published boxes.
    ///
    pub fn update(&self, candidates: &[DetectedBox]) -> usize {
        let survivors = self.suppress(candidates);
        let published = survivors.len();
        let generation = self.published.publish(survivors);
        debug!(
            "Published {} boxes out of {} candidates, generation {}",
            published,
            candidates.len(),
            generation
        );
        published
    }

    /// A copy of the published list
    ///
    pub fn detections(&self) -> Vec<DetectedBox> {
        self.published.snapshot()
    }

    /// A copy of at most `limit` boxes of the published list
    ///
    pub fn detections_limited(&self, limit: usize) -> Vec<DetectedBox> {
        self.published.snapshot_limited(limit)
    }

    /// The published list and its generation without copying
    ///
    pub fn published(&self) -> (u64, Arc<Vec<DetectedBox>>) {
        self.published.shared()
    }

    pub fn generation(&self) -> u64 {
        self.published.generation()
    }

    /// Waits for a list newer than `generation`
    ///
    pub fn wait_newer(
        &self,
        generation: u64,
        timeout: Duration,
    ) -> Option<(u64, Arc<Vec<DetectedBox>>)> {
        self.published.wait_newer(generation, timeout)
    }
}

use crate::utils::bbox::DetectedBox;
use crate::{floats_to_bytes, BOX_SIZE};
use rand::distributions::Uniform;
use rand::prelude::ThreadRng;
use rand::Rng;

/// Generates candidate lists that look like decoder output: clusters of jittered boxes around
/// random object positions with random confidences
///
pub struct CandidateGen {
    width: i32,
    height: i32,
    classes: u32,
    gen: ThreadRng,
    dist_jitter: Uniform<i32>,
    dist_conf: Uniform<f32>,
}

impl CandidateGen {
    pub fn new(width: i32, height: i32, classes: u32) -> Self {
        assert!(
            width >= 22 && height >= 22 && classes > 0,
            "Frame must be at least 22x22 with at least one class"
        );
        Self {
            width,
            height,
            classes,
            gen: rand::thread_rng(),
            dist_jitter: Uniform::new_inclusive(-4, 4),
            dist_conf: Uniform::new(0.5, 1.0),
        }
    }

    /// Produces `n` candidates grouped in clusters of up to 5 boxes
    ///
    pub fn take_frame(&mut self, n: usize) -> Vec<DetectedBox> {
        let mut res = Vec::with_capacity(n);
        while res.len() < n {
            let w = self.gen.gen_range(10..self.width / 2);
            let h = self.gen.gen_range(10..self.height / 2);
            let x = self.gen.gen_range(0..self.width - w);
            let y = self.gen.gen_range(0..self.height - h);
            let class_id = self.gen.gen_range(1..=self.classes);
            let cluster = self.gen.gen_range(1..=5).min(n - res.len());
            for _ in 0..cluster {
                res.push(DetectedBox::new(
                    x + self.gen.sample(self.dist_jitter),
                    y + self.gen.sample(self.dist_jitter),
                    w + self.gen.sample(self.dist_jitter),
                    h + self.gen.sample(self.dist_jitter),
                    class_id,
                    self.gen.sample(self.dist_conf),
                ));
            }
        }
        res
    }
}

impl Iterator for CandidateGen {
    type Item = Vec<DetectedBox>;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.gen.gen_range(0..50);
        Some(self.take_frame(n))
    }
}

/// Generates raw SSD output blocks: small random regressions, background-dominated scores
/// and a few confident anchors
///
pub struct RawFrameGen {
    detection_max: usize,
    label_size: usize,
    hot_cells: usize,
    gen: ThreadRng,
    dist_offset: Uniform<f32>,
    dist_cold: Uniform<f32>,
    dist_hot: Uniform<f32>,
}

impl RawFrameGen {
    pub fn new(detection_max: usize, label_size: usize) -> Self {
        assert!(detection_max > 0 && label_size > 1);
        Self {
            detection_max,
            label_size,
            hot_cells: 10,
            gen: rand::thread_rng(),
            dist_offset: Uniform::new(-1.0, 1.0),
            dist_cold: Uniform::new(-10.0, -1.0),
            dist_hot: Uniform::new(1.0, 8.0),
        }
    }

    /// The number of (anchor, class) score cells set to a confident value per frame
    ///
    pub fn hot_cells(mut self, n: usize) -> Self {
        self.hot_cells = n;
        self
    }

    /// Raw `f32` tensors: `(boxes, detections)`
    ///
    pub fn next_tensors(&mut self) -> (Vec<f32>, Vec<f32>) {
        let boxes = (0..self.detection_max * BOX_SIZE)
            .map(|_| self.gen.sample(self.dist_offset))
            .collect::<Vec<_>>();
        let mut detections = (0..self.detection_max * self.label_size)
            .map(|_| self.gen.sample(self.dist_cold))
            .collect::<Vec<_>>();

        for _ in 0..self.hot_cells {
            let anchor = self.gen.gen_range(0..self.detection_max);
            let class_id = self.gen.gen_range(1..self.label_size);
            detections[anchor * self.label_size + class_id] = self.gen.sample(self.dist_hot);
        }

        (boxes, detections)
    }

    /// Raw memory blocks as delivered by the tensor sink: `(boxes, detections)`
    ///
    pub fn next_frame(&mut self) -> (Vec<u8>, Vec<u8>) {
        let (boxes, detections) = self.next_tensors();
        (floats_to_bytes(&boxes), floats_to_bytes(&detections))
    }
}

/// Generates pose heatmaps (`[y][x][keypoint]` layout) with one planted peak per keypoint
///
pub struct HeatmapGen {
    keypoints: usize,
    width: usize,
    height: usize,
    gen: ThreadRng,
    dist_noise: Uniform<f32>,
    dist_peak: Uniform<f32>,
}

impl HeatmapGen {
    pub fn new(keypoints: usize, width: usize, height: usize) -> Self {
        Self {
            keypoints,
            width,
            height,
            gen: rand::thread_rng(),
            dist_noise: Uniform::new(-0.5, 0.3),
            dist_peak: Uniform::new(0.35, 1.0),
        }
    }

    /// The heatmap block and the planted `(x, y, score)` peak of every keypoint
    ///
    pub fn next_heatmap(&mut self) -> (Vec<u8>, Vec<(u32, u32, f32)>) {
        let mut data = (0..self.keypoints * self.width * self.height)
            .map(|_| self.gen.sample(self.dist_noise))
            .collect::<Vec<_>>();

        let peaks = (0..self.keypoints)
            .map(|k| {
                let x = self.gen.gen_range(0..self.width);
                let y = self.gen.gen_range(0..self.height);
                let score = self.gen.sample(self.dist_peak);
                data[x * self.keypoints + y * self.width * self.keypoints + k] = score;
                (x as u32, y as u32, score)
            })
            .collect();

        (floats_to_bytes(&data), peaks)
    }
}

#[cfg(test)]
mod tests {
    use crate::examples::{CandidateGen, HeatmapGen, RawFrameGen};
    use crate::floats_from_bytes;

    #[test]
    fn generators() {
        let mut gen = CandidateGen::new(300, 300, 3);
        let frame = gen.take_frame(17);
        assert_eq!(frame.len(), 17);
        assert!(frame.iter().all(|b| (1..=3).contains(&b.class_id)));
        assert!(frame.iter().all(|b| b.confidence >= 0.5 && b.confidence < 1.0));

        let (boxes, detections) = RawFrameGen::new(4, 3).next_frame();
        assert_eq!(boxes.len(), 4 * 4 * 4);
        assert_eq!(detections.len(), 4 * 3 * 4);

        let smallest = CandidateGen::new(22, 22, 1).take_frame(5);
        assert_eq!(smallest.len(), 5);

        let (heatmap, peaks) = HeatmapGen::new(2, 4, 3).next_heatmap();
        let heatmap = floats_from_bytes(&heatmap);
        assert_eq!(heatmap.len(), 24);
        for (k, (x, y, score)) in peaks.into_iter().enumerate() {
            assert_eq!(heatmap[x as usize * 2 + y as usize * 4 * 2 + k], score);
        }
    }

    #[test]
    #[should_panic]
    fn too_small_frame() {
        CandidateGen::new(21, 100, 1);
    }
}

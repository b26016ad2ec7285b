use nnsdetect::examples::HeatmapGen;
use nnsdetect::pose::{PoseEstimator, PoseOptions};
use nnsdetect::worker::{FrameWorker, TensorFrame};
use std::sync::Arc;

const DISPLAY_WIDTH: u32 = 640;
const DISPLAY_HEIGHT: u32 = 480;

fn main() {
    env_logger::init();

    let opts = PoseOptions::default();
    let estimator = Arc::new(PoseEstimator::new(opts.clone()));
    let worker = FrameWorker::new(estimator.clone());
    let (width, height) = opts.get_heatmap_size();
    let mut gen = HeatmapGen::new(opts.get_keypoints(), width as usize, height as usize);

    for _ in 0..10 {
        let (heatmap, _) = gen.next_heatmap();
        worker.push(TensorFrame::new(vec![heatmap])).unwrap();
        worker.wait_idle();

        for (from, to) in estimator.segments() {
            let (x1, y1) = from.scale_to(DISPLAY_WIDTH, DISPLAY_HEIGHT, &opts);
            let (x2, y2) = to.scale_to(DISPLAY_WIDTH, DISPLAY_HEIGHT, &opts);
            println!("({:.1}, {:.1}) -> ({:.1}, {:.1})", x1, y1, x2, y2);
        }
        println!("---");
    }
}

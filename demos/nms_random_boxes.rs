use nnsdetect::examples::CandidateGen;
use nnsdetect::suppressor::{Suppressor, SuppressorOptions};

fn main() {
    env_logger::init();

    let suppressor = Suppressor::new(
        SuppressorOptions::default()
            .iou_threshold(0.5)
            .max_published(Some(10)),
    );

    for candidates in CandidateGen::new(640, 480, 5).take(5) {
        let published = suppressor.update(&candidates);
        println!("{} candidates, {} kept", candidates.len(), published);
        for b in suppressor.detections() {
            println!("  {:?}", b);
        }
    }
}

use log::info;
use nnsdetect::anchors::SSD_MOBILENET_V2_DETECTION_MAX;
use nnsdetect::context::DetectorContext;
use nnsdetect::decoder::COCO_LABEL_SIZE;
use nnsdetect::examples::RawFrameGen;
use nnsdetect::worker::{FrameWorker, TensorFrame};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    env_logger::init();

    let ctx = Arc::new(DetectorContext::builder().display_limit(5).build().unwrap());
    let mut worker = FrameWorker::bounded(ctx.clone(), 2);

    let producer = {
        let sender = worker.sender();
        thread::spawn(move || {
            let mut gen = RawFrameGen::new(SSD_MOBILENET_V2_DETECTION_MAX, COCO_LABEL_SIZE);
            for _ in 0..100 {
                let (boxes, detections) = gen.next_frame();
                // the sink is leaky: frames arriving while the queue is full are lost
                if sender
                    .try_push(TensorFrame::new(vec![boxes, detections]))
                    .is_err()
                {
                    info!("Frame skipped");
                }
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let mut seen = 0;
    let timeout = Duration::from_millis(100);
    for _ in 0..20 {
        if let Some((generation, _)) = ctx.suppressor().wait_newer(seen, timeout) {
            seen = generation;
            for b in ctx.detections_for_display() {
                println!(
                    "frame {}: class {} ({:.3}) at [{}, {}, {}, {}]",
                    generation, b.class_id, b.confidence, b.x, b.y, b.width, b.height
                );
            }
        }
    }

    producer.join().unwrap();
    println!("{:?}", worker.shutdown());
}

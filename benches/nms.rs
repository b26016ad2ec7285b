#![feature(test)]

extern crate test;

use nnsdetect::examples::CandidateGen;
use nnsdetect::utils::nms::{nms, DEFAULT_NMS_IOU_THRESHOLD};
use test::Bencher;

#[bench]
fn nms_00010(b: &mut Bencher) {
    bench_nms(10, b);
}

#[bench]
fn nms_00100(b: &mut Bencher) {
    bench_nms(100, b);
}

#[bench]
fn nms_00300(b: &mut Bencher) {
    bench_nms(300, b);
}

#[bench]
fn nms_01000(b: &mut Bencher) {
    bench_nms(1000, b);
}

fn bench_nms(objects: usize, b: &mut Bencher) {
    let mut gen = CandidateGen::new(1280, 720, 10);
    let frames = (0..16).map(|_| gen.take_frame(objects)).collect::<Vec<_>>();
    let mut frame = frames.iter().cycle();

    b.iter(|| {
        if let Some(candidates) = frame.next() {
            nms(candidates, DEFAULT_NMS_IOU_THRESHOLD);
        }
    });
}

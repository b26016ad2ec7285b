use crate::anchors::{AnchorPrior, AnchorTable};
use crate::decoder::{BoxDecoder, DecoderOptions};
use crate::floats_to_bytes;
use std::sync::Arc;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two identical anchors in the image center: 1 real class + background
pub fn two_anchor_table() -> AnchorTable {
    AnchorTable::from(vec![
        AnchorPrior::new(0.5, 0.5, 1.0, 1.0),
        AnchorPrior::new(0.5, 0.5, 1.0, 1.0),
    ])
}

pub fn two_anchor_options() -> DecoderOptions {
    DecoderOptions::ssd_mobilenet_v2()
        .detection_max(2)
        .label_size(3)
}

pub fn two_anchor_decoder() -> BoxDecoder {
    BoxDecoder::new(Arc::new(two_anchor_table()), two_anchor_options()).unwrap()
}

/// Zero regressions and class-1 logits 5 and 3: two identical full-frame boxes
pub fn two_anchor_frame() -> (Vec<u8>, Vec<u8>) {
    (
        floats_to_bytes(&[0.0; 8]),
        floats_to_bytes(&[-100.0, 5.0, -100.0, -100.0, 3.0, -100.0]),
    )
}

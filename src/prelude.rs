pub use crate::anchors::{ssd_mobilenet_v2_anchors, AnchorPrior, AnchorTable, SsdAnchorGenerator};
pub use crate::context::{DetectorContext, DetectorContextBuilder};
pub use crate::decoder::{BoxDecoder, DecoderOptions};
pub use crate::labels::Labels;
pub use crate::pose::{PoseEstimator, PoseKeypoint, PoseOptions, POSE_SKELETON};
pub use crate::suppressor::{Suppressor, SuppressorOptions};
pub use crate::utils::bbox::DetectedBox;
pub use crate::utils::nms::nms;
pub use crate::utils::published::PublishedResult;
pub use crate::worker::{FrameProcessor, FrameSender, FrameWorker, TensorFrame, WorkerStats};
pub use crate::Errors;

/// Bounding boxes
pub mod bbox;

/// Non maximum suppression implementation for detected boxes
pub mod nms;

/// Mutex-guarded result list shared between the producer and the readers
pub mod published;

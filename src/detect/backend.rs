use anyhow::Result;

use crate::detect::labels::LabelMap;
use crate::frame::Frame;

/// One box as the model reports it, before class resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    /// `[x1, y1, x2, y2]` in frame pixels.
    pub bbox: [f32; 4],
    pub confidence: Option<f32>,
}

impl RawDetection {
    pub fn new(class_id: u32, bbox: [f32; 4], confidence: Option<f32>) -> Self {
        Self {
            class_id,
            bbox,
            confidence,
        }
    }
}

/// Detector backend trait.
///
/// The pipeline calls `detect` once per frame, in stream order, and never
/// retries. A returned error is treated as a frame with no detections.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class vocabulary. Resolved once when a session starts.
    fn labels(&self) -> &LabelMap;

    /// Run detection on a frame. Output order is preserved downstream.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

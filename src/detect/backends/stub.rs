use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::{DetectorBackend, RawDetection};
use crate::detect::labels::LabelMap;
use crate::frame::Frame;

/// Stub backend for demos and smoke runs. Uses pixel hashing.
///
/// A frame whose pixels differ from the previous frame yields one detection
/// whose class and box are derived from the SHA-256 of the pixels, so the
/// same input video always produces the same output.
pub struct StubBackend {
    labels: LabelMap,
    last_hash: Option<[u8; 32]>,
}

impl StubBackend {
    pub fn new(labels: LabelMap) -> Self {
        Self {
            labels,
            last_hash: None,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(LabelMap::coco())
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let current_hash: [u8; 32] = Sha256::digest(frame.pixels()).into();

        let changed = match self.last_hash {
            Some(prev) => prev != current_hash,
            None => false,
        };

        self.last_hash = Some(current_hash);

        if !changed || self.labels.is_empty() || frame.width < 4 || frame.height < 4 {
            return Ok(Vec::new());
        }

        let class_id = u32::from(current_hash[0]) % self.labels.len() as u32;
        let (w, h) = (frame.width as f32, frame.height as f32);
        let frac = |b: u8| f32::from(b) / 255.0;
        // Top-left in the first half of the frame, size between a quarter and a half.
        let x1 = frac(current_hash[1]) * w * 0.5;
        let y1 = frac(current_hash[2]) * h * 0.5;
        let x2 = x1 + w * (0.25 + frac(current_hash[3]) * 0.25);
        let y2 = y1 + h * (0.25 + frac(current_hash[4]) * 0.25);
        let confidence = 0.5 + frac(current_hash[5]) * 0.5;

        Ok(vec![RawDetection::new(
            class_id,
            [x1, y1, x2, y2],
            Some(confidence),
        )])
    }
}

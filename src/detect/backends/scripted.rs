use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::detect::backend::{DetectorBackend, RawDetection};
use crate::detect::labels::LabelMap;
use crate::frame::Frame;

/// Replays a fixed sequence of per-frame results.
///
/// Each `detect` call pops the next scripted entry; once the script is
/// exhausted every frame yields no detections. Used for tests and replaying
/// recorded detector output.
pub struct ScriptedBackend {
    labels: LabelMap,
    script: VecDeque<Result<Vec<RawDetection>, String>>,
    calls: Arc<AtomicU64>,
}

impl ScriptedBackend {
    pub fn new(labels: LabelMap) -> Self {
        Self {
            labels,
            script: VecDeque::new(),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue the detections for the next frame.
    pub fn then(mut self, detections: Vec<RawDetection>) -> Self {
        self.script.push_back(Ok(detections));
        self
    }

    /// Queue a detector failure for the next frame.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.script.push_back(Err(message.to_string()));
        self
    }

    /// Shared counter of `detect` calls, readable after the backend is moved.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_goes_quiet() -> Result<()> {
        let det = RawDetection::new(2, [1.0, 2.0, 3.0, 4.0], None);
        let mut backend = ScriptedBackend::new(LabelMap::coco())
            .then(vec![det.clone()])
            .then_fail("model crashed");
        let calls = backend.call_counter();
        let frame = Frame::filled(8, 8, 0, [0, 0, 0])?;

        assert_eq!(backend.detect(&frame)?, vec![det]);
        assert!(backend.detect(&frame).is_err());
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        Ok(())
    }
}

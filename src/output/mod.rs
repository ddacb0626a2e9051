//! Annotated video outputs.

mod y4m;

use anyhow::Result;

pub use y4m::Y4mSink;

use crate::frame::Frame;

/// Video sink collaborator.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and release the output. Called once per session; later calls are no-ops.
    fn finish(&mut self) -> Result<()>;
}

/// Discards frames. Used when no output path is configured.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

//! Frame ingestion sources.
//!
//! This module provides different sources for RGB frames:
//! - YUV4MPEG2 files (`.y4m`)
//! - Any local video file FFmpeg can decode (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` source (demos, testing)
//!
//! Sources yield frames strictly in stream order and report end of input as
//! `Ok(None)`. An `Err` is a decode failure for one frame; callers may keep
//! pulling.

#[cfg(feature = "ingest-file-ffmpeg")]
pub mod file_ffmpeg;
pub mod normalize;
pub mod synthetic;
pub mod y4m;

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file_ffmpeg::FfmpegFileSource;
pub use synthetic::SyntheticSource;
pub use y4m::Y4mSource;

use crate::config::SourceSettings;
use crate::frame::Frame;

/// Rational frame rate, `num / den` frames per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{:.3}", self.as_f64())
        }
    }
}

/// Dimensions and rate declared by a source. Stable for the whole session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
}

/// Video source collaborator.
pub trait FrameSource {
    fn info(&self) -> StreamInfo;

    /// Next frame, `Ok(None)` at end of input.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Open the source named in the settings.
///
/// `stub://...` is synthetic, `*.y4m` is read natively, anything else needs
/// the FFmpeg feature. Remote URLs are rejected.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let path = settings.path.as_str();
    if !is_local_file_path(path) {
        return Err(anyhow!(
            "video source only supports local paths or stub:// (got '{}')",
            path
        ));
    }
    if path.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(
            path,
            settings.width,
            settings.height,
            settings.fps,
        )));
    }
    let is_y4m = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("y4m"));
    if is_y4m {
        return Ok(Box::new(Y4mSource::open(Path::new(path))?));
    }
    open_with_ffmpeg(path)
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_with_ffmpeg(path: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegFileSource::open(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_with_ffmpeg(path: &str) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "'{}' is not a .y4m file; other containers require the ingest-file-ffmpeg feature",
        path
    ))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(path: &str) -> SourceSettings {
        SourceSettings {
            path: path.to_string(),
            fps: 15,
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn stub_source_uses_configured_geometry() -> Result<()> {
        let mut source = open_source(&settings("stub://lobby"))?;
        let info = source.info();
        assert_eq!((info.width, info.height), (32, 24));
        assert_eq!(info.fps, FrameRate::new(15, 1));
        assert!(source.next_frame()?.is_some());
        Ok(())
    }

    #[test]
    fn rejects_remote_and_empty_paths() {
        assert!(open_source(&settings("rtsp://camera/1")).is_err());
        assert!(open_source(&settings("  ")).is_err());
    }

    #[test]
    fn frame_rate_display() {
        assert_eq!(FrameRate::new(30, 1).to_string(), "30");
        assert_eq!(FrameRate::new(30000, 1001).to_string(), "29.970");
    }
}

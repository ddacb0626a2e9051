use anyhow::Result;

use super::{FrameRate, FrameSource, StreamInfo};
use crate::frame::Frame;

/// Generated gradient frames for `stub://` sources.
///
/// Every frame differs from the previous one; the pattern shifts harder every
/// 50 frames to mimic a scene change.
pub struct SyntheticSource {
    name: String,
    info: StreamInfo,
    frame_limit: Option<u64>,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(name: &str, width: u32, height: u32, fps: u32) -> Self {
        log::info!("SyntheticSource: connected to {} (synthetic)", name);
        Self {
            name: name.to_string(),
            info: StreamInfo {
                width,
                height,
                fps: FrameRate::new(fps.max(1), 1),
            },
            frame_limit: None,
            frame_count: 0,
            scene_state: 0,
        }
    }

    /// End the stream after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.info.width as usize * self.info.height as usize * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(37);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let pixels = self.generate_synthetic_pixels();
        let index = self.frame_count;
        self.frame_count += 1;
        Ok(Some(Frame::new(
            pixels,
            self.info.width,
            self.info.height,
            index,
        )?))
    }
}

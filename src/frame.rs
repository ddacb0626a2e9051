//! RGB frame container.
//!
//! Sources decode into `Frame`, detectors read it, the annotator draws on it
//! and sinks encode it. Pixels are packed RGB24, row-major, no padding.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// One decoded video frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Zero-based position in the source stream.
    pub index: u64,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the length does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    /// A frame filled with a single color.
    pub fn filled(width: u32, height: u32, index: u64, rgb: [u8; 3]) -> Result<Self> {
        let len = rgb_len(width, height)?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..(len / 3) {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, index)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Run `f` against an `RgbImage` view that shares this frame's buffer.
    ///
    /// The buffer is moved into the image and back, no copy is made.
    pub fn with_image_mut<R>(&mut self, f: impl FnOnce(&mut RgbImage) -> R) -> Result<R> {
        let data = std::mem::take(&mut self.data);
        let mut img = RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))?;
        let out = f(&mut img);
        self.data = img.into_raw();
        Ok(out)
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

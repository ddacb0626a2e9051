//! Planar YUV <-> packed RGB24 conversion (BT.601, full range).

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chroma {
    /// Full-resolution U and V planes.
    C444,
    /// U and V subsampled 2x2.
    C420,
    /// Luma only.
    Mono,
}

impl Chroma {
    /// Bytes in one planar frame of this layout.
    pub fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let y_plane = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("YUV frame dimensions overflow"))?;
        let (cw, ch) = self.chroma_dims(width, height);
        let c_plane = cw * ch;
        Ok(match self {
            Chroma::Mono => y_plane,
            _ => y_plane + 2 * c_plane,
        })
    }

    fn chroma_dims(self, width: u32, height: u32) -> (usize, usize) {
        match self {
            Chroma::C444 => (width as usize, height as usize),
            Chroma::C420 => (width.div_ceil(2) as usize, height.div_ceil(2) as usize),
            Chroma::Mono => (0, 0),
        }
    }
}

pub fn planar_to_rgb(pixels: &[u8], width: u32, height: u32, chroma: Chroma) -> Result<Vec<u8>> {
    let expected = chroma.frame_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "YUV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;
    let (cw, ch) = chroma.chroma_dims(width, height);
    let c_plane = cw * ch;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let (u, v) = match chroma {
                Chroma::Mono => (0.0, 0.0),
                Chroma::C444 | Chroma::C420 => {
                    let (ci, cj) = if chroma == Chroma::C420 {
                        (i / 2, j / 2)
                    } else {
                        (i, j)
                    };
                    let idx = cj * cw + ci;
                    (
                        pixels[y_plane + idx] as f32 - 128.0,
                        pixels[y_plane + c_plane + idx] as f32 - 128.0,
                    )
                }
            };

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(rgb)
}

/// Packed RGB24 to planar 4:4:4 (Y plane, then U, then V).
pub fn rgb_to_planar_444(rgb: &[u8]) -> Vec<u8> {
    let n = rgb.len() / 3;
    let mut out = vec![0u8; n * 3];
    for (p, px) in rgb.chunks_exact(3).enumerate() {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
        let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
        out[p] = clamp_to_u8(y);
        out[n + p] = clamp_to_u8(u);
        out[2 * n + p] = clamp_to_u8(v);
    }
    out
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_produces_gray() -> Result<()> {
        let i420 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = planar_to_rgb(&i420, 2, 2, Chroma::C420)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn odd_dimensions_round_chroma_up() -> Result<()> {
        assert_eq!(Chroma::C420.frame_len(3, 3)?, 9 + 2 * 4);
        let rgb = planar_to_rgb(&vec![128u8; 17], 3, 3, Chroma::C420)?;
        assert_eq!(rgb.len(), 27);
        Ok(())
    }

    #[test]
    fn mono_expands_luma() -> Result<()> {
        let rgb = planar_to_rgb(&[0, 255], 2, 1, Chroma::Mono)?;
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
        Ok(())
    }

    #[test]
    fn rgb_444_conversion_is_near_lossless() -> Result<()> {
        let rgb = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 30, 140, 220];
        let planar = rgb_to_planar_444(&rgb);
        let back = planar_to_rgb(&planar, 4, 1, Chroma::C444)?;
        for (a, b) in rgb.iter().zip(back.iter()) {
            assert!((*a as i16 - *b as i16).abs() <= 2, "{} vs {}", a, b);
        }
        Ok(())
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(planar_to_rgb(&[0u8; 5], 2, 2, Chroma::C420).is_err());
    }
}

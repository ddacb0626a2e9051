//! Box and label rendering.

mod glyphs;

use anyhow::Result;
use image::{Rgb as Pixel, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::color::{ColorAssigner, Rgb};
use crate::frame::Frame;
use crate::record::{BoundingBox, DetectionRecord};

pub use glyphs::text_size;

const DEFAULT_THICKNESS: u32 = 2;
const DEFAULT_TEXT_SCALE: u32 = 2;
const LABEL_PADDING: u32 = 2;

/// What one `annotate` call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    pub drawn: usize,
    /// Records whose box was degenerate or outside the frame.
    pub skipped: usize,
}

/// Draws detection boxes and class labels in per-class colors.
#[derive(Debug)]
pub struct FrameAnnotator {
    colors: ColorAssigner,
    thickness: u32,
    text_scale: u32,
}

impl FrameAnnotator {
    pub fn new(colors: ColorAssigner) -> Self {
        Self {
            colors,
            thickness: DEFAULT_THICKNESS,
            text_scale: DEFAULT_TEXT_SCALE,
        }
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    pub fn with_text_scale(mut self, scale: u32) -> Self {
        self.text_scale = scale.max(1);
        self
    }

    pub fn colors(&mut self) -> &mut ColorAssigner {
        &mut self.colors
    }

    /// Draw every record with a usable box; skip the rest silently.
    ///
    /// A frame with no records is left untouched.
    pub fn annotate(&mut self, frame: &mut Frame, records: &[DetectionRecord]) -> Result<AnnotationStats> {
        let mut stats = AnnotationStats::default();
        if records.is_empty() {
            return Ok(stats);
        }

        let (width, height) = (frame.width, frame.height);
        let mut visible = Vec::with_capacity(records.len());
        for record in records {
            match record.bbox.clamp_to(width, height) {
                Some(bbox) => visible.push((bbox, self.colors.color_for(&record.class_name), label_text(record))),
                None => {
                    log::debug!(
                        "frame {}: not drawing {} with unusable box {:?}",
                        record.frame_index,
                        record.class_name,
                        record.bbox
                    );
                    stats.skipped += 1;
                }
            }
        }
        if visible.is_empty() {
            return Ok(stats);
        }

        let (thickness, scale) = (self.thickness, self.text_scale);
        frame.with_image_mut(|img| {
            for (bbox, color, label) in &visible {
                draw_box(img, bbox, *color, thickness);
                draw_label(img, bbox, *color, label, scale);
            }
        })?;
        stats.drawn = visible.len();
        Ok(stats)
    }
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new(ColorAssigner::new())
    }
}

fn label_text(record: &DetectionRecord) -> String {
    match record.confidence {
        Some(conf) => format!("{} {:.2}", record.class_name, conf),
        None => record.class_name.clone(),
    }
}

/// `bbox` is inclusive and already clamped into the image.
fn draw_box(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb, thickness: u32) {
    let w = (bbox.width() + 1) as u32;
    let h = (bbox.height() + 1) as u32;
    for k in 0..thickness {
        if 2 * k >= w || 2 * k >= h {
            break;
        }
        let rect = Rect::at(bbox.x1 + k as i32, bbox.y1 + k as i32).of_size(w - 2 * k, h - 2 * k);
        draw_hollow_rect_mut(img, rect, Pixel(color.channels()));
    }
}

/// Filled tab above the box's top-left corner, or just inside it when the
/// box touches the top edge.
fn draw_label(img: &mut RgbImage, bbox: &BoundingBox, color: Rgb, text: &str, scale: u32) {
    let (text_w, text_h) = text_size(text, scale);
    if text_w == 0 {
        return;
    }
    let tab_w = text_w + 2 * LABEL_PADDING;
    let tab_h = text_h + 2 * LABEL_PADDING;
    let top = if bbox.y1 >= tab_h as i32 {
        bbox.y1 - tab_h as i32
    } else {
        bbox.y1
    };
    draw_filled_rect_mut(
        img,
        Rect::at(bbox.x1, top).of_size(tab_w, tab_h),
        Pixel(color.channels()),
    );

    let ink = Pixel(contrasting_ink(color));
    let origin_x = bbox.x1 + LABEL_PADDING as i32;
    let origin_y = top + LABEL_PADDING as i32;
    for (i, c) in text.chars().enumerate() {
        let rows = glyphs::glyph(c);
        let gx = origin_x + (i as u32 * glyphs::GLYPH_ADVANCE * scale) as i32;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..glyphs::GLYPH_WIDTH {
                if bits & (1 << (glyphs::GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = gx + (col * scale) as i32;
                let py = origin_y + (row as u32 * scale) as i32;
                fill_block(img, px, py, scale, ink);
            }
        }
    }
}

fn fill_block(img: &mut RgbImage, x: i32, y: i32, size: u32, ink: Pixel<u8>) {
    for dy in 0..size as i32 {
        for dx in 0..size as i32 {
            let (px, py) = (x + dx, y + dy);
            if px >= 0 && py >= 0 && (px as u32) < img.width() && (py as u32) < img.height() {
                img.put_pixel(px as u32, py as u32, ink);
            }
        }
    }
}

/// Black on light colors, white on dark ones.
fn contrasting_ink(color: Rgb) -> [u8; 3] {
    let [r, g, b] = color.channels();
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 140.0 {
        [0, 0, 0]
    } else {
        [255, 255, 255]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::derive_color;
    use crate::record::Timestamp;
    use chrono::NaiveDate;

    fn record(class_name: &str, bbox: BoundingBox) -> DetectionRecord {
        let at = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        DetectionRecord::new(class_name, Timestamp::new(at), bbox, None, 0)
    }

    fn blank() -> Frame {
        Frame::filled(120, 90, 0, [0, 0, 0]).unwrap()
    }

    #[test]
    fn empty_record_list_leaves_frame_untouched() -> Result<()> {
        let mut frame = blank();
        let stats = FrameAnnotator::default().annotate(&mut frame, &[])?;
        assert_eq!(stats, AnnotationStats::default());
        assert_eq!(frame, blank());
        Ok(())
    }

    #[test]
    fn draws_box_outline_in_class_color() -> Result<()> {
        let mut frame = blank();
        let car = derive_color("car").channels();
        let stats = FrameAnnotator::default()
            .annotate(&mut frame, &[record("car", BoundingBox::new(30, 40, 80, 70))])?;

        assert_eq!(stats, AnnotationStats { drawn: 1, skipped: 0 });
        assert_eq!(frame.pixel(30, 55), Some(car));
        assert_eq!(frame.pixel(31, 55), Some(car));
        assert_eq!(frame.pixel(80, 55), Some(car));
        assert_eq!(frame.pixel(55, 70), Some(car));
        // Interior stays clear.
        assert_eq!(frame.pixel(55, 60), Some([0, 0, 0]));
        // Label tab sits above the box.
        assert_eq!(frame.pixel(30, 40 - 1), Some(car));
        Ok(())
    }

    #[test]
    fn label_moves_inside_box_at_top_edge() -> Result<()> {
        let mut frame = blank();
        let person = derive_color("person").channels();
        FrameAnnotator::default()
            .annotate(&mut frame, &[record("person", BoundingBox::new(10, 0, 110, 80))])?;
        // Tab occupies the top-left inside the box; the far bottom-left is still clear.
        assert_eq!(frame.pixel(12, 1), Some(person));
        assert_eq!(frame.pixel(50, 60), Some([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn skips_degenerate_boxes_without_drawing() -> Result<()> {
        let mut frame = blank();
        let stats = FrameAnnotator::default().annotate(
            &mut frame,
            &[
                record("car", BoundingBox::new(20, 20, 20, 60)),
                record("car", BoundingBox::new(500, 20, 600, 60)),
            ],
        )?;
        assert_eq!(stats, AnnotationStats { drawn: 0, skipped: 2 });
        assert_eq!(frame, blank());
        Ok(())
    }

    #[test]
    fn clamps_boxes_partly_outside_frame() -> Result<()> {
        let mut frame = blank();
        let stats = FrameAnnotator::default()
            .annotate(&mut frame, &[record("truck", BoundingBox::new(-20, 30, 200, 60))])?;
        assert_eq!(stats.drawn, 1);
        let truck = derive_color("truck").channels();
        assert_eq!(frame.pixel(0, 45), Some(truck));
        assert_eq!(frame.pixel(119, 45), Some(truck));
        Ok(())
    }
}

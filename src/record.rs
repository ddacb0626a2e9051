use chrono::{Local, NaiveDateTime, SubsecRound};
use std::fmt;

/// Rendering used for the store column and the record log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock instant truncated to whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at.trunc_subsecs(0))
    }

    /// Local time now.
    pub fn now() -> Self {
        Self::new(Local::now().naive_local())
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

/// Pixel-space box, `(x1, y1)` top-left and `(x2, y2)` bottom-right.
///
/// Nothing guarantees `x1 < x2` or `y1 < y2`; detectors may emit degenerate
/// boxes and consumers must cope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncates detector coordinates toward zero. Non-finite values become 0.
    pub fn from_f32(coords: [f32; 4]) -> Self {
        let [x1, y1, x2, y2] = coords.map(|v| if v.is_finite() { v as i32 } else { 0 });
        Self { x1, y1, x2, y2 }
    }

    pub fn is_well_formed(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Clamp into a `width` x `height` frame.
    ///
    /// Returns `None` when nothing drawable is left: the box was inverted,
    /// empty, or entirely outside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1).min(i32::MAX as u32) as i32;
        let max_y = (height - 1).min(i32::MAX as u32) as i32;
        let clamped = BoundingBox {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        };
        clamped.is_well_formed().then_some(clamped)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// One detected instance in one frame. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub class_name: String,
    pub timestamp: Timestamp,
    pub bbox: BoundingBox,
    pub confidence: Option<f32>,
    pub frame_index: u64,
}

impl DetectionRecord {
    pub fn new(
        class_name: impl Into<String>,
        timestamp: Timestamp,
        bbox: BoundingBox,
        confidence: Option<f32>,
        frame_index: u64,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            timestamp,
            bbox,
            confidence,
            frame_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    #[test]
    fn timestamp_renders_at_second_precision() {
        let ts = Timestamp::new(at(7, 5, 3, 999));
        assert_eq!(ts.to_string(), "2024-03-09 07:05:03");
        assert_eq!(ts, Timestamp::new(at(7, 5, 3, 0)));
    }

    #[test]
    fn clamp_keeps_boxes_inside_frame() {
        let b = BoundingBox::new(-10, 5, 700, 90);
        assert_eq!(b.clamp_to(640, 480), Some(BoundingBox::new(0, 5, 639, 90)));
    }

    #[test]
    fn clamp_rejects_degenerate_and_outside_boxes() {
        assert_eq!(BoundingBox::new(10, 10, 10, 50).clamp_to(640, 480), None);
        assert_eq!(BoundingBox::new(50, 10, 20, 40).clamp_to(640, 480), None);
        assert_eq!(BoundingBox::new(700, 10, 800, 40).clamp_to(640, 480), None);
        assert_eq!(BoundingBox::new(1, 1, 5, 5).clamp_to(0, 480), None);
    }

    #[test]
    fn from_f32_truncates_like_integer_cast() {
        let b = BoundingBox::from_f32([10.9, 20.2, f32::NAN, 99.99]);
        assert_eq!(b, BoundingBox::new(10, 20, 0, 99));
    }
}

use std::collections::HashMap;

/// 8-bit RGB triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub fn channels(self) -> [u8; 3] {
        self.0
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Per-class display colors.
///
/// Colors are a pure function of the class name, so the same class renders
/// identically within a run and across runs and processes. Two classes may
/// share a color.
#[derive(Debug, Default)]
pub struct ColorAssigner {
    cache: HashMap<String, Rgb>,
}

impl ColorAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color for `class_name`, derived on first use and cached after.
    pub fn color_for(&mut self, class_name: &str) -> Rgb {
        if let Some(color) = self.cache.get(class_name) {
            return *color;
        }
        let color = derive_color(class_name);
        self.cache.insert(class_name.to_string(), color);
        color
    }

    /// Number of distinct classes seen so far.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// FNV-1a over the UTF-8 bytes, finalized with the SplitMix64 mixer so that
/// names differing in one character land far apart.
pub fn derive_color(class_name: &str) -> Rgb {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in class_name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    let mixed = splitmix64(hash);
    Rgb([mixed as u8, (mixed >> 8) as u8, (mixed >> 16) as u8])
}

fn splitmix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_fixed_across_runs() {
        // Pinned values: a change here changes every rendered video.
        assert_eq!(derive_color("car"), Rgb([149, 65, 8]));
        assert_eq!(derive_color("person"), Rgb([50, 83, 163]));
        assert_eq!(derive_color("truck"), Rgb([235, 16, 219]));
    }

    #[test]
    fn repeated_requests_hit_the_cache() {
        let mut colors = ColorAssigner::new();
        let first = colors.color_for("person");
        assert_eq!(colors.len(), 1);
        for _ in 0..5 {
            assert_eq!(colors.color_for("person"), first);
        }
        assert_eq!(colors.len(), 1);

        colors.color_for("car");
        assert_eq!(colors.len(), 2);
    }

    #[test]
    fn separate_assigners_agree() {
        let mut a = ColorAssigner::new();
        let mut b = ColorAssigner::new();
        for name in ["dog", "bicycle", "traffic light"] {
            assert_eq!(a.color_for(name), b.color_for(name));
        }
    }
}

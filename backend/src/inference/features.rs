use image::{Rgb, RgbImage};

const DARK_LEVEL: f64 = 80.0;
const BRIGHT_LEVEL: f64 = 200.0;
const EDGE_DELTA: f64 = 30.0;

/// Global intensity statistics of one scan, the input of the heuristic classifier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector {
    /// Mean channel average, in [0, 255].
    pub brightness: f64,
    pub dark_ratio: f64,
    pub bright_ratio: f64,
    pub edge_ratio: f64,
    /// Mean absolute left/right mirror difference.
    pub asymmetry: f64,
}

fn level(pixel: &Rgb<u8>) -> f64 {
    (pixel[0] as f64 + pixel[1] as f64 + pixel[2] as f64) / 3.0
}

impl FeatureVector {
    pub fn extract(image: &RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let total = width * height;
        if total == 0 {
            return Self::default();
        }

        let levels: Vec<f64> = image.pixels().map(level).collect();

        let mut sum = 0.0;
        let mut dark = 0usize;
        let mut bright = 0usize;
        let mut edges = 0usize;
        for (i, &value) in levels.iter().enumerate() {
            sum += value;
            if value < DARK_LEVEL {
                dark += 1;
            }
            if value > BRIGHT_LEVEL {
                bright += 1;
            }
            let (x, y) = (i % width, i / width);
            if x > 0 && y > 0 && (value - levels[i - 1]).abs() > EDGE_DELTA {
                edges += 1;
            }
        }

        let half = width / 2;
        let mut mirror_diff = 0.0;
        for row in levels.chunks_exact(width) {
            for x in 0..half {
                mirror_diff += (row[x] - row[width - 1 - x]).abs();
            }
        }
        let left_pixels = half * height;

        Self {
            brightness: sum / total as f64,
            dark_ratio: dark as f64 / total as f64,
            bright_ratio: bright as f64 / total as f64,
            edge_ratio: edges as f64 / total as f64,
            asymmetry: if left_pixels > 0 {
                mirror_diff / left_pixels as f64
            } else {
                0.0
            },
        }
    }
}

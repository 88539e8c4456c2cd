use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A decoded scan resized to the classifier resolution. Owned by a single
/// analysis call.
#[derive(Debug, Clone)]
pub struct ScanImage {
    pixels: RgbImage,
}

impl ScanImage {
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Batched NHWC tensor with channel values scaled to [0, 1].
    pub fn to_tensor(&self) -> Array4<f32> {
        let (width, height) = self.pixels.dimensions();
        Array4::from_shape_fn(
            (1, height as usize, width as usize, 3),
            |(_, y, x, c)| self.pixels.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    size: u32,
}

impl Preprocessor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn prepare(&self, bytes: &[u8]) -> Result<ScanImage, PreprocessError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(self.prepare_decoded(&decoded))
    }

    pub fn prepare_decoded(&self, image: &DynamicImage) -> ScanImage {
        let resized = image.resize_exact(self.size, self.size, FilterType::Nearest);
        ScanImage {
            pixels: resized.to_rgb8(),
        }
    }

    /// All-zero input of the right shape, used for the warm-up pass.
    pub fn blank_tensor(&self) -> Array4<f32> {
        Array4::zeros((1, self.size as usize, self.size as usize, 3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode_png(image: RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decodes_and_resizes_to_square_input() {
        let source = RgbImage::from_pixel(640, 480, Rgb([255, 0, 51]));
        let scan = Preprocessor::new(224).prepare(&encode_png(source)).unwrap();

        assert_eq!(scan.pixels().dimensions(), (224, 224));
        let tensor = scan.to_tensor();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert_eq!(tensor[[0, 10, 10, 0]], 1.0);
        assert_eq!(tensor[[0, 10, 10, 1]], 0.0);
        assert!((tensor[[0, 10, 10, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn nearest_neighbour_keeps_hard_edges() {
        let mut source = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        source.put_pixel(1, 0, Rgb([255, 255, 255]));
        let scan = Preprocessor::new(4).prepare_decoded(&DynamicImage::ImageRgb8(source));

        assert_eq!(scan.pixels().get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(scan.pixels().get_pixel(3, 3), &Rgb([255, 255, 255]));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = Preprocessor::new(224).prepare(b"definitely not a raster image").unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
    }

    #[test]
    fn blank_tensor_matches_input_shape() {
        let tensor = Preprocessor::new(32).blank_tensor();
        assert_eq!(tensor.shape(), &[1, 32, 32, 3]);
        assert!(tensor.iter().all(|v| *v == 0.0));
    }
}

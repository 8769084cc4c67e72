use std::path::Path;

use image::{imageops::FilterType, DynamicImage};

use crate::data::ImageShape;
use crate::error::{Result, TrainError};

/// Resizes to `shape`, converts to grayscale and normalizes pixels to [0, 1].
///
/// Returns a flat row-major `Vec<f64>` of length `width * height`.
pub fn grayscale_input(img: &DynamicImage, shape: ImageShape) -> Vec<f64> {
    let resized = img.resize_exact(shape.width, shape.height, FilterType::Lanczos3);
    let gray = resized.to_luma8();
    gray.pixels().map(|p| p.0[0] as f64 / 255.0).collect()
}

/// Decodes an image file (PNG/JPEG/BMP/GIF) and preprocesses it.
pub fn load_grayscale(path: &Path, shape: ImageShape) -> Result<Vec<f64>> {
    let img = image::open(path).map_err(|source| TrainError::Image { path: path.to_path_buf(), source })?;
    Ok(grayscale_input(&img, shape))
}

/// Decodes in-memory image bytes and preprocesses them.
pub fn bytes_to_grayscale(bytes: &[u8], shape: ImageShape) -> std::result::Result<Vec<f64>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    Ok(grayscale_input(&img, shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn output_is_normalized_and_resized() {
        let mut img = GrayImage::new(4, 2);
        img.put_pixel(0, 0, Luma([255]));
        let input = grayscale_input(&DynamicImage::ImageLuma8(img), ImageShape { width: 4, height: 2 });
        assert_eq!(input.len(), 8);
        assert!(input.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(input[1..].iter().all(|&v| v < input[0]));
    }

    #[test]
    fn resize_changes_length() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        assert_eq!(grayscale_input(&img, ImageShape { width: 5, height: 3 }).len(), 15);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(bytes_to_grayscale(b"not an image", ImageShape { width: 2, height: 2 }).is_err());
    }
}

//! Image feature vectors: greyscale, fixed-size resample, row-major flatten.
//!
//! Catalog builds and queries both go through [`vectorize`]; any extra step on
//! one side only would shift every distance, so there is exactly one path.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Default side length of the resampled greyscale image.
pub const DEFAULT_IMAGE_SIZE: u32 = 60;

/// Luma weights applied to R, G, B.
pub const LUMA_WEIGHTS: [f64; 3] = [0.2989, 0.5870, 0.1140];

/// Target size of the resampled image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    pub width: u32,
    pub height: u32,
}

impl VectorizerConfig {
    /// Length of the vectors this configuration produces.
    pub fn feature_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_IMAGE_SIZE,
            height: DEFAULT_IMAGE_SIZE,
        }
    }
}

/// Convert to 8-bit greyscale with [`LUMA_WEIGHTS`], truncating toward zero.
pub fn to_greyscale(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let p = rgb.get_pixel(x, y);
        let luma = LUMA_WEIGHTS[0] * p[0] as f64
            + LUMA_WEIGHTS[1] * p[1] as f64
            + LUMA_WEIGHTS[2] * p[2] as f64;
        Luma([luma as u8])
    })
}

/// Produce the fixed-length feature vector for one image.
pub fn vectorize(img: &DynamicImage, config: &VectorizerConfig) -> Vec<f64> {
    let grey = to_greyscale(img);
    let resized = imageops::resize(&grey, config.width, config.height, FilterType::CatmullRom);
    resized.pixels().map(|p| p[0] as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_vector_length() {
        let img = DynamicImage::new_rgb8(123, 45);
        let v = vectorize(&img, &VectorizerConfig::default());
        assert_eq!(v.len(), 3600);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_luma_weights_truncate() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 255, 255])));
        // 0.2989 + 0.5870 + 0.1140 = 0.9999, so white lands on 254
        assert_eq!(to_greyscale(&img).get_pixel(0, 0)[0], 254);

        let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([100, 0, 0])));
        assert_eq!(to_greyscale(&red).get_pixel(0, 0)[0], 29);
    }

    #[test]
    fn test_uniform_image_stays_uniform() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(17, 9, Rgb([10, 200, 30])));
        let config = VectorizerConfig {
            width: 8,
            height: 4,
        };
        let v = vectorize(&img, &config);
        assert_eq!(v.len(), config.feature_len());
        let expected = to_greyscale(&img).get_pixel(0, 0)[0] as f64;
        assert!(v.iter().all(|&x| x == expected));
    }

    #[test]
    fn test_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(31, 23, |x, y| {
            Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8])
        }));
        let config = VectorizerConfig::default();
        assert_eq!(vectorize(&img, &config), vectorize(&img, &config));
    }

    #[test]
    fn test_row_major_layout() {
        // left half black, right half white at the target size already
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }));
        let v = vectorize(&img, &VectorizerConfig { width: 4, height: 2 });
        assert_eq!(v, vec![0.0, 0.0, 254.0, 254.0, 0.0, 0.0, 254.0, 254.0]);
    }
}

//! Catalog image augmentation: rotations, flips, and photometric jitter.

use image::{imageops, DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Intensity factors used by the rich preset.
pub const RICH_FACTORS: [f32; 2] = [0.8, 1.2];

/// PIL-style 3x3 smoothing kernel, normalised by `filter3x3`.
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];

/// A single transform that turns a source image into a variant.
///
/// Rotations are counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "factor", rename_all = "snake_case")]
pub enum Transform {
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
    MirrorHorizontal,
    FlipVertical,
    Brightness(f32),
    Contrast(f32),
    Sharpness(f32),
}

impl Transform {
    /// Apply this transform to an image.
    pub fn apply(&self, img: &DynamicImage) -> DynamicImage {
        match *self {
            Transform::Identity => img.clone(),
            Transform::Rotate90 => img.rotate270(),
            Transform::Rotate180 => img.rotate180(),
            Transform::Rotate270 => img.rotate90(),
            Transform::MirrorHorizontal => img.fliph(),
            Transform::FlipVertical => img.flipv(),
            Transform::Brightness(f) => DynamicImage::ImageRgb8(brightness(&img.to_rgb8(), f)),
            Transform::Contrast(f) => DynamicImage::ImageRgb8(contrast(&img.to_rgb8(), f)),
            Transform::Sharpness(f) => DynamicImage::ImageRgb8(sharpness(&img.to_rgb8(), f)),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Transform::Identity => "identity".to_string(),
            Transform::Rotate90 => "rotate90".to_string(),
            Transform::Rotate180 => "rotate180".to_string(),
            Transform::Rotate270 => "rotate270".to_string(),
            Transform::MirrorHorizontal => "mirror".to_string(),
            Transform::FlipVertical => "flip".to_string(),
            Transform::Brightness(f) => format!("brightness({f})"),
            Transform::Contrast(f) => format!("contrast({f})"),
            Transform::Sharpness(f) => format!("sharpness({f})"),
        }
    }
}

/// Ordered list of transforms applied to every catalog image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentPlan {
    pub transforms: Vec<Transform>,
}

impl AugmentPlan {
    /// Identity, three rotations, mirror, and vertical flip.
    pub fn standard() -> Self {
        Self {
            transforms: vec![
                Transform::Identity,
                Transform::Rotate90,
                Transform::Rotate180,
                Transform::Rotate270,
                Transform::MirrorHorizontal,
                Transform::FlipVertical,
            ],
        }
    }

    /// The standard plan plus brightness, contrast, and sharpness jitter at
    /// each of [`RICH_FACTORS`].
    pub fn rich() -> Self {
        let mut plan = Self::standard();
        for factor in RICH_FACTORS {
            plan.transforms.push(Transform::Brightness(factor));
            plan.transforms.push(Transform::Contrast(factor));
            plan.transforms.push(Transform::Sharpness(factor));
        }
        plan
    }

    pub fn custom(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Default for AugmentPlan {
    fn default() -> Self {
        Self::standard()
    }
}

/// Expand one decoded image into its ordered variants.
pub fn expand(img: &DynamicImage, plan: &AugmentPlan) -> Vec<(Transform, DynamicImage)> {
    plan.transforms
        .iter()
        .map(|t| (*t, t.apply(img)))
        .collect()
}

/// `degenerate + factor * (base - degenerate)`, clamped per channel.
fn blend(base: &RgbImage, degenerate: &RgbImage, factor: f32) -> RgbImage {
    let (w, h) = base.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let b = base.get_pixel(x, y);
        let d = degenerate.get_pixel(x, y);
        let mut channels = [0u8; 3];
        for c in 0..3 {
            let v = d[c] as f32 + factor * (b[c] as f32 - d[c] as f32);
            channels[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(channels);
    }
    out
}

fn brightness(img: &RgbImage, factor: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let black = RgbImage::new(w, h);
    blend(img, &black, factor)
}

fn contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let pixels = (w as u64 * h as u64).max(1);
    let luma_sum: f64 = img
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum();
    let mean = (luma_sum / pixels as f64).round().clamp(0.0, 255.0) as u8;
    let grey = RgbImage::from_pixel(w, h, Rgb([mean, mean, mean]));
    blend(img, &grey, factor)
}

fn sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    let smoothed: RgbImage = imageops::filter3x3(img, &SMOOTH_KERNEL);
    blend(img, &smoothed, factor)
}

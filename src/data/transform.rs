use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array1;
use rand::Rng;

use super::Split;

/// ImageNet channel statistics used to normalize every input.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize, optionally mirror, scale to [0, 1] and normalize an RGB image,
/// then flatten it channel-major (C, H, W).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransform {
    pub width: u32,
    pub height: u32,
    /// Mirror with probability 0.5; only enabled for training.
    pub horizontal_flip: bool,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl ImageTransform {
    pub fn for_split(split: Split, image_size: [u32; 2]) -> Self {
        ImageTransform {
            width: image_size[0],
            height: image_size[1],
            horizontal_flip: split == Split::Train,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn output_dim(&self) -> usize {
        3 * self.width as usize * self.height as usize
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> Array1<f32> {
        let mirror = self.horizontal_flip && rng.gen_bool(0.5);
        self.to_tensor(image, mirror)
    }

    /// Transform without any random augmentation.
    pub fn apply_deterministic(&self, image: &DynamicImage) -> Array1<f32> {
        self.to_tensor(image, false)
    }

    fn to_tensor(&self, image: &DynamicImage, mirror: bool) -> Array1<f32> {
        let resized = image.resize_exact(self.width, self.height, FilterType::Triangle);
        let resized = if mirror { resized.fliph() } else { resized };
        let rgb = resized.to_rgb8();

        let plane = (self.width * self.height) as usize;
        let mut out = Array1::zeros(self.output_dim());
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = (y * self.width + x) as usize;
            for c in 0..3 {
                let value = pixel.0[c] as f32 / 255.0;
                out[c * plane + offset] = (value - self.mean[c]) / self.std[c];
            }
        }
        out
    }
}

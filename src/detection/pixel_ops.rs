use crate::detection_config::RelativeRegion;
use crate::errors::DetectorError;
use image::{GrayImage, Rgb, RgbImage};

/// Pixel rectangle, half-open on the right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn full(width: u32, height: u32) -> Self {
        PixelRect { x0: 0, y0: 0, x1: width, y1: height }
    }

    pub fn from_relative(region: &RelativeRegion, width: u32, height: u32) -> Result<Self, DetectorError> {
        let scale = |v: f32, size: u32| ((v.clamp(0.0, 1.0) * size as f32).round() as u32).min(size);
        let rect = PixelRect {
            x0: scale(region.x, width),
            y0: scale(region.y, height),
            x1: scale(region.x + region.width, width),
            y1: scale(region.y + region.height, height),
        };
        if rect.area() == 0 {
            return Err(DetectorError::RegionOutOfBounds { width, height });
        }
        Ok(rect)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.x1.saturating_sub(self.x0)) * u64::from(self.y1.saturating_sub(self.y0))
    }
}

pub fn to_luma(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Fraction of pixels inside `rect` whose luma moved by more than `delta`.
/// Both images must share dimensions.
pub fn changed_ratio(previous: &GrayImage, current: &GrayImage, delta: u8, rect: PixelRect) -> f32 {
    let area = rect.area();
    if area == 0 {
        return 0.0;
    }
    let mut changed: u64 = 0;
    for y in rect.y0..rect.y1 {
        for x in rect.x0..rect.x1 {
            let a = previous.get_pixel(x, y).0[0];
            let b = current.get_pixel(x, y).0[0];
            if a.abs_diff(b) > delta {
                changed += 1;
            }
        }
    }
    changed as f32 / area as f32
}

/// Hue in degrees, saturation and value in [0, 1].
pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = pixel.0.map(|c| f32::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;

    let hue = if chroma <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * (((g - b) / chroma).rem_euclid(6.0))
    } else if max == g {
        60.0 * (((b - r) / chroma) + 2.0)
    } else {
        60.0 * (((r - g) / chroma) + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { chroma / max };
    (hue, saturation, max)
}

/// Flame-coloured: reds and oranges wrapping around 0°, bright and saturated.
pub fn is_flame_colored(pixel: &Rgb<u8>, saturation_min: f32, value_min: f32) -> bool {
    let (hue, saturation, value) = rgb_to_hsv(pixel);
    (hue <= 30.0 || hue >= 320.0) && saturation >= saturation_min && value >= value_min
}

pub fn flame_ratio(image: &RgbImage, saturation_min: f32, value_min: f32) -> f32 {
    let total = u64::from(image.width()) * u64::from(image.height());
    if total == 0 {
        return 0.0;
    }
    let flame = image
        .pixels()
        .filter(|p| is_flame_colored(p, saturation_min, value_min))
        .count();
    flame as f32 / total as f32
}

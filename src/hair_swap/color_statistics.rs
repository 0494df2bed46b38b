//! CIE L\*a\*b\* conversion and per-region colour statistics.
//!
//! Lab images are stored as `Image<Rgb<f32>>` whose channels hold `(L, a, b)`
//! in their natural units: `L` in `0..=100`, `a` and `b` signed.

use image::{GenericImageView, Rgb, RgbImage};
use imageproc::definitions::Image;
use imageproc::rect::Rect;
use palette::{FromColor, Lab, Srgb};

use crate::error::ColorConversionError;
use crate::hair_swap::face_model::FaceModel;

/// An image whose three channels hold `(L, a, b)`.
pub type LabImage = Image<Rgb<f32>>;

#[inline]
#[must_use]
pub fn rgb_to_lab(pixel: Rgb<u8>) -> [f32; 3] {
    let Rgb([r, g, b]) = pixel;
    let lab: Lab = Lab::from_color(Srgb::new(r, g, b).into_format::<f32>());
    [lab.l, lab.a, lab.b]
}

#[inline]
#[must_use]
pub fn lab_to_rgb(lab: [f32; 3]) -> Rgb<u8> {
    let [l, a, b] = lab;
    let lab: Lab = Lab::new(l, a, b);
    let srgb: Srgb = Srgb::from_color(lab);
    let srgb: Srgb<u8> = srgb.into_format();
    Rgb([srgb.red, srgb.green, srgb.blue])
}

/// Converts every pixel of `image` to Lab.
#[must_use]
pub fn rgb_to_lab_image<I>(image: &I) -> LabImage
where
    I: GenericImageView<Pixel = Rgb<u8>>,
{
    let (width, height) = image.dimensions();
    Image::from_fn(width, height, |x, y| Rgb(rgb_to_lab(image.get_pixel(x, y))))
}

/// Converts a Lab image back to 8-bit sRGB, clamping out-of-gamut colours.
#[must_use]
pub fn lab_to_rgb_image(image: &LabImage) -> RgbImage {
    let (width, height) = image.dimensions();
    RgbImage::from_fn(width, height, |x, y| lab_to_rgb(image.get_pixel(x, y).0))
}

/// Per-channel mean and population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelStats {
    pub mean: [f32; 3],
    pub std_dev: [f32; 3],
}

impl ChannelStats {
    /// Statistics over all pixels of `image`.
    pub fn from_image<I>(image: &I) -> Result<Self, ColorConversionError>
    where
        I: GenericImageView<Pixel = Rgb<f32>>,
    {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ColorConversionError::EmptyRegion { width, height });
        }
        Self::from_samples(image.pixels().map(|(_, _, p)| p.0))
            .ok_or(ColorConversionError::EmptyRegion { width, height })
    }

    /// Statistics over an arbitrary sample stream; `None` when it is empty.
    pub fn from_samples<It>(samples: It) -> Option<Self>
    where
        It: IntoIterator<Item = [f32; 3]>,
    {
        let mut count = 0_usize;
        let mut sum = [0.0_f64; 3];
        let mut sum_sq = [0.0_f64; 3];
        for sample in samples {
            count += 1;
            for c in 0..3 {
                let v = f64::from(sample[c]);
                sum[c] += v;
                sum_sq[c] += v * v;
            }
        }
        if count == 0 {
            return None;
        }

        let n = count as f64;
        let mut stats = Self::default();
        for c in 0..3 {
            let mean = sum[c] / n;
            let variance = (sum_sq[c] / n - mean * mean).max(0.0);
            stats.mean[c] = mean as f32;
            stats.std_dev[c] = variance.sqrt() as f32;
        }
        Some(stats)
    }
}

/// Lab statistics of the three forehead sampling regions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorStatistics {
    pub region_a: ChannelStats,
    pub region_b: ChannelStats,
    pub region_c: ChannelStats,
    /// Mean `(a, b)` of regions A and C.
    pub average_skin_chroma: [f32; 2],
}

impl ColorStatistics {
    /// Computes the statistics from the three Lab region crops.
    pub fn from_regions<I>(a: &I, b: &I, c: &I) -> Result<Self, ColorConversionError>
    where
        I: GenericImageView<Pixel = Rgb<f32>>,
    {
        let region_a = ChannelStats::from_image(a)?;
        let region_b = ChannelStats::from_image(b)?;
        let region_c = ChannelStats::from_image(c)?;
        let average_skin_chroma = [
            (region_a.mean[1] + region_c.mean[1]) / 2.0,
            (region_a.mean[2] + region_c.mean[2]) / 2.0,
        ];

        Ok(Self {
            region_a,
            region_b,
            region_c,
            average_skin_chroma,
        })
    }

    /// Crops the face's regions from a Lab image and computes their statistics.
    pub fn from_face(lab: &LabImage, face: &FaceModel) -> Result<Self, ColorConversionError> {
        let regions = face.regions();
        let crop = |rect: Rect| crop_lab(lab, rect);
        Self::from_regions(&crop(regions.a), &crop(regions.b), &crop(regions.c))
    }
}

/// Copies `rect` out of a Lab image.
#[must_use]
pub fn crop_lab(lab: &LabImage, rect: Rect) -> LabImage {
    lab.view(
        rect.left() as u32,
        rect.top() as u32,
        rect.width(),
        rect.height(),
    )
    .to_image()
}

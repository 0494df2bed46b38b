//! Forehead reconstruction for the target face.
//!
//! Before new hair can be placed, the target's own fringe has to disappear. The
//! forehead rows covered by hair are repainted with skin whose lightness runs
//! from the temples to the brightest column between the nostrils, and a block
//! texture sampled from the cheeks is blended on top.

use image::{GenericImageView, GrayImage, Luma, RgbImage};
use imageproc::rect::Rect;

use crate::config::SynthesisConfig;
use crate::error::SynthesisError;
use crate::hair_swap::color_statistics::{
    ColorStatistics, LabImage, crop_lab, lab_to_rgb, rgb_to_lab_image,
};
use crate::hair_swap::face_model::FaceModel;
use crate::hair_swap::seamless_clone::{CloneMode, PoissonSolver, seamless_clone};
use crate::hair_swap::texture_synthesis::synthesize_texture;
use crate::utils::validate_matching_dimensions;

/// Rows of the forehead and the face-mask span of each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeheadExtent {
    pub first_row: u32,
    pub last_row: u32,
    /// Inclusive column span per row from `first_row`; `None` for rows the
    /// face mask misses
    pub spans: Vec<Option<(u32, u32)>>,
}

/// Face with the forehead hair painted over.
#[derive(Debug, Clone)]
pub struct SynthesizedFace {
    /// The face on a flat background
    pub image: RgbImage,
    /// Pixels that were repainted
    pub forehead_mask: GrayImage,
    /// Bounding box of `forehead_mask`, `None` when nothing was repainted
    pub forehead_box: Option<Rect>,
}

/// Finds the forehead band: every face row from the top of the face down to
/// the last row where face and hair overlap.
///
/// Returns `None` when no hair lies on the face.
#[must_use]
pub fn find_forehead_extent(face_mask: &GrayImage, hair_alpha: &GrayImage) -> Option<ForeheadExtent> {
    let (width, height) = face_mask.dimensions();
    let row_span = |y: u32| {
        let mut span: Option<(u32, u32)> = None;
        for x in 0..width {
            if face_mask.get_pixel(x, y)[0] > 0 {
                span = Some(span.map_or((x, x), |(first, _)| (first, x)));
            }
        }
        span
    };

    let first_row = (0..height).find(|&y| row_span(y).is_some())?;
    let last_row = (0..height).rev().find(|&y| {
        (0..width).any(|x| face_mask.get_pixel(x, y)[0] > 0 && hair_alpha.get_pixel(x, y)[0] > 0)
    })?;

    let spans = (first_row..=last_row).map(row_span).collect();
    Some(ForeheadExtent {
        first_row,
        last_row,
        spans,
    })
}

/// Repaints the forehead of a face with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct SkinSynthesizer {
    config: SynthesisConfig,
}

impl SkinSynthesizer {
    #[must_use]
    pub const fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Removes the hair described by `hair_alpha` from the forehead of `image`.
    ///
    /// # Errors
    ///
    /// * `SynthesisError::DimensionMismatch` - When `face` or `hair_alpha` have another size
    /// * `SynthesisError::InvalidParameter` - When the texture block size is zero
    /// * `SynthesisError::ColorConversion` - When a sampling region is empty
    /// * `SynthesisError::SeamlessClone` - When blending fails
    pub fn synthesize(
        &self,
        image: &RgbImage,
        face: &FaceModel,
        hair_alpha: &GrayImage,
    ) -> Result<SynthesizedFace, SynthesisError> {
        let (width, height) = image.dimensions();
        for (w, h) in [face.dimensions(), hair_alpha.dimensions()] {
            validate_matching_dimensions(width, height, w, h, "SkinSynthesizer").map_err(|_| {
                SynthesisError::DimensionMismatch {
                    expected: (width, height),
                    actual: (w, h),
                }
            })?;
        }
        if self.config.block_size == 0 {
            return Err(SynthesisError::InvalidParameter(
                "block_size must be > 0".to_owned(),
            ));
        }

        let lab = rgb_to_lab_image(image);
        let statistics = ColorStatistics::from_face(&lab, face)?;
        log::debug!("Skin statistics: {statistics:?}");

        let face_mask = face.face_mask();
        let fill = image::Rgb(self.config.background_fill);
        let hair_free = RgbImage::from_fn(width, height, |x, y| {
            if face_mask.get_pixel(x, y)[0] > 0 {
                *image.get_pixel(x, y)
            } else {
                fill
            }
        });

        let Some(extent) = find_forehead_extent(face_mask, hair_alpha) else {
            log::info!("No hair on the face, nothing to synthesize");
            return Ok(SynthesizedFace {
                image: hair_free,
                forehead_mask: GrayImage::new(width, height),
                forehead_box: None,
            });
        };

        let mut patch = hair_free.clone();
        let mut forehead_mask = GrayImage::new(width, height);
        paint_forehead_impl(&lab, face, &statistics, &extent, &mut patch, &mut forehead_mask);

        let Some(forehead_box) = mask_box_impl(&forehead_mask) else {
            log::info!("Forehead lies entirely in the eye band, nothing to synthesize");
            return Ok(SynthesizedFace {
                image: hair_free,
                forehead_mask,
                forehead_box: None,
            });
        };
        let center = (
            forehead_box.left() + forehead_box.width() as i32 / 2,
            forehead_box.top() + forehead_box.height() as i32 / 2,
        );
        log::debug!("Forehead box {forehead_box:?}, centre {center:?}");

        let solver = PoissonSolver {
            iterations: self.config.poisson_iterations,
            omega: self.config.sor_omega,
        };
        let shaded = seamless_clone(
            &patch,
            &hair_free,
            &forehead_mask,
            center,
            CloneMode::Normal,
            solver,
        )?;

        let strip = reference_strip_impl(image, face);
        let texture = synthesize_texture(
            &strip,
            forehead_box.width(),
            forehead_box.height(),
            self.config.block_size,
            self.config.median_radius,
        );
        let mut textured = shaded.clone();
        for (x, y, pixel) in texture.enumerate_pixels() {
            textured.put_pixel(
                forehead_box.left() as u32 + x,
                forehead_box.top() as u32 + y,
                *pixel,
            );
        }
        let image = seamless_clone(
            &textured,
            &shaded,
            &forehead_mask,
            center,
            CloneMode::Mixed,
            solver,
        )?;

        log::info!(
            "Synthesized forehead rows {}..={}",
            extent.first_row,
            extent.last_row
        );
        Ok(SynthesizedFace {
            image,
            forehead_mask,
            forehead_box: Some(forehead_box),
        })
    }
}

/// Column of the region holding its largest lightness, first in row-major order.
fn brightest_column_impl(region: &LabImage) -> u32 {
    let mut best = (0, f32::NEG_INFINITY);
    for (x, _, pixel) in region.enumerate_pixels() {
        if pixel[0] > best.1 {
            best = (x, pixel[0]);
        }
    }
    best.0
}

#[inline]
fn interpolate_impl(start: f32, end: f32, k: u32, n: u32) -> f32 {
    if n == 0 {
        start
    } else {
        start + k as f32 * (end - start) / n as f32
    }
}

fn paint_forehead_impl(
    lab: &LabImage,
    face: &FaceModel,
    statistics: &ColorStatistics,
    extent: &ForeheadExtent,
    patch: &mut RgbImage,
    forehead_mask: &mut GrayImage,
) {
    let regions = face.regions();
    let region_a = crop_lab(lab, regions.a);
    let region_b = crop_lab(lab, regions.b);
    let region_c = crop_lab(lab, regions.c);

    let brightest = brightest_column_impl(&region_b);
    let middle = regions.b.left() + brightest as i32;
    let eye_box = face.eye_box();
    let [a, b] = statistics.average_skin_chroma;

    for (row, span) in extent.spans.iter().enumerate() {
        let Some((first, last)) = *span else {
            continue;
        };
        let y = extent.first_row + row as u32;
        let row = row as u32;

        let left_l = region_a.get_pixel(0, row % region_a.height())[0]
            .max(statistics.region_a.mean[0]);
        let right_l = region_c
            .get_pixel(region_c.width() - 1, row % region_c.height())[0]
            .max(statistics.region_c.mean[0]);
        let bright_l = region_b.get_pixel(brightest, row % region_b.height())[0];

        let mut left_end = middle.min(last as i32);
        let mut right_start = middle.max(first as i32);
        // Below the top of the eyes each ramp stops at the eye box.
        if y as i32 > eye_box.top {
            left_end = left_end.min(eye_box.left);
            right_start = right_start.max(eye_box.right);
        }

        let mut paint = |x: u32, l: f32| {
            patch.put_pixel(x, y, lab_to_rgb([l, a, b]));
            forehead_mask.put_pixel(x, y, Luma([255]));
        };

        if left_end >= first as i32 {
            let left_end = left_end as u32;
            let n = left_end - first;
            for x in first..=left_end {
                paint(x, interpolate_impl(left_l, bright_l, x - first, n));
            }
        }

        if right_start <= last as i32 {
            let right_start = right_start as u32;
            let n = last - right_start;
            for x in right_start..=last {
                paint(x, interpolate_impl(bright_l, right_l, x - right_start, n));
            }
        }
    }
}

/// The wider of the two temple regions, cut from the photo.
fn reference_strip_impl(image: &RgbImage, face: &FaceModel) -> RgbImage {
    let regions = face.regions();
    let rect = if regions.c.width() > regions.a.width() {
        regions.c
    } else {
        regions.a
    };
    image
        .view(
            rect.left() as u32,
            rect.top() as u32,
            rect.width(),
            rect.height(),
        )
        .to_image()
}

fn mask_box_impl(mask: &GrayImage) -> Option<Rect> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] > 0 {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(x), b.max(y)),
            });
        }
    }
    bounds.map(|(l, t, r, b)| Rect::at(l as i32, t as i32).of_size(r - l + 1, b - t + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hair_swap::color_statistics::rgb_to_lab;
    use crate::test_utils::*;

    fn portrait_hair_alpha() -> GrayImage {
        GrayImage::from_fn(200, 240, |x, y| {
            Luma([if in_synthetic_hair(x, y) { 255 } else { 0 }])
        })
    }

    // --- Success Cases ---

    #[test]
    fn find_forehead_extent_spans_face_top_to_last_hair_row() {
        let mut face = GrayImage::new(10, 10);
        for y in 2..9 {
            for x in 3..7 {
                face.put_pixel(x, y, Luma([255]));
            }
        }
        let mut hair = GrayImage::new(10, 10);
        hair.put_pixel(4, 4, Luma([200]));
        hair.put_pixel(9, 7, Luma([255]));

        let extent = find_forehead_extent(&face, &hair).unwrap();

        assert_eq!(extent.first_row, 2);
        assert_eq!(extent.last_row, 4);
        assert_eq!(extent.spans, vec![Some((3, 6)); 3]);
    }

    #[test]
    fn find_forehead_extent_without_hair_on_face_is_none() {
        let face = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 255 } else { 0 }]));
        let hair = GrayImage::from_fn(10, 10, |x, _| Luma([if x >= 5 { 255 } else { 0 }]));
        assert!(find_forehead_extent(&face, &hair).is_none());
    }

    #[test]
    fn synthesize_replaces_forehead_hair_with_skin() {
        let (image, face) = synthetic_portrait();

        let result = SkinSynthesizer::default()
            .synthesize(&image, &face, &portrait_hair_alpha())
            .unwrap();

        let pixel = result.image.get_pixel(100, 90);
        assert!(pixel[0] > 150 && pixel[1] > 120);
        assert_eq!(result.forehead_mask.get_pixel(100, 90)[0], 255);
        assert_eq!(result.forehead_mask.get_pixel(100, 160)[0], 0);
        assert!(result.forehead_box.is_some());
    }

    #[test]
    fn synthesize_keeps_lower_face_and_fills_background() {
        let (image, face) = synthetic_portrait();

        let result = SkinSynthesizer::default()
            .synthesize(&image, &face, &portrait_hair_alpha())
            .unwrap();

        assert_eq!(result.image.get_pixel(100, 160), &SKIN_COLOR);
        assert_eq!(result.image.get_pixel(2, 2), &image::Rgb([255, 255, 255]));
    }

    #[test]
    fn synthesize_skips_eye_columns_below_eye_top_row() {
        let (image, face) = synthetic_portrait();
        let hair = GrayImage::from_fn(200, 240, |_, y| {
            Luma([if (60..=110).contains(&y) { 255 } else { 0 }])
        });

        let result = SkinSynthesizer::default()
            .synthesize(&image, &face, &hair)
            .unwrap();

        assert!(face.eye_box().top < 105);
        assert_eq!(result.forehead_mask.get_pixel(100, 105)[0], 0);
        assert_eq!(result.forehead_mask.get_pixel(58, 105)[0], 255);
        assert_eq!(result.forehead_mask.get_pixel(100, 90)[0], 255);
    }

    #[test]
    fn paint_forehead_ramp_reaches_brightest_lightness_at_eye_box_edges() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let bright = image::Rgb([250, 225, 200]);
        let image = RgbImage::from_fn(200, 240, |x, y| {
            if (90..=110).contains(&x) && (100..160).contains(&y) {
                bright
            } else if face.face_mask().get_pixel(x, y)[0] > 0 {
                SKIN_COLOR
            } else {
                BACKGROUND_COLOR
            }
        });
        let lab = rgb_to_lab_image(&image);
        let statistics = ColorStatistics::from_face(&lab, &face).unwrap();
        let hair = GrayImage::from_fn(200, 240, |_, y| Luma([if y <= 110 { 255 } else { 0 }]));
        let extent = find_forehead_extent(face.face_mask(), &hair).unwrap();
        let mut patch = image.clone();
        let mut mask = GrayImage::new(200, 240);

        paint_forehead_impl(&lab, &face, &statistics, &extent, &mut patch, &mut mask);

        let eyes = face.eye_box();
        let y = (eyes.top + 3) as u32;
        let [a, b] = statistics.average_skin_chroma;
        let expected = lab_to_rgb([rgb_to_lab(bright)[0], a, b]);
        for x in [eyes.left as u32, eyes.right as u32] {
            assert_eq!(mask.get_pixel(x, y)[0], 255);
            for c in 0..3 {
                assert!(patch.get_pixel(x, y)[c].abs_diff(expected[c]) <= 1);
            }
        }
        assert_eq!(mask.get_pixel(eyes.left as u32 + 1, y)[0], 0);
        assert_eq!(mask.get_pixel(eyes.right as u32 - 1, y)[0], 0);
        // The eye-top row itself is painted across.
        assert_eq!(mask.get_pixel(100, eyes.top as u32)[0], 255);
    }

    #[test]
    fn synthesize_without_hair_returns_hair_free_face() {
        let (image, face) = synthetic_portrait();
        let hair = GrayImage::new(200, 240);

        let result = SkinSynthesizer::default()
            .synthesize(&image, &face, &hair)
            .unwrap();

        assert!(result.forehead_box.is_none());
        assert!(result.forehead_mask.pixels().all(|p| p[0] == 0));
        assert_eq!(result.image.get_pixel(100, 90), &HAIR_COLOR);
    }

    #[test]
    fn brightest_column_picks_first_maximum() {
        let region: LabImage = LabImage::from_fn(4, 2, |x, y| {
            image::Rgb([if x == 2 || (x == 3 && y == 1) { 80.0 } else { 50.0 }, 0.0, 0.0])
        });
        assert_eq!(brightest_column_impl(&region), 2);
    }

    // --- Error Cases ---

    #[test]
    fn synthesize_errs_on_mismatched_alpha() {
        let (image, face) = synthetic_portrait();
        let hair = GrayImage::new(10, 10);
        assert!(matches!(
            SkinSynthesizer::default().synthesize(&image, &face, &hair),
            Err(SynthesisError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn synthesize_errs_on_zero_block_size() {
        let (image, face) = synthetic_portrait();
        let hair = GrayImage::new(200, 240);
        let synthesizer = SkinSynthesizer::new(SynthesisConfig {
            block_size: 0,
            ..SynthesisConfig::default()
        });
        assert!(matches!(
            synthesizer.synthesize(&image, &face, &hair),
            Err(SynthesisError::InvalidParameter(_))
        ));
    }
}

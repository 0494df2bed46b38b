//! Trimap construction and global-sampling alpha matting.
//!
//! The binary hair blob is turned into a soft matte in four steps:
//!
//! 1. **Trimap**: the blob eroded by a square element is definite hair (255),
//!    the dilated blob minus the eroded one is unknown (128), everything else is
//!    definite background (0).
//! 2. **Known-region expansion**: unknown pixels that sit close to a known pixel
//!    of nearly the same colour adopt its label. Pass `i` of `n` uses a spatial
//!    radius of `i` and a colour radius of `n - i + 1`, so the reach grows while
//!    the colour tolerance shrinks. A final one-pixel erosion of both known
//!    regions keeps the trimap from being over-confident.
//! 3. **Global sampling**: the definite-hair and definite-background pixels that
//!    border the unknown band form two candidate lists, sorted by intensity. Every
//!    unknown pixel searches for the pair `(F, B)` minimizing
//!
//!    ```text
//!    cost = ||I - (αF + (1 - α)B)|| + |p - p_F| / d_F + |p - p_B| / d_B
//!    α    = clamp((I - B)·(F - B) / ||F - B||², 0, 1)
//!    ```
//!
//!    where `d_F`, `d_B` are the distances to the nearest sample of each kind.
//!    The search alternates neighbour propagation and an exponentially shrinking
//!    random search over the sorted lists (He et al., "A Global Sampling Method
//!    for Alpha Matting", CVPR 2011).
//! 4. **Refinement**: the matte is smoothed with the colour guided filter and
//!    clamped back to 0/255 wherever the trimap was certain.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::MattingConfig;
use crate::error::MattingError;
use crate::hair_swap::box_filter::fits_kernel;
use crate::hair_swap::guided_filter::GuidedFilterExt;
use crate::utils::validate_matching_dimensions;

pub const TRIMAP_BACKGROUND: u8 = 0;
pub const TRIMAP_UNKNOWN: u8 = 128;
pub const TRIMAP_FOREGROUND: u8 = 255;

/// Temporary labels of pixels claimed during one expansion pass.
const CLAIMED_BACKGROUND: u8 = 1;
const CLAIMED_FOREGROUND: u8 = 254;

const ALPHA_EPSILON: f32 = 1e-7;

/// Output of [`matte_hair`].
#[derive(Debug, Clone)]
pub struct MattingResult {
    /// Trimap after known-region expansion
    pub trimap: GrayImage,
    /// Refined alpha matte
    pub alpha: GrayImage,
}

/// Builds the three-level trimap of a binary mask.
///
/// `erosion_size` is the side of the square structuring element.
#[must_use]
pub fn build_trimap(mask: &GrayImage, erosion_size: u32) -> GrayImage {
    let k = u8::try_from(erosion_size / 2).unwrap_or(u8::MAX);
    let eroded = erode(mask, Norm::LInf, k);
    let dilated = dilate(mask, Norm::LInf, k);

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if eroded.get_pixel(x, y)[0] > 0 {
            Luma([TRIMAP_FOREGROUND])
        } else if dilated.get_pixel(x, y)[0] > 0 {
            Luma([TRIMAP_UNKNOWN])
        } else {
            Luma([TRIMAP_BACKGROUND])
        }
    })
}

/// Shrinks the unknown band of `trimap` using colour similarity to nearby
/// known pixels.
pub fn expand_known_regions(image: &RgbImage, trimap: &mut GrayImage, iterations: u32) {
    for pass in 0..iterations {
        let radius = pass + 1;
        let color_radius = (iterations - pass) as f32;
        expand_known_regions_pass_impl(image, trimap, radius, color_radius);
    }
    if iterations > 0 {
        erode_known_regions_impl(trimap);
    }
}

fn expand_known_regions_pass_impl(
    image: &RgbImage,
    trimap: &mut GrayImage,
    radius: u32,
    color_radius: f32,
) {
    let (width, height) = image.dimensions();
    let r = radius as i64;

    for y in 0..height {
        for x in 0..width {
            if trimap.get_pixel(x, y)[0] != TRIMAP_UNKNOWN {
                continue;
            }
            let color = image.get_pixel(x, y).0;

            let mut claimed = None;
            for ny in (i64::from(y) - r).max(0)..=(i64::from(y) + r).min(i64::from(height) - 1) {
                for nx in (i64::from(x) - r).max(0)..=(i64::from(x) + r).min(i64::from(width) - 1)
                {
                    let (nx, ny) = (nx as u32, ny as u32);
                    let label = trimap.get_pixel(nx, ny)[0];
                    if label != TRIMAP_BACKGROUND && label != TRIMAP_FOREGROUND {
                        continue;
                    }

                    let dx = x as f32 - nx as f32;
                    let dy = y as f32 - ny as f32;
                    if dx.hypot(dy) > radius as f32 {
                        continue;
                    }
                    if color_distance(color, image.get_pixel(nx, ny).0) <= color_radius {
                        claimed = Some(label);
                    }
                }
            }

            match claimed {
                Some(TRIMAP_BACKGROUND) => trimap.put_pixel(x, y, Luma([CLAIMED_BACKGROUND])),
                Some(_) => trimap.put_pixel(x, y, Luma([CLAIMED_FOREGROUND])),
                None => {}
            }
        }
    }

    for pixel in trimap.pixels_mut() {
        match pixel[0] {
            CLAIMED_BACKGROUND => pixel[0] = TRIMAP_BACKGROUND,
            CLAIMED_FOREGROUND => pixel[0] = TRIMAP_FOREGROUND,
            _ => {}
        }
    }
}

/// Turns known pixels that touch the other kind of pixel into unknown ones.
fn erode_known_regions_impl(trimap: &mut GrayImage) {
    let select = |value: u8| {
        GrayImage::from_fn(trimap.width(), trimap.height(), |x, y| {
            Luma([if trimap.get_pixel(x, y)[0] == value { 255 } else { 0 }])
        })
    };
    let foreground = erode(&select(TRIMAP_FOREGROUND), Norm::L1, 1);
    let background = erode(&select(TRIMAP_BACKGROUND), Norm::L1, 1);

    for (x, y, pixel) in trimap.enumerate_pixels_mut() {
        if foreground.get_pixel(x, y)[0] == 0 && background.get_pixel(x, y)[0] == 0 {
            pixel[0] = TRIMAP_UNKNOWN;
        }
    }
}

#[inline]
fn color_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    let d: f32 = (0..3)
        .map(|c| {
            let diff = f32::from(a[c]) - f32::from(b[c]);
            diff * diff
        })
        .sum();
    d.sqrt()
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    x: f32,
    y: f32,
    color: [f32; 3],
}

impl Sample {
    fn at(image: &RgbImage, x: u32, y: u32) -> Self {
        Self {
            x: x as f32,
            y: y as f32,
            color: image.get_pixel(x, y).0.map(f32::from),
        }
    }

    #[inline]
    fn intensity(&self) -> f32 {
        self.color.iter().sum()
    }

    #[inline]
    fn distance_to(&self, x: f32, y: f32) -> f32 {
        (self.x - x).hypot(self.y - y)
    }
}

#[derive(Debug, Clone, Copy)]
struct PixelState {
    x: u32,
    y: u32,
    foreground: usize,
    background: usize,
    nearest_foreground: f32,
    nearest_background: f32,
    cost: f32,
}

/// Global-sampling alpha estimator.
#[derive(Debug, Clone)]
pub struct GlobalMatting {
    iterations: u32,
    seed: u64,
}

impl GlobalMatting {
    #[must_use]
    pub const fn new(iterations: u32, seed: u64) -> Self {
        Self { iterations, seed }
    }

    /// Estimates the matte of every unknown trimap pixel; known pixels are
    /// copied from the trimap.
    ///
    /// # Errors
    ///
    /// * `MattingError::DimensionMismatch` - When image and trimap sizes differ
    /// * `MattingError::NoKnownSamples` - When the unknown band borders no
    ///   definite hair or no definite background
    pub fn estimate_alpha(
        &self,
        image: &RgbImage,
        trimap: &GrayImage,
    ) -> Result<GrayImage, MattingError> {
        let (width, height) = image.dimensions();
        let (trimap_w, trimap_h) = trimap.dimensions();
        validate_matching_dimensions(width, height, trimap_w, trimap_h, "GlobalMatting").map_err(
            |_| MattingError::DimensionMismatch {
                expected: (width, height),
                actual: (trimap_w, trimap_h),
            },
        )?;

        let mut alpha = GrayImage::from_fn(width, height, |x, y| match trimap.get_pixel(x, y)[0] {
            TRIMAP_FOREGROUND => Luma([255]),
            _ => Luma([0]),
        });

        let unknown: Vec<(u32, u32)> = trimap
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == TRIMAP_UNKNOWN)
            .map(|(x, y, _)| (x, y))
            .collect();
        if unknown.is_empty() {
            return Ok(alpha);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let (foreground, background) = collect_samples_impl(image, trimap, &mut rng);
        if foreground.is_empty() {
            return Err(MattingError::NoKnownSamples("foreground"));
        }
        if background.is_empty() {
            return Err(MattingError::NoKnownSamples("background"));
        }
        log::debug!(
            "Matting {} unknown pixels with {} foreground and {} background samples",
            unknown.len(),
            foreground.len(),
            background.len()
        );

        let mut states: Vec<PixelState> = unknown
            .iter()
            .map(|&(x, y)| {
                let (px, py) = (x as f32, y as f32);
                let nearest = |samples: &[Sample]| {
                    samples
                        .iter()
                        .map(|s| s.distance_to(px, py))
                        .fold(f32::INFINITY, f32::min)
                        .max(1.0)
                };
                PixelState {
                    x,
                    y,
                    foreground: rng.gen_range(0..foreground.len()),
                    background: rng.gen_range(0..background.len()),
                    nearest_foreground: nearest(&foreground),
                    nearest_background: nearest(&background),
                    cost: f32::INFINITY,
                }
            })
            .collect();

        // Maps a pixel to its slot in `states`.
        let mut slot = vec![usize::MAX; (width * height) as usize];
        for (i, state) in states.iter().enumerate() {
            slot[(state.y * width + state.x) as usize] = i;
        }

        let search_width = foreground.len().max(background.len()) as f32;
        let mut order: Vec<usize> = (0..states.len()).collect();

        for _ in 0..self.iterations {
            order.shuffle(&mut rng);
            for &i in &order {
                let mut state = states[i];
                let color = image.get_pixel(state.x, state.y).0.map(f32::from);
                let evaluate = |f: usize, b: usize, s: &PixelState| {
                    pair_cost_impl(color, s, &foreground[f], &background[b])
                };

                if !state.cost.is_finite() {
                    state.cost = evaluate(state.foreground, state.background, &state);
                }

                // Propagation from the 8-neighbourhood.
                for dy in -1_i64..=1 {
                    for dx in -1_i64..=1 {
                        let nx = i64::from(state.x) + dx;
                        let ny = i64::from(state.y) + dy;
                        if nx < 0 || ny < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                            continue;
                        }
                        let neighbour = slot[(ny as u32 * width + nx as u32) as usize];
                        if neighbour == usize::MAX {
                            continue;
                        }
                        let (f, b) = (states[neighbour].foreground, states[neighbour].background);
                        let cost = evaluate(f, b, &state);
                        if cost < state.cost {
                            state.foreground = f;
                            state.background = b;
                            state.cost = cost;
                        }
                    }
                }

                // Random search with a shrinking window.
                let mut window = search_width;
                while window >= 1.0 {
                    let f = offset_index_impl(state.foreground, window, foreground.len(), &mut rng);
                    let b = offset_index_impl(state.background, window, background.len(), &mut rng);
                    let cost = evaluate(f, b, &state);
                    if cost < state.cost {
                        state.foreground = f;
                        state.background = b;
                        state.cost = cost;
                    }
                    window *= 0.5;
                }

                states[i] = state;
            }
        }

        for state in &states {
            let color = image.get_pixel(state.x, state.y).0.map(f32::from);
            let a = estimate_alpha_impl(
                color,
                foreground[state.foreground].color,
                background[state.background].color,
            );
            alpha.put_pixel(state.x, state.y, Luma([(a * 255.0).round() as u8]));
        }

        Ok(alpha)
    }
}

/// Collects boundary samples of both known regions plus as many random known
/// pixels, each list sorted by intensity.
fn collect_samples_impl(
    image: &RgbImage,
    trimap: &GrayImage,
    rng: &mut StdRng,
) -> (Vec<Sample>, Vec<Sample>) {
    let (width, height) = trimap.dimensions();
    let mut foreground = Vec::new();
    let mut background = Vec::new();

    let touches_unknown = |x: u32, y: u32| {
        [(0, -1), (-1, 0), (1, 0), (0, 1)].iter().any(|&(dx, dy)| {
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            nx >= 0
                && ny >= 0
                && nx < i64::from(width)
                && ny < i64::from(height)
                && trimap.get_pixel(nx as u32, ny as u32)[0] == TRIMAP_UNKNOWN
        })
    };

    for (x, y, label) in trimap.enumerate_pixels() {
        match label[0] {
            TRIMAP_FOREGROUND if touches_unknown(x, y) => foreground.push(Sample::at(image, x, y)),
            TRIMAP_BACKGROUND if touches_unknown(x, y) => background.push(Sample::at(image, x, y)),
            _ => {}
        }
    }

    let extra = foreground.len() + background.len();
    for _ in 0..extra {
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);
        match trimap.get_pixel(x, y)[0] {
            TRIMAP_FOREGROUND => foreground.push(Sample::at(image, x, y)),
            TRIMAP_BACKGROUND => background.push(Sample::at(image, x, y)),
            _ => {}
        }
    }

    foreground.sort_by(|a, b| a.intensity().total_cmp(&b.intensity()));
    background.sort_by(|a, b| a.intensity().total_cmp(&b.intensity()));
    (foreground, background)
}

#[inline]
fn offset_index_impl(index: usize, window: f32, len: usize, rng: &mut StdRng) -> usize {
    let offset = rng.gen_range(-1.0_f32..=1.0) * window;
    let candidate = (index as f32 + offset).round();
    candidate.clamp(0.0, (len - 1) as f32) as usize
}

#[inline]
fn estimate_alpha_impl(color: [f32; 3], fg: [f32; 3], bg: [f32; 3]) -> f32 {
    let mut numerator = 0.0;
    let mut denominator = ALPHA_EPSILON;
    for c in 0..3 {
        let fb = fg[c] - bg[c];
        numerator += (color[c] - bg[c]) * fb;
        denominator += fb * fb;
    }
    (numerator / denominator).clamp(0.0, 1.0)
}

#[inline]
fn pair_cost_impl(color: [f32; 3], state: &PixelState, fg: &Sample, bg: &Sample) -> f32 {
    let a = estimate_alpha_impl(color, fg.color, bg.color);
    let mut residual = 0.0;
    for c in 0..3 {
        let composite = a.mul_add(fg.color[c], (1.0 - a) * bg.color[c]);
        let diff = color[c] - composite;
        residual += diff * diff;
    }

    let (px, py) = (state.x as f32, state.y as f32);
    residual.sqrt()
        + fg.distance_to(px, py) / state.nearest_foreground
        + bg.distance_to(px, py) / state.nearest_background
}

/// Turns a binary hair blob into a refined alpha matte.
///
/// # Errors
///
/// * `MattingError::DimensionMismatch` - When image and mask sizes differ
/// * `MattingError::InvalidParameter` - When no sampling iteration is configured
/// * `MattingError::NoKnownSamples` - When the unknown band borders no
///   definite hair or no definite background
/// * `MattingError::GuidedFilter` - When the refinement fails
///
/// A blob too thin to survive the erosion leaves the trimap without certain
/// hair (and a blob covering the image leaves it without background). The
/// matte is then the blob itself.
pub fn matte_hair(
    image: &RgbImage,
    mask: &GrayImage,
    config: &MattingConfig,
) -> Result<MattingResult, MattingError> {
    let (width, height) = image.dimensions();
    let (mask_w, mask_h) = mask.dimensions();
    validate_matching_dimensions(width, height, mask_w, mask_h, "matte_hair").map_err(|_| {
        MattingError::DimensionMismatch {
            expected: (width, height),
            actual: (mask_w, mask_h),
        }
    })?;
    if config.sampling_iterations == 0 {
        return Err(MattingError::InvalidParameter(
            "sampling_iterations must be > 0".to_owned(),
        ));
    }

    let mut trimap = build_trimap(mask, config.erosion_size);
    expand_known_regions(image, &mut trimap, config.expansion_iterations);

    let has_foreground = trimap.pixels().any(|p| p[0] == TRIMAP_FOREGROUND);
    let has_background = trimap.pixels().any(|p| p[0] == TRIMAP_BACKGROUND);
    if !has_foreground || !has_background {
        log::warn!(
            "Trimap has no certain {}, keeping the binary hair blob as alpha",
            if has_foreground { "background" } else { "hair" }
        );
        return Ok(MattingResult {
            trimap,
            alpha: mask.clone(),
        });
    }

    let mut alpha =
        GlobalMatting::new(config.sampling_iterations, config.seed).estimate_alpha(image, &trimap)?;

    if fits_kernel(width, height, 2 * config.guided_radius + 1) {
        alpha.guided_filter_mut(image, config.guided_radius, config.guided_epsilon)?;
    } else {
        log::warn!(
            "Skipping guided filter: {width}x{height} image is too small for radius {}",
            config.guided_radius
        );
    }

    for (x, y, pixel) in alpha.enumerate_pixels_mut() {
        match trimap.get_pixel(x, y)[0] {
            TRIMAP_BACKGROUND => pixel[0] = 0,
            TRIMAP_FOREGROUND => pixel[0] = 255,
            _ => {}
        }
    }

    Ok(MattingResult { trimap, alpha })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn square_mask(size: u32, from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = (from..to).contains(&x) && (from..to).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    fn two_tone_image(size: u32, split: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, _| {
            if x < split {
                Rgb([30, 20, 15])
            } else {
                Rgb([230, 235, 240])
            }
        })
    }

    #[test]
    fn build_trimap_has_three_levels_in_expected_places() {
        let mask = square_mask(40, 10, 30);

        let trimap = build_trimap(&mask, 5);

        assert_eq!(trimap.get_pixel(20, 20)[0], TRIMAP_FOREGROUND);
        assert_eq!(trimap.get_pixel(10, 20)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(8, 20)[0], TRIMAP_UNKNOWN);
        assert_eq!(trimap.get_pixel(2, 20)[0], TRIMAP_BACKGROUND);
    }

    #[test]
    fn expand_known_regions_claims_same_coloured_unknown_pixels() {
        let image = RgbImage::from_pixel(12, 12, Rgb([90, 90, 90]));
        let mut trimap = GrayImage::from_fn(12, 12, |x, _| {
            Luma([if x < 4 { TRIMAP_FOREGROUND } else { TRIMAP_UNKNOWN }])
        });

        expand_known_regions(&image, &mut trimap, 3);

        assert_eq!(trimap.get_pixel(5, 6)[0], TRIMAP_FOREGROUND);
        assert!(trimap.pixels().all(|p| p[0] != CLAIMED_FOREGROUND));
    }

    #[test]
    fn expand_known_regions_keeps_differently_coloured_pixels_unknown() {
        let image = two_tone_image(12, 4);
        let mut trimap = GrayImage::from_fn(12, 12, |x, _| {
            Luma([if x < 4 { TRIMAP_FOREGROUND } else { TRIMAP_UNKNOWN }])
        });

        expand_known_regions(&image, &mut trimap, 3);

        assert_eq!(trimap.get_pixel(6, 6)[0], TRIMAP_UNKNOWN);
    }

    #[test]
    fn global_matting_separates_two_tone_band() {
        let image = two_tone_image(30, 15);
        let trimap = GrayImage::from_fn(30, 30, |x, _| match x {
            0..=9 => Luma([TRIMAP_FOREGROUND]),
            10..=19 => Luma([TRIMAP_UNKNOWN]),
            _ => Luma([TRIMAP_BACKGROUND]),
        });

        let alpha = GlobalMatting::new(5, 7).estimate_alpha(&image, &trimap).unwrap();

        assert_eq!(alpha.get_pixel(12, 15)[0], 255);
        assert_eq!(alpha.get_pixel(17, 15)[0], 0);
        assert_eq!(alpha.get_pixel(3, 15)[0], 255);
        assert_eq!(alpha.get_pixel(25, 15)[0], 0);
    }

    #[test]
    fn global_matting_is_deterministic_for_a_seed() {
        let image = RgbImage::from_fn(24, 24, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 100]));
        let trimap = GrayImage::from_fn(24, 24, |x, _| match x {
            0..=7 => Luma([TRIMAP_FOREGROUND]),
            8..=15 => Luma([TRIMAP_UNKNOWN]),
            _ => Luma([TRIMAP_BACKGROUND]),
        });
        let matting = GlobalMatting::new(3, 42);

        let first = matting.estimate_alpha(&image, &trimap).unwrap();
        let second = matting.estimate_alpha(&image, &trimap).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn global_matting_without_background_errs() {
        let image = RgbImage::new(10, 10);
        let trimap = GrayImage::from_fn(10, 10, |x, _| {
            Luma([if x < 5 { TRIMAP_FOREGROUND } else { TRIMAP_UNKNOWN }])
        });

        let result = GlobalMatting::new(2, 0).estimate_alpha(&image, &trimap);

        assert!(matches!(result, Err(MattingError::NoKnownSamples("background"))));
    }

    #[test]
    fn matte_hair_is_certain_away_from_the_boundary() {
        let image = RgbImage::from_fn(60, 60, |x, y| {
            if (15..45).contains(&x) && (15..45).contains(&y) {
                Rgb([40, 25, 20])
            } else {
                Rgb([200, 210, 220])
            }
        });
        let mask = square_mask(60, 15, 45);

        let result = matte_hair(&image, &mask, &MattingConfig::default()).unwrap();

        assert_eq!(result.alpha.get_pixel(30, 30)[0], 255);
        assert_eq!(result.alpha.get_pixel(2, 2)[0], 0);
        assert!(result.alpha.get_pixel(16, 30)[0] > 200);
        assert!(result.alpha.get_pixel(13, 30)[0] < 55);
    }

    #[test]
    fn matte_hair_on_band_thinner_than_erosion_keeps_blob() {
        let image = RgbImage::from_fn(60, 60, |_, y| {
            if (20..25).contains(&y) {
                Rgb([40, 25, 20])
            } else {
                Rgb([200, 210, 220])
            }
        });
        let mask = GrayImage::from_fn(60, 60, |_, y| {
            Luma([if (20..25).contains(&y) { 255 } else { 0 }])
        });

        let result = matte_hair(&image, &mask, &MattingConfig::default()).unwrap();

        assert!(result.trimap.pixels().all(|p| p[0] != TRIMAP_FOREGROUND));
        assert_eq!(result.alpha, mask);
    }

    #[test]
    fn matte_hair_errs_on_mismatched_mask() {
        let image = RgbImage::new(20, 20);
        let mask = GrayImage::new(10, 20);
        assert!(matches!(
            matte_hair(&image, &mask, &MattingConfig::default()),
            Err(MattingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn matte_hair_errs_without_sampling_iterations() {
        let image = RgbImage::new(20, 20);
        let mask = square_mask(20, 5, 15);
        let config = MattingConfig {
            sampling_iterations: 0,
            ..MattingConfig::default()
        };
        assert!(matches!(
            matte_hair(&image, &mask, &config),
            Err(MattingError::InvalidParameter(_))
        ));
    }
}

//! Hair extraction from a portrait.
//!
//! Every pixel is clustered into background, hair, skin or clothing by a
//! four-centre k-means whose centres are seeded from the face geometry. The
//! hair cluster component that reaches the scalp just above the anchor is the
//! hair blob; alpha matting then softens its border.

use image::{GrayImage, Luma, Rgb, RgbImage, Rgba};
use imageproc::definitions::Image;

use crate::config::SegmentationConfig;
use crate::error::{MattingError, SegmentationError};
use crate::hair_swap::alpha_matting::matte_hair;
use crate::hair_swap::color_statistics::ChannelStats;
use crate::hair_swap::compositing::ApplyAlphaMaskExt;
use crate::hair_swap::face_model::FaceModel;
use crate::hair_swap::foreground_estimation::{ForegroundEstimationExt, fitting_kernel};
use crate::utils::{FIRST_COMPONENT_LABEL, label_components, validate_matching_dimensions};

/// Cluster indices of the k-means labels.
pub mod cluster {
    pub const BACKGROUND: u8 = 0;
    pub const HAIR: u8 = 1;
    pub const SKIN: u8 = 2;
    pub const CLOTHING: u8 = 3;
}

pub const NUM_CLUSTERS: usize = 4;

/// Output of [`kmeans`].
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster index per pixel
    pub labels: GrayImage,
    pub centers: [[u8; 3]; NUM_CLUSTERS],
    /// Assignment rounds that were run
    pub iterations: u32,
}

/// Hair extracted from one portrait.
#[derive(Debug, Clone)]
pub struct Hair {
    /// Alpha matte of the hair
    pub hair_mask: GrayImage,
    /// Binary hair blob before matting
    pub hair_mask_no_matting: GrayImage,
    /// Hair colours with the matte as alpha
    pub hair_pixels: Image<Rgba<u8>>,
    /// Hair pixel closest to the scalp anchor
    pub connection_point: (i32, i32),
    /// `connection_point - anchor`
    pub offset_to_anchor: (i32, i32),
    pub mean_color: [f32; 3],
    pub std_color: [f32; 3],
}

/// Cluster labels plus the extracted hair.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub labels: GrayImage,
    pub hair: Hair,
}

impl Segmentation {
    /// Paints the labels: background blue, hair green, skin red, clothing black.
    #[must_use]
    pub fn labels_visualization(&self) -> RgbImage {
        RgbImage::from_fn(self.labels.width(), self.labels.height(), |x, y| {
            match self.labels.get_pixel(x, y)[0] {
                cluster::BACKGROUND => Rgb([0, 0, 255]),
                cluster::HAIR => Rgb([0, 255, 0]),
                cluster::SKIN => Rgb([255, 0, 0]),
                _ => Rgb([0, 0, 0]),
            }
        })
    }
}

/// Segments hair with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct HairSegmenter {
    config: SegmentationConfig,
}

impl HairSegmenter {
    #[must_use]
    pub const fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Extracts the hair of the face described by `face`.
    ///
    /// # Errors
    ///
    /// * `SegmentationError::DimensionMismatch` - When `face` was built for another size
    /// * `SegmentationError::NoHairPixels` - When no pixel ends up in the hair cluster
    /// * `SegmentationError::NoScalpBlob` - When no hair component reaches the scalp
    /// * `SegmentationError::Matting` - When matting or colour estimation fails
    pub fn segment(
        &self,
        image: &RgbImage,
        face: &FaceModel,
    ) -> Result<Segmentation, SegmentationError> {
        let (width, height) = image.dimensions();
        let (face_w, face_h) = face.dimensions();
        validate_matching_dimensions(width, height, face_w, face_h, "HairSegmenter").map_err(
            |_| SegmentationError::DimensionMismatch {
                expected: (face_w, face_h),
                actual: (width, height),
            },
        )?;

        let seeds = self.seeds(image, face)?;
        log::debug!("K-means seeds: {seeds:?}");

        let clusters = kmeans(image, seeds, self.config.kmeans_max_iterations);
        log::debug!(
            "K-means converged after {} iterations: {:?}",
            clusters.iterations,
            clusters.centers
        );

        let blob = self.scalp_blob(&clusters.labels, face.anchor())?;

        let (alpha, colors) = if self.config.use_matting {
            let matting = matte_hair(image, &blob, &self.config.matting)?;
            let colors = self.hair_colors(image, &matting.alpha)?;
            (matting.alpha, colors)
        } else {
            (blob.clone(), image.clone())
        };

        let hair = build_hair_impl(alpha, blob, colors, face.anchor())?;
        log::info!(
            "Hair segmented: connection point {:?}, offset to anchor {:?}",
            hair.connection_point,
            hair.offset_to_anchor
        );

        Ok(Segmentation {
            labels: clusters.labels,
            hair,
        })
    }

    /// Background, hair, skin and clothing seed colours.
    fn seeds(
        &self,
        image: &RgbImage,
        face: &FaceModel,
    ) -> Result<[[u8; 3]; NUM_CLUSTERS], SegmentationError> {
        let (width, height) = image.dimensions();
        let (jx, jy) = face.anchor();

        let background = row_mean_impl(image, 0);
        let hair_x = jx.clamp(0, width as i32 - 1) as u32;
        let hair_y = (jy - self.config.hair_seed_offset).clamp(0, height as i32 - 1) as u32;
        let hair = image.get_pixel(hair_x, hair_y).0;
        let skin = masked_median_impl(image, face.skin_mask()).ok_or_else(|| {
            SegmentationError::InvalidParameter("skin mask of the face is empty".to_owned())
        })?;
        let clothing = row_mean_impl(image, height - 1);

        Ok([background, hair, skin, clothing])
    }

    /// Selects the hair component that touches the window above the anchor.
    fn scalp_blob(
        &self,
        labels: &GrayImage,
        anchor: (i32, i32),
    ) -> Result<GrayImage, SegmentationError> {
        let hair = GrayImage::from_fn(labels.width(), labels.height(), |x, y| {
            Luma([if labels.get_pixel(x, y)[0] == cluster::HAIR { 255 } else { 0 }])
        });
        if hair.pixels().all(|p| p[0] == 0) {
            return Err(SegmentationError::NoHairPixels);
        }

        let (components, count) = label_components(&hair);
        log::debug!("Hair cluster has {count} components");

        let seed = (anchor.0, anchor.1 - self.config.hair_seed_offset);
        let window = self.config.blob_window;
        let (width, height) = (labels.width() as i32, labels.height() as i32);

        let mut chosen: Option<u32> = None;
        for y in (seed.1 - window + 1).max(0)..(seed.1 + window).min(height) {
            for x in (seed.0 - window + 1).max(0)..(seed.0 + window).min(width) {
                let id = components.get_pixel(x as u32, y as u32)[0];
                if id >= FIRST_COMPONENT_LABEL && chosen.is_none_or(|c| id < c) {
                    chosen = Some(id);
                }
            }
        }
        let id = chosen.ok_or(SegmentationError::NoScalpBlob {
            x: seed.0,
            y: seed.1,
        })?;

        Ok(GrayImage::from_fn(labels.width(), labels.height(), |x, y| {
            Luma([if components.get_pixel(x, y)[0] == id { 255 } else { 0 }])
        }))
    }

    /// Hair colours to carry over: fringe colours re-estimated when enabled.
    fn hair_colors(&self, image: &RgbImage, alpha: &GrayImage) -> Result<RgbImage, MattingError> {
        let matting = &self.config.matting;
        if !matting.estimate_foreground {
            return Ok(image.clone());
        }

        let (width, height) = image.dimensions();
        let Some(kernel) = fitting_kernel(width, height, matting.foreground_radius) else {
            log::warn!("Image {width}x{height} is too small for foreground estimation");
            return Ok(image.clone());
        };
        if kernel != matting.foreground_radius {
            log::warn!(
                "Foreground estimation kernel reduced from {} to {kernel}",
                matting.foreground_radius
            );
        }

        Ok(image.clone().estimate_foreground(alpha, kernel)?)
    }
}

/// Clusters the pixels of `image` around four seed colours.
///
/// Pixels join the nearest centre in RGB (the first one on ties). Centres move
/// to the rounded mean of their pixels; a centre that loses all its pixels
/// stays where it was. Stops once no centre moves or after `max_iterations`.
#[must_use]
pub fn kmeans(
    image: &RgbImage,
    seeds: [[u8; 3]; NUM_CLUSTERS],
    max_iterations: u32,
) -> KMeansResult {
    let mut centers = seeds;
    let mut labels = GrayImage::new(image.width(), image.height());
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let mut sums = [[0_u64; 3]; NUM_CLUSTERS];
        let mut counts = [0_u64; NUM_CLUSTERS];
        for (label, pixel) in labels.pixels_mut().zip(image.pixels()) {
            let cluster = nearest_center_impl(&centers, pixel.0);
            label[0] = cluster as u8;
            counts[cluster] += 1;
            for c in 0..3 {
                sums[cluster][c] += u64::from(pixel[c]);
            }
        }

        let mut updated = centers;
        for (k, center) in updated.iter_mut().enumerate() {
            if counts[k] > 0 {
                for c in 0..3 {
                    center[c] = ((sums[k][c] + counts[k] / 2) / counts[k]) as u8;
                }
            }
        }

        if updated == centers {
            break;
        }
        centers = updated;
    }

    KMeansResult {
        labels,
        centers,
        iterations,
    }
}

#[inline]
fn nearest_center_impl(centers: &[[u8; 3]; NUM_CLUSTERS], color: [u8; 3]) -> usize {
    let mut best = 0;
    let mut best_distance = u32::MAX;
    for (k, center) in centers.iter().enumerate() {
        let distance: u32 = (0..3)
            .map(|c| {
                let d = i32::from(color[c]) - i32::from(center[c]);
                (d * d) as u32
            })
            .sum();
        if distance < best_distance {
            best = k;
            best_distance = distance;
        }
    }
    best
}

fn row_mean_impl(image: &RgbImage, y: u32) -> [u8; 3] {
    let width = u64::from(image.width());
    let mut sums = [0_u64; 3];
    for x in 0..image.width() {
        let pixel = image.get_pixel(x, y);
        for c in 0..3 {
            sums[c] += u64::from(pixel[c]);
        }
    }
    sums.map(|s| ((s + width / 2) / width) as u8)
}

/// Per-channel median of the pixels under `mask`.
fn masked_median_impl(image: &RgbImage, mask: &GrayImage) -> Option<[u8; 3]> {
    let mut channels: [Vec<u8>; 3] = Default::default();
    for (pixel, m) in image.pixels().zip(mask.pixels()) {
        if m[0] > 0 {
            for c in 0..3 {
                channels[c].push(pixel[c]);
            }
        }
    }
    if channels[0].is_empty() {
        return None;
    }

    let mut median = [0; 3];
    for (c, values) in channels.iter_mut().enumerate() {
        values.sort_unstable();
        median[c] = values[values.len() / 2];
    }
    Some(median)
}

/// Returns the non-zero pixel of `mask` closest to `anchor`, first in
/// row-major order on ties.
#[must_use]
pub fn find_connection_point(mask: &GrayImage, anchor: (i32, i32)) -> Option<(i32, i32)> {
    let mut best = None;
    let mut best_distance = i64::MAX;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let dx = i64::from(x) - i64::from(anchor.0);
        let dy = i64::from(y) - i64::from(anchor.1);
        let distance = dx * dx + dy * dy;
        if distance < best_distance {
            best_distance = distance;
            best = Some((x as i32, y as i32));
        }
    }
    best
}

fn build_hair_impl(
    alpha: GrayImage,
    blob: GrayImage,
    colors: RgbImage,
    anchor: (i32, i32),
) -> Result<Hair, SegmentationError> {
    let connection_point =
        find_connection_point(&alpha, anchor).ok_or(SegmentationError::NoHairPixels)?;
    let offset_to_anchor = (connection_point.0 - anchor.0, connection_point.1 - anchor.1);

    let stats = ChannelStats::from_samples(
        colors
            .pixels()
            .zip(alpha.pixels())
            .filter(|(_, a)| a[0] > 0)
            .map(|(p, _)| p.0.map(f32::from)),
    )
    .unwrap_or_default();

    let hair_pixels = colors
        .apply_alpha_mask(&alpha)
        .map_err(MattingError::from)?;

    Ok(Hair {
        hair_mask: alpha,
        hair_mask_no_matting: blob,
        hair_pixels,
        connection_point,
        offset_to_anchor,
        mean_color: stats.mean,
        std_color: stats.std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn without_matting() -> SegmentationConfig {
        SegmentationConfig {
            use_matting: false,
            ..SegmentationConfig::default()
        }
    }

    // --- Success Cases ---

    #[test]
    fn kmeans_with_exact_seeds_converges_in_one_iteration() {
        let (image, _) = synthetic_portrait();
        let seeds = [BACKGROUND_COLOR.0, HAIR_COLOR.0, SKIN_COLOR.0, CLOTHING_COLOR.0];

        let result = kmeans(&image, seeds, 10);

        assert_eq!(result.iterations, 1);
        assert_eq!(result.centers, seeds);
        assert_eq!(result.labels.get_pixel(100, 50)[0], cluster::HAIR);
    }

    #[test]
    fn kmeans_moves_centres_to_cluster_means() {
        let image = two_tone_image(10, 4, Rgb([10, 10, 10]), Rgb([200, 200, 200]));
        let seeds = [[0, 0, 0], [250, 250, 250], [120, 0, 0], [0, 0, 120]];

        let result = kmeans(&image, seeds, 10);

        assert_eq!(result.centers[0], [10, 10, 10]);
        assert_eq!(result.centers[1], [200, 200, 200]);
        assert!(result.iterations >= 2);
    }

    #[test]
    fn kmeans_keeps_centre_of_empty_cluster() {
        let image = RgbImage::from_pixel(4, 4, Rgb([50, 50, 50]));
        let seeds = [[40, 40, 40], [255, 0, 0], [0, 255, 0], [0, 0, 255]];

        let result = kmeans(&image, seeds, 10);

        assert_eq!(result.centers[0], [50, 50, 50]);
        assert_eq!(result.centers[1], [255, 0, 0]);
    }

    #[test]
    fn kmeans_ties_go_to_first_centre() {
        let image = RgbImage::from_pixel(2, 2, Rgb([100, 100, 100]));
        let seeds = [[90, 100, 100], [110, 100, 100], [0, 0, 0], [0, 0, 0]];

        let result = kmeans(&image, seeds, 1);

        assert!(result.labels.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn find_connection_point_on_disk_is_nearest_rim_pixel() {
        let mask = disk_mask(100, 100, (50, 50), 10);
        assert_eq!(find_connection_point(&mask, (50, 80)), Some((50, 60)));
    }

    #[test]
    fn find_connection_point_prefers_first_row_major_pixel_on_ties() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(1, 2, Luma([255]));
        mask.put_pixel(3, 2, Luma([255]));
        assert_eq!(find_connection_point(&mask, (2, 2)), Some((1, 2)));
    }

    #[test]
    fn segment_without_matting_labels_all_four_clusters() {
        let (image, face) = synthetic_portrait();

        let segmentation = HairSegmenter::new(without_matting())
            .segment(&image, &face)
            .unwrap();

        assert_eq!(segmentation.labels.get_pixel(5, 5)[0], cluster::BACKGROUND);
        assert_eq!(segmentation.labels.get_pixel(100, 50)[0], cluster::HAIR);
        assert_eq!(segmentation.labels.get_pixel(100, 160)[0], cluster::SKIN);
        assert_eq!(segmentation.labels.get_pixel(100, 235)[0], cluster::CLOTHING);
    }

    #[test]
    fn segment_without_matting_uses_binary_blob_as_alpha() {
        let (image, face) = synthetic_portrait();

        let hair = HairSegmenter::new(without_matting())
            .segment(&image, &face)
            .unwrap()
            .hair;

        assert_eq!(hair.hair_mask, hair.hair_mask_no_matting);
        assert_eq!(hair.hair_mask.get_pixel(100, 50)[0], 255);
        assert_eq!(hair.hair_mask.get_pixel(100, 160)[0], 0);
        assert_eq!(hair.connection_point, (100, 70));
        assert_eq!(hair.offset_to_anchor, (0, 0));
        assert_eq!(*hair.hair_pixels.get_pixel(100, 50), Rgba([40, 25, 15, 255]));
        assert!((hair.mean_color[0] - 40.0).abs() < 1e-3);
        assert!(hair.std_color[0].abs() < 1e-3);
    }

    #[test]
    fn segment_with_matting_keeps_hair_core_opaque() {
        let (image, face) = synthetic_portrait();

        let hair = HairSegmenter::default().segment(&image, &face).unwrap().hair;

        assert_eq!(hair.hair_mask.get_pixel(100, 60)[0], 255);
        assert_eq!(hair.hair_mask.get_pixel(5, 5)[0], 0);
        assert_eq!(hair.hair_mask.get_pixel(100, 160)[0], 0);
        assert_eq!(hair.connection_point, (100, 70));
    }

    #[test]
    fn segment_with_matting_keeps_cap_thinner_than_erosion() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let mask = face.face_mask();
        let image = RgbImage::from_fn(200, 240, |x, y| {
            if y >= 225 {
                CLOTHING_COLOR
            } else if (44..=52).contains(&y) && (60..140).contains(&x) {
                HAIR_COLOR
            } else if mask.get_pixel(x, y)[0] > 0 {
                SKIN_COLOR
            } else {
                BACKGROUND_COLOR
            }
        });

        let hair = HairSegmenter::default().segment(&image, &face).unwrap().hair;

        assert_eq!(hair.hair_mask, hair.hair_mask_no_matting);
        assert_eq!(hair.hair_mask.get_pixel(100, 48)[0], 255);
        assert_eq!(hair.hair_mask.get_pixel(100, 60)[0], 0);
        assert_eq!(hair.connection_point, (100, 52));
    }

    #[test]
    fn labels_visualization_paints_each_cluster() {
        let (image, face) = synthetic_portrait();
        let segmentation = HairSegmenter::new(without_matting())
            .segment(&image, &face)
            .unwrap();

        let painted = segmentation.labels_visualization();

        assert_eq!(*painted.get_pixel(5, 5), Rgb([0, 0, 255]));
        assert_eq!(*painted.get_pixel(100, 50), Rgb([0, 255, 0]));
        assert_eq!(*painted.get_pixel(100, 160), Rgb([255, 0, 0]));
        assert_eq!(*painted.get_pixel(100, 235), Rgb([0, 0, 0]));
    }

    // --- Error Cases ---

    #[test]
    fn segment_flat_image_errs_without_hair() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let image = RgbImage::from_pixel(200, 240, SKIN_COLOR);

        let result = HairSegmenter::new(without_matting()).segment(&image, &face);

        assert!(matches!(result, Err(SegmentationError::NoHairPixels)));
    }

    #[test]
    fn segment_errs_when_no_blob_reaches_the_scalp_window() {
        let (mut image, face) = synthetic_portrait();
        image.put_pixel(100, 0, HAIR_COLOR);
        let config = SegmentationConfig {
            hair_seed_offset: 100,
            ..without_matting()
        };

        let result = HairSegmenter::new(config).segment(&image, &face);

        assert!(matches!(
            result,
            Err(SegmentationError::NoScalpBlob { x: 100, y: -30 })
        ));
    }

    #[test]
    fn segment_errs_on_mismatched_face() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let image = RgbImage::new(100, 100);
        assert!(matches!(
            HairSegmenter::default().segment(&image, &face),
            Err(SegmentationError::DimensionMismatch { .. })
        ));
    }
}

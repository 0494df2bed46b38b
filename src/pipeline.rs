//! End-to-end hair swap between a model and a target portrait.

use std::path::Path;

use image::{GrayImage, ImageReader, RgbImage};

use crate::config::SwapConfig;
use crate::error::SwapError;
use crate::hair_swap::face_model::FaceModel;
use crate::hair_swap::hair_segmenter::{HairSegmenter, Segmentation};
use crate::hair_swap::landmarks::LandmarkDetector;
use crate::hair_swap::placement_search::{CandidateScore, Placement, PlacementSearch};
use crate::hair_swap::skin_synthesizer::{SkinSynthesizer, SynthesizedFace};

/// Loads portraits by path.
pub trait ImageSource {
    fn load(&self, path: &Path) -> Result<RgbImage, SwapError>;
}

/// Reads images from the file system, guessing the format from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn load(&self, path: &Path) -> Result<RgbImage, SwapError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(image.to_rgb8())
    }
}

/// Everything a swap produces.
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    /// The target with the model's hair
    pub composite: RgbImage,
    pub placement: Placement,
    pub score: CandidateScore,
    pub candidates_evaluated: usize,
    pub model_segmentation: Segmentation,
    /// The target face with its own forehead hair removed
    pub synthesized_face: SynthesizedFace,
}

/// Runs the swap stages with one detector, image source and configuration.
#[derive(Debug, Clone)]
pub struct HairSwapper<D, S> {
    detector: D,
    source: S,
    segmenter: HairSegmenter,
    synthesizer: SkinSynthesizer,
    search: PlacementSearch,
}

impl<D, S> HairSwapper<D, S>
where
    D: LandmarkDetector,
    S: ImageSource,
{
    /// # Errors
    ///
    /// * `SwapError::Config` - When `config` holds an invalid value
    pub fn new(detector: D, source: S, config: SwapConfig) -> Result<Self, SwapError> {
        config.validate()?;
        Ok(Self {
            detector,
            source,
            segmenter: HairSegmenter::new(config.segmentation),
            synthesizer: SkinSynthesizer::new(config.synthesis),
            search: PlacementSearch::new(config.search),
        })
    }

    /// Loads an image through the configured source.
    pub fn load(&self, path: &Path) -> Result<RgbImage, SwapError> {
        self.source.load(path)
    }

    /// Puts the hair of the portrait at `model_path` on the one at `target_path`.
    pub fn swap(&self, model_path: &Path, target_path: &Path) -> Result<SwapOutcome, SwapError> {
        let model = self.load(model_path)?;
        let target = self.load(target_path)?;
        log::info!(
            "Swapping hair from {} onto {}",
            model_path.display(),
            target_path.display()
        );
        self.swap_images(&model, &target)
    }

    /// Detects both faces and swaps.
    ///
    /// # Errors
    ///
    /// * `SwapError::ModelFace` / `SwapError::TargetFace` - When a face cannot be modelled
    /// * `SwapError::Segmentation` - When the model's hair cannot be extracted
    /// * `SwapError::Synthesis` - When the target forehead cannot be rebuilt
    /// * `SwapError::Placement` - When the search fails
    pub fn swap_images(
        &self,
        model: &RgbImage,
        target: &RgbImage,
    ) -> Result<SwapOutcome, SwapError> {
        let model_face = FaceModel::detect(model, &self.detector).map_err(SwapError::ModelFace)?;
        let target_face =
            FaceModel::detect(target, &self.detector).map_err(SwapError::TargetFace)?;
        self.swap_faces(model, &model_face, target, &target_face)
    }

    /// Swaps with face models built elsewhere, e.g. from stored landmarks.
    pub fn swap_faces(
        &self,
        model: &RgbImage,
        model_face: &FaceModel,
        target: &RgbImage,
        target_face: &FaceModel,
    ) -> Result<SwapOutcome, SwapError> {
        let model_segmentation = self.segmenter.segment(model, model_face)?;
        log::debug!(
            "Model hair: mean colour {:?}, std {:?}",
            model_segmentation.hair.mean_color,
            model_segmentation.hair.std_color
        );

        let target_hair = match self.segmenter.segment(target, target_face) {
            Ok(segmentation) => segmentation.hair.hair_mask,
            Err(e) => {
                log::warn!("Target hair segmentation failed, assuming no hair: {e}");
                let (width, height) = target.dimensions();
                GrayImage::new(width, height)
            }
        };

        let synthesized_face = self
            .synthesizer
            .synthesize(target, target_face, &target_hair)?;

        let result = self.search.run(
            target_face,
            &synthesized_face.image,
            &model_segmentation.hair,
            target_face.head_width(),
            model_face.head_width(),
        )?;

        Ok(SwapOutcome {
            composite: result.image,
            placement: result.placement,
            score: result.score,
            candidates_evaluated: result.candidates_evaluated,
            model_segmentation,
            synthesized_face,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::config::{SearchConfig, SegmentationConfig};
    use crate::hair_swap::landmarks::{Landmarks, StaticLandmarks};
    use crate::test_utils::*;

    /// Looks faces up by exact image content.
    struct KnownFaces(Vec<(GrayImage, Landmarks)>);

    impl LandmarkDetector for KnownFaces {
        fn detect(&self, image: &GrayImage) -> Option<Landmarks> {
            self.0
                .iter()
                .find(|(known, _)| known == image)
                .map(|(_, landmarks)| landmarks.clone())
        }
    }

    struct MemorySource(HashMap<PathBuf, RgbImage>);

    impl ImageSource for MemorySource {
        fn load(&self, path: &Path) -> Result<RgbImage, SwapError> {
            self.0.get(path).cloned().ok_or_else(|| {
                SwapError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                ))
            })
        }
    }

    /// A hairless portrait whose face sits 10px right of and below the
    /// synthetic model's.
    fn bald_target() -> (RgbImage, Landmarks) {
        let face = synthetic_face_model(200, 240, (110.0, 140.0), 50.0);
        let image = RgbImage::from_fn(200, 240, |x, y| {
            if y >= 225 {
                CLOTHING_COLOR
            } else if face.face_mask().get_pixel(x, y)[0] > 0 {
                SKIN_COLOR
            } else {
                BACKGROUND_COLOR
            }
        });
        (image, synthetic_landmarks((110.0, 140.0), 50.0))
    }

    /// A model whose hair fills everything around the face from row 20 to
    /// row 160, so only the unmoved hair closes every gap.
    fn hooded_model() -> (RgbImage, FaceModel) {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let image = RgbImage::from_fn(200, 240, |x, y| {
            if y >= 225 {
                CLOTHING_COLOR
            } else if face.face_mask().get_pixel(x, y)[0] > 0 {
                SKIN_COLOR
            } else if (20..=160).contains(&y) && (10..190).contains(&x) {
                HAIR_COLOR
            } else {
                BACKGROUND_COLOR
            }
        });
        (image, face)
    }

    fn pinned_config() -> SwapConfig {
        SwapConfig {
            segmentation: SegmentationConfig {
                use_matting: false,
                ..SegmentationConfig::default()
            },
            search: SearchConfig {
                scale_min: 1.0,
                scale_max: 1.0,
                max_tx: 0,
                max_ty: 0,
                ..SearchConfig::default()
            },
            ..SwapConfig::default()
        }
    }

    fn centroid(points: impl Iterator<Item = (u32, u32)>) -> (f64, f64) {
        let (mut sx, mut sy, mut n) = (0.0, 0.0, 0.0);
        for (x, y) in points {
            sx += f64::from(x);
            sy += f64::from(y);
            n += 1.0;
        }
        (sx / n, sy / n)
    }

    // --- Success Cases ---

    #[test]
    fn swap_moves_model_hair_relative_to_target_anchor() {
        let (model, model_face) = synthetic_portrait();
        let (target, target_landmarks) = bald_target();
        let detector = KnownFaces(vec![
            (
                image::imageops::grayscale(&model),
                model_face.landmarks().clone(),
            ),
            (image::imageops::grayscale(&target), target_landmarks),
        ]);
        let source = MemorySource(HashMap::from([
            (PathBuf::from("model.png"), model),
            (PathBuf::from("target.png"), target),
        ]));
        let swapper = HairSwapper::new(detector, source, pinned_config()).unwrap();

        let outcome = swapper
            .swap(Path::new("model.png"), Path::new("target.png"))
            .unwrap();

        assert_eq!(outcome.placement, Placement::IDENTITY);
        assert_eq!(outcome.candidates_evaluated, 1);
        let model_centroid = centroid(
            (0..240)
                .flat_map(|y| (0..200).map(move |x| (x, y)))
                .filter(|&(x, y)| in_synthetic_hair(x, y)),
        );
        let result_centroid = centroid(
            outcome
                .composite
                .enumerate_pixels()
                .filter(|(_, _, p)| **p == HAIR_COLOR)
                .map(|(x, y, _)| (x, y)),
        );
        // Target anchor (110, 80) minus model anchor (100, 70).
        assert!((result_centroid.0 - (model_centroid.0 + 10.0)).abs() < 0.5);
        assert!((result_centroid.1 - (model_centroid.1 + 10.0)).abs() < 0.5);
    }

    #[test]
    fn swap_images_on_bald_target_skips_forehead_synthesis() {
        let (model, model_face) = synthetic_portrait();
        let (target, target_landmarks) = bald_target();
        let detector = KnownFaces(vec![
            (
                image::imageops::grayscale(&model),
                model_face.landmarks().clone(),
            ),
            (image::imageops::grayscale(&target), target_landmarks),
        ]);
        let swapper =
            HairSwapper::new(detector, MemorySource(HashMap::new()), pinned_config()).unwrap();

        let outcome = swapper.swap_images(&model, &target).unwrap();

        assert!(outcome.synthesized_face.forehead_box.is_none());
        assert_eq!(outcome.model_segmentation.hair.connection_point, (100, 70));
    }

    #[test]
    fn swap_faces_with_matting_over_translation_grid_keeps_hugging_hair_in_place() {
        let (model, model_face) = hooded_model();
        let (target, target_face) = synthetic_portrait();
        let config = SwapConfig {
            search: SearchConfig {
                scale_min: 1.0,
                scale_max: 1.0,
                ..SearchConfig::default()
            },
            ..SwapConfig::default()
        };
        let swapper = HairSwapper::new(StaticLandmarks::none(), FsImageSource, config).unwrap();

        let outcome = swapper
            .swap_faces(&model, &model_face, &target, &target_face)
            .unwrap();

        assert!(outcome.synthesized_face.forehead_box.is_some());
        assert_eq!(outcome.candidates_evaluated, 5 * 13);
        assert_eq!(outcome.placement, Placement::IDENTITY);
        assert_eq!(outcome.score.holes, 0);
        assert_eq!(outcome.score.overlap, 0);
    }

    // --- Error Cases ---

    #[test]
    fn swap_images_without_face_errs_on_model() {
        let (model, _) = synthetic_portrait();
        let (target, _) = bald_target();
        let swapper = HairSwapper::new(
            StaticLandmarks::none(),
            MemorySource(HashMap::new()),
            SwapConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            swapper.swap_images(&model, &target),
            Err(SwapError::ModelFace(_))
        ));
    }

    #[test]
    fn swap_with_missing_file_errs_with_io() {
        let swapper = HairSwapper::new(
            StaticLandmarks::none(),
            MemorySource(HashMap::new()),
            SwapConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            swapper.swap(Path::new("missing.png"), Path::new("other.png")),
            Err(SwapError::Io(_))
        ));
    }

    #[test]
    fn new_with_invalid_config_errs() {
        let mut config = SwapConfig::default();
        config.search.translation_step = 0;
        assert!(matches!(
            HairSwapper::new(StaticLandmarks::none(), FsImageSource, config),
            Err(SwapError::Config(_))
        ));
    }
}

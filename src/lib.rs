//! # hair-swap
//!
//! Transplants the hair of one portrait (the *model*) onto another (the
//! *target*).
//!
//! The pipeline runs five stages:
//!
//! - **Face model**: face and skin masks, the scalp anchor and the eye band
//!   derived from 77 facial landmarks
//! - **Colour statistics**: CIE Lab samples of the temples and the nose band
//! - **Hair segmentation**: four-cluster k-means, scalp blob selection and
//!   alpha matting refined with a guided filter
//! - **Skin synthesis**: the target's forehead hair is painted over with a
//!   lightness ramp and a block texture blended by Poisson cloning
//! - **Placement search**: a grid over scale and translation minimizing holes
//!   between face and hair plus hair covering the lower face
//!
//! Landmark detection itself is not part of the crate; any
//! [`LandmarkDetector`] can be injected.
//!
//! ## Example Usage
//!
//! ```no_run
//! use hair_swap::{FaceModel, FsImageSource, HairSwapper, Landmarks, StaticLandmarks, SwapConfig};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let swapper = HairSwapper::new(StaticLandmarks::none(), FsImageSource, SwapConfig::default())?;
//!
//! let model = swapper.load(Path::new("model.jpg"))?;
//! let target = swapper.load(Path::new("target.jpg"))?;
//! let model_face = FaceModel::from_landmarks(
//!     model.dimensions(),
//!     Landmarks::from_csv_str(&std::fs::read_to_string("model.csv")?)?,
//! )?;
//! let target_face = FaceModel::from_landmarks(
//!     target.dimensions(),
//!     Landmarks::from_csv_str(&std::fs::read_to_string("target.csv")?)?,
//! )?;
//!
//! let outcome = swapper.swap_faces(&model, &model_face, &target, &target_face)?;
//! outcome.composite.save("result.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `serde`: Enables serialization of the configuration and results
//! - `parallel`: Scores placement candidates with `rayon`
//! - `cli`: Builds the `hair-swap` binary

mod config;
mod error;
mod hair_swap;
mod pipeline;
mod utils;

#[cfg(test)]
mod test_utils;

pub use config::{
    EXAMPLE_CONFIG, MattingConfig, SearchConfig, SegmentationConfig, SwapConfig, SynthesisConfig,
};
pub use error::{
    AlphaMaskError, ColorConversionError, ConfigError, FaceModelError, GuidedFilterError,
    MattingError, PlacementError, SeamlessCloneError, SegmentationError, SwapError,
    SynthesisError,
};
pub use hair_swap::alpha_matting::{
    GlobalMatting, MattingResult, TRIMAP_BACKGROUND, TRIMAP_FOREGROUND, TRIMAP_UNKNOWN,
    build_trimap, expand_known_regions, matte_hair,
};
pub use hair_swap::color_statistics::{
    ChannelStats, ColorStatistics, LabImage, lab_to_rgb, lab_to_rgb_image, rgb_to_lab,
    rgb_to_lab_image,
};
pub use hair_swap::compositing::{ApplyAlphaMaskExt, CompositeOverExt};
pub use hair_swap::energy::{
    HoleSet, hole_energy, hole_set, overlap_energy, restricted_skin_mask, upper_face_contour,
};
pub use hair_swap::face_model::{EyeBox, FaceModel, SkinRegions};
pub use hair_swap::foreground_estimation::{ForegroundEstimationExt, estimate_foreground};
pub use hair_swap::guided_filter::{GuidedFilterExt, guided_filter};
pub use hair_swap::hair_segmenter::{
    Hair, HairSegmenter, KMeansResult, NUM_CLUSTERS, Segmentation, cluster,
    find_connection_point, kmeans,
};
pub use hair_swap::landmarks::{
    LandmarkDetector, Landmarks, NUM_LANDMARKS, Point, StaticLandmarks, index,
};
pub use hair_swap::placement_search::{
    CandidateScore, Placement, PlacementResult, PlacementSearch, SearchContext, score, warp_layer,
};
pub use hair_swap::seamless_clone::{CloneMode, PoissonSolver, seamless_clone};
pub use hair_swap::skin_synthesizer::{
    ForeheadExtent, SkinSynthesizer, SynthesizedFace, find_forehead_extent,
};
pub use hair_swap::texture_synthesis::synthesize_texture;
pub use pipeline::{FsImageSource, HairSwapper, ImageSource, SwapOutcome};

// Re-export imageproc::definitions::Image for convenience
pub use imageproc::definitions::Image;

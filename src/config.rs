//! Tunable parameters of the hair-swap pipeline.
//!
//! Every stage receives its own immutable section. The defaults reproduce the
//! constants the pipeline was tuned with.

use crate::error::ConfigError;

/// Configuration of the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SwapConfig {
    /// Hair clustering, blob selection and matting
    pub segmentation: SegmentationConfig,

    /// Forehead reconstruction on the target face
    pub synthesis: SynthesisConfig,

    /// Placement grid and energy weighting
    pub search: SearchConfig,
}

/// Hair segmentation parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SegmentationConfig {
    /// Distance above the anchor where the hair seed colour is read
    pub hair_seed_offset: i32,

    /// Half-size of the window around the hair seed a blob must touch
    pub blob_window: i32,

    /// Iteration cap of the four-cluster k-means
    pub kmeans_max_iterations: u32,

    /// Refine the binary blob with alpha matting
    pub use_matting: bool,

    pub matting: MattingConfig,
}

/// Alpha matting parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MattingConfig {
    /// Side of the square structuring element used to build the trimap
    pub erosion_size: u32,

    /// Passes of known-region expansion before sampling
    pub expansion_iterations: u32,

    /// Propagation and random-search rounds of the sample search
    pub sampling_iterations: u32,

    /// Guided filter window radius
    pub guided_radius: u32,

    /// Guided filter regularization on colours scaled to `0..=1`
    pub guided_epsilon: f32,

    /// Seed of the sample search random generator
    pub seed: u64,

    /// Re-estimate hair colours in the soft fringe
    pub estimate_foreground: bool,

    /// Box size of the foreground estimation (odd)
    pub foreground_radius: u32,
}

/// Forehead synthesis parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SynthesisConfig {
    /// Colour painted outside the face in the hair-free face
    pub background_fill: [u8; 3],

    /// Side of the texture blocks
    pub block_size: u32,

    /// Median filter radius applied to the assembled texture
    pub median_radius: u32,

    /// Relaxation sweeps of the Poisson solver
    pub poisson_iterations: u32,

    /// Over-relaxation factor of the Poisson solver, in `(0, 2)`
    pub sor_omega: f32,
}

/// Placement search parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SearchConfig {
    /// Alpha at which a hair pixel counts as opaque
    pub alpha_threshold: u8,

    /// Weight of the hole energy against the overlap energy
    pub energy_weight: f64,

    pub scale_min: f32,
    pub scale_max: f32,
    pub scale_step: f32,

    /// Maximum distance of a scale from the head-width ratio
    pub head_ratio_tolerance: f32,

    pub max_tx: i32,
    pub max_ty: i32,
    pub translation_step: u32,

    /// Columns next to each face edge where hair may cover skin
    pub edge_margin: i32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            hair_seed_offset: 20,
            blob_window: 3,
            kmeans_max_iterations: 10,
            use_matting: true,
            matting: MattingConfig::default(),
        }
    }
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            erosion_size: 11,
            expansion_iterations: 9,
            sampling_iterations: 10,
            guided_radius: 10,
            guided_epsilon: 1e-5,
            seed: 0,
            estimate_foreground: true,
            foreground_radius: 91,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            background_fill: [255, 255, 255],
            block_size: 8,
            median_radius: 1,
            poisson_iterations: 300,
            sor_omega: 1.9,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            alpha_threshold: 128,
            energy_weight: 2.0,
            scale_min: 0.6,
            scale_max: 1.2,
            scale_step: 0.1,
            head_ratio_tolerance: 0.1,
            max_tx: 10,
            max_ty: 30,
            translation_step: 5,
            edge_margin: 10,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

impl SwapConfig {
    /// Checks every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.segmentation.validate()?;
        self.synthesis.validate()?;
        self.search.validate()
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hair_seed_offset < 0 {
            return Err(invalid("segmentation.hair_seed_offset", "must be >= 0"));
        }
        if self.blob_window <= 0 {
            return Err(invalid("segmentation.blob_window", "must be > 0"));
        }
        if self.kmeans_max_iterations == 0 {
            return Err(invalid("segmentation.kmeans_max_iterations", "must be > 0"));
        }
        self.matting.validate()
    }
}

impl MattingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.erosion_size < 3 || self.erosion_size > 511 {
            return Err(invalid("matting.erosion_size", "must be in 3..=511"));
        }
        if self.sampling_iterations == 0 {
            return Err(invalid("matting.sampling_iterations", "must be > 0"));
        }
        if self.guided_radius == 0 {
            return Err(invalid("matting.guided_radius", "must be > 0"));
        }
        if !(self.guided_epsilon.is_finite() && self.guided_epsilon > 0.0) {
            return Err(invalid("matting.guided_epsilon", "must be finite and > 0"));
        }
        if self.foreground_radius == 0 || self.foreground_radius % 2 == 0 {
            return Err(invalid("matting.foreground_radius", "must be odd and > 0"));
        }
        Ok(())
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(invalid("synthesis.block_size", "must be > 0"));
        }
        if self.poisson_iterations == 0 {
            return Err(invalid("synthesis.poisson_iterations", "must be > 0"));
        }
        if !(self.sor_omega > 0.0 && self.sor_omega < 2.0) {
            return Err(invalid("synthesis.sor_omega", "must be in (0, 2)"));
        }
        Ok(())
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale_min > 0.0 && self.scale_min <= self.scale_max) {
            return Err(invalid(
                "search.scale_min",
                format!("must be > 0 and <= scale_max ({})", self.scale_max),
            ));
        }
        if !(self.scale_step > 0.0) {
            return Err(invalid("search.scale_step", "must be > 0"));
        }
        if self.head_ratio_tolerance < 0.0 {
            return Err(invalid("search.head_ratio_tolerance", "must be >= 0"));
        }
        if self.max_tx < 0 || self.max_ty < 0 {
            return Err(invalid("search.max_tx", "translation ranges must be >= 0"));
        }
        if self.translation_step == 0 {
            return Err(invalid("search.translation_step", "must be > 0"));
        }
        if !(self.energy_weight.is_finite() && self.energy_weight >= 0.0) {
            return Err(invalid("search.energy_weight", "must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Example configuration file holding the defaults.
pub const EXAMPLE_CONFIG: &str = r#"# Hair swap configuration

[segmentation]
hair_seed_offset = 20
blob_window = 3
kmeans_max_iterations = 10
use_matting = true

[segmentation.matting]
erosion_size = 11
expansion_iterations = 9
sampling_iterations = 10
guided_radius = 10
guided_epsilon = 1e-5
seed = 0
estimate_foreground = true
foreground_radius = 91

[synthesis]
background_fill = [255, 255, 255]
block_size = 8
median_radius = 1
poisson_iterations = 300
sor_omega = 1.9

[search]
alpha_threshold = 128
energy_weight = 2.0
scale_min = 0.6
scale_max = 1.2
scale_step = 0.1
head_ratio_tolerance = 0.1
max_tx = 10
max_ty = 30
translation_step = 5
edge_margin = 10
"#;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceModelError {
    #[error("Image is empty: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("No face was detected in the image")]
    NoFaceDetected,

    #[error("Expected {expected} landmarks, got {actual}")]
    InvalidLandmarkCount { expected: usize, actual: usize },

    #[error("Failed to parse landmark on line {line}: {message}")]
    LandmarkParse { line: usize, message: String },

    #[error(
        "Hair anchor at y={anchor_y} is not above the eye box starting at y={eye_top}; landmarks are unusable"
    )]
    AnchorBelowEyes { anchor_y: i32, eye_top: i32 },
}

#[derive(Debug, Error)]
pub enum ColorConversionError {
    #[error("Region is empty: {width}x{height}")]
    EmptyRegion { width: u32, height: u32 },
}

#[derive(Debug, Error)]
pub enum GuidedFilterError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid radius: {radius} (must be > 0)")]
    InvalidRadius { radius: u32 },

    #[error("Invalid epsilon: {epsilon} (must be > 0 and finite)")]
    InvalidEpsilon { epsilon: f32 },

    #[error("Image too small: {width}x{height} for radius {radius}")]
    ImageTooSmall { width: u32, height: u32, radius: u32 },

    #[error("Box filter failed: {0}")]
    BoxFilter(String),
}

#[derive(Debug, Error)]
pub enum AlphaMaskError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Blur fusion error: {0}")]
    BlurFusionError(String),
}

#[derive(Debug, Error)]
pub enum MattingError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Trimap has no definite {0} samples")]
    NoKnownSamples(&'static str),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    GuidedFilter(#[from] GuidedFilterError),

    #[error(transparent)]
    ForegroundEstimation(#[from] AlphaMaskError),
}

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("No pixel was assigned to the hair cluster")]
    NoHairPixels,

    #[error("No hair component touches the scalp window around ({x}, {y})")]
    NoScalpBlob { x: i32, y: i32 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Matting(#[from] MattingError),
}

#[derive(Debug, Error)]
pub enum SeamlessCloneError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Clone mask has no interior pixel inside the destination")]
    EmptyRegion,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    ColorConversion(#[from] ColorConversionError),

    #[error(transparent)]
    SeamlessClone(#[from] SeamlessCloneError),
}

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Search space is empty")]
    EmptySearchSpace,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model face: {0}")]
    ModelFace(#[source] FaceModelError),

    #[error("Target face: {0}")]
    TargetFace(#[source] FaceModelError),

    #[error("Hair segmentation failed: {0}")]
    Segmentation(#[from] SegmentationError),

    #[error("Skin synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Placement search failed: {0}")]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

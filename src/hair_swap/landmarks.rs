use image::GrayImage;

use crate::error::FaceModelError;

/// Number of points produced by the 77-point landmark detector.
pub const NUM_LANDMARKS: usize = 77;

/// Indices into the 77-point landmark table used by the face geometry.
pub mod index {
    pub const LEFT_EDGE: usize = 0;
    pub const LOWER_BOUND_MIDDLE: usize = 6;
    pub const RIGHT_EDGE: usize = 12;
    pub const FIRST_EYE: usize = 16;
    pub const LEFT_EDGE_OF_LEFT_EYE: usize = 18;
    pub const RIGHT_EDGE_OF_RIGHT_EYE: usize = 25;
    pub const BASE_OF_LEFT_EYE: usize = 36;
    pub const BASE_OF_RIGHT_EYE: usize = 46;
    pub const LAST_EYE: usize = 47;
    pub const RIGHT_EDGE_OF_NOSE: usize = 54;
    pub const BASE_OF_NOSE: usize = 56;
    pub const LEFT_EDGE_OF_NOSE: usize = 58;
    pub const TOP_OF_MOUTH: usize = 63;
}

/// A landmark position in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Snaps the point to the nearest pixel.
    #[inline]
    #[must_use]
    pub fn to_pixel(self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

/// The ordered landmark set for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks(Vec<Point>);

impl Landmarks {
    /// Wraps detector output, rejecting sets of the wrong length.
    pub fn new(points: Vec<Point>) -> Result<Self, FaceModelError> {
        if points.len() != NUM_LANDMARKS {
            return Err(FaceModelError::InvalidLandmarkCount {
                expected: NUM_LANDMARKS,
                actual: points.len(),
            });
        }
        Ok(Self(points))
    }

    /// Parses the detector's text output: one `x,y` pair per line.
    ///
    /// Blank lines are ignored.
    pub fn from_csv_str(text: &str) -> Result<Self, FaceModelError> {
        let mut points = Vec::with_capacity(NUM_LANDMARKS);
        for (line_index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parse_error = |message: String| FaceModelError::LandmarkParse {
                line: line_index + 1,
                message,
            };

            let (x, y) = line
                .split_once(',')
                .ok_or_else(|| parse_error(format!("expected `x,y`, got `{line}`")))?;
            let x = x
                .trim()
                .parse::<f32>()
                .map_err(|e| parse_error(e.to_string()))?;
            let y = y
                .trim()
                .parse::<f32>()
                .map_err(|e| parse_error(e.to_string()))?;
            points.push(Point::new(x, y));
        }
        Self::new(points)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Point {
        self.0[index]
    }

    /// Landmark `index` snapped to the pixel grid.
    #[inline]
    #[must_use]
    pub fn pixel(&self, index: usize) -> (i32, i32) {
        self.0[index].to_pixel()
    }

    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }
}

/// The landmark detector boundary.
///
/// Implementations return `None` when no face is found.
pub trait LandmarkDetector {
    fn detect(&self, image: &GrayImage) -> Option<Landmarks>;
}

/// Detector that always reports the same landmark set, e.g. one loaded from
/// disk after an offline detection run.
#[derive(Debug, Clone)]
pub struct StaticLandmarks {
    landmarks: Option<Landmarks>,
}

impl StaticLandmarks {
    #[must_use]
    pub const fn new(landmarks: Landmarks) -> Self {
        Self {
            landmarks: Some(landmarks),
        }
    }

    /// A detector that never finds a face.
    #[must_use]
    pub const fn none() -> Self {
        Self { landmarks: None }
    }
}

impl LandmarkDetector for StaticLandmarks {
    fn detect(&self, _image: &GrayImage) -> Option<Landmarks> {
        self.landmarks.clone()
    }
}

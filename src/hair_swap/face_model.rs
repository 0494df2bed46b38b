//! Geometric face description derived from the 77 landmarks.
//!
//! The landmark detector only covers the face below the eyebrows, so the upper
//! outline of the head is synthesized. The chin-to-nose distance is taken as one
//! third of the face height, which puts the scalp anchor `J` at
//!
//! ```text
//! J = (chin.x, chin.y + 3 * (noseBase.y - chin.y))
//! ```
//!
//! Four quarter ellipses then connect the left face edge `M`, a point a quarter
//! of the way across `I`, the anchor `J`, a point three quarters across `K`
//! and the right face edge `N`:
//!
//! ```text
//!            I ____ J ____ K
//!          /                 \
//!         M                   N
//!          \_ jaw polyline __/
//! ```
//!
//! Together with the jaw polyline (landmarks 0 to 12) this outline is filled to
//! obtain the face mask. The skin mask is the jaw polyline closed by the straight
//! segment between the two face edges.

use image::{GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::rect::Rect;

use crate::error::FaceModelError;
use crate::hair_swap::landmarks::{LandmarkDetector, Landmarks, index};
use crate::utils::{clamped_rect, fill_closed_boundary, validate_non_empty_image};

const EYE_EDGE_OFFSET_X: i32 = 1;
const TOP_EYE_OFFSET_Y: i32 = 3;
const BOTTOM_EYE_OFFSET_Y: i32 = 5;
const REGION_TOP_OFFSET_Y: i32 = 5;
const REGION_A_OFFSET_FROM_NOSE: i32 = 2;
const REGION_C_OFFSET_FROM_NOSE: i32 = 2;
/// Vertical distance between the anchor and the `I`/`K` points.
const ARC_KNEE_OFFSET_Y: i32 = 3;

/// Inclusive bounding box around both eyes and eyebrows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeBox {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

/// The three forehead-colour sampling rectangles.
///
/// `a` is the left temple, `b` the band between the nostrils that is expected
/// to hold the brightest skin, `c` the right temple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinRegions {
    pub a: Rect,
    pub b: Rect,
    pub c: Rect,
}

/// Immutable geometric description of one face.
#[derive(Debug, Clone)]
pub struct FaceModel {
    landmarks: Landmarks,
    dimensions: (u32, u32),
    anchor: (i32, i32),
    face_mask: GrayImage,
    skin_mask: GrayImage,
    left_edge: i32,
    right_edge: i32,
    eye_box: EyeBox,
    hair_typical_bottom: i32,
    regions: SkinRegions,
}

impl FaceModel {
    /// Runs the detector on `image` and builds the model from its landmarks.
    pub fn detect<D>(image: &RgbImage, detector: &D) -> Result<Self, FaceModelError>
    where
        D: LandmarkDetector + ?Sized,
    {
        let (width, height) = image.dimensions();
        validate_non_empty_image(width, height, "FaceModel")
            .map_err(|_| FaceModelError::EmptyImage { width, height })?;

        let gray = image::imageops::grayscale(image);
        let landmarks = detector
            .detect(&gray)
            .ok_or(FaceModelError::NoFaceDetected)?;
        Self::from_landmarks((width, height), landmarks)
    }

    /// Builds the model for an image of the given size.
    ///
    /// # Errors
    ///
    /// * `FaceModelError::EmptyImage` - When either dimension is zero
    /// * `FaceModelError::AnchorBelowEyes` - When the landmarks put the scalp
    ///   anchor at or below the top of the eye box
    pub fn from_landmarks(
        dimensions: (u32, u32),
        landmarks: Landmarks,
    ) -> Result<Self, FaceModelError> {
        let (width, height) = dimensions;
        validate_non_empty_image(width, height, "FaceModel")
            .map_err(|_| FaceModelError::EmptyImage { width, height })?;

        let chin = landmarks.pixel(index::LOWER_BOUND_MIDDLE);
        let nose_base = landmarks.pixel(index::BASE_OF_NOSE);
        let anchor = (chin.0, chin.1 + 3 * (nose_base.1 - chin.1));

        let eye_box = eye_box_impl(&landmarks);
        if anchor.1 >= eye_box.top {
            return Err(FaceModelError::AnchorBelowEyes {
                anchor_y: anchor.1,
                eye_top: eye_box.top,
            });
        }

        let face_mask = face_mask_impl(dimensions, &landmarks, anchor);
        let skin_mask = skin_mask_impl(dimensions, &landmarks);

        let (left_edge, _) = landmarks.pixel(index::LEFT_EDGE);
        let (right_edge, _) = landmarks.pixel(index::RIGHT_EDGE);
        let (_, mouth_top) = landmarks.pixel(index::TOP_OF_MOUTH);
        let hair_typical_bottom = (nose_base.1 + mouth_top) / 2;

        let regions = skin_regions_impl(dimensions, &landmarks);

        log::debug!(
            "Face model: anchor={anchor:?}, edges=({left_edge}, {right_edge}), eye box={eye_box:?}, hair bottom={hair_typical_bottom}"
        );

        Ok(Self {
            landmarks,
            dimensions,
            anchor,
            face_mask,
            skin_mask,
            left_edge,
            right_edge,
            eye_box,
            hair_typical_bottom,
            regions,
        })
    }

    #[must_use]
    pub const fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Scalp anchor `J`.
    #[must_use]
    pub const fn anchor(&self) -> (i32, i32) {
        self.anchor
    }

    /// Filled face interior, 255 inside.
    #[must_use]
    pub const fn face_mask(&self) -> &GrayImage {
        &self.face_mask
    }

    /// Filled lower-face region, 255 inside.
    #[must_use]
    pub const fn skin_mask(&self) -> &GrayImage {
        &self.skin_mask
    }

    #[must_use]
    pub const fn left_edge(&self) -> i32 {
        self.left_edge
    }

    #[must_use]
    pub const fn right_edge(&self) -> i32 {
        self.right_edge
    }

    #[must_use]
    pub const fn head_width(&self) -> i32 {
        self.right_edge - self.left_edge + 1
    }

    #[must_use]
    pub const fn eye_box(&self) -> EyeBox {
        self.eye_box
    }

    /// Rows below this line are not expected to hold hair.
    #[must_use]
    pub const fn hair_typical_bottom(&self) -> i32 {
        self.hair_typical_bottom
    }

    #[must_use]
    pub const fn regions(&self) -> SkinRegions {
        self.regions
    }
}

fn eye_box_impl(landmarks: &Landmarks) -> EyeBox {
    let top = (index::FIRST_EYE..=index::LAST_EYE)
        .map(|i| landmarks.pixel(i).1)
        .min()
        .unwrap_or_default();
    let (_, left_eye_base) = landmarks.pixel(index::BASE_OF_LEFT_EYE);
    let (_, right_eye_base) = landmarks.pixel(index::BASE_OF_RIGHT_EYE);

    EyeBox {
        left: landmarks.pixel(index::LEFT_EDGE_OF_LEFT_EYE).0 - EYE_EDGE_OFFSET_X,
        right: landmarks.pixel(index::RIGHT_EDGE_OF_RIGHT_EYE).0 + EYE_EDGE_OFFSET_X,
        top: top - TOP_EYE_OFFSET_Y,
        bottom: left_eye_base.max(right_eye_base) + BOTTOM_EYE_OFFSET_Y,
    }
}

fn draw_jaw_impl(boundary: &mut GrayImage, landmarks: &Landmarks) {
    for i in index::LEFT_EDGE..index::RIGHT_EDGE {
        let (x1, y1) = landmarks.pixel(i);
        let (x2, y2) = landmarks.pixel(i + 1);
        draw_line_segment_mut(
            boundary,
            (x1 as f32, y1 as f32),
            (x2 as f32, y2 as f32),
            Luma([255]),
        );
    }
}

/// Draws the quarter ellipse centred at `center` with signed semi-axes `axes`
/// between `start_deg` and `end_deg`, measured clockwise from +x with y down.
///
/// Signed axes keep the arc endpoints on the points the axes were derived from.
fn draw_arc_impl(
    boundary: &mut GrayImage,
    center: (i32, i32),
    axes: (i32, i32),
    start_deg: u32,
    end_deg: u32,
) {
    let point_at = |deg: u32| {
        let theta = (deg as f32).to_radians();
        (
            (axes.0 as f32).mul_add(theta.cos(), center.0 as f32).round(),
            (axes.1 as f32).mul_add(theta.sin(), center.1 as f32).round(),
        )
    };

    let mut previous = point_at(start_deg);
    for deg in start_deg + 1..=end_deg {
        let current = point_at(deg);
        draw_line_segment_mut(boundary, previous, current, Luma([255]));
        previous = current;
    }
}

fn face_mask_impl(dimensions: (u32, u32), landmarks: &Landmarks, anchor: (i32, i32)) -> GrayImage {
    let (width, height) = dimensions;
    let mut boundary = GrayImage::new(width, height);

    let m = landmarks.pixel(index::LEFT_EDGE);
    let n = landmarks.pixel(index::RIGHT_EDGE);
    let j = anchor;
    let i = (m.0 + (n.0 - m.0) / 4, j.1 + ARC_KNEE_OFFSET_Y);
    let k = (m.0 + 3 * (n.0 - m.0) / 4, j.1 + ARC_KNEE_OFFSET_Y);

    draw_arc_impl(&mut boundary, (i.0, m.1), (i.0 - m.0, m.1 - i.1), 180, 270);
    draw_arc_impl(&mut boundary, (j.0, i.1), (j.0 - i.0, i.1 - j.1), 180, 270);
    draw_arc_impl(&mut boundary, (j.0, k.1), (k.0 - j.0, k.1 - j.1), 270, 360);
    draw_arc_impl(&mut boundary, (k.0, n.1), (n.0 - k.0, n.1 - k.1), 270, 360);
    draw_jaw_impl(&mut boundary, landmarks);

    fill_closed_boundary(&boundary)
}

fn skin_mask_impl(dimensions: (u32, u32), landmarks: &Landmarks) -> GrayImage {
    let (width, height) = dimensions;
    let mut boundary = GrayImage::new(width, height);

    let (x1, y1) = landmarks.pixel(index::LEFT_EDGE);
    let (x2, y2) = landmarks.pixel(index::RIGHT_EDGE);
    draw_line_segment_mut(
        &mut boundary,
        (x1 as f32, y1 as f32),
        (x2 as f32, y2 as f32),
        Luma([255]),
    );
    draw_jaw_impl(&mut boundary, landmarks);

    fill_closed_boundary(&boundary)
}

fn skin_regions_impl(dimensions: (u32, u32), landmarks: &Landmarks) -> SkinRegions {
    let (width, height) = dimensions;
    let (_, left_eye_base) = landmarks.pixel(index::BASE_OF_LEFT_EYE);
    let (_, right_eye_base) = landmarks.pixel(index::BASE_OF_RIGHT_EYE);
    let top = left_eye_base.min(right_eye_base) + REGION_TOP_OFFSET_Y;
    let (_, bottom) = landmarks.pixel(index::BASE_OF_NOSE);

    let (left_eye_x, _) = landmarks.pixel(index::LEFT_EDGE_OF_LEFT_EYE);
    let (right_eye_x, _) = landmarks.pixel(index::RIGHT_EDGE_OF_RIGHT_EYE);
    let (nose_left_x, _) = landmarks.pixel(index::LEFT_EDGE_OF_NOSE);
    let (nose_right_x, _) = landmarks.pixel(index::RIGHT_EDGE_OF_NOSE);

    let bounds = [
        ("A", left_eye_x, nose_left_x - REGION_A_OFFSET_FROM_NOSE),
        ("B", nose_left_x, nose_right_x),
        ("C", nose_right_x + REGION_C_OFFSET_FROM_NOSE, right_eye_x),
    ];
    let [a, b, c] = bounds.map(|(name, left, right)| {
        let (rect, adjusted) = clamped_rect(left, top, right, bottom, width, height);
        if adjusted {
            log::warn!(
                "Region {name} ({left}..{right}, {top}..{bottom}) was clamped to {rect:?}"
            );
        }
        rect
    });

    SkinRegions { a, b, c }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hair_swap::landmarks::{Point, StaticLandmarks, NUM_LANDMARKS};
    use crate::test_utils::*;

    #[test]
    fn from_landmarks_places_anchor_three_nose_heights_above_chin() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let chin = face.landmarks().pixel(index::LOWER_BOUND_MIDDLE);
        let nose = face.landmarks().pixel(index::BASE_OF_NOSE);
        assert_eq!(face.anchor(), (chin.0, chin.1 + 3 * (nose.1 - chin.1)));
        assert!(face.anchor().1 < face.eye_box().top);
    }

    #[test]
    fn from_landmarks_is_deterministic() {
        let first = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let second = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        assert_eq!(first.face_mask(), second.face_mask());
        assert_eq!(first.skin_mask(), second.skin_mask());
    }

    #[test]
    fn face_mask_covers_forehead_and_chin_but_not_corners() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let (jx, jy) = face.anchor();
        let mask = face.face_mask();

        assert_eq!(mask.get_pixel(jx as u32, (jy + 5) as u32)[0], 255);
        assert_eq!(mask.get_pixel(100, 130)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(199, 239)[0], 0);
        assert_eq!(mask.get_pixel(jx as u32, (jy - 3) as u32)[0], 0);
    }

    #[test]
    fn skin_mask_lies_inside_face_mask() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let skin_pixels = face.skin_mask().pixels().filter(|p| p[0] > 0).count();
        assert!(skin_pixels > 0);
        assert!(
            face.skin_mask()
                .enumerate_pixels()
                .filter(|(_, _, p)| p[0] > 0)
                .all(|(x, y, _)| face.face_mask().get_pixel(x, y)[0] > 0)
        );
    }

    #[test]
    fn head_width_spans_both_edges() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        assert_eq!(face.head_width(), face.right_edge() - face.left_edge() + 1);
        assert_eq!(face.left_edge(), 50);
        assert_eq!(face.right_edge(), 150);
    }

    #[test]
    fn regions_do_not_overlap_and_stay_inside_image() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let SkinRegions { a, b, c } = face.regions();
        assert!(a.right() < b.left());
        assert!(b.right() < c.left());
        for rect in [a, b, c] {
            assert!(rect.left() >= 0 && rect.top() >= 0);
            assert!(rect.right() < 200 && rect.bottom() < 240);
        }
    }

    #[test]
    fn hair_typical_bottom_lies_between_nose_and_mouth() {
        let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
        let (_, nose) = face.landmarks().pixel(index::BASE_OF_NOSE);
        let (_, mouth) = face.landmarks().pixel(index::TOP_OF_MOUTH);
        assert!(face.hair_typical_bottom() >= nose && face.hair_typical_bottom() <= mouth);
    }

    #[test]
    fn degenerate_regions_are_clamped_to_one_pixel() {
        let mut points = synthetic_landmarks((100.0, 130.0), 50.0).points().to_vec();
        points[index::LEFT_EDGE_OF_NOSE] = points[index::RIGHT_EDGE_OF_NOSE];
        let landmarks = Landmarks::new(points).unwrap();

        let face = FaceModel::from_landmarks((200, 240), landmarks).unwrap();

        assert_eq!(face.regions().b.width(), 1);
    }

    #[test]
    fn from_landmarks_with_anchor_below_eyes_errs() {
        let mut points = vec![Point::new(50.0, 50.0); NUM_LANDMARKS];
        points[index::LOWER_BOUND_MIDDLE] = Point::new(50.0, 80.0);
        points[index::BASE_OF_NOSE] = Point::new(50.0, 79.0);
        let landmarks = Landmarks::new(points).unwrap();

        let result = FaceModel::from_landmarks((100, 100), landmarks);

        assert!(matches!(result, Err(FaceModelError::AnchorBelowEyes { .. })));
    }

    #[test]
    fn detect_without_face_errs() {
        let image = RgbImage::new(10, 10);
        let result = FaceModel::detect(&image, &StaticLandmarks::none());
        assert!(matches!(result, Err(FaceModelError::NoFaceDetected)));
    }

    #[test]
    fn detect_on_empty_image_errs() {
        let image = RgbImage::new(0, 0);
        let detector = StaticLandmarks::new(synthetic_landmarks((100.0, 130.0), 50.0));
        let result = FaceModel::detect(&image, &detector);
        assert!(matches!(
            result,
            Err(FaceModelError::EmptyImage {
                width: 0,
                height: 0
            })
        ));
    }
}

//! Shared fixtures for the unit tests.

use std::f32::consts::PI;

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::hair_swap::face_model::FaceModel;
use crate::hair_swap::landmarks::{Landmarks, NUM_LANDMARKS, Point, index};

pub const BACKGROUND_COLOR: Rgb<u8> = Rgb([170, 200, 230]);
pub const HAIR_COLOR: Rgb<u8> = Rgb([40, 25, 15]);
pub const SKIN_COLOR: Rgb<u8> = Rgb([220, 180, 150]);
pub const CLOTHING_COLOR: Rgb<u8> = Rgb([60, 60, 120]);

/// A 77-point set describing an upright face.
///
/// The jaw is a half ellipse of half-width `half_width` around `center`;
/// eyebrows, eyes, nose and mouth sit at fixed fractions of the half-width.
/// For `center = (100, 130)` and `half_width = 50` the scalp anchor lands at
/// `(100, 70)` and the eye box top at row 102.
pub fn synthetic_landmarks(center: (f32, f32), half_width: f32) -> Landmarks {
    let (cx, cy) = center;
    let w = half_width;
    let mut points = vec![Point::new(cx, cy); NUM_LANDMARKS];

    for (i, point) in points.iter_mut().enumerate().take(index::RIGHT_EDGE + 1) {
        let theta = PI - i as f32 * PI / 12.0;
        *point = Point::new(cx + w * theta.cos(), cy + 1.2 * w * theta.sin());
    }
    // Snap the jaw ends onto exact columns.
    points[index::LEFT_EDGE] = Point::new(cx - w, cy);
    points[index::RIGHT_EDGE] = Point::new(cx + w, cy);

    for k in index::FIRST_EYE..=index::LAST_EYE {
        let t = (k - index::FIRST_EYE) as f32 / 31.0;
        points[k] = Point::new(cx - 0.6 * w + t * 1.2 * w, cy - 0.3 * w);
    }
    points[17] = Point::new(cx - 0.5 * w, cy - 0.5 * w);
    points[24] = Point::new(cx + 0.5 * w, cy - 0.5 * w);
    points[index::LEFT_EDGE_OF_LEFT_EYE] = Point::new(cx - 0.7 * w, cy - 0.4 * w);
    points[index::RIGHT_EDGE_OF_RIGHT_EYE] = Point::new(cx + 0.7 * w, cy - 0.4 * w);
    points[index::BASE_OF_LEFT_EYE] = Point::new(cx - 0.4 * w, cy - 0.1 * w);
    points[index::BASE_OF_RIGHT_EYE] = Point::new(cx + 0.4 * w, cy - 0.1 * w);

    points[index::BASE_OF_NOSE] = Point::new(cx, cy + 0.4 * w);
    points[index::LEFT_EDGE_OF_NOSE] = Point::new(cx - 0.2 * w, cy + 0.3 * w);
    points[index::RIGHT_EDGE_OF_NOSE] = Point::new(cx + 0.2 * w, cy + 0.3 * w);
    points[index::TOP_OF_MOUTH] = Point::new(cx, cy + 0.6 * w);

    Landmarks::new(points).unwrap()
}

pub fn synthetic_face_model(
    width: u32,
    height: u32,
    center: (f32, f32),
    half_width: f32,
) -> FaceModel {
    FaceModel::from_landmarks((width, height), synthetic_landmarks(center, half_width)).unwrap()
}

/// Whether `(x, y)` lies in the hair ellipse of [`synthetic_portrait`].
pub fn in_synthetic_hair(x: u32, y: u32) -> bool {
    let dx = (x as f32 - 100.0) / 60.0;
    let dy = (y as f32 - 75.0) / 40.0;
    dx * dx + dy * dy <= 1.0 && y < 100
}

/// A flat-shaded 200x240 portrait matching `synthetic_face_model(200, 240,
/// (100, 130), 50)`: background, a hair cap over the forehead, skin inside
/// the face mask and clothing along the bottom rows.
pub fn synthetic_portrait() -> (RgbImage, FaceModel) {
    let face = synthetic_face_model(200, 240, (100.0, 130.0), 50.0);
    let mask = face.face_mask();
    let image = RgbImage::from_fn(200, 240, |x, y| {
        if y >= 225 {
            CLOTHING_COLOR
        } else if in_synthetic_hair(x, y) {
            HAIR_COLOR
        } else if mask.get_pixel(x, y)[0] > 0 {
            SKIN_COLOR
        } else {
            BACKGROUND_COLOR
        }
    });
    (image, face)
}

pub fn disk_mask(width: u32, height: u32, center: (i32, i32), radius: i32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as i32 - center.0;
        let dy = y as i32 - center.1;
        Luma([if dx * dx + dy * dy <= radius * radius { 255 } else { 0 }])
    })
}

/// Left half `left`, right half `right`.
pub fn two_tone_image(width: u32, height: u32, left: Rgb<u8>, right: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| if x < width / 2 { left } else { right })
}

//! Defect energies of a hair placement.
//!
//! * **Hole energy** counts background pixels trapped between the face
//!   silhouette and the placed hair.
//! * **Overlap energy** counts opaque hair pixels covering skin that should
//!   stay visible.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};

/// Directions scanned away from a contour point: left, up, right.
const SCAN_DIRECTIONS: [(i32, i32); 3] = [(-1, 0), (0, -1), (1, 0)];

/// Set of pixels backed by a dense visited bitmap.
#[derive(Debug, Clone)]
pub struct HoleSet {
    width: u32,
    height: u32,
    visited: Vec<bool>,
    len: usize,
}

impl HoleSet {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            visited: vec![false; (width as usize) * (height as usize)],
            len: 0,
        }
    }

    /// Adds `(x, y)`; returns `false` if it was already present or lies
    /// outside the image.
    pub fn insert(&mut self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = y as usize * self.width as usize + x as usize;
        if self.visited[index] {
            return false;
        }
        self.visited[index] = true;
        self.len += 1;
        true
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width
            && y < self.height
            && self.visited[y as usize * self.width as usize + x as usize]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Points of the outer contours of `face_mask` at or above `bottom`.
#[must_use]
pub fn upper_face_contour(face_mask: &GrayImage, bottom: i32) -> Vec<(i32, i32)> {
    find_contours::<i32>(face_mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .flat_map(|contour| contour.points)
        .filter(|point| point.y <= bottom)
        .map(|point| (point.x, point.y))
        .collect()
}

/// Collects the gaps between `contour` and hair that is at least `threshold`
/// opaque.
///
/// From every contour point whose left, upper or right neighbour lies outside
/// the face, the image is scanned outward in that direction. When opaque hair
/// is met, the pixels passed on the way are holes.
#[must_use]
pub fn hole_set(
    face_mask: &GrayImage,
    contour: &[(i32, i32)],
    alpha: &GrayImage,
    threshold: u8,
) -> HoleSet {
    let (width, height) = face_mask.dimensions();
    let (w, h) = (width as i32, height as i32);
    let mut holes = HoleSet::new(width, height);

    for &(x, y) in contour {
        for (dx, dy) in SCAN_DIRECTIONS {
            let nx = (x + dx).clamp(0, w - 1);
            let ny = (y + dy).clamp(0, h - 1);
            if face_mask.get_pixel(nx as u32, ny as u32)[0] > 0 {
                continue;
            }

            let mut k = 1;
            let hit = loop {
                let (qx, qy) = (x + k * dx, y + k * dy);
                if qx < 0 || qy < 0 || qx >= w || qy >= h {
                    break None;
                }
                if alpha.get_pixel(qx as u32, qy as u32)[0] >= threshold {
                    break Some(k);
                }
                k += 1;
            };

            if let Some(distance) = hit {
                for j in 1..distance {
                    holes.insert((x + j * dx) as u32, (y + j * dy) as u32);
                }
            }
        }
    }
    holes
}

/// Number of hole pixels; see [`hole_set`].
#[must_use]
pub fn hole_energy(
    face_mask: &GrayImage,
    contour: &[(i32, i32)],
    alpha: &GrayImage,
    threshold: u8,
) -> usize {
    hole_set(face_mask, contour, alpha, threshold).len()
}

/// The skin mask without the `margin` columns inside each face edge, where
/// hair may legitimately fall over the cheeks.
#[must_use]
pub fn restricted_skin_mask(
    skin_mask: &GrayImage,
    left_edge: i32,
    right_edge: i32,
    margin: i32,
) -> GrayImage {
    let low = left_edge + margin;
    let high = right_edge - margin;
    GrayImage::from_fn(skin_mask.width(), skin_mask.height(), |x, y| {
        let x = x as i32;
        if x < low || x >= high {
            Luma([0])
        } else {
            *skin_mask.get_pixel(x as u32, y)
        }
    })
}

/// Number of hair pixels more opaque than `threshold` on the restricted skin.
#[must_use]
pub fn overlap_energy(restricted_skin: &GrayImage, alpha: &GrayImage, threshold: u8) -> usize {
    restricted_skin
        .pixels()
        .zip(alpha.pixels())
        .filter(|(skin, a)| skin[0] > 0 && a[0] > threshold)
        .count()
}

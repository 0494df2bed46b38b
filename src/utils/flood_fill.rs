//! Stack-based flood fill and the helpers built on top of it.
//!
//! Every "closed outline to filled region" conversion in the crate goes through
//! [`fill_closed_boundary`]: the outline is drawn into an otherwise empty mask,
//! the exterior is flooded from a free image corner, and everything that was
//! neither flooded nor part of the outline becomes the interior.

use image::{GrayImage, Luma, Primitive};
use imageproc::definitions::Image;

/// Value written into the exterior while filling a boundary image.
const EXTERIOR_MARKER: u8 = 128;

/// First label handed out by [`label_components`]. Zero and one are reserved for
/// background and "set but not yet labelled".
pub const FIRST_COMPONENT_LABEL: u32 = 2;

/// Replaces the 4-connected region of pixels equal to the seed's value with
/// `new_value`.
///
/// Returns the number of pixels written. A seed outside the image, or one that
/// already holds `new_value`, fills nothing.
pub fn flood_fill<T>(image: &mut Image<Luma<T>>, seed: (u32, u32), new_value: T) -> usize
where
    T: Primitive + PartialEq,
{
    let (width, height) = image.dimensions();
    let (seed_x, seed_y) = seed;
    if seed_x >= width || seed_y >= height {
        return 0;
    }

    let target = image.get_pixel(seed_x, seed_y)[0];
    if target == new_value {
        return 0;
    }

    let mut filled = 0;
    let mut stack = vec![(seed_x, seed_y)];
    while let Some((x, y)) = stack.pop() {
        if image.get_pixel(x, y)[0] != target {
            continue;
        }
        image.put_pixel(x, y, Luma([new_value]));
        filled += 1;

        if x > 0 {
            stack.push((x - 1, y));
        }
        if x + 1 < width {
            stack.push((x + 1, y));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
        if y + 1 < height {
            stack.push((x, y + 1));
        }
    }

    filled
}

/// Converts a one-pixel-wide closed outline into its filled interior.
///
/// `boundary` holds non-zero pixels on the outline. The outline itself is not
/// part of the returned mask. Interior pixels are 255, everything else 0.
#[must_use]
pub fn fill_closed_boundary(boundary: &GrayImage) -> GrayImage {
    let (width, height) = boundary.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }

    let mut work = GrayImage::from_fn(width, height, |x, y| {
        if boundary.get_pixel(x, y)[0] > 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    let corners = [
        (0, 0),
        (width - 1, 0),
        (0, height - 1),
        (width - 1, height - 1),
    ];
    match corners
        .into_iter()
        .find(|&(x, y)| work.get_pixel(x, y)[0] == 0)
    {
        Some(seed) => {
            flood_fill(&mut work, seed, EXTERIOR_MARKER);
        }
        None => log::warn!("Every image corner lies on the outline; treating the whole image as interior"),
    }

    GrayImage::from_fn(width, height, |x, y| {
        if work.get_pixel(x, y)[0] == 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Labels the 4-connected components of the non-zero pixels of `mask`.
///
/// Components receive consecutive ids starting at [`FIRST_COMPONENT_LABEL`] in
/// row-major order of their first pixel; background stays 0. Returns the label
/// image and the number of components.
#[must_use]
pub fn label_components(mask: &GrayImage) -> (Image<Luma<u32>>, u32) {
    let (width, height) = mask.dimensions();
    let mut labels: Image<Luma<u32>> = Image::from_fn(width, height, |x, y| {
        Luma([u32::from(mask.get_pixel(x, y)[0] > 0)])
    });

    let mut next_label = FIRST_COMPONENT_LABEL;
    for y in 0..height {
        for x in 0..width {
            if labels.get_pixel(x, y)[0] == 1 {
                flood_fill(&mut labels, (x, y), next_label);
                next_label += 1;
            }
        }
    }

    (labels, next_label - FIRST_COMPONENT_LABEL)
}

//! Internal utility functions shared by the hair-swap stages.

mod flood_fill;
pub use flood_fill::{FIRST_COMPONENT_LABEL, fill_closed_boundary, flood_fill, label_components};

use imageproc::rect::Rect;

/// Validates that an image has non-zero dimensions.
///
/// # Arguments
///
/// * `width` - The width of the image
/// * `height` - The height of the image
/// * `context` - A description of the context for error messages
///
/// # Returns
///
/// `Ok(())` if the dimensions are valid, otherwise an error
pub fn validate_non_empty_image(width: u32, height: u32, context: &str) -> Result<(), String> {
    if width == 0 || height == 0 {
        Err(format!("{context}: Image dimensions must be non-zero"))
    } else {
        Ok(())
    }
}

/// Validates that two images have matching dimensions.
///
/// # Returns
///
/// `Ok(())` if the dimensions match, otherwise an error
pub fn validate_matching_dimensions(
    width1: u32,
    height1: u32,
    width2: u32,
    height2: u32,
    context: &str,
) -> Result<(), String> {
    if width1 != width2 || height1 != height2 {
        Err(format!(
            "{context}: Image dimensions must match. Got {width1}x{height1} and {width2}x{height2}"
        ))
    } else {
        Ok(())
    }
}

/// Builds a rectangle from inclusive-exclusive bounds, clamped into a
/// `width`x`height` image and never smaller than one pixel.
///
/// Returns the rectangle and whether clamping changed it.
pub fn clamped_rect(left: i32, top: i32, right: i32, bottom: i32, width: u32, height: u32) -> (Rect, bool) {
    let max_x = width.max(1) as i32 - 1;
    let max_y = height.max(1) as i32 - 1;

    let x0 = left.clamp(0, max_x);
    let y0 = top.clamp(0, max_y);
    let x1 = right.clamp(x0 + 1, max_x + 1);
    let y1 = bottom.clamp(y0 + 1, max_y + 1);

    let adjusted = (x0, y0, x1, y1) != (left, top, right, bottom);
    let rect = Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32);
    (rect, adjusted)
}

//! Block-matching skin texture synthesis.

use image::{GenericImageView, Rgb, RgbImage};
use imageproc::filter::median_filter;

/// Tiles a `width`x`height` texture with blocks copied from `strip`.
///
/// Blocks are placed row-major. The first one is the strip block whose mean is
/// closest to the strip's mean colour; every later block minimizes the
/// absolute difference between its top row and the bottom row of the block
/// above plus its left column and the right column of the block to the left.
/// A `median_radius` median filter hides the seams.
///
/// Blocks shrink to the strip when it is smaller than `block_size`.
#[must_use]
pub fn synthesize_texture(
    strip: &RgbImage,
    width: u32,
    height: u32,
    block_size: u32,
    median_radius: u32,
) -> RgbImage {
    let mut texture = RgbImage::new(width, height);
    let (strip_w, strip_h) = strip.dimensions();
    if width == 0 || height == 0 || strip_w == 0 || strip_h == 0 {
        return texture;
    }

    let block = block_size.max(1).min(strip_w).min(strip_h);
    let candidates: Vec<(u32, u32)> = (0..=strip_h - block)
        .flat_map(|y| (0..=strip_w - block).map(move |x| (x, y)))
        .collect();

    let first = first_block_impl(strip, &candidates, block);

    for by in (0..height).step_by(block as usize) {
        for bx in (0..width).step_by(block as usize) {
            let chosen = if bx == 0 && by == 0 {
                first
            } else {
                let mut best = candidates[0];
                let mut best_cost = u64::MAX;
                for &candidate in &candidates {
                    let cost = seam_cost_impl(strip, candidate, &texture, (bx, by), block);
                    if cost < best_cost {
                        best = candidate;
                        best_cost = cost;
                    }
                }
                best
            };

            let block_w = block.min(width - bx);
            let block_h = block.min(height - by);
            for dy in 0..block_h {
                for dx in 0..block_w {
                    let pixel = *strip.get_pixel(chosen.0 + dx, chosen.1 + dy);
                    texture.put_pixel(bx + dx, by + dy, pixel);
                }
            }
        }
    }

    log::debug!("Synthesized {width}x{height} texture from {strip_w}x{strip_h} strip");

    if median_radius > 0 {
        median_filter(&texture, median_radius, median_radius)
    } else {
        texture
    }
}

fn first_block_impl(strip: &RgbImage, candidates: &[(u32, u32)], block: u32) -> (u32, u32) {
    let target = mean_color_impl(&*strip.view(0, 0, strip.width(), strip.height()));

    let mut best = candidates[0];
    let mut best_distance = f64::INFINITY;
    for &(x, y) in candidates {
        let mean = mean_color_impl(&*strip.view(x, y, block, block));
        let distance: f64 = (0..3).map(|c| (mean[c] - target[c]).powi(2)).sum();
        if distance < best_distance {
            best = (x, y);
            best_distance = distance;
        }
    }
    best
}

fn mean_color_impl<V>(view: &V) -> [f64; 3]
where
    V: GenericImageView<Pixel = Rgb<u8>>,
{
    let (w, h) = view.dimensions();
    let n = f64::from(w * h);
    let mut sum = [0.0_f64; 3];
    for (_, _, pixel) in view.pixels() {
        for c in 0..3 {
            sum[c] += f64::from(pixel[c]);
        }
    }
    sum.map(|s| s / n)
}

/// Seam difference of placing the strip block at `candidate` at `position`.
fn seam_cost_impl(
    strip: &RgbImage,
    candidate: (u32, u32),
    texture: &RgbImage,
    position: (u32, u32),
    block: u32,
) -> u64 {
    let (bx, by) = position;
    let block_w = block.min(texture.width() - bx);
    let block_h = block.min(texture.height() - by);
    let mut cost = 0_u64;

    if by > 0 {
        for dx in 0..block_w {
            let above = texture.get_pixel(bx + dx, by - 1);
            let own = strip.get_pixel(candidate.0 + dx, candidate.1);
            cost += abs_diff_impl(above, own);
        }
    }
    if bx > 0 {
        for dy in 0..block_h {
            let left = texture.get_pixel(bx - 1, by + dy);
            let own = strip.get_pixel(candidate.0, candidate.1 + dy);
            cost += abs_diff_impl(left, own);
        }
    }
    cost
}

#[inline]
fn abs_diff_impl(a: &Rgb<u8>, b: &Rgb<u8>) -> u64 {
    (0..3).map(|c| u64::from(a[c].abs_diff(b[c]))).sum()
}

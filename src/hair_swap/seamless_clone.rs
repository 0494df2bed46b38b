//! Poisson image editing (Pérez et al., SIGGRAPH 2003).
//!
//! The masked part of a source image is pasted into a destination so that the
//! pasted region keeps the source's gradients while matching the destination
//! along its border. Per channel the unknown values `f` solve
//!
//! ```text
//! 4 f_q - Σ_{n ∈ N(q) ∩ Ω} f_n = Σ_{n ∈ N(q) \ Ω} dst_n + Σ_n v_qn
//! ```
//!
//! with guidance `v_qn = src_p - src_pn` ([`CloneMode::Normal`]) or the larger
//! of the source and destination difference ([`CloneMode::Mixed`]). The system
//! is solved with successive over-relaxation.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::definitions::Clamp;

use crate::error::SeamlessCloneError;
use crate::utils::validate_matching_dimensions;

const NEIGHBOURS: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Guidance field of the clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneMode {
    /// Source gradients only
    #[default]
    Normal,
    /// Per direction the stronger of the source and destination gradients
    Mixed,
}

/// Settings of the iterative Poisson solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonSolver {
    pub iterations: u32,
    /// Over-relaxation factor, in `(0, 2)`
    pub omega: f32,
}

impl Default for PoissonSolver {
    fn default() -> Self {
        Self {
            iterations: 300,
            omega: 1.9,
        }
    }
}

/// Pastes the masked part of `source` into `destination`, centring the mask's
/// bounding box on `center`.
///
/// Mask pixels that would land on or outside the destination border are left
/// out of the region.
///
/// # Errors
///
/// * `SeamlessCloneError::DimensionMismatch` - When source and mask sizes differ
/// * `SeamlessCloneError::InvalidParameter` - When the solver settings are unusable
/// * `SeamlessCloneError::EmptyRegion` - When no mask pixel lands inside the destination
pub fn seamless_clone(
    source: &RgbImage,
    destination: &RgbImage,
    mask: &GrayImage,
    center: (i32, i32),
    mode: CloneMode,
    solver: PoissonSolver,
) -> Result<RgbImage, SeamlessCloneError> {
    validate_inputs_impl(source, mask, solver)?;

    let (left, top, right, bottom) =
        mask_bounds_impl(mask).ok_or(SeamlessCloneError::EmptyRegion)?;
    let offset = (
        center.0 - (left + (right - left + 1) / 2),
        center.1 - (top + (bottom - top + 1) / 2),
    );

    let (dst_w, dst_h) = (destination.width() as i32, destination.height() as i32);
    let mut slot = vec![usize::MAX; (dst_w * dst_h) as usize];
    let mut region: Vec<(i32, i32)> = Vec::new();
    for (x, y, m) in mask.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }
        let (qx, qy) = (x as i32 + offset.0, y as i32 + offset.1);
        if qx <= 0 || qy <= 0 || qx >= dst_w - 1 || qy >= dst_h - 1 {
            continue;
        }
        slot[(qy * dst_w + qx) as usize] = region.len();
        region.push((qx, qy));
    }
    if region.is_empty() {
        return Err(SeamlessCloneError::EmptyRegion);
    }
    log::debug!(
        "Seamless clone ({mode:?}) of {} pixels offset by {offset:?}",
        region.len()
    );

    let source_at = |qx: i32, qy: i32| -> Option<[f32; 3]> {
        let (px, py) = (qx - offset.0, qy - offset.1);
        (px >= 0 && py >= 0 && px < source.width() as i32 && py < source.height() as i32)
            .then(|| source.get_pixel(px as u32, py as u32).0.map(f32::from))
    };
    let destination_at =
        |qx: i32, qy: i32| destination.get_pixel(qx as u32, qy as u32).0.map(f32::from);

    // Constant part of every equation: guidance plus fixed border values.
    let mut rhs = vec![[0.0_f32; 3]; region.len()];
    let mut boundary_offset = [0.0_f32; 3];
    let mut boundary_count = 0_u32;
    for (i, &(qx, qy)) in region.iter().enumerate() {
        let own_source = source_at(qx, qy).unwrap_or_else(|| destination_at(qx, qy));
        let own_destination = destination_at(qx, qy);
        for (dx, dy) in NEIGHBOURS {
            let (nx, ny) = (qx + dx, qy + dy);
            let neighbour_source = source_at(nx, ny).unwrap_or(own_source);
            let neighbour_destination = destination_at(nx, ny);
            for c in 0..3 {
                let source_gradient = own_source[c] - neighbour_source[c];
                rhs[i][c] += match mode {
                    CloneMode::Normal => source_gradient,
                    CloneMode::Mixed => {
                        let destination_gradient = own_destination[c] - neighbour_destination[c];
                        if destination_gradient.abs() > source_gradient.abs() {
                            destination_gradient
                        } else {
                            source_gradient
                        }
                    }
                };
            }
            if slot[(ny * dst_w + nx) as usize] == usize::MAX {
                boundary_count += 1;
                for c in 0..3 {
                    rhs[i][c] += neighbour_destination[c];
                    boundary_offset[c] += neighbour_destination[c] - neighbour_source[c];
                }
            }
        }
    }
    if boundary_count > 0 {
        boundary_offset = boundary_offset.map(|v| v / boundary_count as f32);
    }

    let mut values: Vec<[f32; 3]> = region
        .iter()
        .map(|&(qx, qy)| {
            let own = source_at(qx, qy).unwrap_or_else(|| destination_at(qx, qy));
            [
                own[0] + boundary_offset[0],
                own[1] + boundary_offset[1],
                own[2] + boundary_offset[2],
            ]
        })
        .collect();

    let omega = solver.omega;
    for _ in 0..solver.iterations {
        for i in 0..region.len() {
            let (qx, qy) = region[i];
            let mut sum = rhs[i];
            for (dx, dy) in NEIGHBOURS {
                let n = slot[((qy + dy) * dst_w + qx + dx) as usize];
                if n != usize::MAX {
                    for c in 0..3 {
                        sum[c] += values[n][c];
                    }
                }
            }
            for c in 0..3 {
                values[i][c] = (1.0 - omega).mul_add(values[i][c], omega * sum[c] / 4.0);
            }
        }
    }

    let mut output = destination.clone();
    for (&(qx, qy), value) in region.iter().zip(&values) {
        let pixel = value.map(|v| <u8 as Clamp<f32>>::clamp(v.round()));
        output.put_pixel(qx as u32, qy as u32, Rgb(pixel));
    }
    Ok(output)
}

/// Inclusive bounding box `(left, top, right, bottom)` of the non-zero pixels.
fn mask_bounds_impl(mask: &GrayImage) -> Option<(i32, i32, i32, i32)> {
    mask.enumerate_pixels()
        .filter(|(_, _, p)| p[0] > 0)
        .fold(None, |bounds, (x, y, _)| {
            let (x, y) = (x as i32, y as i32);
            Some(match bounds {
                None => (x, y, x, y),
                Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(x), b.max(y)),
            })
        })
}

fn validate_inputs_impl(
    source: &RgbImage,
    mask: &GrayImage,
    solver: PoissonSolver,
) -> Result<(), SeamlessCloneError> {
    let (src_w, src_h) = source.dimensions();
    let (mask_w, mask_h) = mask.dimensions();
    validate_matching_dimensions(src_w, src_h, mask_w, mask_h, "SeamlessClone").map_err(|_| {
        SeamlessCloneError::DimensionMismatch {
            expected: (src_w, src_h),
            actual: (mask_w, mask_h),
        }
    })?;

    if solver.iterations == 0 {
        return Err(SeamlessCloneError::InvalidParameter(
            "iterations must be > 0".to_owned(),
        ));
    }
    if !(solver.omega > 0.0 && solver.omega < 2.0) {
        return Err(SeamlessCloneError::InvalidParameter(format!(
            "omega must be in (0, 2), got {}",
            solver.omega
        )));
    }
    Ok(())
}

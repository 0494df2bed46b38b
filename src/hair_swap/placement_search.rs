//! Exhaustive search for the scale and offset of the transplanted hair.
//!
//! Every candidate maps a model hair pixel `p` to
//!
//! ```text
//! p' = J_t + offset + t + s ⊙ (p - c)
//! ```
//!
//! where `c` is the hair's connection point, `offset` its distance to the
//! model's anchor, `J_t` the target's anchor, `s` the per-axis scale and `t`
//! the translation. The identity candidate reproduces the model's hair
//! position relative to its anchor.
//!
//! Candidates are enumerated as a nested grid `sx × sy × tx × ty`. Each is
//! scored by `energy_weight · holes + overlap` and the lowest cost wins; on
//! equal cost the candidate enumerated later wins.

use image::{GrayImage, Luma, Rgba, RgbImage};
use imageproc::definitions::Image;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::SearchConfig;
use crate::error::PlacementError;
use crate::hair_swap::compositing::CompositeOverExt;
use crate::hair_swap::energy::{hole_energy, overlap_energy, restricted_skin_mask, upper_face_contour};
use crate::hair_swap::face_model::FaceModel;
use crate::hair_swap::hair_segmenter::Hair;
use crate::utils::validate_matching_dimensions;

/// Tolerance used when comparing grid values built from float steps.
const GRID_EPSILON: f32 = 1e-4;

/// Scale and translation of one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Placement {
    pub scale_x: f32,
    pub scale_y: f32,
    pub translate_x: i32,
    pub translate_y: i32,
}

impl Placement {
    pub const IDENTITY: Self = Self {
        scale_x: 1.0,
        scale_y: 1.0,
        translate_x: 0,
        translate_y: 0,
    };

    /// Projection taking `connection` to `destination + t`, scaling about it.
    #[must_use]
    pub fn projection(&self, connection: (i32, i32), destination: (i32, i32)) -> Projection {
        Projection::translate(
            (destination.0 + self.translate_x) as f32,
            (destination.1 + self.translate_y) as f32,
        ) * Projection::scale(self.scale_x, self.scale_y)
            * Projection::translate(-connection.0 as f32, -connection.1 as f32)
    }
}

/// Energies and cost of one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidateScore {
    pub holes: usize,
    pub overlap: usize,
    pub cost: f64,
}

/// Everything the scorer needs, prepared once per search.
#[derive(Debug, Clone)]
pub struct SearchContext<'a> {
    hair_pixels: &'a Image<Rgba<u8>>,
    connection_point: (i32, i32),
    destination: (i32, i32),
    dimensions: (u32, u32),
    face_mask: &'a GrayImage,
    contour: Vec<(i32, i32)>,
    restricted_skin: GrayImage,
    alpha_threshold: u8,
    energy_weight: f64,
}

impl<'a> SearchContext<'a> {
    #[must_use]
    pub fn new(target: &'a FaceModel, hair: &'a Hair, config: &SearchConfig) -> Self {
        let (jx, jy) = target.anchor();
        Self {
            hair_pixels: &hair.hair_pixels,
            connection_point: hair.connection_point,
            destination: (jx + hair.offset_to_anchor.0, jy + hair.offset_to_anchor.1),
            dimensions: target.dimensions(),
            face_mask: target.face_mask(),
            contour: upper_face_contour(target.face_mask(), target.hair_typical_bottom()),
            restricted_skin: restricted_skin_mask(
                target.skin_mask(),
                target.left_edge(),
                target.right_edge(),
                config.edge_margin,
            ),
            alpha_threshold: config.alpha_threshold,
            energy_weight: config.energy_weight,
        }
    }

    /// The hair warped into the target frame by `placement`.
    #[must_use]
    pub fn warp(&self, placement: &Placement) -> Image<Rgba<u8>> {
        let projection = placement.projection(self.connection_point, self.destination);
        warp_layer(self.hair_pixels, &projection, self.dimensions)
    }
}

/// Warps an RGBA layer into a transparent `dimensions` buffer.
#[must_use]
pub fn warp_layer(
    layer: &Image<Rgba<u8>>,
    projection: &Projection,
    dimensions: (u32, u32),
) -> Image<Rgba<u8>> {
    let mut out = Image::new(dimensions.0, dimensions.1);
    warp_into(
        layer,
        projection,
        Interpolation::Nearest,
        Rgba([0, 0, 0, 0]),
        &mut out,
    );
    out
}

/// Scores one candidate. Pure: depends only on its arguments.
#[must_use]
pub fn score(context: &SearchContext<'_>, placement: &Placement) -> CandidateScore {
    let warped = context.warp(placement);
    let alpha = GrayImage::from_fn(warped.width(), warped.height(), |x, y| {
        Luma([warped.get_pixel(x, y)[3]])
    });

    let holes = hole_energy(
        context.face_mask,
        &context.contour,
        &alpha,
        context.alpha_threshold,
    );
    let overlap = overlap_energy(&context.restricted_skin, &alpha, context.alpha_threshold);
    CandidateScore {
        holes,
        overlap,
        cost: context.energy_weight.mul_add(holes as f64, overlap as f64),
    }
}

/// Winning candidate and its composite.
#[derive(Debug, Clone)]
pub struct PlacementResult {
    pub image: RgbImage,
    pub placement: Placement,
    pub score: CandidateScore,
    pub candidates_evaluated: usize,
}

/// Grid search with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct PlacementSearch {
    config: SearchConfig,
}

impl PlacementSearch {
    #[must_use]
    pub const fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Scale values of one axis, restricted to the head-size prior.
    ///
    /// When no grid value lies within the tolerance of `ratio`, the grid value
    /// closest to it is used alone.
    #[must_use]
    pub fn scales(&self, ratio: f32) -> Vec<f32> {
        let config = &self.config;
        let steps = ((config.scale_max - config.scale_min) / config.scale_step + GRID_EPSILON)
            .floor()
            .max(0.0) as u32;
        let grid: Vec<f32> = (0..=steps)
            .map(|i| (i as f32).mul_add(config.scale_step, config.scale_min))
            .collect();

        let allowed: Vec<f32> = grid
            .iter()
            .copied()
            .filter(|s| (s - ratio).abs() <= config.head_ratio_tolerance + GRID_EPSILON)
            .collect();
        if !allowed.is_empty() {
            return allowed;
        }

        let closest = grid.iter().copied().fold(None, |best: Option<f32>, s| match best {
            Some(b) if (b - ratio).abs() <= (s - ratio).abs() => Some(b),
            _ => Some(s),
        });
        log::warn!("No scale within the head-size prior of {ratio:.3}, using {closest:?}");
        closest.into_iter().collect()
    }

    /// All candidates in scan order.
    ///
    /// # Errors
    ///
    /// * `PlacementError::InvalidParameter` - When a step is not positive
    pub fn candidates(&self, ratio: f32) -> Result<Vec<Placement>, PlacementError> {
        let config = &self.config;
        if !(config.scale_step > 0.0) {
            return Err(PlacementError::InvalidParameter(
                "scale_step must be > 0".to_owned(),
            ));
        }
        if config.translation_step == 0 {
            return Err(PlacementError::InvalidParameter(
                "translation_step must be > 0".to_owned(),
            ));
        }

        let scales = self.scales(ratio);
        let step = config.translation_step as usize;
        let mut candidates = Vec::new();
        for &scale_x in &scales {
            for &scale_y in &scales {
                for translate_x in (-config.max_tx..=config.max_tx).step_by(step) {
                    for translate_y in (-config.max_ty..=config.max_ty).step_by(step) {
                        candidates.push(Placement {
                            scale_x,
                            scale_y,
                            translate_x,
                            translate_y,
                        });
                    }
                }
            }
        }
        Ok(candidates)
    }

    /// Finds the best placement of `hair` on the synthesized target face and
    /// composites it.
    ///
    /// # Errors
    ///
    /// * `PlacementError::DimensionMismatch` - When the face image and model differ in size
    /// * `PlacementError::InvalidParameter` - When a head width or step is not positive
    /// * `PlacementError::EmptySearchSpace` - When the grid holds no candidate
    pub fn run(
        &self,
        target: &FaceModel,
        face_image: &RgbImage,
        hair: &Hair,
        target_head_width: i32,
        model_head_width: i32,
    ) -> Result<PlacementResult, PlacementError> {
        let (width, height) = target.dimensions();
        let (face_w, face_h) = face_image.dimensions();
        validate_matching_dimensions(width, height, face_w, face_h, "PlacementSearch").map_err(
            |_| PlacementError::DimensionMismatch {
                expected: (width, height),
                actual: (face_w, face_h),
            },
        )?;
        if target_head_width <= 0 || model_head_width <= 0 {
            return Err(PlacementError::InvalidParameter(format!(
                "head widths must be > 0, got {target_head_width} and {model_head_width}"
            )));
        }

        let ratio = target_head_width as f32 / model_head_width as f32;
        let candidates = self.candidates(ratio)?;
        log::debug!(
            "Searching {} placements, head ratio {ratio:.3}",
            candidates.len()
        );

        let context = SearchContext::new(target, hair, &self.config);
        let (placement, best) =
            select_best_impl(&context, &candidates).ok_or(PlacementError::EmptySearchSpace)?;

        let layer = context.warp(&placement);
        let image = face_image
            .clone()
            .composite_over(&layer)
            .map_err(|e| PlacementError::InvalidParameter(e.to_string()))?;

        log::info!(
            "Best placement {placement:?}: holes={}, overlap={}, cost={}",
            best.holes,
            best.overlap,
            best.cost
        );
        Ok(PlacementResult {
            image,
            placement,
            score: best,
            candidates_evaluated: candidates.len(),
        })
    }
}

/// Lowest-cost candidate; the later one wins ties.
fn reduce_impl<I>(scored: I) -> Option<(Placement, CandidateScore)>
where
    I: IntoIterator<Item = (Placement, CandidateScore)>,
{
    scored.into_iter().fold(None, |best, (placement, score)| match best {
        Some((_, best_score)) if score.cost > best_score.cost => best,
        _ => Some((placement, score)),
    })
}

#[cfg(not(feature = "parallel"))]
fn select_best_impl(
    context: &SearchContext<'_>,
    candidates: &[Placement],
) -> Option<(Placement, CandidateScore)> {
    reduce_impl(candidates.iter().map(|placement| {
        let candidate = score(context, placement);
        log::trace!("{placement:?}: {candidate:?}");
        (*placement, candidate)
    }))
}

#[cfg(feature = "parallel")]
fn select_best_impl(
    context: &SearchContext<'_>,
    candidates: &[Placement],
) -> Option<(Placement, CandidateScore)> {
    let scores: Vec<CandidateScore> = candidates
        .par_iter()
        .map(|placement| score(context, placement))
        .collect();
    reduce_impl(candidates.iter().copied().zip(scores))
}

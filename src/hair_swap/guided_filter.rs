//! Edge-preserving guided filter with a colour guide.
//!
//! Implements the colour-guide variant of He, Sun & Tang, "Guided Image
//! Filtering" (ECCV 2010). Inside every window `ω_k` the output is modelled as a
//! linear function of the guide colour `I`:
//!
//! ```text
//! q_i = a_kᵀ I_i + b_k
//! a_k = (Σ_k + εU)⁻¹ (mean_k(I p) - μ_k p̄_k)
//! b_k = p̄_k - a_kᵀ μ_k
//! ```
//!
//! where `Σ_k` is the 3x3 colour covariance of the window. The final output
//! averages `a` and `b` over all windows covering a pixel. Colours and the input
//! are scaled to `0..=1`, so `ε` is expressed in that range.
//!
//! All window means are box means computed with `libblur`.

use image::{Luma, Rgb};
use imageproc::definitions::{Clamp, Image};
use itertools::izip;

use crate::error::GuidedFilterError;
use crate::hair_swap::box_filter::{box_mean, fits_kernel};
use crate::utils::validate_matching_dimensions;

/// Trait for refining a single-channel map with the guided filter.
pub trait GuidedFilterExt {
    /// Filters the map, using `guide` to preserve its edges.
    ///
    /// This consumes the original map.
    ///
    /// # Arguments
    ///
    /// * `guide` - Colour image the output should follow
    /// * `radius` - Window radius, the window side is `2 * radius + 1`
    /// * `epsilon` - Regularization on `0..=1` data; larger values smooth more
    ///
    /// # Errors
    ///
    /// * `GuidedFilterError::DimensionMismatch` - When the guide size differs
    /// * `GuidedFilterError::InvalidRadius` - When `radius` is zero
    /// * `GuidedFilterError::InvalidEpsilon` - When `epsilon` is not a positive finite value
    /// * `GuidedFilterError::ImageTooSmall` - When the window does not fit the image
    fn guided_filter(
        self,
        guide: &Image<Rgb<u8>>,
        radius: u32,
        epsilon: f32,
    ) -> Result<Self, GuidedFilterError>
    where
        Self: Sized;

    /// Filters the map in place.
    fn guided_filter_mut(
        &mut self,
        guide: &Image<Rgb<u8>>,
        radius: u32,
        epsilon: f32,
    ) -> Result<&mut Self, GuidedFilterError>;
}

impl GuidedFilterExt for Image<Luma<u8>> {
    fn guided_filter(
        mut self,
        guide: &Image<Rgb<u8>>,
        radius: u32,
        epsilon: f32,
    ) -> Result<Self, GuidedFilterError> {
        self.guided_filter_mut(guide, radius, epsilon)?;
        Ok(self)
    }

    fn guided_filter_mut(
        &mut self,
        guide: &Image<Rgb<u8>>,
        radius: u32,
        epsilon: f32,
    ) -> Result<&mut Self, GuidedFilterError> {
        let filtered = guided_filter(guide, self, radius, epsilon)?;
        izip!(self.pixels_mut(), filtered.pixels()).for_each(|(dst, &Luma([q]))| {
            *dst = Luma([<u8 as Clamp<f32>>::clamp(q.mul_add(255.0, 0.5))]);
        });
        Ok(self)
    }
}

/// Runs the guided filter and returns the output on the `0..=1` scale.
pub fn guided_filter(
    guide: &Image<Rgb<u8>>,
    input: &Image<Luma<u8>>,
    radius: u32,
    epsilon: f32,
) -> Result<Image<Luma<f32>>, GuidedFilterError> {
    validate_inputs_impl(guide, input, radius, epsilon)?;

    let (width, height) = guide.dimensions();
    let kernel = 2 * radius + 1;
    let mean = |image: &Image<Rgb<f32>>| {
        box_mean(image, kernel).map_err(GuidedFilterError::BoxFilter)
    };
    let mean_plane = |image: &Image<Luma<f32>>| {
        box_mean(image, kernel).map_err(GuidedFilterError::BoxFilter)
    };

    let guide_f: Image<Rgb<f32>> = Image::from_fn(width, height, |x, y| {
        let Rgb([r, g, b]) = *guide.get_pixel(x, y);
        Rgb([r, g, b].map(|v| f32::from(v) / 255.0))
    });
    let input_f: Image<Luma<f32>> =
        Image::from_fn(width, height, |x, y| Luma([f32::from(input.get_pixel(x, y)[0]) / 255.0]));

    let mut guide_times_input: Image<Rgb<f32>> = Image::new(width, height);
    let mut products_r: Image<Rgb<f32>> = Image::new(width, height);
    let mut products_g: Image<Rgb<f32>> = Image::new(width, height);
    izip!(
        guide_times_input.pixels_mut(),
        products_r.pixels_mut(),
        products_g.pixels_mut(),
        guide_f.pixels(),
        input_f.pixels()
    )
    .for_each(|(ip, pr, pg, &Rgb([r, g, b]), &Luma([p]))| {
        *ip = Rgb([r * p, g * p, b * p]);
        *pr = Rgb([r * r, r * g, r * b]);
        *pg = Rgb([g * g, g * b, b * b]);
    });

    let mean_guide = mean(&guide_f)?;
    let mean_input = mean_plane(&input_f)?;
    let mean_guide_input = mean(&guide_times_input)?;
    let mean_products_r = mean(&products_r)?;
    let mean_products_g = mean(&products_g)?;

    let mut coefficients: Image<Rgb<f32>> = Image::new(width, height);
    let mut offsets: Image<Luma<f32>> = Image::new(width, height);
    izip!(
        coefficients.pixels_mut(),
        offsets.pixels_mut(),
        mean_guide.pixels(),
        mean_input.pixels(),
        mean_guide_input.pixels(),
        mean_products_r.pixels(),
        mean_products_g.pixels()
    )
    .for_each(|(a, b, &Rgb(mu), &Luma([p_mean]), &Rgb(ip), &Rgb(pr), &Rgb(pg))| {
        let mu = mu.map(f64::from);
        let p_mean = f64::from(p_mean);
        let epsilon = f64::from(epsilon);
        let cov = [0, 1, 2].map(|c| f64::from(ip[c]) - mu[c] * p_mean);
        let var_rr = f64::from(pr[0]) - mu[0] * mu[0] + epsilon;
        let var_rg = f64::from(pr[1]) - mu[0] * mu[1];
        let var_rb = f64::from(pr[2]) - mu[0] * mu[2];
        let var_gg = f64::from(pg[0]) - mu[1] * mu[1] + epsilon;
        let var_gb = f64::from(pg[1]) - mu[1] * mu[2];
        let var_bb = f64::from(pg[2]) - mu[2] * mu[2] + epsilon;

        let coeff = solve_symmetric_3x3_impl(
            [var_rr, var_rg, var_rb, var_gg, var_gb, var_bb],
            cov,
        );
        let offset = p_mean - coeff[0] * mu[0] - coeff[1] * mu[1] - coeff[2] * mu[2];
        *a = Rgb(coeff.map(|v| v as f32));
        *b = Luma([offset as f32]);
    });

    let mean_coefficients = mean(&coefficients)?;
    let mean_offsets = mean_plane(&offsets)?;

    let mut output: Image<Luma<f32>> = Image::new(width, height);
    izip!(
        output.pixels_mut(),
        guide_f.pixels(),
        mean_coefficients.pixels(),
        mean_offsets.pixels()
    )
    .for_each(|(q, &Rgb(color), &Rgb(a), &Luma([b]))| {
        let value = a[0].mul_add(color[0], a[1].mul_add(color[1], a[2].mul_add(color[2], b)));
        *q = Luma([value.clamp(0.0, 1.0)]);
    });

    Ok(output)
}

/// Solves `S x = v` for the symmetric matrix given by its upper triangle
/// `[rr, rg, rb, gg, gb, bb]`.
#[inline]
fn solve_symmetric_3x3_impl(upper: [f64; 6], v: [f64; 3]) -> [f64; 3] {
    let [rr, rg, rb, gg, gb, bb] = upper;

    let inv_rr = gg * bb - gb * gb;
    let inv_rg = gb * rb - rg * bb;
    let inv_rb = rg * gb - gg * rb;
    let inv_gg = rr * bb - rb * rb;
    let inv_gb = rb * rg - rr * gb;
    let inv_bb = rr * gg - rg * rg;

    let det = inv_rr * rr + inv_rg * rg + inv_rb * rb;
    if det == 0.0 {
        return [0.0; 3];
    }
    let inv_det = 1.0 / det;

    [
        (inv_rr * v[0] + inv_rg * v[1] + inv_rb * v[2]) * inv_det,
        (inv_rg * v[0] + inv_gg * v[1] + inv_gb * v[2]) * inv_det,
        (inv_rb * v[0] + inv_gb * v[1] + inv_bb * v[2]) * inv_det,
    ]
}

fn validate_inputs_impl(
    guide: &Image<Rgb<u8>>,
    input: &Image<Luma<u8>>,
    radius: u32,
    epsilon: f32,
) -> Result<(), GuidedFilterError> {
    let (width, height) = guide.dimensions();
    let (input_w, input_h) = input.dimensions();
    validate_matching_dimensions(width, height, input_w, input_h, "GuidedFilter").map_err(
        |_| GuidedFilterError::DimensionMismatch {
            expected: (width, height),
            actual: (input_w, input_h),
        },
    )?;

    if radius == 0 {
        return Err(GuidedFilterError::InvalidRadius { radius });
    }
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(GuidedFilterError::InvalidEpsilon { epsilon });
    }
    if !fits_kernel(width, height, 2 * radius + 1) {
        return Err(GuidedFilterError::ImageTooSmall {
            width,
            height,
            radius,
        });
    }

    Ok(())
}

//! Blur-Fusion foreground colour estimation for matted hair.
//!
//! Implements the approach of Forte & Pitié, "Approximate Fast Foreground Colour
//! Estimation" (ICIP 2021). Hair pixels in the soft fringe of the matte are a
//! mix of hair and the model's background:
//!
//! ```text
//! I_i = α_i F_i + (1 - α_i) B_i
//! ```
//!
//! Pasting `I` onto the target would carry the model's background along. Blur-Fusion
//! estimates `F` from alpha-weighted box means
//!
//! ```text
//! F̂_i = Σ(F_j α_j) / Σ(α_j)
//! B̂_i = Σ(B_j (1 - α_j)) / Σ(1 - α_j)
//! F_i = F̂_i + α_i (I_i - α_i F̂_i - (1 - α_i) B̂_i)
//! ```
//!
//! Pixels where every weight vanishes keep their observed colour.

use image::{Luma, Rgb};
use imageproc::definitions::{Clamp, Image};
use itertools::izip;

use crate::error::AlphaMaskError;
use crate::hair_swap::box_filter::{box_mean, fits_kernel};
use crate::utils::validate_matching_dimensions;

/// Trait for recovering hair colours from a matted photo.
///
/// Note: Estimation needs the observed image next to the estimate, so there is
/// no `_mut` variant.
pub trait ForegroundEstimationExt {
    /// Estimates the pure foreground colours under `alpha`.
    ///
    /// This consumes the original image.
    ///
    /// # Arguments
    ///
    /// * `alpha` - Alpha matte, 0 = background, 255 = foreground
    /// * `kernel` - Side of the averaging box (odd)
    fn estimate_foreground(
        self,
        alpha: &Image<Luma<u8>>,
        kernel: u32,
    ) -> Result<Image<Rgb<u8>>, AlphaMaskError>;

    /// Hidden _mut variant that is not available for this operation.
    #[doc(hidden)]
    fn estimate_foreground_mut(
        &mut self,
        _alpha: &Image<Luma<u8>>,
        _kernel: u32,
    ) -> Result<&mut Self, AlphaMaskError> {
        unimplemented!(
            "estimate_foreground_mut is not available because the estimate is built from the untouched image"
        )
    }
}

impl ForegroundEstimationExt for Image<Rgb<u8>> {
    fn estimate_foreground(
        self,
        alpha: &Image<Luma<u8>>,
        kernel: u32,
    ) -> Result<Image<Rgb<u8>>, AlphaMaskError> {
        estimate_foreground(&self, alpha, kernel)
    }
}

/// Largest usable odd box side not exceeding `preferred` for a `width`x`height`
/// image, or `None` if not even a 1x1 box fits.
#[must_use]
pub fn fitting_kernel(width: u32, height: u32, preferred: u32) -> Option<u32> {
    let limit = (width.min(height).saturating_sub(1)) / 2;
    let mut kernel = preferred.min(limit);
    if kernel % 2 == 0 {
        kernel = kernel.saturating_sub(1);
    }
    (kernel > 0).then_some(kernel)
}

/// Estimates foreground colours with one Blur-Fusion pass.
///
/// # Errors
///
/// * `AlphaMaskError::DimensionMismatch` - When image and matte sizes differ
/// * `AlphaMaskError::InvalidParameter` - When `kernel` is even, zero, or too
///   large for the image
pub fn estimate_foreground(
    image: &Image<Rgb<u8>>,
    alpha: &Image<Luma<u8>>,
    kernel: u32,
) -> Result<Image<Rgb<u8>>, AlphaMaskError> {
    validate_inputs_impl(image, alpha, kernel)?;

    let (width, height) = image.dimensions();
    let mut weighted_fg: Image<Rgb<f32>> = Image::new(width, height);
    let mut weighted_bg: Image<Rgb<f32>> = Image::new(width, height);
    let mut weights_fg: Image<Luma<f32>> = Image::new(width, height);
    let mut weights_bg: Image<Luma<f32>> = Image::new(width, height);

    izip!(
        weighted_fg.pixels_mut(),
        weighted_bg.pixels_mut(),
        weights_fg.pixels_mut(),
        weights_bg.pixels_mut(),
        image.pixels(),
        alpha.pixels()
    )
    .for_each(|(wf, wb, af, ab, &Rgb(color), &Luma([a]))| {
        let a = f32::from(a) / 255.0;
        let b = 1.0 - a;
        let color = color.map(f32::from);
        *wf = Rgb(color.map(|c| c * a));
        *wb = Rgb(color.map(|c| c * b));
        *af = Luma([a]);
        *ab = Luma([b]);
    });

    let blur = |e: String| AlphaMaskError::BlurFusionError(e);
    let mean_fg = box_mean(&weighted_fg, kernel).map_err(blur)?;
    let mean_bg = box_mean(&weighted_bg, kernel).map_err(blur)?;
    let mean_weight_fg = box_mean(&weights_fg, kernel).map_err(blur)?;
    let mean_weight_bg = box_mean(&weights_bg, kernel).map_err(blur)?;

    let mut foreground: Image<Rgb<u8>> = Image::new(width, height);
    izip!(
        foreground.pixels_mut(),
        image.pixels(),
        alpha.pixels(),
        mean_fg.pixels(),
        mean_bg.pixels(),
        mean_weight_fg.pixels(),
        mean_weight_bg.pixels()
    )
    .for_each(|(out, &Rgb(observed), &Luma([a]), &Rgb(sum_f), &Rgb(sum_b), &Luma([wf]), &Luma([wb]))| {
        let a = f32::from(a) / 255.0;
        let b = 1.0 - a;
        for c in 0..3 {
            let i_c = f32::from(observed[c]);
            let f_hat = if wf > 0.0 { sum_f[c] / wf } else { i_c };
            let b_hat = if wb > 0.0 { sum_b[c] / wb } else { i_c };
            let residual = b.mul_add(-b_hat, a.mul_add(-f_hat, i_c));
            out[c] = <u8 as Clamp<f32>>::clamp(a.mul_add(residual, f_hat).round());
        }
    });

    Ok(foreground)
}

fn validate_inputs_impl(
    image: &Image<Rgb<u8>>,
    alpha: &Image<Luma<u8>>,
    kernel: u32,
) -> Result<(), AlphaMaskError> {
    let (img_w, img_h) = image.dimensions();
    let (alpha_w, alpha_h) = alpha.dimensions();

    validate_matching_dimensions(img_w, img_h, alpha_w, alpha_h, "ForegroundEstimator").map_err(
        |_| AlphaMaskError::DimensionMismatch {
            expected: (img_w, img_h),
            actual: (alpha_w, alpha_h),
        },
    )?;

    if kernel == 0 {
        return Err(AlphaMaskError::InvalidParameter(
            "kernel must be > 0".to_owned(),
        ));
    }
    if kernel % 2 == 0 {
        return Err(AlphaMaskError::InvalidParameter(
            "kernel must be odd".to_owned(),
        ));
    }
    if !fits_kernel(img_w, img_h, kernel) {
        let required = 2 * kernel + 1;
        return Err(AlphaMaskError::InvalidParameter(format!(
            "Image dimensions ({img_w}x{img_h}) are too small for kernel {kernel}. Minimum required: {required}x{required}"
        )));
    }

    Ok(())
}

//! Normalized box means over `f32` images, backed by `libblur`.

use image::{ImageBuffer, Luma, Pixel, Rgb};
use imageproc::definitions::Image;
use libblur::{
    BlurImage, BlurImageMut, BoxBlurParameters, FastBlurChannels, ThreadingPolicy, box_blur_f32,
};

/// Planar or interleaved-RGB pixels that `libblur` can average.
pub(crate) trait BoxFilterable: Pixel<Subpixel = f32> {
    const CHANNELS: FastBlurChannels;
}

impl BoxFilterable for Luma<f32> {
    const CHANNELS: FastBlurChannels = FastBlurChannels::Plane;
}

impl BoxFilterable for Rgb<f32> {
    const CHANNELS: FastBlurChannels = FastBlurChannels::Channels3;
}

/// Returns whether a `width`x`height` image is large enough for a box of
/// side `kernel`.
#[inline]
pub(crate) const fn fits_kernel(width: u32, height: u32, kernel: u32) -> bool {
    let required = 2 * kernel + 1;
    width >= required && height >= required
}

/// Averages every pixel over the `kernel`x`kernel` window around it.
///
/// `kernel` must be odd; the caller validates that the image is large enough
/// with [`fits_kernel`].
pub(crate) fn box_mean<P>(image: &Image<P>, kernel: u32) -> Result<Image<P>, String>
where
    P: BoxFilterable,
{
    let (width, height) = image.dimensions();
    let mut buffer = vec![0.0_f32; image.as_raw().len()];

    let source = BlurImage::borrow(image.as_raw(), width, height, P::CHANNELS);
    let mut destination = BlurImageMut::borrow(&mut buffer, width, height, P::CHANNELS);
    box_blur_f32(
        &source,
        &mut destination,
        BoxBlurParameters::new(kernel),
        ThreadingPolicy::Single,
    )
    .map_err(|e| e.to_string())?;

    ImageBuffer::from_raw(width, height, buffer)
        .ok_or_else(|| "Failed to create box filtered image".to_owned())
}

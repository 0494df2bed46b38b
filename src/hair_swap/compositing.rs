use image::{GenericImageView, Luma, Pixel, Primitive, Rgb, Rgba};
use imageproc::{definitions::Image, map::map_colors2};
use itertools::Itertools;

use crate::{error::AlphaMaskError, utils::validate_matching_dimensions};

/// Trait for attaching a matte to an RGB photo.
///
/// The result carries the photo's colours and the matte as alpha. This
/// consumes the original image.
pub trait ApplyAlphaMaskExt {
    type Mask: GenericImageView<Pixel = Luma<Self::Subpixel>>;
    type Subpixel: Primitive;

    /// Builds an RGBA image whose alpha channel is `mask`.
    ///
    /// # Errors
    ///
    /// * `AlphaMaskError::DimensionMismatch` - When image and mask dimensions don't match
    fn apply_alpha_mask(
        self,
        mask: &Self::Mask,
    ) -> Result<Image<Rgba<Self::Subpixel>>, AlphaMaskError>
    where
        Rgba<Self::Subpixel>: Pixel<Subpixel = Self::Subpixel>;
}

impl<S> ApplyAlphaMaskExt for Image<Rgb<S>>
where
    Rgb<S>: Pixel<Subpixel = S>,
    S: Primitive,
{
    type Mask = Image<Luma<S>>;
    type Subpixel = S;

    fn apply_alpha_mask(
        self,
        mask: &Self::Mask,
    ) -> Result<Image<Rgba<Self::Subpixel>>, AlphaMaskError>
    where
        Rgba<Self::Subpixel>: Pixel<Subpixel = Self::Subpixel>,
    {
        validate_dimensions_impl(&self, mask)?;

        Ok(map_colors2(&self, mask, |Rgb([red, green, blue]), Luma([alpha])| {
            Rgba([red, green, blue, alpha])
        }))
    }
}

/// Trait for laying an RGBA layer over an opaque RGB image.
pub trait CompositeOverExt {
    /// Blends `layer` over the image: `out = layer·α + image·(1 - α)`.
    ///
    /// This consumes the original image.
    ///
    /// # Errors
    ///
    /// * `AlphaMaskError::DimensionMismatch` - When the layer size differs
    fn composite_over(self, layer: &Image<Rgba<u8>>) -> Result<Self, AlphaMaskError>
    where
        Self: Sized;

    /// Blends `layer` over the image in place.
    fn composite_over_mut(&mut self, layer: &Image<Rgba<u8>>)
    -> Result<&mut Self, AlphaMaskError>;
}

impl CompositeOverExt for Image<Rgb<u8>> {
    fn composite_over(mut self, layer: &Image<Rgba<u8>>) -> Result<Self, AlphaMaskError> {
        self.composite_over_mut(layer)?;
        Ok(self)
    }

    fn composite_over_mut(
        &mut self,
        layer: &Image<Rgba<u8>>,
    ) -> Result<&mut Self, AlphaMaskError> {
        validate_dimensions_impl(self, layer)?;

        self.pixels_mut()
            .zip_eq(layer.pixels())
            .for_each(|(base, &Rgba([red, green, blue, alpha]))| match alpha {
                0 => {}
                255 => *base = Rgb([red, green, blue]),
                _ => {
                    let a = u32::from(alpha);
                    let blend = |over: u8, under: u8| {
                        ((u32::from(over) * a + u32::from(under) * (255 - a) + 127) / 255) as u8
                    };
                    let Rgb([r, g, b]) = *base;
                    *base = Rgb([blend(red, r), blend(green, g), blend(blue, b)]);
                }
            });

        Ok(self)
    }
}

/// Checks that both images have the same size.
#[inline]
fn validate_dimensions_impl<I1, I2>(image: &I1, mask: &I2) -> Result<(), AlphaMaskError>
where
    I1: GenericImageView,
    I2: GenericImageView,
{
    let (img_w, img_h) = image.dimensions();
    let (mask_w, mask_h) = mask.dimensions();

    validate_matching_dimensions(img_w, img_h, mask_w, mask_h, "Compositing").map_err(|_| {
        AlphaMaskError::DimensionMismatch {
            expected: (img_w, img_h),
            actual: (mask_w, mask_h),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Success Cases ---

    #[test]
    fn apply_alpha_mask_keeps_colour_and_sets_alpha() {
        let mut image: Image<Rgb<u8>> = Image::new(2, 2);
        let mut mask: Image<Luma<u8>> = Image::new(2, 2);
        image.put_pixel(1, 0, Rgb([60, 40, 20]));
        mask.put_pixel(1, 0, Luma([128]));

        let result = image.apply_alpha_mask(&mask).unwrap();

        assert_eq!(result.get_pixel(1, 0), &Rgba([60, 40, 20, 128]));
        assert_eq!(result.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn composite_over_leaves_transparent_pixels_untouched() {
        let face: Image<Rgb<u8>> = Image::from_pixel(3, 3, Rgb([200, 150, 120]));
        let layer: Image<Rgba<u8>> = Image::from_pixel(3, 3, Rgba([10, 10, 10, 0]));

        let result = face.clone().composite_over(&layer).unwrap();

        assert_eq!(result, face);
    }

    #[test]
    fn composite_over_replaces_opaque_pixels() {
        let face: Image<Rgb<u8>> = Image::from_pixel(3, 3, Rgb([200, 150, 120]));
        let mut layer: Image<Rgba<u8>> = Image::new(3, 3);
        layer.put_pixel(1, 1, Rgba([30, 20, 10, 255]));

        let result = face.composite_over(&layer).unwrap();

        assert_eq!(result.get_pixel(1, 1), &Rgb([30, 20, 10]));
        assert_eq!(result.get_pixel(0, 0), &Rgb([200, 150, 120]));
    }

    #[test]
    fn composite_over_mut_blends_half_transparent_pixels() {
        let mut face: Image<Rgb<u8>> = Image::from_pixel(1, 1, Rgb([200, 100, 0]));
        let layer: Image<Rgba<u8>> = Image::from_pixel(1, 1, Rgba([0, 100, 200, 128]));

        face.composite_over_mut(&layer).unwrap();

        assert_eq!(face.get_pixel(0, 0), &Rgb([100, 100, 100]));
    }

    // --- Error Cases ---

    #[test]
    fn apply_alpha_mask_errs_on_mismatched_dimensions() {
        let image: Image<Rgb<u8>> = Image::new(10, 10);
        let mask: Image<Luma<u8>> = Image::new(5, 5);
        assert!(matches!(
            image.apply_alpha_mask(&mask),
            Err(AlphaMaskError::DimensionMismatch {
                expected: (10, 10),
                actual: (5, 5)
            })
        ));
    }

    #[test]
    fn composite_over_errs_on_mismatched_layer() {
        let face: Image<Rgb<u8>> = Image::new(4, 4);
        let layer: Image<Rgba<u8>> = Image::new(4, 3);
        assert!(face.composite_over(&layer).is_err());
    }
}

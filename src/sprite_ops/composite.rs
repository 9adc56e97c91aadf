use image::{GenericImageView, Luma, Pixel, Rgb, Rgba};
use imageproc::{definitions::Image, map::map_colors2};

use crate::error::CompositeError;
use crate::sprite_ops::mask::{Mask, KEEP};
use crate::utils::validate_matching_dimensions;

/// Fully transparent pixel written wherever the mask discards
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Trait cutting a sprite out of a candidate frame with a [`Mask`]
///
/// KEEP pixels copy the candidate (RGB candidates become opaque, RGBA
/// candidates keep their own alpha); DISCARD pixels become fully
/// transparent. The candidate is borrowed, so the same mask can be applied
/// repeatedly with identical results.
pub trait ApplySpriteMask {
    /// Composites `self` through `mask` onto a transparent canvas
    ///
    /// # Errors
    ///
    /// * `CompositeError::DimensionMismatch` - When image and mask dimensions don't match
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sprite_cutter::{ApplySpriteMask, Image, Mask};
    /// use image::Rgb;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let candidate: Image<Rgb<u8>> = Image::new(10, 10);
    /// let mask = Mask::from_fn(10, 10, |x, _| x < 5);
    ///
    /// let sprite = candidate.apply_sprite_mask(&mask)?;
    /// # Ok(())
    /// # }
    /// ```
    fn apply_sprite_mask(&self, mask: &Mask) -> Result<Image<Rgba<u8>>, CompositeError>;
}

impl ApplySpriteMask for Image<Rgb<u8>> {
    fn apply_sprite_mask(&self, mask: &Mask) -> Result<Image<Rgba<u8>>, CompositeError> {
        composite(self, mask)
    }
}

impl ApplySpriteMask for Image<Rgba<u8>> {
    fn apply_sprite_mask(&self, mask: &Mask) -> Result<Image<Rgba<u8>>, CompositeError> {
        composite(self, mask)
    }
}

/// Composites `candidate` through `mask` onto a transparent canvas
pub fn composite<P>(candidate: &Image<P>, mask: &Mask) -> Result<Image<Rgba<u8>>, CompositeError>
where
    P: Pixel<Subpixel = u8>,
{
    validate_dimensions(candidate, mask)?;

    let sprite = map_colors2(candidate, mask.as_luma(), |pixel, Luma([value])| {
        if value == KEEP {
            pixel.to_rgba()
        } else {
            TRANSPARENT
        }
    });

    Ok(sprite)
}

#[inline]
fn validate_dimensions<I>(candidate: &I, mask: &Mask) -> Result<(), CompositeError>
where
    I: GenericImageView,
{
    let (img_w, img_h) = candidate.dimensions();
    let (mask_w, mask_h) = mask.dimensions();

    validate_matching_dimensions(img_w, img_h, mask_w, mask_h, "ApplySpriteMask").map_err(|_| {
        CompositeError::DimensionMismatch {
            expected: (img_w, img_h),
            actual: (mask_w, mask_h),
        }
    })
}

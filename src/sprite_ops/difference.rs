use image::{Pixel, Rgb, Rgba};
use imageproc::definitions::Image;
use imageproc::map::map_colors2;

use crate::error::DifferenceError;
use crate::sprite_ops::gaussian::{validate_sigma, GaussianBlur};
use crate::sprite_ops::mask::{validate_threshold, Mask};
use crate::utils::validate_matching_dimensions;

/// Pixel types that can be differenced into an RGBA difference pixel
///
/// RGB pixels are treated as fully opaque, so their difference alpha is the
/// maximum value rather than zero.
pub trait DifferencePixel: Pixel<Subpixel = u8> {
    /// Per-channel absolute difference of `self` and `other`
    fn abs_difference(self, other: Self) -> Rgba<u8>;
}

impl DifferencePixel for Rgb<u8> {
    #[inline]
    fn abs_difference(self, other: Self) -> Rgba<u8> {
        let Rgb([r0, g0, b0]) = self;
        let Rgb([r1, g1, b1]) = other;
        Rgba([r0.abs_diff(r1), g0.abs_diff(g1), b0.abs_diff(b1), u8::MAX])
    }
}

impl DifferencePixel for Rgba<u8> {
    #[inline]
    fn abs_difference(self, other: Self) -> Rgba<u8> {
        let Rgba([r0, g0, b0, a0]) = self;
        let Rgba([r1, g1, b1, a1]) = other;
        Rgba([
            r0.abs_diff(r1),
            g0.abs_diff(g1),
            b0.abs_diff(b1),
            a0.abs_diff(a1),
        ])
    }
}

/// Trait comparing a background against candidate frames
///
/// Implemented for the background image; the candidate is passed in.
pub trait FrameDifference {
    /// Computes the blurred per-channel difference map
    ///
    /// # Arguments
    ///
    /// * `candidate` - Frame to compare with `self`
    /// * `blur_radius` - Gaussian standard deviation; `0` skips blurring
    ///
    /// # Errors
    ///
    /// * `DifferenceError::DimensionMismatch` - When the images differ in size
    /// * `DifferenceError::InvalidParameter` - When `blur_radius` is negative or not finite
    fn difference_map(
        &self,
        candidate: &Self,
        blur_radius: f32,
    ) -> Result<Image<Rgba<u8>>, DifferenceError>;

    /// Computes the KEEP/DISCARD mask of `candidate` against `self`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sprite_cutter::{FrameDifference, Image};
    /// use image::Rgb;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let background: Image<Rgb<u8>> = Image::new(64, 64);
    /// let candidate: Image<Rgb<u8>> = Image::new(64, 64);
    ///
    /// let mask = background.compute_mask(&candidate, 1.5, 1.0)?;
    /// assert_eq!(mask.keep_count(), 0);
    /// # Ok(())
    /// # }
    /// ```
    fn compute_mask(
        &self,
        candidate: &Self,
        blur_radius: f32,
        noise_threshold: f32,
    ) -> Result<Mask, DifferenceError>;
}

impl<P> FrameDifference for Image<P>
where
    P: DifferencePixel,
{
    fn difference_map(
        &self,
        candidate: &Self,
        blur_radius: f32,
    ) -> Result<Image<Rgba<u8>>, DifferenceError> {
        difference_map(self, candidate, blur_radius)
    }

    fn compute_mask(
        &self,
        candidate: &Self,
        blur_radius: f32,
        noise_threshold: f32,
    ) -> Result<Mask, DifferenceError> {
        compute_mask(self, candidate, blur_radius, noise_threshold)
    }
}

/// Computes the blurred absolute difference of `candidate` against `background`
pub fn difference_map<P>(
    background: &Image<P>,
    candidate: &Image<P>,
    blur_radius: f32,
) -> Result<Image<Rgba<u8>>, DifferenceError>
where
    P: DifferencePixel,
{
    validate_sigma(blur_radius)?;
    validate_dimensions(background, candidate)?;

    let mut difference = map_colors2(background, candidate, |bg, fg| bg.abs_difference(fg));
    difference.gaussian_blur_mut(blur_radius)?;

    Ok(difference)
}

/// Computes the KEEP/DISCARD mask of `candidate` against `background`
///
/// The mask depends only on the two images, the blur radius and the noise
/// threshold. Parameters are validated before any pixel work starts.
pub fn compute_mask<P>(
    background: &Image<P>,
    candidate: &Image<P>,
    blur_radius: f32,
    noise_threshold: f32,
) -> Result<Mask, DifferenceError>
where
    P: DifferencePixel,
{
    validate_threshold(noise_threshold)?;

    let difference = difference_map(background, candidate, blur_radius)?;
    Mask::from_difference(&difference, noise_threshold)
}

#[inline]
fn validate_dimensions<P: Pixel>(
    background: &Image<P>,
    candidate: &Image<P>,
) -> Result<(), DifferenceError> {
    let (bg_w, bg_h) = background.dimensions();
    let (fg_w, fg_h) = candidate.dimensions();

    validate_matching_dimensions(bg_w, bg_h, fg_w, fg_h, "FrameDifference").map_err(|_| {
        DifferenceError::DimensionMismatch {
            expected: (bg_w, bg_h),
            actual: (fg_w, fg_h),
        }
    })
}

use image::{Luma, Rgba};
use imageproc::definitions::Image;
use imageproc::map::map_colors;

use crate::error::DifferenceError;

/// Stored value of a KEEP pixel
pub const KEEP: u8 = 255;
/// Stored value of a DISCARD pixel
pub const DISCARD: u8 = 0;

/// Preview colour of a KEEP pixel
pub const KEEP_PREVIEW: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Preview colour of a DISCARD pixel
pub const DISCARD_PREVIEW: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Binary KEEP/DISCARD classification of every pixel of a candidate
///
/// Internally a grayscale image holding [`KEEP`] or [`DISCARD`], which makes
/// it directly usable wherever a `Luma` alpha mask is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    inner: Image<Luma<u8>>,
}

impl Mask {
    /// Classifies a (blurred) difference map against a noise threshold
    ///
    /// A pixel is DISCARD when the sum of its R, G and B difference
    /// magnitudes is `<= noise_threshold`, KEEP otherwise. The alpha
    /// channel never takes part in the decision.
    ///
    /// # Errors
    ///
    /// * `DifferenceError::InvalidParameter` - When the threshold is negative or not finite
    pub fn from_difference(
        difference: &Image<Rgba<u8>>,
        noise_threshold: f32,
    ) -> Result<Self, DifferenceError> {
        validate_threshold(noise_threshold)?;

        let inner = map_colors(difference, |Rgba([red, green, blue, _])| {
            let sum = u32::from(red) + u32::from(green) + u32::from(blue);
            if sum as f32 <= noise_threshold {
                Luma([DISCARD])
            } else {
                Luma([KEEP])
            }
        });

        Ok(Self { inner })
    }

    /// Builds a mask by evaluating `keep` at every coordinate
    pub fn from_fn(width: u32, height: u32, keep: impl Fn(u32, u32) -> bool) -> Self {
        let inner = Image::from_fn(width, height, |x, y| {
            Luma([if keep(x, y) { KEEP } else { DISCARD }])
        });
        Self { inner }
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// Returns `true` when the pixel at `(x, y)` is kept
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn is_keep(&self, x: u32, y: u32) -> bool {
        self.inner.get_pixel(x, y)[0] == KEEP
    }

    /// Number of KEEP pixels
    pub fn keep_count(&self) -> usize {
        self.inner.as_raw().iter().filter(|&&v| v == KEEP).count()
    }

    /// Number of DISCARD pixels
    pub fn discard_count(&self) -> usize {
        self.inner.as_raw().len() - self.keep_count()
    }

    /// Borrows the mask as a grayscale alpha mask (255 = KEEP, 0 = DISCARD)
    pub fn as_luma(&self) -> &Image<Luma<u8>> {
        &self.inner
    }

    pub fn into_luma(self) -> Image<Luma<u8>> {
        self.inner
    }

    /// Renders the mask for visual inspection
    ///
    /// KEEP pixels become opaque red and DISCARD pixels fully transparent.
    pub fn to_preview(&self) -> Image<Rgba<u8>> {
        map_colors(&self.inner, |Luma([value])| {
            if value == KEEP {
                KEEP_PREVIEW
            } else {
                DISCARD_PREVIEW
            }
        })
    }
}

#[inline]
pub(crate) fn validate_threshold(noise_threshold: f32) -> Result<(), DifferenceError> {
    if !noise_threshold.is_finite() || noise_threshold < 0.0 {
        return Err(DifferenceError::InvalidParameter(format!(
            "noise threshold must be a finite value >= 0, got {noise_threshold}"
        )));
    }
    Ok(())
}

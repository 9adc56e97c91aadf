//! Separable Gaussian smoothing for 8-bit RGBA difference maps.
//!
//! The blur runs in `f32` over two 1-D passes (rows, then columns) and the
//! result is re-quantised to 8 bits with round-to-nearest, the same shape an
//! 8-bit RGBA image has after a Gaussian filter. Every channel, alpha
//! included, is filtered independently.
//!
//! Borders are handled by extending the edge pixels outward. The kernel is
//! truncated at `ceil(3σ)` pixels on each side, but never reaches further
//! than the longer image side, and is normalised so that a constant region
//! keeps its value.

use image::Rgba;
use imageproc::definitions::Image;
use rayon::prelude::*;

use crate::error::DifferenceError;

const CHANNELS: usize = 4;

/// Trait providing Gaussian smoothing of RGBA difference maps
///
/// A `sigma` of zero is a defined no-op: the image is returned unchanged.
pub trait GaussianBlur {
    /// Returns a blurred copy of the image
    ///
    /// # Arguments
    ///
    /// * `sigma` - Standard deviation of the Gaussian in pixels (`>= 0`)
    ///
    /// # Errors
    ///
    /// * `DifferenceError::InvalidParameter` - When `sigma` is negative or not finite
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sprite_cutter::{GaussianBlur, Image};
    /// use image::Rgba;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let diff: Image<Rgba<u8>> = Image::new(16, 16);
    /// let smoothed = diff.gaussian_blur(1.5)?;
    /// # Ok(())
    /// # }
    /// ```
    fn gaussian_blur(&self, sigma: f32) -> Result<Self, DifferenceError>
    where
        Self: Sized;

    /// Blurs the image in-place
    fn gaussian_blur_mut(&mut self, sigma: f32) -> Result<&mut Self, DifferenceError>;
}

impl GaussianBlur for Image<Rgba<u8>> {
    fn gaussian_blur(&self, sigma: f32) -> Result<Self, DifferenceError> {
        let mut output = self.clone();
        output.gaussian_blur_mut(sigma)?;
        Ok(output)
    }

    fn gaussian_blur_mut(&mut self, sigma: f32) -> Result<&mut Self, DifferenceError> {
        validate_sigma(sigma)?;

        let (width, height) = (self.width() as usize, self.height() as usize);
        if sigma == 0.0 || width == 0 || height == 0 {
            return Ok(self);
        }

        buffer_len(width, height)?;
        let kernel = gaussian_kernel(sigma, width.max(height));
        let source: Vec<f32> = self.as_raw().iter().copied().map(f32::from).collect();
        let horizontal = convolve_rows(&source, width, &kernel);
        let blurred = convolve_columns(&horizontal, width, height, &kernel);

        let raw: &mut [u8] = self.as_mut();
        raw.iter_mut()
            .zip(blurred)
            .for_each(|(dst, value)| *dst = quantize(value));

        Ok(self)
    }
}

#[inline]
pub(crate) fn validate_sigma(sigma: f32) -> Result<(), DifferenceError> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(DifferenceError::InvalidParameter(format!(
            "blur radius must be a finite value >= 0, got {sigma}"
        )));
    }
    Ok(())
}

fn buffer_len(width: usize, height: usize) -> Result<usize, DifferenceError> {
    width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(CHANNELS))
        .ok_or_else(|| {
            let reason = format!("{width}x{height} image is too large to blur");
            DifferenceError::InvalidParameter(reason)
        })
}

/// Builds a normalised 1-D Gaussian kernel of length `2 * half + 1`
///
/// `half` is `ceil(3σ)`, at least 1 and at most `max_half`; taps beyond the
/// image only repeat the clamped edge pixel. A σ so small that every
/// off-centre weight vanishes yields the identity kernel.
pub(crate) fn gaussian_kernel(sigma: f32, max_half: usize) -> Vec<f32> {
    let sigma = f64::from(sigma);
    // `as` saturates, so a huge σ cannot overflow before the clamp
    let half = ((3.0 * sigma).ceil() as usize).clamp(1, max_half.max(1));
    let denominator = 2.0 * sigma * sigma;
    if !denominator.is_normal() {
        return identity_kernel(half);
    }

    let weights: Vec<f64> = (0..=2 * half)
        .map(|i| {
            let distance = i as f64 - half as f64;
            (-(distance * distance) / denominator).exp()
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return identity_kernel(half);
    }
    weights.iter().map(|weight| (weight / total) as f32).collect()
}

fn identity_kernel(half: usize) -> Vec<f32> {
    let mut kernel = vec![0.0f32; 2 * half + 1];
    kernel[half] = 1.0;
    kernel
}

fn convolve_rows(source: &[f32], width: usize, kernel: &[f32]) -> Vec<f32> {
    let half = kernel.len() / 2;
    let stride = width * CHANNELS;
    let mut output = vec![0.0f32; source.len()];

    output
        .par_chunks_mut(stride)
        .zip(source.par_chunks(stride))
        .for_each(|(dst_row, src_row)| {
            for x in 0..width {
                let mut acc = [0.0f32; CHANNELS];
                for (k, &weight) in kernel.iter().enumerate() {
                    let sx = (x + k).saturating_sub(half).min(width - 1);
                    let pixel = &src_row[sx * CHANNELS..(sx + 1) * CHANNELS];
                    acc.iter_mut()
                        .zip(pixel)
                        .for_each(|(a, &p)| *a = weight.mul_add(p, *a));
                }
                dst_row[x * CHANNELS..(x + 1) * CHANNELS].copy_from_slice(&acc);
            }
        });

    output
}

fn convolve_columns(source: &[f32], width: usize, height: usize, kernel: &[f32]) -> Vec<f32> {
    let half = kernel.len() / 2;
    let stride = width * CHANNELS;
    let mut output = vec![0.0f32; source.len()];

    output
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, dst_row)| {
            for (k, &weight) in kernel.iter().enumerate() {
                let sy = (y + k).saturating_sub(half).min(height - 1);
                let src_row = &source[sy * stride..(sy + 1) * stride];
                dst_row
                    .iter_mut()
                    .zip(src_row)
                    .for_each(|(d, &s)| *d = weight.mul_add(s, *d));
            }
        });

    output
}

#[inline]
fn quantize(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        for sigma in [0.3f32, 1.0, 1.5, 7.0] {
            let kernel = gaussian_kernel(sigma, 64);
            let total: f32 = kernel.iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "sigma {sigma}: sum {total}");
            assert_eq!(kernel.len() % 2, 1);
            let n = kernel.len();
            for i in 0..n / 2 {
                assert!((kernel[i] - kernel[n - 1 - i]).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn gaussian_kernel_spans_three_sigma() {
        assert_eq!(gaussian_kernel(1.5, 64).len(), 2 * 5 + 1);
        assert_eq!(gaussian_kernel(0.1, 64).len(), 3);
    }

    #[test]
    fn gaussian_kernel_is_capped_by_the_image_side() {
        assert_eq!(gaussian_kernel(7.0, 4).len(), 2 * 4 + 1);
        for sigma in [1e9f32, 1e19, f32::MAX] {
            let kernel = gaussian_kernel(sigma, 3);
            assert_eq!(kernel.len(), 7);
            let total: f32 = kernel.iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "sigma {sigma}: sum {total}");
        }
    }

    #[test]
    fn vanishing_sigma_gives_the_identity_kernel() {
        for sigma in [1e-23f32, 1e-30, f32::MIN_POSITIVE] {
            let kernel = gaussian_kernel(sigma, 8);
            assert!(kernel.iter().all(|w| w.is_finite()));
            assert_eq!(kernel[kernel.len() / 2], 1.0);
            assert_eq!(kernel.iter().filter(|&&w| w != 0.0).count(), 1);
        }
    }

    #[test]
    fn huge_sigma_blurs_towards_the_mean() {
        let mut image: Image<Rgba<u8>> = Image::new(3, 3);
        image.put_pixel(1, 1, Rgba([196, 0, 0, 0]));

        for sigma in [1e9f32, 1e19] {
            let result = image.gaussian_blur(sigma).unwrap();
            // Every clamped 7-tap window sees the spike once per axis
            assert!(result.pixels().all(|p| p[0] == 4), "sigma {sigma}");
        }
    }

    #[test]
    fn tiny_sigma_matches_no_blur() {
        let mut image: Image<Rgba<u8>> = Image::new(3, 3);
        image.put_pixel(1, 1, Rgba([200, 200, 200, 255]));

        let result = image.gaussian_blur(1e-30).unwrap();
        assert_eq!(result, image);
    }

    #[test]
    fn zero_sigma_leaves_image_untouched() {
        let mut image: Image<Rgba<u8>> = Image::new(3, 3);
        image.put_pixel(1, 1, Rgba([90, 30, 10, 255]));

        let result = image.gaussian_blur(0.0).unwrap();
        assert_eq!(result, image);
    }

    #[test]
    fn constant_image_stays_constant() {
        let image: Image<Rgba<u8>> = Image::from_pixel(7, 5, Rgba([12, 200, 3, 255]));
        let result = image.gaussian_blur(2.0).unwrap();
        assert!(result.pixels().all(|p| *p == Rgba([12, 200, 3, 255])));
    }

    #[test]
    fn blur_spreads_a_single_spike() {
        let mut image: Image<Rgba<u8>> = Image::new(9, 9);
        image.put_pixel(4, 4, Rgba([255, 255, 255, 255]));

        let result = image.gaussian_blur(1.0).unwrap();
        let center = result.get_pixel(4, 4)[0];
        let neighbour = result.get_pixel(5, 4)[0];

        assert!(center < 255);
        assert!(neighbour > 0);
        assert!(center > neighbour);
        // Channels are filtered independently with the same kernel
        assert_eq!(result.get_pixel(5, 4)[3], neighbour);
    }

    #[test]
    fn negative_or_nan_sigma_is_rejected() {
        let image: Image<Rgba<u8>> = Image::new(2, 2);
        assert!(matches!(
            image.gaussian_blur(-1.0),
            Err(DifferenceError::InvalidParameter(_))
        ));
        assert!(image.gaussian_blur(f32::NAN).is_err());
        assert!(image.gaussian_blur(f32::INFINITY).is_err());
    }

    #[test]
    fn empty_image_is_accepted() {
        let image: Image<Rgba<u8>> = Image::new(0, 0);
        let result = image.gaussian_blur(1.5).unwrap();
        assert_eq!(result.dimensions(), (0, 0));
    }

    #[test]
    fn quantize_rounds_to_nearest_and_clamps() {
        assert_eq!(quantize(0.49), 0);
        assert_eq!(quantize(0.5), 1);
        assert_eq!(quantize(254.7), 255);
        assert_eq!(quantize(300.0), 255);
        assert_eq!(quantize(-3.0), 0);
    }
}

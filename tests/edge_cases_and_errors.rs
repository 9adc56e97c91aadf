//! Edge case and error condition tests
//!
//! Boundary values of the noise threshold and blur radius, mismatched
//! frames, and encoder settings outside their accepted range.

use image::{Rgb, Rgba};
use sprite_cutter::{
    composite, compute_mask, difference_map, encode, ApplySpriteMask, CompositeError,
    DifferenceError, EncodeError, EncodingSettings, FrameDifference, Image, Mask, OutputFormat,
    DISCARD_PREVIEW, KEEP_PREVIEW, TRANSPARENT,
};

/// Helper to create a 2x2 black background
fn create_black_background() -> Image<Rgb<u8>> {
    Image::from_pixel(2, 2, Rgb([0, 0, 0]))
}

/// Helper to create a 2x2 candidate with one changed pixel at (1, 0)
fn create_single_change_candidate() -> Image<Rgb<u8>> {
    let mut image = create_black_background();
    image.put_pixel(1, 0, Rgb([10, 10, 10]));
    image
}

#[test]
fn test_single_pixel_change_without_blur() {
    let background = create_black_background();
    let candidate = create_single_change_candidate();

    let mask = compute_mask(&background, &candidate, 0.0, 5.0).unwrap();
    assert!(mask.is_keep(1, 0));
    assert_eq!(mask.keep_count(), 1);

    let sprite = candidate.apply_sprite_mask(&mask).unwrap();
    assert_eq!(sprite.get_pixel(1, 0), &Rgba([10, 10, 10, 255]));
    assert_eq!(sprite.get_pixel(0, 0), &TRANSPARENT);
    assert_eq!(sprite.get_pixel(0, 1), &TRANSPARENT);
    assert_eq!(sprite.get_pixel(1, 1), &TRANSPARENT);
}

#[test]
fn test_threshold_tie_is_discarded() {
    let background = create_black_background();
    let candidate = create_single_change_candidate();

    // Difference sum at (1, 0) is exactly 30
    let at_tie = compute_mask(&background, &candidate, 0.0, 30.0).unwrap();
    assert_eq!(at_tie.keep_count(), 0);

    let below_tie = compute_mask(&background, &candidate, 0.0, 29.99).unwrap();
    assert_eq!(below_tie.keep_count(), 1);
}

#[test]
fn test_zero_threshold_keeps_any_change() {
    let background = create_black_background();
    let mut candidate = create_black_background();
    candidate.put_pixel(0, 1, Rgb([0, 0, 1]));

    let mask = compute_mask(&background, &candidate, 0.0, 0.0).unwrap();
    assert!(mask.is_keep(0, 1));
    assert_eq!(mask.keep_count(), 1);
}

#[test]
fn test_alpha_only_change_is_ignored() {
    let background: Image<Rgba<u8>> = Image::from_pixel(3, 3, Rgba([40, 40, 40, 255]));
    let mut candidate = background.clone();
    candidate.put_pixel(1, 1, Rgba([40, 40, 40, 0]));

    let difference = difference_map(&background, &candidate, 0.0).unwrap();
    assert_eq!(difference.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));

    let mask = compute_mask(&background, &candidate, 0.0, 0.0).unwrap();
    assert_eq!(mask.keep_count(), 0);
}

#[test]
fn test_blur_spreads_a_strong_change_to_neighbours() {
    let background: Image<Rgb<u8>> = Image::from_pixel(9, 9, Rgb([0, 0, 0]));
    let mut candidate = background.clone();
    candidate.put_pixel(4, 4, Rgb([255, 255, 255]));

    let sharp = background.compute_mask(&candidate, 0.0, 1.0).unwrap();
    let soft = background.compute_mask(&candidate, 1.5, 1.0).unwrap();

    assert_eq!(sharp.keep_count(), 1);
    assert!(soft.keep_count() > 1);
    assert!(soft.is_keep(4, 4));
    assert!(soft.is_keep(3, 4));
    assert!(!soft.is_keep(0, 0));
}

#[test]
fn test_blur_can_erase_isolated_noise() {
    let background: Image<Rgb<u8>> = Image::from_pixel(9, 9, Rgb([0, 0, 0]));
    let mut candidate = background.clone();
    candidate.put_pixel(4, 4, Rgb([3, 0, 0]));

    let sharp = compute_mask(&background, &candidate, 0.0, 1.0).unwrap();
    let soft = compute_mask(&background, &candidate, 3.0, 1.0).unwrap();

    assert_eq!(sharp.keep_count(), 1);
    assert_eq!(soft.keep_count(), 0);
}

#[test]
fn test_huge_blur_radius_is_accepted() {
    let background: Image<Rgb<u8>> = Image::from_pixel(3, 3, Rgb([0, 0, 0]));
    let mut candidate = background.clone();
    candidate.put_pixel(1, 1, Rgb([200, 200, 200]));

    for radius in [1e9f32, 1e19] {
        let mask = compute_mask(&background, &candidate, radius, 1.0).unwrap();
        assert_eq!(mask.dimensions(), (3, 3));
        // The change is spread evenly over the whole frame
        assert_eq!(mask.keep_count(), 9, "radius {radius}");
    }
}

#[test]
fn test_vanishing_blur_radius_matches_no_blur() {
    let background: Image<Rgb<u8>> = Image::from_pixel(3, 3, Rgb([0, 0, 0]));
    let mut candidate = background.clone();
    candidate.put_pixel(1, 1, Rgb([200, 200, 200]));

    let sharp = compute_mask(&background, &candidate, 0.0, 1.0).unwrap();
    for radius in [1e-23f32, 1e-30] {
        let tiny = compute_mask(&background, &candidate, radius, 1.0).unwrap();
        assert_eq!(tiny, sharp, "radius {radius}");
    }
    assert_eq!(sharp.keep_count(), 1);
}

#[test]
fn test_one_by_one_frames() {
    let background: Image<Rgb<u8>> = Image::from_pixel(1, 1, Rgb([10, 20, 30]));
    let candidate: Image<Rgb<u8>> = Image::from_pixel(1, 1, Rgb([200, 20, 30]));

    let mask = compute_mask(&background, &candidate, 1.5, 1.0).unwrap();
    assert_eq!(mask.dimensions(), (1, 1));
    assert!(mask.is_keep(0, 0));
}

#[test]
fn test_dimension_mismatch_is_reported() {
    let background: Image<Rgb<u8>> = Image::new(4, 4);
    let candidate: Image<Rgb<u8>> = Image::new(4, 5);

    let result = compute_mask(&background, &candidate, 1.5, 1.0);
    assert_eq!(
        result,
        Err(DifferenceError::DimensionMismatch {
            expected: (4, 4),
            actual: (4, 5),
        })
    );

    let result = difference_map(&background, &candidate, 0.0);
    assert!(matches!(result, Err(DifferenceError::DimensionMismatch { .. })));
}

#[test]
fn test_invalid_mask_parameters() {
    let background: Image<Rgb<u8>> = Image::new(2, 2);
    let candidate = background.clone();

    for radius in [-0.5f32, f32::NAN, f32::INFINITY] {
        let result = compute_mask(&background, &candidate, radius, 1.0);
        assert!(
            matches!(result, Err(DifferenceError::InvalidParameter(_))),
            "radius {radius} accepted"
        );
    }

    for threshold in [-1.0f32, f32::NAN] {
        let result = compute_mask(&background, &candidate, 1.5, threshold);
        assert!(
            matches!(result, Err(DifferenceError::InvalidParameter(_))),
            "threshold {threshold} accepted"
        );
    }
}

#[test]
fn test_composite_dimension_mismatch() {
    let candidate: Image<Rgba<u8>> = Image::new(3, 3);
    let mask = Mask::from_fn(3, 2, |_, _| true);

    let result = composite(&candidate, &mask);
    assert_eq!(
        result,
        Err(CompositeError::DimensionMismatch {
            expected: (3, 3),
            actual: (3, 2),
        })
    );
}

#[test]
fn test_composite_keeps_translucent_candidate_alpha() {
    let candidate: Image<Rgba<u8>> = Image::from_pixel(2, 1, Rgba([9, 8, 7, 100]));
    let mask = Mask::from_fn(2, 1, |x, _| x == 0);

    let sprite = candidate.apply_sprite_mask(&mask).unwrap();
    assert_eq!(sprite.get_pixel(0, 0), &Rgba([9, 8, 7, 100]));
    assert_eq!(sprite.get_pixel(1, 0), &TRANSPARENT);
}

#[test]
fn test_mask_preview_colours() {
    let mask = Mask::from_fn(2, 1, |x, _| x == 1);
    let preview = mask.to_preview();

    assert_eq!(preview.get_pixel(0, 0), &DISCARD_PREVIEW);
    assert_eq!(preview.get_pixel(1, 0), &KEEP_PREVIEW);
}

#[test]
fn test_encode_rejects_out_of_range_settings() {
    let sprite: Image<Rgba<u8>> = Image::new(2, 2);

    let mut settings = EncodingSettings::default();
    settings.png.compress_level = 10;
    let result = encode(&sprite, &settings, OutputFormat::Png);
    assert!(matches!(
        result,
        Err(EncodeError::InvalidSetting { key: "compress_level", value: 10, .. })
    ));

    let mut settings = EncodingSettings::default();
    settings.webp.method = 7;
    let result = encode(&sprite, &settings, OutputFormat::WebP);
    assert!(matches!(
        result,
        Err(EncodeError::InvalidSetting { key: "method", .. })
    ));

    let mut settings = EncodingSettings::default();
    settings.webp.quality = 101;
    let result = encode(&sprite, &settings, OutputFormat::WebP);
    assert!(matches!(
        result,
        Err(EncodeError::InvalidSetting { key: "quality", .. })
    ));
}

#[test]
fn test_encode_boundary_settings_are_accepted() {
    let sprite: Image<Rgba<u8>> = Image::from_pixel(3, 3, Rgba([1, 2, 3, 4]));

    let mut settings = EncodingSettings::default();
    settings.png.compress_level = 0;
    assert!(encode(&sprite, &settings, OutputFormat::Png).is_ok());
    settings.png.compress_level = 9;
    assert!(encode(&sprite, &settings, OutputFormat::Png).is_ok());

    settings.webp.quality = 0;
    settings.webp.method = 0;
    assert!(encode(&sprite, &settings, OutputFormat::WebP).is_ok());
}

#[test]
fn test_unknown_output_extension() {
    assert_eq!(OutputFormat::from_extension("not-an-image"), None);
    assert_eq!(OutputFormat::from_extension(".png"), Some(OutputFormat::Png));
    assert_eq!(OutputFormat::from_extension("WEBP"), Some(OutputFormat::WebP));
}

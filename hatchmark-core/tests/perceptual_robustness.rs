//! Robustness of the perceptual code under common transformations.
//!
//! Lossy re-encoding and moderate resizing must keep a code within the
//! similarity threshold of the original, while genuinely different content
//! must land far away. High-contrast structure is what the code keys on, so
//! the fixtures avoid flat near-mean regions.

use std::io::Cursor;

use image::{DynamicImage, Rgb, RgbImage};

use hatchmark_core::{MatchPolicy, PerceptualCode};

/// Alternating dark/bright vertical bands with a mild horizontal gradient.
/// Every downsampled cell lands well away from the mean.
fn banded_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let band = (x * 8 / width) % 2;
        let base: i32 = if band == 0 { 45 } else { 210 };
        let drift = (y * 20 / height) as i32 - 10;
        let v = (base + drift).clamp(0, 255) as u8;
        Rgb([v, v, v])
    }))
}

/// Brightness ramp from dark left to bright right.
fn ramp_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
        let v = if x < width / 2 { 35 } else { 220 };
        Rgb([v, v, v])
    }))
}

fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("PNG encoding failed");
    buffer.into_inner()
}

fn jpeg_bytes(image: &DynamicImage, quality: u8) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .expect("JPEG encoding failed");
    buffer.into_inner()
}

#[test]
fn jpeg_reencode_stays_within_threshold() {
    let image = banded_image(256, 256);
    let original = PerceptualCode::from_bytes(&png_bytes(&image)).unwrap();

    for quality in [90, 70, 50] {
        let reencoded = PerceptualCode::from_bytes(&jpeg_bytes(&image, quality)).unwrap();
        let distance = original.hamming_distance(reencoded);
        assert!(
            distance <= MatchPolicy::DEFAULT_MAX_DISTANCE,
            "JPEG q{quality} drifted {distance} bits"
        );
    }
}

#[test]
fn downscaled_copy_stays_within_threshold() {
    let image = banded_image(256, 256);
    let original = PerceptualCode::from_bytes(&png_bytes(&image)).unwrap();

    let halved = image.resize_exact(128, 128, image::imageops::FilterType::Lanczos3);
    let resized = PerceptualCode::from_bytes(&png_bytes(&halved)).unwrap();

    let distance = original.hamming_distance(resized);
    assert!(
        distance <= MatchPolicy::DEFAULT_MAX_DISTANCE,
        "50% resize drifted {distance} bits"
    );
}

#[test]
fn code_is_stable_across_decodes() {
    let bytes = jpeg_bytes(&banded_image(256, 256), 80);
    let first = PerceptualCode::from_bytes(&bytes).unwrap();
    let second = PerceptualCode::from_bytes(&bytes).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.hamming_distance(second), 0);
}

#[test]
fn rotated_content_lands_far_away() {
    let image = ramp_image(256, 256);
    let original = PerceptualCode::from_bytes(&png_bytes(&image)).unwrap();
    let rotated = PerceptualCode::from_bytes(&png_bytes(&image.rotate180())).unwrap();

    let distance = original.hamming_distance(rotated);
    assert!(
        distance > MatchPolicy::DEFAULT_MAX_DISTANCE,
        "mirrored ramp should not pass as similar (distance {distance})"
    );
}

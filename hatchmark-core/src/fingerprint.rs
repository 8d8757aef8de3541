//! Content fingerprinting.
//!
//! Every submission carries two independent fingerprints:
//!
//! - [`ContentDigest`]: SHA3-256 over the raw byte stream. Any change to the
//!   bytes changes the digest.
//! - [`PerceptualCode`]: a 64-bit average hash over the decoded image.
//!   Lossy re-encoding or minor resizing flips only a few bits, so visually
//!   similar content stays close in Hamming distance.
//!
//! Both are pure functions of the input bytes and deterministic across runs.

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::error::{HatchmarkError, Result};

/// Side length of the downsampled grid the perceptual code is derived from.
const PERCEPTUAL_GRID: u32 = 8;

/// Fixed RGB -> luma weights (ITU-R BT.709).
const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// SHA3-256 digest of a raw byte stream.
///
/// Two files with equal digests are treated as byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Compute the digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }

    /// Hex-encode the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a digest from its hex encoding.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| HatchmarkError::Serialization(format!("invalid digest hex: {e}")))?;
        let digest: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            HatchmarkError::Serialization(format!("expected 32 digest bytes, got {}", v.len()))
        })?;
        Ok(Self(digest))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 64-bit perceptual code (average hash).
///
/// The fixed width makes Hamming distance total: there is no length mismatch
/// to fail on. Collisions between unrelated images are expected and fine;
/// the code is a similarity metric, not an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualCode(pub u64);

impl PerceptualCode {
    /// Width of the code in bits.
    pub const BITS: u32 = PERCEPTUAL_GRID * PERCEPTUAL_GRID;

    /// Decode `data` as an image and compute its perceptual code.
    ///
    /// Returns [`HatchmarkError::UnsupportedContent`] when the bytes are not
    /// a decodable image. Supports JPEG, PNG, GIF and WebP.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data).map_err(|e| {
            HatchmarkError::UnsupportedContent(format!("failed to decode image: {e}"))
        })?;
        Ok(Self::from_image(&image))
    }

    /// Average hash of an already-decoded image.
    ///
    /// Downsamples to an 8x8 grid with a triangle filter, converts each
    /// sample to luma, and emits one bit per sample: `1` where the sample is
    /// at or above the grid mean, row-major, first sample in the most
    /// significant bit.
    pub fn from_image(image: &DynamicImage) -> Self {
        let grid = image
            .resize_exact(PERCEPTUAL_GRID, PERCEPTUAL_GRID, FilterType::Triangle)
            .to_rgb8();

        let luma: Vec<f32> = grid
            .pixels()
            .map(|p| {
                LUMA_WEIGHTS[0] * p.0[0] as f32
                    + LUMA_WEIGHTS[1] * p.0[1] as f32
                    + LUMA_WEIGHTS[2] * p.0[2] as f32
            })
            .collect();
        let mean = luma.iter().sum::<f32>() / luma.len() as f32;

        let mut code = 0u64;
        for (i, &sample) in luma.iter().enumerate() {
            if sample >= mean {
                code |= 1 << (Self::BITS as usize - 1 - i);
            }
        }
        Self(code)
    }

    /// Number of differing bits between two codes.
    pub fn hamming_distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Hex-encode the code (16 characters, zero-padded).
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse a code from its hex encoding.
    pub fn from_hex(s: &str) -> Result<Self> {
        let code = u64::from_str_radix(s, 16)
            .map_err(|e| HatchmarkError::Serialization(format!("invalid code hex: {e}")))?;
        Ok(Self(code))
    }
}

impl std::fmt::Display for PerceptualCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The fingerprint pair every notarized submission carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub digest: ContentDigest,
    pub code: PerceptualCode,
}

impl Fingerprint {
    /// Compute both fingerprints for the given bytes.
    ///
    /// The two are independent; a caller needing only one can use
    /// [`ContentDigest::from_bytes`] or [`PerceptualCode::from_bytes`]
    /// directly.
    pub fn compute(data: &[u8]) -> Result<Self> {
        let digest = ContentDigest::from_bytes(data);
        let code = PerceptualCode::from_bytes(data)?;
        Ok(Self { digest, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    /// An 8x8 image whose top four rows are black and bottom four white.
    fn half_black_half_white() -> DynamicImage {
        let mut img = RgbImage::new(8, 8);
        for (_, y, pixel) in img.enumerate_pixels_mut() {
            let v = if y < 4 { 0 } else { 255 };
            *pixel = Rgb([v, v, v]);
        }
        DynamicImage::ImageRgb8(img)
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageFormat::Png)
            .expect("PNG encoding failed");
        buffer.into_inner()
    }

    #[test]
    fn test_digest_deterministic() {
        let a = ContentDigest::from_bytes(b"hello world");
        let b = ContentDigest::from_bytes(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, ContentDigest::from_bytes(b"hello worlds"));
    }

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = ContentDigest::from_bytes(b"roundtrip");
        let restored = ContentDigest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, restored);
        assert_eq!(digest.to_hex().len(), 64);
    }

    #[test]
    fn test_digest_from_hex_rejects_bad_input() {
        assert!(ContentDigest::from_hex("zz").is_err());
        assert!(ContentDigest::from_hex("abcd").is_err()); // too short
    }

    #[test]
    fn test_code_known_pattern() {
        // Black rows are below the mean, white rows above: the code is the
        // white half, row-major, MSB-first.
        let code = PerceptualCode::from_image(&half_black_half_white());
        assert_eq!(code.0, 0x0000_0000_FFFF_FFFF);
    }

    #[test]
    fn test_code_uniform_image_all_ones() {
        // Every sample equals the mean, and the threshold is inclusive.
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let code = PerceptualCode::from_image(&img);
        assert_eq!(code.0, u64::MAX);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let data = png_bytes(&half_black_half_white());
        let a = Fingerprint::compute(&data).unwrap();
        let b = Fingerprint::compute(&data).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.code.hamming_distance(b.code), 0);
    }

    #[test]
    fn test_fingerprint_rejects_non_image() {
        let err = Fingerprint::compute(b"definitely not an image").unwrap_err();
        assert!(matches!(err, HatchmarkError::UnsupportedContent(_)));
    }

    #[test]
    fn test_fingerprint_rejects_empty() {
        let err = Fingerprint::compute(b"").unwrap_err();
        assert!(matches!(err, HatchmarkError::UnsupportedContent(_)));
    }

    #[test]
    fn test_hamming_distance() {
        let a = PerceptualCode(0);
        assert_eq!(a.hamming_distance(a), 0);
        assert_eq!(a.hamming_distance(PerceptualCode(u64::MAX)), 64);
        assert_eq!(a.hamming_distance(PerceptualCode(0b1011)), 3);
    }

    #[test]
    fn test_code_hex_roundtrip() {
        let code = PerceptualCode(0xDEAD_BEEF_CAFE_BABE);
        assert_eq!(code.to_hex(), "deadbeefcafebabe");
        assert_eq!(PerceptualCode::from_hex("deadbeefcafebabe").unwrap(), code);
        assert!(PerceptualCode::from_hex("not hex").is_err());
    }

    #[test]
    fn test_code_width() {
        assert_eq!(PerceptualCode::BITS, 64);
    }
}

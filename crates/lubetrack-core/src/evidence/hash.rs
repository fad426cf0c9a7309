//! Perceptual fingerprints for evidence photos

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};

use crate::error::{Error, Result};
use crate::models::PhotoHash;

/// Fingerprint an encoded image.
///
/// The bottom `watermark_band` fraction of the image is cropped away before
/// hashing so the capture-time watermark never influences the result. The
/// hash is computed on a downscaled gradient, so re-encoding the same pixels
/// (or a negligible change in quality) yields the same value.
pub fn generate_hash(image_data: &[u8], watermark_band: f32) -> Result<PhotoHash> {
    let image = image::load_from_memory(image_data)
        .map_err(|error| Error::HashingFailure(format!("could not decode image: {error}")))?;
    let content = strip_watermark(&image, watermark_band)?;

    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();
    Ok(PhotoHash::new(hasher.hash_image(&content).to_base64()))
}

/// Number of differing bits between two fingerprints, `None` if either is malformed
pub fn hamming_distance(lhs: &PhotoHash, rhs: &PhotoHash) -> Option<u32> {
    let lhs = ImageHash::<Vec<u8>>::from_base64(lhs.as_str()).ok()?;
    let rhs = ImageHash::<Vec<u8>>::from_base64(rhs.as_str()).ok()?;
    Some(lhs.dist(&rhs))
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn strip_watermark(image: &DynamicImage, watermark_band: f32) -> Result<DynamicImage> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(Error::HashingFailure("image has no pixels".to_string()));
    }

    let band = watermark_band.clamp(0.0, 0.5);
    let kept = ((height as f32) * (1.0 - band)).floor().max(1.0) as u32;
    Ok(image.crop_imm(0, 0, width, kept.min(height)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    const BAND: f32 = 0.12;

    /// Horizontal brightness ramp, optionally reversed
    pub(crate) fn ramp(width: u32, height: u32, reversed: bool) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let step = u8::try_from(x * 255 / (width - 1)).unwrap();
            let value = if reversed { 255 - step } else { step };
            Rgb([value, value, value])
        })
    }

    pub(crate) fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut bytes, format)
            .unwrap();
        bytes.into_inner()
    }

    pub(crate) fn ramp_png(reversed: bool) -> Vec<u8> {
        encode(&ramp(64, 100, reversed), ImageFormat::Png)
    }

    #[test]
    fn same_bytes_same_hash() {
        let bytes = ramp_png(false);
        assert_eq!(
            generate_hash(&bytes, BAND).unwrap(),
            generate_hash(&bytes, BAND).unwrap()
        );
    }

    #[test]
    fn different_content_different_hash() {
        let rising = generate_hash(&ramp_png(false), BAND).unwrap();
        let falling = generate_hash(&ramp_png(true), BAND).unwrap();
        assert_ne!(rising, falling);
        assert!(hamming_distance(&rising, &falling).unwrap() > 0);
    }

    #[test]
    fn re_encoding_keeps_hash() {
        let image = ramp(64, 100, false);
        let png = generate_hash(&encode(&image, ImageFormat::Png), BAND).unwrap();
        let bmp = generate_hash(&encode(&image, ImageFormat::Bmp), BAND).unwrap();
        assert_eq!(png, bmp);
        assert_eq!(hamming_distance(&png, &bmp), Some(0));
    }

    #[test]
    fn featureless_frames_collide() {
        // no gradients to fingerprint: a blank wall matches a dark shot
        let wall = RgbImage::from_pixel(64, 100, Rgb([220, 220, 210]));
        let dark = RgbImage::from_pixel(64, 100, Rgb([8, 8, 8]));
        let wall = generate_hash(&encode(&wall, ImageFormat::Png), BAND).unwrap();
        let dark = generate_hash(&encode(&dark, ImageFormat::Png), BAND).unwrap();
        assert_eq!(hamming_distance(&wall, &dark), Some(0));
    }

    #[test]
    fn watermark_band_is_ignored() {
        let original = ramp(64, 100, false);
        let mut stamped = original.clone();
        // bottom 10 rows stay inside the 12% band
        for y in 90..100 {
            for x in 0..64 {
                stamped.put_pixel(x, y, Rgb([255, (x * 4) as u8, 0]));
            }
        }

        assert_eq!(
            generate_hash(&encode(&original, ImageFormat::Png), BAND).unwrap(),
            generate_hash(&encode(&stamped, ImageFormat::Png), BAND).unwrap()
        );
    }

    #[test]
    fn corrupt_bytes_fail_to_hash() {
        assert!(matches!(
            generate_hash(b"definitely not an image", BAND),
            Err(Error::HashingFailure(_))
        ));
    }

    #[test]
    fn malformed_hash_has_no_distance() {
        let valid = generate_hash(&ramp_png(false), BAND).unwrap();
        assert_eq!(hamming_distance(&valid, &PhotoHash::new("%%%")), None);
    }
}

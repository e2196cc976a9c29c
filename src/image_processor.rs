use crate::detection::Detection;
use image::{codecs::jpeg::JpegEncoder, ImageReader, RgbImage};
use std::io::Cursor;
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum ImageProcessorError {
    #[error("image data is empty")]
    Empty,
    #[error("failed to read image: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
}

/// Decodes uploaded bytes of any supported format into RGB8.
pub fn image_from_bytes(data: &[u8]) -> Result<RgbImage, ImageProcessorError> {
    if data.is_empty() {
        return Err(ImageProcessorError::Empty);
    }

    let image = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()
        .map_err(ImageProcessorError::Decode)?;

    tracing::debug!(width = image.width(), height = image.height(), "decoded image");
    Ok(image.to_rgb8())
}

pub fn bytes_from_image(image: &RgbImage) -> Result<Vec<u8>, ImageProcessorError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(image)
        .map_err(ImageProcessorError::Encode)?;
    Ok(buffer)
}

/// Crops the region covered by `detection`, clamped to the image.
/// The result is never smaller than 1x1.
pub fn crop_to_detection(image: &RgbImage, detection: &Detection) -> RgbImage {
    let (width, height) = image.dimensions();
    let clamp = |v: f32, max: u32| (v.max(0.).floor() as u32).min(max.saturating_sub(1));

    let x = clamp(detection.xmin, width);
    let y = clamp(detection.ymin, height);
    let xmax = (detection.xmax.max(0.).ceil() as u32).min(width);
    let ymax = (detection.ymax.max(0.).ceil() as u32).min(height);

    let crop_width = xmax.saturating_sub(x).max(1);
    let crop_height = ymax.saturating_sub(y).max(1);

    image::imageops::crop_imm(image, x, y, crop_width, crop_height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detection;
    use image::{ImageFormat, Rgb};

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_image_from_bytes() {
        let img = RgbImage::from_pixel(100, 60, Rgb([255, 0, 0]));
        let decoded = image_from_bytes(&png_bytes(&img)).unwrap();

        assert_eq!(decoded.dimensions(), (100, 60));
        assert_eq!(decoded.get_pixel(10, 10), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_image_from_bytes_rejects_garbage() {
        assert!(matches!(image_from_bytes(&[]), Err(ImageProcessorError::Empty)));
        assert!(image_from_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_bytes_from_image_is_jpeg() {
        let img = RgbImage::from_pixel(32, 32, Rgb([0, 128, 255]));
        let jpeg = bytes_from_image(&img).unwrap();

        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
        let decoded = image_from_bytes(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (32, 32));
    }

    #[test]
    fn test_crop_to_detection_clamps() {
        let img = RgbImage::new(100, 80);

        let inside = crop_to_detection(&img, &detection(0, "person", 0.9, [10., 20., 40., 60.]));
        assert_eq!(inside.dimensions(), (30, 40));

        let overflowing = crop_to_detection(&img, &detection(0, "person", 0.9, [-5., -5., 150., 150.]));
        assert_eq!(overflowing.dimensions(), (100, 80));

        let degenerate = crop_to_detection(&img, &detection(0, "person", 0.9, [50., 50., 50., 50.]));
        assert_eq!(degenerate.dimensions(), (1, 1));
    }
}

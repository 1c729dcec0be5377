use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Longest side, in pixels, a canvas is allowed to keep.
pub const MAX_CANVAS_SIDE: u32 = 1024;

/// Decoded, upright, size-bounded RGBA image an annotation pass draws on.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    /// Decodes any format the `image` crate recognises, applies the EXIF
    /// orientation and shrinks it to fit `MAX_CANVAS_SIDE`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .with_context(|| "failed to read image header")?;
        let mut decoder = reader
            .into_decoder()
            .with_context(|| "unsupported image format")?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image =
            DynamicImage::from_decoder(decoder).with_context(|| "failed to decode image")?;
        image.apply_orientation(orientation);
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image: bound_size(image, MAX_CANVAS_SIDE).to_rgba8(),
        }
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        Self::from_image(DynamicImage::ImageRgba8(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }
}

pub(crate) fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .with_context(|| "failed to encode PNG")?;
    Ok(bytes)
}

fn bound_size(image: DynamicImage, max_side: u32) -> DynamicImage {
    if image.width() <= max_side && image.height() <= max_side {
        return image;
    }
    let resized = image.resize(max_side, max_side, FilterType::Lanczos3);
    debug!(
        "downscaled canvas {}x{} -> {}x{}",
        image.width(),
        image.height(),
        resized.width(),
        resized.height()
    );
    resized
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(width, height, Rgba([12, 34, 56, 255]))).expect("png")
    }

    #[test]
    fn decodes_small_images_unchanged() {
        let canvas = Canvas::decode(&png_of(64, 32)).expect("canvas");
        assert_eq!((canvas.width(), canvas.height()), (64, 32));
        assert_eq!(canvas.image().get_pixel(10, 10), &Rgba([12, 34, 56, 255]));
    }

    #[test]
    fn downscales_preserving_aspect_ratio() {
        let canvas = Canvas::decode(&png_of(2048, 1024)).expect("canvas");
        assert_eq!((canvas.width(), canvas.height()), (1024, 512));
        let tall = Canvas::from_rgba(RgbaImage::new(300, 3000));
        assert_eq!((tall.width(), tall.height()), (102, 1024));
    }

    #[test]
    fn rejects_non_images() {
        assert!(Canvas::decode(b"definitely not an image").is_err());
        assert!(Canvas::decode(&[]).is_err());
    }

    #[test]
    fn png_round_trips() {
        let canvas = Canvas::decode(&png_of(5, 7)).expect("canvas");
        let again = Canvas::decode(&canvas.to_png().expect("png")).expect("canvas");
        assert_eq!(canvas, again);
    }

    /// 40x20 JPEG, red on the left half and blue on the right, tagged with
    /// EXIF orientation 6 (rotate 90 degrees clockwise).
    fn rotated_jpeg() -> Vec<u8> {
        let image = image::RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .expect("jpeg");

        let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]);
        app1.extend_from_slice(&[0x01, 0x00]);
        app1.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00]);
        app1.extend_from_slice(&[0x06, 0x00, 0x00, 0x00]);
        app1.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        jpeg.splice(2..2, app1);
        jpeg
    }

    fn close_to(pixel: &Rgba<u8>, expected: [u8; 3]) -> bool {
        pixel.0[..3]
            .iter()
            .zip(expected)
            .all(|(&got, want)| got.abs_diff(want) <= 40)
    }

    #[test]
    fn applies_exif_orientation() {
        let canvas = Canvas::decode(&rotated_jpeg()).expect("canvas");
        assert_eq!((canvas.width(), canvas.height()), (20, 40));
        let top = canvas.image().get_pixel(10, 5);
        let bottom = canvas.image().get_pixel(10, 34);
        assert!(close_to(top, [255, 0, 0]), "top {:?}", top);
        assert!(close_to(bottom, [0, 0, 255]), "bottom {:?}", bottom);
    }
}

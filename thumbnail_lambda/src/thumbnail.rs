use std::io::Cursor;

use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::imageops::FilterType;
use image::{GenericImageView, ImageError, ImageFormat, ImageReader};

use crate::error::ThumbnailError;

/// A re-encoded, bounding-box-constrained copy of a source image.
#[derive(Debug)]
pub(crate) struct Thumbnail {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Thumbnail {
    pub(crate) fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Dimensions that fit `width`×`height` inside a `max`×`max` box without
/// upscaling. The longer edge lands on `max` exactly when scaling happens.
pub(crate) fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let (w, h, m) = (u64::from(width), u64::from(height), u64::from(max));
    if w >= h {
        let scaled = ((h * m + w / 2) / w).max(1);
        (max, scaled as u32)
    } else {
        let scaled = ((w * m + h / 2) / h).max(1);
        (scaled as u32, max)
    }
}

/// Decodes `data`, shrinks it into the bounding box and encodes it again in
/// the format it was decoded from. `format_hint` is consulted only when the
/// format cannot be sniffed from the bytes.
pub(crate) fn render(
    data: &[u8],
    format_hint: Option<ImageFormat>,
    max_dimension: u32,
) -> Result<Thumbnail, ThumbnailError> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ThumbnailError::Decode(ImageError::IoError(e)))?;
    if reader.format().is_none() {
        if let Some(hint) = format_hint {
            reader.set_format(hint);
        }
    }
    let Some(format) = reader.format() else {
        return Err(ThumbnailError::Decode(ImageError::Unsupported(
            UnsupportedError::from_format_and_kind(
                ImageFormatHint::Unknown,
                UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
            ),
        )));
    };
    let img = reader.decode().map_err(ThumbnailError::Decode)?;

    let (source_width, source_height) = img.dimensions();
    let (width, height) = fit_within(source_width, source_height, max_dimension);
    let resized = if (width, height) == (source_width, source_height) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    let mut bytes = Vec::with_capacity((width as usize) * (height as usize) * 3);
    resized
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(ThumbnailError::Encode)?;

    Ok(Thumbnail {
        bytes,
        format,
        width,
        height,
        source_width,
        source_height,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// Encodes a gradient test image of the given size.
    pub(crate) fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), format)
            .unwrap();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::encoded;
    use super::*;

    #[test]
    fn small_images_are_not_upscaled() {
        assert_eq!(fit_within(100, 50, 150), (100, 50));
        assert_eq!(fit_within(150, 150, 150), (150, 150));
        assert_eq!(fit_within(1, 1, 150), (1, 1));
    }

    #[test]
    fn larger_edge_lands_on_the_bound() {
        assert_eq!(fit_within(400, 200, 150), (150, 75));
        assert_eq!(fit_within(200, 300, 150), (100, 150));
        assert_eq!(fit_within(1000, 1000, 150), (150, 150));
        assert_eq!(fit_within(151, 100, 150), (150, 99));
    }

    #[test]
    fn extreme_aspect_ratio_keeps_one_pixel() {
        assert_eq!(fit_within(3000, 1, 150), (150, 1));
        assert_eq!(fit_within(1, 3000, 150), (1, 150));
    }

    #[test]
    fn aspect_ratio_is_preserved_within_a_pixel() {
        for (w, h) in [(640, 480), (1920, 1080), (333, 777), (1001, 999)] {
            let (tw, th) = fit_within(w, h, 150);
            assert_eq!(tw.max(th), 150);
            let expected_other = f64::from(w.min(h)) * 150.0 / f64::from(w.max(h));
            let actual_other = f64::from(tw.min(th));
            assert!((expected_other - actual_other).abs() <= 1.0, "{w}x{h}");
        }
    }

    #[test]
    fn png_is_resized_and_stays_png() {
        let thumb = render(&encoded(600, 300, ImageFormat::Png), None, 150).unwrap();
        assert_eq!(thumb.format, ImageFormat::Png);
        assert_eq!(thumb.mime_type(), "image/png");
        assert_eq!((thumb.source_width, thumb.source_height), (600, 300));
        assert_eq!((thumb.width, thumb.height), (150, 75));

        let decoded = image::load_from_memory(&thumb.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (150, 75));
        assert_eq!(image::guess_format(&thumb.bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn jpeg_stays_jpeg() {
        let thumb = render(&encoded(200, 400, ImageFormat::Jpeg), None, 150).unwrap();
        assert_eq!(thumb.format, ImageFormat::Jpeg);
        assert_eq!((thumb.width, thumb.height), (75, 150));
        assert_eq!(image::guess_format(&thumb.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn small_image_keeps_its_size() {
        let thumb = render(&encoded(40, 30, ImageFormat::Png), None, 150).unwrap();
        assert_eq!((thumb.width, thumb.height), (40, 30));
        let decoded = image::load_from_memory(&thumb.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn rendering_is_deterministic() {
        let source = encoded(320, 240, ImageFormat::Png);
        let first = render(&source, None, 150).unwrap();
        let second = render(&source, None, 150).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = render(b"definitely not an image", Some(ImageFormat::Jpeg), 150).unwrap_err();
        assert!(matches!(err, ThumbnailError::Decode(_)));
    }

    #[test]
    fn unknown_format_without_hint_fails_to_decode() {
        let err = render(b"\x00\x01\x02\x03", None, 150).unwrap_err();
        assert!(matches!(err, ThumbnailError::Decode(_)));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let mut source = encoded(64, 64, ImageFormat::Png);
        source.truncate(source.len() / 2);
        let err = render(&source, None, 150).unwrap_err();
        assert!(matches!(err, ThumbnailError::Decode(_)));
    }
}

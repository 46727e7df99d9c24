//! Image validation and compression
//!
//! Every accepted upload is decoded, EXIF re-oriented, bounded to the
//! configured maximum dimensions, and re-encoded as JPEG at the configured
//! quality. The stored file therefore always decodes as JPEG regardless of
//! the uploaded format.

use image::imageops::FilterType;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use labelit_common::{Config, Error, Result};
use std::io::Cursor;

/// Dimension bounds for accepted uploads, in pixels
const MIN_DIMENSION: u32 = 10;
const MAX_DIMENSION: u32 = 10_000;

/// A validated, compressed upload ready for the image store
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// JPEG-encoded bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Image processing pipeline configured from [`Config`]
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    quality: u8,
    max_dimension: u32,
    max_upload_bytes: u64,
}

impl ImageProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            quality: config.image_quality,
            max_dimension: config.image_max_dimension,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Validate and compress an uploaded byte stream
    ///
    /// Fails with `InvalidInput` when the payload exceeds the size cap and
    /// with `InvalidImage` for unsupported formats, corrupt data, or
    /// out-of-range dimensions. Nothing is written to disk here.
    pub fn process(&self, bytes: &[u8]) -> Result<ProcessedImage> {
        if bytes.is_empty() {
            return Err(Error::InvalidImage("empty upload".to_string()));
        }
        if bytes.len() as u64 > self.max_upload_bytes {
            return Err(Error::InvalidInput(format!(
                "upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_upload_bytes
            )));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| Error::InvalidImage(format!("unreadable data: {}", e)))?;

        let format = reader
            .format()
            .ok_or_else(|| Error::InvalidImage("unrecognized image format".to_string()))?;
        if !matches!(
            format,
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP
        ) {
            return Err(Error::InvalidImage(format!(
                "unsupported format: {:?} (accepted: JPEG, PNG, GIF, WEBP)",
                format
            )));
        }

        // Decode through the ImageDecoder trait so the EXIF orientation is
        // available before the pixel data is consumed
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| Error::InvalidImage(format!("decode failed: {}", e)))?;
        let orientation = decoder
            .orientation()
            .map_err(|e| Error::InvalidImage(format!("bad metadata: {}", e)))?;
        let mut img = DynamicImage::from_decoder(decoder)
            .map_err(|e| Error::InvalidImage(format!("decode failed: {}", e)))?;
        img.apply_orientation(orientation);

        let (width, height) = (img.width(), img.height());
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(Error::InvalidImage(format!(
                "dimensions {}x{} below the {}px minimum",
                width, height, MIN_DIMENSION
            )));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(Error::InvalidImage(format!(
                "dimensions {}x{} above the {}px maximum",
                width, height, MAX_DIMENSION
            )));
        }

        // Downscale only; small images are stored as-is
        if width > self.max_dimension || height > self.max_dimension {
            img = img.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3);
        }

        // JPEG has no alpha channel
        let rgb = img.to_rgb8();
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| Error::InvalidImage(format!("re-encode failed: {}", e)))?;

        Ok(ProcessedImage {
            bytes: out,
            width: rgb.width(),
            height: rgb.height(),
        })
    }
}

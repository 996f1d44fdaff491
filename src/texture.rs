//! Texture decoding
//!
//! Decoding is pure CPU work with no shared state, so a [`TextureDecoder`]
//! can be cloned into any number of concurrent decode tasks.

use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for texture decoding
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Image decoding error: {0}")]
    DecodeError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Image has zero extent")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container formats accepted by the decoder
pub const SUPPORTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::Tga,
    ImageFormat::Gif,
];

/// File extensions of [`SUPPORTED_FORMATS`], lowercase
pub const TEXTURE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "tga"];

/// An image decoded to tightly packed RGBA8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Row-major RGBA8 pixels
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Source file
    pub path: PathBuf,
    valid: bool,
}

impl DecodedImage {
    /// Wrap RGBA8 pixels
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        let valid = width > 0 && height > 0 && pixels.len() == rgba_size(width, height);
        Self {
            pixels,
            width,
            height,
            path: path.into(),
            valid,
        }
    }

    /// Placeholder for a file that could not be decoded
    pub fn invalid(path: impl Into<PathBuf>) -> Self {
        Self {
            pixels: Vec::new(),
            width: 0,
            height: 0,
            path: path.into(),
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Bytes this image occupies in a staging buffer (zero when invalid)
    pub fn byte_size(&self) -> u64 {
        if self.valid {
            self.pixels.len() as u64
        } else {
            0
        }
    }
}

fn rgba_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// Decodes PNG, JPEG, BMP, TGA and GIF files into RGBA8
#[derive(Debug, Default, Clone, Copy)]
pub struct TextureDecoder;

impl TextureDecoder {
    /// Create a new texture decoder
    pub fn new() -> Self {
        Self
    }

    /// Decode a file, never failing
    ///
    /// Problems are logged and reported as [`DecodedImage::invalid`] so the
    /// caller can substitute a fallback.
    pub fn decode(&self, path: &Path) -> DecodedImage {
        match self.decode_file(path) {
            Ok(image) => {
                log::trace!(
                    "Decoded {} ({}x{})",
                    path.display(),
                    image.width,
                    image.height
                );
                image
            }
            Err(e) => {
                log::warn!("Failed to decode texture {}: {e}", path.display());
                DecodedImage::invalid(path)
            }
        }
    }

    /// Decode a file, reporting why it failed
    ///
    /// The container is detected from magic bytes, falling back to the
    /// extension for formats without a signature (TGA).
    pub fn decode_file(&self, path: &Path) -> Result<DecodedImage, TextureError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| TextureError::UnsupportedFormat(path.display().to_string()))?;
        Self::check_format(format)?;

        let img = reader
            .decode()
            .map_err(|e| TextureError::DecodeError(e.to_string()))?;
        Self::finish(path, img)
    }

    /// Decode an in-memory image
    ///
    /// `hint` is used when the bytes carry no recognisable signature.
    pub fn decode_bytes(
        &self,
        data: &[u8],
        hint: Option<ImageFormat>,
    ) -> Result<DecodedImage, TextureError> {
        let format = match image::guess_format(data) {
            Ok(format) => format,
            Err(e) => hint.ok_or_else(|| TextureError::DecodeError(e.to_string()))?,
        };
        Self::check_format(format)?;

        let img = ImageReader::with_format(Cursor::new(data), format)
            .decode()
            .map_err(|e| TextureError::DecodeError(e.to_string()))?;
        Self::finish(Path::new("<memory>"), img)
    }

    fn check_format(format: ImageFormat) -> Result<(), TextureError> {
        if SUPPORTED_FORMATS.contains(&format) {
            Ok(())
        } else {
            Err(TextureError::UnsupportedFormat(format!(
                "{:?} is not one of PNG/JPEG/BMP/TGA/GIF",
                format
            )))
        }
    }

    fn finish(path: &Path, img: image::DynamicImage) -> Result<DecodedImage, TextureError> {
        let rgba = img.into_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::Empty);
        }
        Ok(DecodedImage::new(path, width, height, rgba.into_raw()))
    }
}

/// Whether a path names an image the decoder handles, by extension
pub fn is_texture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXTURE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(img: &image::RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut data = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), format)
            .expect("Failed to encode test image");
        data
    }

    #[test]
    fn test_decode_png_bytes() {
        let mut img = image::RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 255, 128]));

        let decoded = TextureDecoder::new()
            .decode_bytes(&encode(&img, ImageFormat::Png), None)
            .unwrap();
        assert!(decoded.is_valid());
        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.pixels, vec![255, 0, 0, 255, 0, 0, 255, 128]);
        assert_eq!(decoded.byte_size(), 8);
    }

    #[test]
    fn test_decode_jpeg_expands_to_rgba() {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 200, 200]));
        let mut data = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), ImageFormat::Jpeg)
            .unwrap();

        let decoded = TextureDecoder::new().decode_bytes(&data, None).unwrap();
        assert_eq!(decoded.pixels.len(), 4 * 4 * 4);
        assert!(decoded.pixels.chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_decode_tga_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.tga");
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 40]));
        std::fs::write(&path, encode(&img, ImageFormat::Tga)).unwrap();

        let decoded = TextureDecoder::new().decode(&path);
        assert!(decoded.is_valid());
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 40]);
        assert_eq!(decoded.path, path);
    }

    #[test]
    fn test_corrupt_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();

        let decoded = TextureDecoder::new().decode(&path);
        assert!(!decoded.is_valid());
        assert_eq!(decoded.byte_size(), 0);
        assert!(TextureDecoder::new().decode_file(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TextureDecoder::new()
            .decode_file(Path::new("/no/such/texture.png"))
            .unwrap_err();
        assert!(matches!(err, TextureError::Io(_)));
    }

    #[test]
    fn test_texture_extensions() {
        assert!(is_texture_file(Path::new("a/b/Albedo.PNG")));
        assert!(is_texture_file(Path::new("rough.tga")));
        assert!(!is_texture_file(Path::new("scene.obj")));
        assert!(!is_texture_file(Path::new("README")));
    }

    #[test]
    fn test_decoded_image_size_mismatch_is_invalid() {
        let image = DecodedImage::new("x.png", 2, 2, vec![0; 4]);
        assert!(!image.is_valid());
        assert_eq!(image.byte_size(), 0);
    }
}

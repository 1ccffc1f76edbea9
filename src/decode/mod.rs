use image::{DynamicImage, GenericImageView};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::files::{is_raw_image, is_standard_image};

pub mod metadata;
pub mod raw;

pub use metadata::{ExposureTime, Metadata};

// ---------------------------------------------------------------------------
// Decoded image data (CPU side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub rgba_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub format_name: String,
}

impl DecodedImage {
    pub fn from_dynamic(img: &DynamicImage, file_size: u64, format_name: String) -> Self {
        let (width, height) = img.dimensions();
        Self {
            rgba_bytes: img.to_rgba8().into_raw(),
            width,
            height,
            file_size,
            format_name,
        }
    }

    pub fn mem_size(&self) -> u64 {
        self.rgba_bytes.len() as u64
    }

    /// RGBA of the pixel at (x, y), or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let px = self.rgba_bytes.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// The decode function a prefetch worker runs. Injectable so callers can
/// substitute their own backend.
pub type DecodeFn = Arc<dyn Fn(&Path) -> Result<(DecodedImage, Metadata)> + Send + Sync>;

pub fn default_decoder() -> DecodeFn {
    Arc::new(decode)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Open `path` as a raster, dispatching on its extension.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    if is_raw_image(path) {
        raw::open_raw(path)
    } else if is_standard_image(path) {
        image::open(path).map_err(|e| Error::image(path, e))
    } else {
        Err(Error::Unsupported(path.to_path_buf()))
    }
}

/// Decode a full image plus its EXIF metadata.
pub fn decode(path: &Path) -> Result<(DecodedImage, Metadata)> {
    let file_size = fs::metadata(path)
        .map_err(|e| Error::io(path, e))?
        .len();
    let img = open_image(path)?;

    let format_name = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("unknown")
        .to_uppercase();

    let decoded = DecodedImage::from_dynamic(&img, file_size, format_name);
    let metadata = metadata::read_metadata(path);
    Ok((decoded, metadata))
}

/// Run `f` and turn a panic inside it into an error for `path`.
///
/// Some decoders panic on malformed input rather than returning an error;
/// the worker loops must survive that.
pub fn catch_decode_panic<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(Error::Panicked(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn decodes_png_with_empty_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(4, 3, Rgb([255, 0, 0])).save(&path).unwrap();

        let (img, meta) = decode(&path).unwrap();
        assert_eq!((img.width, img.height), (4, 3));
        assert_eq!(img.rgba_bytes.len(), 4 * 3 * 4);
        assert_eq!(img.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(img.pixel(4, 0), None);
        assert_eq!(img.format_name, "PNG");
        assert!(img.file_size > 0);
        assert_eq!(meta, Metadata::default());
    }

    #[test]
    fn truncated_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        RgbImage::from_pixel(32, 32, Rgb([1, 2, 3])).save(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(decode(&path), Err(Error::Image { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            decode(&dir.path().join("gone.jpg")),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();
        assert!(matches!(open_image(&path), Err(Error::Unsupported(_))));
    }

    #[test]
    fn panics_become_errors() {
        let path = Path::new("boom.png");
        let result: Result<()> = catch_decode_panic(path, || panic!("bad data"));
        assert!(matches!(result, Err(Error::Panicked(_))));
    }
}

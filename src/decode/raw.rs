//! RAW camera files.
//!
//! Most RAW containers carry a full-size JPEG preview next to the sensor data.
//! Decoding that preview is far cheaper than developing the sensor data, so it
//! is tried first; `rawloader` development is the fallback for files without a
//! usable preview.

use image::{DynamicImage, ImageFormat, RgbImage};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Previews smaller than this are the tiny EXIF thumbnails, not worth showing.
const MIN_PREVIEW_BYTES: usize = 16 * 1024;

/// Stop collecting JPEG start markers after this many; real files have a
/// handful of embedded images at most.
const MAX_PREVIEW_CANDIDATES: usize = 16;

const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

pub fn open_raw(path: &Path) -> Result<DynamicImage> {
    let data = fs::read(path).map_err(|e| Error::io(path, e))?;

    if let Some(img) = decode_embedded_preview(&data) {
        log::debug!(
            "Using embedded preview {}x{} for {}",
            img.width(),
            img.height(),
            path.display()
        );
        return Ok(img);
    }

    log::debug!("No embedded preview in {}, developing", path.display());
    develop(path)
}

/// Byte ranges of embedded JPEG streams, largest first.
pub fn find_embedded_jpegs(data: &[u8]) -> Vec<&[u8]> {
    let mut found = Vec::new();
    let mut pos = 0;

    while found.len() < MAX_PREVIEW_CANDIDATES {
        let Some(start_off) = data[pos..]
            .windows(JPEG_SOI.len())
            .position(|w| w == JPEG_SOI)
        else {
            break;
        };
        let start = pos + start_off;
        let Some(end_off) = data[start..]
            .windows(JPEG_EOI.len())
            .position(|w| w == JPEG_EOI)
        else {
            break;
        };
        let end = start + end_off + JPEG_EOI.len();
        found.push(&data[start..end]);
        // Continue after the SOI, not the EOI: a preview can contain a
        // nested thumbnail, so the first EOI may close the inner one.
        pos = start + JPEG_SOI.len();
    }

    found.sort_by(|a, b| b.len().cmp(&a.len()));
    found
}

/// Decode the largest embedded JPEG that is big enough and actually decodes.
pub fn decode_embedded_preview(data: &[u8]) -> Option<DynamicImage> {
    find_embedded_jpegs(data)
        .into_iter()
        .filter(|jpeg| jpeg.len() >= MIN_PREVIEW_BYTES)
        .find_map(|jpeg| image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).ok())
}

// ---------------------------------------------------------------------------
// Full development
// ---------------------------------------------------------------------------

/// Develop the sensor data at half resolution: each 2x2 CFA block becomes one
/// RGB pixel, so no interpolation is needed.
pub fn develop(path: &Path) -> Result<DynamicImage> {
    let loader = rawloader::RawLoader::new();
    let raw = loader.decode_file(path).map_err(|e| Error::Raw {
        path: path.to_path_buf(),
        message: format!("{:?}", e),
    })?;

    let samples: Vec<f32> = match &raw.data {
        rawloader::RawImageData::Integer(values) => values.iter().map(|&v| v as f32).collect(),
        rawloader::RawImageData::Float(values) => {
            values.iter().map(|&v| v * 65535.0).collect()
        }
    };

    let width = raw.width;
    let height = raw.height;
    if width < 2 || height < 2 || samples.len() < width * height * raw.cpp {
        return Err(Error::Raw {
            path: path.to_path_buf(),
            message: format!("truncated sensor data ({}x{})", width, height),
        });
    }

    let wb = normalized_white_balance(raw.wb_coeffs);
    let black = raw.blacklevels[0] as f32;
    let white = (raw.whitelevels[0] as f32).max(black + 1.0);
    let level = |v: f32, channel: usize| ((v - black) / (white - black) * wb[channel]).clamp(0.0, 1.0);

    let out_w = (width / 2) as u32;
    let out_h = (height / 2) as u32;
    let mut out = RgbImage::new(out_w, out_h);

    for oy in 0..out_h as usize {
        for ox in 0..out_w as usize {
            let mut sum = [0.0f32; 3];
            let mut count = [0u32; 3];
            for dy in 0..2 {
                for dx in 0..2 {
                    let row = oy * 2 + dy;
                    let col = ox * 2 + dx;
                    if raw.cpp == 3 {
                        let i = (row * width + col) * 3;
                        for c in 0..3 {
                            sum[c] += level(samples[i + c], c);
                            count[c] += 1;
                        }
                    } else {
                        // 0 = R, 1 = G, 2 = B, 3 = second green / emerald.
                        let c = match raw.cfa.color_at(row, col) {
                            3 => 1,
                            c => c.min(2),
                        };
                        sum[c] += level(samples[row * width + col], c);
                        count[c] += 1;
                    }
                }
            }
            let px = [0, 1, 2].map(|c| {
                let linear = if count[c] > 0 { sum[c] / count[c] as f32 } else { 0.0 };
                (gamma(linear) * 255.0).round() as u8
            });
            out.put_pixel(ox as u32, oy as u32, image::Rgb(px));
        }
    }

    Ok(DynamicImage::ImageRgb8(out))
}

/// Camera white balance scaled so green is 1.0. Missing or broken
/// coefficients fall back to neutral.
fn normalized_white_balance(coeffs: [f32; 4]) -> [f32; 3] {
    let valid = |v: f32| v.is_finite() && v > 0.0;
    if !(valid(coeffs[0]) && valid(coeffs[1]) && valid(coeffs[2])) {
        return [1.0, 1.0, 1.0];
    }
    [coeffs[0] / coeffs[1], 1.0, coeffs[2] / coeffs[1]]
}

fn gamma(linear: f32) -> f32 {
    if linear <= 0.0031308 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

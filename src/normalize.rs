//! Image normalization
//!
//! Two policies are provided:
//!
//! - **Light** ([`ensure_rgb_and_min_size`]): a size and format gate applied
//!   in place to freshly downloaded files. Undecodable or too small files are
//!   deleted; anything that is not already an RGB JPEG is re-encoded as one.
//! - **Strict** ([`normalize_to_square`]): resize the short side to a target
//!   size, center-crop to an exact square and write a JPEG to a new path.

use crate::error::{DatasetError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::fs;
use std::path::Path;

/// JPEG quality used for every re-encode
pub const JPEG_QUALITY: u8 = 92;

/// Result of light normalization for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightOutcome {
    /// Already an RGB JPEG of sufficient size, left untouched
    Kept,
    /// Re-encoded in place as an RGB JPEG
    Converted,
    /// Deleted: short side below the minimum
    RejectedTooSmall,
    /// Deleted: not a readable image
    RejectedUndecodable,
    /// Deleted: the re-encoded image could not be written back
    WriteFailed,
}

impl LightOutcome {
    /// Whether the file still exists after normalization
    #[must_use]
    pub fn is_kept(self) -> bool {
        matches!(self, Self::Kept | Self::Converted)
    }
}

/// Options for strict square normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareOptions {
    /// Output side length in pixels
    pub size: u32,
    /// Inputs with a shorter short side are rejected
    pub min_side: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for SquareOptions {
    fn default() -> Self {
        Self {
            size: 224,
            min_side: 180,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

/// Load an image, falling back to content sniffing when the extension lies
///
/// # Errors
/// - File cannot be read
/// - Content is not a decodable image
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();

    match image::open(path_ref) {
        Ok(img) => Ok(img),
        Err(e) => {
            log::debug!(
                "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                path_ref.display(),
                e
            );
            let data = fs::read(path_ref)
                .map_err(|io_err| DatasetError::file_io_error("read image data", path_ref, &io_err))?;
            Ok(image::load_from_memory(&data)?)
        },
    }
}

/// Light normalization: enforce the minimum short side and RGB JPEG encoding in place
///
/// Never fails; every problem is mapped to an outcome and the offending file
/// is deleted.
pub fn ensure_rgb_and_min_size(path: &Path, min_side: u32) -> LightOutcome {
    let decoded = fs::read(path)
        .map_err(DatasetError::from)
        .and_then(|bytes| {
            let format = image::guess_format(&bytes).ok();
            let img = image::load_from_memory(&bytes)?;
            Ok((format, img, jpeg_component_count(&bytes)))
        });

    let (format, img, components) = match decoded {
        Ok(decoded) => decoded,
        Err(e) => {
            log::debug!("Removing undecodable file {}: {}", path.display(), e);
            remove_quietly(path);
            return LightOutcome::RejectedUndecodable;
        },
    };

    if short_side(img.width(), img.height()) < min_side {
        log::debug!(
            "Removing {} ({}x{}): below minimum side {}",
            path.display(),
            img.width(),
            img.height(),
            min_side
        );
        remove_quietly(path);
        return LightOutcome::RejectedTooSmall;
    }

    let is_rgb = matches!(img, DynamicImage::ImageRgb8(_));
    if is_rgb && format == Some(ImageFormat::Jpeg) && components == Some(3) {
        return LightOutcome::Kept;
    }

    let rgb = img.into_rgb8();
    match encode_jpeg(&rgb, JPEG_QUALITY).and_then(|bytes| write_output(path, &bytes)) {
        Ok(()) => LightOutcome::Converted,
        Err(e) => {
            log::warn!("Failed to re-encode {}: {}", path.display(), e);
            remove_quietly(path);
            LightOutcome::WriteFailed
        },
    }
}

/// Strict normalization: decode, gate, resize, center-crop and write a square JPEG
///
/// Nothing is written to `dst` unless every step succeeds.
///
/// # Errors
/// - Source is unreadable or not an image
/// - Source short side is below `options.min_side`
/// - Destination cannot be written
pub fn normalize_to_square(src: &Path, dst: &Path, options: &SquareOptions) -> Result<()> {
    let rgb = load_image(src)?.into_rgb8();
    let (width, height) = rgb.dimensions();

    if short_side(width, height) < options.min_side {
        return Err(DatasetError::Undersized {
            width,
            height,
            min_side: options.min_side,
        });
    }

    let resized = resize_short_side(&rgb, options.size);
    let square = center_crop(&resized, options.size);
    let bytes = encode_jpeg(&square, options.jpeg_quality)?;
    write_output(dst, &bytes)
}

/// Dimensions after scaling so the short side equals `target`
///
/// The long side is rounded, not truncated.
#[must_use]
pub fn short_side_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = f64::from(target);
    if width < height {
        let new_height = (f64::from(height) * scale / f64::from(width)).round() as u32;
        (target, new_height)
    } else {
        let new_width = (f64::from(width) * scale / f64::from(height)).round() as u32;
        (new_width, target)
    }
}

/// Resize so the short side equals `target`, preserving aspect ratio (Lanczos3)
#[must_use]
pub fn resize_short_side(img: &RgbImage, target: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }
    let (new_width, new_height) = short_side_dimensions(width, height, target);
    imageops::resize(img, new_width, new_height, FilterType::Lanczos3)
}

/// Crop a centered `size` x `size` square; offsets clamp at zero
#[must_use]
pub fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let left = width.saturating_sub(size) / 2;
    let top = height.saturating_sub(size) / 2;
    imageops::crop_imm(img, left, top, size, size).to_image()
}

/// Encode an RGB image as JPEG into memory
///
/// # Errors
/// - Encoder failure
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(img)?;
    Ok(buffer)
}

/// Component count declared by the frame header of a JPEG stream
///
/// The decoder converts CMYK/YCCK frames to RGB, so the decoded color type
/// alone cannot tell a 4-component source from a 3-component one.
#[must_use]
pub fn jpeg_component_count(bytes: &[u8]) -> Option<u8> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    loop {
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        let marker = *bytes.get(pos + 1)?;
        pos += 2;
        match marker {
            // fill byte
            0xFF => pos -= 1,
            0x01 | 0xD0..=0xD7 => {},
            0xD9 | 0xDA => return None,
            _ => {
                let len = usize::from(u16::from_be_bytes([*bytes.get(pos)?, *bytes.get(pos + 1)?]));
                let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
                if is_frame {
                    // length(2) precision(1) height(2) width(2) components(1)
                    return bytes.get(pos + 7).copied();
                }
                pos += len;
            },
        }
    }
}

fn short_side(width: u32, height: u32) -> u32 {
    width.min(height)
}

/// Write `bytes` to `path`, creating parents; a failed write leaves no file behind
fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| DatasetError::file_io_error("create output directory", parent, &e))?;
    }
    fs::write(path, bytes).map_err(|e| {
        remove_quietly(path);
        DatasetError::file_io_error("write image", path, &e)
    })
}

/// Delete a file, ignoring "not found"
pub(crate) fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

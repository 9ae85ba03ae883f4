//! Cover and logo image processing
//!
//! Uploaded types are detected from the file content, never from the
//! client-supplied name or MIME type.

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageResult};

/// Cover thumbnails are bounded to this width
pub const COVER_THUMB_WIDTH: u32 = 200;
/// Maintenance thumbnails are bounded to this height by default
pub const DEFAULT_THUMB_HEIGHT: u32 = 200;
/// JPEG output quality for generated images
pub const JPEG_QUALITY: u8 = 85;
/// Logos are scaled to fit this square
pub const LOGO_MAX_SIDE: u32 = 180;

/// Image types accepted for covers and logos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    /// Detect the type from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        infer::get(bytes).and_then(|kind| Self::from_mime(kind.mime_type()))
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Type of a file judged by its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical file extension (`jpeg` is stored as `jpg`)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    fn format(&self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Webp => ImageFormat::WebP,
        }
    }
}

/// Encode an image to `dest` in the given type
pub fn save_image(img: &DynamicImage, dest: &Path, kind: ImageKind) -> ImageResult<()> {
    match kind {
        ImageKind::Jpeg => {
            let mut writer = BufWriter::new(File::create(dest)?);
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        ImageKind::Png => img.save_with_format(dest, ImageFormat::Png),
        ImageKind::Webp => {
            DynamicImage::ImageRgba8(img.to_rgba8()).save_with_format(dest, ImageFormat::WebP)
        }
    }
}

fn scaled_height(width: u32, height: u32, new_width: u32) -> u32 {
    ((f64::from(height) * f64::from(new_width) / f64::from(width)).round() as u32).max(1)
}

fn scaled_width(width: u32, height: u32, new_height: u32) -> u32 {
    ((f64::from(width) * f64::from(new_height) / f64::from(height)).round() as u32).max(1)
}

fn open_as(src: &Path, kind: ImageKind) -> ImageResult<DynamicImage> {
    image::load(std::io::BufReader::new(File::open(src)?), kind.format())
}

/// Thumbnail bounded by width; images already narrow enough are copied
pub fn thumbnail_to_width(src: &Path, dest: &Path, max_width: u32, kind: ImageKind) -> ImageResult<()> {
    let img = open_as(src, kind)?;
    if img.width() <= max_width {
        std::fs::copy(src, dest)?;
        return Ok(());
    }
    let new_height = scaled_height(img.width(), img.height(), max_width);
    let thumb = img.resize_exact(max_width, new_height, FilterType::Triangle);
    save_image(&thumb, dest, kind)
}

/// Thumbnail bounded by height, never upscaled
pub fn thumbnail_to_height(src: &Path, dest: &Path, max_height: u32, kind: ImageKind) -> ImageResult<()> {
    let img = open_as(src, kind)?;
    if img.height() <= max_height {
        return save_image(&img, dest, kind);
    }
    let new_width = scaled_width(img.width(), img.height(), max_height);
    let thumb = img.resize_exact(new_width, max_height, FilterType::Triangle);
    save_image(&thumb, dest, kind)
}

/// Scale an uploaded image to fit `max_side` square, keeping the aspect ratio
///
/// Images that already fit are returned unchanged.
pub fn fit_within(bytes: &[u8], max_side: u32, kind: ImageKind) -> ImageResult<Vec<u8>> {
    let img = image::load_from_memory_with_format(bytes, kind.format())?;
    if img.width() <= max_side && img.height() <= max_side {
        return Ok(bytes.to_vec());
    }
    let resized = img.resize(max_side, max_side, FilterType::Triangle);
    let mut out = Cursor::new(Vec::new());
    match kind {
        ImageKind::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            DynamicImage::ImageRgb8(resized.to_rgb8()).write_with_encoder(encoder)?;
        }
        ImageKind::Png => resized.write_to(&mut out, ImageFormat::Png)?,
        ImageKind::Webp => {
            DynamicImage::ImageRgba8(resized.to_rgba8()).write_to(&mut out, ImageFormat::WebP)?
        }
    }
    Ok(out.into_inner())
}

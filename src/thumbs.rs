//! Thumbnail generation and image metadata extraction.
//!
//! Three derivatives are produced per thumbable image, at fixed bounding
//! boxes, aspect ratio preserved. Opaque sources re-encode to JPEG,
//! transparent ones to PNG. All work here is CPU-bound blocking code; the
//! media pipeline runs it on the blocking pool.

use image::{ImageFormat, ImageReader};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

use crate::models::ThumbInfo;
use crate::pathgen;

/// Bounding boxes for the three derivative sizes.
pub const THUMB_SIZES: [(&str, u32); 3] = [("small", 150), ("medium", 300), ("large", 600)];

/// Image metadata recorded on the catalog row.
#[derive(Debug, Clone, Serialize)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub color_mode: String,
    pub has_transparency: bool,
    pub has_exif: bool,
}

/// Decode and describe an image. `None` when the bytes don't decode.
pub fn image_metadata(bytes: &[u8]) -> Option<ImageMeta> {
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .decode()
        .ok()?;

    Some(ImageMeta {
        width: decoded.width(),
        height: decoded.height(),
        color_mode: format!("{:?}", decoded.color()),
        has_transparency: decoded.color().has_alpha(),
        has_exif: has_exif_marker(bytes),
    })
}

/// Generate the three derivatives under `<root>/thumbnails/`.
///
/// Returns the descriptors for the files written. Fails as a unit: the
/// caller treats any error as a warning and keeps the ingest going.
pub fn generate_thumbnails(
    bytes: &[u8],
    canonical_rel: &str,
    storage_root: &Path,
) -> anyhow::Result<Vec<ThumbInfo>> {
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    let transparent = decoded.color().has_alpha();
    let (format, ext) = if transparent {
        (ImageFormat::Png, "png")
    } else {
        (ImageFormat::Jpeg, "jpg")
    };

    let thumbs_dir = storage_root.join("thumbnails");
    std::fs::create_dir_all(&thumbs_dir)?;

    let mut out = Vec::with_capacity(THUMB_SIZES.len());
    for (size_name, bound) in THUMB_SIZES {
        // Shrink-only: small sources keep their native size.
        let (tw, th) = fit_box(decoded.width(), decoded.height(), bound);
        let thumb = decoded.thumbnail_exact(tw, th);

        let mut encoded = Vec::new();
        if transparent {
            thumb
                .to_rgba8()
                .write_to(&mut Cursor::new(&mut encoded), format)?;
        } else {
            thumb
                .to_rgb8()
                .write_to(&mut Cursor::new(&mut encoded), format)?;
        }

        let rel = pathgen::thumb_path(canonical_rel, size_name, ext);
        let abs = storage_root.join(&rel);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&abs, &encoded)?;

        out.push(ThumbInfo {
            size: size_name.to_string(),
            path: rel,
            width: thumb.width(),
            height: thumb.height(),
            format: ext.to_string(),
        });
    }

    Ok(out)
}

/// Delete the derivatives described by `thumbs`. Missing files are fine.
pub fn remove_thumbnails(thumbs: &[ThumbInfo], storage_root: &Path) {
    for t in thumbs {
        let _ = std::fs::remove_file(storage_root.join(&t.path));
    }
}

/// Fit `(w, h)` inside a square bounding box without enlarging.
fn fit_box(w: u32, h: u32, bound: u32) -> (u32, u32) {
    if w <= bound && h <= bound {
        return (w, h);
    }
    let scale = bound as f64 / w.max(h) as f64;
    let tw = ((w as f64 * scale).round() as u32).max(1);
    let th = ((h as f64 * scale).round() as u32).max(1);
    (tw, th)
}

/// Scan a JPEG head for an APP1 Exif segment.
fn has_exif_marker(bytes: &[u8]) -> bool {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return false;
    }
    bytes
        .windows(8)
        .take(4096)
        .any(|w| w[0] == 0xFF && w[1] == 0xE1 && &w[4..8] == b"Exif")
}

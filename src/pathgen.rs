//! Canonical path synthesis for stored artifacts.
//!
//! Layout: `<category>/<YYYY>/<MM>/<DD>/<tenant>_<YYYYMMDD_HHMMSS>_<rand12>.<ext>`
//! with the timestamp in UTC and `rand12` drawn from the OS RNG. The date
//! subfolders keep directories small and the tree CDN-friendly.
//!
//! Collisions are practically unreachable; the pipeline retries with a
//! fresh nonce up to [`MAX_PATH_ATTEMPTS`] times before surfacing
//! `NameCollision`.

use chrono::{DateTime, Utc};
use rand::RngCore;
use std::path::Path;

/// Rename attempts before a collision is surfaced.
pub const MAX_PATH_ATTEMPTS: u32 = 3;

/// Synthesize the canonical relative path for an artifact.
pub fn synthesize(category: &str, tenant: &str, original_name: &str, now: DateTime<Utc>) -> String {
    let ext = Path::new(original_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    format!(
        "{}/{}/{}_{}_{}{}",
        category,
        now.format("%Y/%m/%d"),
        tenant,
        now.format("%Y%m%d_%H%M%S"),
        nonce12(),
        ext
    )
}

/// Thumbnail path for a canonical file: `thumbnails/<stem>_<size>.<fmt>`.
pub fn thumb_path(canonical_rel: &str, size: &str, format: &str) -> String {
    let stem = Path::new(canonical_rel)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| canonical_rel.to_string());
    format!("thumbnails/{}_{}.{}", stem, size, format)
}

/// 12 hex chars from the OS cryptographic RNG.
fn nonce12() -> String {
    let mut bytes = [0u8; 6];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap()
    }

    #[test]
    fn test_path_shape() {
        let p = synthesize("photos", "acme", "holiday.JPG", fixed_now());
        assert!(p.starts_with("photos/2024/03/09/acme_20240309_143005_"));
        assert!(p.ends_with(".jpg"));
        // category/YYYY/MM/DD/file
        assert_eq!(p.split('/').count(), 5);
    }

    #[test]
    fn test_nonce_is_12_hex_chars() {
        let p = synthesize("photos", "t1", "a.png", fixed_now());
        let file = p.rsplit('/').next().unwrap();
        let nonce = file
            .trim_end_matches(".png")
            .rsplit('_')
            .next()
            .unwrap();
        assert_eq!(nonce.len(), 12);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_no_extension() {
        let p = synthesize("other", "t1", "README", fixed_now());
        assert!(!p.contains('.'));
    }

    #[test]
    fn test_two_calls_differ_in_nonce() {
        let a = synthesize("photos", "t1", "x.jpg", fixed_now());
        let b = synthesize("photos", "t1", "x.jpg", fixed_now());
        assert_ne!(a, b);
    }

    #[test]
    fn test_thumb_path_uses_stem() {
        let p = thumb_path("photos/2024/03/09/t1_20240309_143005_ab12cd34ef56.jpg", "small", "jpg");
        assert_eq!(p, "thumbnails/t1_20240309_143005_ab12cd34ef56_small.jpg");
    }
}

//! Magic-byte MIME detection over the head of a stream.
//!
//! The media pipeline hands the first [`SNIFF_LEN`] bytes of an upload to
//! [`sniff_mime`] while streaming; nothing is ever rewound. Detection is a
//! plain signature table, most specific first. A `None` or generic answer
//! makes the classifier fall back to the declared MIME type.

/// How many leading bytes the pipeline buffers for detection.
pub const SNIFF_LEN: usize = 4096;

/// MIME types that carry no real signal for classification.
pub fn is_generic(mime: &str) -> bool {
    mime.is_empty() || mime == "application/octet-stream" || mime == "text/plain"
}

/// Detect a MIME type from leading bytes. Returns `None` when no
/// signature matches and the content does not look like UTF-8 text.
pub fn sniff_mime(head: &[u8]) -> Option<&'static str> {
    if head.is_empty() {
        return None;
    }

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        match &head[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wav"),
            b"AVI " => return Some("video/x-msvideo"),
            _ => {}
        }
    }
    if head.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    if head.starts_with(&[0x50, 0x4B, 0x03, 0x04]) || head.starts_with(&[0x50, 0x4B, 0x05, 0x06]) {
        return Some("application/zip");
    }
    if head.starts_with(&[0x1F, 0x8B]) {
        return Some("application/gzip");
    }
    if head.starts_with(b"BZh") {
        return Some("application/x-bzip2");
    }
    if head.starts_with(&[0xFD, b'7', b'z', b'X', b'Z', 0x00]) {
        return Some("application/x-xz");
    }
    if head.starts_with(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]) {
        return Some("application/x-7z-compressed");
    }
    if head.starts_with(&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07]) {
        return Some("application/x-rar-compressed");
    }
    if head.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if head.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if head.starts_with(b"ID3")
        || (head.len() >= 2 && head[0] == 0xFF && (head[1] == 0xFB || head[1] == 0xF3 || head[1] == 0xF2))
    {
        return Some("audio/mpeg");
    }
    // ISO base media (mp4/mov): size box then "ftyp"
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..10] {
            b"qt" => Some("video/quicktime"),
            _ => Some("video/mp4"),
        };
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/x-matroska");
    }
    if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        return Some("image/tiff");
    }
    if head.starts_with(b"BM") && head.len() > 14 {
        return Some("image/bmp");
    }
    if head.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        return Some("image/x-icon");
    }
    if head.starts_with(&[0x7F, b'E', b'L', b'F']) {
        return Some("application/x-executable");
    }
    if head.starts_with(b"MZ") {
        return Some("application/x-msdownload");
    }
    if looks_like_svg(head) {
        return Some("image/svg+xml");
    }
    if looks_like_text(head) {
        return Some("text/plain");
    }

    None
}

fn looks_like_svg(head: &[u8]) -> bool {
    let Ok(s) = std::str::from_utf8(head) else {
        return false;
    };
    let trimmed = s.trim_start();
    trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && trimmed.contains("<svg"))
}

/// Rough UTF-8 text heuristic: valid up to the last possibly-truncated
/// code point and free of NUL bytes.
fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.valid_up_to() + 4 > head.len() && e.valid_up_to() > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_signatures() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(
            sniff_mime(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]),
            Some("image/png")
        );
        assert_eq!(sniff_mime(b"GIF89a......"), Some("image/gif"));
        assert_eq!(sniff_mime(b"%PDF-1.7 blah"), Some("application/pdf"));
        assert_eq!(sniff_mime(&[0x50, 0x4B, 0x03, 0x04, 1, 2]), Some("application/zip"));
    }

    #[test]
    fn test_riff_containers_disambiguate() {
        assert_eq!(sniff_mime(b"RIFF\x10\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_mime(b"RIFF\x10\x00\x00\x00WAVEfmt "), Some("audio/wav"));
    }

    #[test]
    fn test_mp4_ftyp() {
        let head = [0u8, 0, 0, 24, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm'];
        assert_eq!(sniff_mime(&head), Some("video/mp4"));
        let qt = [0u8, 0, 0, 24, b'f', b't', b'y', b'p', b'q', b't', b' ', b' '];
        assert_eq!(sniff_mime(&qt), Some("video/quicktime"));
    }

    #[test]
    fn test_text_heuristic() {
        assert_eq!(sniff_mime(b"hello, plain world\n"), Some("text/plain"));
        assert_eq!(sniff_mime(&[0x00, 0x01, 0x02, 0x03]), None);
    }

    #[test]
    fn test_svg_detection() {
        assert_eq!(sniff_mime(b"<svg xmlns=\"x\">"), Some("image/svg+xml"));
        assert_eq!(
            sniff_mime(b"<?xml version=\"1.0\"?><svg>"),
            Some("image/svg+xml")
        );
    }

    #[test]
    fn test_generic_classification() {
        assert!(is_generic("application/octet-stream"));
        assert!(is_generic("text/plain"));
        assert!(is_generic(""));
        assert!(!is_generic("image/png"));
    }

    #[test]
    fn test_empty_head() {
        assert_eq!(sniff_mime(&[]), None);
    }
}

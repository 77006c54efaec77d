//! Text extraction for the indexing pipeline.
//!
//! Only categories with meaningful text are indexable. Plain-text
//! categories are read as UTF-8 (lossy); HTML gets a tag strip that also
//! drops `<script>` and `<style>` contents. Binary categories yield
//! nothing and are skipped by reindex.

/// Categories whose stored bytes can be turned into indexable text.
pub fn is_indexable(category: &str) -> bool {
    matches!(
        category,
        "text"
            | "markdown"
            | "html"
            | "css"
            | "javascript"
            | "typescript"
            | "python"
            | "java"
            | "cpp"
            | "csharp"
            | "ruby"
            | "php"
            | "go"
            | "rust"
            | "swift"
            | "kotlin"
            | "json"
            | "xml"
            | "yaml"
            | "csv"
            | "sql"
            | "config"
            | "shell_scripts"
            | "subtitles"
    )
}

/// Extract indexable text from stored bytes. Empty result means there is
/// nothing to index.
pub fn extract_text(bytes: &[u8], category: &str) -> String {
    if !is_indexable(category) {
        return String::new();
    }
    let raw = String::from_utf8_lossy(bytes);
    match category {
        "html" => strip_html(&raw),
        _ => raw.into_owned(),
    }
}

/// Minimal tag stripper: removes markup, skips script/style bodies,
/// collapses entities it knows about.
///
/// Scans bytes; `<` and `>` are ASCII so every split lands on a char
/// boundary.
fn strip_html(html: &str) -> String {
    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len() / 2);

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if tag_starts(bytes, i, b"script") {
                i = skip_until_close(bytes, i, b"</script");
            } else if tag_starts(bytes, i, b"style") {
                i = skip_until_close(bytes, i, b"</style");
            } else {
                while i < bytes.len() && bytes[i] != b'>' {
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push(' ');
            }
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            out.push_str(&html[start..i]);
        }
    }

    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tag_starts(bytes: &[u8], i: usize, name: &[u8]) -> bool {
    bytes.len() > i + name.len()
        && bytes[i + 1..i + 1 + name.len().min(bytes.len() - i - 1)].eq_ignore_ascii_case(name)
}

fn skip_until_close(bytes: &[u8], mut i: usize, close: &[u8]) -> usize {
    while i < bytes.len() {
        if bytes[i..].len() >= close.len() && bytes[i..i + close.len()].eq_ignore_ascii_case(close) {
            while i < bytes.len() && bytes[i] != b'>' {
                i += 1;
            }
            return (i + 1).min(bytes.len());
        }
        i += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexable_categories() {
        assert!(is_indexable("text"));
        assert!(is_indexable("markdown"));
        assert!(is_indexable("rust"));
        assert!(!is_indexable("photos"));
        assert!(!is_indexable("videos_mp4"));
        assert!(!is_indexable("zip"));
    }

    #[test]
    fn test_plain_text_passthrough() {
        let text = extract_text(b"hello world", "text");
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_binary_category_yields_nothing() {
        let text = extract_text(&[0xFF, 0xD8, 0xFF], "photos");
        assert!(text.is_empty());
    }

    #[test]
    fn test_html_strip() {
        let html = b"<html><head><style>p{color:red}</style></head>\
                     <body><h1>Title</h1><p>Hello &amp; welcome</p>\
                     <script>var x = 1;</script></body></html>";
        let text = extract_text(html, "html");
        assert!(text.contains("Title"));
        assert!(text.contains("Hello & welcome"));
        assert!(!text.contains("color:red"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_html_without_tags() {
        assert_eq!(extract_text(b"just words", "html"), "just words");
    }
}

//! Separator-preferring text chunker.
//!
//! Splits indexable text into overlapping windows of roughly
//! `target_chars` bytes. At each cut the latest separator from
//! [`SEPARATORS`] whose end lands within `target ± SLACK` wins; when none
//! does, the cut is hard at `target` (clamped to a char boundary). The next
//! window starts `overlap_chars` before the cut, so consecutive chunks
//! share that much text and nothing is ever skipped.
//!
//! The function is pure and deterministic for a given parameter pair.
//! Empty or whitespace-only windows are dropped and ordinals close up, so
//! chunk ordinals always form a contiguous prefix starting at 0.

/// Cut-point candidates, most preferred first. The empty string stands for
/// the hard cut fallback.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// How far either side of `target_chars` a separator may land.
const SLACK: usize = 50;

/// Split `text` into ordered chunk texts. Ordinals are implied by position.
pub fn chunk_text(text: &str, target_chars: usize, overlap_chars: usize) -> Vec<String> {
    debug_assert!(target_chars > 0 && overlap_chars < target_chars);

    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let cut = if len - start <= target_chars + SLACK {
            len
        } else {
            pick_cut(text, start, target_chars)
        };

        let piece = text[start..cut].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if cut >= len {
            break;
        }

        // Overlap: back the next window up from the cut, never past start.
        let mut next = cut.saturating_sub(overlap_chars).max(start + 1);
        while next < len && !text.is_char_boundary(next) {
            next += 1;
        }
        start = next;
    }

    chunks
}

/// Find the best cut position in the window starting at `start`.
fn pick_cut(text: &str, start: usize, target: usize) -> usize {
    let lo = start + target.saturating_sub(SLACK);
    let hi = (start + target + SLACK).min(text.len());
    let window = &text[start..hi];

    for sep in SEPARATORS {
        // Latest occurrence whose end falls inside [lo, hi].
        if let Some(pos) = window.rfind(sep) {
            let cut = start + pos + sep.len();
            if cut >= lo && cut <= hi {
                return cut;
            }
        }
    }

    // Hard cut at target, clamped to a char boundary.
    let mut cut = start + target;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    // A pathological window (one giant multi-byte run) could clamp back to
    // start; force progress.
    if cut <= start {
        cut = start + target;
        while cut < text.len() && !text.is_char_boundary(cut) {
            cut += 1;
        }
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 500, 50);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_yield_nothing() {
        assert!(chunk_text("", 500, 50).is_empty());
        assert!(chunk_text("   \n\n  \t ", 500, 50).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. ".repeat(100);
        let a = chunk_text(&text, 200, 20);
        let b = chunk_text(&text, 200, 20);
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn test_prefers_paragraph_break() {
        // A paragraph break sits just inside the slack window.
        let mut text = "a".repeat(480);
        text.push_str("\n\n");
        text.push_str(&"b".repeat(400));
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks[0], "a".repeat(480));
        // The second window starts inside the overlap and runs into the b's.
        assert!(chunks[1].contains('b'));
    }

    #[test]
    fn test_sentence_break_beats_space() {
        let mut text = "x".repeat(460);
        text.push_str(". ");
        text.push_str(&"word ".repeat(120));
        let chunks = chunk_text(&text, 500, 50);
        assert!(chunks[0].ends_with("x."), "cut should land after the sentence");
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "z".repeat(1200);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks[0].len(), 500);
        // Window advances by target - overlap.
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn test_overlap_between_consecutive_chunks() {
        let text = "z".repeat(1200);
        let chunks = chunk_text(&text, 500, 50);
        // With a uniform text the tail of chunk N is the head of chunk N+1.
        let tail: String = chunks[0].chars().rev().take(50).collect();
        let head: String = chunks[1].chars().take(50).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn test_multibyte_text_never_splits_a_char() {
        let text = "héllo wörld ünïcode ".repeat(60);
        let chunks = chunk_text(&text, 100, 10);
        // Reaching here without a panic proves the cuts hit char
        // boundaries; also confirm nothing got lost at the seams.
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_covers_all_content() {
        let words: Vec<String> = (0..300).map(|i| format!("word{}", i)).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 400, 40);
        let joined = chunks.join(" ");
        for w in &words {
            assert!(joined.contains(w.as_str()), "{} missing from chunks", w);
        }
    }
}

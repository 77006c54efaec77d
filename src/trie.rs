//! In-memory prefix/fuzzy index over tokens from indexed chunk text.
//!
//! The index is a cache: it is rebuilt from the chunk table at startup and
//! updated after chunk transactions commit, never the other way round.
//! Callers wrap it in a reader-writer lock (single writer, many readers).
//!
//! Tokenization splits on non-alphanumerics, lowercases, drops tokens
//! shorter than 2 or longer than 50 chars, and removes stop words. Each
//! terminal node carries the set of source files containing the token and
//! a frequency counter (number of indexed files carrying it).
//!
//! - `autocomplete(prefix, k)` — O(|prefix| + S) descent plus DFS over the
//!   subtree; top `k` by frequency, ties lexicographic.
//! - `exact(token)` — O(|token|).
//! - `fuzzy(token, max_edits)` — DFS bounded by an incremental Levenshtein
//!   DP row, pruned when the row minimum exceeds the cap. The cap is
//!   clamped to [`MAX_EDIT_DISTANCE`].

use std::collections::{BTreeMap, HashSet};

/// Hard cap on fuzzy edit distance.
pub const MAX_EDIT_DISTANCE: usize = 2;

const MIN_TOKEN_LEN: usize = 2;
const MAX_TOKEN_LEN: usize = 50;

/// Built-in stop words, skipped at indexing and query time.
pub const STOP_WORDS: [&str; 19] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "is",
    "are", "was", "were", "be", "been",
];

#[derive(Debug, Default)]
struct Node {
    // BTreeMap keeps DFS order lexicographic, which fixes tie-breaks.
    children: BTreeMap<char, Node>,
    terminal: bool,
    files: HashSet<String>,
    frequency: u64,
}

/// The token index.
#[derive(Debug)]
pub struct TokenIndex {
    root: Node,
    stop_words: HashSet<String>,
    token_count: usize,
}

impl TokenIndex {
    pub fn new() -> TokenIndex {
        TokenIndex::with_stop_words(&[])
    }

    /// Extra stop words are merged into the built-in set.
    pub fn with_stop_words(extra: &[String]) -> TokenIndex {
        let mut stop_words: HashSet<String> =
            STOP_WORDS.iter().map(|s| s.to_string()).collect();
        stop_words.extend(extra.iter().map(|s| s.to_lowercase()));
        TokenIndex {
            root: Node::default(),
            stop_words,
            token_count: 0,
        }
    }

    /// Number of distinct indexed tokens.
    pub fn len(&self) -> usize {
        self.token_count
    }

    pub fn is_empty(&self) -> bool {
        self.token_count == 0
    }

    /// Split text into the unique tokens the index would store for it.
    pub fn tokenize(&self, text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .map(|t| t.to_lowercase())
            .filter(|t| {
                let n = t.chars().count();
                n >= MIN_TOKEN_LEN && n <= MAX_TOKEN_LEN && !self.stop_words.contains(t)
            })
            .collect()
    }

    /// Index one file's text: every unique token gets a posting for it.
    pub fn index_text(&mut self, file_id: &str, text: &str) {
        for token in self.tokenize(text) {
            self.insert(&token, file_id);
        }
    }

    fn insert(&mut self, token: &str, file_id: &str) {
        let mut node = &mut self.root;
        for ch in token.chars() {
            node = node.children.entry(ch).or_default();
        }
        if !node.terminal {
            node.terminal = true;
            self.token_count += 1;
        }
        if node.files.insert(file_id.to_string()) {
            node.frequency += 1;
        }
    }

    /// Drop all postings for a file, pruning tokens that lose their last one.
    pub fn remove_file(&mut self, file_id: &str) {
        let removed = Self::remove_from(&mut self.root, file_id);
        self.token_count -= removed;
    }

    fn remove_from(node: &mut Node, file_id: &str) -> usize {
        let mut removed = 0;
        if node.terminal && node.files.remove(file_id) {
            node.frequency = node.frequency.saturating_sub(1);
            if node.files.is_empty() {
                node.terminal = false;
                removed += 1;
            }
        }
        node.children.retain(|_, child| {
            removed += Self::remove_from(child, file_id);
            child.terminal || !child.children.is_empty()
        });
        removed
    }

    /// Source files whose text contains the exact token.
    pub fn exact(&self, token: &str) -> Vec<String> {
        let token = token.to_lowercase();
        match self.find_node(&token) {
            Some(node) if node.terminal => {
                let mut files: Vec<String> = node.files.iter().cloned().collect();
                files.sort();
                files
            }
            _ => Vec::new(),
        }
    }

    /// Top-`k` completions of `prefix` by frequency, ties lexicographic.
    pub fn autocomplete(&self, prefix: &str, k: usize) -> Vec<(String, u64)> {
        let prefix = prefix.to_lowercase();
        let Some(node) = self.find_node(&prefix) else {
            return Vec::new();
        };

        let mut collected = Vec::new();
        Self::collect(node, &prefix, &mut collected);
        collected.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        collected.truncate(k);
        collected
    }

    /// Postings for a token found by autocomplete/fuzzy.
    pub fn postings(&self, token: &str) -> Vec<String> {
        self.exact(token)
    }

    /// Tokens within `max_edits` Levenshtein distance of `token`,
    /// ordered by (distance, token).
    pub fn fuzzy(&self, token: &str, max_edits: usize) -> Vec<String> {
        let max_edits = max_edits.min(MAX_EDIT_DISTANCE);
        let word: Vec<char> = token.to_lowercase().chars().collect();
        if word.is_empty() {
            return Vec::new();
        }

        let first_row: Vec<usize> = (0..=word.len()).collect();
        let mut results: Vec<(usize, String)> = Vec::new();

        for (ch, child) in &self.root.children {
            Self::fuzzy_walk(child, *ch, String::new(), &word, &first_row, max_edits, &mut results);
        }

        results.sort();
        results.into_iter().map(|(_, t)| t).collect()
    }

    fn fuzzy_walk(
        node: &Node,
        ch: char,
        prefix: String,
        word: &[char],
        prev_row: &[usize],
        max_edits: usize,
        results: &mut Vec<(usize, String)>,
    ) {
        let mut row = Vec::with_capacity(word.len() + 1);
        row.push(prev_row[0] + 1);
        for i in 1..=word.len() {
            let insert_cost = row[i - 1] + 1;
            let delete_cost = prev_row[i] + 1;
            let replace_cost = prev_row[i - 1] + usize::from(word[i - 1] != ch);
            row.push(insert_cost.min(delete_cost).min(replace_cost));
        }

        let mut current = prefix;
        current.push(ch);

        let distance = *row.last().expect("row is non-empty");
        if node.terminal && distance <= max_edits {
            results.push((distance, current.clone()));
        }

        // Prune: no extension can reduce the row below its minimum.
        if row.iter().min().copied().unwrap_or(usize::MAX) <= max_edits {
            for (next_ch, child) in &node.children {
                Self::fuzzy_walk(child, *next_ch, current.clone(), word, &row, max_edits, results);
            }
        }
    }

    fn find_node(&self, token: &str) -> Option<&Node> {
        let mut node = &self.root;
        for ch in token.chars() {
            node = node.children.get(&ch)?;
        }
        Some(node)
    }

    fn collect(node: &Node, prefix: &str, out: &mut Vec<(String, u64)>) {
        if node.terminal {
            out.push((prefix.to_string(), node.frequency));
        }
        for (ch, child) in &node.children {
            let mut next = prefix.to_string();
            next.push(*ch);
            Self::collect(child, &next, out);
        }
    }
}

impl Default for TokenIndex {
    fn default() -> Self {
        TokenIndex::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> TokenIndex {
        let mut idx = TokenIndex::new();
        idx.index_text("f1", "neural network training with neural nets");
        idx.index_text("f2", "network latency measurements");
        idx.index_text("f3", "sourdough baking network notes");
        idx
    }

    #[test]
    fn test_tokenize_rules() {
        let idx = TokenIndex::new();
        let tokens = idx.tokenize("The quick-brown FOX, a 1x run!! of doom");
        assert!(tokens.contains("quick"));
        assert!(tokens.contains("brown"));
        assert!(tokens.contains("fox"));
        assert!(tokens.contains("1x"));
        assert!(tokens.contains("run"));
        assert!(tokens.contains("doom"));
        // stop words and single chars dropped
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("a"));
        assert!(!tokens.contains("of"));
    }

    #[test]
    fn test_tokenize_drops_overlong_tokens() {
        let idx = TokenIndex::new();
        let long = "x".repeat(51);
        assert!(idx.tokenize(&long).is_empty());
        let ok = "y".repeat(50);
        assert_eq!(idx.tokenize(&ok).len(), 1);
    }

    #[test]
    fn test_exact_postings() {
        let idx = sample_index();
        assert_eq!(idx.exact("network"), vec!["f1", "f2", "f3"]);
        assert_eq!(idx.exact("sourdough"), vec!["f3"]);
        assert!(idx.exact("missing").is_empty());
        // prefix of a token is not an exact hit
        assert!(idx.exact("netw").is_empty());
    }

    #[test]
    fn test_autocomplete_orders_by_frequency_then_lex() {
        let idx = sample_index();
        let completions = idx.autocomplete("ne", 10);
        // "network" appears in 3 files, "nets" and "neural" in 1 each.
        assert_eq!(completions[0].0, "network");
        assert_eq!(completions[0].1, 3);
        let rest: Vec<&str> = completions[1..].iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(rest, vec!["nets", "neural"]);
    }

    #[test]
    fn test_autocomplete_respects_k() {
        let idx = sample_index();
        assert_eq!(idx.autocomplete("ne", 1).len(), 1);
        assert!(idx.autocomplete("zzz", 5).is_empty());
    }

    #[test]
    fn test_fuzzy_within_two_edits() {
        let idx = sample_index();
        let hits = idx.fuzzy("netwrk", 2); // one deletion away
        assert!(hits.contains(&"network".to_string()));
        let hits = idx.fuzzy("nxtwxrk", 2); // two substitutions
        assert!(hits.contains(&"network".to_string()));
        let hits = idx.fuzzy("nxtwxrx", 2); // three edits, out of range
        assert!(!hits.contains(&"network".to_string()));
    }

    #[test]
    fn test_fuzzy_cap_is_enforced() {
        let idx = sample_index();
        // Asking for 5 edits still only allows 2.
        let hits = idx.fuzzy("nxtxxrk", 5);
        assert!(!hits.contains(&"network".to_string()));
    }

    #[test]
    fn test_fuzzy_exact_match_has_distance_zero_first() {
        let idx = sample_index();
        let hits = idx.fuzzy("network", 2);
        assert_eq!(hits[0], "network");
    }

    #[test]
    fn test_remove_file_drops_postings_and_prunes() {
        let mut idx = sample_index();
        let before = idx.len();
        idx.remove_file("f3");
        assert_eq!(idx.exact("sourdough"), Vec::<String>::new());
        assert_eq!(idx.exact("network"), vec!["f1", "f2"]);
        assert!(idx.len() < before);
        // autocomplete no longer surfaces pruned tokens
        assert!(idx
            .autocomplete("sour", 10)
            .iter()
            .all(|(t, _)| t != "sourdough"));
    }

    #[test]
    fn test_frequency_counts_files_not_occurrences() {
        let idx = sample_index();
        // "neural" occurs twice in f1 but frequency counts the file once.
        let completions = idx.autocomplete("neural", 10);
        assert_eq!(completions[0].1, 1);
    }
}

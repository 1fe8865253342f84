//! Text normalization and merge primitives shared by every engine.
//!
//! All cross-hypothesis comparisons go through [`normalize`]: lowercase,
//! whitespace collapsed. Merging two hypotheses goes through
//! [`merge_with_overlap`], the hottest operation in the pipeline.

/// Minimum boundary overlap (in characters) for [`merge_with_overlap`].
pub const MIN_OVERLAP: usize = 3;

/// Finals shorter than this that end with a period are still checked against
/// the known-incomplete prefixes before being trusted as sentence ends.
pub const FALSE_FINAL_MAX_LEN: usize = 25;

/// Phrase stems the ASR likes to emit as "complete" finals with a trailing
/// period even though the speaker is mid-sentence.
const KNOWN_INCOMPLETE_PREFIXES: &[&str] = &[
    "i've",
    "i have",
    "you just can't",
    "you can't",
    "we have",
    "we've",
    "they have",
    "they've",
    "it has",
    "it's",
];

/// Lowercase + collapse all whitespace runs to single spaces.
///
/// Lowercasing is per-char so that `normalize(a + b)` always starts with
/// `normalize(a)` — `str::to_lowercase` is context-sensitive at word ends.
pub fn normalize(s: &str) -> String {
    fold_lower(&collapse_whitespace(s))
}

fn fold_lower(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Collapse whitespace without touching case. Used when the merged output is
/// shown to the user.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `a` extends `base` when, under normalization, it starts with `base` and
/// is strictly longer.
pub fn extends(a: &str, base: &str) -> bool {
    let a = normalize(a);
    let base = normalize(base);
    a.len() > base.len() && a.starts_with(&base)
}

/// Lowercased tokens with leading/trailing punctuation stripped. Empty
/// tokens (pure punctuation) are dropped.
pub fn tokenize(s: &str) -> Vec<String> {
    s.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Merge `curr` onto `prev` when they share a boundary.
///
/// Succeeds when `curr` starts with `prev` (case-insensitive, whitespace
/// normalized) or when a suffix of `prev` of length >= [`MIN_OVERLAP`]
/// equals a prefix of `curr`. Returns the merged text with collapsed
/// whitespace, or `None` when no boundary of sufficient length exists.
pub fn merge_with_overlap(prev: &str, curr: &str) -> Option<String> {
    let prev_flat = collapse_whitespace(prev);
    let curr_flat = collapse_whitespace(curr);

    if prev_flat.is_empty() {
        return Some(curr_flat);
    }
    if curr_flat.is_empty() {
        return None;
    }

    let prev_lower = fold_lower(&prev_flat);
    let curr_lower = fold_lower(&curr_flat);

    if curr_lower.starts_with(&prev_lower) {
        return Some(curr_flat);
    }

    // Per-char lowercase keeps indices aligned with the display strings
    // (full to_lowercase() can change the char count).
    let fold = |c: char| c.to_lowercase().next().unwrap_or(c);
    let prev_chars: Vec<char> = prev_flat.chars().map(fold).collect();
    let curr_chars: Vec<char> = curr_flat.chars().map(fold).collect();
    let max_overlap = prev_chars.len().min(curr_chars.len());

    for k in (MIN_OVERLAP..=max_overlap).rev() {
        if prev_chars[prev_chars.len() - k..] == curr_chars[..k] {
            let tail: String = curr_flat.chars().skip(k).collect();
            return Some(collapse_whitespace(&format!("{prev_flat}{tail}")));
        }
    }

    None
}

/// Join two consecutive finals that belong to one segment.
///
/// Used when a final arrives hot on the heels of the previous one: prefer
/// the extension, then the overlap merge; as a last resort, when the first
/// final never finished its sentence, the second is its continuation and
/// the two concatenate. Returns `None` when the finals are unrelated.
pub fn merge_continuation(prev: &str, curr: &str) -> Option<String> {
    if extends(curr, prev) {
        return Some(collapse_whitespace(curr));
    }
    if let Some(merged) = merge_with_overlap(prev, curr) {
        return Some(merged);
    }
    if !ends_with_complete_sentence(prev) {
        return Some(collapse_whitespace(&format!("{prev} {curr}")));
    }
    None
}

/// True iff the trimmed text ends with terminal punctuation, optionally
/// followed by closing quotes/brackets.
pub fn ends_with_complete_sentence(s: &str) -> bool {
    let trimmed = s
        .trim_end()
        .trim_end_matches(['"', '\'', '”', '’', ')', ']', '}']);
    trimmed
        .chars()
        .next_back()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | '…'))
}

/// A short final ending with a period whose stem matches a known-incomplete
/// phrase. The terminal punctuation is a lie; the speaker is mid-sentence.
pub fn is_false_final(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.len() >= FALSE_FINAL_MAX_LEN || !trimmed.ends_with('.') {
        return false;
    }
    let stem = normalize(trimmed.trim_end_matches('.'));
    KNOWN_INCOMPLETE_PREFIXES.contains(&stem.as_str())
}

/// Plain Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - dist / max(len)`, in `[0, 1]`. Identical tokens score 1.0.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    // ── normalize / extends ──────────────────────────────────────────────

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize("  Hello   WORLD "), "hello world");
    }

    #[test]
    fn extends_requires_strictly_longer() {
        assert!(extends("hello world", "hello"));
        assert!(!extends("hello", "hello"));
        assert!(!extends("hell", "hello"));
    }

    #[test]
    fn extends_is_case_and_spacing_insensitive() {
        assert!(extends("Hello  world today", "hello world"));
    }

    // ── tokenize ─────────────────────────────────────────────────────────

    #[test]
    fn tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("Hello, world! (again)"),
            ["hello", "world", "again"]
        );
    }

    #[test]
    fn tokenize_keeps_inner_apostrophes() {
        assert_eq!(tokenize("can't stop"), ["can't", "stop"]);
    }

    #[test]
    fn tokenize_drops_pure_punctuation() {
        assert_eq!(tokenize("... -- !"), Vec::<String>::new());
    }

    // ── merge_with_overlap ───────────────────────────────────────────────

    #[test]
    fn merge_prefix_extension() {
        assert_eq!(
            merge_with_overlap("Where two or three", "where two or three are gathered").as_deref(),
            Some("where two or three are gathered")
        );
    }

    #[test]
    fn merge_boundary_overlap() {
        assert_eq!(
            merge_with_overlap("life is best spent", "spent fulfilling our own").as_deref(),
            Some("life is best spent fulfilling our own")
        );
    }

    #[test]
    fn merge_rejects_short_overlap() {
        // only "t " (2 chars) overlaps
        assert_eq!(merge_with_overlap("we met", "t a friend"), None);
    }

    #[test]
    fn merge_rejects_disjoint_texts() {
        assert_eq!(merge_with_overlap("hello world", "completely different"), None);
    }

    #[test]
    fn merge_reflexive() {
        assert_eq!(
            merge_with_overlap("hello world", "hello world").as_deref(),
            Some("hello world")
        );
    }

    #[test]
    fn merge_normalizes_whitespace() {
        assert_eq!(
            merge_with_overlap("hello  world", "hello world  today").as_deref(),
            Some("hello world today")
        );
    }

    #[quickcheck]
    fn merge_self_is_identity(s: String) -> bool {
        let flat = collapse_whitespace(&s);
        match merge_with_overlap(&flat, &flat) {
            Some(merged) => merged == flat,
            None => flat.chars().count() < MIN_OVERLAP,
        }
    }

    #[quickcheck]
    fn merge_result_starts_with_prev(prev: String, curr: String) -> bool {
        match merge_with_overlap(&prev, &curr) {
            Some(merged) => normalize(&merged).starts_with(&normalize(&prev)),
            None => true,
        }
    }

    // ── merge_continuation ───────────────────────────────────────────────

    #[test]
    fn continuation_prefers_extension() {
        assert_eq!(
            merge_continuation("Where two", "Where two or three").as_deref(),
            Some("Where two or three")
        );
    }

    #[test]
    fn continuation_appends_after_incomplete_sentence() {
        assert_eq!(
            merge_continuation("Where two or three", "are gathered together.").as_deref(),
            Some("Where two or three are gathered together.")
        );
    }

    #[test]
    fn continuation_rejects_after_complete_sentence() {
        assert_eq!(
            merge_continuation("That is all.", "Something unrelated follows"),
            None
        );
    }

    // ── sentence detection ───────────────────────────────────────────────

    #[test]
    fn complete_sentences_detected() {
        assert!(ends_with_complete_sentence("We are done."));
        assert!(ends_with_complete_sentence("Really?"));
        assert!(ends_with_complete_sentence("Stop!"));
        assert!(ends_with_complete_sentence("and then…"));
        assert!(ends_with_complete_sentence("he said \"go.\""));
        assert!(ends_with_complete_sentence("(as expected.)"));
    }

    #[test]
    fn incomplete_sentences_detected() {
        assert!(!ends_with_complete_sentence("We are"));
        assert!(!ends_with_complete_sentence("trailing comma,"));
        assert!(!ends_with_complete_sentence(""));
    }

    // ── false finals ─────────────────────────────────────────────────────

    #[test]
    fn known_incomplete_stem_is_false_final() {
        assert!(is_false_final("You just can't."));
        assert!(is_false_final("I've."));
        assert!(is_false_final("We have."));
    }

    #[test]
    fn ordinary_short_sentence_is_not_false_final() {
        assert!(!is_false_final("Stop now."));
        assert!(!is_false_final("You just can't"));
    }

    #[test]
    fn long_finals_are_never_false_finals() {
        assert!(!is_false_final(
            "I've been to grocery stores that were friendlier."
        ));
    }

    // ── levenshtein / similarity ─────────────────────────────────────────

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn similarity_of_near_tokens() {
        assert!(token_similarity("spent", "spend") >= 0.72);
        assert!(token_similarity("own", "fulfilling") < 0.72);
        assert_eq!(token_similarity("best", "best"), 1.0);
    }

    #[quickcheck]
    fn levenshtein_symmetric(a: String, b: String) -> bool {
        levenshtein(&a, &b) == levenshtein(&b, &a)
    }
}

//! Smart-merge of recovered audio transcripts into the forced-final prefix.
//!
//! When the provider rotates its stream it drops words in the decoder gap
//! just before the cut. We replay that audio window through a secondary
//! recognizer and splice its short transcript (`recovered`) back onto the
//! committed prefix (`buffered`). Three tiers, first success wins.

use crate::text;

const FUZZY_WINDOW: usize = 6;
const FUZZY_MIN_TOKEN_LEN: usize = 2;
const FUZZY_THRESHOLD: f64 = 0.72;

/// How the two sides were joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryMerge {
    /// Tier 1/2: a shared anchor token was found. When the recovered text
    /// ends at the anchor this equals `buffered` — recovery only confirmed
    /// the tail.
    Anchored(String),
    /// Tier 3: no anchor; the full recovered text appended.
    Appended(String),
}

impl RecoveryMerge {
    pub fn text(&self) -> &str {
        match self {
            Self::Anchored(t) | Self::Appended(t) => t,
        }
    }
}

/// Run the three-tier merge. Returns `None` only when `recovered` carries no
/// usable text.
pub fn merge_recovered(buffered: &str, recovered: &str) -> Option<RecoveryMerge> {
    let buffered_words: Vec<&str> = buffered.split_whitespace().collect();
    let recovered_words: Vec<&str> = recovered.split_whitespace().collect();

    if recovered_words.is_empty() {
        return None;
    }
    if buffered_words.is_empty() {
        return Some(RecoveryMerge::Appended(text::collapse_whitespace(recovered)));
    }

    let buffered_norm: Vec<String> = buffered_words.iter().map(|w| norm_token(w)).collect();
    let recovered_norm: Vec<String> = recovered_words.iter().map(|w| norm_token(w)).collect();

    // Tier 1 — exact single-word anchor. Scan the buffered tail right-to-left
    // for the first token the recovery window also heard.
    for b_idx in (0..buffered_words.len()).rev() {
        if buffered_norm[b_idx].is_empty() {
            continue;
        }
        for r_idx in 0..recovered_words.len() {
            if buffered_norm[b_idx] == recovered_norm[r_idx] {
                return Some(RecoveryMerge::Anchored(splice(
                    &buffered_words,
                    b_idx,
                    buffered,
                    &recovered_words,
                    r_idx,
                )));
            }
        }
    }

    // Tier 2 — fuzzy anchor over the last few buffered tokens.
    let window_start = buffered_words.len().saturating_sub(FUZZY_WINDOW);
    let mut best: Option<(f64, usize, usize)> = None;
    for b_idx in (window_start..buffered_words.len()).rev() {
        if buffered_norm[b_idx].chars().count() < FUZZY_MIN_TOKEN_LEN {
            continue;
        }
        for r_idx in 0..recovered_words.len() {
            if recovered_norm[r_idx].chars().count() < FUZZY_MIN_TOKEN_LEN {
                continue;
            }
            let similarity = text::token_similarity(&buffered_norm[b_idx], &recovered_norm[r_idx]);
            if similarity >= FUZZY_THRESHOLD
                && best.is_none_or(|(best_sim, _, _)| similarity > best_sim)
            {
                best = Some((similarity, b_idx, r_idx));
            }
        }
    }
    if let Some((_, b_idx, r_idx)) = best {
        return Some(RecoveryMerge::Anchored(splice(
            &buffered_words,
            b_idx,
            buffered,
            &recovered_words,
            r_idx,
        )));
    }

    // Tier 3 — append. Deliberately permissive: the decoder gap may have
    // swallowed a unique word that appears on neither side.
    Some(RecoveryMerge::Appended(text::collapse_whitespace(&format!(
        "{buffered} {recovered}"
    ))))
}

/// Apply the caller rule: accept the merge iff it grows the text, or an
/// anchored merge confirmed the existing tail.
pub fn apply_recovery(buffered: &str, recovered: &str) -> Option<String> {
    let buffered_flat = text::collapse_whitespace(buffered);
    match merge_recovered(buffered, recovered)? {
        RecoveryMerge::Anchored(merged)
            if merged.len() > buffered_flat.len() || merged == buffered_flat =>
        {
            Some(merged)
        }
        RecoveryMerge::Appended(merged) if merged.len() > buffered_flat.len() => Some(merged),
        _ => None,
    }
}

fn norm_token(w: &str) -> String {
    w.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Join `buffered[..=b_idx]` with `recovered[r_idx+1..]`. When the recovered
/// tail is empty, recovery only confirmed the tail — keep the full buffered
/// text. Otherwise the recovered continuation replaces whatever the cut left
/// after the anchor.
fn splice(
    buffered_words: &[&str],
    b_idx: usize,
    buffered_full: &str,
    recovered_words: &[&str],
    r_idx: usize,
) -> String {
    let tail = &recovered_words[r_idx + 1..];
    if tail.is_empty() {
        return text::collapse_whitespace(buffered_full);
    }

    let mut parts: Vec<&str> = buffered_words[..=b_idx].to_vec();
    parts.extend_from_slice(tail);
    parts.join(" ")
}

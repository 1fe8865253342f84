use std::time::Instant;

use crate::config::SegmenterConfig;
use crate::partials::PartialSnapshot;
use crate::text;
use crate::types::{CommittedFinal, FinalSource};

/// A final the engine has received but is deliberately holding, because the
/// ASR often emits short/incomplete finals that continue as partials.
#[derive(Debug, Clone)]
pub struct PendingFinalization {
    pub text: String,
    pub seq_id: Option<u64>,
    pub created_at: Instant,
    deadline: Instant,
}

/// What the engine wants the session to do with an arriving partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialDisposition {
    /// No pending finalization exists; process the partial normally.
    NoPending,
    /// The partial extended the pending text; keep holding.
    Extended,
    /// The partial starts a new segment; commit the pending first.
    CommitNow,
    /// The partial arrived within the grace window; assume it is the tail
    /// of the same segment and keep holding.
    Hold,
}

/// Holds at most one pending finalization and decides when it commits.
///
/// The engine owns its deadline as state; the session task sleeps on
/// [`FinalizationEngine::deadline`] and calls
/// [`FinalizationEngine::take_for_commit`] when it fires.
pub struct FinalizationEngine {
    config: SegmenterConfig,
    pending: Option<PendingFinalization>,
}

impl FinalizationEngine {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            pending: None,
        }
    }

    /// An organic final is held instead of committed when its text is not a
    /// complete sentence, or when its terminal punctuation is a known lie.
    pub fn should_hold(text: &str) -> bool {
        !text::ends_with_complete_sentence(text) || text::is_false_final(text)
    }

    /// Store a pending finalization, replacing any prior one.
    ///
    /// False finals are stored with the deceptive terminal period stripped
    /// so that later partials ("You just can't beat…") extend the stem.
    pub fn create(&mut self, text: &str, seq_id: Option<u64>, now: Instant) {
        let stored = if text::is_false_final(text) {
            text.trim().trim_end_matches('.').to_string()
        } else {
            text.to_string()
        };

        let deadline = now + self.wait_for(&stored);
        self.pending = Some(PendingFinalization {
            text: stored,
            seq_id,
            created_at: now,
            deadline,
        });
    }

    /// Replace the stored text (an extending partial arrived) and push the
    /// deadline out, capped at `created_at + max_finalization_wait`.
    pub fn update_text(&mut self, text: &str, now: Instant) {
        let wait = self.wait_for(text);
        let max_wait = self.config.max_finalization_wait;
        if let Some(pending) = self.pending.as_mut() {
            pending.text = text.to_string();
            pending.deadline = (now + wait).min(pending.created_at + max_wait);
        }
    }

    /// Replace the pending deadline directly. `create` and `update_text`
    /// compute their own; this is for callers that need to stretch or cut
    /// the hold. The hard cap still applies.
    pub fn schedule(&mut self, deadline: Instant) {
        let max_wait = self.config.max_finalization_wait;
        if let Some(pending) = self.pending.as_mut() {
            pending.deadline = deadline.min(pending.created_at + max_wait);
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&PendingFinalization> {
        self.pending.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| d <= now)
    }

    /// Route an arriving partial against the pending finalization.
    pub fn on_partial(&mut self, partial_text: &str, now: Instant) -> PartialDisposition {
        let Some(pending) = self.pending.as_ref() else {
            return PartialDisposition::NoPending;
        };

        if text::extends(partial_text, &pending.text) {
            self.update_text(partial_text, now);
            return PartialDisposition::Extended;
        }

        if now.duration_since(pending.created_at) > self.config.new_segment_grace {
            PartialDisposition::CommitNow
        } else {
            PartialDisposition::Hold
        }
    }

    /// Commit the pending finalization, first replacing its text with the
    /// longest valid extension the partial tracker still holds.
    ///
    /// Extension validity: starts with the pending text (normalized) within
    /// the age gate — 10 s for the longest partial, 5 s for the latest —
    /// falling back to an overlap merge when no prefix extension matches.
    pub fn take_for_commit(
        &mut self,
        snapshot: &PartialSnapshot,
        now: Instant,
    ) -> Option<CommittedFinal> {
        let pending = self.pending.take()?;
        let mut best = pending.text.clone();

        for candidate in [
            snapshot
                .longest_extends(&pending.text, self.config.longest_extension_age, now)
                .map(|e| e.extended_text),
            snapshot
                .latest_extends(&pending.text, self.config.latest_extension_age, now)
                .map(|e| e.extended_text),
        ]
        .into_iter()
        .flatten()
        {
            if candidate.len() > best.len() {
                best = candidate;
            }
        }

        if best == pending.text {
            let overlap_candidates = [
                (&snapshot.longest, self.config.longest_extension_age),
                (&snapshot.latest, self.config.latest_extension_age),
            ];
            for (partial, max_age) in overlap_candidates {
                let Some(partial) = partial else { continue };
                if partial.age(now) > max_age {
                    continue;
                }
                if let Some(merged) = text::merge_with_overlap(&pending.text, &partial.text)
                    && merged.len() > best.len()
                {
                    best = merged;
                }
            }
        }

        tracing::debug!(
            held_ms = now.duration_since(pending.created_at).as_millis() as u64,
            extended = best.len() > pending.text.len(),
            "pending_finalization_committed"
        );

        Some(CommittedFinal {
            text: best,
            seq_id: pending.seq_id,
            committed_at: now,
            source: FinalSource::Asr,
        })
    }

    /// Sentence-aware hold duration for `text`.
    ///
    /// Complete sentences get the short wait; incomplete ones wait longer,
    /// scaling linearly with length — long unterminated finals are usually
    /// mid-thought and worth the extra patience.
    fn wait_for(&self, text: &str) -> std::time::Duration {
        if text::ends_with_complete_sentence(text) && !text::is_false_final(text) {
            return self.config.sentence_wait;
        }

        let base = self.config.base_wait;
        let span = self.config.max_scaled_wait.saturating_sub(base);
        let ratio =
            (text.chars().count() as f64 / self.config.scale_full_length as f64).min(1.0);
        base + span.mul_f64(ratio)
    }
}

use std::time::Instant;

use crate::config::SegmenterConfig;
use crate::recovery::apply_recovery;
use crate::text;
use crate::types::{CommittedFinal, FinalSource};

/// Where a buffered forced final is in its two-phase flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedPhase {
    /// Phase 1: waiting for late partials still in flight from the ASR.
    WaitingPartials,
    /// Phase 2: the audio-replay recovery pass is running.
    Recovering,
}

#[derive(Debug, Clone)]
struct ForcedBuffer {
    text: String,
    received_at: Instant,
    phase: ForcedPhase,
    deadline: Option<Instant>,
}

/// Fires when phase 1 expires: capture the audio window around `center`
/// and hand it to the recovery recognizer.
#[derive(Debug, Clone)]
pub struct ForcedAction {
    pub center: Instant,
    pub buffered_text: String,
}

/// Buffers provider-rotation finals instead of committing them.
///
/// The provider rotates its internal stream every few minutes and flushes an
/// artificial final that can truncate a word mid-utterance. Committing that
/// text directly loses the words stuck in the decoder gap, so the engine
/// holds it while (phase 1) late partials drain and (phase 2) a recovery
/// pass replays the boundary audio.
pub struct ForcedCommitEngine {
    config: SegmenterConfig,
    buffer: Option<ForcedBuffer>,
}

impl ForcedCommitEngine {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: None,
        }
    }

    /// Buffer a forced final, replacing (and canceling the timer of) any
    /// prior buffer.
    pub fn create(&mut self, buffered_text: &str, now: Instant) {
        self.buffer = Some(ForcedBuffer {
            text: buffered_text.to_string(),
            received_at: now,
            phase: ForcedPhase::WaitingPartials,
            deadline: Some(now + self.config.forced_phase1_wait),
        });
    }

    pub fn is_buffering(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffered_text(&self) -> Option<&str> {
        self.buffer.as_ref().map(|b| b.text.as_str())
    }

    pub fn phase(&self) -> Option<ForcedPhase> {
        self.buffer.as_ref().map(|b| b.phase)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.buffer.as_ref().and_then(|b| b.deadline)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| d <= now)
    }

    pub fn clear(&mut self) {
        self.buffer = None;
    }

    /// The partial extends the buffered text: returns the extended text.
    pub fn extends(&self, partial_text: &str) -> Option<String> {
        let buffer = self.buffer.as_ref()?;
        text::extends(partial_text, &buffer.text).then(|| partial_text.to_string())
    }

    /// A late partial extended the buffer — cancel all further phases and
    /// commit the merged text as a normal final.
    pub fn take_merged(&mut self, extended_text: &str, now: Instant) -> Option<CommittedFinal> {
        let buffer = self.buffer.take()?;
        tracing::debug!(
            buffered_len = buffer.text.len(),
            merged_len = extended_text.len(),
            "forced_final_merged_with_partial"
        );
        Some(CommittedFinal {
            text: text::collapse_whitespace(extended_text),
            seq_id: None,
            committed_at: now,
            source: FinalSource::Merged,
        })
    }

    /// Phase-1 deadline fired: transition to recovery. The caller captures
    /// the audio window centered on the forced-final instant and runs the
    /// recovery recognizer.
    pub fn on_deadline(&mut self, now: Instant) -> Option<ForcedAction> {
        let buffer = self.buffer.as_mut()?;
        if buffer.phase != ForcedPhase::WaitingPartials
            || buffer.deadline.is_none_or(|d| d > now)
        {
            return None;
        }

        buffer.phase = ForcedPhase::Recovering;
        buffer.deadline = None;

        Some(ForcedAction {
            center: buffer.received_at,
            buffered_text: buffer.text.clone(),
        })
    }

    /// Recovery resolved. Merge the recovered transcript in if it helps;
    /// otherwise commit the forced text unchanged.
    pub fn resolve_recovery(
        &mut self,
        recovered: Option<&str>,
        now: Instant,
    ) -> Option<CommittedFinal> {
        let buffer = self.buffer.take()?;

        let (source, committed_text) = match recovered.and_then(|r| apply_recovery(&buffer.text, r))
        {
            Some(merged) => (FinalSource::Recovered, merged),
            None => (FinalSource::Forced, text::collapse_whitespace(&buffer.text)),
        };

        tracing::debug!(
            ?source,
            buffered_len = buffer.text.len(),
            committed_len = committed_text.len(),
            "forced_final_committed"
        );

        Some(CommittedFinal {
            text: committed_text,
            seq_id: None,
            committed_at: now,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> ForcedCommitEngine {
        ForcedCommitEngine::new(SegmenterConfig::default())
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn create_schedules_phase_one() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("fulfilling our own", t0);

        assert!(engine.is_buffering());
        assert_eq!(engine.phase(), Some(ForcedPhase::WaitingPartials));
        assert_eq!(engine.deadline(), Some(at(t0, 1200)));
    }

    #[test]
    fn new_buffer_replaces_prior_and_its_timer() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("first cut", t0);
        engine.create("second cut", at(t0, 400));

        assert_eq!(engine.buffered_text(), Some("second cut"));
        assert_eq!(engine.deadline(), Some(at(t0, 1600)));
    }

    #[test]
    fn extending_partial_is_detected() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("fulfilling our own", t0);

        assert_eq!(
            engine.extends("fulfilling our own self-centered desires"),
            Some("fulfilling our own self-centered desires".to_string())
        );
        assert_eq!(engine.extends("something unrelated"), None);
        assert_eq!(engine.extends("fulfilling our own"), None);
    }

    #[test]
    fn merged_commit_cancels_phases() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("fulfilling our own", t0);

        let committed = engine
            .take_merged("fulfilling our own self-centered desires", at(t0, 200))
            .unwrap();

        assert_eq!(committed.text, "fulfilling our own self-centered desires");
        assert_eq!(committed.source, FinalSource::Merged);
        assert!(!engine.is_buffering());
        assert_eq!(engine.deadline(), None);
    }

    #[test]
    fn deadline_transitions_to_recovery() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("life is best spent for", t0);

        assert!(engine.on_deadline(at(t0, 1000)).is_none());

        let action = engine.on_deadline(at(t0, 1200)).unwrap();
        assert_eq!(action.center, t0);
        assert_eq!(action.buffered_text, "life is best spent for");
        assert_eq!(engine.phase(), Some(ForcedPhase::Recovering));
        assert_eq!(engine.deadline(), None);

        // phase 2 has no engine deadline; firing again is a no-op
        assert!(engine.on_deadline(at(t0, 2000)).is_none());
    }

    #[test]
    fn recovery_merge_produces_recovered_source() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("life is best spent for", t0);
        engine.on_deadline(at(t0, 1200));

        let committed = engine
            .resolve_recovery(Some("best spent fulfilling our own"), at(t0, 2500))
            .unwrap();

        assert_eq!(committed.text, "life is best spent fulfilling our own");
        assert_eq!(committed.source, FinalSource::Recovered);
        assert!(!engine.is_buffering());
    }

    #[test]
    fn failed_recovery_commits_forced_text_unchanged() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("life is best spent for", t0);
        engine.on_deadline(at(t0, 1200));

        let committed = engine.resolve_recovery(None, at(t0, 7000)).unwrap();
        assert_eq!(committed.text, "life is best spent for");
        assert_eq!(committed.source, FinalSource::Forced);
    }

    #[test]
    fn useless_recovery_commits_forced_text_unchanged() {
        let t0 = Instant::now();
        let mut engine = engine();
        engine.create("life is best spent for", t0);
        engine.on_deadline(at(t0, 1200));

        // recovery heard only noise that merges to nothing longer
        let committed = engine.resolve_recovery(Some(""), at(t0, 3000)).unwrap();
        assert_eq!(committed.source, FinalSource::Forced);
    }

    #[test]
    fn at_most_one_buffer_and_deadline() {
        let t0 = Instant::now();
        let mut engine = engine();
        for i in 0..5 {
            engine.create(&format!("cut {i}"), at(t0, i * 100));
        }
        assert!(engine.deadline().is_some());
        assert_eq!(engine.buffered_text(), Some("cut 4"));
    }
}

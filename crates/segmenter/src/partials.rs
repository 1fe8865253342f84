use std::time::{Duration, Instant};

use crate::text;

/// A transcript hypothesis that may still grow or be revised.
#[derive(Debug, Clone)]
pub struct Partial {
    pub text: String,
    pub received_at: Instant,
}

impl Partial {
    fn new(text: impl Into<String>, now: Instant) -> Self {
        Self {
            text: text.into(),
            received_at: now,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.received_at)
    }
}

/// A partial that validly extends some base text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extended_text: String,
    /// The words present in the extension but not in the base.
    pub missing_words: Vec<String>,
}

/// Value copy of the tracker state. Engines consult this; they never hold a
/// reference into the tracker itself.
#[derive(Debug, Clone, Default)]
pub struct PartialSnapshot {
    pub latest: Option<Partial>,
    pub longest: Option<Partial>,
}

/// Remembers two partials: the most recently received (*latest*) and the
/// longest seen since the last reset (*longest*).
///
/// The two deliberately diverge: when the ASR revises a hypothesis downward,
/// `latest` shrinks while `longest` keeps the high-water mark. The longest
/// may therefore be older and stale — every extension check is age-gated.
#[derive(Debug, Default)]
pub struct PartialTracker {
    latest: Option<Partial>,
    longest: Option<Partial>,
}

impl PartialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, text: &str, now: Instant) {
        if text.is_empty() {
            return;
        }

        let longer_than_longest = self
            .longest
            .as_ref()
            .is_none_or(|l| text.len() > l.text.len());

        self.latest = Some(Partial::new(text, now));
        if longer_than_longest {
            self.longest = Some(Partial::new(text, now));
        }
    }

    pub fn snapshot(&self) -> PartialSnapshot {
        PartialSnapshot {
            latest: self.latest.clone(),
            longest: self.longest.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.latest = None;
        self.longest = None;
    }

    pub fn check_longest_extends(
        &self,
        base: &str,
        within: Duration,
        now: Instant,
    ) -> Option<Extension> {
        check_extends(self.longest.as_ref(), base, within, now)
    }

    pub fn check_latest_extends(
        &self,
        base: &str,
        within: Duration,
        now: Instant,
    ) -> Option<Extension> {
        check_extends(self.latest.as_ref(), base, within, now)
    }
}

impl PartialSnapshot {
    pub fn longest_extends(&self, base: &str, within: Duration, now: Instant) -> Option<Extension> {
        check_extends(self.longest.as_ref(), base, within, now)
    }

    pub fn latest_extends(&self, base: &str, within: Duration, now: Instant) -> Option<Extension> {
        check_extends(self.latest.as_ref(), base, within, now)
    }
}

fn check_extends(
    partial: Option<&Partial>,
    base: &str,
    within: Duration,
    now: Instant,
) -> Option<Extension> {
    let partial = partial?;
    if partial.age(now) > within {
        return None;
    }
    if !text::extends(&partial.text, base) {
        return None;
    }

    let base_words = text::tokenize(base).len();
    let missing_words = text::tokenize(&partial.text)
        .into_iter()
        .skip(base_words)
        .collect();

    Some(Extension {
        extended_text: partial.text.clone(),
        missing_words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn update_tracks_latest_and_longest() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();

        tracker.update("I've been to grocery", at(t0, 0));
        tracker.update("I've been", at(t0, 100));

        let snap = tracker.snapshot();
        assert_eq!(snap.latest.unwrap().text, "I've been");
        assert_eq!(snap.longest.unwrap().text, "I've been to grocery");
    }

    #[test]
    fn empty_update_is_ignored() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("", t0);
        assert!(tracker.snapshot().latest.is_none());
    }

    #[test]
    fn equal_length_does_not_replace_longest() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();

        tracker.update("abcde", at(t0, 0));
        tracker.update("vwxyz", at(t0, 100));

        let snap = tracker.snapshot();
        assert_eq!(snap.longest.unwrap().text, "abcde");
        assert_eq!(snap.latest.unwrap().text, "vwxyz");
    }

    #[test]
    fn reset_clears_both() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("something", t0);
        tracker.reset();

        let snap = tracker.snapshot();
        assert!(snap.latest.is_none());
        assert!(snap.longest.is_none());
    }

    #[test]
    fn snapshot_is_a_value_copy() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("before", t0);

        let snap = tracker.snapshot();
        tracker.update("before and after", at(t0, 50));

        assert_eq!(snap.latest.unwrap().text, "before");
    }

    // ── extension checks ─────────────────────────────────────────────────

    #[test]
    fn extension_reports_missing_words() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("fulfilling our own self-centered desires", at(t0, 0));

        let ext = tracker
            .check_longest_extends("fulfilling our own", Duration::from_secs(10), at(t0, 200))
            .unwrap();

        assert_eq!(
            ext.extended_text,
            "fulfilling our own self-centered desires"
        );
        assert_eq!(ext.missing_words, ["self-centered", "desires"]);
    }

    #[test]
    fn extension_requires_prefix_match() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("a completely different sentence", at(t0, 0));

        assert!(
            tracker
                .check_longest_extends("fulfilling our own", Duration::from_secs(10), at(t0, 100))
                .is_none()
        );
    }

    #[test]
    fn extension_is_age_gated() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("hello world again", at(t0, 0));

        assert!(
            tracker
                .check_latest_extends("hello world", Duration::from_secs(5), at(t0, 6_000))
                .is_none()
        );
        assert!(
            tracker
                .check_latest_extends("hello world", Duration::from_secs(5), at(t0, 4_000))
                .is_some()
        );
    }

    #[test]
    fn extension_is_case_insensitive() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("Hello World and more", at(t0, 0));

        let ext = tracker
            .check_latest_extends("hello world", Duration::from_secs(5), at(t0, 100))
            .unwrap();
        assert_eq!(ext.extended_text, "Hello World and more");
    }

    #[test]
    fn same_length_partial_does_not_extend() {
        let t0 = Instant::now();
        let mut tracker = PartialTracker::new();
        tracker.update("hello world", at(t0, 0));

        assert!(
            tracker
                .check_latest_extends("hello world", Duration::from_secs(5), at(t0, 100))
                .is_none()
        );
    }
}

use std::time::Duration;

/// Tunables for the finalization and recovery pipeline.
///
/// The defaults are the values observed to work against real provider
/// streams; every one of them is a knob because provider timing drifts
/// between models and regions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Minimum hold for a pending final that already ends a sentence.
    pub sentence_wait: Duration,
    /// Base hold for a pending final that does not end a sentence.
    pub base_wait: Duration,
    /// Ceiling the incomplete-sentence hold scales up to with text length.
    pub max_scaled_wait: Duration,
    /// Text length (chars) at which the hold reaches `max_scaled_wait`.
    pub scale_full_length: usize,
    /// Hard cap on any pending finalization, measured from `created_at`.
    pub max_finalization_wait: Duration,
    /// A non-extending partial later than this after `created_at` means a
    /// new segment started; the pending commits immediately.
    pub new_segment_grace: Duration,
    /// Maximum age of the longest-partial for pre-commit extension.
    pub longest_extension_age: Duration,
    /// Maximum age of the latest-partial for pre-commit extension.
    pub latest_extension_age: Duration,
    /// Phase-1 wait after a forced final for late in-flight partials.
    pub forced_phase1_wait: Duration,
    /// Recovery window before the forced-final instant. The decoder gap
    /// lives here; this side matters far more than the post side.
    pub recovery_pre: Duration,
    /// Recovery window after the forced-final instant.
    pub recovery_post: Duration,
    /// Audio ring buffer retention. Must cover `forced_phase1_wait +
    /// recovery_pre` so the window is still in memory when phase 2 starts.
    pub ring_retention: Duration,
    /// Two finals closer together than this are candidates for
    /// consecutive-final merging.
    pub continuation_window: Duration,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sentence_wait: Duration::from_millis(1000),
            base_wait: Duration::from_millis(1000),
            max_scaled_wait: Duration::from_millis(3500),
            scale_full_length: 300,
            max_finalization_wait: Duration::from_millis(5000),
            new_segment_grace: Duration::from_millis(500),
            longest_extension_age: Duration::from_secs(10),
            latest_extension_age: Duration::from_secs(5),
            forced_phase1_wait: Duration::from_millis(1200),
            recovery_pre: Duration::from_millis(1400),
            recovery_post: Duration::from_millis(800),
            ring_retention: Duration::from_millis(4000),
            continuation_window: Duration::from_secs(3),
        }
    }
}

impl SegmenterConfig {
    /// Total recovery window width.
    pub fn recovery_window(&self) -> Duration {
        self.recovery_pre + self.recovery_post
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = SegmenterConfig::default();
        assert_eq!(config.recovery_window(), Duration::from_millis(2200));
        assert!(config.ring_retention >= config.forced_phase1_wait + config.recovery_pre);
        assert!(config.max_scaled_wait <= config.max_finalization_wait);
    }
}

use std::time::Instant;

/// Where a committed segment's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalSource {
    /// An organic final from the ASR, possibly extended by partials.
    Asr,
    /// A provider-rotation final committed unchanged (recovery had nothing).
    Forced,
    /// A rotation final repaired by the audio-replay recovery pass.
    Recovered,
    /// A rotation final merged with a late-arriving extending partial.
    Merged,
}

/// A committed transcript segment, ready for translation.
#[derive(Debug, Clone)]
pub struct CommittedFinal {
    pub text: String,
    pub seq_id: Option<u64>,
    pub committed_at: Instant,
    pub source: FinalSource,
}

impl CommittedFinal {
    pub fn new(text: impl Into<String>, source: FinalSource, now: Instant) -> Self {
        Self {
            text: text.into(),
            seq_id: None,
            committed_at: now,
            source,
        }
    }
}

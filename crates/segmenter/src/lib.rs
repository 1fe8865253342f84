//! Segment finalization and recovery pipeline.
//!
//! Streaming ASR output is noisy: interim partials grow and shrink, finals
//! arrive before the speaker is done, and the provider cuts its internal
//! stream every few minutes, emitting an artificial final that can truncate
//! a word mid-utterance. The engines in this crate reconcile that into a
//! single authoritative, monotonically-extending transcript.
//!
//! Everything here is synchronous state-machine logic. Timers are modeled as
//! deadline state owned by each engine; the session task sleeps on the
//! earliest deadline and calls back into the owning engine when it fires.
//! I/O (WebSockets, recovery recognition, translation) lives in the caller.

mod config;
mod finalize;
mod forced;
mod partials;
mod recovery;
mod ring;
mod sequence;
pub mod text;
mod types;

pub use config::SegmenterConfig;
pub use finalize::{FinalizationEngine, PartialDisposition, PendingFinalization};
pub use forced::{ForcedAction, ForcedCommitEngine, ForcedPhase};
pub use partials::{Extension, Partial, PartialSnapshot, PartialTracker};
pub use recovery::{RecoveryMerge, apply_recovery, merge_recovered};
pub use ring::AudioRingBuffer;
pub use sequence::{MessageData, SequenceEmitter};
pub use types::{CommittedFinal, FinalSource};

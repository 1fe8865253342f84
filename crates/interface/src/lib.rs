mod asr;
mod client;
mod message;

pub use asr::AsrEvent;
pub use client::{ClientMessage, ServerMessage, Tier};
pub use message::{SequencedMessage, UpdateType};

mod adapter;
mod error;
mod live;
mod recovery;

pub use adapter::{AsrAdapter, DeepgramAdapter, StreamParams};
pub use error::{Error, RecoveryError};
pub use live::{AsrStream, AsrStreamConfig};
pub use recovery::{RecoveryConfig, RecoveryOutcome, RecoverySession};

use thiserror::Error;

/// Failure taxonomy of the translation providers.
///
/// The session maps each variant onto its own policy: `Cancelled` and
/// `EnglishLeak` are silently skipped, `Truncated` and `Timeout` fall back
/// to the source text, `SkipRequest` backs off until the next partial.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("superseded by a newer partial")]
    Cancelled,

    #[error("provider echoed the source text")]
    EnglishLeak,

    #[error("provider returned a truncated translation")]
    Truncated,

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider is rate limiting this session")]
    SkipRequest,

    #[error("provider rejected the request: {status}")]
    Provider { status: u16, message: String },

    #[error("http error: {0}")]
    Http(Box<dyn std::error::Error + Send + Sync>),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

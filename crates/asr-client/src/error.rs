#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),
    #[error("connect timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("api key produces an invalid auth header")]
    InvalidAuthHeader,
    #[error("stream closed")]
    StreamClosed,
    #[error("fatal provider error: {message} (code {code:?})")]
    Fatal {
        code: Option<i32>,
        message: String,
    },
}

/// Internal failure modes of a recovery pass. Never crosses the crate
/// boundary — `RecoverySession::run` converts every one of these into an
/// empty [`crate::RecoveryOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("recovery session not writable")]
    Unavailable,
    #[error("no terminal result within {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Transport(#[from] Error),
}

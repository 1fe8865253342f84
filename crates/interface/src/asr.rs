/// Provider-neutral event emitted by a streaming ASR session.
///
/// Adapters normalize each provider's wire frames into this shape before the
/// pipeline sees them. `forced` marks finals the provider produced because it
/// rotated its internal stream, not because the speaker finished — the
/// forced-commit engine treats those very differently from organic finals.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AsrEvent {
    #[serde(rename_all = "camelCase")]
    Transcript {
        text: String,
        is_partial: bool,
        #[serde(default)]
        forced: bool,
    },
    Error {
        code: Option<i32>,
        message: String,
    },
    End,
}

impl AsrEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self::Transcript {
            text: text.into(),
            is_partial: true,
            forced: false,
        }
    }

    pub fn final_(text: impl Into<String>) -> Self {
        Self::Transcript {
            text: text.into(),
            is_partial: false,
            forced: false,
        }
    }

    pub fn forced_final(text: impl Into<String>) -> Self {
        Self::Transcript {
            text: text.into(),
            is_partial: false,
            forced: true,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Transcript { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Auth and quota failures cannot be recovered by reconnecting.
    pub fn is_fatal_error(&self) -> bool {
        matches!(
            self,
            Self::Error {
                code: Some(401 | 403 | 429),
                ..
            }
        )
    }
}

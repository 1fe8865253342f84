use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use parley_interface::AsrEvent;

use crate::adapter::{AsrAdapter, StreamParams};
use crate::error::{Error, RecoveryError};
use crate::live::{AsrStreamConfig, connect_upstream};

/// Everything a recovery pass produced. `text` is the terminal final when
/// one arrived, otherwise the last partial observed; `None` means the
/// window yielded nothing usable.
#[derive(Debug, Clone, Default)]
pub struct RecoveryOutcome {
    pub text: Option<String>,
    pub partials: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub params: StreamParams,
    /// How long to wait for the session to become writable.
    pub writable_timeout: Duration,
    /// How long to wait for a terminal result after end-of-input.
    pub result_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.deepgram.com".into(),
            api_key: None,
            params: StreamParams::default(),
            writable_timeout: Duration::from_secs(2),
            result_timeout: Duration::from_secs(5),
        }
    }
}

/// One-shot recognizer for the forced-final recovery window.
///
/// Spins up an independent short-lived session with auto-restart disabled,
/// writes the whole byte window in one message, signals end-of-input, and
/// waits for a terminal result. The session is destroyed unconditionally on
/// exit and no error ever crosses the boundary — a failed pass is an empty
/// outcome, and the caller commits the forced text unchanged.
pub struct RecoverySession<A: AsrAdapter> {
    adapter: A,
    config: RecoveryConfig,
}

impl<A: AsrAdapter> RecoverySession<A> {
    pub fn new(adapter: A, config: RecoveryConfig) -> Self {
        Self { adapter, config }
    }

    pub async fn recognize(&self, audio: Vec<u8>) -> RecoveryOutcome {
        match self.recognize_inner(audio).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "recovery_pass_failed");
                RecoveryOutcome::default()
            }
        }
    }

    async fn recognize_inner(&self, audio: Vec<u8>) -> Result<RecoveryOutcome, RecoveryError> {
        if audio.is_empty() {
            return Err(RecoveryError::Unavailable);
        }

        let stream_config = AsrStreamConfig {
            api_base: self.config.api_base.clone(),
            api_key: self.config.api_key.clone(),
            params: self.config.params.clone(),
            connect_timeout: self.config.writable_timeout,
            auto_restart: false,
            ..Default::default()
        };

        // connect failure within the writable window means the provider has
        // no capacity for us right now
        let mut upstream = connect_upstream(&self.adapter, &stream_config)
            .await
            .map_err(|e| match e {
                Error::ConnectTimeout(_) => RecoveryError::Unavailable,
                other => RecoveryError::Transport(other),
            })?;

        tracing::debug!(bytes = audio.len(), "recovery_pass_started");

        upstream
            .send(self.adapter.audio_to_message(audio.into()))
            .await
            .map_err(Error::from)?;
        upstream
            .send(self.adapter.end_of_input_message())
            .await
            .map_err(Error::from)?;

        let mut partials: Vec<String> = Vec::new();
        let mut final_text: Option<String> = None;

        let waited = tokio::time::timeout(self.config.result_timeout, async {
            while let Some(message) = upstream.next().await {
                let raw = match message {
                    Ok(Message::Text(raw)) => raw,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };

                for event in self.adapter.parse_response(&raw) {
                    match event {
                        AsrEvent::Transcript {
                            text,
                            is_partial: true,
                            ..
                        } => partials.push(text),
                        AsrEvent::Transcript { text, .. } => {
                            final_text = Some(text);
                            return;
                        }
                        AsrEvent::End => return,
                        AsrEvent::Error { code, message } => {
                            tracing::warn!(?code, message, "recovery_provider_error");
                            return;
                        }
                    }
                }
            }
        })
        .await;

        let _ = upstream.close(None).await;

        if waited.is_err() {
            tracing::warn!(
                timeout_ms = self.config.result_timeout.as_millis() as u64,
                partials = partials.len(),
                "recovery_result_timed_out"
            );
        }

        let text = final_text.or_else(|| partials.last().cloned());
        tracing::debug!(
            got_final = text.is_some(),
            partials = partials.len(),
            "recovery_pass_finished"
        );

        Ok(RecoveryOutcome { text, partials })
    }
}

use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

use parley_interface::AsrEvent;

/// Parameters for one upstream streaming session.
#[derive(Debug, Clone)]
pub struct StreamParams {
    pub language: String,
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

/// Provider boundary for streaming speech recognition.
///
/// An adapter knows how to build the upstream WebSocket URL, authenticate,
/// frame audio and control messages, and normalize the provider's wire
/// frames into [`AsrEvent`]s. Everything stateful (reconnects, rotation,
/// recovery sessions) lives in [`crate::AsrStream`] and
/// [`crate::RecoverySession`], which are generic over the adapter.
pub trait AsrAdapter: Clone + Default + Send + Sync + 'static {
    fn provider_name(&self) -> &'static str;

    fn build_ws_url(&self, api_base: &str, params: &StreamParams) -> Result<url::Url, url::ParseError>;

    fn build_auth_header(&self, api_key: Option<&str>) -> Option<(&'static str, String)>;

    /// Message to send right after connecting, if the provider needs one.
    fn initial_message(&self, _api_key: Option<&str>, _params: &StreamParams) -> Option<Message> {
        None
    }

    fn keep_alive_message(&self) -> Option<Message>;

    /// Ask the provider to flush whatever it is holding as a final.
    fn finalize_message(&self) -> Message;

    /// Tell the provider no more audio is coming.
    fn end_of_input_message(&self) -> Message;

    fn audio_to_message(&self, audio: Bytes) -> Message {
        Message::Binary(audio)
    }

    /// Normalize one raw text frame into zero or more events.
    fn parse_response(&self, raw: &str) -> Vec<AsrEvent>;
}

// ── Deepgram-shaped wire frames ──────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct WireAlternative {
    transcript: String,
}

#[derive(Debug, serde::Deserialize)]
struct WireChannel {
    alternatives: Vec<WireAlternative>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum WireFrame {
    Results {
        is_final: bool,
        #[serde(default)]
        from_finalize: bool,
        channel: WireChannel,
    },
    Metadata {},
    Error {
        #[serde(default)]
        error_code: Option<i32>,
        error_message: String,
    },
    #[serde(other)]
    Ignored,
}

/// Adapter for providers speaking the Deepgram realtime wire shape.
#[derive(Debug, Clone, Default)]
pub struct DeepgramAdapter;

impl AsrAdapter for DeepgramAdapter {
    fn provider_name(&self) -> &'static str {
        "deepgram"
    }

    fn build_ws_url(
        &self,
        api_base: &str,
        params: &StreamParams,
    ) -> Result<url::Url, url::ParseError> {
        let mut url: url::Url = api_base.parse()?;

        match url.scheme() {
            "http" => {
                let _ = url.set_scheme("ws");
            }
            "https" => {
                let _ = url.set_scheme("wss");
            }
            _ => {}
        }

        if !url.path().ends_with("/listen") {
            let path = format!("{}/v1/listen", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }

        url.query_pairs_mut()
            .append_pair("language", &params.language)
            .append_pair("sample_rate", &params.sample_rate.to_string())
            .append_pair("channels", &params.channels.to_string())
            .append_pair("encoding", "linear16")
            .append_pair("interim_results", "true")
            .append_pair("punctuate", "true");

        Ok(url)
    }

    fn build_auth_header(&self, api_key: Option<&str>) -> Option<(&'static str, String)> {
        api_key.map(|k| ("Authorization", format!("Token {k}")))
    }

    fn keep_alive_message(&self) -> Option<Message> {
        Some(Message::Text(r#"{"type":"KeepAlive"}"#.into()))
    }

    fn finalize_message(&self) -> Message {
        Message::Text(r#"{"type":"Finalize"}"#.into())
    }

    fn end_of_input_message(&self) -> Message {
        Message::Text(r#"{"type":"CloseStream"}"#.into())
    }

    fn parse_response(&self, raw: &str) -> Vec<AsrEvent> {
        let frame: WireFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(_) => {
                tracing::warn!(raw, "asr_unknown_frame");
                return vec![];
            }
        };

        match frame {
            WireFrame::Results {
                is_final,
                from_finalize,
                channel,
            } => {
                let Some(alt) = channel.alternatives.first() else {
                    return vec![];
                };
                if alt.transcript.is_empty() {
                    return vec![];
                }
                vec![AsrEvent::Transcript {
                    text: alt.transcript.clone(),
                    is_partial: !is_final,
                    // a final the provider flushed on our Finalize is a
                    // stream-boundary artifact, not end of speech
                    forced: is_final && from_finalize,
                }]
            }
            WireFrame::Metadata {} => vec![AsrEvent::End],
            WireFrame::Error {
                error_code,
                error_message,
            } => vec![AsrEvent::Error {
                code: error_code,
                message: error_message,
            }],
            WireFrame::Ignored => vec![],
        }
    }
}

use crate::message::SequencedMessage;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    #[default]
    Basic,
    Premium,
}

/// Messages a host client sends over the session WebSocket.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Init {
        source_lang: String,
        target_lang: String,
        #[serde(default)]
        tier: Option<Tier>,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        audio_data: String,
        #[serde(default)]
        chunk_index: Option<u64>,
        #[serde(default)]
        start_ms: Option<u64>,
        #[serde(default)]
        end_ms: Option<u64>,
        #[serde(default)]
        client_timestamp: Option<u64>,
    },
    AudioEnd,
    ForceCommit,
    Ping {
        timestamp: u64,
    },
    ClientHidden,
    ClientVisible,
}

/// Messages the server sends back.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    SessionReady { session_id: String, message: String },
    Translation(SequencedMessage),
    Pong {
        timestamp: u64,
    },
    Warning {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        persistent: Option<bool>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_parses_camel_case_fields() {
        let json = r#"{"type":"init","sourceLang":"en","targetLang":"es","tier":"premium"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Init {
                source_lang,
                target_lang,
                tier,
            } => {
                assert_eq!(source_lang, "en");
                assert_eq!(target_lang, "es");
                assert_eq!(tier, Some(Tier::Premium));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn init_tier_is_optional() {
        let json = r#"{"type":"init","sourceLang":"en","targetLang":"ko"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Init { tier: None, .. }));
    }

    #[test]
    fn audio_parses_with_only_payload() {
        let json = r#"{"type":"audio","audioData":"AAAA"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Audio {
                chunk_index: None,
                ..
            }
        ));
    }

    #[test]
    fn bare_control_messages_parse() {
        for json in [
            r#"{"type":"audio_end"}"#,
            r#"{"type":"force_commit"}"#,
            r#"{"type":"client_hidden"}"#,
            r#"{"type":"client_visible"}"#,
        ] {
            let _: ClientMessage = serde_json::from_str(json).unwrap();
        }
    }

    #[test]
    fn pong_echoes_timestamp_shape() {
        let msg = ServerMessage::Pong { timestamp: 123 };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"pong","timestamp":123}"#);
    }

    #[test]
    fn warning_omits_absent_code() {
        let msg = ServerMessage::Warning {
            message: "asr reconnecting".into(),
            code: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("code"));
    }

    #[test]
    fn tier_string_round_trip() {
        assert_eq!("premium".parse::<Tier>().unwrap(), Tier::Premium);
        assert_eq!(Tier::Basic.to_string(), "basic");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Grammar,
    Translation,
}

/// One sequenced row of the outbound transcript stream.
///
/// `seq_id` is the only ordering primitive consumers may rely on; the
/// wall-clock `server_timestamp` is advisory. A consumer decides from
/// `(seq_id, is_partial)` whether a message replaces, extends, or appends to
/// a prior row.
///
/// `transcript` and `translation` are derived: `transcript` prefers the
/// corrected text over the original, and `translation` falls back to the
/// transcript itself on transcription-only sessions so clients always have
/// something to render.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedMessage {
    pub seq_id: u64,
    pub server_timestamp: u64,
    pub is_partial: bool,
    pub original_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    pub has_correction: bool,
    pub has_translation: bool,
    pub is_transcription_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<UpdateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_final: Option<bool>,
    pub transcript: String,
    pub translation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> SequencedMessage {
        SequencedMessage {
            seq_id: 7,
            server_timestamp: 1000,
            is_partial: false,
            original_text: "hello world".into(),
            corrected_text: None,
            translated_text: Some("hola mundo".into()),
            has_correction: false,
            has_translation: true,
            is_transcription_only: false,
            update_type: None,
            force_final: None,
            transcript: "hello world".into(),
            translation: "hola mundo".into(),
        }
    }

    #[test]
    fn serializes_camel_case_wire_fields() {
        let json = serde_json::to_string(&message()).unwrap();
        assert!(json.contains(r#""seqId":7"#));
        assert!(json.contains(r#""isPartial":false"#));
        assert!(json.contains(r#""originalText":"hello world""#));
        assert!(json.contains(r#""translatedText":"hola mundo""#));
    }

    #[test]
    fn absent_optionals_are_omitted() {
        let json = serde_json::to_string(&message()).unwrap();
        assert!(!json.contains("correctedText"));
        assert!(!json.contains("updateType"));
        assert!(!json.contains("forceFinal"));
    }

    #[test]
    fn update_type_uses_snake_case_values() {
        let mut msg = message();
        msg.update_type = Some(UpdateType::Grammar);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""updateType":"grammar""#));
    }
}

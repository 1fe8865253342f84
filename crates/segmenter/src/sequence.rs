use parley_interface::{SequencedMessage, UpdateType};

/// Payload for one outbound row, before sequencing.
#[derive(Debug, Clone, Default)]
pub struct MessageData {
    pub original_text: String,
    pub corrected_text: Option<String>,
    pub translated_text: Option<String>,
    pub is_transcription_only: bool,
    pub update_type: Option<UpdateType>,
    pub force_final: Option<bool>,
    /// Reuse an already-allocated id (grammar/translation updates re-emit
    /// their row). `None` allocates the next id.
    pub seq_id: Option<u64>,
}

impl MessageData {
    pub fn text(original_text: impl Into<String>) -> Self {
        Self {
            original_text: original_text.into(),
            ..Default::default()
        }
    }
}

/// Owns the per-session sequence counter and stamps outbound rows.
///
/// `seq_id` is the only ordering primitive downstream consumers may rely on;
/// the wall-clock timestamp is advisory. The emitter performs no I/O — it
/// returns the message for the session task to hand to the transport.
#[derive(Debug, Default)]
pub struct SequenceEmitter {
    next: u64,
}

impl SequenceEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn build_message(
        &mut self,
        data: MessageData,
        is_partial: bool,
        server_timestamp: u64,
    ) -> SequencedMessage {
        let seq_id = data.seq_id.unwrap_or_else(|| self.next());

        let transcript = data
            .corrected_text
            .clone()
            .unwrap_or_else(|| data.original_text.clone());
        let translation = data.translated_text.clone().unwrap_or_else(|| {
            if data.is_transcription_only {
                transcript.clone()
            } else {
                String::new()
            }
        });

        SequencedMessage {
            seq_id,
            server_timestamp,
            is_partial,
            has_correction: data.corrected_text.is_some(),
            has_translation: data.translated_text.is_some(),
            original_text: data.original_text,
            corrected_text: data.corrected_text,
            translated_text: data.translated_text,
            is_transcription_only: data.is_transcription_only,
            update_type: data.update_type,
            force_final: data.force_final,
            transcript,
            translation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_zero_and_increase() {
        let mut emitter = SequenceEmitter::new();
        assert_eq!(emitter.next(), 0);
        assert_eq!(emitter.next(), 1);
        assert_eq!(emitter.next(), 2);
    }

    #[test]
    fn messages_get_increasing_ids() {
        let mut emitter = SequenceEmitter::new();
        let a = emitter.build_message(MessageData::text("a"), true, 1);
        let b = emitter.build_message(MessageData::text("b"), false, 2);
        assert!(a.seq_id < b.seq_id);
    }

    #[test]
    fn transcript_prefers_corrected_text() {
        let mut emitter = SequenceEmitter::new();
        let msg = emitter.build_message(
            MessageData {
                original_text: "their going".into(),
                corrected_text: Some("they're going".into()),
                ..Default::default()
            },
            false,
            0,
        );
        assert_eq!(msg.transcript, "they're going");
        assert!(msg.has_correction);
    }

    #[test]
    fn translation_falls_back_for_transcription_only() {
        let mut emitter = SequenceEmitter::new();
        let msg = emitter.build_message(
            MessageData {
                original_text: "hello".into(),
                is_transcription_only: true,
                ..Default::default()
            },
            true,
            0,
        );
        assert_eq!(msg.translation, "hello");
        assert!(!msg.has_translation);
    }

    #[test]
    fn translation_empty_when_pending() {
        let mut emitter = SequenceEmitter::new();
        let msg = emitter.build_message(MessageData::text("hello"), true, 0);
        assert_eq!(msg.translation, "");
    }

    #[test]
    fn update_reuses_seq_id_without_burning_one() {
        let mut emitter = SequenceEmitter::new();
        let original = emitter.build_message(MessageData::text("hello"), false, 0);

        let update = emitter.build_message(
            MessageData {
                original_text: "hello".into(),
                corrected_text: Some("Hello.".into()),
                update_type: Some(UpdateType::Grammar),
                seq_id: Some(original.seq_id),
                ..Default::default()
            },
            false,
            1,
        );

        assert_eq!(update.seq_id, original.seq_id);
        // the counter did not advance for the re-emit
        let next = emitter.build_message(MessageData::text("next"), false, 2);
        assert_eq!(next.seq_id, original.seq_id + 1);
    }
}

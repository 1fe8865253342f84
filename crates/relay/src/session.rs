use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use base64::Engine as _;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::Instrument;

use parley_asr_client::{AsrStream, DeepgramAdapter, RecoveryOutcome, RecoverySession};
use parley_interface::{AsrEvent, ClientMessage, ServerMessage, Tier, UpdateType};
use parley_segmenter::{
    AudioRingBuffer, CommittedFinal, FinalSource, FinalizationEngine, ForcedAction,
    ForcedCommitEngine, ForcedPhase, MessageData, PartialDisposition, PartialTracker,
    SequenceEmitter, text,
};
use parley_translate::{
    GrammarCache, GrammarClient, PassthroughTranslator, TranslateError, TranslateRequest,
    Translator, for_tier,
};

use crate::config::RelayConfig;

type WsTx = SplitSink<WebSocket, WsMessage>;
type WsRx = SplitStream<WebSocket>;

/// The client went away (or the transport failed); unwind the session.
struct Closed;

type Step = Result<(), Closed>;

enum InternalEvent {
    Translation {
        seq_id: u64,
        original_text: String,
        is_partial: bool,
        result: Result<String, TranslateError>,
    },
    Grammar {
        seq_id: u64,
        original_text: String,
        result: Result<String, TranslateError>,
    },
    Recovery(RecoveryOutcome),
}

struct LastFinal {
    text: String,
    seq_id: u64,
    at: Instant,
}

/// Entry point for one upgraded WebSocket: wait for `init`, wire up the
/// pipeline, then run the event loop until the client disconnects.
pub(crate) async fn serve(socket: WebSocket, config: RelayConfig) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some((source_lang, target_lang, tier)) = wait_for_init(&mut ws_tx, &mut ws_rx).await else {
        return;
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("session", id = %session_id);

    async {
        let mut asr = match AsrStream::connect(
            DeepgramAdapter,
            config.asr_stream_config(&source_lang),
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "asr_connect_failed");
                let _ = send(
                    &mut ws_tx,
                    &ServerMessage::Error {
                        message: "speech recognizer unavailable".into(),
                        code: Some("asr_unavailable".into()),
                        persistent: Some(true),
                    },
                )
                .await;
                return;
            }
        };

        let Some(asr_events) = asr.take_events() else {
            return;
        };

        if send(
            &mut ws_tx,
            &ServerMessage::SessionReady {
                session_id: session_id.clone(),
                message: "session established".into(),
            },
        )
        .await
        .is_err()
        {
            return;
        }

        let (internal_tx, internal_rx) = mpsc::channel(64);

        let transcription_only = source_lang == target_lang;
        let translator: Arc<dyn Translator> = if transcription_only {
            Arc::new(PassthroughTranslator)
        } else {
            for_tier(tier, &config.translator)
        };
        let grammar = config.grammar.clone().map(|g| Arc::new(GrammarClient::new(g)));

        tracing::info!(%source_lang, %target_lang, %tier, "session_started");

        let session = Session {
            id: session_id,
            source_lang,
            target_lang,
            transcription_only,
            asr,
            ring: AudioRingBuffer::new(config.segmenter.ring_retention),
            tracker: PartialTracker::new(),
            emitter: SequenceEmitter::new(),
            finalize: FinalizationEngine::new(config.segmenter.clone()),
            forced: ForcedCommitEngine::new(config.segmenter.clone()),
            translator,
            grammar,
            grammar_cache: GrammarCache::new(),
            internal_tx,
            partial_translation: None,
            recovery_task: None,
            background_tasks: Vec::new(),
            last_final: None,
            config,
        };

        session.run(ws_tx, ws_rx, asr_events, internal_rx).await;
        tracing::info!("session_ended");
    }
    .instrument(span)
    .await
}

async fn wait_for_init(
    ws_tx: &mut WsTx,
    ws_rx: &mut WsRx,
) -> Option<(String, String, Tier)> {
    loop {
        match ws_rx.next().await? {
            Ok(WsMessage::Text(raw)) => match serde_json::from_str::<ClientMessage>(&raw) {
                Ok(ClientMessage::Init {
                    source_lang,
                    target_lang,
                    tier,
                }) => return Some((source_lang, target_lang, tier.unwrap_or_default())),
                Ok(ClientMessage::Ping { timestamp }) => {
                    send(ws_tx, &ServerMessage::Pong { timestamp }).await.ok()?;
                }
                Ok(_) => {
                    send(
                        ws_tx,
                        &ServerMessage::Warning {
                            message: "send init first".into(),
                            code: Some("not_initialized".into()),
                        },
                    )
                    .await
                    .ok()?;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "unparseable_client_message");
                    send(
                        ws_tx,
                        &ServerMessage::Warning {
                            message: "unrecognized message".into(),
                            code: Some("bad_message".into()),
                        },
                    )
                    .await
                    .ok()?;
                }
            },
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn send(ws_tx: &mut WsTx, message: &ServerMessage) -> Step {
    let json = serde_json::to_string(message).map_err(|_| Closed)?;
    ws_tx
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|_| Closed)
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .min(u64::MAX as u128) as u64
}

struct Session {
    id: String,
    source_lang: String,
    target_lang: String,
    transcription_only: bool,

    asr: AsrStream,
    ring: AudioRingBuffer,
    tracker: PartialTracker,
    emitter: SequenceEmitter,
    finalize: FinalizationEngine,
    forced: ForcedCommitEngine,

    translator: Arc<dyn Translator>,
    grammar: Option<Arc<GrammarClient>>,
    grammar_cache: GrammarCache,

    internal_tx: mpsc::Sender<InternalEvent>,
    partial_translation: Option<AbortHandle>,
    recovery_task: Option<AbortHandle>,
    background_tasks: Vec<AbortHandle>,
    last_final: Option<LastFinal>,

    config: RelayConfig,
}

impl Session {
    async fn run(
        mut self,
        mut ws_tx: WsTx,
        mut ws_rx: WsRx,
        mut asr_events: mpsc::Receiver<AsrEvent>,
        mut internal_rx: mpsc::Receiver<InternalEvent>,
    ) {
        let mut asr_done = false;

        loop {
            let deadline = self.next_deadline();

            let step = tokio::select! {
                message = ws_rx.next() => match message {
                    Some(Ok(message)) => self.on_ws_message(message, &mut ws_tx).await,
                    Some(Err(_)) | None => Err(Closed),
                },

                event = asr_events.recv(), if !asr_done => match event {
                    Some(event) => self.on_asr_event(event, &mut ws_tx).await,
                    None => {
                        asr_done = true;
                        self.flush_all(&mut ws_tx).await
                    }
                },

                Some(event) = internal_rx.recv() => {
                    self.on_internal(event, &mut ws_tx).await
                }

                _ = sleep_until_opt(deadline) => {
                    self.on_deadline(&mut ws_tx).await
                }
            };

            if step.is_err() {
                break;
            }
        }

        self.finish();
    }

    fn finish(self) {
        if let Some(handle) = self.partial_translation {
            handle.abort();
        }
        if let Some(handle) = self.recovery_task {
            handle.abort();
        }
        for handle in self.background_tasks {
            handle.abort();
        }
        // dropping the stream handle makes the driver close the upstream
        drop(self.asr);
    }

    fn track_background(&mut self, handle: AbortHandle) {
        self.background_tasks.retain(|h| !h.is_finished());
        self.background_tasks.push(handle);
    }

    fn next_deadline(&self) -> Option<Instant> {
        [self.finalize.deadline(), self.forced.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    // ── client messages ──────────────────────────────────────────────────

    async fn on_ws_message(&mut self, message: WsMessage, out: &mut WsTx) -> Step {
        let raw = match message {
            WsMessage::Text(raw) => raw,
            WsMessage::Close(_) => return Err(Closed),
            _ => return Ok(()),
        };

        let parsed: ClientMessage = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable_client_message");
                return send(
                    out,
                    &ServerMessage::Warning {
                        message: "unrecognized message".into(),
                        code: Some("bad_message".into()),
                    },
                )
                .await;
            }
        };

        match parsed {
            ClientMessage::Init { .. } => {
                send(
                    out,
                    &ServerMessage::Warning {
                        message: "session already initialized".into(),
                        code: Some("already_initialized".into()),
                    },
                )
                .await
            }
            ClientMessage::Audio { audio_data, .. } => self.on_audio(&audio_data, out).await,
            ClientMessage::AudioEnd => {
                if self.asr.end_of_input().await.is_err() {
                    tracing::warn!("audio_end_after_asr_closed");
                }
                Ok(())
            }
            ClientMessage::ForceCommit => {
                if self.asr.finalize().await.is_err() {
                    tracing::warn!("force_commit_after_asr_closed");
                }
                Ok(())
            }
            ClientMessage::Ping { timestamp } => {
                send(out, &ServerMessage::Pong { timestamp }).await
            }
            ClientMessage::ClientHidden | ClientMessage::ClientVisible => {
                tracing::debug!("client_visibility_changed");
                Ok(())
            }
        }
    }

    async fn on_audio(&mut self, audio_data: &str, out: &mut WsTx) -> Step {
        let pcm = match base64::engine::general_purpose::STANDARD.decode(audio_data) {
            Ok(pcm) => Bytes::from(pcm),
            Err(e) => {
                tracing::debug!(error = %e, "audio_decode_failed");
                return send(
                    out,
                    &ServerMessage::Warning {
                        message: "audio frame is not valid base64".into(),
                        code: Some("bad_audio".into()),
                    },
                )
                .await;
            }
        };

        self.ring.push(pcm.clone(), Instant::now());

        if self.asr.send_audio(pcm).await.is_err() {
            return send(
                out,
                &ServerMessage::Warning {
                    message: "speech recognizer is reconnecting".into(),
                    code: Some("asr_reconnecting".into()),
                },
            )
            .await;
        }
        Ok(())
    }

    // ── ASR events ───────────────────────────────────────────────────────

    async fn on_asr_event(&mut self, event: AsrEvent, out: &mut WsTx) -> Step {
        match event {
            AsrEvent::Transcript {
                text,
                is_partial: true,
                ..
            } => self.on_partial(&text, out).await,
            AsrEvent::Transcript {
                text,
                is_partial: false,
                forced: true,
            } => self.on_forced_final(&text, out).await,
            AsrEvent::Transcript { text, .. } => self.on_final(&text, out).await,
            AsrEvent::Error { code, message } => {
                let fatal = AsrEvent::Error {
                    code,
                    message: String::new(),
                }
                .is_fatal_error();
                if fatal {
                    tracing::error!(?code, message, "asr_fatal_error");
                    send(
                        out,
                        &ServerMessage::Error {
                            message,
                            code: code.map(|c| c.to_string()),
                            persistent: Some(true),
                        },
                    )
                    .await?;
                    Err(Closed)
                } else {
                    tracing::warn!(?code, message, "asr_transient_error");
                    send(
                        out,
                        &ServerMessage::Warning {
                            message: "speech recognizer hiccup, reconnecting".into(),
                            code: Some("asr_transient".into()),
                        },
                    )
                    .await
                }
            }
            AsrEvent::End => {
                tracing::info!("asr_stream_ended");
                self.flush_all(out).await
            }
        }
    }

    async fn on_partial(&mut self, partial_text: &str, out: &mut WsTx) -> Step {
        let now = Instant::now();

        // A buffered forced final gets first claim on the partial: if it
        // extends the buffer, the cut is healed right here and no recovery
        // pass is needed.
        if self.forced.is_buffering() {
            if let Some(extended) = self.forced.extends(partial_text) {
                self.cancel_recovery();
                if let Some(committed) = self.forced.take_merged(&extended, now) {
                    self.commit_final(committed, out).await?;
                    self.tracker.reset();
                }
                return Ok(());
            }
            // non-extending: phase 2 runs to completion; this partial opens
            // the next segment and still goes out live below
        }

        match self.finalize.on_partial(partial_text, now) {
            PartialDisposition::CommitNow => {
                // snapshot excludes the new partial: it belongs to the next
                // segment, not to the one being committed
                let snapshot = self.tracker.snapshot();
                if let Some(committed) = self.finalize.take_for_commit(&snapshot, now) {
                    self.commit_final(committed, out).await?;
                    self.tracker.reset();
                }
            }
            PartialDisposition::Extended
            | PartialDisposition::Hold
            | PartialDisposition::NoPending => {}
        }

        self.tracker.update(partial_text, now);
        self.emit_partial(partial_text, out).await
    }

    async fn on_final(&mut self, final_text: &str, out: &mut WsTx) -> Step {
        let now = Instant::now();

        // an organic final arriving while a forced buffer is held closes out
        // the rotation cut
        if self.forced.is_buffering() {
            let buffered = self
                .forced
                .buffered_text()
                .unwrap_or_default()
                .to_string();
            self.cancel_recovery();

            if let Some(merged) = text::merge_continuation(&buffered, final_text) {
                if let Some(committed) = self.forced.take_merged(&merged, now) {
                    self.commit_final(committed, out).await?;
                    self.tracker.reset();
                }
                return Ok(());
            }

            // unrelated: flush the buffer unchanged, then treat this final
            // as the start of the next segment
            if let Some(committed) = self.forced.resolve_recovery(None, now) {
                self.commit_final(committed, out).await?;
            }
            self.tracker.reset();
        }

        // a pending finalization absorbs continuations instead of emitting
        // two half-sentences
        if let Some(pending_text) = self.finalize.pending().map(|p| p.text.clone()) {
            if let Some(merged) = text::merge_continuation(&pending_text, final_text) {
                self.finalize.update_text(&merged, now);
                return Ok(());
            }

            let snapshot = self.tracker.snapshot();
            if let Some(committed) = self.finalize.take_for_commit(&snapshot, now) {
                self.commit_final(committed, out).await?;
                self.tracker.reset();
            }
        }

        let final_text_to_use = self.best_final_text(final_text, now);

        if FinalizationEngine::should_hold(&final_text_to_use) {
            self.finalize.create(&final_text_to_use, None, now);
            return Ok(());
        }

        self.commit_final(
            CommittedFinal::new(final_text_to_use, FinalSource::Asr, now),
            out,
        )
        .await?;
        self.tracker.reset();
        Ok(())
    }

    async fn on_forced_final(&mut self, forced_text: &str, out: &mut WsTx) -> Step {
        let now = Instant::now();
        let mut buffered = text::collapse_whitespace(forced_text);

        // a pending organic final usually belongs to the same utterance the
        // rotation just cut; fold it into the buffer
        if let Some(pending_text) = self.finalize.pending().map(|p| p.text.clone()) {
            if let Some(merged) = text::merge_continuation(&pending_text, &buffered) {
                buffered = merged;
                self.finalize.clear();
            } else {
                let snapshot = self.tracker.snapshot();
                if let Some(committed) = self.finalize.take_for_commit(&snapshot, now) {
                    self.commit_final(committed, out).await?;
                    self.tracker.reset();
                }
            }
        }

        // back-to-back rotations: merge or flush the previous buffer before
        // replacing it
        if self.forced.is_buffering() {
            self.cancel_recovery();
            let prior = self
                .forced
                .buffered_text()
                .unwrap_or_default()
                .to_string();
            if let Some(merged) = text::merge_continuation(&prior, &buffered) {
                buffered = merged;
                self.forced.clear();
            } else if let Some(committed) = self.forced.resolve_recovery(None, now) {
                self.commit_final(committed, out).await?;
            }
        }

        tracing::debug!(chars = buffered.len(), "forced_final_buffered");
        self.forced.create(&buffered, now);
        Ok(())
    }

    /// The longest defensible text for an organic final: the final itself,
    /// a tracked partial that extends it, or an overlap merge with one.
    fn best_final_text(&self, final_text: &str, now: Instant) -> String {
        let snapshot = self.tracker.snapshot();
        let config = &self.config.segmenter;
        let mut best = text::collapse_whitespace(final_text);

        let candidates = [
            snapshot
                .longest_extends(final_text, config.longest_extension_age, now)
                .map(|e| e.extended_text),
            snapshot
                .latest_extends(final_text, config.latest_extension_age, now)
                .map(|e| e.extended_text),
            snapshot.latest.as_ref().and_then(|p| {
                (p.age(now) <= config.latest_extension_age)
                    .then(|| text::merge_with_overlap(final_text, &p.text))
                    .flatten()
            }),
        ];

        for candidate in candidates.into_iter().flatten() {
            if candidate.len() > best.len() {
                best = text::collapse_whitespace(&candidate);
            }
        }

        best
    }

    // ── timers ───────────────────────────────────────────────────────────

    async fn on_deadline(&mut self, out: &mut WsTx) -> Step {
        let now = Instant::now();

        if self.finalize.is_due(now) {
            let snapshot = self.tracker.snapshot();
            if let Some(committed) = self.finalize.take_for_commit(&snapshot, now) {
                self.commit_final(committed, out).await?;
                self.tracker.reset();
            }
        }

        if self.forced.is_due(now)
            && let Some(action) = self.forced.on_deadline(now)
        {
            self.start_recovery(action);
        }

        Ok(())
    }

    fn start_recovery(&mut self, action: ForcedAction) {
        let config = &self.config.segmenter;
        let window = self
            .ring
            .window_bytes(action.center, config.recovery_pre, config.recovery_post);

        tracing::debug!(
            window_bytes = window.len(),
            buffered_chars = action.buffered_text.len(),
            "recovery_pass_dispatched"
        );

        let recovery = RecoverySession::new(
            DeepgramAdapter,
            self.config.recovery_config(&self.source_lang),
        );
        let tx = self.internal_tx.clone();
        let handle = tokio::spawn(async move {
            let outcome = recovery.recognize(window).await;
            let _ = tx.send(InternalEvent::Recovery(outcome)).await;
        });
        self.recovery_task = Some(handle.abort_handle());
    }

    fn cancel_recovery(&mut self) {
        if let Some(handle) = self.recovery_task.take() {
            handle.abort();
        }
    }

    // ── internal results ─────────────────────────────────────────────────

    async fn on_internal(&mut self, event: InternalEvent, out: &mut WsTx) -> Step {
        match event {
            InternalEvent::Recovery(outcome) => {
                self.recovery_task = None;
                let now = Instant::now();
                if let Some(committed) = self.forced.resolve_recovery(outcome.text.as_deref(), now)
                {
                    self.commit_final(committed, out).await?;
                }
                // the reset waited for the dependent recovery to resolve
                self.tracker.reset();
                Ok(())
            }

            InternalEvent::Translation {
                seq_id,
                original_text,
                is_partial,
                result,
            } => {
                if is_partial {
                    self.partial_translation = None;
                }
                match result {
                    Ok(translated) => {
                        self.emit_update(
                            seq_id,
                            original_text,
                            None,
                            Some(translated),
                            is_partial,
                            Some(UpdateType::Translation),
                            out,
                        )
                        .await
                    }
                    Err(
                        TranslateError::Cancelled
                        | TranslateError::EnglishLeak
                        | TranslateError::SkipRequest,
                    ) => {
                        tracing::debug!(seq_id, "translation_skipped");
                        Ok(())
                    }
                    Err(e) => {
                        // truncated/timeout/transport: the original text in
                        // place beats an empty row
                        tracing::warn!(seq_id, error = %e, "translation_fallback_to_source");
                        let fallback = original_text.clone();
                        self.emit_update(
                            seq_id,
                            original_text,
                            None,
                            Some(fallback),
                            is_partial,
                            Some(UpdateType::Translation),
                            out,
                        )
                        .await
                    }
                }
            }

            InternalEvent::Grammar {
                seq_id,
                original_text,
                result,
            } => {
                match result {
                    Ok(corrected) => {
                        self.grammar_cache.insert(&original_text, &corrected);
                        let effective = self
                            .grammar_cache
                            .get(&original_text)
                            .unwrap_or(&original_text)
                            .to_string();
                        if effective != original_text {
                            return self
                                .emit_update(
                                    seq_id,
                                    original_text,
                                    Some(effective),
                                    None,
                                    false,
                                    Some(UpdateType::Grammar),
                                    out,
                                )
                                .await;
                        }
                        Ok(())
                    }
                    Err(e) => {
                        tracing::debug!(seq_id, error = %e, "grammar_fallback_to_original");
                        Ok(())
                    }
                }
            }
        }
    }

    // ── emit paths ───────────────────────────────────────────────────────

    async fn emit_partial(&mut self, partial_text: &str, out: &mut WsTx) -> Step {
        let message = self.emitter.build_message(
            MessageData {
                original_text: partial_text.to_string(),
                is_transcription_only: self.transcription_only,
                ..Default::default()
            },
            true,
            epoch_ms(),
        );
        let seq_id = message.seq_id;
        send(out, &ServerMessage::Translation(message)).await?;

        if !self.transcription_only {
            self.spawn_partial_translation(seq_id, partial_text);
        }
        Ok(())
    }

    async fn commit_final(&mut self, committed: CommittedFinal, out: &mut WsTx) -> Step {
        let final_text = text::collapse_whitespace(&committed.text);
        if final_text.is_empty() {
            tracing::debug!("empty_final_dropped");
            return Ok(());
        }
        let now = committed.committed_at;

        if let Some(last) = &self.last_final {
            let within =
                now.duration_since(last.at) <= self.config.segmenter.continuation_window;

            if within && text::normalize(&last.text) == text::normalize(&final_text) {
                tracing::debug!(seq_id = last.seq_id, "duplicate_final_skipped");
                return Ok(());
            }

            if within
                && let Some(merged) = text::merge_continuation(&last.text, &final_text)
            {
                let seq_id = last.seq_id;
                tracing::info!(seq_id, "consecutive_finals_merged");
                let message = self.emitter.build_message(
                    MessageData {
                        original_text: merged.clone(),
                        is_transcription_only: self.transcription_only,
                        force_final: Some(true),
                        seq_id: Some(seq_id),
                        ..Default::default()
                    },
                    false,
                    epoch_ms(),
                );
                send(out, &ServerMessage::Translation(message)).await?;
                self.last_final = Some(LastFinal {
                    text: merged.clone(),
                    seq_id,
                    at: now,
                });
                self.spawn_final_work(seq_id, &merged);
                return Ok(());
            }
        }

        let force_final = matches!(
            committed.source,
            FinalSource::Forced | FinalSource::Recovered | FinalSource::Merged
        )
        .then_some(true);

        let message = self.emitter.build_message(
            MessageData {
                original_text: final_text.clone(),
                is_transcription_only: self.transcription_only,
                force_final,
                seq_id: committed.seq_id,
                ..Default::default()
            },
            false,
            epoch_ms(),
        );
        let seq_id = message.seq_id;

        tracing::info!(
            seq_id,
            source = ?committed.source,
            chars = final_text.len(),
            "final_committed"
        );

        send(out, &ServerMessage::Translation(message)).await?;
        self.last_final = Some(LastFinal {
            text: final_text.clone(),
            seq_id,
            at: now,
        });
        self.spawn_final_work(seq_id, &final_text);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_update(
        &mut self,
        seq_id: u64,
        original_text: String,
        corrected_text: Option<String>,
        translated_text: Option<String>,
        is_partial: bool,
        update_type: Option<UpdateType>,
        out: &mut WsTx,
    ) -> Step {
        let message = self.emitter.build_message(
            MessageData {
                original_text,
                corrected_text,
                translated_text,
                is_transcription_only: self.transcription_only,
                update_type,
                seq_id: Some(seq_id),
                ..Default::default()
            },
            is_partial,
            epoch_ms(),
        );
        send(out, &ServerMessage::Translation(message)).await
    }

    fn spawn_partial_translation(&mut self, seq_id: u64, partial_text: &str) {
        // a newer partial supersedes the in-flight one; the aborted task
        // never reports, which is exactly the "silently skip" policy
        if let Some(prior) = self.partial_translation.take() {
            prior.abort();
        }

        let translator = self.translator.clone();
        let text = partial_text.to_string();
        let source_lang = self.source_lang.clone();
        let target_lang = self.target_lang.clone();
        let session_id = self.id.clone();
        let tx = self.internal_tx.clone();

        let handle = tokio::spawn(async move {
            let result = translator
                .translate_partial(TranslateRequest {
                    text: &text,
                    source_lang: &source_lang,
                    target_lang: &target_lang,
                    session_id: &session_id,
                })
                .await;
            let _ = tx
                .send(InternalEvent::Translation {
                    seq_id,
                    original_text: text,
                    is_partial: true,
                    result,
                })
                .await;
        });
        self.partial_translation = Some(handle.abort_handle());
    }

    fn spawn_final_work(&mut self, seq_id: u64, final_text: &str) {
        if !self.transcription_only {
            let translator = self.translator.clone();
            let text = final_text.to_string();
            let source_lang = self.source_lang.clone();
            let target_lang = self.target_lang.clone();
            let session_id = self.id.clone();
            let tx = self.internal_tx.clone();

            let handle = tokio::spawn(async move {
                let result = translator
                    .translate_final(TranslateRequest {
                        text: &text,
                        source_lang: &source_lang,
                        target_lang: &target_lang,
                        session_id: &session_id,
                    })
                    .await;
                let _ = tx
                    .send(InternalEvent::Translation {
                        seq_id,
                        original_text: text,
                        is_partial: false,
                        result,
                    })
                    .await;
            });
            self.track_background(handle.abort_handle());
        }

        let Some(grammar) = self.grammar.clone() else {
            return;
        };

        if let Some(cached) = self.grammar_cache.get(final_text).map(str::to_string) {
            if cached != final_text {
                let event = InternalEvent::Grammar {
                    seq_id,
                    original_text: final_text.to_string(),
                    result: Ok(cached),
                };
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
            return;
        }

        let text = final_text.to_string();
        let language = self.source_lang.clone();
        let tx = self.internal_tx.clone();
        let handle = tokio::spawn(async move {
            let result = grammar.correct(&text, &language).await;
            let _ = tx
                .send(InternalEvent::Grammar {
                    seq_id,
                    original_text: text,
                    result,
                })
                .await;
        });
        self.track_background(handle.abort_handle());
    }

    // ── teardown ─────────────────────────────────────────────────────────

    async fn flush_all(&mut self, out: &mut WsTx) -> Step {
        let now = Instant::now();

        let snapshot = self.tracker.snapshot();
        if let Some(committed) = self.finalize.take_for_commit(&snapshot, now) {
            self.commit_final(committed, out).await?;
        }

        // a recovery already in flight will commit the buffer when it lands;
        // otherwise flush it unchanged now
        if self.forced.phase() == Some(ForcedPhase::WaitingPartials)
            && let Some(committed) = self.forced.resolve_recovery(None, now)
        {
            self.commit_final(committed, out).await?;
        }

        self.tracker.reset();
        Ok(())
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
        }
        None => std::future::pending().await,
    }
}

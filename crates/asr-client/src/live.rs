use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use parley_interface::AsrEvent;

use crate::adapter::{AsrAdapter, StreamParams};
use crate::error::Error;

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct AsrStreamConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub params: StreamParams,
    pub connect_timeout: Duration,
    /// How long one upstream socket lives before we rotate it. Providers cap
    /// stream lifetime around this anyway; rotating on our own schedule lets
    /// us flush a final first instead of losing in-flight words.
    pub rotation_interval: Duration,
    pub keep_alive_interval: Duration,
    /// Reconnect on transient errors and rotations. Recovery sessions turn
    /// this off: they are one-shot by contract.
    pub auto_restart: bool,
}

impl Default for AsrStreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.deepgram.com".into(),
            api_key: None,
            params: StreamParams::default(),
            connect_timeout: Duration::from_secs(5),
            rotation_interval: Duration::from_secs(240),
            keep_alive_interval: Duration::from_secs(8),
            auto_restart: true,
        }
    }
}

#[derive(Debug)]
enum Command {
    Audio(Bytes),
    Finalize,
    EndOfInput,
}

/// A live upstream recognition stream.
///
/// Owns a driver task that holds the socket, forwards audio, parses events,
/// and rotates the connection on schedule. Rotation flushes the provider
/// with a finalize message first; the final that flush produces reaches the
/// consumer marked `forced`.
pub struct AsrStream {
    command_tx: mpsc::Sender<Command>,
    events_rx: Option<mpsc::Receiver<AsrEvent>>,
    task: tokio::task::JoinHandle<()>,
}

impl AsrStream {
    pub async fn connect<A: AsrAdapter>(adapter: A, config: AsrStreamConfig) -> Result<Self, Error> {
        // Fail fast on the first connect so the caller can surface a session
        // error; later reconnects retry with backoff inside the driver.
        let upstream = connect_upstream(&adapter, &config).await?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);

        let task = tokio::spawn(drive(adapter, config, upstream, command_rx, events_tx));

        Ok(Self {
            command_tx,
            events_rx: Some(events_rx),
            task,
        })
    }

    pub async fn send_audio(&self, pcm: Bytes) -> Result<(), Error> {
        self.command_tx
            .send(Command::Audio(pcm))
            .await
            .map_err(|_| Error::StreamClosed)
    }

    /// Ask the provider to flush a final immediately (`force_commit`).
    pub async fn finalize(&self) -> Result<(), Error> {
        self.command_tx
            .send(Command::Finalize)
            .await
            .map_err(|_| Error::StreamClosed)
    }

    /// Signal that no more audio is coming (`audio_end`).
    pub async fn end_of_input(&self) -> Result<(), Error> {
        self.command_tx
            .send(Command::EndOfInput)
            .await
            .map_err(|_| Error::StreamClosed)
    }

    pub async fn next_event(&mut self) -> Option<AsrEvent> {
        match self.events_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Detach the event receiver so a caller can select over it alongside
    /// other sources while keeping this handle for commands.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<AsrEvent>> {
        self.events_rx.take()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

pub(crate) async fn connect_upstream<A: AsrAdapter>(
    adapter: &A,
    config: &AsrStreamConfig,
) -> Result<Upstream, Error> {
    let url = adapter.build_ws_url(&config.api_base, &config.params)?;

    let mut request = url.as_str().into_client_request()?;
    if let Some((name, value)) = adapter.build_auth_header(config.api_key.as_deref()) {
        let value = value.parse().map_err(|_| Error::InvalidAuthHeader)?;
        request.headers_mut().insert(name, value);
    }

    let (mut upstream, _) = tokio::time::timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| Error::ConnectTimeout(config.connect_timeout))??;

    if let Some(initial) = adapter.initial_message(config.api_key.as_deref(), &config.params) {
        upstream.send(initial).await?;
    }

    Ok(upstream)
}

enum SessionEnd {
    /// The consumer is done (handle dropped, end-of-input acknowledged, or
    /// fatal provider error); stop for good.
    Shutdown,
    /// Rotation or transient failure; reconnect if allowed.
    Reconnect,
}

async fn drive<A: AsrAdapter>(
    adapter: A,
    config: AsrStreamConfig,
    first: Upstream,
    mut command_rx: mpsc::Receiver<Command>,
    events_tx: mpsc::Sender<AsrEvent>,
) {
    let mut upstream = Some(first);

    loop {
        let socket = match upstream.take() {
            Some(s) => s,
            None => {
                let reconnect = || connect_upstream(&adapter, &config);
                match reconnect
                    .retry(ExponentialBuilder::default().with_max_times(3))
                    .notify(|err, delay| {
                        tracing::warn!(error = %err, ?delay, "asr_reconnect_retry");
                    })
                    .await
                {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(error = %e, "asr_reconnect_failed");
                        let _ = events_tx
                            .send(AsrEvent::Error {
                                code: None,
                                message: format!("reconnect failed: {e}"),
                            })
                            .await;
                        let _ = events_tx.send(AsrEvent::End).await;
                        return;
                    }
                }
            }
        };

        match run_session(&adapter, &config, socket, &mut command_rx, &events_tx).await {
            SessionEnd::Shutdown => {
                let _ = events_tx.send(AsrEvent::End).await;
                return;
            }
            SessionEnd::Reconnect if config.auto_restart => {
                tracing::info!("asr_stream_rotating");
                continue;
            }
            SessionEnd::Reconnect => {
                let _ = events_tx.send(AsrEvent::End).await;
                return;
            }
        }
    }
}

async fn run_session<A: AsrAdapter>(
    adapter: &A,
    config: &AsrStreamConfig,
    socket: Upstream,
    command_rx: &mut mpsc::Receiver<Command>,
    events_tx: &mpsc::Sender<AsrEvent>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();

    let rotation = tokio::time::sleep(config.rotation_interval);
    tokio::pin!(rotation);
    let mut keep_alive = tokio::time::interval(config.keep_alive_interval);
    keep_alive.reset();

    // Set once we ask the provider to flush for rotation; finals that arrive
    // afterwards are stream-boundary artifacts, not end of speech.
    let mut rotating = false;
    // Set once the consumer said no more audio is coming.
    let mut ending = false;

    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                None => {
                    let _ = sink.send(adapter.end_of_input_message()).await;
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
                Some(Command::Audio(pcm)) => {
                    if let Err(e) = sink.send(adapter.audio_to_message(pcm)).await {
                        tracing::warn!(error = %e, "asr_audio_send_failed");
                        return SessionEnd::Reconnect;
                    }
                }
                Some(Command::Finalize) => {
                    let _ = sink.send(adapter.finalize_message()).await;
                }
                Some(Command::EndOfInput) => {
                    ending = true;
                    let _ = sink.send(adapter.end_of_input_message()).await;
                }
            },

            message = stream.next() => match message {
                Some(Ok(Message::Text(raw))) => {
                    for mut event in adapter.parse_response(&raw) {
                        if rotating
                            && let AsrEvent::Transcript { is_partial: false, forced, .. } = &mut event
                        {
                            *forced = true;
                        }

                        // terminal frames belong to the socket, not the
                        // logical stream; the driver emits the single End
                        if matches!(event, AsrEvent::End) {
                            return if ending {
                                SessionEnd::Shutdown
                            } else {
                                SessionEnd::Reconnect
                            };
                        }

                        let fatal = event.is_fatal_error();
                        let rotation_flush_done = rotating
                            && matches!(event, AsrEvent::Transcript { is_partial: false, .. });

                        if events_tx.send(event).await.is_err() || fatal {
                            return SessionEnd::Shutdown;
                        }
                        if rotation_flush_done {
                            return SessionEnd::Reconnect;
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(rotating, ending, "asr_upstream_closed");
                    return if ending { SessionEnd::Shutdown } else { SessionEnd::Reconnect };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "asr_upstream_error");
                    let _ = events_tx
                        .send(AsrEvent::Error {
                            code: None,
                            message: e.to_string(),
                        })
                        .await;
                    return if ending { SessionEnd::Shutdown } else { SessionEnd::Reconnect };
                }
            },

            _ = &mut rotation => {
                if rotating {
                    tracing::warn!("asr_rotation_flush_timed_out");
                    return SessionEnd::Reconnect;
                }
                rotating = true;
                if sink.send(adapter.finalize_message()).await.is_err() {
                    return SessionEnd::Reconnect;
                }
                // Safety valve: if the flush never produces a final, rotate
                // anyway once the grace period passes.
                rotation.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(2));
            }

            _ = keep_alive.tick() => {
                if let Some(message) = adapter.keep_alive_message() {
                    let _ = sink.send(message).await;
                }
            }
        }
    }
}

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use asr_client::{
    AsrStream, AsrStreamConfig, DeepgramAdapter, RecoveryConfig, RecoverySession, StreamParams,
};
use parley_interface::AsrEvent;

fn results_frame(transcript: &str, is_final: bool, from_finalize: bool) -> String {
    format!(
        r#"{{"type":"Results","is_final":{is_final},"from_finalize":{from_finalize},"channel":{{"alternatives":[{{"transcript":"{transcript}"}}]}}}}"#
    )
}

fn metadata_frame() -> String {
    r#"{"type":"Metadata","request_id":"r","created":"now","duration":1.0,"channels":1}"#.into()
}

/// What the mock upstream should send back for each inbound message.
#[derive(Clone)]
struct MockScript {
    on_binary: Vec<String>,
    on_finalize: Vec<String>,
    on_close_stream: Vec<String>,
    close_after_close_stream: bool,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            on_binary: vec![],
            on_finalize: vec![],
            on_close_stream: vec![],
            close_after_close_stream: true,
        }
    }
}

/// Minimal scripted upstream: accepts connections in a loop, replays the
/// scripted frames in response to client messages. One script for all
/// connections; each test spins up its own server.
async fn start_mock_asr(script: MockScript) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let script = script.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Binary(_) => {
                            for frame in &script.on_binary {
                                let _ = ws.send(Message::Text(frame.clone().into())).await;
                            }
                        }
                        Message::Text(text) if text.contains("Finalize") => {
                            for frame in &script.on_finalize {
                                let _ = ws.send(Message::Text(frame.clone().into())).await;
                            }
                        }
                        Message::Text(text) if text.contains("CloseStream") => {
                            for frame in &script.on_close_stream {
                                let _ = ws.send(Message::Text(frame.clone().into())).await;
                            }
                            if script.close_after_close_stream {
                                let _ = ws.close(None).await;
                                return;
                            }
                        }
                        Message::Close(_) => return,
                        _ => {}
                    }
                }
            });
        }
    });

    addr
}

fn stream_config(addr: SocketAddr) -> AsrStreamConfig {
    AsrStreamConfig {
        api_base: format!("http://{addr}/listen"),
        api_key: Some("test-key".into()),
        params: StreamParams::default(),
        connect_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

#[tokio::test]
async fn forwards_partials_and_finals() {
    let addr = start_mock_asr(MockScript {
        on_binary: vec![
            results_frame("hello wor", false, false),
            results_frame("hello world", true, false),
        ],
        ..Default::default()
    })
    .await;

    let mut stream = AsrStream::connect(DeepgramAdapter, stream_config(addr))
        .await
        .unwrap();

    stream.send_audio(Bytes::from_static(&[0u8; 320])).await.unwrap();

    let first = stream.next_event().await.unwrap();
    assert!(matches!(
        &first,
        AsrEvent::Transcript { is_partial: true, forced: false, .. }
    ));
    assert_eq!(first.text(), Some("hello wor"));

    let second = stream.next_event().await.unwrap();
    assert!(matches!(
        &second,
        AsrEvent::Transcript { is_partial: false, forced: false, .. }
    ));
    assert_eq!(second.text(), Some("hello world"));

    stream.shutdown();
}

#[tokio::test]
async fn end_of_input_produces_single_end_event() {
    let addr = start_mock_asr(MockScript {
        on_binary: vec![results_frame("done now", true, false)],
        on_close_stream: vec![metadata_frame()],
        ..Default::default()
    })
    .await;

    let mut stream = AsrStream::connect(DeepgramAdapter, stream_config(addr))
        .await
        .unwrap();

    stream.send_audio(Bytes::from_static(&[0u8; 320])).await.unwrap();
    assert!(matches!(
        stream.next_event().await.unwrap(),
        AsrEvent::Transcript { .. }
    ));

    stream.end_of_input().await.unwrap();
    assert!(matches!(stream.next_event().await.unwrap(), AsrEvent::End));
    assert!(stream.next_event().await.is_none());
}

#[tokio::test]
async fn rotation_flush_arrives_as_forced_final() {
    let addr = start_mock_asr(MockScript {
        on_binary: vec![results_frame("speaking right n", false, false)],
        on_finalize: vec![results_frame("speaking right n", true, true)],
        ..Default::default()
    })
    .await;

    let mut config = stream_config(addr);
    config.rotation_interval = Duration::from_millis(200);

    let mut stream = AsrStream::connect(DeepgramAdapter, config).await.unwrap();
    stream.send_audio(Bytes::from_static(&[0u8; 320])).await.unwrap();

    assert!(matches!(
        stream.next_event().await.unwrap(),
        AsrEvent::Transcript { is_partial: true, .. }
    ));

    // the rotation timer fires, the driver flushes, and the boundary final
    // comes through marked forced
    let flushed = stream.next_event().await.unwrap();
    assert!(matches!(
        flushed,
        AsrEvent::Transcript { is_partial: false, forced: true, .. }
    ));

    // the stream survives the rotation: audio keeps flowing on a new socket
    stream.send_audio(Bytes::from_static(&[0u8; 320])).await.unwrap();
    let after = stream.next_event().await.unwrap();
    assert_eq!(after.text(), Some("speaking right n"));

    stream.shutdown();
}

#[tokio::test]
async fn recovery_returns_terminal_final() {
    let addr = start_mock_asr(MockScript {
        on_binary: vec![results_frame("best spent fulfil", false, false)],
        on_close_stream: vec![results_frame("best spent fulfilling our own", true, false)],
        ..Default::default()
    })
    .await;

    let session = RecoverySession::new(
        DeepgramAdapter,
        RecoveryConfig {
            api_base: format!("http://{addr}/listen"),
            api_key: Some("test-key".into()),
            ..Default::default()
        },
    );

    let outcome = session.recognize(vec![0u8; 640]).await;
    assert_eq!(outcome.text.as_deref(), Some("best spent fulfilling our own"));
    assert_eq!(outcome.partials, ["best spent fulfil"]);
}

#[tokio::test]
async fn recovery_falls_back_to_last_partial_on_timeout() {
    let addr = start_mock_asr(MockScript {
        on_binary: vec![
            results_frame("best", false, false),
            results_frame("best spent", false, false),
        ],
        on_close_stream: vec![],
        close_after_close_stream: false,
        ..Default::default()
    })
    .await;

    let session = RecoverySession::new(
        DeepgramAdapter,
        RecoveryConfig {
            api_base: format!("http://{addr}/listen"),
            api_key: Some("test-key".into()),
            result_timeout: Duration::from_millis(300),
            ..Default::default()
        },
    );

    let outcome = session.recognize(vec![0u8; 640]).await;
    assert_eq!(outcome.text.as_deref(), Some("best spent"));
}

#[tokio::test]
async fn recovery_of_empty_window_is_empty() {
    let session = RecoverySession::new(DeepgramAdapter, RecoveryConfig::default());
    let outcome = session.recognize(vec![]).await;
    assert!(outcome.text.is_none());
    assert!(outcome.partials.is_empty());
}

#[tokio::test]
async fn recovery_never_panics_when_upstream_is_unreachable() {
    let session = RecoverySession::new(
        DeepgramAdapter,
        RecoveryConfig {
            api_base: "http://127.0.0.1:1/listen".into(),
            writable_timeout: Duration::from_millis(300),
            ..Default::default()
        },
    );

    let outcome = session.recognize(vec![0u8; 640]).await;
    assert!(outcome.text.is_none());
}

//! WebSocket speech-relay server.
//!
//! One session per host connection: PCM frames come in, sequenced partial
//! and final transcript rows (with translations) go out. The segment
//! finalization pipeline lives in `parley-segmenter`; this crate is the
//! async shell that feeds it.

mod config;
mod session;

pub use config::RelayConfig;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;

#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
}

pub fn router(config: RelayConfig) -> Router {
    Router::new()
        .route("/listen", get(listen_handler))
        .with_state(AppState { config })
}

async fn listen_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| session::serve(socket, state.config))
}

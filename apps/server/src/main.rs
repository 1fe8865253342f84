mod env;

use std::net::SocketAddr;

use axum::{Router, body::Body, http::Request};
use tower_http::{
    cors::{self, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::prelude::*;

use parley_relay::RelayConfig;
use parley_translate::{GrammarConfig, TranslatorConfig};

use env::env;

fn relay_config() -> RelayConfig {
    let env = env();

    let mut translator = TranslatorConfig::default();
    if let Some(base) = &env.translator_api_base {
        translator.api_base = base.clone();
    }
    translator.api_key = env.translator_api_key.clone();

    let grammar = env.grammar_api_base.as_ref().map(|base| GrammarConfig {
        api_base: base.clone(),
        api_key: env.grammar_api_key.clone(),
        ..Default::default()
    });

    RelayConfig {
        asr_api_base: env.asr_api_base.clone(),
        asr_api_key: env.asr_api_key.clone(),
        translator,
        grammar,
        ..Default::default()
    }
}

fn app() -> Router {
    Router::new()
        .route("/health", axum::routing::get(health))
        .merge(parley_relay::router(relay_config()))
        .layer(
            CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let path = request.uri().path();
                if path == "/health" {
                    return tracing::Span::none();
                }
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %path,
                )
            }),
        )
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = env();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let addr = SocketAddr::from(([0, 0, 0, 0], env.port));
            tracing::info!(addr = %addr, "server_listening");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app())
                .with_graceful_shutdown(shutdown_signal())
                .await
        })
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("shutdown_signal_received");
}

async fn health() -> &'static str {
    "ok"
}

use std::collections::VecDeque;
use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;

use crate::error::TranslateError;

const CACHE_CAPACITY: usize = 20;

/// A corrected text more than this many times longer than its input is
/// almost certainly a hallucination, not a correction.
const MAX_GROWTH_FACTOR: usize = 3;

/// Session-local cache of grammar corrections, FIFO-evicted.
///
/// Grammar calls are best-effort and frequently repeat (the same final text
/// re-enters after merges); the cache short-circuits those repeats.
#[derive(Debug, Default)]
pub struct GrammarCache {
    entries: VecDeque<(String, String)>,
}

impl GrammarCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(o, _)| o == original)
            .map(|(_, c)| c.as_str())
    }

    /// Store a correction. Oversized corrections are rejected and the
    /// original is cached as its own correction so we do not retry it.
    pub fn insert(&mut self, original: &str, corrected: &str) {
        let accepted = corrected.len() <= original.len().saturating_mul(MAX_GROWTH_FACTOR);
        let stored = if accepted { corrected } else { original };

        if !accepted {
            tracing::warn!(
                original_len = original.len(),
                corrected_len = corrected.len(),
                "grammar_correction_rejected_as_hallucination"
            );
        }

        if self.entries.len() >= CACHE_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((original.to_string(), stored.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GrammarConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8092".into(),
            api_key: None,
            timeout: Duration::from_secs(8),
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    corrected_text: String,
}

/// Best-effort grammar correction client. Every failure falls back to the
/// original text at the call site.
pub struct GrammarClient {
    http: ClientWithMiddleware,
    config: GrammarConfig,
}

impl GrammarClient {
    pub fn new(config: GrammarConfig) -> Self {
        let http = reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build();
        Self { http, config }
    }

    pub async fn correct(&self, text: &str, language: &str) -> Result<String, TranslateError> {
        let url = format!("{}/v1/grammar", self.config.api_base.trim_end_matches('/'));

        let mut request = self.http.post(&url).json(&WireRequest { text, language });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::time::timeout(self.config.timeout, request.send())
            .await
            .map_err(|_| TranslateError::Timeout(self.config.timeout))?
            .map_err(|e| TranslateError::Http(Box::new(e)))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(TranslateError::Provider {
                status,
                message: "grammar service error".into(),
            });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Http(Box::new(e)))?;
        Ok(wire.corrected_text)
    }
}

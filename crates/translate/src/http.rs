use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;

use crate::error::TranslateError;
use crate::translator::{TranslateFuture, TranslateRequest, Translator};

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub partial_timeout: Duration,
    pub final_timeout: Duration,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8091".into(),
            api_key: None,
            partial_timeout: Duration::from_secs(3),
            final_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
    session_id: &'a str,
    model: &'a str,
    partial: bool,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    translated_text: String,
    #[serde(default)]
    truncated: bool,
}

/// Translator backed by the HTTP translation service. The basic and premium
/// tiers share this client and differ only in the model they request.
pub struct HttpTranslator {
    http: ClientWithMiddleware,
    config: TranslatorConfig,
    model: &'static str,
}

impl HttpTranslator {
    pub fn basic(config: &TranslatorConfig) -> Self {
        Self::with_model(config, "standard")
    }

    pub fn premium(config: &TranslatorConfig) -> Self {
        Self::with_model(config, "premium")
    }

    fn with_model(config: &TranslatorConfig, model: &'static str) -> Self {
        let http = reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build();
        Self {
            http,
            config: config.clone(),
            model,
        }
    }

    async fn translate(
        &self,
        req: TranslateRequest<'_>,
        partial: bool,
    ) -> Result<String, TranslateError> {
        let timeout = if partial {
            self.config.partial_timeout
        } else {
            self.config.final_timeout
        };

        let url = format!("{}/v1/translate", self.config.api_base.trim_end_matches('/'));
        let body = WireRequest {
            text: req.text,
            source_lang: req.source_lang,
            target_lang: req.target_lang,
            session_id: req.session_id,
            model: self.model,
            partial,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| TranslateError::Timeout(timeout))?
            .map_err(|e| TranslateError::Http(Box::new(e)))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TranslateError::Http(Box::new(e)))?;

        let translated = parse_translation_response(status, &bytes)?;
        check_english_leak(req.text, &translated)?;
        Ok(translated)
    }
}

impl Translator for HttpTranslator {
    fn translate_partial<'a>(&'a self, req: TranslateRequest<'a>) -> TranslateFuture<'a> {
        Box::pin(self.translate(req, true))
    }

    fn translate_final<'a>(&'a self, req: TranslateRequest<'a>) -> TranslateFuture<'a> {
        Box::pin(self.translate(req, false))
    }
}

/// Map one provider HTTP response onto the error taxonomy.
fn parse_translation_response(status: u16, body: &[u8]) -> Result<String, TranslateError> {
    match status {
        200 => {
            let wire: WireResponse = serde_json::from_slice(body)?;
            if wire.truncated {
                return Err(TranslateError::Truncated);
            }
            Ok(wire.translated_text)
        }
        429 => Err(TranslateError::SkipRequest),
        _ => Err(TranslateError::Provider {
            status,
            message: String::from_utf8_lossy(body).into_owned(),
        }),
    }
}

/// The provider sometimes returns the source text verbatim instead of a
/// translation ("English leak"). Surface it so the caller can skip the
/// update and keep the previous translation visible.
fn check_english_leak(input: &str, output: &str) -> Result<(), TranslateError> {
    if !input.trim().is_empty() && input.trim() == output.trim() {
        return Err(TranslateError::EnglishLeak);
    }
    Ok(())
}

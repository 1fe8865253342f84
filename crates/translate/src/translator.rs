use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parley_interface::Tier;

use crate::error::TranslateError;
use crate::http::{HttpTranslator, TranslatorConfig};

pub type TranslateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, TranslateError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy)]
pub struct TranslateRequest<'a> {
    pub text: &'a str,
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    /// Keyed per session so the provider can schedule sessions fairly.
    pub session_id: &'a str,
}

/// The translation boundary. Partial and final paths are separate because
/// providers run partials through a cheaper low-latency route that may be
/// cancelled when a newer partial supersedes the request.
pub trait Translator: Send + Sync {
    fn translate_partial<'a>(&'a self, req: TranslateRequest<'a>) -> TranslateFuture<'a>;
    fn translate_final<'a>(&'a self, req: TranslateRequest<'a>) -> TranslateFuture<'a>;
}

/// Used when source and target language match: transcription-only sessions
/// still flow through the same pipeline, they just translate to themselves.
#[derive(Debug, Clone, Default)]
pub struct PassthroughTranslator;

impl Translator for PassthroughTranslator {
    fn translate_partial<'a>(&'a self, req: TranslateRequest<'a>) -> TranslateFuture<'a> {
        let text = req.text.to_string();
        Box::pin(async move { Ok(text) })
    }

    fn translate_final<'a>(&'a self, req: TranslateRequest<'a>) -> TranslateFuture<'a> {
        let text = req.text.to_string();
        Box::pin(async move { Ok(text) })
    }
}

/// Pick the concrete translator for a session at init time.
pub fn for_tier(tier: Tier, config: &TranslatorConfig) -> Arc<dyn Translator> {
    match tier {
        Tier::Basic => Arc::new(HttpTranslator::basic(config)),
        Tier::Premium => Arc::new(HttpTranslator::premium(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> TranslateRequest<'_> {
        TranslateRequest {
            text,
            source_lang: "en",
            target_lang: "en",
            session_id: "s",
        }
    }

    #[tokio::test]
    async fn passthrough_returns_input() {
        let translator = PassthroughTranslator;
        let out = translator.translate_partial(request("hello")).await.unwrap();
        assert_eq!(out, "hello");

        let out = translator.translate_final(request("hello.")).await.unwrap();
        assert_eq!(out, "hello.");
    }
}

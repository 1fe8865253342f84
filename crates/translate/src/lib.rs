mod error;
mod grammar;
mod http;
mod translator;

pub use error::TranslateError;
pub use grammar::{GrammarCache, GrammarClient, GrammarConfig};
pub use http::{HttpTranslator, TranslatorConfig};
pub use translator::{
    PassthroughTranslator, TranslateFuture, TranslateRequest, Translator, for_tier,
};

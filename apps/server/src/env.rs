use std::sync::OnceLock;

use serde::Deserialize;

fn default_port() -> u16 {
    8090
}

fn default_asr_api_base() -> String {
    "https://api.deepgram.com".into()
}

#[derive(Deserialize)]
pub struct Env {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_asr_api_base")]
    pub asr_api_base: String,
    #[serde(default)]
    pub asr_api_key: Option<String>,

    #[serde(default)]
    pub translator_api_base: Option<String>,
    #[serde(default)]
    pub translator_api_key: Option<String>,

    #[serde(default)]
    pub grammar_api_base: Option<String>,
    #[serde(default)]
    pub grammar_api_key: Option<String>,
}

static ENV: OnceLock<Env> = OnceLock::new();

pub fn env() -> &'static Env {
    ENV.get_or_init(|| {
        let _ = dotenvy::dotenv();
        envy::from_env().expect("Failed to load environment")
    })
}

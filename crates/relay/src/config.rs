use std::time::Duration;

use parley_asr_client::{AsrStreamConfig, RecoveryConfig, StreamParams};
use parley_segmenter::SegmenterConfig;
use parley_translate::{GrammarConfig, TranslatorConfig};

/// Server-wide configuration shared by every session.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub asr_api_base: String,
    pub asr_api_key: Option<String>,
    pub asr_rotation_interval: Duration,
    pub asr_connect_timeout: Duration,
    pub segmenter: SegmenterConfig,
    pub translator: TranslatorConfig,
    /// Grammar correction is optional; `None` disables the pass entirely.
    pub grammar: Option<GrammarConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            asr_api_base: "https://api.deepgram.com".into(),
            asr_api_key: None,
            asr_rotation_interval: Duration::from_secs(240),
            asr_connect_timeout: Duration::from_secs(5),
            segmenter: SegmenterConfig::default(),
            translator: TranslatorConfig::default(),
            grammar: None,
        }
    }
}

impl RelayConfig {
    pub fn asr_stream_config(&self, language: &str) -> AsrStreamConfig {
        AsrStreamConfig {
            api_base: self.asr_api_base.clone(),
            api_key: self.asr_api_key.clone(),
            params: StreamParams {
                language: language.to_string(),
                ..Default::default()
            },
            connect_timeout: self.asr_connect_timeout,
            rotation_interval: self.asr_rotation_interval,
            ..Default::default()
        }
    }

    pub fn recovery_config(&self, language: &str) -> RecoveryConfig {
        RecoveryConfig {
            api_base: self.asr_api_base.clone(),
            api_key: self.asr_api_key.clone(),
            params: StreamParams {
                language: language.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

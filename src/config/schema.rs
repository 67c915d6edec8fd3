//! Configuration schema for voxlive.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so the JSON config
//! file can use camelCase keys while Rust code uses snake_case fields.

use serde::{Deserialize, Serialize};

/// Live session configuration: model, persona, voice, and audio formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Model identifier for the duplex stream.
    #[serde(default = "default_model")]
    pub model: String,
    /// System persona instruction sent in the connection setup.
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
    /// Prebuilt voice for model speech.
    #[serde(default = "default_voice")]
    pub voice_name: String,
    /// Microphone capture rate in Hz.
    #[serde(default = "default_input_rate")]
    pub input_sample_rate: u32,
    /// Model audio output rate in Hz.
    #[serde(default = "default_output_rate")]
    pub output_sample_rate: u32,
    /// Samples per capture frame.
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,
    /// Transcribe the user's audio on the server side.
    #[serde(default = "default_true")]
    pub input_transcription: bool,
    /// Transcribe the model's audio on the server side.
    #[serde(default = "default_true")]
    pub output_transcription: bool,
}

fn default_model() -> String {
    "gemini-2.5-flash-native-audio-preview-09-2025".to_string()
}

fn default_system_instruction() -> String {
    "You are a helpful voice assistant. Keep responses concise and conversational.".to_string()
}

fn default_voice() -> String {
    "Charon".to_string()
}

fn default_input_rate() -> u32 {
    16_000
}

fn default_output_rate() -> u32 {
    24_000
}

fn default_frame_samples() -> usize {
    4096
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_instruction: default_system_instruction(),
            voice_name: default_voice(),
            input_sample_rate: default_input_rate(),
            output_sample_rate: default_output_rate(),
            frame_samples: default_frame_samples(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

/// User coordinates for location-aware tool grounding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Configuration for the builtin tool executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Model used for search, maps, and low-latency tasks.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
    /// Model used for complex-reasoning tasks.
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    /// Thinking budget (tokens) for complex tasks.
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: u32,
    /// User location, passed to maps grounding when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
}

fn default_fast_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_reasoning_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_thinking_budget() -> u32 {
    8192
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fast_model: default_fast_model(),
            reasoning_model: default_reasoning_model(),
            thinking_budget: default_thinking_budget(),
            location: None,
        }
    }
}

/// Model service endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// WebSocket endpoint for the duplex stream.
    #[serde(default = "default_live_endpoint")]
    pub live_endpoint: String,
    /// HTTP base for tool model calls.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key. Empty means "read from the GEMINI_API_KEY environment".
    #[serde(default)]
    pub api_key: String,
}

fn default_live_endpoint() -> String {
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
        .to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            live_endpoint: default_live_endpoint(),
            api_base: default_api_base(),
            api_key: String::new(),
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key, falling back to the environment.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var("GEMINI_API_KEY").unwrap_or_default()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_audio_rates() {
        let cfg = Config::default();
        assert_eq!(cfg.session.input_sample_rate, 16_000);
        assert_eq!(cfg.session.output_sample_rate, 24_000);
        assert!(cfg.session.input_transcription);
        assert!(cfg.session.output_transcription);
    }

    #[test]
    fn config_accepts_camel_case_keys() {
        let json = r#"{
            "session": {"voiceName": "Puck", "inputSampleRate": 8000},
            "tools": {"fastModel": "x"},
            "provider": {"apiKey": "k"}
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.session.voice_name, "Puck");
        assert_eq!(cfg.session.input_sample_rate, 8000);
        assert_eq!(cfg.tools.fast_model, "x");
        assert_eq!(cfg.provider.api_key, "k");
    }

    #[test]
    fn tools_location_parses_and_defaults_to_none() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert!(cfg.tools.location.is_none());

        let json = r#"{"tools": {"location": {"latitude": 52.52, "longitude": 13.405}}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        let loc = cfg.tools.location.unwrap();
        assert_eq!(loc.latitude, 52.52);
        assert_eq!(loc.longitude, 13.405);
    }

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.session.model, SessionConfig::default().model);
    }
}

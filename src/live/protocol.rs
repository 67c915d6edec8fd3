//! Typed wire messages for the duplex stream.
//!
//! The transport speaks JSON with camelCase keys. Outbound: a single setup
//! message at connect time, then realtime audio input and tool responses.
//! Inbound: server content (transcription fragments, inline audio parts,
//! turn markers) and tool-call batches, several of which may co-occur in
//! one message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StreamError;
use crate::tools::{ToolCallRequest, ToolCallResponse, ToolDeclaration};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Base64 PCM payload with its mime/rate tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolListing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Tool declarations grouped the way the wire expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolListing {
    pub function_declarations: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<InlineData>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMessage {
    pub tool_response: ToolResponsePayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponsePayload {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl ToolResponseMessage {
    /// Wrap one dispatcher response in the wire envelope.
    pub fn from_response(resp: &ToolCallResponse) -> Self {
        Self {
            tool_response: ToolResponsePayload {
                function_responses: vec![FunctionResponse {
                    id: resp.id.clone(),
                    name: resp.name.clone(),
                    response: serde_json::json!({ "result": resp.result }),
                }],
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentMessage {
    pub client_content: ClientContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

impl ClientContentMessage {
    /// A complete one-part user text turn, used for out-of-band prompts
    /// such as reminder announcements.
    pub fn user_text(text: &str) -> Self {
        Self {
            client_content: ClientContent {
                turns: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        text: Some(text.to_string()),
                        inline_data: None,
                    }],
                }],
                turn_complete: true,
            },
        }
    }
}

/// Outbound frames the client writer understands.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    AudioFrame(InlineData),
    ToolResult(ToolCallResponse),
    Text(String),
    Close,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCallBatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub input_transcription: Option<TranscriptionFragment>,
    #[serde(default)]
    pub output_transcription: Option<TranscriptionFragment>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionFragment {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallBatch {
    #[serde(default)]
    pub function_calls: Vec<WireFunctionCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// One parsed inbound event, normalized for the controller. Multiple
/// fields may be populated from a single wire message.
#[derive(Debug, Clone, Default)]
pub struct ServerEvent {
    pub user_fragment: Option<String>,
    pub model_fragment: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub audio: Vec<InlineData>,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl ServerEvent {
    pub fn is_empty(&self) -> bool {
        self.user_fragment.is_none()
            && self.model_fragment.is_none()
            && self.tool_calls.is_empty()
            && self.audio.is_empty()
            && !self.turn_complete
            && !self.interrupted
    }
}

impl ServerMessage {
    /// Flatten a wire message into a controller event.
    pub fn into_event(self) -> ServerEvent {
        let mut event = ServerEvent::default();

        if let Some(content) = self.server_content {
            event.user_fragment = content.input_transcription.map(|t| t.text);
            event.model_fragment = content.output_transcription.map(|t| t.text);
            event.turn_complete = content.turn_complete;
            event.interrupted = content.interrupted;
            if let Some(turn) = content.model_turn {
                event.audio = turn
                    .parts
                    .into_iter()
                    .filter_map(|p| p.inline_data)
                    .collect();
            }
        }

        if let Some(batch) = self.tool_call {
            event.tool_calls = batch
                .function_calls
                .into_iter()
                .map(|c| ToolCallRequest {
                    id: c.id,
                    name: c.name,
                    args: c.args,
                })
                .collect();
        }

        event
    }
}

/// Stream-level delivery to the controller: content, terminal error, or
/// normal close.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Ready,
    Event(ServerEvent),
    Error(StreamError),
    Closed,
}

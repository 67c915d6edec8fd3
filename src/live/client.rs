//! Duplex stream client.
//!
//! [`LiveTransport`] is the seam between the session orchestrator and the
//! network. The production [`WsTransport`] opens a WebSocket, sends the
//! setup message, then runs a writer task fed by an unbounded channel and a
//! read loop that normalizes wire messages into [`StreamEvent`]s. Tests
//! substitute a scripted transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::errors::{ConnectError, StreamError};
use crate::live::protocol::{
    ClientContentMessage, Content, GenerationConfig, InlineData, OutboundFrame, Part,
    PrebuiltVoiceConfig, RealtimeInput, RealtimeInputMessage, ServerMessage, Setup, SetupMessage,
    SpeechConfig, StreamEvent, ToolListing, ToolResponseMessage, VoiceConfig,
};
use crate::tools::{ToolCallResponse, ToolDeclaration};

const ONLINE_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything needed to open one live connection.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub system_instruction: String,
    pub voice_name: String,
    pub declarations: Vec<ToolDeclaration>,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

impl LiveConfig {
    pub fn from_config(config: &Config, declarations: Vec<ToolDeclaration>) -> Self {
        Self {
            endpoint: config.provider.live_endpoint.clone(),
            api_key: config.provider.resolved_api_key(),
            model: config.session.model.clone(),
            system_instruction: config.session.system_instruction.clone(),
            voice_name: config.session.voice_name.clone(),
            declarations,
            input_transcription: config.session.input_transcription,
            output_transcription: config.session.output_transcription,
        }
    }

    fn setup_message(&self) -> SetupMessage {
        let tools = if self.declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolListing {
                function_declarations: self.declarations.clone(),
            }]
        };
        SetupMessage {
            setup: Setup {
                model: format!("models/{}", self.model),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: self.voice_name.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    role: None,
                    parts: vec![Part {
                        text: Some(self.system_instruction.clone()),
                        inline_data: None,
                    }],
                },
                tools,
                input_audio_transcription: self.input_transcription.then(|| serde_json::json!({})),
                output_audio_transcription: self
                    .output_transcription
                    .then(|| serde_json::json!({})),
            },
        }
    }
}

/// Writer half of a live stream. Cloneable; all sends are fire-and-forget
/// and become no-ops once the stream is closed.
#[derive(Clone)]
pub struct StreamHandle {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<AtomicBool>,
}

impl StreamHandle {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            outbound,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue one capture frame for transmission.
    pub fn send_audio_frame(&self, data: InlineData) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(OutboundFrame::AudioFrame(data));
    }

    /// Queue a tool result for transmission.
    pub fn send_tool_result(&self, response: ToolCallResponse) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(OutboundFrame::ToolResult(response));
    }

    /// Queue an out-of-band user text turn, e.g. a reminder announcement.
    pub fn send_text(&self, text: &str) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(OutboundFrame::Text(text.to_string()));
    }

    /// Close the stream. Idempotent; later sends are dropped silently.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(OutboundFrame::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An open duplex stream: the writer handle plus the inbound event feed.
pub struct LiveStream {
    pub handle: StreamHandle,
    pub events: mpsc::UnboundedReceiver<StreamEvent>,
}

/// Network seam for the session orchestrator.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Cheap reachability probe, used to fail fast before any device is
    /// acquired.
    async fn is_online(&self) -> bool;

    /// Open a stream and complete the setup handshake.
    async fn connect(&self, config: &LiveConfig) -> Result<LiveStream, ConnectError>;
}

/// WebSocket transport against the provider's bidirectional endpoint.
pub struct WsTransport {
    probe_host: String,
}

impl WsTransport {
    pub fn new(endpoint: &str) -> Self {
        let probe_host = Url::parse(endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "generativelanguage.googleapis.com".to_string());
        Self { probe_host }
    }
}

#[async_trait]
impl LiveTransport for WsTransport {
    async fn is_online(&self) -> bool {
        matches!(
            tokio::time::timeout(
                ONLINE_PROBE_TIMEOUT,
                TcpStream::connect((self.probe_host.as_str(), 443)),
            )
            .await,
            Ok(Ok(_))
        )
    }

    async fn connect(&self, config: &LiveConfig) -> Result<LiveStream, ConnectError> {
        if config.api_key.is_empty() {
            return Err(ConnectError::InvalidCredentials("no API key".to_string()));
        }
        let url = format!("{}?key={}", config.endpoint, config.api_key);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ConnectError::classify(&e.to_string()))?;
        info!("live stream connected to {}", config.endpoint);

        let (mut write, mut read) = ws.split();

        let setup = serde_json::to_string(&config.setup_message())
            .map_err(|e| ConnectError::InvalidConfig(e.to_string()))?;
        write
            .send(Message::Text(setup))
            .await
            .map_err(|e| ConnectError::classify(&e.to_string()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<StreamEvent>();

        // Writer task: drains queued frames onto the socket.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let payload = match frame {
                    OutboundFrame::AudioFrame(data) => {
                        serde_json::to_string(&RealtimeInputMessage {
                            realtime_input: RealtimeInput {
                                media_chunks: vec![data],
                            },
                        })
                    }
                    OutboundFrame::ToolResult(resp) => {
                        serde_json::to_string(&ToolResponseMessage::from_response(&resp))
                    }
                    OutboundFrame::Text(text) => {
                        serde_json::to_string(&ClientContentMessage::user_text(&text))
                    }
                    OutboundFrame::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                };
                let payload = match payload {
                    Ok(p) => p,
                    Err(e) => {
                        error!("failed to encode outbound frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(payload)).await {
                    debug!("write after stream shutdown: {e}");
                    break;
                }
            }
        });

        // Read loop: normalizes wire messages and delivers terminal
        // error/close exactly once.
        let reader_events = events_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let text = match message {
                    Ok(Message::Text(t)) => t,
                    Ok(Message::Binary(b)) => match String::from_utf8(b) {
                        Ok(t) => t,
                        Err(_) => {
                            warn!("dropping non-utf8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = reader_events.send(StreamEvent::Error(StreamError::new(
                            e.to_string(),
                        )));
                        return;
                    }
                };
                let parsed: ServerMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("unparseable server message: {e}");
                        continue;
                    }
                };
                if parsed.setup_complete.is_some() {
                    let _ = reader_events.send(StreamEvent::Ready);
                    continue;
                }
                let event = parsed.into_event();
                if !event.is_empty() {
                    let _ = reader_events.send(StreamEvent::Event(event));
                }
            }
            let _ = reader_events.send(StreamEvent::Closed);
        });

        Ok(LiveStream {
            handle: StreamHandle::new(outbound_tx),
            events: events_rx,
        })
    }
}

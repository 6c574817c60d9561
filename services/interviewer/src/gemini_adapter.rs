use anyhow::{Context, Result};
use async_trait::async_trait;
use gemini_realtime::types::{ServerEvent, ServerMessage, Setup};
use gemini_realtime::{ServerRx, UsageStats};
use interview_core::Event;
use interview_core::generic_types::{GenericServerEvent, GenericSessionConfig};
use interview_core::realtime_api::RealtimeApi;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_VOICE;

/// The parts of a Live API connection the adapter drives.
#[async_trait]
pub trait LiveClient: Send + Sync {
    async fn setup(&mut self, setup: Setup) -> Result<()>;
    async fn send_text(&mut self, text: String) -> Result<()>;
    fn send_audio(&self, pcm16_base64: String) -> Result<()>;
    fn send_video(&self, jpeg_base64: String) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
    fn usage(&self) -> Option<UsageStats>;
}

#[async_trait]
impl LiveClient for gemini_realtime::Client {
    async fn setup(&mut self, setup: Setup) -> Result<()> {
        gemini_realtime::Client::setup(self, setup).await
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        gemini_realtime::Client::send_text(self, text).await
    }

    fn send_audio(&self, pcm16_base64: String) -> Result<()> {
        gemini_realtime::Client::send_audio(self, pcm16_base64)
    }

    fn send_video(&self, jpeg_base64: String) -> Result<()> {
        gemini_realtime::Client::send_video(self, jpeg_base64)
    }

    async fn close(&mut self) -> Result<()> {
        gemini_realtime::Client::close(self).await
    }

    fn usage(&self) -> Option<UsageStats> {
        self.stats().ok()
    }
}

/// An adapter that implements the generic `RealtimeApi` trait on top of a Gemini Live connection.
pub struct GeminiAdapter<C: LiveClient = gemini_realtime::Client> {
    client: C,
    model: String,
}

impl GeminiAdapter {
    /// Connects and returns the adapter together with the connection's event stream.
    pub async fn connect(config: gemini_realtime::Config) -> Result<(Self, ServerRx)> {
        let client = gemini_realtime::connect_with_config(1024, config)
            .await
            .context("Failed to connect to Gemini Live")?;
        let events = client.server_events()?;
        let model = client.model().to_string();
        Ok((Self { client, model }, events))
    }
}

impl<C: LiveClient> GeminiAdapter<C> {
    fn setup_for(&self, config: &GenericSessionConfig) -> Setup {
        Setup::new(&self.model)
            .with_modalities_enable_audio()
            .with_voice(config.voice.as_deref().unwrap_or(DEFAULT_VOICE))
            .with_instructions(&config.instructions)
            .with_input_audio_transcription_enable()
            .with_output_audio_transcription_enable()
    }
}

#[async_trait]
impl<C: LiveClient> RealtimeApi for GeminiAdapter<C> {
    async fn update_session(&mut self, config: GenericSessionConfig) -> Result<()> {
        let setup = self.setup_for(&config);
        tracing::debug!("Session setup: {:?}", serde_json::to_string(&setup)?);
        self.client
            .setup(setup)
            .await
            .context("Failed to send session setup")
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.client.send_text(text).await
    }

    fn send_audio(&mut self, pcm16_base64: String) -> Result<()> {
        self.client.send_audio(pcm16_base64)
    }

    fn send_image(&mut self, jpeg_base64: String) -> Result<()> {
        self.client.send_video(jpeg_base64)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(usage) = self.client.usage() {
            tracing::info!(
                "Token usage: total {}, prompt {}, response {}",
                usage.total_tokens(),
                usage.prompt_tokens(),
                usage.response_tokens()
            );
        }
        self.client.close().await
    }
}

/// Translates one Live API event into the generic events it stands for, in
/// the order the controller must see them.
pub fn translate(event: ServerEvent) -> Vec<GenericServerEvent> {
    match event {
        ServerEvent::Message(message) => translate_message(message),
        ServerEvent::Closed { reason } => vec![GenericServerEvent::Closed(reason)],
        ServerEvent::Error(error) => vec![GenericServerEvent::Error(error)],
    }
}

fn translate_message(message: ServerMessage) -> Vec<GenericServerEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(GenericServerEvent::SetupComplete);
    }

    if let Some(content) = message.server_content {
        if let Some(transcription) = content.output_transcription {
            if !transcription.text.is_empty() {
                events.push(GenericServerEvent::OutputTranscription(transcription.text));
            }
        }
        if let Some(transcription) = content.input_transcription {
            if !transcription.text.is_empty() {
                events.push(GenericServerEvent::InputTranscription(transcription.text));
            }
        }
        if let Some(model_turn) = content.model_turn {
            for part in model_turn.parts {
                if let Some(blob) = part.inline_data {
                    if blob.mime_type.starts_with("audio/") {
                        events.push(GenericServerEvent::Audio(blob.data));
                    } else {
                        tracing::debug!("Ignoring inline data of type {}", blob.mime_type);
                    }
                }
            }
        }
        if content.interrupted == Some(true) {
            events.push(GenericServerEvent::Interrupted);
        }
        if content.turn_complete == Some(true) {
            events.push(GenericServerEvent::TurnComplete);
        }
    }

    if let Some(go_away) = message.go_away {
        tracing::warn!(
            "Server is closing the session soon (time left: {})",
            go_away.time_left.as_deref().unwrap_or("unknown")
        );
    }

    events
}

/// Forwards translated server events to the controller until the connection
/// ends or the controller goes away.
pub fn spawn_event_pump(mut server_events: ServerRx, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match server_events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Gemini event stream lagged by {} messages.", n);
                    continue;
                }
                Err(RecvError::Closed) => {
                    tracing::info!("Gemini event channel closed.");
                    break;
                }
            };
            let terminal = !matches!(event, ServerEvent::Message(_));
            for generic in translate(event) {
                if tx.send(Event::Remote(generic)).await.is_err() {
                    tracing::debug!("Controller gone, stopping Gemini event pump.");
                    return;
                }
            }
            if terminal {
                break;
            }
        }
    })
}

use crate::client::stats::Stats;
use crate::types::{ClientMessage, RealtimeInput, ServerEvent, ServerMessage, Setup};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio_tungstenite::tungstenite::Message;

mod config;
pub(crate) mod consts;
mod stats;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use consts::{AUDIO_INPUT_MIME_TYPE, DEFAULT_MODEL, IMAGE_MIME_TYPE};
pub use stats::Stats as UsageStats;

/// Messages accepted by the writer task.
#[derive(Debug)]
pub enum Outbound {
    Message(ClientMessage),
    Close,
}

pub type ClientTx = tokio::sync::mpsc::Sender<Outbound>;
type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;

struct Connection {
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

/// A client for the Gemini Live bidirectional WebSocket API.
///
/// Writes go through a bounded channel drained by a writer task; every
/// inbound frame is parsed by a reader task and broadcast as a
/// [`ServerEvent`] to all subscribers.
pub struct Client {
    capacity: usize,
    config: Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    stats: Arc<Mutex<Stats>>,
    connection: Option<Connection>,
}

impl Client {
    fn new(capacity: usize, config: Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            stats: Arc::new(Mutex::new(Stats::new())),
            connection: None,
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("Failed to connect to Gemini Live WebSocket")?;
        tracing::info!("Connected to Gemini Live ({})", self.config.model());

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<Outbound>(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());

        let send_handle = tokio::spawn(async move {
            while let Some(outbound) = c_rx.recv().await {
                match outbound {
                    Outbound::Message(message) => match serde_json::to_string(&message) {
                        Ok(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                tracing::error!("failed to send message: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to serialize message: {}", e);
                        }
                    },
                    Outbound::Close => {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            tracing::debug!("failed to send close frame: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        let stats = self.stats.clone();
        let recv_handle = tokio::spawn(async move {
            let mut closed_reason = None;
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        if s_tx.send(ServerEvent::Error(e.to_string())).is_err() {
                            tracing::debug!("no subscribers for error event");
                        }
                        return;
                    }
                    Ok(message) => message,
                };
                // The Live API delivers JSON in binary frames as often as in text frames.
                let text = match message {
                    Message::Text(text) => text,
                    Message::Binary(bin) => match String::from_utf8(bin) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("unexpected non-utf8 binary message: {}", e);
                            continue;
                        }
                    },
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        closed_reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    _ => continue,
                };

                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => {
                        if let Some(usage) = &message.usage_metadata {
                            if let Ok(mut stats_guard) = stats.lock() {
                                stats_guard.update_usage(
                                    usage.total_token_count,
                                    usage.prompt_token_count,
                                    usage.response_token_count,
                                );
                            } else {
                                tracing::error!("failed to update stats");
                            }
                        }
                        if s_tx.send(ServerEvent::Message(message)).is_err() {
                            tracing::debug!("no subscribers for server message");
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to deserialize message: {}, text=> {:?}", e, text);
                    }
                }
            }
            if s_tx
                .send(ServerEvent::Closed {
                    reason: closed_reason,
                })
                .is_err()
            {
                tracing::debug!("no subscribers for close event");
            }
        });

        self.connection = Some(Connection {
            send_handle,
            recv_handle,
        });
        Ok(())
    }

    pub fn server_events(&self) -> Result<ServerRx> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    pub fn stats(&self) -> Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    async fn send_client_message(&mut self, message: ClientMessage) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(Outbound::Message(message))
                    .await
                    .map_err(|_| anyhow::anyhow!("connection writer has stopped"))?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    // Streaming media must never stall the caller; a full queue drops the chunk.
    fn try_send_client_message(&self, message: ClientMessage) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => tx
                .try_send(Outbound::Message(message))
                .map_err(|e| anyhow::anyhow!("failed to queue realtime input: {}", e)),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    pub async fn setup(&mut self, setup: Setup) -> Result<()> {
        self.send_client_message(ClientMessage::Setup(setup)).await
    }

    pub async fn send_text(&mut self, text: String) -> Result<()> {
        self.send_client_message(ClientMessage::RealtimeInput(RealtimeInput::text(text)))
            .await
    }

    /// Queues one chunk of base64 PCM16 mono audio at 16 kHz.
    pub fn send_audio(&self, pcm16_base64: String) -> Result<()> {
        self.try_send_client_message(ClientMessage::RealtimeInput(RealtimeInput::audio(
            pcm16_base64,
            AUDIO_INPUT_MIME_TYPE,
        )))
    }

    /// Queues one base64 JPEG frame.
    pub fn send_video(&self, jpeg_base64: String) -> Result<()> {
        self.try_send_client_message(ClientMessage::RealtimeInput(RealtimeInput::video(
            jpeg_base64,
            IMAGE_MIME_TYPE,
        )))
    }

    pub async fn close(&mut self) -> Result<()> {
        match self.c_tx.take() {
            Some(tx) => {
                tx.send(Outbound::Close)
                    .await
                    .map_err(|_| anyhow::anyhow!("connection writer has stopped"))?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.recv_handle.abort();
            if self.c_tx.is_some() {
                connection.send_handle.abort();
            }
        }
    }
}

pub async fn connect_with_config(capacity: usize, config: Config) -> Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

pub async fn connect(api_key: &str) -> Result<Client> {
    let config = Config::builder().with_api_key(api_key).build();
    connect_with_config(1024, config).await
}

use crate::generic_types::GenericSessionConfig;
use anyhow::Result;
use async_trait::async_trait;

/// A real-time, bidirectional conversational session.
///
/// Inbound traffic does not go through this trait: implementations forward
/// it to the controller as `Event::Remote`.
#[async_trait]
pub trait RealtimeApi: Send + Sync {
    /// Sends the opening configuration block.
    async fn update_session(&mut self, config: GenericSessionConfig) -> Result<()>;

    /// Sends a finalized utterance as a text turn.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Queues a base64 PCM16 microphone chunk. Must not wait on the network.
    fn send_audio(&mut self, pcm16_base64: String) -> Result<()>;

    /// Queues a base64 JPEG camera frame. Must not wait on the network.
    fn send_image(&mut self, jpeg_base64: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

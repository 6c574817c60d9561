mod client;
pub mod types;

pub use client::{
    AUDIO_INPUT_MIME_TYPE, Client, ClientTx, Config, ConfigBuilder, DEFAULT_MODEL, IMAGE_MIME_TYPE,
    Outbound, ServerRx, UsageStats, connect, connect_with_config,
};

pub mod camera;
pub mod config;
pub mod console;
pub mod deepgram;
pub mod gemini_adapter;
pub mod microphone;
pub mod playback;
pub mod prompt_loader;

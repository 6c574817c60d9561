pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

pub const HOST: &str = "wss://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

pub const AUDIO_INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

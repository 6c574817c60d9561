//! Wire types for the Gemini Live `BidiGenerateContent` WebSocket.
//!
//! Every client message is a JSON object with exactly one top-level key
//! (`setup`, `realtimeInput`, ...). Server messages carry any subset of
//! `setupComplete`, `serverContent`, `usageMetadata` and `goAway`.

// Outgoing messages
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    model: String,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl Setup {
    /// `model` may be given with or without the `models/` prefix.
    pub fn new(model: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        Self {
            model,
            generation_config: GenerationConfig::default(),
            system_instruction: None,
            input_audio_transcription: None,
            output_audio_transcription: None,
        }
    }

    pub fn with_modalities_enable_audio(mut self) -> Self {
        self.generation_config.response_modalities = vec![Modality::Audio];
        self
    }

    pub fn with_modalities_enable_text(mut self) -> Self {
        self.generation_config.response_modalities = vec![Modality::Text];
        self
    }

    pub fn with_voice(mut self, voice_name: &str) -> Self {
        self.generation_config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.to_string(),
                },
            },
        });
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.system_instruction = Some(Content {
            parts: vec![Part::text(instructions)],
        });
        self
    }

    pub fn with_input_audio_transcription_enable(mut self) -> Self {
        self.input_audio_transcription = Some(AudioTranscriptionConfig {});
        self
    }

    pub fn with_output_audio_transcription_enable(mut self) -> Self {
        self.output_audio_transcription = Some(AudioTranscriptionConfig {});
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> Option<&str> {
        self.system_instruction
            .as_ref()
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Text,
    Audio,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    voice_name: String,
}

/// Serialized as `{}`; its presence alone switches transcription on.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AudioTranscriptionConfig {}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Part {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl RealtimeInput {
    pub fn audio(data: String, mime_type: &str) -> Self {
        Self {
            audio: Some(Blob::new(data, mime_type)),
            ..Default::default()
        }
    }

    pub fn video(data: String, mime_type: &str) -> Self {
        Self {
            video: Some(Blob::new(data, mime_type)),
            ..Default::default()
        }
    }

    pub fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }
}

/// Base64 payload tagged with its MIME type.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    mime_type: String,
    data: String,
}

impl Blob {
    pub fn new(data: String, mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data,
        }
    }
}

// Incoming messages
#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<LiveServerContent>,
    pub usage_metadata: Option<UsageMetadata>,
    pub go_away: Option<GoAway>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct SetupComplete {}

#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerContent {
    pub model_turn: Option<ServerContentTurn>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
    pub generation_complete: Option<bool>,
    pub input_transcription: Option<ServerTranscription>,
    pub output_transcription: Option<ServerTranscription>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct ServerContentTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<ServerBlob>,
}

#[derive(serde::Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct ServerTranscription {
    #[serde(default)]
    pub text: String,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: i32,
    #[serde(default)]
    pub response_token_count: i32,
    #[serde(default)]
    pub total_token_count: i32,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    pub time_left: Option<String>,
}

/// What the client's reader task broadcasts to subscribers.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Message(ServerMessage),
    Closed { reason: Option<String> },
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setup_serializes_to_live_api_shape() {
        let setup = Setup::new("gemini-2.5-flash-native-audio-preview-09-2025")
            .with_modalities_enable_audio()
            .with_voice("Kore")
            .with_instructions("You are an interviewer.")
            .with_input_audio_transcription_enable()
            .with_output_audio_transcription_enable();

        let value = serde_json::to_value(ClientMessage::Setup(setup)).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/gemini-2.5-flash-native-audio-preview-09-2025",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Kore" } }
                        }
                    },
                    "systemInstruction": { "parts": [{ "text": "You are an interviewer." }] },
                    "inputAudioTranscription": {},
                    "outputAudioTranscription": {}
                }
            })
        );
    }

    #[test]
    fn model_prefix_is_not_doubled() {
        assert_eq!(Setup::new("models/foo").model(), "models/foo");
    }

    #[test]
    fn realtime_input_only_carries_one_payload() {
        let audio = serde_json::to_value(ClientMessage::RealtimeInput(RealtimeInput::audio(
            "AAAA".to_string(),
            "audio/pcm;rate=16000",
        )))
        .unwrap();
        assert_eq!(
            audio,
            json!({ "realtimeInput": { "audio": { "mimeType": "audio/pcm;rate=16000", "data": "AAAA" } } })
        );

        let text = serde_json::to_value(ClientMessage::RealtimeInput(RealtimeInput::text(
            "I have five years of experience.".to_string(),
        )))
        .unwrap();
        assert_eq!(
            text,
            json!({ "realtimeInput": { "text": "I have five years of experience." } })
        );
    }

    #[test]
    fn server_content_deserializes() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": { "parts": [ { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQID" } } ] },
                "outputTranscription": { "text": "Tell me about" },
                "interrupted": true
            }
        }"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = message.server_content.unwrap();
        let parts = content.model_turn.unwrap().parts;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].inline_data.as_ref().unwrap().data, "AQID");
        assert_eq!(content.output_transcription.unwrap().text, "Tell me about");
        assert_eq!(content.interrupted, Some(true));
        assert_eq!(content.turn_complete, None);
    }

    #[test]
    fn setup_complete_and_usage_deserialize() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(message.setup_complete.is_some());
        assert!(message.server_content.is_none());

        let message: ServerMessage = serde_json::from_str(
            r#"{"usageMetadata":{"promptTokenCount":10,"responseTokenCount":5,"totalTokenCount":15}}"#,
        )
        .unwrap();
        let usage = message.usage_metadata.unwrap();
        assert_eq!(usage.total_token_count, 15);
        assert_eq!(usage.prompt_token_count, 10);
    }
}

/// Provider-independent configuration for opening a remote session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericSessionConfig {
    pub instructions: String,
    /// Prebuilt voice for the spoken responses; `None` keeps the provider default.
    pub voice: Option<String>,
}

/// Provider-independent events coming back from the remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericServerEvent {
    /// The session accepted its configuration.
    SetupComplete,
    /// Transcription of the interviewer's speech for the current turn.
    OutputTranscription(String),
    /// The provider's own transcription of the uplinked microphone audio.
    InputTranscription(String),
    /// One base64 PCM16 chunk of synthesized speech.
    Audio(String),
    TurnComplete,
    /// The provider detected the candidate talking over the response.
    Interrupted,
    Error(String),
    Closed(Option<String>),
}

pub mod controller;
pub mod error;
pub mod generic_types;
pub mod interview;
pub mod player;
pub mod realtime_api;
pub mod recognizer;
pub mod session_state;
pub mod transcript;
pub mod transcription;
pub mod uplink;

use generic_types::GenericServerEvent;
use player::VoiceId;
use recognizer::RecognizerEvent;

/// Everything the runtime feeds into the `SessionController`.
///
/// Producers (device callbacks, socket readers, the frame sampler, the
/// shutdown signal) only post events; the controller processes them one at
/// a time on its own task.
#[derive(Debug)]
pub enum Event {
    Recognizer(RecognizerEvent),
    Remote(GenericServerEvent),
    /// The playback device finished a voice.
    PlaybackFinished(VoiceId),
    /// Mono microphone samples at the capture device's rate.
    Microphone(Vec<f32>),
    /// A base64 JPEG camera frame.
    Frame(String),
    /// The candidate ended the interview.
    Stop,
}

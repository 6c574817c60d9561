//! Streaming speech-to-text over the Deepgram live WebSocket.
//!
//! Each recognizer run is one WebSocket connection. Microphone audio reaches
//! it through the [`AudioTap`]; results go to the controller as
//! `Event::Recognizer` tagged with the run they belong to.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use interview_core::Event;
use interview_core::recognizer::{
    RecognitionResult, Recognizer, RecognizerError, RecognizerEvent, RunId,
};
use interview_native_utils::audio::{self, ChunkedResampler, ToBinary};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::microphone::AudioTap;

const LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";
const CLOSE_STREAM: &str = r#"{"type":"CloseStream"}"#;
/// Input frames per resampler chunk before audio is sent.
const CHUNK_SIZE: usize = 1024;
const AUDIO_QUEUE: usize = 64;

pub struct DeepgramSettings {
    pub api_key: SecretString,
    pub model: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    #[serde(rename = "type")]
    response_type: String,
    channel: Option<DeepgramChannel>,
    is_final: Option<bool>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

fn build_url(settings: &DeepgramSettings) -> Result<Url> {
    let mut url = Url::parse(LISTEN_URL).context("Invalid Deepgram URL")?;
    url.query_pairs_mut()
        .append_pair("encoding", "linear16")
        .append_pair(
            "sample_rate",
            &(audio::GEMINI_INPUT_PCM16_SAMPLE_RATE as u32).to_string(),
        )
        .append_pair("channels", "1")
        .append_pair("interim_results", "true")
        .append_pair("punctuate", "true")
        .append_pair("smart_format", "true")
        .append_pair("model", &settings.model)
        .append_pair("language", &settings.language);
    Ok(url)
}

fn build_request(settings: &DeepgramSettings) -> Result<Request> {
    let url = build_url(settings)?;
    let mut request = url.as_str().into_client_request()?;
    let token = format!("Token {}", settings.api_key.expose_secret());
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&token).context("Invalid Deepgram API key")?,
    );
    Ok(request)
}

/// Maps one text frame to a recognizer event. Metadata, unknown frames and
/// results without words yield `None`; Deepgram keeps sending the latter
/// while the microphone hears silence.
fn parse_message(run: RunId, text: &str) -> Option<RecognizerEvent> {
    let response: DeepgramResponse = match serde_json::from_str(text) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Failed to parse Deepgram message: {}", e);
            return None;
        }
    };
    match response.response_type.as_str() {
        "Results" => {
            let transcript = response
                .channel
                .and_then(|channel| channel.alternatives.into_iter().next())
                .map(|alternative| alternative.transcript)
                .unwrap_or_default();
            if transcript.trim().is_empty() {
                return None;
            }
            Some(RecognizerEvent::Results {
                run,
                result_index: 0,
                results: vec![RecognitionResult {
                    transcript,
                    is_final: response.is_final.unwrap_or(false),
                }],
            })
        }
        "Error" => Some(RecognizerEvent::Error {
            run,
            error: RecognizerError::Other(response.description.unwrap_or_default()),
        }),
        other => {
            tracing::trace!("Ignoring Deepgram {} message", other);
            None
        }
    }
}

fn classify_connect_error(error: &tungstenite::Error) -> RecognizerError {
    match error {
        tungstenite::Error::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            RecognizerError::PermissionDenied(format!("Deepgram rejected the key ({})", response.status()))
        }
        other => RecognizerError::Network(other.to_string()),
    }
}

struct ActiveRun {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct DeepgramRecognizer {
    settings: DeepgramSettings,
    input_sample_rate: f64,
    tap: AudioTap,
    events: mpsc::Sender<Event>,
    active: Option<ActiveRun>,
}

impl DeepgramRecognizer {
    pub fn new(
        settings: DeepgramSettings,
        input_sample_rate: f64,
        tap: AudioTap,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            settings,
            input_sample_rate,
            tap,
            events,
            active: None,
        }
    }
}

impl Recognizer for DeepgramRecognizer {
    fn start(&mut self, run: RunId) -> Result<()> {
        self.stop();
        let request = build_request(&self.settings)?;
        let resampler = ChunkedResampler::new(
            self.input_sample_rate,
            audio::GEMINI_INPUT_PCM16_SAMPLE_RATE,
            CHUNK_SIZE,
        )?;
        let audio_rx = self.tap.attach(AUDIO_QUEUE);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(stream_run(
            run,
            request,
            resampler,
            audio_rx,
            stop_rx,
            self.events.clone(),
        ));
        self.active = Some(ActiveRun { stop_tx, task });
        Ok(())
    }

    fn stop(&mut self) {
        self.tap.detach();
        if let Some(active) = self.active.take() {
            if active.stop_tx.send(()).is_err() {
                tracing::trace!("Recognizer run already finished");
            }
        }
    }
}

impl Drop for DeepgramRecognizer {
    fn drop(&mut self) {
        self.tap.detach();
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

async fn report(events: &mpsc::Sender<Event>, event: RecognizerEvent) -> bool {
    events.send(Event::Recognizer(event)).await.is_ok()
}

async fn stream_run(
    run: RunId,
    request: Request,
    mut resampler: ChunkedResampler,
    mut audio_rx: mpsc::Receiver<Vec<f32>>,
    mut stop_rx: oneshot::Receiver<()>,
    events: mpsc::Sender<Event>,
) {
    let ws_stream = match tokio_tungstenite::connect_async(request).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::error!("Failed to connect to Deepgram: {}", e);
            let error = classify_connect_error(&e);
            let permanent = matches!(error, RecognizerError::PermissionDenied(_));
            if report(&events, RecognizerEvent::Error { run, error }).await && !permanent {
                report(&events, RecognizerEvent::Ended { run }).await;
            }
            return;
        }
    };
    tracing::debug!("Deepgram stream open (run {})", run);

    let (mut sink, mut stream) = ws_stream.split();
    let mut tapped = true;
    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                if let Err(e) = sink.send(Message::Text(CLOSE_STREAM.to_string())).await {
                    tracing::debug!("Failed to close Deepgram stream: {}", e);
                }
                tracing::debug!("Deepgram stream stopped (run {})", run);
                return;
            }
            samples = audio_rx.recv(), if tapped => {
                let Some(samples) = samples else {
                    // Tap detached; a stop signal follows.
                    tapped = false;
                    continue;
                };
                let pcm = resampler.push(&samples);
                if pcm.is_empty() {
                    continue;
                }
                if let Err(e) = sink.send(Message::Binary(pcm.to_binary())).await {
                    tracing::warn!("Failed to send audio to Deepgram: {}", e);
                    let error = RecognizerError::Network(e.to_string());
                    report(&events, RecognizerEvent::Error { run, error }).await;
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_message(run, &text) {
                        if !report(&events, event).await {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("Deepgram closed the stream: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Deepgram stream error: {}", e);
                    let error = RecognizerError::Network(e.to_string());
                    report(&events, RecognizerEvent::Error { run, error }).await;
                    break;
                }
                None => break,
            },
        }
    }
    report(&events, RecognizerEvent::Ended { run }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::transcription::{Due, TranscriptionAdapter, TranscriptionTimings, Update};
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_tungstenite::tungstenite::http::Response;

    fn settings() -> DeepgramSettings {
        DeepgramSettings {
            api_key: SecretString::from("dg-secret".to_string()),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
        }
    }

    #[test]
    fn listen_url_requests_interim_linear16_at_16k() {
        let url = build_url(&settings()).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(url.host_str(), Some("api.deepgram.com"));
        assert_eq!(get("encoding"), Some("linear16"));
        assert_eq!(get("sample_rate"), Some("16000"));
        assert_eq!(get("interim_results"), Some("true"));
        assert_eq!(get("model"), Some("nova-2"));
        assert_eq!(get("language"), Some("en-US"));
    }

    #[test]
    fn request_carries_token_authorization() {
        let request = build_request(&settings()).unwrap();
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Token dg-secret"
        );
    }

    #[test]
    fn results_map_to_a_single_result_batch() {
        let text = r#"{
            "type": "Results",
            "channel": { "alternatives": [ { "transcript": "I have five", "confidence": 0.9 } ] },
            "is_final": false,
            "speech_final": false
        }"#;
        assert_eq!(
            parse_message(3, text),
            Some(RecognizerEvent::Results {
                run: 3,
                result_index: 0,
                results: vec![RecognitionResult::interim("I have five")],
            })
        );

        let text = r#"{"type":"Results","channel":{"alternatives":[{"transcript":"Done."}]},"is_final":true}"#;
        let Some(RecognizerEvent::Results { results, .. }) = parse_message(3, text) else {
            panic!("expected results");
        };
        assert!(results[0].is_final);
    }

    struct IdleRecognizer;

    impl Recognizer for IdleRecognizer {
        fn start(&mut self, _run: RunId) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    #[test]
    fn silence_after_an_answer_lets_it_finalize() {
        let mut adapter = TranscriptionAdapter::new(IdleRecognizer, TranscriptionTimings::default());
        adapter.start().unwrap();
        let t0 = Instant::now();

        let answer = r#"{"type":"Results","channel":{"alternatives":[{"transcript":"I have five years of experience."}]},"is_final":true}"#;
        let event = parse_message(1, answer).unwrap();
        assert!(matches!(adapter.handle(event, t0), Update::Transcript(_)));

        let silence = r#"{"type":"Results","channel":{"alternatives":[{"transcript":""}]},"is_final":true,"speech_final":true}"#;
        let mut finalized = None;
        for second in 1..=10 {
            let now = t0 + Duration::from_secs(second);
            if let Some(event) = parse_message(1, silence) {
                adapter.handle(event, now);
            }
            if let Some(Due::Finalized(text)) = adapter.poll_due(now) {
                finalized = Some((second, text));
                break;
            }
        }
        assert_eq!(
            finalized,
            Some((3, "I have five years of experience.".to_string()))
        );
    }

    #[test]
    fn metadata_and_garbage_are_skipped() {
        assert_eq!(parse_message(1, r#"{"type":"Metadata","request_id":"x"}"#), None);
        assert_eq!(parse_message(1, "not json"), None);
        assert_eq!(
            parse_message(1, r#"{"type":"Results","channel":{"alternatives":[{"transcript":"  "}]}}"#),
            None
        );
        assert!(matches!(
            parse_message(1, r#"{"type":"Error","description":"bad audio"}"#),
            Some(RecognizerEvent::Error {
                error: RecognizerError::Other(_),
                ..
            })
        ));
    }

    #[test]
    fn rejected_handshake_is_a_permission_denial() {
        let response = Response::builder().status(401).body(None).unwrap();
        assert!(matches!(
            classify_connect_error(&tungstenite::Error::Http(response)),
            RecognizerError::PermissionDenied(_)
        ));

        let response = Response::builder().status(503).body(None).unwrap();
        assert!(matches!(
            classify_connect_error(&tungstenite::Error::Http(response)),
            RecognizerError::Network(_)
        ));
        assert!(matches!(
            classify_connect_error(&tungstenite::Error::ConnectionClosed),
            RecognizerError::Network(_)
        ));
    }
}

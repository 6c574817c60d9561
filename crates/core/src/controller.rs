//! The session controller.
//!
//! Owns the turn-taking state, the remote session handle and every other
//! piece of mutable session state. All inbound activity arrives as [`Event`]s
//! and is processed one at a time; the presentation layer only ever sees
//! [`SessionSnapshot`]s published on a watch channel.

use crate::Event;
use crate::error::SessionError;
use crate::generic_types::{GenericServerEvent, GenericSessionConfig};
use crate::interview::InterviewConfig;
use crate::player::{AudioBuffer, PlaybackProgress, PlaybackSink, ResponsePlayer, VoiceId};
use crate::realtime_api::RealtimeApi;
use crate::recognizer::{Recognizer, RecognizerEvent};
use crate::session_state::{ConversationState, InterviewStatus, Trigger};
use crate::transcript::{LiveTranscript, Speaker, TranscriptLog};
use crate::transcription::{Due, TranscriptionAdapter, TranscriptionTimings, Update};
use crate::uplink::{CaptureHandle, MicrophoneUplink};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Rendered system instructions for the remote session.
    pub instructions: String,
    pub voice: Option<String>,
    pub timings: TranscriptionTimings,
}

impl SessionSettings {
    pub fn new(interview: &InterviewConfig) -> Self {
        Self {
            instructions: interview.system_instruction(),
            voice: None,
            timings: TranscriptionTimings::default(),
        }
    }
}

/// Read-only view of the session for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: InterviewStatus,
    pub state: ConversationState,
    pub live_transcript: Option<LiveTranscript>,
    pub transcript: TranscriptLog,
    pub error: Option<String>,
}

pub struct SessionController<A, R, S>
where
    A: RealtimeApi,
    R: Recognizer,
    S: PlaybackSink,
{
    settings: SessionSettings,
    status: InterviewStatus,
    state: ConversationState,
    remote: Option<A>,
    captures: Vec<Box<dyn CaptureHandle>>,
    transcription: TranscriptionAdapter<R>,
    player: ResponsePlayer<S>,
    microphone: MicrophoneUplink,
    live: Option<LiveTranscript>,
    log: TranscriptLog,
    assistant_reply: String,
    error: Option<String>,
    snapshots: watch::Sender<SessionSnapshot>,
    dirty: bool,
}

impl<A, R, S> SessionController<A, R, S>
where
    A: RealtimeApi,
    R: Recognizer,
    S: PlaybackSink,
{
    pub fn new(settings: SessionSettings, recognizer: R, sink: S, microphone: MicrophoneUplink) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let timings = settings.timings;
        Self {
            settings,
            status: InterviewStatus::Idle,
            state: ConversationState::Listening,
            remote: None,
            captures: Vec::new(),
            transcription: TranscriptionAdapter::new(recognizer, timings),
            player: ResponsePlayer::new(sink),
            microphone,
            live: None,
            log: TranscriptLog::new(),
            assistant_reply: String::new(),
            error: None,
            snapshots,
            dirty: false,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn status(&self) -> InterviewStatus {
        self.status
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.log
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            state: self.state,
            live_transcript: self.live.clone(),
            transcript: self.log.clone(),
            error: self.error.clone(),
        }
    }

    /// Resets the previous session's record and reports `CONNECTING`.
    pub fn begin_connecting(&mut self) {
        self.log.clear();
        self.live = None;
        self.error = None;
        self.assistant_reply.clear();
        self.state = ConversationState::Listening;
        self.set_status(InterviewStatus::Connecting);
        self.publish();
    }

    /// Takes ownership of the remote session and the capture handles, then
    /// sends the setup block. The session becomes active once the remote side
    /// acknowledges it.
    pub async fn open(&mut self, remote: A, captures: Vec<Box<dyn CaptureHandle>>) {
        self.remote = Some(remote);
        self.captures = captures;

        let config = GenericSessionConfig {
            instructions: self.settings.instructions.clone(),
            voice: self.settings.voice.clone(),
        };
        let result = match self.remote.as_mut() {
            Some(remote) => remote.update_session(config).await,
            None => Ok(()),
        };
        if let Err(e) = result {
            self.fail(SessionError::connection(format!("{:#}", e))).await;
        }
        self.publish();
    }

    /// Ends the session with `error`. Only the first error of a session is
    /// surfaced.
    pub async fn fail(&mut self, error: SessionError) {
        if !self.status.is_live() {
            tracing::debug!("Ignoring error after the session ended: {}", error);
            return;
        }
        tracing::error!("{}", error);
        self.error = Some(error.user_message().to_string());
        self.teardown(InterviewStatus::Error).await;
        self.publish();
    }

    pub async fn stop(&mut self) {
        if !self.status.is_live() {
            return;
        }
        tracing::info!("Stopping interview");
        self.teardown(InterviewStatus::Idle).await;
    }

    /// Processes events until the session is no longer connecting or active.
    pub async fn run(&mut self, events: &mut mpsc::Receiver<Event>) {
        self.publish();
        while self.status.is_live() {
            let deadline = self.transcription.next_deadline();
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event, Instant::now()).await,
                    None => {
                        tracing::warn!("Event channel closed");
                        self.stop().await;
                    }
                },
                _ = sleep_until(deadline) => self.poll_timers(Instant::now()).await,
            }
            self.publish();
        }
        self.publish();
    }

    pub async fn handle(&mut self, event: Event, now: Instant) {
        match event {
            Event::Recognizer(event) => self.on_recognizer(event, now).await,
            Event::Remote(event) => self.on_remote(event, now).await,
            Event::PlaybackFinished(voice) => self.on_playback_finished(voice, now),
            Event::Microphone(samples) => self.on_microphone(&samples),
            Event::Frame(payload) => self.on_frame(payload),
            Event::Stop => self.stop().await,
        }
    }

    /// Runs whatever transcription deadlines have passed by `now`.
    pub async fn poll_timers(&mut self, now: Instant) {
        while let Some(due) = self.transcription.poll_due(now) {
            match due {
                Due::Finalized(text) => self.finalize_utterance(text).await,
                Due::Start => self.start_recognizer().await,
            }
        }
    }

    async fn on_recognizer(&mut self, event: RecognizerEvent, now: Instant) {
        match self.transcription.handle(event, now) {
            Update::Ignored => {}
            Update::Transcript(live) => match self.state.on(Trigger::InterimText) {
                Some(next) => {
                    self.transition(next, now);
                    self.live = Some(live);
                    self.dirty = true;
                }
                None => tracing::trace!("Ignoring transcript while {:?}", self.state),
            },
            Update::Ended => {
                if self.status == InterviewStatus::Active && self.state.wants_recognizer() {
                    tracing::debug!("Recognizer ended while listening, restarting");
                    self.transcription
                        .schedule_start(now + self.settings.timings.restart_delay);
                }
            }
            Update::Fatal(error) => self.fail(error.into()).await,
        }
    }

    async fn on_remote(&mut self, event: GenericServerEvent, now: Instant) {
        if self.remote.is_none() {
            tracing::trace!("Ignoring event from a closed session: {:?}", event);
            return;
        }
        match event {
            GenericServerEvent::SetupComplete => {
                if self.status == InterviewStatus::Connecting {
                    tracing::info!("Interview session open");
                    self.set_status(InterviewStatus::Active);
                    self.state = ConversationState::Listening;
                    self.transcription
                        .schedule_start(now + self.settings.timings.resume_delay);
                }
            }
            GenericServerEvent::OutputTranscription(text) => self.assistant_reply.push_str(&text),
            GenericServerEvent::InputTranscription(text) => {
                tracing::debug!("Remote input transcription: {}", text)
            }
            GenericServerEvent::Audio(data) => self.on_remote_audio(&data, now),
            GenericServerEvent::TurnComplete => self.flush_assistant_reply(),
            GenericServerEvent::Interrupted => {
                if let Some(next) = self.state.on(Trigger::RemoteInterrupted) {
                    tracing::info!("Interviewer interrupted");
                    self.transition(next, now);
                }
            }
            GenericServerEvent::Error(message) => {
                self.fail(SessionError::connection(message)).await
            }
            GenericServerEvent::Closed(reason) => {
                tracing::info!(
                    "Remote session closed: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.teardown(InterviewStatus::Idle).await;
            }
        }
    }

    fn on_remote_audio(&mut self, data: &str, now: Instant) {
        let Some(next) = self.state.on(Trigger::RemoteAudio) else {
            tracing::debug!("Dropping audio chunk while {:?}", self.state);
            return;
        };
        let buffer = match AudioBuffer::from_pcm16_base64(data) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("Dropping undecodable audio chunk: {:#}", e);
                return;
            }
        };
        self.transition(next, now);
        self.player.enqueue(buffer);
    }

    fn on_playback_finished(&mut self, voice: VoiceId, now: Instant) {
        if self.player.on_finished(voice) == PlaybackProgress::Drained {
            if let Some(next) = self.state.on(Trigger::PlaybackDrained) {
                self.transition(next, now);
            }
        }
    }

    fn on_microphone(&mut self, samples: &[f32]) {
        if self.status != InterviewStatus::Active {
            return;
        }
        let Some(payload) = self.microphone.sample(samples, self.state) else {
            return;
        };
        if let Some(remote) = self.remote.as_mut() {
            if let Err(e) = remote.send_audio(payload) {
                tracing::trace!("Microphone chunk not delivered: {:#}", e);
            }
        }
    }

    fn on_frame(&mut self, payload: String) {
        if self.status != InterviewStatus::Active {
            return;
        }
        if let Some(remote) = self.remote.as_mut() {
            if let Err(e) = remote.send_image(payload) {
                tracing::trace!("Camera frame not delivered: {:#}", e);
            }
        }
    }

    async fn finalize_utterance(&mut self, text: String) {
        let Some(next) = self.state.on(Trigger::SilenceWithText) else {
            tracing::debug!("Dropping utterance finalized while {:?}", self.state);
            return;
        };
        self.state = next;
        self.live = None;
        self.dirty = true;
        tracing::info!("Candidate: {}", text);
        self.log.push(Speaker::User, text.clone());

        if let Some(remote) = self.remote.as_mut() {
            if let Err(e) = remote.send_text(text).await {
                tracing::warn!("Failed to send utterance: {:#}", e);
            }
        }
    }

    async fn start_recognizer(&mut self) {
        if self.status != InterviewStatus::Active
            || !self.state.wants_recognizer()
            || self.transcription.is_listening()
        {
            return;
        }
        if let Err(e) = self.transcription.start() {
            tracing::error!("Failed to start speech recognition: {:#}", e);
        }
    }

    /// Applies `next` together with its entry effects.
    fn transition(&mut self, next: ConversationState, now: Instant) {
        if next == self.state {
            return;
        }
        tracing::debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
        self.dirty = true;

        match next {
            ConversationState::Listening => {
                self.player.interrupt();
                self.microphone.reset();
                if self.status == InterviewStatus::Active && !self.transcription.is_listening() {
                    self.transcription
                        .schedule_start(now + self.settings.timings.resume_delay);
                }
            }
            ConversationState::Processing => self.transcription.stop(true),
            ConversationState::UserSpeaking | ConversationState::AiResponding => {}
        }
    }

    fn flush_assistant_reply(&mut self) {
        let text = self.assistant_reply.trim().to_string();
        self.assistant_reply.clear();
        if text.is_empty() {
            return;
        }
        tracing::info!("Interviewer: {}", text);
        self.log.push(Speaker::Assistant, text);
        self.dirty = true;
    }

    /// Releases everything the session holds. Safe to call more than once.
    async fn teardown(&mut self, status: InterviewStatus) {
        self.transcription.shutdown();
        self.player.interrupt();
        self.microphone.reset();
        for mut capture in self.captures.drain(..) {
            capture.release();
        }
        if let Some(mut remote) = self.remote.take() {
            if let Err(e) = remote.close().await {
                tracing::debug!("Error closing remote session: {:#}", e);
            }
        }
        self.state = self
            .state
            .on(Trigger::SessionEnded)
            .unwrap_or(ConversationState::Listening);
        self.live = None;
        self.assistant_reply.clear();
        self.set_status(status);
    }

    fn set_status(&mut self, status: InterviewStatus) {
        if self.status != status {
            tracing::info!("Interview status: {:?}", status);
            self.status = status;
        }
        self.dirty = true;
    }

    fn publish(&mut self) {
        if self.dirty {
            self.snapshots.send_replace(self.snapshot());
            self.dirty = false;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Local transcription adapter.
//!
//! Wraps a [`Recognizer`], folds its incremental results into a live
//! transcript, and decides when the candidate has finished an utterance: a
//! silence countdown restarts on every update, and when it expires the
//! accumulated final text is emitted once.
//!
//! Timers are plain deadlines. The owner sleeps until [`TranscriptionAdapter::next_deadline`]
//! and then calls [`TranscriptionAdapter::poll_due`].

use crate::recognizer::{Recognizer, RecognizerError, RecognizerEvent, RunId};
use crate::transcript::LiveTranscript;
use std::time::Duration;
use tokio::time::Instant;

/// Silence after the last recognizer update that ends an utterance.
pub const SILENCE_TIMEOUT: Duration = Duration::from_millis(3000);
/// Delay before reviving a recognizer that ended on its own.
pub const RESTART_DELAY: Duration = Duration::from_millis(100);
/// Delay before starting the recognizer when the candidate gets the floor back.
pub const RESUME_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptionTimings {
    pub silence_timeout: Duration,
    pub restart_delay: Duration,
    pub resume_delay: Duration,
}

impl Default for TranscriptionTimings {
    fn default() -> Self {
        Self {
            silence_timeout: SILENCE_TIMEOUT,
            restart_delay: RESTART_DELAY,
            resume_delay: RESUME_DELAY,
        }
    }
}

/// Result of feeding one recognizer event to the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Stale run, empty text, or a recoverable error.
    Ignored,
    /// New display text; the silence countdown was restarted.
    Transcript(LiveTranscript),
    /// The current run ended on its own.
    Ended,
    /// The recognizer cannot be used at all.
    Fatal(RecognizerError),
}

/// A deadline that has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Due {
    /// The silence countdown expired with this utterance. The recognizer has
    /// already been stopped and the buffer cleared.
    Finalized(String),
    /// A scheduled (re)start is due.
    Start,
}

pub struct TranscriptionAdapter<R: Recognizer> {
    recognizer: R,
    timings: TranscriptionTimings,
    active_run: Option<RunId>,
    last_run: RunId,
    accumulated: String,
    silence_deadline: Option<Instant>,
    start_at: Option<Instant>,
}

impl<R: Recognizer> TranscriptionAdapter<R> {
    pub fn new(recognizer: R, timings: TranscriptionTimings) -> Self {
        Self {
            recognizer,
            timings,
            active_run: None,
            last_run: 0,
            accumulated: String::new(),
            silence_deadline: None,
            start_at: None,
        }
    }

    pub fn timings(&self) -> TranscriptionTimings {
        self.timings
    }

    pub fn is_listening(&self) -> bool {
        self.active_run.is_some()
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Starts a fresh run, replacing any run still attached. The accumulated
    /// text survives a restart.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.active_run.is_some() {
            tracing::debug!("Replacing a recognizer run that is still attached");
            self.stop(false);
        }
        self.start_at = None;
        self.last_run += 1;
        let run = self.last_run;
        self.active_run = Some(run);
        if let Err(e) = self.recognizer.start(run) {
            self.active_run = None;
            return Err(e);
        }
        tracing::info!("Speech recognition active (run {})", run);
        Ok(())
    }

    /// Stops the current run. The run is detached first so nothing it still
    /// delivers can be mistaken for live input.
    pub fn stop(&mut self, clear_accumulated: bool) {
        if let Some(run) = self.active_run.take() {
            tracing::debug!("Stopping speech recognition (run {})", run);
            self.recognizer.stop();
        }
        self.silence_deadline = None;
        if clear_accumulated {
            self.accumulated.clear();
        }
    }

    /// Full stop for teardown: also forgets any scheduled start.
    pub fn shutdown(&mut self) {
        self.stop(true);
        self.start_at = None;
    }

    pub fn schedule_start(&mut self, at: Instant) {
        self.start_at = Some(at);
    }

    pub fn handle(&mut self, event: RecognizerEvent, now: Instant) -> Update {
        if self.active_run != Some(event.run()) {
            tracing::trace!("Dropping event from detached recognizer run {}", event.run());
            return Update::Ignored;
        }

        match event {
            RecognizerEvent::Results {
                result_index,
                results,
                ..
            } => {
                let mut interim = String::new();
                let mut finalized = String::new();
                for result in results.iter().skip(result_index) {
                    if result.is_final {
                        finalized.push_str(&result.transcript);
                    } else {
                        interim.push_str(&result.transcript);
                    }
                }

                let finalized = finalized.trim();
                if !finalized.is_empty() {
                    if !self.accumulated.is_empty() {
                        self.accumulated.push(' ');
                    }
                    self.accumulated.push_str(finalized);
                    tracing::debug!("Accumulated: {:?}", self.accumulated);
                }

                let display = format!("{} {}", self.accumulated, interim)
                    .trim()
                    .to_string();
                if display.is_empty() {
                    return Update::Ignored;
                }

                self.silence_deadline = Some(now + self.timings.silence_timeout);
                Update::Transcript(LiveTranscript::interim(display))
            }
            RecognizerEvent::Error {
                error: error @ RecognizerError::PermissionDenied(_),
                ..
            } => {
                self.shutdown();
                Update::Fatal(error)
            }
            RecognizerEvent::Error { error, .. } => {
                tracing::warn!("Recognizer error: {}", error);
                Update::Ignored
            }
            RecognizerEvent::Ended { run } => {
                tracing::debug!("Recognition run {} ended on its own", run);
                self.active_run = None;
                Update::Ended
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.silence_deadline, self.start_at].into_iter().flatten().min()
    }

    /// Consumes at most one expired deadline.
    pub fn poll_due(&mut self, now: Instant) -> Option<Due> {
        if self.silence_deadline.is_some_and(|deadline| deadline <= now) {
            self.silence_deadline = None;
            let text = self.accumulated.trim().to_string();
            tracing::debug!("Silence timeout, accumulated text: {:?}", text);
            if !text.is_empty() {
                self.stop(true);
                return Some(Due::Finalized(text));
            }
        }

        if self.start_at.is_some_and(|at| at <= now) {
            self.start_at = None;
            return Some(Due::Start);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{MockRecognizer, RecognitionResult};

    fn results(run: RunId, results: Vec<RecognitionResult>) -> RecognizerEvent {
        RecognizerEvent::Results {
            run,
            result_index: 0,
            results,
        }
    }

    fn started_adapter(stops: usize) -> TranscriptionAdapter<MockRecognizer> {
        let mut recognizer = MockRecognizer::new();
        recognizer
            .expect_start()
            .withf(|run| *run == 1)
            .times(1)
            .returning(|_| Ok(()));
        recognizer.expect_stop().times(stops).return_const(());
        let mut adapter = TranscriptionAdapter::new(recognizer, TranscriptionTimings::default());
        adapter.start().unwrap();
        adapter
    }

    fn text_of(update: Update) -> String {
        match update {
            Update::Transcript(live) => {
                assert!(!live.is_final);
                live.text
            }
            other => panic!("expected a transcript, got {:?}", other),
        }
    }

    #[test]
    fn utterance_is_finalized_once_after_silence() {
        let mut adapter = started_adapter(1);
        let t0 = Instant::now();

        let update = adapter.handle(
            results(1, vec![RecognitionResult::interim("I have five")]),
            t0,
        );
        assert_eq!(text_of(update), "I have five");

        let t1 = t0 + Duration::from_millis(500);
        let update = adapter.handle(
            results(1, vec![RecognitionResult::finalized("I have five years of experience.")]),
            t1,
        );
        assert_eq!(text_of(update), "I have five years of experience.");
        assert_eq!(adapter.next_deadline(), Some(t1 + SILENCE_TIMEOUT));

        assert_eq!(adapter.poll_due(t1 + Duration::from_millis(2999)), None);
        assert_eq!(
            adapter.poll_due(t1 + SILENCE_TIMEOUT),
            Some(Due::Finalized("I have five years of experience.".to_string()))
        );
        assert!(!adapter.is_listening());
        assert_eq!(adapter.accumulated(), "");
        assert_eq!(adapter.poll_due(t1 + Duration::from_secs(10)), None);
        assert_eq!(adapter.next_deadline(), None);
    }

    #[test]
    fn display_joins_accumulated_finals_and_latest_interim() {
        let mut adapter = started_adapter(0);
        let now = Instant::now();

        adapter.handle(results(1, vec![RecognitionResult::finalized(" Hello there. ")]), now);
        adapter.handle(results(1, vec![RecognitionResult::finalized("I'm Sam.")]), now);
        assert_eq!(adapter.accumulated(), "Hello there. I'm Sam.");

        let update = adapter.handle(
            results(1, vec![RecognitionResult::interim("I work")]),
            now,
        );
        assert_eq!(text_of(update), "Hello there. I'm Sam. I work");

        // A newer interim replaces the previous one rather than appending to it.
        let update = adapter.handle(
            results(1, vec![RecognitionResult::interim("I work at")]),
            now,
        );
        assert_eq!(text_of(update), "Hello there. I'm Sam. I work at");
    }

    #[test]
    fn only_results_from_result_index_are_new() {
        let mut adapter = started_adapter(0);
        let update = adapter.handle(
            RecognizerEvent::Results {
                run: 1,
                result_index: 1,
                results: vec![
                    RecognitionResult::finalized("already counted"),
                    RecognitionResult::finalized("fresh"),
                    RecognitionResult::interim("and more"),
                ],
            },
            Instant::now(),
        );
        assert_eq!(text_of(update), "fresh and more");
        assert_eq!(adapter.accumulated(), "fresh");
    }

    #[test]
    fn expiry_with_only_interim_text_emits_nothing() {
        let mut adapter = started_adapter(0);
        let t0 = Instant::now();
        adapter.handle(results(1, vec![RecognitionResult::interim("umm")]), t0);

        assert_eq!(adapter.poll_due(t0 + SILENCE_TIMEOUT), None);
        assert!(adapter.is_listening());
        assert_eq!(adapter.next_deadline(), None);
    }

    #[test]
    fn empty_results_do_not_touch_the_countdown() {
        let mut adapter = started_adapter(0);
        let update = adapter.handle(
            results(1, vec![RecognitionResult::interim("   ")]),
            Instant::now(),
        );
        assert_eq!(update, Update::Ignored);
        assert_eq!(adapter.next_deadline(), None);
    }

    #[test]
    fn events_from_a_stopped_run_are_dropped() {
        let mut adapter = started_adapter(1);
        adapter.stop(true);

        let update = adapter.handle(
            results(1, vec![RecognitionResult::finalized("late")]),
            Instant::now(),
        );
        assert_eq!(update, Update::Ignored);
        assert_eq!(adapter.accumulated(), "");
        assert_eq!(adapter.handle(RecognizerEvent::Ended { run: 1 }, Instant::now()), Update::Ignored);
    }

    #[test]
    fn permission_denial_is_fatal() {
        let mut adapter = started_adapter(1);
        let update = adapter.handle(
            RecognizerEvent::Error {
                run: 1,
                error: RecognizerError::PermissionDenied("not-allowed".to_string()),
            },
            Instant::now(),
        );
        assert!(matches!(update, Update::Fatal(RecognizerError::PermissionDenied(_))));
        assert!(!adapter.is_listening());
    }

    #[test]
    fn other_errors_are_tolerated() {
        let mut adapter = started_adapter(0);
        let update = adapter.handle(
            RecognizerEvent::Error {
                run: 1,
                error: RecognizerError::Network("reset".to_string()),
            },
            Instant::now(),
        );
        assert_eq!(update, Update::Ignored);
        assert!(adapter.is_listening());
    }

    #[test]
    fn natural_end_detaches_and_scheduled_start_comes_due() {
        let mut adapter = started_adapter(0);
        let t0 = Instant::now();
        assert_eq!(adapter.handle(RecognizerEvent::Ended { run: 1 }, t0), Update::Ended);
        assert!(!adapter.is_listening());

        adapter.schedule_start(t0 + RESTART_DELAY);
        assert_eq!(adapter.next_deadline(), Some(t0 + RESTART_DELAY));
        assert_eq!(adapter.poll_due(t0), None);
        assert_eq!(adapter.poll_due(t0 + RESTART_DELAY), Some(Due::Start));
        assert_eq!(adapter.poll_due(t0 + RESTART_DELAY), None);
    }

    #[test]
    fn failed_start_leaves_adapter_detached() {
        let mut recognizer = MockRecognizer::new();
        recognizer
            .expect_start()
            .returning(|_| Err(anyhow::anyhow!("no microphone")));
        recognizer.expect_stop().never();
        let mut adapter = TranscriptionAdapter::new(recognizer, TranscriptionTimings::default());
        assert!(adapter.start().is_err());
        assert!(!adapter.is_listening());
    }
}

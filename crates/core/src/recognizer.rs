#[cfg(test)]
use mockall::automock;

/// Identifies one start..stop lifetime of the recognizer. Events from any run
/// other than the current one are stale.
pub type RunId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn interim(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: false,
        }
    }

    pub fn finalized(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            is_final: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognizerError {
    #[error("speech recognition permission denied: {0}")]
    PermissionDenied(String),
    #[error("speech recognition network error: {0}")]
    Network(String),
    #[error("speech recognition error: {0}")]
    Other(String),
}

/// Everything a recognizer reports back, tagged with the run it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// `results[result_index..]` changed since the previous batch of this run.
    Results {
        run: RunId,
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    Error {
        run: RunId,
        error: RecognizerError,
    },
    /// The recognizer stopped on its own.
    Ended { run: RunId },
}

impl RecognizerEvent {
    pub fn run(&self) -> RunId {
        match self {
            RecognizerEvent::Results { run, .. }
            | RecognizerEvent::Error { run, .. }
            | RecognizerEvent::Ended { run } => *run,
        }
    }
}

/// An incremental speech-to-text source running continuously with interim results.
///
/// Implementations deliver [`RecognizerEvent`]s for `run` through whatever
/// channel they were built with; `stop` must be safe to call at any time.
#[cfg_attr(test, automock)]
pub trait Recognizer {
    fn start(&mut self, run: RunId) -> anyhow::Result<()>;
    fn stop(&mut self);
}

use serde::Serialize;

/// Whose turn it is. Owned by the `SessionController`; everything else only
/// reads snapshots of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    /// Idle, waiting for the candidate to speak.
    #[default]
    Listening,
    /// The recognizer has interim text for the current utterance.
    UserSpeaking,
    /// The finalized utterance was sent; waiting for the interviewer.
    Processing,
    /// Interviewer audio is playing.
    AiResponding,
}

/// Everything that can move the conversation from one state to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The recognizer reported non-empty display text.
    InterimText,
    /// The silence countdown expired with accumulated text.
    SilenceWithText,
    /// An audio chunk arrived from the remote session.
    RemoteAudio,
    /// The playback queue ran dry with nothing playing.
    PlaybackDrained,
    /// The remote session reported that the user barged in.
    RemoteInterrupted,
    /// The remote session closed or failed, or the interview was stopped.
    SessionEnded,
}

impl ConversationState {
    /// Looks up the transition table. `None` means the trigger is not accepted
    /// in this state and must be ignored.
    pub fn on(self, trigger: Trigger) -> Option<ConversationState> {
        use ConversationState::*;
        use Trigger::*;

        match (self, trigger) {
            (Listening | UserSpeaking, InterimText) => Some(UserSpeaking),
            (UserSpeaking, SilenceWithText) => Some(Processing),
            // Later chunks of the same response keep the turn open.
            (Processing | AiResponding, RemoteAudio) => Some(AiResponding),
            (AiResponding, PlaybackDrained) => Some(Listening),
            (AiResponding, RemoteInterrupted) => Some(Listening),
            (_, SessionEnded) => Some(Listening),
            _ => None,
        }
    }

    /// States in which the local recognizer is supposed to be running.
    pub fn wants_recognizer(self) -> bool {
        matches!(
            self,
            ConversationState::Listening | ConversationState::UserSpeaking
        )
    }
}

/// Lifecycle of the interview as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewStatus {
    #[default]
    Idle,
    Connecting,
    Active,
    Error,
}

impl InterviewStatus {
    /// Whether a session is open or opening.
    pub fn is_live(self) -> bool {
        matches!(self, InterviewStatus::Connecting | InterviewStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationState::*;
    use Trigger::*;

    const STATES: [ConversationState; 4] = [Listening, UserSpeaking, Processing, AiResponding];
    const TRIGGERS: [Trigger; 6] = [
        InterimText,
        SilenceWithText,
        RemoteAudio,
        PlaybackDrained,
        RemoteInterrupted,
        SessionEnded,
    ];

    #[test]
    fn transition_table_matches_turn_taking_cycle() {
        let expected = [
            (Listening, InterimText, Some(UserSpeaking)),
            (Listening, SilenceWithText, None),
            (Listening, RemoteAudio, None),
            (Listening, PlaybackDrained, None),
            (Listening, RemoteInterrupted, None),
            (UserSpeaking, InterimText, Some(UserSpeaking)),
            (UserSpeaking, SilenceWithText, Some(Processing)),
            (UserSpeaking, RemoteAudio, None),
            (UserSpeaking, PlaybackDrained, None),
            (UserSpeaking, RemoteInterrupted, None),
            (Processing, InterimText, None),
            (Processing, SilenceWithText, None),
            (Processing, RemoteAudio, Some(AiResponding)),
            (Processing, PlaybackDrained, None),
            (Processing, RemoteInterrupted, None),
            (AiResponding, InterimText, None),
            (AiResponding, SilenceWithText, None),
            (AiResponding, RemoteAudio, Some(AiResponding)),
            (AiResponding, PlaybackDrained, Some(Listening)),
            (AiResponding, RemoteInterrupted, Some(Listening)),
        ];
        for (from, trigger, to) in expected {
            assert_eq!(from.on(trigger), to, "{:?} --{:?}-->", from, trigger);
        }
    }

    #[test]
    fn session_end_always_returns_to_listening() {
        for state in STATES {
            assert_eq!(state.on(SessionEnded), Some(Listening));
        }
    }

    #[test]
    fn no_state_is_reached_without_its_predecessor() {
        for state in STATES {
            for trigger in TRIGGERS {
                match state.on(trigger) {
                    Some(Processing) => assert_eq!(state, UserSpeaking),
                    Some(AiResponding) => assert!(matches!(state, Processing | AiResponding)),
                    Some(UserSpeaking) => assert!(matches!(state, Listening | UserSpeaking)),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn recognizer_only_runs_while_the_candidate_has_the_floor() {
        assert!(Listening.wants_recognizer());
        assert!(UserSpeaking.wants_recognizer());
        assert!(!Processing.wants_recognizer());
        assert!(!AiResponding.wants_recognizer());
    }

    #[test]
    fn states_serialize_in_upper_snake_case() {
        assert_eq!(
            serde_json::to_string(&AiResponding).unwrap(),
            "\"AI_RESPONDING\""
        );
        assert_eq!(
            serde_json::to_string(&InterviewStatus::Connecting).unwrap(),
            "\"CONNECTING\""
        );
    }
}

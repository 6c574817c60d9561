use interview_core::controller::SessionSnapshot;
use interview_core::session_state::{ConversationState, InterviewStatus};
use interview_core::transcript::Speaker;
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn state_label(state: ConversationState) -> &'static str {
    match state {
        ConversationState::Listening => "Listening...",
        ConversationState::UserSpeaking => "You are speaking",
        ConversationState::Processing => "Thinking...",
        ConversationState::AiResponding => "Interviewer speaking",
    }
}

fn status_label(status: InterviewStatus) -> &'static str {
    match status {
        InterviewStatus::Idle => "Interview ended",
        InterviewStatus::Connecting => "Connecting...",
        InterviewStatus::Active => "Interview started",
        InterviewStatus::Error => "Interview failed",
    }
}

/// Lines to print for the step from `prev` to `next`.
pub fn render_changes(prev: &SessionSnapshot, next: &SessionSnapshot) -> Vec<String> {
    let mut lines = Vec::new();

    if prev.status != next.status {
        lines.push(format!("== {} ==", status_label(next.status)));
    }
    if next.error.is_some() && prev.error != next.error {
        lines.push(format!("!! {}", next.error.as_deref().unwrap_or_default()));
    }
    if next.status == InterviewStatus::Active && prev.state != next.state {
        lines.push(format!("[{}]", state_label(next.state)));
    }

    // The log only grows within a session; a shorter log means a new session.
    let seen = if next.transcript.len() >= prev.transcript.len() {
        prev.transcript.len()
    } else {
        0
    };
    for entry in &next.transcript.entries()[seen..] {
        let who = match entry.speaker {
            Speaker::User => "You",
            Speaker::Assistant => "Interviewer",
        };
        lines.push(format!("{}: {}", who, entry.text));
    }

    if let Some(live) = &next.live_transcript {
        if prev.live_transcript.as_ref().map(|l| &l.text) != Some(&live.text) {
            lines.push(format!("   ... {}", live.text));
        }
    }

    lines
}

/// Prints every snapshot change until the controller goes away.
pub fn spawn(mut snapshots: watch::Receiver<SessionSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut prev = SessionSnapshot::default();
        while snapshots.changed().await.is_ok() {
            let next = snapshots.borrow_and_update().clone();
            for line in render_changes(&prev, &next) {
                println!("{}", line);
            }
            prev = next;
        }
    })
}

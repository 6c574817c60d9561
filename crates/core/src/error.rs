use crate::recognizer::RecognizerError;

pub const PERMISSION_MESSAGE: &str =
    "Failed to initialize session. Make sure camera and mic permissions are granted.";
pub const CONNECTION_MESSAGE: &str = "Connection error. Please try again.";

/// Errors that end a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to initialize session. Make sure camera and mic permissions are granted. ({0})")]
    Permission(String),
    #[error("Connection error. Please try again. ({0})")]
    Connection(String),
}

impl SessionError {
    pub fn permission(detail: impl std::fmt::Display) -> Self {
        SessionError::Permission(detail.to_string())
    }

    pub fn connection(detail: impl std::fmt::Display) -> Self {
        SessionError::Connection(detail.to_string())
    }

    /// The message shown to the candidate, without the technical detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::Permission(_) => PERMISSION_MESSAGE,
            SessionError::Connection(_) => CONNECTION_MESSAGE,
        }
    }
}

impl From<RecognizerError> for SessionError {
    fn from(error: RecognizerError) -> Self {
        match error {
            RecognizerError::PermissionDenied(detail) => SessionError::Permission(detail),
            other => SessionError::Connection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denial_maps_to_permission_error() {
        let error: SessionError = RecognizerError::PermissionDenied("not-allowed".into()).into();
        assert_eq!(error, SessionError::Permission("not-allowed".into()));
        assert_eq!(error.user_message(), PERMISSION_MESSAGE);
        assert!(error.to_string().starts_with(PERMISSION_MESSAGE));
    }

    #[test]
    fn connection_error_leads_with_the_user_message() {
        let error = SessionError::connection("socket closed");
        assert_eq!(
            error.to_string(),
            "Connection error. Please try again. (socket closed)"
        );
    }
}

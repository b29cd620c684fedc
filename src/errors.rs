use crate::db::RepoError;
use thiserror::Error;

/// Why a command produced no state change. Every variant is terminal for the
/// command being processed and is reported back to the sender.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Bad arguments; no repository call was made.
    #[error("{0}")]
    Validation(String),
    /// Wrong role or wrong secret.
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(RepoError),
}

impl From<RepoError> for CommandError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => CommandError::NotFound(what),
            other => CommandError::Store(other),
        }
    }
}

impl CommandError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CommandError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        CommandError::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CommandError::NotFound(msg.into())
    }

    /// Text sent back to the user.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Validation(msg) => format!("❗ {msg}"),
            CommandError::Unauthorized(msg) => format!("🚫 {msg}"),
            CommandError::NotFound(msg) => format!("❌ {msg}"),
            CommandError::Store(err) => format!("❌ Error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_not_found_maps_to_not_found() {
        let err: CommandError = RepoError::not_found("request #3 not found").into();
        assert!(matches!(err, CommandError::NotFound(_)));
        assert_eq!(err.user_message(), "❌ request #3 not found");
    }

    #[test]
    fn store_errors_are_surfaced_verbatim() {
        let repo = RepoError::Store {
            context: "failed to credit points",
            source: sqlx::Error::PoolTimedOut,
        };
        let expected = repo.to_string();
        let err = CommandError::from(repo);
        assert!(matches!(err, CommandError::Store(_)));
        assert_eq!(err.user_message(), format!("❌ Error: {expected}"));
    }
}

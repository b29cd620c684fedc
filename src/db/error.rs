use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    NotFound(String),
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl RepoError {
    pub fn not_found(what: impl Into<String>) -> Self {
        RepoError::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound(_))
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Attach a human-readable context to a raw store error.
pub trait StoreContext<T> {
    fn context(self, context: &'static str) -> RepoResult<T>;
}

impl<T> StoreContext<T> for Result<T, sqlx::Error> {
    fn context(self, context: &'static str) -> RepoResult<T> {
        self.map_err(|source| RepoError::Store { context, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_keeps_context_and_source() {
        let res: Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let err = res.context("failed to load user").unwrap_err();
        assert!(!err.is_not_found());
        let msg = err.to_string();
        assert!(msg.starts_with("failed to load user: "), "{msg}");
        assert!(std::error::Error::source(&err).is_some());
    }
}

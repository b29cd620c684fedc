//! Database module: read models, errors and SQL repositories.
//!
//! - `model`: view models returned by repository queries.
//! - `error`: `RepoError` and the `context` helper for store errors.
//! - `repo`: SQL-only functions that map rows into domain entities.
//!
//! Callers import from `coach_points_bot::db`; the repository API and the
//! commonly used types are re-exported here.

pub mod error;
pub mod model;
pub mod repo;

pub use repo::*;

pub use error::{RepoError, RepoResult};
pub use model::{AthleteSummary, HistoryEntry, PendingRequest, ScoreEntry};

//! Read models returned by repository queries.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One line of the leaderboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScoreEntry {
    pub user_id: i64,
    pub name: String,
    pub username: Option<String>,
    pub score: i64,
}

/// A pending request joined with the requesting athlete.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: i64,
    pub athlete_id: i64,
    pub name: String,
    pub username: Option<String>,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AthleteSummary {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
    pub team_id: Option<i64>,
}

/// A settled award as shown in an athlete's history.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub amount: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Athlete,
    Coach,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Athlete => "athlete",
            Role::Coach => "coach",
        }
    }

    pub fn parse_role(s: &str) -> Option<Role> {
        match s {
            "athlete" => Some(Role::Athlete),
            "coach" => Some(Role::Coach),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user. `id` is the Telegram chat id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
    pub role: Role,
    pub team_id: Option<i64>,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>, username: Option<&str>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            username: username.map(str::to_owned),
            role,
            team_id: None,
        }
    }

    pub fn is_athlete(&self) -> bool {
        self.role == Role::Athlete
    }

    pub fn is_coach(&self) -> bool {
        self.role == Role::Coach
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

/// A points request or award. Pending records await a coach decision; settled
/// ones count towards the athlete's score and show up in history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointRecord {
    pub id: i64,
    pub athlete_id: i64,
    pub amount: i64,
    pub reason: String,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

//! Outbound message text.

use crate::commands::CommandSpec;
use crate::db::{AthleteSummary, HistoryEntry, PendingRequest, ScoreEntry};
use crate::model::Team;
use std::fmt::Write;

pub fn points(n: i64) -> String {
    if n == 1 {
        "1 point".to_string()
    } else {
        format!("{n} points")
    }
}

pub fn handle(username: Option<&str>) -> String {
    match username {
        Some(name) if !name.is_empty() => format!("@{name}"),
        _ => "no handle".to_string(),
    }
}

/// Leaderboard. When `viewer_id` is on it, their place is repeated at the end.
pub fn ranking(entries: &[ScoreEntry], team: Option<&Team>, viewer_id: i64) -> String {
    if entries.is_empty() {
        return match team {
            Some(team) => format!("Team {} has no athletes in the ranking yet.", team.name),
            None => "The ranking is empty so far.".to_string(),
        };
    }

    let mut msg = match team {
        Some(team) => format!("🏆 Ranking for team {}:\n", team.name),
        None => "🏆 Athlete ranking:\n".to_string(),
    };
    let mut own_place = None;
    for (idx, entry) in entries.iter().enumerate() {
        let place = idx + 1;
        let _ = writeln!(
            msg,
            "{place}. {} ({}) — {}",
            entry.name,
            handle(entry.username.as_deref()),
            points(entry.score)
        );
        if entry.user_id == viewer_id {
            own_place = Some((place, entry.score));
        }
    }
    if let Some((place, score)) = own_place {
        let _ = write!(msg, "\n📍 You are #{place} with {}.", points(score));
    }
    msg
}

pub fn pending(requests: &[PendingRequest]) -> String {
    if requests.is_empty() {
        return "✅ No pending requests.".to_string();
    }
    let mut msg = "📋 Pending requests:\n".to_string();
    for req in requests {
        let _ = write!(
            msg,
            "\nID: {} | 👤 {} ({}) | ➕ {}\n📎 {}\n",
            req.id,
            req.name,
            handle(req.username.as_deref()),
            points(req.amount),
            req.reason
        );
    }
    let _ = write!(msg, "\nUse /approve <id> or /reject <id>.");
    msg
}

pub fn athletes(list: &[AthleteSummary], teams: &[Team]) -> String {
    if list.is_empty() {
        return "📭 No athletes registered yet.".to_string();
    }
    let mut msg = "📋 Athletes:\n\n".to_string();
    for athlete in list {
        let team = athlete
            .team_id
            .and_then(|id| teams.iter().find(|t| t.id == id))
            .map(|t| format!(" — {}", t.name))
            .unwrap_or_default();
        let _ = writeln!(
            msg,
            "• {} ({}){team}",
            handle(athlete.username.as_deref()),
            athlete.name
        );
    }
    msg
}

pub fn teams(list: &[Team]) -> String {
    if list.is_empty() {
        return "📭 No teams yet. Create one with /create_team <name>.".to_string();
    }
    let mut msg = "👥 Teams:\n\n".to_string();
    for team in list {
        let _ = writeln!(msg, "#{} {}", team.id, team.name);
    }
    msg
}

/// Settled awards. `subject` names the athlete when a coach is looking.
pub fn history(entries: &[HistoryEntry], subject: Option<&str>) -> String {
    if entries.is_empty() {
        return match subject {
            Some(who) => format!("📭 @{who} has no points yet."),
            None => "📭 No points yet.".to_string(),
        };
    }
    let mut msg = match subject {
        Some(who) => format!("📜 Points history for @{who}:\n\n"),
        None => "📜 Your points history:\n\n".to_string(),
    };
    for entry in entries {
        let _ = writeln!(
            msg,
            "• ➕ {} — {} ({})",
            points(entry.amount),
            entry.reason,
            entry.created_at.format("%Y-%m-%d")
        );
    }
    msg
}

pub fn help<'a>(commands: impl IntoIterator<Item = &'a CommandSpec>) -> String {
    let mut msg = "Available commands:\n".to_string();
    for cmd in commands {
        let _ = write!(msg, "\n{} — {}", cmd.usage(), cmd.summary);
    }
    msg
}

use super::error::{RepoError, RepoResult, StoreContext};
use super::model::{AthleteSummary, HistoryEntry, PendingRequest, ScoreEntry};
use crate::model::{PointRecord, Role, Team, User};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{info, instrument};

pub type Pool = SqlitePool;

const POINT_COLUMNS: &str = "id, from_id, amount, reason, pending, created_at";

pub async fn init_pool(database_url: &str) -> RepoResult<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .context("failed to open database")?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await
        .context("failed to enable WAL")?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await
        .context("failed to set synchronous mode")?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the parent
/// directory exists. In-memory and non-sqlite URLs are returned untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> RepoResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role = Role::parse_role(&role)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown role {role:?}").into()))?;
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        username: row.try_get("username")?,
        role,
        team_id: row.try_get("team_id")?,
    })
}

fn point_from_row(row: &SqliteRow) -> Result<PointRecord, sqlx::Error> {
    Ok(PointRecord {
        id: row.try_get("id")?,
        athlete_id: row.try_get("from_id")?,
        amount: row.try_get("amount")?,
        reason: row.try_get("reason")?,
        pending: row.try_get("pending")?,
        created_at: row.try_get("created_at")?,
    })
}

fn team_from_row(row: &SqliteRow) -> Result<Team, sqlx::Error> {
    Ok(Team {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

#[instrument(skip_all)]
pub async fn get_user_by_id(pool: &Pool, id: i64) -> RepoResult<Option<User>> {
    let row = sqlx::query("SELECT id, name, username, role, team_id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load user")?;
    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("failed to decode user")
}

/// Case-insensitive lookup by Telegram handle; a leading `@` is ignored.
#[instrument(skip_all)]
pub async fn get_user_by_username(pool: &Pool, handle: &str) -> RepoResult<Option<User>> {
    let row = sqlx::query(
        "SELECT id, name, username, role, team_id FROM users \
         WHERE lower(username) = lower(?) ORDER BY id LIMIT 1",
    )
    .bind(normalize_handle(handle))
    .fetch_optional(pool)
    .await
    .context("failed to look up user by handle")?;
    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("failed to decode user")
}

/// Like [`get_user_by_username`] but only matches athletes, so a coach holding
/// the same stored handle never shadows one.
#[instrument(skip_all)]
pub async fn get_athlete_by_username(pool: &Pool, handle: &str) -> RepoResult<Option<User>> {
    let row = sqlx::query(
        "SELECT id, name, username, role, team_id FROM users \
         WHERE lower(username) = lower(?) AND role = 'athlete' ORDER BY id LIMIT 1",
    )
    .bind(normalize_handle(handle))
    .fetch_optional(pool)
    .await
    .context("failed to look up athlete by handle")?;
    row.as_ref()
        .map(user_from_row)
        .transpose()
        .context("failed to decode user")
}

/// Store the display name and handle Telegram currently reports for a user.
/// Returns whether anything changed.
#[instrument(skip_all, fields(user_id = id))]
pub async fn update_profile(
    pool: &Pool,
    id: i64,
    name: &str,
    username: Option<&str>,
) -> RepoResult<bool> {
    let res = sqlx::query(
        "UPDATE users SET name = ?, username = ? \
         WHERE id = ? AND (name IS NOT ? OR username IS NOT ?)",
    )
    .bind(name)
    .bind(username)
    .bind(id)
    .bind(name)
    .bind(username)
    .execute(pool)
    .await
    .context("failed to update profile")?;
    let changed = res.rows_affected() > 0;
    if changed {
        info!(user_id = id, "refreshed profile");
    }
    Ok(changed)
}

/// Register a user. Registering an existing id is a no-op that returns
/// `false`; the stored role is never touched.
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn register_user(pool: &Pool, user: &User) -> RepoResult<bool> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let inserted = insert_user_tx(&mut tx, user).await?;
    tx.commit().await.context("failed to commit registration")?;
    if inserted {
        info!(user_id = user.id, role = %user.role, "registered user");
    }
    Ok(inserted)
}

/// Register a user directly into a team (invite deep link). The team must
/// exist; otherwise nothing is written.
#[instrument(skip_all, fields(user_id = user.id, team_id = team_id))]
pub async fn register_user_in_team(pool: &Pool, user: &User, team_id: i64) -> RepoResult<bool> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let team = sqlx::query_scalar::<_, i64>("SELECT id FROM team WHERE id = ?")
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to load team")?;
    if team.is_none() {
        return Err(RepoError::not_found(format!("team #{team_id} not found")));
    }

    let member = User {
        team_id: Some(team_id),
        ..user.clone()
    };
    let inserted = insert_user_tx(&mut tx, &member).await?;
    tx.commit().await.context("failed to commit registration")?;
    if inserted {
        info!(user_id = user.id, team_id, "registered athlete via invite");
    }
    Ok(inserted)
}

async fn insert_user_tx(tx: &mut Transaction<'_, Sqlite>, user: &User) -> RepoResult<bool> {
    let res = sqlx::query(
        "INSERT INTO users (id, name, username, role, team_id) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(user.username.as_deref())
    .bind(user.role.as_str())
    .bind(user.team_id)
    .execute(&mut **tx)
    .await
    .context("failed to insert into users")?;
    if res.rows_affected() == 0 {
        return Ok(false);
    }

    // Only athletes carry a score.
    if user.is_athlete() {
        sqlx::query("INSERT INTO user_score (user_id, score) VALUES (?, 0)")
            .bind(user.id)
            .execute(&mut **tx)
            .await
            .context("failed to insert into user_score")?;
    }
    Ok(true)
}

/// Athletes ordered by score (highest first), then by name.
#[instrument(skip_all)]
pub async fn get_ranking(pool: &Pool, team_id: Option<i64>) -> RepoResult<Vec<ScoreEntry>> {
    let rows = sqlx::query(
        "SELECT u.id, u.name, u.username, s.score \
         FROM users u JOIN user_score s ON s.user_id = u.id \
         WHERE u.role = 'athlete' AND (? IS NULL OR u.team_id = ?) \
         ORDER BY s.score DESC, u.name ASC, u.id ASC",
    )
    .bind(team_id)
    .bind(team_id)
    .fetch_all(pool)
    .await
    .context("failed to load ranking")?;

    rows.iter()
        .map(|row| {
            Ok(ScoreEntry {
                user_id: row.try_get("id")?,
                name: row.try_get("name")?,
                username: row.try_get("username")?,
                score: row.try_get("score")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("failed to decode ranking")
}

#[instrument(skip_all)]
pub async fn get_user_score(pool: &Pool, user_id: i64) -> RepoResult<i64> {
    let score = sqlx::query_scalar::<_, i64>("SELECT score FROM user_score WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to load score")?;
    score.ok_or_else(|| RepoError::not_found(format!("no score for user {user_id}")))
}

/// Store a points request awaiting a coach decision. Amount and reason are
/// validated by the caller; the schema rejects non-positive amounts and blank
/// reasons as a last line.
#[instrument(skip_all, fields(athlete_id = athlete_id, amount = amount))]
pub async fn create_pending_request(
    pool: &Pool,
    athlete_id: i64,
    amount: i64,
    reason: &str,
) -> RepoResult<PointRecord> {
    let sql = format!(
        "INSERT INTO point (from_id, amount, reason, pending) VALUES (?, ?, ?, 1) \
         RETURNING {POINT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(athlete_id)
        .bind(amount)
        .bind(reason)
        .fetch_one(pool)
        .await
        .context("failed to insert point request")?;
    let record = point_from_row(&row).context("failed to decode point request")?;
    info!(request_id = record.id, athlete_id, amount, "created pending request");
    Ok(record)
}

/// Pending requests in arrival order, optionally limited to athletes of one team.
#[instrument(skip_all)]
pub async fn get_pending_requests(
    pool: &Pool,
    team_id: Option<i64>,
) -> RepoResult<Vec<PendingRequest>> {
    let rows = sqlx::query(
        "SELECT p.id, p.from_id, u.name, u.username, p.amount, p.reason \
         FROM point p JOIN users u ON u.id = p.from_id \
         WHERE p.pending = 1 AND (? IS NULL OR u.team_id = ?) \
         ORDER BY p.id ASC",
    )
    .bind(team_id)
    .bind(team_id)
    .fetch_all(pool)
    .await
    .context("failed to load pending requests")?;

    rows.iter()
        .map(|row| {
            Ok(PendingRequest {
                id: row.try_get("id")?,
                athlete_id: row.try_get("from_id")?,
                name: row.try_get("name")?,
                username: row.try_get("username")?,
                amount: row.try_get("amount")?,
                reason: row.try_get("reason")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("failed to decode pending requests")
}

/// Settle a pending request and credit its amount to the athlete.
///
/// The pending check and the flag flip are one conditional UPDATE, so two
/// coaches approving the same id concurrently settle it at most once: the
/// loser sees no pending row and gets `NotFound`.
#[instrument(skip_all, fields(request_id = id))]
pub async fn approve_request(pool: &Pool, id: i64) -> RepoResult<PointRecord> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let sql = format!(
        "UPDATE point SET pending = 0 WHERE id = ? AND pending = 1 RETURNING {POINT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to update request status")?;
    let Some(row) = row else {
        return Err(RepoError::not_found(format!(
            "request #{id} not found or already processed"
        )));
    };
    let record = point_from_row(&row).context("failed to decode point request")?;

    let credited = sqlx::query("UPDATE user_score SET score = score + ? WHERE user_id = ?")
        .bind(record.amount)
        .bind(record.athlete_id)
        .execute(&mut *tx)
        .await
        .context("failed to credit points")?;
    if credited.rows_affected() == 0 {
        return Err(RepoError::not_found(format!(
            "no score for user {}",
            record.athlete_id
        )));
    }

    tx.commit().await.context("failed to commit approval")?;
    info!(request_id = id, athlete_id = record.athlete_id, amount = record.amount, "approved request");
    Ok(record)
}

/// Delete a pending request and return the requesting athlete's id.
#[instrument(skip_all, fields(request_id = id))]
pub async fn reject_request(pool: &Pool, id: i64) -> RepoResult<i64> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let athlete_id =
        sqlx::query_scalar::<_, i64>("DELETE FROM point WHERE id = ? AND pending = 1 RETURNING from_id")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to delete request")?;
    let Some(athlete_id) = athlete_id else {
        return Err(RepoError::not_found(format!(
            "request #{id} not found or already processed"
        )));
    };
    tx.commit().await.context("failed to commit rejection")?;
    info!(request_id = id, athlete_id, "rejected request");
    Ok(athlete_id)
}

/// Credit points to an athlete directly and record them as already settled.
#[instrument(skip_all, fields(amount = amount))]
pub async fn give_points(
    pool: &Pool,
    username: &str,
    amount: i64,
    reason: &str,
) -> RepoResult<PointRecord> {
    let handle = normalize_handle(username);
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let athlete_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM users WHERE lower(username) = lower(?) AND role = 'athlete' \
         ORDER BY id LIMIT 1",
    )
    .bind(handle)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to look up athlete")?;
    let Some(athlete_id) = athlete_id else {
        return Err(RepoError::not_found(format!("athlete @{handle} not found")));
    };

    let credited = sqlx::query("UPDATE user_score SET score = score + ? WHERE user_id = ?")
        .bind(amount)
        .bind(athlete_id)
        .execute(&mut *tx)
        .await
        .context("failed to credit points")?;
    if credited.rows_affected() == 0 {
        return Err(RepoError::not_found(format!("no score for user {athlete_id}")));
    }

    let sql = format!(
        "INSERT INTO point (from_id, amount, reason, pending) VALUES (?, ?, ?, 0) \
         RETURNING {POINT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(athlete_id)
        .bind(amount)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await
        .context("failed to save points to history")?;
    let record = point_from_row(&row).context("failed to decode point record")?;

    tx.commit().await.context("failed to commit points")?;
    info!(athlete_id, amount, "gave points");
    Ok(record)
}

#[instrument(skip_all)]
pub async fn list_athletes(pool: &Pool, team_id: Option<i64>) -> RepoResult<Vec<AthleteSummary>> {
    let rows = sqlx::query(
        "SELECT id, name, username, team_id FROM users \
         WHERE role = 'athlete' AND (? IS NULL OR team_id = ?) \
         ORDER BY name ASC, id ASC",
    )
    .bind(team_id)
    .bind(team_id)
    .fetch_all(pool)
    .await
    .context("failed to list athletes")?;

    rows.iter()
        .map(|row| {
            Ok(AthleteSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                username: row.try_get("username")?,
                team_id: row.try_get("team_id")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("failed to decode athletes")
}

/// Settled awards for one athlete, newest first.
#[instrument(skip_all)]
pub async fn get_user_history(pool: &Pool, athlete_id: i64) -> RepoResult<Vec<HistoryEntry>> {
    let rows = sqlx::query(
        "SELECT amount, reason, created_at FROM point \
         WHERE from_id = ? AND pending = 0 ORDER BY id DESC",
    )
    .bind(athlete_id)
    .fetch_all(pool)
    .await
    .context("failed to load history")?;

    rows.iter()
        .map(|row| {
            Ok(HistoryEntry {
                amount: row.try_get("amount")?,
                reason: row.try_get("reason")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("failed to decode history")
}

#[instrument(skip_all)]
pub async fn create_team(pool: &Pool, name: &str) -> RepoResult<Team> {
    let row = sqlx::query("INSERT INTO team (name) VALUES (?) RETURNING id, name")
        .bind(name)
        .fetch_one(pool)
        .await
        .context("failed to create team")?;
    let team = team_from_row(&row).context("failed to decode team")?;
    info!(team_id = team.id, "created team");
    Ok(team)
}

/// Delete a team. Its members stay registered with their team cleared; the
/// number of members released is returned.
#[instrument(skip_all, fields(team_id = id))]
pub async fn delete_team(pool: &Pool, id: i64) -> RepoResult<u64> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let released = sqlx::query("UPDATE users SET team_id = NULL WHERE team_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to release team members")?
        .rows_affected();
    let deleted = sqlx::query("DELETE FROM team WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete team")?;
    if deleted.rows_affected() == 0 {
        return Err(RepoError::not_found(format!("team #{id} not found")));
    }
    tx.commit().await.context("failed to commit team deletion")?;
    info!(team_id = id, released, "deleted team");
    Ok(released)
}

#[instrument(skip_all)]
pub async fn list_teams(pool: &Pool) -> RepoResult<Vec<Team>> {
    let rows = sqlx::query("SELECT id, name FROM team ORDER BY id ASC")
        .fetch_all(pool)
        .await
        .context("failed to list teams")?;
    rows.iter()
        .map(team_from_row)
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("failed to decode teams")
}

#[instrument(skip_all)]
pub async fn get_team_by_id(pool: &Pool, id: i64) -> RepoResult<Option<Team>> {
    let row = sqlx::query("SELECT id, name FROM team WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load team")?;
    row.as_ref()
        .map(team_from_row)
        .transpose()
        .context("failed to decode team")
}

#[instrument(skip_all, fields(user_id = user_id, team_id = team_id))]
pub async fn assign_user_to_team(pool: &Pool, user_id: i64, team_id: i64) -> RepoResult<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let team = sqlx::query_scalar::<_, i64>("SELECT id FROM team WHERE id = ?")
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to load team")?;
    if team.is_none() {
        return Err(RepoError::not_found(format!("team #{team_id} not found")));
    }
    let updated = sqlx::query("UPDATE users SET team_id = ? WHERE id = ?")
        .bind(team_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("failed to assign team")?;
    if updated.rows_affected() == 0 {
        return Err(RepoError::not_found(format!("user {user_id} not found")));
    }
    tx.commit().await.context("failed to commit team assignment")?;
    info!(user_id, team_id, "assigned user to team");
    Ok(())
}

use coach_points_bot::db;
use coach_points_bot::model::{Role, User};
use sqlx::sqlite::SqlitePoolOptions;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn athlete(pool: &sqlx::SqlitePool, id: i64, name: &str) {
    let user = User::new(id, name, Some(&name.to_lowercase()), Role::Athlete);
    assert!(db::register_user(pool, &user).await.unwrap());
}

async fn settled_sum(pool: &sqlx::SqlitePool, id: i64) -> i64 {
    sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM point WHERE from_id = ? AND pending = 0")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn score_always_matches_settled_history() {
    let pool = setup_pool().await;
    athlete(&pool, 1, "Alice").await;

    // Requests get increasing ids; approve some, reject one, leave one pending.
    let mut ids = Vec::new();
    for (amount, reason) in [(3, "warmup"), (5, "heat"), (8, "final"), (2, "cooldown")] {
        let rec = db::create_pending_request(&pool, 1, amount, reason).await.unwrap();
        assert!(rec.pending);
        ids.push(rec.id);
    }
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    db::approve_request(&pool, ids[0]).await.unwrap();
    db::approve_request(&pool, ids[2]).await.unwrap();
    db::reject_request(&pool, ids[1]).await.unwrap();
    db::give_points(&pool, "@alice", 4, "bonus").await.unwrap();

    let score = db::get_user_score(&pool, 1).await.unwrap();
    assert_eq!(score, 3 + 8 + 4);
    assert_eq!(score, settled_sum(&pool, 1).await);

    let pending = db::get_pending_requests(&pool, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, ids[3]);

    let history = db::get_user_history(&pool, 1).await.unwrap();
    let reasons: Vec<_> = history.iter().map(|h| h.reason.as_str()).collect();
    assert_eq!(reasons, vec!["bonus", "final", "warmup"]);
}

#[tokio::test]
async fn repeated_approval_settles_once() {
    let pool = setup_pool().await;
    athlete(&pool, 1, "Alice").await;
    let rec = db::create_pending_request(&pool, 1, 10, "heat win").await.unwrap();

    let (a, b) = tokio::join!(
        db::approve_request(&pool, rec.id),
        db::approve_request(&pool, rec.id)
    );
    let wins = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(wins, 1);
    let loser = a.err().or(b.err()).unwrap();
    assert!(loser.is_not_found());

    assert_eq!(db::get_user_score(&pool, 1).await.unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_approvals_on_separate_connections_settle_once() {
    let td = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", td.path().join("points.db").display());
    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    athlete(&pool, 1, "Alice").await;
    let id = db::create_pending_request(&pool, 1, 10, "heat win").await.unwrap().id;

    let first = tokio::spawn({
        let pool = pool.clone();
        async move { db::approve_request(&pool, id).await }
    });
    let second = tokio::spawn({
        let pool = pool.clone();
        async move { db::approve_request(&pool, id).await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(db::get_user_score(&pool, 1).await.unwrap(), 10);
    assert_eq!(settled_sum(&pool, 1).await, 10);
    assert!(db::get_pending_requests(&pool, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn reject_after_approve_is_not_found() {
    let pool = setup_pool().await;
    athlete(&pool, 1, "Alice").await;
    let rec = db::create_pending_request(&pool, 1, 6, "drills").await.unwrap();

    db::approve_request(&pool, rec.id).await.unwrap();
    let err = db::reject_request(&pool, rec.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(settled_sum(&pool, 1).await, 6);
}

#[tokio::test]
async fn ranking_ties_break_by_name() {
    let pool = setup_pool().await;
    athlete(&pool, 3, "Cara").await;
    athlete(&pool, 1, "Bob").await;
    athlete(&pool, 2, "Alice").await;
    db::give_points(&pool, "cara", 5, "race").await.unwrap();
    db::give_points(&pool, "bob", 2, "race").await.unwrap();
    db::give_points(&pool, "alice", 2, "race").await.unwrap();

    let ranking = db::get_ranking(&pool, None).await.unwrap();
    let names: Vec<_> = ranking.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Cara", "Alice", "Bob"]);
}

//! Ledger behaviour through the public API.
//!
//! Covers:
//! - like toggles by parity, and counts never going negative
//! - concurrent toggles never producing duplicate rows
//! - comment counts matching the stored rows
//! - owner-only deletion and cascades
//! - the optimistic feed settling against a real ledger
//! - re-fetching after a toggle whose outcome is unknown

use std::sync::Arc;

use async_trait::async_trait;
use plaza::db::models::{Comment, PostId, UserId};
use plaza::db;
use plaza::identity::{register, RegistrationRequest, SqliteAuthProvider};
use plaza::ledger::{
    run_add_comment, run_toggle_like, CommandState, CommentView, Ledger, LedgerError, LikeState,
    LocalFeed, SaveState, SqliteLedger,
};
use plaza::projection;
use plaza::state::DbPool;
use plaza::store::{ContentStore, ListPosts, NewPost, SqliteContentStore, StoreError};
use tempfile::TempDir;
use tokio::sync::Mutex;

struct Harness {
    pool: DbPool,
    store: Arc<SqliteContentStore>,
    ledger: Arc<SqliteLedger>,
    auth: SqliteAuthProvider,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    Harness {
        store: Arc::new(SqliteContentStore::new(pool.clone())),
        ledger: Arc::new(SqliteLedger::new(pool.clone())),
        auth: SqliteAuthProvider::new(pool.clone(), 1, 4),
        pool,
        _dir: dir,
    }
}

async fn user(h: &Harness, email: &str, name: &str) -> UserId {
    register(
        &h.auth,
        &*h.store,
        RegistrationRequest {
            email: email.to_string(),
            password: "secret1".to_string(),
            display_name: name.to_string(),
            phone: None,
        },
    )
    .await
    .unwrap()
    .id
}

async fn post(h: &Harness, owner: &UserId, caption: &str) -> PostId {
    h.store
        .create_post(
            owner,
            NewPost {
                image: "https://img.test/p.jpg".to_string(),
                caption: caption.to_string(),
            },
        )
        .await
        .unwrap()
        .id
}

fn like_rows(h: &Harness, post: &PostId, user: &UserId) -> i64 {
    let conn = h.pool.get().unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM likes WHERE post_id = ?1 AND user_id = ?2",
        [post.as_str(), user.as_str()],
        |row| row.get(0),
    )
    .unwrap()
}

#[tokio::test]
async fn like_then_unlike_scenario() {
    let h = harness();
    let u1 = user(&h, "u1@plaza.test", "Ursula").await;
    let b = user(&h, "b@plaza.test", "Bea").await;
    let p1 = post(&h, &u1, "hello").await;

    let first = h.ledger.toggle_like(&b, &p1).await.unwrap();
    assert!(first.liked);
    assert_eq!(first.count, 1);
    assert!(h.ledger.is_liked(&b, &p1).await.unwrap());

    let second = h.ledger.toggle_like(&b, &p1).await.unwrap();
    assert!(!second.liked);
    assert_eq!(second.count, 0);
    assert!(!h.ledger.is_liked(&b, &p1).await.unwrap());
}

#[tokio::test]
async fn toggle_parity_decides_liked() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let fan = user(&h, "fan@plaza.test", "Fan").await;
    let p = post(&h, &owner, "parity").await;

    for n in 1..=7u32 {
        let state = h.ledger.toggle_like(&fan, &p).await.unwrap();
        assert_eq!(state.liked, n % 2 == 1, "after {} toggles", n);
        assert_eq!(state.count, u64::from(n % 2));
        assert!(like_rows(&h, &p, &fan) <= 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_toggles_never_duplicate_rows() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let fan = user(&h, "fan@plaza.test", "Fan").await;
    let p = post(&h, &owner, "race").await;

    let spawn_toggle = || {
        let ledger = h.ledger.clone();
        let fan = fan.clone();
        let p = p.clone();
        tokio::spawn(async move { ledger.toggle_like(&fan, &p).await })
    };
    let (a, b) = tokio::join!(spawn_toggle(), spawn_toggle());
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    // Serialized: one turned it on, the other turned it off
    assert_ne!(a.liked, b.liked);
    assert_eq!(like_rows(&h, &p, &fan), 0);
    assert_eq!(h.ledger.count_likes(&p).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_likes_from_different_users_all_count() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let p = post(&h, &owner, "popular").await;

    let mut fans = Vec::new();
    for i in 0..5 {
        fans.push(user(&h, &format!("fan{}@plaza.test", i), &format!("Fan {}", i)).await);
    }

    let handles: Vec<_> = fans
        .iter()
        .cloned()
        .map(|fan| {
            let ledger = h.ledger.clone();
            let p = p.clone();
            tokio::spawn(async move { ledger.set_like(&fan, &p, true).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().liked);
    }

    assert_eq!(h.ledger.count_likes(&p).await.unwrap(), 5);
}

#[tokio::test]
async fn comment_count_matches_rows() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let other = user(&h, "other@plaza.test", "Other").await;
    let p = post(&h, &owner, "talk").await;

    assert_eq!(h.ledger.count_comments(&p).await.unwrap(), 0);
    h.ledger.add_comment(&other, &p, "first").await.unwrap();
    assert_eq!(h.ledger.count_comments(&p).await.unwrap(), 1);
    h.ledger.add_comment(&owner, &p, "second").await.unwrap();
    assert!(h.ledger.add_comment(&owner, &p, "   ").await.is_err());

    let rows: i64 = h
        .pool
        .get()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            [p.as_str()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(h.ledger.count_comments(&p).await.unwrap(), rows as u64);
    assert_eq!(h.ledger.list_comments(&p).await.unwrap().len(), 2);
}

#[tokio::test]
async fn non_owner_cannot_delete() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let intruder = user(&h, "intruder@plaza.test", "Intruder").await;
    let p = post(&h, &owner, "mine").await;

    let err = h.store.delete_post(&p, &intruder).await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized));

    let record = h.store.get_post(&p).await.unwrap();
    assert_eq!(record.post.caption, "mine");
}

#[tokio::test]
async fn owner_delete_cascades_to_ledger_rows() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let fan = user(&h, "fan@plaza.test", "Fan").await;
    let p = post(&h, &owner, "short lived").await;

    h.ledger.toggle_like(&fan, &p).await.unwrap();
    h.ledger.toggle_save(&fan, &p).await.unwrap();
    h.ledger.add_comment(&fan, &p, "nice").await.unwrap();

    h.store.delete_post(&p, &owner).await.unwrap();

    assert!(matches!(
        h.store.get_post(&p).await.unwrap_err(),
        StoreError::NotFound
    ));
    assert_eq!(h.ledger.count_likes(&p).await.unwrap(), 0);
    assert_eq!(h.ledger.count_comments(&p).await.unwrap(), 0);
    assert!(!h.ledger.is_saved(&fan, &p).await.unwrap());
}

#[tokio::test]
async fn local_feed_converges_with_ledger() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let fan = user(&h, "fan@plaza.test", "Fan").await;
    let p = post(&h, &owner, "optimistic").await;

    let records = h.store.list_posts(ListPosts::default()).await.unwrap();
    let views = projection::project(records, Some(&fan), &*h.ledger)
        .await
        .unwrap();
    let feed = Arc::new(Mutex::new(LocalFeed::new(views)));

    let state = run_toggle_like(&feed, &*h.ledger, &fan, &p)
        .await
        .unwrap();
    assert_eq!(state, CommandState::Confirmed);
    {
        let feed = feed.lock().await;
        let view = feed.get(&p).unwrap();
        assert!(view.liked_by_current_user);
        assert_eq!(view.like_count, 1);
    }

    let comment = run_add_comment(&feed, &*h.ledger, &fan, &p, "hi")
        .await
        .unwrap();
    assert!(comment.is_ok());

    // A rejected comment rolls the optimistic count back
    let rejected = run_add_comment(&feed, &*h.ledger, &fan, &p, "  ")
        .await
        .unwrap();
    assert!(rejected.is_err());

    let feed = feed.lock().await;
    let view = feed.get(&p).unwrap();
    assert_eq!(view.comment_count, 1);
    assert_eq!(
        view.comment_count,
        h.ledger.count_comments(&p).await.unwrap()
    );
}

#[tokio::test]
async fn failed_toggle_on_deleted_post_rolls_back() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let fan = user(&h, "fan@plaza.test", "Fan").await;
    let p = post(&h, &owner, "gone soon").await;

    let records = h.store.list_posts(ListPosts::default()).await.unwrap();
    let views = projection::project(records, Some(&fan), &*h.ledger)
        .await
        .unwrap();
    let feed = Arc::new(Mutex::new(LocalFeed::new(views)));

    h.store.delete_post(&p, &owner).await.unwrap();

    let state = run_toggle_like(&feed, &*h.ledger, &fan, &p)
        .await
        .unwrap();
    assert_eq!(state, CommandState::Failed);

    let feed = feed.lock().await;
    let view = feed.get(&p).unwrap();
    assert!(!view.liked_by_current_user);
    assert_eq!(view.like_count, 0);
}

/// Commits every toggle and then reports a failure, the way a dropped
/// response looks to the caller.
struct CommitThenFail(Arc<SqliteLedger>);

#[async_trait]
impl Ledger for CommitThenFail {
    async fn toggle_like(&self, user: &UserId, post: &PostId) -> Result<LikeState, LedgerError> {
        self.0.toggle_like(user, post).await?;
        Err(LedgerError::Validation("connection reset".into()))
    }

    async fn set_like(
        &self,
        user: &UserId,
        post: &PostId,
        liked: bool,
    ) -> Result<LikeState, LedgerError> {
        self.0.set_like(user, post, liked).await
    }

    async fn toggle_save(&self, user: &UserId, post: &PostId) -> Result<SaveState, LedgerError> {
        self.0.toggle_save(user, post).await
    }

    async fn is_liked(&self, user: &UserId, post: &PostId) -> Result<bool, LedgerError> {
        self.0.is_liked(user, post).await
    }

    async fn is_saved(&self, user: &UserId, post: &PostId) -> Result<bool, LedgerError> {
        self.0.is_saved(user, post).await
    }

    async fn count_likes(&self, post: &PostId) -> Result<u64, LedgerError> {
        self.0.count_likes(post).await
    }

    async fn count_comments(&self, post: &PostId) -> Result<u64, LedgerError> {
        self.0.count_comments(post).await
    }

    async fn add_comment(
        &self,
        user: &UserId,
        post: &PostId,
        text: &str,
    ) -> Result<Comment, LedgerError> {
        self.0.add_comment(user, post, text).await
    }

    async fn list_comments(&self, post: &PostId) -> Result<Vec<CommentView>, LedgerError> {
        self.0.list_comments(post).await
    }
}

#[tokio::test]
async fn failed_toggle_that_committed_adopts_server_state() {
    let h = harness();
    let owner = user(&h, "owner@plaza.test", "Owner").await;
    let fan = user(&h, "fan@plaza.test", "Fan").await;
    let p = post(&h, &owner, "flaky network").await;
    let flaky = CommitThenFail(h.ledger.clone());

    let records = h.store.list_posts(ListPosts::default()).await.unwrap();
    let views = projection::project(records, Some(&fan), &*h.ledger)
        .await
        .unwrap();
    let feed = Arc::new(Mutex::new(LocalFeed::new(views)));

    let state = run_toggle_like(&feed, &flaky, &fan, &p).await.unwrap();
    assert_eq!(state, CommandState::Failed);

    // The write landed even though the call failed; the view follows the ledger
    assert!(h.ledger.is_liked(&fan, &p).await.unwrap());
    {
        let feed = feed.lock().await;
        let view = feed.get(&p).unwrap();
        assert!(view.liked_by_current_user);
        assert_eq!(view.like_count, 1);
        assert_eq!(feed.pending(), 0);
    }

    // Idempotent set brings both sides back without a second flip
    let settled = h.ledger.set_like(&fan, &p, false).await.unwrap();
    assert!(!settled.liked);
    assert_eq!(settled.count, 0);
    assert_eq!(like_rows(&h, &p, &fan), 0);
}

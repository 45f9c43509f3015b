//! Interaction ledger: likes, saves and comments, with derived counts.
//!
//! Counts are always recomputed from the rows; nothing is cached here.
//! Toggles run inside an immediate transaction and the `(post_id,
//! user_id)` primary key backs the one-row-per-pair invariant, so two
//! toggles racing on the same pair can never leave a duplicate.
pub mod command;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{now_timestamp, parse_timestamp, Comment, PostId, UserId};
use crate::projection::display_name_or_placeholder;
use crate::state::DbPool;

pub use command::{
    run_add_comment, run_toggle_like, CommandError, CommandId, CommandState, LocalFeed,
};

pub const MAX_COMMENT_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveState {
    pub saved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView {
    pub id: String,
    pub post_id: PostId,
    pub author_id: UserId,
    pub author_display_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl CommentView {
    /// View of a freshly written comment by a known author.
    pub fn authored(comment: Comment, author_display_name: Option<&str>) -> Self {
        CommentView {
            id: comment.id,
            post_id: comment.post_id,
            author_id: comment.user_id,
            author_display_name: display_name_or_placeholder(author_display_name),
            body: comment.body,
            created_at: comment.created_at,
        }
    }
}

/// Membership-style interactions: one row per (user, post) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Like,
    Save,
}

impl Membership {
    fn table(self) -> &'static str {
        match self {
            Membership::Like => "likes",
            Membership::Save => "saves",
        }
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Flip the caller's like on a post and return the new state.
    async fn toggle_like(&self, user: &UserId, post: &PostId) -> Result<LikeState, LedgerError>;

    /// Bring the like to the desired state; repeating it is a no-op.
    async fn set_like(
        &self,
        user: &UserId,
        post: &PostId,
        liked: bool,
    ) -> Result<LikeState, LedgerError>;

    async fn toggle_save(&self, user: &UserId, post: &PostId) -> Result<SaveState, LedgerError>;

    async fn is_liked(&self, user: &UserId, post: &PostId) -> Result<bool, LedgerError>;

    async fn is_saved(&self, user: &UserId, post: &PostId) -> Result<bool, LedgerError>;

    async fn count_likes(&self, post: &PostId) -> Result<u64, LedgerError>;

    async fn count_comments(&self, post: &PostId) -> Result<u64, LedgerError>;

    async fn add_comment(
        &self,
        user: &UserId,
        post: &PostId,
        text: &str,
    ) -> Result<Comment, LedgerError>;

    /// Comments oldest first.
    async fn list_comments(&self, post: &PostId) -> Result<Vec<CommentView>, LedgerError>;
}

pub type DynLedger = Arc<dyn Ledger>;

pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn set_membership(
        &self,
        kind: Membership,
        user: &UserId,
        post: &PostId,
        desired: Option<bool>,
    ) -> Result<(bool, u64), LedgerError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        ensure_post(&tx, post)?;

        let present = membership(&tx, kind, user, post)?;
        let wanted = desired.unwrap_or(!present);

        if wanted && !present {
            tx.execute(
                &format!(
                    "INSERT INTO {} (post_id, user_id, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(post_id, user_id) DO NOTHING",
                    kind.table()
                ),
                params![post.as_str(), user.as_str(), now_timestamp()],
            )?;
        } else if !wanted && present {
            tx.execute(
                &format!(
                    "DELETE FROM {} WHERE post_id = ?1 AND user_id = ?2",
                    kind.table()
                ),
                params![post.as_str(), user.as_str()],
            )?;
        }

        let count = count_rows(
            &tx,
            &format!("SELECT COUNT(*) FROM {} WHERE post_id = ?1", kind.table()),
            post,
        )?;
        tx.commit()?;

        tracing::debug!(
            "{} {} on {} by {} (count {})",
            if wanted { "set" } else { "cleared" },
            kind.table(),
            post,
            user,
            count
        );

        Ok((wanted, count))
    }
}

fn ensure_post(conn: &Connection, post: &PostId) -> Result<(), LedgerError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post.as_str()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(LedgerError::NotFound)
    }
}

fn membership(
    conn: &Connection,
    kind: Membership,
    user: &UserId,
    post: &PostId,
) -> Result<bool, LedgerError> {
    let present = conn.query_row(
        &format!(
            "SELECT COUNT(*) > 0 FROM {} WHERE post_id = ?1 AND user_id = ?2",
            kind.table()
        ),
        params![post.as_str(), user.as_str()],
        |row| row.get(0),
    )?;
    Ok(present)
}

fn count_rows(conn: &Connection, sql: &str, post: &PostId) -> Result<u64, LedgerError> {
    let count: i64 = conn.query_row(sql, params![post.as_str()], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

fn validate_comment(text: &str) -> Result<String, LedgerError> {
    let body = text.trim();
    if body.is_empty() {
        return Err(LedgerError::Validation("Comment cannot be empty".into()));
    }
    if body.chars().count() > MAX_COMMENT_LEN {
        return Err(LedgerError::Validation(format!(
            "Comment must be {} characters or less",
            MAX_COMMENT_LEN
        )));
    }
    Ok(body.to_string())
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn toggle_like(&self, user: &UserId, post: &PostId) -> Result<LikeState, LedgerError> {
        let (liked, count) = self.set_membership(Membership::Like, user, post, None)?;
        Ok(LikeState { liked, count })
    }

    async fn set_like(
        &self,
        user: &UserId,
        post: &PostId,
        liked: bool,
    ) -> Result<LikeState, LedgerError> {
        let (liked, count) = self.set_membership(Membership::Like, user, post, Some(liked))?;
        Ok(LikeState { liked, count })
    }

    async fn toggle_save(&self, user: &UserId, post: &PostId) -> Result<SaveState, LedgerError> {
        let (saved, _) = self.set_membership(Membership::Save, user, post, None)?;
        Ok(SaveState { saved })
    }

    async fn is_liked(&self, user: &UserId, post: &PostId) -> Result<bool, LedgerError> {
        let conn = self.pool.get()?;
        membership(&conn, Membership::Like, user, post)
    }

    async fn is_saved(&self, user: &UserId, post: &PostId) -> Result<bool, LedgerError> {
        let conn = self.pool.get()?;
        membership(&conn, Membership::Save, user, post)
    }

    async fn count_likes(&self, post: &PostId) -> Result<u64, LedgerError> {
        let conn = self.pool.get()?;
        count_rows(&conn, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", post)
    }

    async fn count_comments(&self, post: &PostId) -> Result<u64, LedgerError> {
        let conn = self.pool.get()?;
        count_rows(&conn, "SELECT COUNT(*) FROM comments WHERE post_id = ?1", post)
    }

    async fn add_comment(
        &self,
        user: &UserId,
        post: &PostId,
        text: &str,
    ) -> Result<Comment, LedgerError> {
        let body = validate_comment(text)?;

        let conn = self.pool.get()?;
        ensure_post(&conn, post)?;

        let comment = Comment {
            id: uuid::Uuid::now_v7().to_string(),
            post_id: post.clone(),
            user_id: user.clone(),
            body,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO comments (id, post_id, user_id, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id,
                post.as_str(),
                user.as_str(),
                comment.body,
                comment
                    .created_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            ],
        )?;

        Ok(comment)
    }

    async fn list_comments(&self, post: &PostId) -> Result<Vec<CommentView>, LedgerError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(
            "SELECT c.id, c.post_id, c.user_id, u.display_name, c.body, c.created_at
             FROM comments c
             LEFT JOIN users u ON u.id = c.user_id
             WHERE c.post_id = ?1
             ORDER BY c.created_at ASC, c.id ASC",
        )?;

        let comments = stmt
            .query_map(params![post.as_str()], |row| {
                let display_name: Option<String> = row.get(3)?;
                Ok(CommentView {
                    id: row.get(0)?,
                    post_id: PostId::new(row.get::<_, String>(1)?),
                    author_id: UserId::new(row.get::<_, String>(2)?),
                    author_display_name: display_name_or_placeholder(display_name.as_deref()),
                    body: row.get(4)?,
                    created_at: parse_timestamp(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comments)
    }
}

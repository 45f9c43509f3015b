//! Content store: typed access to the `users` and `posts` tables.
pub mod relation;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{now_timestamp, parse_timestamp, Post, PostId, User, UserId};
use crate::state::DbPool;

pub use relation::{decode_related, OwnerRef, Related};

pub const MAX_CAPTION_LEN: usize = 2200;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The user a mutation is performed on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListPosts {
    /// Only posts by this user.
    pub owner: Option<UserId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub image: String,
    pub caption: String,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub display_name: String,
    pub phone: Option<String>,
}

/// A post with its owner relation already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub post: Post,
    pub owner: Option<OwnerRef>,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Posts newest first.
    async fn list_posts(&self, query: ListPosts) -> Result<Vec<PostRecord>, StoreError>;

    async fn get_post(&self, id: &PostId) -> Result<PostRecord, StoreError>;

    async fn create_post(&self, owner: &UserId, post: NewPost) -> Result<Post, StoreError>;

    /// Delete a post owned by `requester`. Cascades to its ledger rows.
    async fn delete_post(&self, id: &PostId, requester: &UserId) -> Result<(), StoreError>;

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError>;

    /// All profiles ordered by display name.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn insert_profile(&self, profile: NewProfile) -> Result<User, StoreError>;

    async fn update_profile(
        &self,
        target: &UserId,
        actor: &Actor,
        update: ProfileUpdate,
    ) -> Result<User, StoreError>;
}

pub type DynContentStore = Arc<dyn ContentStore>;

pub struct SqliteContentStore {
    pool: DbPool,
}

impl SqliteContentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn required(field: &str, value: &str) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get::<_, String>(0)?),
        display_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        created_at: parse_timestamp(&row.get::<_, String>(4)?),
    })
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Post, Option<String>)> {
    Ok((
        Post {
            id: PostId::new(row.get::<_, String>(0)?),
            owner_id: UserId::new(row.get::<_, String>(1)?),
            image: row.get(2)?,
            caption: row.get(3)?,
            created_at: parse_timestamp(&row.get::<_, String>(4)?),
        },
        row.get(5)?,
    ))
}

fn into_record((post, owner_json): (Post, Option<String>)) -> Result<PostRecord, StoreError> {
    let owner = decode_related::<OwnerRef>(owner_json.as_deref())?;
    Ok(PostRecord { post, owner })
}

fn load_user(conn: &rusqlite::Connection, id: &UserId) -> Result<User, StoreError> {
    conn.query_row(
        "SELECT id, display_name, email, phone, created_at FROM users WHERE id = ?1",
        params![id.as_str()],
        user_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound)
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn list_posts(&self, query: ListPosts) -> Result<Vec<PostRecord>, StoreError> {
        let conn = self.pool.get()?;

        // LIMIT -1 means unbounded in SQLite
        let limit = query.limit.map(i64::from).unwrap_or(-1);
        let owner = query.owner.as_ref().map(|o| o.as_str());

        let mut stmt = conn.prepare(
            "SELECT p.id, p.owner_id, p.image, p.caption, p.created_at,
                    (SELECT json_group_array(json_object('id', u.id, 'display_name', u.display_name))
                     FROM users u WHERE u.id = p.owner_id) AS owner
             FROM posts p
             WHERE (?1 IS NULL OR p.owner_id = ?1)
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![owner, limit], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_record).collect()
    }

    async fn get_post(&self, id: &PostId) -> Result<PostRecord, StoreError> {
        let conn = self.pool.get()?;

        let row = conn
            .query_row(
                "SELECT p.id, p.owner_id, p.image, p.caption, p.created_at,
                        (SELECT json_object('id', u.id, 'display_name', u.display_name)
                         FROM users u WHERE u.id = p.owner_id) AS owner
                 FROM posts p WHERE p.id = ?1",
                params![id.as_str()],
                post_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;

        into_record(row)
    }

    async fn create_post(&self, owner: &UserId, post: NewPost) -> Result<Post, StoreError> {
        let image = required("Image", &post.image)?;
        let caption = required("Caption", &post.caption)?;
        if caption.chars().count() > MAX_CAPTION_LEN {
            return Err(StoreError::Validation(format!(
                "Caption must be {} characters or less",
                MAX_CAPTION_LEN
            )));
        }

        let post = Post {
            id: PostId::generate(),
            owner_id: owner.clone(),
            image,
            caption,
            created_at: chrono::Utc::now(),
        };

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, owner_id, image, caption, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                post.id.as_str(),
                post.owner_id.as_str(),
                post.image,
                post.caption,
                post.created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            ],
        )?;

        Ok(post)
    }

    async fn delete_post(&self, id: &PostId, requester: &UserId) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM posts WHERE id = ?1 AND owner_id = ?2",
            params![id.as_str(), requester.as_str()],
        )?;

        if rows > 0 {
            tracing::info!("Post {} deleted by {}", id, requester);
            return Ok(());
        }

        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;

        if exists {
            tracing::warn!("User {} tried to delete post {} they do not own", requester, id);
            Err(StoreError::Unauthorized)
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        load_user(&conn, id)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(
            "SELECT id, display_name, email, phone, created_at
             FROM users ORDER BY display_name COLLATE NOCASE ASC, id ASC",
        )?;

        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    async fn insert_profile(&self, profile: NewProfile) -> Result<User, StoreError> {
        let display_name = required("Display name", &profile.display_name)?;
        let email = required("Email", &profile.email)?;
        let phone = optional(profile.phone);

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO users (id, display_name, email, phone, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile.id.as_str(),
                display_name,
                email,
                phone,
                now_timestamp()
            ],
        )?;

        load_user(&conn, &profile.id)
    }

    async fn update_profile(
        &self,
        target: &UserId,
        actor: &Actor,
        update: ProfileUpdate,
    ) -> Result<User, StoreError> {
        if &actor.id != target && !actor.is_admin {
            return Err(StoreError::Unauthorized);
        }

        let display_name = required("Display name", &update.display_name)?;
        let phone = optional(update.phone);

        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET display_name = ?1, phone = ?2 WHERE id = ?3",
            params![display_name, phone, target.as_str()],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound);
        }

        load_user(&conn, target)
    }
}

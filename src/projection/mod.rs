//! Read-only post views combining content, owner and ledger state.
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;

use crate::db::models::{PostId, UserId};
use crate::ledger::{Ledger, LedgerError};
use crate::store::PostRecord;

/// Shown when a post's owner has no profile row or an empty name.
pub const DISPLAY_NAME_PLACEHOLDER: &str = "User";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    pub id: PostId,
    pub image: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
    pub owner_id: UserId,
    pub owner_display_name: String,
    pub owner_initial: String,
    pub liked_by_current_user: bool,
    pub saved_by_current_user: bool,
    pub like_count: u64,
    pub comment_count: u64,
}

pub fn display_name_or_placeholder(name: Option<&str>) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DISPLAY_NAME_PLACEHOLDER)
        .to_string()
}

/// Upper-cased first letter of a display name, for avatar badges.
pub fn initial_of(display_name: &str) -> String {
    display_name
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "U".to_string())
}

/// Build the view of a single post for `viewer` (anonymous when `None`).
pub async fn project_one(
    record: PostRecord,
    viewer: Option<&UserId>,
    ledger: &dyn Ledger,
) -> Result<PostView, LedgerError> {
    let PostRecord { post, owner } = record;

    let (like_count, comment_count, liked, saved) = match viewer {
        Some(user) => futures::try_join!(
            ledger.count_likes(&post.id),
            ledger.count_comments(&post.id),
            ledger.is_liked(user, &post.id),
            ledger.is_saved(user, &post.id),
        )?,
        None => {
            let (likes, comments) = futures::try_join!(
                ledger.count_likes(&post.id),
                ledger.count_comments(&post.id),
            )?;
            (likes, comments, false, false)
        }
    };

    let owner_display_name =
        display_name_or_placeholder(owner.as_ref().and_then(|o| o.display_name.as_deref()));
    let owner_initial = initial_of(&owner_display_name);

    Ok(PostView {
        id: post.id,
        image: post.image,
        caption: post.caption,
        created_at: post.created_at,
        owner_id: post.owner_id,
        owner_display_name,
        owner_initial,
        liked_by_current_user: liked,
        saved_by_current_user: saved,
        like_count,
        comment_count,
    })
}

/// Project every record, preserving order. Each item runs its own count
/// queries.
pub async fn project(
    records: Vec<PostRecord>,
    viewer: Option<&UserId>,
    ledger: &dyn Ledger,
) -> Result<Vec<PostView>, LedgerError> {
    try_join_all(
        records
            .into_iter()
            .map(|record| project_one(record, viewer, ledger)),
    )
    .await
}

/// Case-insensitive caption search. An empty query keeps everything.
pub fn filter_by_caption(views: Vec<PostView>, query: &str) -> Vec<PostView> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return views;
    }
    views
        .into_iter()
        .filter(|v| v.caption.to_lowercase().contains(&needle))
        .collect()
}

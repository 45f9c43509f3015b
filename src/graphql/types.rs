use async_graphql::*;
use chrono::{DateTime, Utc};

use crate::db::models::User;
use crate::identity::CurrentUser;
use crate::ledger::{CommentView, LikeState, SaveState};
use crate::projection::PostView;

/// A post as seen by the requesting user
#[derive(Clone, Debug, SimpleObject)]
pub struct PostNode {
    pub id: String,
    pub image: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
    pub owner_id: String,
    /// Owner's display name, or "User" when the owner has none
    pub owner_display_name: String,
    pub owner_initial: String,
    pub liked_by_current_user: bool,
    pub saved_by_current_user: bool,
    pub like_count: u64,
    pub comment_count: u64,
}

impl From<PostView> for PostNode {
    fn from(view: PostView) -> Self {
        PostNode {
            id: view.id.0,
            image: view.image,
            caption: view.caption,
            created_at: view.created_at,
            owner_id: view.owner_id.0,
            owner_display_name: view.owner_display_name,
            owner_initial: view.owner_initial,
            liked_by_current_user: view.liked_by_current_user,
            saved_by_current_user: view.saved_by_current_user,
            like_count: view.like_count,
            comment_count: view.comment_count,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct CommentNode {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_display_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<CommentView> for CommentNode {
    fn from(view: CommentView) -> Self {
        CommentNode {
            id: view.id,
            post_id: view.post_id.0,
            author_id: view.author_id.0,
            author_display_name: view.author_display_name,
            body: view.body,
            created_at: view.created_at,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct UserNode {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_admin: bool,
}

impl From<&CurrentUser> for UserNode {
    fn from(current: &CurrentUser) -> Self {
        let User {
            id,
            display_name,
            email,
            phone,
            created_at,
        } = current.user.clone();
        UserNode {
            id: id.0,
            display_name,
            email,
            phone,
            created_at,
            is_admin: current.is_admin,
        }
    }
}

/// Ledger state after a like toggle
#[derive(Clone, Debug, SimpleObject)]
pub struct LikeResult {
    pub liked: bool,
    pub count: u64,
}

impl From<LikeState> for LikeResult {
    fn from(state: LikeState) -> Self {
        LikeResult {
            liked: state.liked,
            count: state.count,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct SaveResult {
    pub saved: bool,
}

impl From<SaveState> for SaveResult {
    fn from(state: SaveState) -> Self {
        SaveResult { saved: state.saved }
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct CreatePostInput {
    pub image: String,
    pub caption: String,
}

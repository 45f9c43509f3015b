use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::db::models::PostId;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::identity::CurrentUser;
use crate::ledger::{CommentView, LikeState, SaveState};
use crate::projection::{self, PostView};
use crate::routes::project_for;
use crate::state::AppState;
use crate::store::{ListPosts, NewPost};

// --- Requests ---

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub image: String,
    pub caption: String,
}

#[derive(Deserialize)]
pub struct SetLikeRequest {
    pub liked: bool,
}

#[derive(Deserialize)]
pub struct ExploreQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct CommentCreated {
    pub comment: CommentView,
    pub comment_count: u64,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/feed", get(feed))
        .route("/api/explore", get(explore))
        .route("/api/reels", get(reels))
        .route("/api/posts", post(create_post))
        .route("/api/posts/{id}", get(get_post).delete(delete_post))
        .route("/api/posts/{id}/like", post(toggle_like).put(set_like))
        .route("/api/posts/{id}/save", post(toggle_save))
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
}

// --- Handlers ---

async fn feed(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<Vec<PostView>>> {
    let records = state.store.list_posts(ListPosts::default()).await?;
    let views = project_for(&state, records, user.as_ref().map(|u| u.id())).await?;
    Ok(Json(views))
}

async fn explore(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<ExploreQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    let records = state
        .store
        .list_posts(ListPosts {
            owner: None,
            limit: Some(state.config.feed.explore_limit),
        })
        .await?;
    let views = project_for(&state, records, user.as_ref().map(|u| u.id())).await?;
    let views = projection::filter_by_caption(views, query.q.as_deref().unwrap_or(""));
    Ok(Json(views))
}

async fn reels(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Vec<PostView>>> {
    let records = state
        .store
        .list_posts(ListPosts {
            owner: None,
            limit: Some(state.config.feed.reels_limit),
        })
        .await?;
    Ok(Json(project_for(&state, records, Some(user.id())).await?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreatePostRequest>,
) -> AppResult<Response> {
    let post = state
        .store
        .create_post(
            user.id(),
            NewPost {
                image: request.image,
                caption: request.caption,
            },
        )
        .await?;
    tracing::info!("User {} created post {}", user.id(), post.id);

    let record = state.store.get_post(&post.id).await?;
    let view = projection::project_one(record, Some(user.id()), state.ledger.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

async fn get_post(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<PostId>,
) -> AppResult<Json<PostView>> {
    let record = state.store.get_post(&id).await?;
    let view = projection::project_one(
        record,
        user.as_ref().map(|u| u.id()),
        state.ledger.as_ref(),
    )
    .await?;
    Ok(Json(view))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<PostId>,
) -> AppResult<StatusCode> {
    state.store.delete_post(&id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<PostId>,
) -> AppResult<Json<LikeState>> {
    Ok(Json(state.ledger.toggle_like(user.id(), &id).await?))
}

/// Retry-safe form of the toggle: the client states the outcome it wants.
async fn set_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<PostId>,
    Json(req): Json<SetLikeRequest>,
) -> AppResult<Json<LikeState>> {
    Ok(Json(state.ledger.set_like(user.id(), &id, req.liked).await?))
}

async fn toggle_save(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<PostId>,
) -> AppResult<Json<SaveState>> {
    Ok(Json(state.ledger.toggle_save(user.id(), &id).await?))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
) -> AppResult<Json<Vec<CommentView>>> {
    // 404 for unknown posts rather than an empty list
    state.store.get_post(&id).await?;
    Ok(Json(state.ledger.list_comments(&id).await?))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<PostId>,
    Json(request): Json<CreateCommentRequest>,
) -> AppResult<Response> {
    let comment = state
        .ledger
        .add_comment(user.id(), &id, &request.text)
        .await?;
    let comment_count = state.ledger.count_comments(&id).await?;

    let created = CommentCreated {
        comment: CommentView::authored(comment, Some(&user.user.display_name)),
        comment_count,
    };
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::{get, put};
use axum::Router;

use crate::db::models::{User, UserId};
use crate::error::AppResult;
use crate::extractors::AdminUser;
use crate::projection::PostView;
use crate::routes::profile::ProfileUpdateRequest;
use crate::routes::project_for;
use crate::state::AppState;
use crate::store::ListPosts;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{id}", put(update_user))
        .route("/api/admin/posts", get(list_posts))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.store.list_users().await?))
}

async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<UserId>,
    Json(request): Json<ProfileUpdateRequest>,
) -> AppResult<Json<User>> {
    let user = state
        .store
        .update_profile(&id, &admin.actor(), request.into())
        .await?;
    tracing::info!("Admin {} updated profile {}", admin.id(), id);
    Ok(Json(user))
}

async fn list_posts(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Vec<PostView>>> {
    let records = state.store.list_posts(ListPosts::default()).await?;
    Ok(Json(project_for(&state, records, Some(admin.id())).await?))
}

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::error::AppResult;
use crate::identity::CurrentUser;
use crate::projection::PostView;
use crate::routes::project_for;
use crate::state::AppState;
use crate::store::{ListPosts, ProfileUpdate};

#[derive(Deserialize)]
pub struct ProfileUpdateRequest {
    pub display_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<ProfileUpdateRequest> for ProfileUpdate {
    fn from(request: ProfileUpdateRequest) -> Self {
        ProfileUpdate {
            display_name: request.display_name,
            phone: request.phone,
        }
    }
}

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub is_admin: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/profile/posts", get(my_posts))
}

async fn get_profile(user: CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        is_admin: user.is_admin,
        user: user.user,
    })
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ProfileUpdateRequest>,
) -> AppResult<Json<ProfileResponse>> {
    let updated = state
        .store
        .update_profile(user.id(), &user.actor(), request.into())
        .await?;
    Ok(Json(ProfileResponse {
        user: updated,
        is_admin: user.is_admin,
    }))
}

async fn my_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<PostView>>> {
    let records = state
        .store
        .list_posts(ListPosts {
            owner: Some(user.id().clone()),
            limit: None,
        })
        .await?;
    Ok(Json(project_for(&state, records, Some(user.id())).await?))
}

pub mod admin;
pub mod auth;
pub mod events;
pub mod graphql;
pub mod posts;
pub mod profile;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::db::models::UserId;
use crate::error::AppResult;
use crate::projection::{self, PostView};
use crate::state::AppState;
use crate::store::PostRecord;

/// The full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(profile::router())
        .merge(admin::router())
        .merge(events::router())
        .merge(graphql::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Project store records for the given viewer.
pub(crate) async fn project_for(
    state: &AppState,
    records: Vec<PostRecord>,
    viewer: Option<&UserId>,
) -> AppResult<Vec<PostView>> {
    Ok(projection::project(records, viewer, state.ledger.as_ref()).await?)
}

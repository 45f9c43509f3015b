use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;

use crate::extractors::MaybeUser;
use crate::graphql::Viewer;
use crate::state::AppState;

/// GraphQL endpoint handler. Anonymous callers may read; mutations check
/// the viewer themselves.
async fn graphql_handler(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(req): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    let request = req
        .data(state.store.clone())
        .data(state.ledger.clone())
        .data(Viewer(user));

    Json(state.graphql_schema.execute(request).await)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/graphql", post(graphql_handler))
}

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use tokio_stream::StreamExt as _;

use crate::identity::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/auth/events", get(auth_events))
}

/// Sign-in and sign-out events for the caller's own account.
async fn auth_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let me = user.id().clone();

    let stream = state
        .identity
        .subscribe()
        .filter(move |event| event.user_id() == &me)
        .filter_map(|event| match Event::default().event(event.name()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!("Dropping auth event: {}", e);
                None
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

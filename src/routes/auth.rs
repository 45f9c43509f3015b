use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::error::AppResult;
use crate::extractors::{MaybeUser, SessionToken};
use crate::identity::{CurrentUser, RegistrationRequest, SessionGrant};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user: Option<User>,
    pub is_admin: bool,
}

impl From<Option<CurrentUser>> for SessionResponse {
    fn from(current: Option<CurrentUser>) -> Self {
        match current {
            Some(current) => SessionResponse {
                is_admin: current.is_admin,
                user: Some(current.user),
            },
            None => SessionResponse {
                user: None,
                is_admin: false,
            },
        }
    }
}

const LOGIN_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
<form id="login">
  <input name="email" type="email" placeholder="Email" required>
  <input name="password" type="password" placeholder="Password" required>
  <button type="submit">Sign in</button>
</form>
<script>
document.getElementById("login").addEventListener("submit", async (e) => {
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch("/auth/login", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ email: form.get("email"), password: form.get("password") }),
  });
  if (res.ok) window.location = "/api/feed";
});
</script>
</body>
</html>"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session))
}

fn session_cookie(name: &str, grant: &SessionGrant) -> String {
    let max_age = (grant.expires_at - Utc::now()).num_seconds().max(0);
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, grant.token, max_age
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

/// Register and sign straight in.
async fn signup(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> AppResult<Response> {
    let email = request.email.clone();
    let password = request.password.clone();

    let user = state.identity.register(request).await?;
    let grant = state.identity.sign_in(&email, &password).await?;

    Ok((
        StatusCode::CREATED,
        [(
            header::SET_COOKIE,
            session_cookie(&state.config.auth.cookie_name, &grant),
        )],
        Json(user),
    )
        .into_response())
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    let grant = state
        .identity
        .sign_in(&request.email, &request.password)
        .await?;
    let current = state.identity.current_user(Some(&grant.token)).await?;

    Ok((
        [(
            header::SET_COOKIE,
            session_cookie(&state.config.auth.cookie_name, &grant),
        )],
        Json(SessionResponse::from(current)),
    )
        .into_response())
}

async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> AppResult<Response> {
    if let Some(token) = token {
        state.identity.sign_out(&token).await?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/auth/login".to_string()),
            (
                header::SET_COOKIE,
                clear_session_cookie(&state.config.auth.cookie_name),
            ),
        ],
        "",
    )
        .into_response())
}

async fn session(MaybeUser(user): MaybeUser) -> Json<SessionResponse> {
    Json(SessionResponse::from(user))
}

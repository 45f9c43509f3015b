//! The identity context handed to every component that needs the actor.
//!
//! It owns the only auth-state channel: sign-ins and sign-outs go through
//! here and are fanned out to all subscribers.
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::db::models::{User, UserId};
use crate::error::{AppError, AppResult};
use crate::identity::auth::{DynAuthProvider, SessionGrant};
use crate::identity::signup::{self, RegistrationRequest};
use crate::store::{Actor, DynContentStore, StoreError};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn { user_id: UserId },
    SignedOut { user_id: UserId },
}

impl AuthEvent {
    pub fn user_id(&self) -> &UserId {
        match self {
            AuthEvent::SignedIn { user_id } | AuthEvent::SignedOut { user_id } => user_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn { .. } => "signed-in",
            AuthEvent::SignedOut { .. } => "signed-out",
        }
    }
}

/// The resolved actor for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub user: User,
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn id(&self) -> &UserId {
        &self.user.id
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user.id.clone(),
            is_admin: self.is_admin,
        }
    }
}

#[derive(Clone)]
pub struct IdentityContext {
    auth: DynAuthProvider,
    store: DynContentStore,
    events: broadcast::Sender<AuthEvent>,
    admin_email: Option<String>,
}

impl IdentityContext {
    pub fn new(auth: DynAuthProvider, store: DynContentStore, admin_email: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            auth,
            store,
            events,
            admin_email,
        }
    }

    fn is_admin(&self, email: &str) -> bool {
        self.admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email))
    }

    /// Resolve the user behind a session token. One attempt, no retry.
    pub async fn current_user(&self, token: Option<&str>) -> AppResult<Option<CurrentUser>> {
        let Some(token) = token else {
            return Ok(None);
        };
        let Some(identity) = self.auth.current_session(token).await? else {
            return Ok(None);
        };

        match self.store.get_user(&identity.id).await {
            Ok(user) => Ok(Some(CurrentUser {
                is_admin: self.is_admin(&identity.email),
                user,
            })),
            Err(StoreError::NotFound) => {
                tracing::warn!("Identity {} has a session but no profile", identity.id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`current_user`](Self::current_user) but fails when nobody is
    /// signed in.
    pub async fn require_user(&self, token: Option<&str>) -> AppResult<CurrentUser> {
        self.current_user(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    pub async fn register(&self, request: RegistrationRequest) -> AppResult<User> {
        Ok(signup::register(self.auth.as_ref(), self.store.as_ref(), request).await?)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<SessionGrant> {
        let grant = self.auth.sign_in_with_password(email, password).await?;
        tracing::info!("User {} signed in", grant.identity.id);
        self.publish(AuthEvent::SignedIn {
            user_id: grant.identity.id.clone(),
        });
        Ok(grant)
    }

    pub async fn sign_out(&self, token: &str) -> AppResult<()> {
        if let Some(user_id) = self.auth.sign_out(token).await? {
            tracing::info!("User {} signed out", user_id);
            self.publish(AuthEvent::SignedOut { user_id });
        }
        Ok(())
    }

    fn publish(&self, event: AuthEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Auth-state changes from now on. Subscribers that fall behind skip
    /// the events they missed.
    pub fn subscribe(&self) -> impl Stream<Item = AuthEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| event.ok())
    }
}

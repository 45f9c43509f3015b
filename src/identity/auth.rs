//! Password auth provider: identities, credentials and sessions.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{now_timestamp, UserId};
use crate::identity::session;
use crate::state::DbPool;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// An authenticated principal as the auth provider knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionGrant {
    pub token: String,
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionGrant, AuthError>;

    /// End a session. Returns the identity that was signed out, if the
    /// token was live.
    async fn sign_out(&self, token: &str) -> Result<Option<UserId>, AuthError>;

    async fn current_session(&self, token: &str) -> Result<Option<Identity>, AuthError>;

    /// Remove an identity and its sessions.
    async fn delete_identity(&self, id: &UserId) -> Result<(), AuthError>;
}

pub type DynAuthProvider = Arc<dyn AuthProvider>;

pub struct SqliteAuthProvider {
    pool: DbPool,
    session_hours: u64,
    password_cost: u32,
}

impl SqliteAuthProvider {
    pub fn new(pool: DbPool, session_hours: u64, password_cost: u32) -> Self {
        Self {
            pool,
            session_hours,
            password_cost,
        }
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(AuthError::Validation("A valid email is required".into()));
    }
    Ok(email)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl AuthProvider for SqliteAuthProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password_hash = bcrypt::hash(password, self.password_cost)?;
        let identity = Identity {
            id: UserId::generate(),
            email,
        };

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO auth_identities (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.id.as_str(),
                identity.email,
                password_hash,
                now_timestamp()
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                AuthError::EmailTaken
            } else {
                AuthError::Sql(e)
            }
        })?;

        tracing::info!("Created identity {} for {}", identity.id, identity.email);
        Ok(identity)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionGrant, AuthError> {
        let email = email.trim().to_lowercase();
        let conn = self.pool.get()?;

        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT id, email, password_hash FROM auth_identities WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (id, email, hash) = row.ok_or(AuthError::InvalidCredentials)?;
        if !bcrypt::verify(password, &hash).unwrap_or(false) {
            return Err(AuthError::InvalidCredentials);
        }

        let identity = Identity {
            id: UserId::new(id),
            email,
        };
        let (token, expires_at) =
            session::create_session(&conn, &identity.id, self.session_hours)?;

        Ok(SessionGrant {
            token,
            identity,
            expires_at,
        })
    }

    async fn sign_out(&self, token: &str) -> Result<Option<UserId>, AuthError> {
        let conn = self.pool.get()?;
        Ok(session::delete_session(&conn, token)?)
    }

    async fn current_session(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let conn = self.pool.get()?;
        let found = session::lookup_session(&conn, token)?;
        Ok(found.map(|(id, email)| Identity { id, email }))
    }

    async fn delete_identity(&self, id: &UserId) -> Result<(), AuthError> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM auth_identities WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn create_test_provider() -> (SqliteAuthProvider, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (SqliteAuthProvider::new(pool, 1, 4), temp_dir)
    }

    #[test]
    fn email_validation() {
        assert_eq!(normalize_email(" Ana@Plaza.Test ").unwrap(), "ana@plaza.test");
        for bad in ["", "ana", "@plaza.test", "ana@", "ana@plaza", "ana@.test"] {
            assert!(normalize_email(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let (auth, _tmp) = create_test_provider();

        let identity = auth.sign_up("ana@plaza.test", "secret1").await.unwrap();
        let grant = auth
            .sign_in_with_password("ANA@plaza.test", "secret1")
            .await
            .unwrap();
        assert_eq!(grant.identity, identity);

        let current = auth.current_session(&grant.token).await.unwrap();
        assert_eq!(current, Some(identity.clone()));

        assert_eq!(auth.sign_out(&grant.token).await.unwrap(), Some(identity.id));
        assert_eq!(auth.current_session(&grant.token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (auth, _tmp) = create_test_provider();
        auth.sign_up("ana@plaza.test", "secret1").await.unwrap();

        let err = auth
            .sign_in_with_password("ana@plaza.test", "nope123")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = auth
            .sign_in_with_password("ghost@plaza.test", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_email_and_short_password() {
        let (auth, _tmp) = create_test_provider();
        auth.sign_up("ana@plaza.test", "secret1").await.unwrap();

        let err = auth.sign_up("Ana@Plaza.test", "secret2").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));

        let err = auth.sign_up("bo@plaza.test", "12345").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_identity_ends_sessions() {
        let (auth, _tmp) = create_test_provider();
        let identity = auth.sign_up("ana@plaza.test", "secret1").await.unwrap();
        let grant = auth
            .sign_in_with_password("ana@plaza.test", "secret1")
            .await
            .unwrap();

        auth.delete_identity(&identity.id).await.unwrap();
        assert_eq!(auth.current_session(&grant.token).await.unwrap(), None);
    }
}

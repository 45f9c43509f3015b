//! Two-step registration: auth identity first, profile row second.
//!
//! If the profile row cannot be written the identity is deleted again, so
//! registration either leaves both rows or neither.
use serde::Deserialize;
use thiserror::Error;

use crate::db::models::User;
use crate::identity::auth::{AuthError, AuthProvider};
use crate::store::{ContentStore, NewProfile};

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The profile insert failed and the identity was rolled back.
    #[error("Profile rejected: {0}")]
    ProfileRejected(String),
}

pub async fn register(
    auth: &dyn AuthProvider,
    store: &dyn ContentStore,
    request: RegistrationRequest,
) -> Result<User, RegistrationError> {
    if request.display_name.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "Display name is required".into(),
        ));
    }

    let identity = auth.sign_up(&request.email, &request.password).await?;

    let profile = NewProfile {
        id: identity.id.clone(),
        display_name: request.display_name,
        email: identity.email.clone(),
        phone: request.phone,
    };

    match store.insert_profile(profile).await {
        Ok(user) => {
            tracing::info!("Registered user {} ({})", user.id, user.email);
            Ok(user)
        }
        Err(profile_err) => {
            tracing::warn!(
                "Profile insert for {} failed, removing identity: {}",
                identity.id,
                profile_err
            );
            if let Err(cleanup_err) = auth.delete_identity(&identity.id).await {
                tracing::error!(
                    "Could not remove identity {} after failed registration: {}",
                    identity.id,
                    cleanup_err
                );
            }
            Err(RegistrationError::ProfileRejected(profile_err.to_string()))
        }
    }
}

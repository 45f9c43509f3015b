pub mod auth;
pub mod context;
pub mod session;
pub mod signup;

pub use auth::{AuthError, AuthProvider, DynAuthProvider, Identity, SessionGrant, SqliteAuthProvider};
pub use context::{AuthEvent, CurrentUser, IdentityContext};
pub use signup::{register, RegistrationError, RegistrationRequest};

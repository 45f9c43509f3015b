pub mod mutations;
pub mod queries;
pub mod schema;
pub mod types;

use async_graphql::{Context, Error, Result};

use crate::error::AppError;
use crate::identity::CurrentUser;

pub use schema::{build_schema, FeedSchema};

/// The signed-in user for one GraphQL request, if any.
pub struct Viewer(pub Option<CurrentUser>);

pub(crate) fn viewer<'a>(ctx: &Context<'a>) -> Result<Option<&'a CurrentUser>> {
    Ok(ctx.data::<Viewer>()?.0.as_ref())
}

pub(crate) fn require_viewer<'a>(ctx: &Context<'a>) -> Result<&'a CurrentUser> {
    viewer(ctx)?.ok_or_else(|| gql_error(AppError::Unauthorized))
}

/// Same client-facing text the HTTP routes give for this error.
pub(crate) fn gql_error(err: impl Into<AppError>) -> Error {
    Error::new(err.into().public().1)
}

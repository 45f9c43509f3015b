use async_graphql::*;

use crate::db::models::PostId;
use crate::graphql::{gql_error, require_viewer};
use crate::graphql::types::{CommentNode, CreatePostInput, LikeResult, PostNode, SaveResult};
use crate::ledger::{CommentView, DynLedger};
use crate::projection;
use crate::store::{DynContentStore, NewPost};

/// GraphQL Mutation root
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_post(&self, ctx: &Context<'_>, input: CreatePostInput) -> Result<PostNode> {
        let user = require_viewer(ctx)?;
        let store = ctx.data::<DynContentStore>()?;
        let ledger = ctx.data::<DynLedger>()?;

        let post = store
            .create_post(
                user.id(),
                NewPost {
                    image: input.image,
                    caption: input.caption,
                },
            )
            .await
            .map_err(gql_error)?;
        tracing::info!("User {} created post {} via GraphQL", user.id(), post.id);

        let record = store.get_post(&post.id).await.map_err(gql_error)?;
        let view = projection::project_one(record, Some(user.id()), ledger.as_ref())
            .await
            .map_err(gql_error)?;
        Ok(view.into())
    }

    /// Delete one of the viewer's own posts
    async fn delete_post(&self, ctx: &Context<'_>, id: String) -> Result<bool> {
        let user = require_viewer(ctx)?;
        let store = ctx.data::<DynContentStore>()?;

        store
            .delete_post(&PostId::new(id), user.id())
            .await
            .map_err(gql_error)?;
        Ok(true)
    }

    async fn toggle_like(&self, ctx: &Context<'_>, post_id: String) -> Result<LikeResult> {
        let user = require_viewer(ctx)?;
        let ledger = ctx.data::<DynLedger>()?;
        let state = ledger
            .toggle_like(user.id(), &PostId::new(post_id))
            .await
            .map_err(gql_error)?;
        Ok(state.into())
    }

    /// Bring the viewer's like to `liked`; safe to retry
    async fn set_like(
        &self,
        ctx: &Context<'_>,
        post_id: String,
        liked: bool,
    ) -> Result<LikeResult> {
        let user = require_viewer(ctx)?;
        let ledger = ctx.data::<DynLedger>()?;
        let state = ledger
            .set_like(user.id(), &PostId::new(post_id), liked)
            .await
            .map_err(gql_error)?;
        Ok(state.into())
    }

    async fn toggle_save(&self, ctx: &Context<'_>, post_id: String) -> Result<SaveResult> {
        let user = require_viewer(ctx)?;
        let ledger = ctx.data::<DynLedger>()?;
        let state = ledger
            .toggle_save(user.id(), &PostId::new(post_id))
            .await
            .map_err(gql_error)?;
        Ok(state.into())
    }

    async fn add_comment(
        &self,
        ctx: &Context<'_>,
        post_id: String,
        text: String,
    ) -> Result<CommentNode> {
        let user = require_viewer(ctx)?;
        let ledger = ctx.data::<DynLedger>()?;

        let comment = ledger
            .add_comment(user.id(), &PostId::new(post_id), &text)
            .await
            .map_err(gql_error)?;
        Ok(CommentView::authored(comment, Some(&user.user.display_name)).into())
    }
}

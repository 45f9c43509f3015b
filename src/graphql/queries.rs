use async_graphql::*;

use crate::db::models::PostId;
use crate::graphql::types::{CommentNode, PostNode, UserNode};
use crate::graphql::{gql_error, viewer};
use crate::ledger::DynLedger;
use crate::projection;
use crate::store::{DynContentStore, ListPosts, StoreError};

/// GraphQL Query root
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Posts newest first, optionally capped
    async fn feed(&self, ctx: &Context<'_>, limit: Option<u32>) -> Result<Vec<PostNode>> {
        let store = ctx.data::<DynContentStore>()?;
        let ledger = ctx.data::<DynLedger>()?;
        let viewer = viewer(ctx)?.map(|u| u.id());

        let records = store
            .list_posts(ListPosts { owner: None, limit })
            .await
            .map_err(gql_error)?;
        let views = projection::project(records, viewer, ledger.as_ref())
            .await
            .map_err(gql_error)?;
        Ok(views.into_iter().map(PostNode::from).collect())
    }

    /// A single post, or null when it does not exist
    async fn post(&self, ctx: &Context<'_>, id: String) -> Result<Option<PostNode>> {
        let store = ctx.data::<DynContentStore>()?;
        let ledger = ctx.data::<DynLedger>()?;
        let viewer = viewer(ctx)?.map(|u| u.id());

        let record = match store.get_post(&PostId::new(id)).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(gql_error(e)),
        };
        let view = projection::project_one(record, viewer, ledger.as_ref())
            .await
            .map_err(gql_error)?;
        Ok(Some(view.into()))
    }

    /// Comments on a post, oldest first. Unknown posts are an error.
    async fn comments(&self, ctx: &Context<'_>, post_id: String) -> Result<Vec<CommentNode>> {
        let store = ctx.data::<DynContentStore>()?;
        let ledger = ctx.data::<DynLedger>()?;
        let post_id = PostId::new(post_id);

        store.get_post(&post_id).await.map_err(gql_error)?;
        let comments = ledger.list_comments(&post_id).await.map_err(gql_error)?;
        Ok(comments.into_iter().map(CommentNode::from).collect())
    }

    /// The signed-in user
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<UserNode>> {
        Ok(viewer(ctx)?.map(UserNode::from))
    }
}
